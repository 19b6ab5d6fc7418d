pub mod diagnostics;
pub mod document;
pub mod events;
pub mod messages;
pub mod state;
