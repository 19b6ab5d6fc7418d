pub mod config;
pub mod deserialize;
pub mod document;
pub mod error;
pub mod io;
pub mod message;
pub mod model;
pub mod paths;
pub mod serialize;
pub mod session;
pub mod store;
pub mod sync;
pub mod validation;

pub use deserialize::{deserialize, ParseFailure};
pub use error::{FlatError, Result};
pub use model::FlatState;
pub use serialize::serialize;
pub use session::{Session, SessionHandle};
