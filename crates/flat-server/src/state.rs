use flat_core::session::SessionHandle;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
}

impl AppState {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}
