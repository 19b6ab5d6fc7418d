use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/state: the store's current snapshot plus the sync phase.
pub async fn get_state(State(app): State<AppState>) -> Json<serde_json::Value> {
    let snap = app.session.snapshot();
    Json(serde_json::json!({
        "state": snap.state,
        "version": snap.version,
        "revision": snap.revision,
        "is_stub": snap.is_stub,
        "diagnostics": snap.diagnostics,
        "validated_revision": snap.validated_revision,
        "sync": app.session.sync_phase(),
    }))
}
