use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/diagnostics
///
/// `stale` is true while a newer revision is still being validated.
pub async fn get_diagnostics(State(app): State<AppState>) -> Json<serde_json::Value> {
    let snap = app.session.snapshot();
    Json(serde_json::json!({
        "revision": snap.revision,
        "validated_revision": snap.validated_revision,
        "stale": snap.validated_revision != Some(snap.revision),
        "diagnostics": snap.diagnostics,
    }))
}
