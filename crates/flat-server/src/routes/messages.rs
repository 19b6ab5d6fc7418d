use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use flat_core::message::ToDocument;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/messages
///
/// The editor UI speaks the same messages the state side sends. `updateText`
/// replaces the state and `openEditor` asks the host to show the raw document.
/// Any `version` on an incoming `updateText` is ignored; the store assigns
/// its own. Bodies that are not a document-bound message get a 400.
pub async fn post_message(
    State(app): State<AppState>,
    body: Result<Json<ToDocument>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(msg) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    match msg {
        ToDocument::UpdateText { data, .. } => {
            let version = app.session.update(data).await?;
            let snap = app.session.flush().await?;
            Ok(Json(serde_json::json!({
                "applied": version.is_some(),
                "version": snap.version,
            })))
        }
        ToDocument::OpenEditor { data } => {
            app.session.open_editor(data).await?;
            app.session.flush().await?;
            Ok(Json(serde_json::json!({ "ok": true })))
        }
    }
}
