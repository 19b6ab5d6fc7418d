use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/document: the persisted YAML text.
pub async fn get_document(State(app): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let text = app.session.document_text().await?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], text))
}

/// POST /api/document/check: look for an external save now.
pub async fn check_document(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let changed = app.session.check_external().await?;
    let snap = app.session.flush().await?;
    Ok(Json(serde_json::json!({
        "changed": changed,
        "revision": snap.revision,
    })))
}
