pub mod error;
pub mod routes;
pub mod state;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use flat_core::config::EditorConfig;
use flat_core::document::{DocumentController, FileStore};
use flat_core::session::{Session, SessionHandle, SessionOptions};
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router over a running session.
/// Used by `serve()` and available for integration testing.
pub fn build_router(session: SessionHandle) -> Router {
    let app_state = state::AppState::new(session);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // State side
        .route("/api/state", get(routes::state::get_state))
        .route("/api/messages", post(routes::messages::post_message))
        .route("/api/diagnostics", get(routes::diagnostics::get_diagnostics))
        // Document side
        .route("/api/document", get(routes::document::get_document))
        .route(
            "/api/document/check",
            post(routes::document::check_document),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the workflow document under `root` and start a session on it.
pub fn start_session(root: &Path) -> anyhow::Result<Session> {
    let config = EditorConfig::load(root).context("failed to load .flat/config.yaml")?;
    for warning in config.validate_fields() {
        tracing::warn!(field = %warning.field, "{}", warning.message);
    }
    let path = config.workflow_path(root);
    let controller = DocumentController::open(FileStore::new(&path))
        .with_context(|| format!("failed to open {}", path.display()))?;
    tracing::info!(document = %path.display(), "session started");
    Ok(Session::start(controller, SessionOptions::from_config(&config)))
}

/// Start the editor server for the workflow under `root`.
pub async fn serve(root: &Path, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(root, listener, open_browser).await
}

/// Start the editor server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    root: &Path,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    // Held for the lifetime of the server; dropping it stops the sync loop.
    let session = start_session(root)?;
    let app = build_router(session.handle());

    tracing::info!("Flat editor listening on http://localhost:{actual_port}");

    // There is no bundled UI; the browser gets the JSON state view.
    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/state");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    session.shutdown().await;
    Ok(())
}
