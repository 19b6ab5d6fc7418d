use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use flat_core::message::ToState;
use flat_core::session::SessionEvent;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// Turn a session event into an SSE frame. Applied refreshes go out as
/// `refresh` carrying the same payload the state side receives; everything
/// else goes out as `session`.
fn to_sse(event: SessionEvent, version: u64) -> Option<Event> {
    match event {
        SessionEvent::RefreshApplied { state, .. } => {
            let msg = ToState::Refresh {
                data: state,
                based_on: version,
            };
            Event::default().event("refresh").json_data(msg).ok()
        }
        other => Event::default().event("session").json_data(other).ok(),
    }
}

/// GET /api/events: SSE stream of refreshes and session activity.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.session.events();
    let session = app.session.clone();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| {
        msg.ok()
            .and_then(|ev| to_sse(ev, session.snapshot().version))
            .map(Ok::<Event, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
