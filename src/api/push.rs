/// Server-sent push stream for frontends

use crate::api::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

pub fn create_push_routes() -> Router<AppState> {
    Router::new().route("/api/push", get(push_stream))
}

/// GET /api/push
///
/// One SSE event per push, named after the event type. Slow clients that lag
/// behind the hub skip the missed events.
async fn push_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("🔌 Frontend subscribed to push events");
    let stream = BroadcastStream::new(state.push.subscribe()).filter_map(|received| {
        let event = received.ok()?;
        Event::default().event(event.kind()).json_data(&event).ok().map(Ok)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
