use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events: SSE stream with one `change` event per store mutation.
///
/// Event data is the JSON `StoreChange`, snapshot included. A subscriber
/// that lags behind skips the missed changes; the next snapshot catches it up.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.workspace.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let change = msg.ok()?;
        match Event::default().event("change").json_data(&change) {
            Ok(event) => Some(Ok::<Event, Infallible>(event)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode store change");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
