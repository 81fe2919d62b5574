use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(sse_handler))
}

/// Streams `ProgressEvent`s as SSE. Lagging clients skip what they missed.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut events = BroadcastStream::new(state.engine().subscribe());
    let mut shutdown_rx = state.shutdown_rx();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                next = events.next() => {
                    match next {
                        Some(Ok(event)) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                yield Ok(Event::default().event(event.name()).data(json));
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            tracing::warn!(skipped, "SSE subscriber lagged");
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
