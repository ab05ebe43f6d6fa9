//! Server-Sent Events (SSE) utilities
//!
//! Forwards `EventBus` traffic to SSE clients with a periodic heartbeat.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::GazEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert an event into an SSE frame named after its type
pub fn to_sse_event(event: &GazEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream broadcast events matching `filter` to one SSE client
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     gaz_common::sse::broadcast_sse_stream("gaz-review", state.event_bus.subscribe(), |_| true)
/// }
/// ```
pub fn broadcast_sse_stream<F>(
    service_name: &'static str,
    mut rx: broadcast::Receiver<GazEvent>,
    filter: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&GazEvent) -> bool + Send + 'static,
{
    info!("New SSE client connected to {} events", service_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            if filter(&event) {
                                if let Some(frame) = to_sse_event(&event) {
                                    yield Ok(frame);
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: {} client lagged, {} events skipped", service_name, skipped);
                        }
                        Err(RecvError::Closed) => {
                            info!("SSE: {} event bus closed", service_name);
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
