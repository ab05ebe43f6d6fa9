//! Server-Sent Events for review and index changes

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only index changes (cluster created/attached/merged, removals)
    #[serde(default)]
    pub index_only: bool,
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let index_only = query.index_only;
    gaz_common::sse::broadcast_sse_stream("gaz-review", state.event_bus.subscribe(), move |event| {
        !index_only || event.is_index_event()
    })
}
