//! HTTP API handlers for gaz-review

pub mod health;
pub mod index;
pub mod review;
pub mod sse;

pub use health::health_routes;
pub use index::index_routes;
pub use review::review_routes;
pub use sse::event_stream;
