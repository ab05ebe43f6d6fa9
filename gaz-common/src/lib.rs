//! # Gazetteer Common Library
//!
//! Shared code for the gazetteer services:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Database initialization (core place tables) and migrations
//! - Event types (`GazEvent`) and `EventBus`
//! - SSE helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
