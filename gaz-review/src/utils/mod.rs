//! Utility modules for gaz-review

pub mod pool_monitor;

pub use pool_monitor::{begin_monitored, MonitoredTransaction};
