//! Connection pool monitoring utilities
//!
//! Review batches hold a write transaction while they call the document
//! index, so slow index calls show up as long-held connections. These
//! wrappers log acquisition wait and hold time for every batch transaction.

use gaz_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

const SLOW_ACQUIRE_MS: u128 = 1000;
const LONG_HOLD_MS: u128 = 2000;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection of the open transaction
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        let caller = self.caller;
        self.tx.as_mut().map(|tx| &mut **tx).ok_or_else(|| consumed(caller))
    }

    pub async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| consumed(self.caller))?;
        tx.commit().await?;
        log_release(self.caller, self.acquired_at, "commit");
        Ok(())
    }
}

fn consumed(caller: &'static str) -> Error {
    Error::Internal(format!("{}: transaction already consumed", caller))
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        // Still open: sqlx rolls it back on drop
        if self.tx.is_some() {
            log_release(self.caller, self.acquired_at, "drop");
        }
    }
}

fn log_release(caller: &'static str, acquired_at: Instant, how: &'static str) {
    let held_ms = acquired_at.elapsed().as_millis();
    if held_ms > LONG_HOLD_MS {
        tracing::warn!(
            caller,
            held_ms,
            how,
            "LONG TRANSACTION - write lock held for extended period"
        );
    } else {
        tracing::debug!(caller, held_ms, how, "Connection released");
    }
}

/// Begin a monitored transaction
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "decision_processor::apply").await?;
/// db::hits::mark_reviewed(tx.conn()?, &ids).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    tracing::debug!(caller, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > SLOW_ACQUIRE_MS {
        tracing::warn!(
            caller,
            wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated"
        );
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
