//! Event system for the gazetteer services
//!
//! Provides the shared event definitions and the `EventBus` used to hand
//! structured notifications (cluster created, merge performed, removal
//! completed, ...) to external notifiers.

mod review_types;

pub use review_types::{RootPromotion, ReviewOutcomeKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Gazetteer event types
///
/// Events are broadcast via `EventBus` and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GazEvent {
    /// A record with no accepted canonical match became a new cluster root
    ClusterCreated {
        dataset: String,
        record_id: i64,
        cluster_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A record joined an existing cluster as a member
    RecordAttached {
        dataset: String,
        record_id: i64,
        cluster_id: i64,
        root_record_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A record matched several clusters; losers were folded into the winner
    ClustersMerged {
        dataset: String,
        record_id: i64,
        winner_cluster_id: i64,
        loser_cluster_ids: Vec<i64>,
        /// Former children of the losers now pointing at the winner
        reassigned: Vec<i64>,
        timestamp: DateTime<Utc>,
    },

    /// Records were withdrawn from the index
    RecordsRemoved {
        authority: String,
        removed: usize,
        documents_deleted: usize,
        promotions: Vec<RootPromotion>,
        timestamp: DateTime<Utc>,
    },

    /// A reviewer's decision batch was applied
    DecisionApplied {
        dataset_id: i64,
        record_id: i64,
        authority: String,
        /// Distinct matcher tasks of the decided hits
        task_ids: Vec<String>,
        outcome: ReviewOutcomeKind,
        timestamp: DateTime<Utc>,
    },

    /// A decision batch was rolled back
    DecisionUndone {
        record_id: i64,
        authority: String,
        task_id: String,
        facts_removed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl GazEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            GazEvent::ClusterCreated { .. } => "ClusterCreated",
            GazEvent::RecordAttached { .. } => "RecordAttached",
            GazEvent::ClustersMerged { .. } => "ClustersMerged",
            GazEvent::RecordsRemoved { .. } => "RecordsRemoved",
            GazEvent::DecisionApplied { .. } => "DecisionApplied",
            GazEvent::DecisionUndone { .. } => "DecisionUndone",
        }
    }

    /// True for events describing a change to the document index
    pub fn is_index_event(&self) -> bool {
        matches!(
            self,
            GazEvent::ClusterCreated { .. }
                | GazEvent::RecordAttached { .. }
                | GazEvent::ClustersMerged { .. }
                | GazEvent::RecordsRemoved { .. }
        )
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use gaz_common::events::{EventBus, GazEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GazEvent::ClusterCreated {
///     dataset: "pleiades".to_string(),
///     record_id: 42,
///     cluster_id: 7,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GazEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GazEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GazEvent,
    ) -> Result<usize, broadcast::error::SendError<GazEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GazEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
