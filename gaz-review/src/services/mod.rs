//! Review and consolidation services
//!
//! Each service owns a pool handle and opens its own monitored transaction;
//! index writes go through the shared [`IndexStore`](crate::index::IndexStore).

pub mod augmentation_writer;
pub mod consolidation;
pub mod decision_processor;
pub mod index_plan;
pub mod integrity;
pub mod pass_controller;
pub mod removal;
pub mod undo;

pub use augmentation_writer::AugmentReport;
pub use consolidation::{ConsolidationEngine, ConsolidationOutcome, ConsolidationReport};
pub use decision_processor::{DecisionOutcome, DecisionProcessor};
pub use index_plan::MergeStep;
pub use integrity::{audit_dataset, IntegrityReport, Violation};
pub use pass_controller::{NextUnit, PassController, PassCount, PassPosition, PassProgress, ReviewUnit};
pub use removal::{RemovalReport, RemovalService};
pub use undo::{UndoHandler, UndoReport};
