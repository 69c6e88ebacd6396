//! Application layer module
//!
//! The collection loop and the reconciliation policy that decides when it
//! stops.

pub mod playlist_collector;
pub mod reconciler;

pub use playlist_collector::{BatchReport, PlaylistCollector, PlaylistOutcome, PlaylistSummary};
pub use reconciler::{BottomState, ConvergencePolicy, MergeOutcome, Reconciler, StepAdjustment, Verdict};
