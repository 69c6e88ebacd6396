//! Playlist Collector - progressive-scroll collection of virtualized track lists
//!
//! Drives a remote browser session through a playlist page whose list only
//! mounts the rows near the viewport, and reconciles the partial views into
//! one ordered, duplicate-free track sequence.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the collection entry points
pub use application::{BatchReport, PlaylistCollector};
pub use domain::{CollectedTrack, CollectionResult, OutputRecord, PlaylistReference, StopReason};
pub use infrastructure::{BrowserSession, CollectionError, CollectorConfig};
