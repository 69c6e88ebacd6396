//! Domain module - records, identities and collection results
//!
//! Plain data shared by the parsing, scrolling and reconciliation layers.

pub mod collection;
pub mod playlist;
pub mod track;

// Re-export commonly used items
pub use collection::{CollectedTrack, CollectionResult, CollectionStats, OutputRecord, StopReason};
pub use playlist::{PlaylistMetadata, PlaylistReference};
pub use track::{Performer, TrackIdentity, TrackRecord};
