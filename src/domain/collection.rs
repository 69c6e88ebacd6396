use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::playlist::PlaylistMetadata;
use super::track::{Performer, TrackRecord};

/// A record in the final sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedTrack {
    /// Sequential 1..N rank after reconciliation
    pub position: u32,
    /// Rank as read from the page, kept for diagnostics
    pub original_position: Option<u32>,
    pub record: TrackRecord,
}

/// Why the scroll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TimeCeiling,
    AttemptCeiling,
    /// Convergence target reached and the grace iterations ran out
    TargetReached,
    /// Every position 1..=target of a default-size list has been seen
    TargetFullyCollected,
    StagnantAtBottom,
    /// At bottom and the scroll extent stopped growing
    TrueBottom,
}

impl StopReason {
    pub fn is_ceiling(self) -> bool {
        matches!(self, Self::TimeCeiling | Self::AttemptCeiling)
    }
}

/// Counters reported with every result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub iterations: u32,
    pub elapsed: Duration,
    /// Rows accepted by the reconciler before finalization
    pub merged_rows: usize,
    pub with_position: usize,
    pub without_position: usize,
    pub highest_position: u32,
    pub target: u32,
    /// Records dropped by the exact-size trim
    pub trimmed: usize,
    pub container_relocations: u32,
}

/// Final ordered, duplicate-free sequence for one playlist
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub metadata: PlaylistMetadata,
    pub tracks: Vec<CollectedTrack>,
    pub stop_reason: StopReason,
    pub stats: CollectionStats,
}

impl CollectionResult {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Records in the shape handed to the enrichment and report stages
    pub fn to_output_records(&self) -> Vec<OutputRecord> {
        let playlist_image = self.metadata.cover_data_uri();
        self.tracks
            .iter()
            .map(|track| {
                OutputRecord::from_collected(track, &self.metadata.display_name, playlist_image.clone())
            })
            .collect()
    }
}

/// Output record schema consumed by the enrichment and report stages
///
/// `duration_ms`, `popularity` and `preview_url` are placeholders that the
/// enrichment stage fills in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_position: Option<u32>,
    pub identity_key: String,
    pub title: String,
    pub performers: Vec<Performer>,
    pub container_name: Option<String>,
    pub container_url: Option<String>,
    pub item_url: Option<String>,
    pub flag: bool,
    pub duration_ms: Option<u64>,
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preview_url: Option<String>,
    pub playlist: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub playlist_image: Option<String>,
}

impl OutputRecord {
    pub fn from_collected(
        track: &CollectedTrack,
        playlist: &str,
        playlist_image: Option<String>,
    ) -> Self {
        let record = &track.record;
        Self {
            position: track.position,
            original_position: track.original_position,
            identity_key: record.identity.key(),
            title: record.title.clone(),
            performers: record.performers.clone(),
            container_name: record.container_name.clone(),
            container_url: record.container_url.clone(),
            item_url: record.item_url.clone(),
            flag: record.explicit,
            duration_ms: None,
            popularity: None,
            preview_url: None,
            playlist: playlist.to_string(),
            playlist_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::track::TrackIdentity;

    #[test]
    fn output_record_uses_schema_keys() {
        let track = CollectedTrack {
            position: 1,
            original_position: Some(4),
            record: TrackRecord {
                position: Some(4),
                identity: TrackIdentity::Identified("abc".into()),
                title: "Song".into(),
                performers: vec![Performer::placeholder()],
                container_name: Some("Album".into()),
                container_url: None,
                item_url: Some("https://open.spotify.com/track/abc".into()),
                explicit: true,
            },
        };

        let value = serde_json::to_value(OutputRecord::from_collected(&track, "Top 50", None)).unwrap();
        assert_eq!(value["position"], 1);
        assert_eq!(value["originalPosition"], 4);
        assert_eq!(value["identityKey"], "abc");
        assert_eq!(value["flag"], true);
        assert!(value["durationMs"].is_null());
        assert!(value["popularity"].is_null());
        assert!(value.get("previewUrl").is_none());
        assert!(value.get("playlistImage").is_none());
        assert_eq!(value["performers"][0]["name"], "Unknown Artist");
    }
}
