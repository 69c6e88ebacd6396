use std::fmt;

use serde::{Deserialize, Serialize};

/// Title used when neither the track link nor the row label yields one
pub const UNKNOWN_TRACK: &str = "Unknown Track";

/// Performer name used when a row carries no artist link
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// An artist (or author) credited on a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub name: String,
    pub url: Option<String>,
    pub id: Option<String>,
}

impl Performer {
    pub fn placeholder() -> Self {
        Self {
            name: UNKNOWN_ARTIST.to_string(),
            url: None,
            id: None,
        }
    }
}

/// Identity used to collapse the same row seen across scroll iterations
///
/// `Identified` carries the id parsed from the track link. `Positional` is
/// the weaker fallback built from the rank and the title, so the same title
/// re-read at the same rank collapses to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackIdentity {
    Identified(String),
    Positional { position: Option<u32>, title: String },
}

impl TrackIdentity {
    pub fn from_parts(track_id: Option<&str>, position: Option<u32>, title: &str) -> Self {
        match track_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::Identified(id.to_string()),
            None => Self::Positional {
                position,
                title: title.to_string(),
            },
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, Self::Identified(_))
    }

    /// Key used for deduplication
    /// Format: the stable id, or "NNNN|title" (4-digit zero padded rank)
    pub fn key(&self) -> String {
        match self {
            Self::Identified(id) => id.clone(),
            Self::Positional {
                position: Some(position),
                title,
            } => format!("{position:04}|{title}"),
            Self::Positional {
                position: None,
                title,
            } => title.clone(),
        }
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One row as read from the live document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    /// 1-based rank read from the row, if readable
    pub position: Option<u32>,
    pub identity: TrackIdentity,
    pub title: String,
    /// Never empty; a placeholder performer is synthesized when needed
    pub performers: Vec<Performer>,
    pub container_name: Option<String>,
    pub container_url: Option<String>,
    pub item_url: Option<String>,
    pub explicit: bool,
}

impl TrackRecord {
    pub fn track_id(&self) -> Option<&str> {
        match &self.identity {
            TrackIdentity::Identified(id) => Some(id),
            TrackIdentity::Positional { .. } => None,
        }
    }

    pub fn has_stable_id(&self) -> bool {
        self.identity.is_identified()
    }

    /// Position usable as a map key (present and non-zero)
    pub fn valid_position(&self) -> Option<u32> {
        self.position.filter(|p| *p > 0)
    }

    /// Comma separated performer names
    pub fn performer_names(&self) -> String {
        self.performers
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
