use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::infrastructure::collection_error::{CollectResult, CollectionError};

/// Base path prefixed to bare playlist ids
pub const PLAYLIST_BASE_URL: &str = "https://open.spotify.com/playlist/";

/// A playlist reference normalized to its canonical URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistReference {
    /// The reference as given by the caller (id or URL)
    pub raw: String,
    pub url: String,
}

impl PlaylistReference {
    /// Normalize an opaque id or full URL
    ///
    /// URLs lose their query string; bare ids are prefixed with
    /// [`PLAYLIST_BASE_URL`].
    pub fn parse(reference: &str) -> CollectResult<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(CollectionError::InvalidReference {
                reference: reference.to_string(),
            });
        }

        let url = if trimmed.starts_with("http") {
            let without_query = trimmed.split('?').next().unwrap_or(trimmed);
            url::Url::parse(without_query).map_err(|_| CollectionError::InvalidReference {
                reference: reference.to_string(),
            })?;
            without_query.to_string()
        } else {
            format!("{PLAYLIST_BASE_URL}{trimmed}")
        };

        Ok(Self {
            raw: trimmed.to_string(),
            url,
        })
    }

    /// Id segment of the canonical URL
    pub fn playlist_id(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.raw)
    }
}

/// Page-level hints read once per collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistMetadata {
    pub playlist_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub url: String,
    /// Parsed from phrasings like "50 songs"
    pub item_count_hint: Option<u32>,
    /// PNG screenshot of the cover container
    pub cover_image: Option<Vec<u8>>,
}

impl PlaylistMetadata {
    /// Cover as a `data:image/png;base64,...` URI for embedding
    pub fn cover_data_uri(&self) -> Option<String> {
        self.cover_image
            .as_ref()
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }
}
