//! Playlist metadata prober
//!
//! Reads page-level hints once per collection: display name, description,
//! the "N songs" count hint and a screenshot of the cover.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::config::MetadataSelectors;
use crate::domain::playlist::{PlaylistMetadata, PlaylistReference};
use crate::infrastructure::browser::{BrowserSession, first_text};

lazy_static! {
    /// Known phrasings of the item count, tried in order
    static ref COUNT_PATTERNS: Vec<Regex> = [
        r"(\d[\d,]*)\s+songs?\b",
        r"(\d[\d,]*)\s+tracks?\b",
        r"(\d[\d,]*)\s+items?\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect();
}

/// Extract the item count from a stats snippet like "Spotify • 50 songs, 2 hr"
pub fn parse_item_count_hint(stats_text: &str) -> Option<u32> {
    let lowered = stats_text.to_lowercase();
    COUNT_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(&lowered)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse().ok())
    })
}

#[derive(Debug, Clone)]
pub struct MetadataProber {
    selectors: MetadataSelectors,
    cover_wait: Duration,
}

impl MetadataProber {
    pub fn new(selectors: MetadataSelectors, cover_wait: Duration) -> Self {
        Self {
            selectors,
            cover_wait,
        }
    }

    /// Read-only probe of the loaded page
    pub async fn probe(
        &self,
        session: &dyn BrowserSession,
        reference: &PlaylistReference,
    ) -> PlaylistMetadata {
        let playlist_id = reference.playlist_id().to_string();

        let display_name = first_text(session, &self.selectors.title)
            .await
            .unwrap_or_else(|| playlist_id.clone());
        let description = first_text(session, &self.selectors.description).await;

        let item_count_hint = match first_text(session, &self.selectors.stats).await {
            Some(stats) => {
                let hint = parse_item_count_hint(&stats);
                debug!("Stats text {:?} -> count hint {:?}", stats, hint);
                hint
            }
            None => None,
        };

        let cover_image = self.capture_cover(session).await;

        PlaylistMetadata {
            playlist_id,
            display_name,
            description,
            url: reference.url.clone(),
            item_count_hint,
            cover_image,
        }
    }

    /// Screenshot the cover container; failure yields no image
    async fn capture_cover(&self, session: &dyn BrowserSession) -> Option<Vec<u8>> {
        let primary = &self.selectors.cover_primary;
        match session.wait_for(primary, self.cover_wait).await {
            Ok(()) => {
                if let Some(bytes) = screenshot_first(session, primary).await {
                    debug!("Screenshot taken of playlist cover ({} bytes)", bytes.len());
                    return Some(bytes);
                }
            }
            Err(e) => debug!("Could not find cover container: {}", e),
        }

        for selector in &self.selectors.cover_fallbacks {
            if let Some(bytes) = screenshot_first(session, selector).await {
                debug!("Screenshot taken via fallback selector {}", selector);
                return Some(bytes);
            }
        }

        debug!("No playlist cover captured");
        None
    }
}

async fn screenshot_first(session: &dyn BrowserSession, selector: &str) -> Option<Vec<u8>> {
    let element = session.find_element(selector).await.ok()?;
    session
        .screenshot_png(&element)
        .await
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FAKE_PNG, VirtualListOptions, VirtualListSession};
    use rstest::rstest;

    #[rstest]
    #[case("Spotify • 50 songs, about 2 hr 45 min", Some(50))]
    #[case("100 Tracks", Some(100))]
    #[case("1,250 songs", Some(1250))]
    #[case("12 items", Some(12))]
    #[case("1 song", Some(1))]
    #[case("3,401,122 likes", None)]
    #[case("", None)]
    fn count_hint_phrasings(#[case] text: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_item_count_hint(text), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_the_loaded_page() {
        let session = VirtualListSession::numbered(
            5,
            VirtualListOptions {
                stats_text: Some("Playlist • 1,204 songs, 71 hr".to_string()),
                description: Some("Fresh picks".to_string()),
                ..VirtualListOptions::default()
            },
        );
        let prober = MetadataProber::new(MetadataSelectors::default(), Duration::from_secs(5));
        let reference = PlaylistReference::parse("abc123").unwrap();

        let metadata = prober.probe(&session, &reference).await;

        assert_eq!(metadata.playlist_id, "abc123");
        assert_eq!(metadata.display_name, "Fixture Mix");
        assert_eq!(metadata.description.as_deref(), Some("Fresh picks"));
        assert_eq!(metadata.item_count_hint, Some(1204));
        assert_eq!(metadata.cover_image.as_deref(), Some(FAKE_PNG));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_cover_is_not_an_error() {
        let session = VirtualListSession::numbered(
            5,
            VirtualListOptions {
                include_cover: false,
                ..VirtualListOptions::default()
            },
        );
        let prober = MetadataProber::new(MetadataSelectors::default(), Duration::from_secs(5));
        let reference = PlaylistReference::parse("abc123").unwrap();

        let metadata = prober.probe(&session, &reference).await;

        assert_eq!(metadata.cover_image, None);
        assert_eq!(metadata.item_count_hint, None);
    }
}
