//! Selector configuration for playlist pages
//!
//! Centralized configuration for CSS selectors. Every list is an ordered
//! fallback chain: the first selector that yields something wins.

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::infrastructure::collection_error::{CollectResult, CollectionError};

/// Main selector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub track_row: TrackRowSelectors,
    pub metadata: MetadataSelectors,
    pub page: PageSelectors,
}

impl SelectorConfig {
    /// Check every selector compiles as CSS
    pub fn validate(&self) -> CollectResult<()> {
        self.all_selectors()
            .into_iter()
            .try_for_each(|selector| compile(selector).map(|_| ()))
    }

    fn all_selectors(&self) -> Vec<&str> {
        let rows = &self.track_row;
        let meta = &self.metadata;
        let page = &self.page;

        std::iter::once(rows.row.as_str())
            .chain(rows.index.iter().map(String::as_str))
            .chain(std::iter::once(rows.item_link.as_str()))
            .chain(std::iter::once(rows.performer_link.as_str()))
            .chain(rows.container.iter().map(String::as_str))
            .chain(std::iter::once(rows.explicit_badge.as_str()))
            .chain(meta.title.iter().map(String::as_str))
            .chain(meta.description.iter().map(String::as_str))
            .chain(meta.stats.iter().map(String::as_str))
            .chain(std::iter::once(meta.cover_primary.as_str()))
            .chain(meta.cover_fallbacks.iter().map(String::as_str))
            .chain(page.scroll_container.iter().map(String::as_str))
            .chain(page.cookie_banner.iter().map(String::as_str))
            .collect()
    }
}

fn compile(selector: &str) -> CollectResult<Selector> {
    Selector::parse(selector).map_err(|e| CollectionError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Selectors applied inside one track row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRowSelectors {
    /// Every mounted row
    pub row: String,

    /// Row attribute holding the 1-based rank
    pub position_attribute: String,

    /// Index spans scanned when the attribute is missing
    pub index: Vec<String>,

    /// Link to the individual track
    pub item_link: String,

    /// Path marker that identifies a track URL
    pub item_path_marker: String,

    pub performer_link: String,

    pub performer_path_marker: String,

    /// Album link first, then plain text
    pub container: Vec<String>,

    pub container_path_marker: String,

    pub explicit_badge: String,

    /// Row attribute read when the track link is missing
    pub label_attribute: String,

    /// Prefix of the accessible label, e.g. "Play "
    pub label_prefix: String,

    /// Separator between title and performers in the label, e.g. " by "
    pub label_separator: String,
}

impl Default for TrackRowSelectors {
    fn default() -> Self {
        Self {
            row: r#"[data-testid="tracklist-row"]"#.to_string(),
            position_attribute: "aria-rowindex".to_string(),
            index: vec![
                r#"[data-testid="tracklist-row-index"]"#.to_string(),
                r#"span[data-testid="index"]"#.to_string(),
                "span".to_string(),
            ],
            item_link: r#"a[href*="/track/"]"#.to_string(),
            item_path_marker: "/track/".to_string(),
            performer_link: r#"a[href*="/artist/"]"#.to_string(),
            performer_path_marker: "/artist/".to_string(),
            container: vec![
                r#"a[href*="/album/"]"#.to_string(),
                r#"[data-testid="tracklist-row-album-name"]"#.to_string(),
            ],
            container_path_marker: "/album/".to_string(),
            explicit_badge: r#"span[aria-label="Explicit"]"#.to_string(),
            label_attribute: "aria-label".to_string(),
            label_prefix: "Play ".to_string(),
            label_separator: " by ".to_string(),
        }
    }
}

/// Page-level metadata selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSelectors {
    pub title: Vec<String>,
    pub description: Vec<String>,
    /// Text snippet carrying the "N songs" hint
    pub stats: Vec<String>,
    pub cover_primary: String,
    pub cover_fallbacks: Vec<String>,
}

impl Default for MetadataSelectors {
    fn default() -> Self {
        Self {
            title: vec![
                r#"[data-testid="entityTitle"]"#.to_string(),
                r#"h1[class*="Title"]"#.to_string(),
                r#"h1[data-encore-id="type"]"#.to_string(),
            ],
            description: vec![
                r#"[data-testid="entityDescription"]"#.to_string(),
                r#"[data-testid="entityDescription"] span"#.to_string(),
                r#"div[data-testid="description"]"#.to_string(),
            ],
            stats: vec![
                r#"[data-testid="followers-count"]"#.to_string(),
                r#"[data-testid="entityStats"]"#.to_string(),
                r#"span[class*="Stat"]"#.to_string(),
            ],
            cover_primary: r#"div[data-testid="entityCoverPhoto"]"#.to_string(),
            cover_fallbacks: vec![
                r#"div[data-testid="entityCoverPhoto"]"#.to_string(),
                r#"div[data-testid="cover-art"]"#.to_string(),
                r#"img[data-testid="entityCoverPhoto"]"#.to_string(),
            ],
        }
    }
}

/// Selectors for page furniture around the list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    /// Scroll container candidates, most specific first
    pub scroll_container: Vec<String>,
    pub cookie_banner: Vec<String>,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            scroll_container: vec![
                r#"div[data-testid="playlist-tracklist"]"#.to_string(),
                r#"div[data-testid="scroll-wrapper"]"#.to_string(),
                "div[data-overlayscrollbars-viewport]".to_string(),
            ],
            cookie_banner: vec![
                r#"button[id="onetrust-accept-btn-handler"]"#.to_string(),
                r#"button[data-testid="cookie-banner-accept-button"]"#.to_string(),
                r#"button[data-testid="consent-accept-button"]"#.to_string(),
            ],
        }
    }
}
