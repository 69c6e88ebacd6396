//! Live-document parsing for playlist pages
//!
//! Selectors are configuration; the row parser and metadata prober read
//! through a [`BrowserSession`](super::browser::BrowserSession) rather than
//! a static HTML snapshot, because rows are only mounted near the viewport.

pub mod config;
pub mod metadata_prober;
pub mod track_row_parser;

// Re-export public types
pub use config::{MetadataSelectors, PageSelectors, SelectorConfig, TrackRowSelectors};
pub use metadata_prober::{MetadataProber, parse_item_count_hint};
pub use track_row_parser::TrackRowParser;
