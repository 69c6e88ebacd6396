//! Track row parser
//!
//! Turns one mounted row element into a [`TrackRecord`]. Rows are read
//! through the live session, so any of them may be unmounted while we read.
//! A failure anywhere inside a row skips that row for this iteration and
//! never propagates.

use tracing::{debug, trace};
use url::Url;

use super::config::TrackRowSelectors;
use crate::domain::track::{Performer, TrackIdentity, TrackRecord, UNKNOWN_TRACK};
use crate::infrastructure::browser::{BrowserSession, ElementHandle};
use crate::infrastructure::collection_error::SessionResult;

/// Origin used to resolve relative hrefs
const LINK_BASE: &str = "https://open.spotify.com";

/// Parser for track rows currently mounted in the list
#[derive(Debug, Clone)]
pub struct TrackRowParser {
    selectors: TrackRowSelectors,
}

impl TrackRowParser {
    pub fn new(selectors: TrackRowSelectors) -> Self {
        Self { selectors }
    }

    pub fn row_selector(&self) -> &str {
        &self.selectors.row
    }

    /// Parse a row, or `None` when it cannot be read this iteration
    pub async fn parse_row(
        &self,
        session: &dyn BrowserSession,
        row: &ElementHandle,
    ) -> Option<TrackRecord> {
        match self.read_row(session, row).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping row {}: {}", row, e);
                None
            }
        }
    }

    /// Parse every row, dropping the unreadable ones
    pub async fn parse_rows(
        &self,
        session: &dyn BrowserSession,
        rows: &[ElementHandle],
    ) -> Vec<TrackRecord> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(record) = self.parse_row(session, row).await {
                records.push(record);
            }
        }
        records
    }

    async fn read_row(
        &self,
        session: &dyn BrowserSession,
        row: &ElementHandle,
    ) -> SessionResult<TrackRecord> {
        let s = &self.selectors;
        let position = self.extract_position(session, row).await?;

        // Track link and URL
        let mut track_link = None;
        for link in session.find_elements_in(row, &s.item_link).await? {
            let href = session.attribute(&link, "href").await?.unwrap_or_default();
            if href.contains(&s.item_path_marker) {
                track_link = Some((link, href));
                break;
            }
        }

        let item_url = track_link.as_ref().map(|(_, href)| resolve_href(href));
        let track_id = item_url
            .as_deref()
            .and_then(|url| segment_after(url, &s.item_path_marker));

        // Track name: link text first, then the accessible label
        let mut title = match &track_link {
            Some((link, _)) => session.text(link).await?.trim().to_string(),
            None => String::new(),
        };
        if title.is_empty() {
            let label = session
                .attribute(row, &s.label_attribute)
                .await?
                .unwrap_or_default();
            title = title_from_label(&label, &s.label_prefix, &s.label_separator)
                .unwrap_or_default();
        }
        if title.is_empty() {
            title = UNKNOWN_TRACK.to_string();
        }

        let performers = self.extract_performers(session, row).await?;
        let (container_name, container_url) = self.extract_container(session, row).await?;

        let explicit = !session
            .find_elements_in(row, &s.explicit_badge)
            .await?
            .is_empty();

        let identity = TrackIdentity::from_parts(track_id.as_deref(), position, &title);
        trace!("Parsed row {} as {} (position {:?})", row, identity, position);

        Ok(TrackRecord {
            position,
            identity,
            title,
            performers,
            container_name,
            container_url,
            item_url,
            explicit,
        })
    }

    /// Rank from the row attribute, falling back to standalone digits in index spans
    async fn extract_position(
        &self,
        session: &dyn BrowserSession,
        row: &ElementHandle,
    ) -> SessionResult<Option<u32>> {
        let s = &self.selectors;

        if let Some(attr) = session.attribute(row, &s.position_attribute).await? {
            if let Some(position) = parse_rank(&attr) {
                return Ok(Some(position));
            }
        }

        for selector in &s.index {
            for element in session.find_elements_in(row, selector).await? {
                if let Some(position) = parse_rank(&session.text(&element).await?) {
                    return Ok(Some(position));
                }
            }
        }

        Ok(None)
    }

    async fn extract_performers(
        &self,
        session: &dyn BrowserSession,
        row: &ElementHandle,
    ) -> SessionResult<Vec<Performer>> {
        let s = &self.selectors;
        let mut performers = Vec::new();

        for link in session.find_elements_in(row, &s.performer_link).await? {
            let name = session.text(&link).await?.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let url = session
                .attribute(&link, "href")
                .await?
                .filter(|href| !href.is_empty())
                .map(|href| resolve_href(&href));
            let id = url
                .as_deref()
                .and_then(|url| segment_after(url, &s.performer_path_marker));
            performers.push(Performer { name, url, id });
        }

        if performers.is_empty() {
            performers.push(Performer::placeholder());
        }
        Ok(performers)
    }

    /// Album name and URL; link-first, text-fallback
    async fn extract_container(
        &self,
        session: &dyn BrowserSession,
        row: &ElementHandle,
    ) -> SessionResult<(Option<String>, Option<String>)> {
        let s = &self.selectors;

        for selector in &s.container {
            let Some(element) = session.find_elements_in(row, selector).await?.into_iter().next()
            else {
                continue;
            };

            let name = Some(session.text(&element).await?.trim().to_string())
                .filter(|name| !name.is_empty());
            let url = session
                .attribute(&element, "href")
                .await?
                .filter(|href| href.contains(&s.container_path_marker))
                .map(|href| resolve_href(&href));
            return Ok((name, url));
        }

        Ok((None, None))
    }
}

/// A standalone positive decimal rank
fn parse_rank(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|rank| *rank > 0)
}

/// Recover the title from a label like "Play Title by Artist"
fn title_from_label(label: &str, prefix: &str, separator: &str) -> Option<String> {
    let rest = label.strip_prefix(prefix)?;
    let title = rest.split(separator).next().unwrap_or(rest).trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Absolute URL without query string or fragment
fn resolve_href(href: &str) -> String {
    let parsed = Url::parse(href).or_else(|_| Url::parse(LINK_BASE).and_then(|base| base.join(href)));
    match parsed {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => href.split('?').next().unwrap_or(href).to_string(),
    }
}

/// Path segment following `marker`, e.g. the id after "/track/"
fn segment_after(url: &str, marker: &str) -> Option<String> {
    let (_, rest) = url.split_once(marker)?;
    let segment = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    (!segment.is_empty()).then(|| segment.to_string())
}
