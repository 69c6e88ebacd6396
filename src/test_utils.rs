//! Test utilities for playlist-collector
//!
//! [`VirtualListSession`] is an in-memory browser tab showing a virtualized
//! playlist. Only the rows near the viewport are mounted, content streams in
//! as the list nears its end, and every scroll re-renders the mounted rows so
//! handles from an earlier render go stale. Selectors are resolved against
//! the rendered HTML with `scraper`, so the collector runs its real parsing
//! and scrolling code against it.
//!
//! Failure modes can be switched on through [`VirtualListOptions`]: a
//! container that detaches every N scrolls, a direct `scrollTop` path that
//! silently does nothing, an endless list, pages without rows.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};

use crate::infrastructure::browser::{BrowserSession, ElementHandle, ScriptArg};
use crate::infrastructure::collection_error::{SessionError, SessionResult};
use crate::infrastructure::scroll_controller::{
    FOCUS_WINDOW_SCRIPT, INCREMENT_SCROLL_TOP_SCRIPT, SCROLL_BY_SCRIPT, SCROLL_METRICS_SCRIPT,
    SCROLL_TO_TOP_SCRIPT, WINDOW_SCROLL_BY_SCRIPT,
};

/// PNG signature followed by a few arbitrary bytes
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

const CONTAINER_NODE: &str = "container";
const BANNER_BUTTON_NODE: &str = "banner-accept";

/// One source row of the fixture list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureTrack {
    pub track_id: Option<String>,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub explicit: bool,
    /// Render the `aria-rowindex` attribute; otherwise only the index span carries the rank
    pub expose_rowindex: bool,
}

impl FixtureTrack {
    /// `trk00007`, "Song 7" by "Artist 7" on "Album 7"; every seventh is explicit
    pub fn numbered(n: u32) -> Self {
        Self {
            track_id: Some(format!("trk{n:05}")),
            title: format!("Song {n}"),
            artists: vec![format!("Artist {n}")],
            album: Some(format!("Album {n}")),
            explicit: n % 7 == 0,
            expose_rowindex: true,
        }
    }

    pub fn without_id(mut self) -> Self {
        self.track_id = None;
        self
    }

    pub fn without_rowindex(mut self) -> Self {
        self.expose_rowindex = false;
        self
    }
}

/// Shape and failure modes of the fixture page
#[derive(Debug, Clone)]
pub struct VirtualListOptions {
    pub row_height: u32,
    pub viewport_height: u32,
    /// Rows mounted above and below the viewport
    pub overscan: u32,
    pub initial_loaded: usize,
    pub load_batch: usize,
    pub title: String,
    pub description: Option<String>,
    pub stats_text: Option<String>,
    pub include_cover: bool,
    pub cookie_banner: bool,
    /// Direct `scrollTop` increments leave the offset unchanged
    pub direct_scroll_broken: bool,
    /// Replace the scroll container after every N container scrolls
    pub detach_container_every: Option<u32>,
    /// Generate numbered rows forever
    pub endless: bool,
    /// Wrap rows in the expected scroll container
    pub render_container: bool,
    /// Playlist ids whose page never shows any rows
    pub unavailable: HashSet<String>,
}

impl Default for VirtualListOptions {
    fn default() -> Self {
        Self {
            row_height: 56,
            viewport_height: 900,
            overscan: 8,
            initial_loaded: 30,
            load_batch: 30,
            title: "Fixture Mix".to_string(),
            description: None,
            stats_text: None,
            include_cover: true,
            cookie_banner: false,
            direct_scroll_broken: false,
            detach_container_every: None,
            endless: false,
            render_container: true,
            unavailable: HashSet::new(),
        }
    }
}

#[derive(Debug)]
struct ListState {
    loaded: usize,
    scroll_top: f64,
    window_y: f64,
    /// Bumped whenever the mounted rows change
    generation: u64,
    /// Bumped whenever the scroll container is replaced
    container_epoch: u64,
    container_scrolls: u32,
    banner_visible: bool,
    navigations: Vec<String>,
    clicks: u32,
}

/// In-memory virtualized list page implementing [`BrowserSession`]
#[derive(Debug)]
pub struct VirtualListSession {
    tracks: Vec<FixtureTrack>,
    options: VirtualListOptions,
    state: Mutex<ListState>,
}

impl VirtualListSession {
    pub fn new(tracks: Vec<FixtureTrack>) -> Self {
        Self::with_options(tracks, VirtualListOptions::default())
    }

    /// `count` numbered tracks
    pub fn numbered(count: u32, options: VirtualListOptions) -> Self {
        Self::with_options((1..=count).map(FixtureTrack::numbered).collect(), options)
    }

    pub fn endless(options: VirtualListOptions) -> Self {
        Self::with_options(
            Vec::new(),
            VirtualListOptions {
                endless: true,
                ..options
            },
        )
    }

    pub fn with_options(tracks: Vec<FixtureTrack>, options: VirtualListOptions) -> Self {
        let state = ListState {
            loaded: 0,
            scroll_top: 0.0,
            window_y: 0.0,
            generation: 0,
            container_epoch: 0,
            container_scrolls: 0,
            banner_visible: options.cookie_banner,
            navigations: Vec::new(),
            clicks: 0,
        };
        let session = Self {
            tracks,
            options,
            state: Mutex::new(state),
        };
        {
            let mut state = session.lock();
            state.loaded = session.initial_loaded();
        }
        session
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn container_epoch(&self) -> u64 {
        self.lock().container_epoch
    }

    pub fn cookie_banner_visible(&self) -> bool {
        self.lock().banner_visible
    }

    pub fn clicks(&self) -> u32 {
        self.lock().clicks
    }

    pub fn loaded_rows(&self) -> usize {
        self.lock().loaded
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        // A panicking test thread must not hide the state from the next assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn total(&self) -> Option<usize> {
        (!self.options.endless).then_some(self.tracks.len())
    }

    fn initial_loaded(&self) -> usize {
        match self.total() {
            Some(total) => self.options.initial_loaded.min(total),
            None => self.options.initial_loaded,
        }
    }

    fn track(&self, index: usize) -> FixtureTrack {
        if self.options.endless {
            FixtureTrack::numbered(index as u32 + 1)
        } else {
            self.tracks[index].clone()
        }
    }

    fn current_playlist_unavailable(&self, state: &ListState) -> bool {
        state.navigations.last().is_some_and(|url| {
            self.options
                .unavailable
                .iter()
                .any(|id| url.contains(id.as_str()))
        })
    }

    fn scroll_height(&self, state: &ListState) -> f64 {
        f64::from(self.options.row_height) * state.loaded as f64
    }

    fn max_scroll(&self, state: &ListState) -> f64 {
        (self.scroll_height(state) - f64::from(self.options.viewport_height)).max(0.0)
    }

    fn metrics(&self, state: &ListState) -> Value {
        json!({
            "scrollTop": state.scroll_top,
            "scrollHeight": self.scroll_height(state),
            "clientHeight": self.options.viewport_height,
        })
    }

    /// Move the container and stream in more rows near the end
    fn scroll_container_to(&self, state: &mut ListState, target: f64) {
        let clamped = target.clamp(0.0, self.max_scroll(state));
        if (clamped - state.scroll_top).abs() > f64::EPSILON {
            state.scroll_top = clamped;
            state.generation += 1;
        }

        let row_height = f64::from(self.options.row_height);
        let viewport_end = state.scroll_top + f64::from(self.options.viewport_height);
        let near_end = viewport_end >= self.scroll_height(state) - 2.0 * row_height;
        if near_end {
            let next = state.loaded + self.options.load_batch;
            let next = match self.total() {
                Some(total) => next.min(total),
                None => next,
            };
            if next > state.loaded {
                state.loaded = next;
                state.generation += 1;
            }
        }

        state.container_scrolls += 1;
        if let Some(every) = self.options.detach_container_every {
            if every > 0 && state.container_scrolls % every == 0 {
                state.container_epoch += 1;
            }
        }
    }

    /// Index range of the mounted rows
    fn mounted(&self, state: &ListState) -> std::ops::Range<usize> {
        let row_height = f64::from(self.options.row_height);
        let overscan = self.options.overscan as usize;
        let first = (state.scroll_top / row_height).floor() as usize;
        let last = ((state.scroll_top + f64::from(self.options.viewport_height)) / row_height).ceil()
            as usize;
        first.saturating_sub(overscan)..(last + overscan).min(state.loaded)
    }

    fn render(&self, state: &ListState) -> String {
        let o = &self.options;
        let mut html = String::with_capacity(16 * 1024);

        html.push_str(&format!(
            "<html><head><title>{} | Spotify</title></head><body data-node=\"body\">",
            escape(&o.title)
        ));
        html.push_str(&format!(
            "<h1 data-testid=\"entityTitle\" data-node=\"title\">{}</h1>",
            escape(&o.title)
        ));
        if let Some(description) = &o.description {
            html.push_str(&format!(
                "<div data-testid=\"description\" data-node=\"description\">{}</div>",
                escape(description)
            ));
        }
        if let Some(stats) = &o.stats_text {
            html.push_str(&format!(
                "<span data-testid=\"entityStats\" data-node=\"stats\">{}</span>",
                escape(stats)
            ));
        }
        if o.include_cover {
            html.push_str(
                "<div data-testid=\"entityCoverPhoto\" data-node=\"cover\">\
                 <img data-node=\"cover-img\" src=\"https://i.scdn.co/image/fixture\"></div>",
            );
        }

        if o.render_container {
            html.push_str("<div data-testid=\"playlist-tracklist\" data-node=\"container\">");
        } else {
            html.push_str("<div data-node=\"plain-list\">");
        }
        if !self.current_playlist_unavailable(state) {
            for index in self.mounted(state) {
                html.push_str(&render_row(index as u32 + 1, &self.track(index)));
            }
        }
        html.push_str("</div>");

        if state.banner_visible {
            html.push_str(
                "<div id=\"onetrust-banner-sdk\" data-node=\"banner\">\
                 <button id=\"onetrust-accept-btn-handler\" data-node=\"banner-accept\">Accept cookies</button></div>",
            );
        }

        html.push_str("</body></html>");
        html
    }

    /// Stamp a node's handle carries; rows live and die with the render generation
    fn stamp(state: &ListState, node: &str) -> u64 {
        if node.starts_with("row") {
            state.generation
        } else if node == CONTAINER_NODE {
            state.container_epoch
        } else {
            0
        }
    }

    fn handle_for(state: &ListState, node: &str) -> ElementHandle {
        ElementHandle::new(format!("{node}@{}", Self::stamp(state, node)))
    }

    /// Node name of a handle that is still attached to the current render
    fn live_node<'h>(state: &ListState, handle: &'h ElementHandle) -> SessionResult<&'h str> {
        let (node, stamp) = handle
            .id()
            .rsplit_once('@')
            .ok_or_else(|| SessionError::stale(handle.id()))?;
        match stamp.parse::<u64>() {
            Ok(stamp) if stamp == Self::stamp(state, node) => Ok(node),
            _ => Err(SessionError::stale(handle.id())),
        }
    }

    /// Run `read` against the element behind `handle` in a fresh render
    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        read: impl FnOnce(ElementRef<'_>) -> T,
    ) -> SessionResult<T> {
        let state = self.lock();
        let node = Self::live_node(&state, handle)?;
        let document = Html::parse_document(&self.render(&state));
        let selector = compile(&format!("[data-node=\"{node}\"]"))?;
        document
            .select(&selector)
            .next()
            .map(read)
            .ok_or_else(|| SessionError::stale(handle.id()))
    }

    fn select_handles(
        &self,
        parent: Option<&ElementHandle>,
        selector: &str,
    ) -> SessionResult<Vec<ElementHandle>> {
        let compiled = compile(selector)?;
        let state = self.lock();
        let document = Html::parse_document(&self.render(&state));

        let nodes: Vec<String> = match parent {
            None => document
                .select(&compiled)
                .filter_map(|el| el.value().attr("data-node").map(str::to_string))
                .collect(),
            Some(parent) => {
                let node = Self::live_node(&state, parent)?;
                let parent_selector = compile(&format!("[data-node=\"{node}\"]"))?;
                let root = document
                    .select(&parent_selector)
                    .next()
                    .ok_or_else(|| SessionError::stale(parent.id()))?;
                root.select(&compiled)
                    .filter_map(|el| el.value().attr("data-node").map(str::to_string))
                    .collect()
            }
        };

        Ok(nodes.iter().map(|node| Self::handle_for(&state, node)).collect())
    }

    fn container_arg(&self, state: &ListState, args: &[ScriptArg]) -> SessionResult<()> {
        match args.first() {
            Some(ScriptArg::Element(handle)) => {
                let node = Self::live_node(state, handle)?;
                if node == CONTAINER_NODE {
                    Ok(())
                } else {
                    Err(SessionError::script(format!("{node} is not scrollable")))
                }
            }
            _ => Err(SessionError::script("missing element argument")),
        }
    }

    fn number_arg(args: &[ScriptArg], index: usize) -> SessionResult<f64> {
        match args.get(index) {
            Some(ScriptArg::Number(value)) => Ok(*value),
            _ => Err(SessionError::script(format!("missing numeric argument {index}"))),
        }
    }
}

#[async_trait]
impl BrowserSession for VirtualListSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        let initial = self.initial_loaded();
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        state.loaded = initial;
        state.scroll_top = 0.0;
        state.window_y = 0.0;
        state.generation += 1;
        state.container_epoch += 1;
        Ok(())
    }

    async fn current_url(&self) -> SessionResult<String> {
        Ok(self.lock().navigations.last().cloned().unwrap_or_default())
    }

    async fn title(&self) -> SessionResult<String> {
        Ok(format!("{} | Spotify", self.options.title))
    }

    async fn find_elements(&self, selector: &str) -> SessionResult<Vec<ElementHandle>> {
        self.select_handles(None, selector)
    }

    async fn find_elements_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> SessionResult<Vec<ElementHandle>> {
        self.select_handles(Some(parent), selector)
    }

    async fn text(&self, element: &ElementHandle) -> SessionResult<String> {
        self.with_element(element, |el| el.text().collect::<String>())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>> {
        self.with_element(element, |el| el.value().attr(name).map(str::to_string))
    }

    async fn screenshot_png(&self, element: &ElementHandle) -> SessionResult<Vec<u8>> {
        self.with_element(element, |_| FAKE_PNG.to_vec())
    }

    async fn click(&self, element: &ElementHandle) -> SessionResult<()> {
        self.with_element(element, |_| ())?;
        let mut state = self.lock();
        state.clicks += 1;
        if element.id().starts_with(BANNER_BUTTON_NODE) {
            state.banner_visible = false;
        }
        Ok(())
    }

    async fn move_and_click(&self, element: &ElementHandle) -> SessionResult<()> {
        self.with_element(element, |_| ())?;
        self.lock().clicks += 1;
        Ok(())
    }

    async fn execute_script(&self, script: &str, args: &[ScriptArg]) -> SessionResult<Value> {
        let mut state = self.lock();
        match script {
            FOCUS_WINDOW_SCRIPT => Ok(Value::Null),
            SCROLL_METRICS_SCRIPT => {
                self.container_arg(&state, args)?;
                Ok(self.metrics(&state))
            }
            SCROLL_TO_TOP_SCRIPT => {
                self.container_arg(&state, args)?;
                if state.scroll_top != 0.0 {
                    state.scroll_top = 0.0;
                    state.generation += 1;
                }
                Ok(Value::Null)
            }
            INCREMENT_SCROLL_TOP_SCRIPT => {
                self.container_arg(&state, args)?;
                let amount = Self::number_arg(args, 1)?;
                if !self.options.direct_scroll_broken {
                    let target = state.scroll_top + amount;
                    self.scroll_container_to(&mut state, target);
                }
                Ok(json!(state.scroll_top))
            }
            SCROLL_BY_SCRIPT => {
                self.container_arg(&state, args)?;
                let amount = Self::number_arg(args, 1)?;
                let target = state.scroll_top + amount;
                self.scroll_container_to(&mut state, target);
                Ok(Value::Null)
            }
            WINDOW_SCROLL_BY_SCRIPT => {
                // The page itself does not scroll; only the container does
                state.window_y += Self::number_arg(args, 0)?;
                Ok(Value::Null)
            }
            other => Err(SessionError::Unsupported {
                operation: format!("script: {other}"),
            }),
        }
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> SessionResult<()> {
        if !self.select_handles(None, selector)?.is_empty() {
            return Ok(());
        }
        // Nothing else can change the fixture while we wait
        tokio::time::sleep(timeout).await;
        Err(SessionError::Timeout {
            selector: selector.to_string(),
            waited_ms: timeout.as_millis() as u64,
        })
    }
}

fn compile(selector: &str) -> SessionResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| SessionError::script(format!("invalid selector '{selector}': {e:?}")))
}

fn render_row(position: u32, track: &FixtureTrack) -> String {
    let node = format!("row{position}");
    let lead_artist = track.artists.first().map_or("", String::as_str);
    let mut row = format!(
        "<div role=\"row\" data-testid=\"tracklist-row\" data-node=\"{node}\" aria-label=\"Play {} by {}\"",
        escape(&track.title),
        escape(lead_artist)
    );
    if track.expose_rowindex {
        row.push_str(&format!(" aria-rowindex=\"{position}\""));
    }
    row.push('>');

    row.push_str(&format!(
        "<span data-testid=\"tracklist-row-index\" data-node=\"{node}-index\">{position}</span>"
    ));
    if let Some(id) = &track.track_id {
        row.push_str(&format!(
            "<a href=\"https://open.spotify.com/track/{id}?si=fixture\" data-node=\"{node}-title\">{}</a>",
            escape(&track.title)
        ));
    } else {
        row.push_str(&format!(
            "<div data-node=\"{node}-title\">{}</div>",
            escape(&track.title)
        ));
    }
    if track.explicit {
        row.push_str(&format!(
            "<span aria-label=\"Explicit\" data-node=\"{node}-explicit\">E</span>"
        ));
    }
    for (i, artist) in track.artists.iter().enumerate() {
        row.push_str(&format!(
            "<a href=\"/artist/{}\" data-node=\"{node}-artist{i}\">{}</a>",
            slug(artist),
            escape(artist)
        ));
    }
    if let Some(album) = &track.album {
        row.push_str(&format!(
            "<a href=\"https://open.spotify.com/album/{}?si=fixture\" data-node=\"{node}-album\">{}</a>",
            slug(album),
            escape(album)
        ));
    }

    row.push_str("</div>");
    row
}

fn slug(text: &str) -> String {
    text.to_lowercase().replace(' ', "-")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_rows_near_the_viewport_are_mounted() {
        let session = VirtualListSession::numbered(100, VirtualListOptions::default());
        let rows = session
            .find_elements(r#"[data-testid="tracklist-row"]"#)
            .await
            .unwrap();
        // ceil(900 / 56) = 17 visible plus 8 overscan below
        assert_eq!(rows.len(), 25);
        assert_eq!(session.loaded_rows(), 30);
    }

    #[tokio::test]
    async fn scrolling_streams_rows_and_stales_old_handles() {
        let session = VirtualListSession::numbered(100, VirtualListOptions::default());
        let container = session
            .find_element(r#"div[data-testid="playlist-tracklist"]"#)
            .await
            .unwrap();
        let first_row = session
            .find_element(r#"[data-testid="tracklist-row"]"#)
            .await
            .unwrap();

        session
            .execute_script(SCROLL_BY_SCRIPT, &[(&container).into(), ScriptArg::Number(1_000.0)])
            .await
            .unwrap();

        assert!(session.text(&first_row).await.unwrap_err().is_stale());
        assert_eq!(session.loaded_rows(), 60);

        // Clamped to the extent before the next batch streamed in
        let metrics = session
            .execute_script(SCROLL_METRICS_SCRIPT, &[(&container).into()])
            .await
            .unwrap();
        assert_eq!(metrics["scrollTop"], 780.0);
        assert_eq!(metrics["scrollHeight"], 3_360.0);
    }

    #[tokio::test]
    async fn rows_expose_links_and_labels() {
        let session = VirtualListSession::numbered(10, VirtualListOptions::default());
        let row = session
            .find_element(r#"[data-testid="tracklist-row"]"#)
            .await
            .unwrap();

        assert_eq!(
            session.attribute(&row, "aria-label").await.unwrap().as_deref(),
            Some("Play Song 1 by Artist 1")
        );
        let link = session.find_element_in(&row, r#"a[href*="/track/"]"#).await.unwrap();
        assert_eq!(session.text(&link).await.unwrap(), "Song 1");
    }

    #[tokio::test]
    async fn detached_container_goes_stale() {
        let options = VirtualListOptions {
            detach_container_every: Some(1),
            ..VirtualListOptions::default()
        };
        let session = VirtualListSession::numbered(100, options);
        let container = session
            .find_element(r#"div[data-testid="playlist-tracklist"]"#)
            .await
            .unwrap();

        session
            .execute_script(SCROLL_BY_SCRIPT, &[(&container).into(), ScriptArg::Number(100.0)])
            .await
            .unwrap();

        let err = session
            .execute_script(SCROLL_METRICS_SCRIPT, &[(&container).into()])
            .await
            .unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out_without_match() {
        let session = VirtualListSession::numbered(5, VirtualListOptions::default());
        let err = session
            .wait_for("#missing", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { waited_ms: 2_000, .. }));
    }
}
