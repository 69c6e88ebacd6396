//! Scroll controller for virtualized track lists
//!
//! Owns the scroll container reference and advances it step by step. The
//! container can be swapped out by the page at any time, so every
//! measurement is taken fresh and a stale container is re-located rather
//! than treated as fatal.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::browser::{BrowserSession, ElementHandle, ScriptArg};
use super::collection_error::{CollectResult, CollectionError, SessionError, SessionResult};

pub const FOCUS_WINDOW_SCRIPT: &str = "window.focus();";

pub const SCROLL_METRICS_SCRIPT: &str = "const el = arguments[0]; \
     return { scrollTop: el.scrollTop, scrollHeight: el.scrollHeight, clientHeight: el.clientHeight };";

pub const SCROLL_TO_TOP_SCRIPT: &str = "arguments[0].scrollTop = 0;";

pub const INCREMENT_SCROLL_TOP_SCRIPT: &str =
    "arguments[0].scrollTop += arguments[1]; return arguments[0].scrollTop;";

pub const SCROLL_BY_SCRIPT: &str = "arguments[0].scrollBy(0, arguments[1]);";

pub const WINDOW_SCROLL_BY_SCRIPT: &str = "window.scrollBy(0, arguments[0]);";

/// Scroll extents of the container at one instant
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn max_scroll(&self) -> f64 {
        self.scroll_height - self.client_height
    }

    pub fn is_scrollable(&self) -> bool {
        self.scroll_height > self.client_height
    }

    /// Offset within `tolerance` pixels of the end of a scrollable container
    pub fn is_at_bottom(&self, tolerance: u32) -> bool {
        let max_scroll = self.max_scroll();
        max_scroll > 0.0 && self.scroll_top >= max_scroll - f64::from(tolerance)
    }

    /// Scroll extent grew compared to an earlier measurement
    pub fn grew_since(&self, earlier: &ScrollMetrics) -> bool {
        self.scroll_height > earlier.scroll_height
    }
}

/// Which strategy moved the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStrategy {
    ScrollTop,
    ScrollBy,
    Window,
}

#[derive(Debug, Clone)]
pub struct ScrollController {
    candidates: Vec<String>,
    base_step: u32,
    boosted_step: u32,
    current_step: u32,
    settle: Duration,
    relocate_backoff: Duration,
    relocations: u32,
}

impl ScrollController {
    pub fn new(
        candidates: Vec<String>,
        base_step: u32,
        boosted_step: u32,
        settle: Duration,
        relocate_backoff: Duration,
    ) -> Self {
        Self {
            candidates,
            base_step,
            boosted_step: boosted_step.max(base_step),
            current_step: base_step,
            settle,
            relocate_backoff,
            relocations: 0,
        }
    }

    pub fn step(&self) -> u32 {
        self.current_step
    }

    pub fn is_boosted(&self) -> bool {
        self.current_step != self.base_step
    }

    /// Larger step for stagnation near the bottom short of the target
    pub fn boost(&mut self) {
        if self.current_step != self.boosted_step {
            info!("Boosting scroll step {} -> {}px", self.current_step, self.boosted_step);
            self.current_step = self.boosted_step;
        }
    }

    pub fn reset_step(&mut self) {
        if self.current_step != self.base_step {
            debug!("Scroll step reset to {}px", self.base_step);
            self.current_step = self.base_step;
        }
    }

    pub fn relocations(&self) -> u32 {
        self.relocations
    }

    /// Find the scroll container
    ///
    /// Prefers an element that is actually scrollable; otherwise falls back
    /// to the last element matched by any candidate selector.
    pub async fn locate(&self, session: &dyn BrowserSession) -> CollectResult<ElementHandle> {
        for selector in &self.candidates {
            let elements = session.find_elements(selector).await.unwrap_or_default();
            for element in elements {
                match self.measure(session, &element).await {
                    Ok(metrics) if metrics.is_scrollable() => {
                        debug!(
                            "Found scrollable container: {} (scrollHeight: {}, clientHeight: {})",
                            selector, metrics.scroll_height, metrics.client_height
                        );
                        return Ok(element);
                    }
                    Ok(_) => {}
                    // Might be stale or not accessible; try the next one
                    Err(e) => debug!("Skipping container candidate {}: {}", element, e),
                }
            }
        }

        warn!("No scrollable container found, using fallback selection");
        for selector in &self.candidates {
            let elements = session.find_elements(selector).await.unwrap_or_default();
            if let Some(last) = elements.into_iter().last() {
                return Ok(last);
            }
        }

        Err(CollectionError::container_missing(&self.candidates))
    }

    /// Re-locate after a stale container or failed scroll, retrying once
    pub async fn relocate(
        &mut self,
        session: &dyn BrowserSession,
    ) -> CollectResult<ElementHandle> {
        self.relocations += 1;
        let container = match self.locate(session).await {
            Ok(container) => container,
            Err(first) => {
                warn!("Container re-location failed ({}), retrying once", first);
                sleep(self.relocate_backoff).await;
                self.locate(session).await?
            }
        };

        match self.measure(session, &container).await {
            Ok(metrics) if !metrics.is_scrollable() => error!(
                "Re-located container is not scrollable! \
                 This may cause under-collection. Continuing anyway..."
            ),
            _ => {}
        }
        Ok(container)
    }

    /// Best-effort focus so scroll events land on the container
    pub async fn ensure_focus(&self, session: &dyn BrowserSession, container: &ElementHandle) {
        if let Err(e) = session.execute_script(FOCUS_WINDOW_SCRIPT, &[]).await {
            debug!("window.focus() failed: {}", e);
        }

        if session.click(container).await.is_err() {
            if let Ok(body) = session.find_element("body").await {
                let _ = session.click(&body).await;
            }
        }

        if let Err(e) = session.move_and_click(container).await {
            debug!("Pointer move+click on container failed: {}", e);
        }
    }

    pub async fn reset_to_top(
        &self,
        session: &dyn BrowserSession,
        container: &ElementHandle,
    ) -> SessionResult<()> {
        session
            .execute_script(SCROLL_TO_TOP_SCRIPT, &[container.into()])
            .await
            .map(|_| ())
    }

    /// Fresh measurement; scroll height can grow between any two calls
    pub async fn measure(
        &self,
        session: &dyn BrowserSession,
        container: &ElementHandle,
    ) -> SessionResult<ScrollMetrics> {
        let value = session
            .execute_script(SCROLL_METRICS_SCRIPT, &[container.into()])
            .await?;
        serde_json::from_value(value)
            .map_err(|e| SessionError::script(format!("Unexpected scroll metrics: {e}")))
    }

    /// Advance the viewport by `amount` pixels
    ///
    /// Tries a direct `scrollTop` increment (checked afterwards), then
    /// `scrollBy` on the container, then the window. `None` means every
    /// strategy failed and the container should be re-located.
    pub async fn advance(
        &self,
        session: &dyn BrowserSession,
        container: &ElementHandle,
        amount: u32,
    ) -> Option<ScrollStrategy> {
        let amount_arg = ScriptArg::from(amount);

        // Strategy 1: scroll the container directly
        match self.increment_scroll_top(session, container, &amount_arg).await {
            Ok(true) => return Some(ScrollStrategy::ScrollTop),
            Ok(false) => debug!("scrollTop did not move, trying scrollBy"),
            Err(e) => debug!("Container scroll failed: {}", e),
        }

        // Strategy 2: scrollBy on the container
        match session
            .execute_script(SCROLL_BY_SCRIPT, &[container.into(), amount_arg.clone()])
            .await
        {
            Ok(_) => {
                sleep(self.settle).await;
                return Some(ScrollStrategy::ScrollBy);
            }
            Err(e) => debug!("scrollBy on container failed: {}", e),
        }

        // Strategy 3: the window as last resort
        warn!("Container scroll failed, trying window scroll as fallback");
        match session
            .execute_script(WINDOW_SCROLL_BY_SCRIPT, &[amount_arg])
            .await
        {
            Ok(_) => {
                sleep(self.settle).await;
                Some(ScrollStrategy::Window)
            }
            Err(e) => {
                error!("All scroll strategies failed: {}", e);
                None
            }
        }
    }

    async fn increment_scroll_top(
        &self,
        session: &dyn BrowserSession,
        container: &ElementHandle,
        amount: &ScriptArg,
    ) -> SessionResult<bool> {
        let before = self.measure(session, container).await?.scroll_top;
        session
            .execute_script(INCREMENT_SCROLL_TOP_SCRIPT, &[container.into(), amount.clone()])
            .await?;
        sleep(self.settle).await;
        let after = self.measure(session, container).await?.scroll_top;
        Ok(after > before)
    }
}
