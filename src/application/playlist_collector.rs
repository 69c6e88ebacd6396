//! Playlist collector - drives one browser session through a virtualized list
//!
//! The loop is strictly sequential: scroll, pause, measure, read the mounted
//! rows, merge, evaluate. Each merge completes before the next scroll step,
//! so the reconciler never sees interleaved partial state.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use super::reconciler::{BottomState, ConvergencePolicy, MergeOutcome, Reconciler, StepAdjustment, Verdict};
use crate::domain::collection::{CollectionResult, OutputRecord, StopReason};
use crate::domain::playlist::PlaylistReference;
use crate::infrastructure::browser::BrowserSession;
use crate::infrastructure::collection_error::{CollectResult, CollectionError};
use crate::infrastructure::config::CollectorConfig;
use crate::infrastructure::parsing::{MetadataProber, TrackRowParser};
use crate::infrastructure::scroll_controller::{FOCUS_WINDOW_SCRIPT, ScrollController, ScrollMetrics};

/// Collects the ordered, duplicate-free track list of playlists
pub struct PlaylistCollector {
    session: Arc<dyn BrowserSession>,
    config: CollectorConfig,
    row_parser: TrackRowParser,
    prober: MetadataProber,
}

impl PlaylistCollector {
    /// Build a collector; fails only on an invalid selector configuration
    pub fn new(session: Arc<dyn BrowserSession>, config: CollectorConfig) -> CollectResult<Self> {
        config.selectors.validate()?;

        let row_parser = TrackRowParser::new(config.selectors.track_row.clone());
        let prober = MetadataProber::new(config.selectors.metadata.clone(), config.cover_wait());

        Ok(Self {
            session,
            config,
            row_parser,
            prober,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect one playlist
    ///
    /// Fails only when the reference is invalid, navigation fails, the first
    /// row never appears, or no scroll container can be found. Everything
    /// else is absorbed and a possibly short result is returned.
    pub async fn collect(&self, reference: &str) -> CollectResult<CollectionResult> {
        let reference = PlaylistReference::parse(reference)?;
        let session = self.session.as_ref();

        info!("🎵 Opening playlist: {}", reference.url);
        session
            .navigate(&reference.url)
            .await
            .map_err(|source| CollectionError::Navigation {
                url: reference.url.clone(),
                source,
            })?;

        self.dismiss_cookie_banner().await;
        self.focus_window().await;
        self.wait_for_rows(&reference).await?;

        // Let the list finish its first render before reading page hints
        sleep(self.config.render_settle()).await;
        self.focus_window().await;

        let metadata = self.prober.probe(session, &reference).await;
        let policy = ConvergencePolicy::from_config(&self.config, metadata.item_count_hint);
        match metadata.item_count_hint {
            Some(hint) => info!("📋 '{}' reports {} tracks", metadata.display_name, hint),
            None => info!(
                "📋 '{}' has no track count hint, using default target {}",
                metadata.display_name, policy.target
            ),
        }

        let mut controller = ScrollController::new(
            self.config.selectors.page.scroll_container.clone(),
            self.config.base_scroll_increment,
            self.config.boosted_scroll_increment,
            self.config.scroll_settle(),
            self.config.scroll_pause(),
        );
        let mut container = controller.locate(session).await?;
        if let Err(e) = controller.reset_to_top(session, &container).await {
            debug!("Could not reset scroll position: {}", e);
        }
        sleep(self.config.scroll_settle()).await;

        let started = Instant::now();
        let mut reconciler = Reconciler::new(policy);
        self.harvest(&mut reconciler, 0).await;

        let mut previous: Option<ScrollMetrics> = controller.measure(session, &container).await.ok();
        let mut iteration: u32 = 0;
        let mut completed: u32 = 0;

        let stop_reason = loop {
            iteration += 1;
            if let Some(reason) = reconciler.check_before_iteration(iteration, started.elapsed()) {
                break reason;
            }

            controller.ensure_focus(session, &container).await;
            if controller.advance(session, &container, controller.step()).await.is_none() {
                warn!("🔄 Scroll step {} failed, re-locating container", iteration);
                container = controller.relocate(session).await?;
                previous = None;
                continue;
            }

            sleep(self.config.scroll_pause()).await;

            // A replaced container keeps its offset; read the rows there instead of skipping them
            let metrics = match controller.measure(session, &container).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!("🔄 Scroll container went stale ({}), re-locating", e);
                    container = controller.relocate(session).await?;
                    previous = None;
                    match controller.measure(session, &container).await {
                        Ok(metrics) => metrics,
                        Err(e) => {
                            warn!("Re-located container is unreadable: {}", e);
                            continue;
                        }
                    }
                }
            };

            self.harvest(&mut reconciler, iteration).await;
            completed = iteration;

            let bottom = BottomState {
                near_bottom: metrics.is_at_bottom(self.config.bottom_tolerance_px),
                at_end: metrics.is_at_bottom(self.config.post_scroll_bottom_tolerance_px),
                extent_grew: previous.map(|earlier| metrics.grew_since(&earlier)),
            };
            previous = Some(metrics);

            match reconciler.evaluate(bottom) {
                Verdict::Stop(reason) => break reason,
                Verdict::Continue(StepAdjustment::Boost) => controller.boost(),
                Verdict::Continue(StepAdjustment::Reset) => controller.reset_step(),
                Verdict::Continue(StepAdjustment::Keep) => {}
            }
        };

        let elapsed = started.elapsed();
        let (tracks, mut stats) = reconciler.finalize();
        stats.iterations = completed;
        stats.elapsed = elapsed;
        stats.container_relocations = controller.relocations();

        if stop_reason.is_ceiling() {
            warn!(
                "⚠️ Collection of '{}' hit a ceiling ({:?}) with {} tracks",
                metadata.display_name,
                stop_reason,
                tracks.len()
            );
        }
        info!(
            "✅ Collected {} tracks from '{}' in {} iterations ({:.1}s, {:?})",
            tracks.len(),
            metadata.display_name,
            stats.iterations,
            elapsed.as_secs_f64(),
            stop_reason
        );

        Ok(CollectionResult {
            metadata,
            tracks,
            stop_reason,
            stats,
        })
    }

    /// Collect several playlists in order on the same session
    ///
    /// Empty references are skipped; a fatal failure on one playlist is
    /// recorded and the batch moves on.
    pub async fn collect_all<I, S>(&self, references: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = BatchReport::default();

        for reference in references {
            let reference = reference.as_ref().trim();
            if reference.is_empty() {
                continue;
            }

            let result = match self.collect(reference).await {
                Ok(mut collected) => {
                    if let Some(cap) = self.config.max_tracks_per_playlist {
                        if collected.tracks.len() > cap {
                            info!("Limiting '{}' to {} tracks", collected.metadata.display_name, cap);
                            collected.tracks.truncate(cap);
                        }
                    }
                    Ok(collected)
                }
                Err(e) => {
                    error!("❌ Failed to collect playlist {}: {}", reference, e);
                    Err(e)
                }
            };

            report.outcomes.push(PlaylistOutcome {
                reference: reference.to_string(),
                result,
            });
        }

        info!(
            "Batch finished: {} succeeded, {} failed, {} tracks",
            report.succeeded().count(),
            report.failed().count(),
            report.total_tracks()
        );
        report
    }

    /// Read every mounted row and merge it
    async fn harvest(&self, reconciler: &mut Reconciler, iteration: u32) -> MergeOutcome {
        let session = self.session.as_ref();
        let rows = match session.find_elements(self.row_parser.row_selector()).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("Row lookup failed on iteration {}: {}", iteration, e);
                Vec::new()
            }
        };

        let records = self.row_parser.parse_rows(session, &rows).await;
        let outcome = reconciler.merge(records);

        info!(
            "Scroll {}: {} visible, {} new, {} total, highest position {}/{}",
            iteration,
            rows.len(),
            outcome.new_items,
            reconciler.total(),
            reconciler.highest_position(),
            reconciler.policy().target
        );
        outcome
    }

    async fn wait_for_rows(&self, reference: &PlaylistReference) -> CollectResult<()> {
        let session = self.session.as_ref();
        let waited = self.config.wait_timeout();

        if let Err(e) = session.wait_for(self.row_parser.row_selector(), waited).await {
            let current_url = session.current_url().await.unwrap_or_default();
            let title = session.title().await.unwrap_or_default();
            error!(
                "Timeout waiting for track rows ({}). Current URL: {}, page title: {}",
                e, current_url, title
            );
            return Err(CollectionError::Timeout {
                url: reference.url.clone(),
                waited,
            });
        }
        Ok(())
    }

    /// Click the first consent button present; silent when there is none
    async fn dismiss_cookie_banner(&self) {
        let session = self.session.as_ref();
        let candidates = &self.config.selectors.page.cookie_banner;
        if candidates.is_empty() {
            return;
        }

        let any_banner = candidates.join(", ");
        if session
            .wait_for(&any_banner, self.config.cookie_banner_wait())
            .await
            .is_err()
        {
            debug!("No cookie banner found or already accepted");
            return;
        }

        for selector in candidates {
            if let Ok(button) = session.find_element(selector).await {
                match session.click(&button).await {
                    Ok(()) => {
                        info!("🍪 Accepted cookies");
                        sleep(self.config.scroll_settle()).await;
                    }
                    Err(e) => debug!("Cookie banner click failed: {}", e),
                }
                return;
            }
        }
    }

    async fn focus_window(&self) {
        if let Err(e) = self.session.execute_script(FOCUS_WINDOW_SCRIPT, &[]).await {
            debug!("window.focus() failed: {}", e);
        }
    }
}

/// Result of one playlist within a batch
#[derive(Debug)]
pub struct PlaylistOutcome {
    pub reference: String,
    pub result: CollectResult<CollectionResult>,
}

/// Per-playlist outcomes of [`PlaylistCollector::collect_all`]
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PlaylistOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &CollectionResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &CollectionError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.reference.as_str(), e)))
    }

    pub fn total_tracks(&self) -> usize {
        self.succeeded().map(CollectionResult::len).sum()
    }

    /// Records of every successful playlist, in batch order
    pub fn output_records(&self) -> Vec<OutputRecord> {
        self.succeeded()
            .flat_map(CollectionResult::to_output_records)
            .collect()
    }

    /// Compact per-playlist summary for logs and reports
    pub fn summary(&self) -> Vec<PlaylistSummary> {
        self.outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(collected) => PlaylistSummary {
                    reference: outcome.reference.clone(),
                    name: Some(collected.metadata.display_name.clone()),
                    tracks: collected.len(),
                    stop_reason: Some(collected.stop_reason),
                    error: None,
                },
                Err(e) => PlaylistSummary {
                    reference: outcome.reference.clone(),
                    name: None,
                    tracks: 0,
                    stop_reason: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub reference: String,
    pub name: Option<String>,
    pub tracks: usize,
    pub stop_reason: Option<StopReason>,
    pub error: Option<String>,
}
