//! Reconciler - merges partial views of a virtualized list
//!
//! Each scroll iteration sees a different window of rows, some overlapping
//! the previous window, some re-rendered with more detail. The reconciler
//! folds those views into one canonical accumulator and decides when the
//! scroll loop may stop.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::collection::{CollectedTrack, CollectionStats, StopReason};
use crate::domain::track::TrackRecord;
use crate::infrastructure::config::CollectorConfig;

/// Termination policy knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergencePolicy {
    /// Expected item count (page hint or default)
    pub target: u32,
    /// Fallback target; trimming to exactly `target` only applies when they match
    pub default_target: u32,
    pub max_iterations: u32,
    pub max_elapsed: Duration,
    pub stagnation_threshold: u32,
    /// Iterations that must have run before a reached target stops the loop
    pub grace_iterations: u32,
}

impl ConvergencePolicy {
    pub fn from_config(config: &CollectorConfig, item_count_hint: Option<u32>) -> Self {
        Self {
            target: item_count_hint
                .filter(|hint| *hint > 0)
                .unwrap_or(config.default_target),
            default_target: config.default_target,
            max_iterations: config.max_scroll_attempts,
            max_elapsed: config.max_collection_time(),
            stagnation_threshold: config.stagnation_threshold,
            grace_iterations: config.grace_iterations,
        }
    }

    fn is_default_target(&self) -> bool {
        self.target == self.default_target
    }
}

/// What one merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows whose identity had not been seen before
    pub new_items: usize,
    /// Existing position entries upgraded to a record with a stable id
    pub upgraded: usize,
    /// Rows skipped as already seen
    pub duplicates: usize,
}

/// Decision after the post-scroll evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue(StepAdjustment),
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdjustment {
    Keep,
    /// Stagnating at the bottom short of the target
    Boost,
    Reset,
}

/// Fresh bottom measurement taken after a scroll step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BottomState {
    /// Within the loose bottom tolerance
    pub near_bottom: bool,
    /// Within the strict post-scroll tolerance
    pub at_end: bool,
    /// Scroll height increased since the previous measurement; `None` without one
    pub extent_grew: Option<bool>,
}

impl BottomState {
    pub fn at_end(extent_grew: Option<bool>) -> Self {
        Self {
            near_bottom: true,
            at_end: true,
            extent_grew,
        }
    }
}

/// Accumulator and convergence state for one collection run
#[derive(Debug)]
pub struct Reconciler {
    policy: ConvergencePolicy,
    by_position: BTreeMap<u32, TrackRecord>,
    without_position: Vec<TrackRecord>,
    seen_identities: HashSet<String>,
    highest_position: u32,
    consecutive_stagnant: u32,
    merged_rows: usize,
}

impl Reconciler {
    pub fn new(policy: ConvergencePolicy) -> Self {
        Self {
            policy,
            by_position: BTreeMap::new(),
            without_position: Vec::new(),
            seen_identities: HashSet::new(),
            highest_position: 0,
            consecutive_stagnant: 0,
            merged_rows: 0,
        }
    }

    pub fn policy(&self) -> &ConvergencePolicy {
        &self.policy
    }

    pub fn highest_position(&self) -> u32 {
        self.highest_position
    }

    pub fn consecutive_stagnant(&self) -> u32 {
        self.consecutive_stagnant
    }

    pub fn total(&self) -> usize {
        self.by_position.len() + self.without_position.len()
    }

    pub fn target_reached(&self) -> bool {
        self.highest_position >= self.policy.target
    }

    /// Merge one iteration's rows and update the stagnation counter
    pub fn merge<I>(&mut self, records: I) -> MergeOutcome
    where
        I: IntoIterator<Item = TrackRecord>,
    {
        let mut outcome = MergeOutcome::default();

        for record in records {
            let key = record.identity.key();
            if self.seen_identities.contains(&key) {
                outcome.duplicates += 1;
                continue;
            }

            if let Some(position) = record.valid_position() {
                self.highest_position = self.highest_position.max(position);
                match self.by_position.get_mut(&position) {
                    None => {
                        self.by_position.insert(position, record);
                    }
                    // Same rank re-rendered with a stable id; the richer record wins
                    Some(existing) if !existing.has_stable_id() && record.has_stable_id() => {
                        debug!("Upgrading position {} to identified record {}", position, key);
                        *existing = record;
                        outcome.upgraded += 1;
                    }
                    Some(_) => {}
                }
            } else {
                self.without_position.push(record);
            }

            self.seen_identities.insert(key);
            outcome.new_items += 1;
        }

        self.merged_rows += outcome.new_items;
        if outcome.new_items == 0 {
            self.consecutive_stagnant += 1;
        } else {
            self.consecutive_stagnant = 0;
        }
        outcome
    }

    /// Checks run before an iteration scrolls: hard ceilings, then target with grace
    ///
    /// `iteration` is 1-based.
    pub fn check_before_iteration(&self, iteration: u32, elapsed: Duration) -> Option<StopReason> {
        if elapsed > self.policy.max_elapsed {
            info!(
                "Scrolling timeout reached ({:.1}s > {}s). Stopping with {} tracks, highest position {}",
                elapsed.as_secs_f64(),
                self.policy.max_elapsed.as_secs(),
                self.total(),
                self.highest_position
            );
            return Some(StopReason::TimeCeiling);
        }

        if iteration > self.policy.max_iterations {
            info!(
                "Scroll attempt ceiling ({}) reached with {} tracks",
                self.policy.max_iterations,
                self.total()
            );
            return Some(StopReason::AttemptCeiling);
        }

        if self.target_reached() && iteration > self.policy.grace_iterations {
            info!(
                "Reached target position {}. Highest position: {}, Total tracks: {}",
                self.policy.target,
                self.highest_position,
                self.total()
            );
            return Some(StopReason::TargetReached);
        }

        None
    }

    /// Every position 1..=target present for a default-size list
    pub fn target_fully_collected(&self) -> bool {
        self.policy.is_default_target()
            && self.policy.target > 0
            && (1..=self.policy.target).all(|p| self.by_position.contains_key(&p))
    }

    /// Stagnation and bottom checks after the iteration's merge
    pub fn evaluate(&self, bottom: BottomState) -> Verdict {
        if self.target_fully_collected() {
            info!(
                "SUCCESS: Collected all {} positions! Total tracks: {}",
                self.policy.target,
                self.total()
            );
            return Verdict::Stop(StopReason::TargetFullyCollected);
        }

        let stagnant = self.consecutive_stagnant >= self.policy.stagnation_threshold;
        let mut adjustment = StepAdjustment::Keep;

        if stagnant && bottom.near_bottom {
            if self.target_reached() {
                info!(
                    "Stopped scrolling: {} consecutive scrolls with no new tracks AND at bottom AND reached position {}",
                    self.consecutive_stagnant, self.highest_position
                );
                return Verdict::Stop(StopReason::StagnantAtBottom);
            }
            info!(
                "At bottom but only reached position {}/{}. Continuing to scroll more aggressively...",
                self.highest_position, self.policy.target
            );
            adjustment = StepAdjustment::Boost;
        } else if stagnant {
            debug!(
                "{} consecutive scrolls with no new tracks, not at bottom yet. Highest position: {}/{}",
                self.consecutive_stagnant, self.highest_position, self.policy.target
            );
            adjustment = StepAdjustment::Reset;
        } else if self.consecutive_stagnant == 0 {
            adjustment = StepAdjustment::Reset;
        }

        if bottom.at_end && bottom.extent_grew == Some(false) {
            info!(
                "Reached true bottom of container with {} tracks, highest position {}",
                self.total(),
                self.highest_position
            );
            return Verdict::Stop(StopReason::TrueBottom);
        }

        Verdict::Continue(adjustment)
    }

    /// Consume the accumulator into the final renumbered sequence
    pub fn finalize(self) -> (Vec<CollectedTrack>, CollectionStats) {
        let with_position = self.by_position.len();
        let without_position = self.without_position.len();
        let mut stats = CollectionStats {
            merged_rows: self.merged_rows,
            with_position,
            without_position,
            highest_position: self.highest_position,
            target: self.policy.target,
            ..CollectionStats::default()
        };

        let trim = self.target_fully_collected();
        let Self {
            policy,
            by_position,
            without_position: unpositioned,
            ..
        } = self;

        let ordered: Vec<TrackRecord> = if trim {
            // Virtualization can over-render a few trailing positions in one burst
            let kept: Vec<TrackRecord> = by_position
                .into_iter()
                .filter(|(position, _)| *position <= policy.target)
                .map(|(_, record)| record)
                .collect();
            stats.trimmed = with_position + without_position - kept.len();
            info!(
                "Trimmed {} positioned + {} unpositioned tracks to exactly {}",
                with_position, without_position, policy.target
            );
            kept
        } else {
            by_position.into_values().chain(unpositioned).collect()
        };

        let tracks: Vec<CollectedTrack> = ordered
            .into_iter()
            .zip(1u32..)
            .map(|(record, position)| CollectedTrack {
                position,
                original_position: record.valid_position(),
                record,
            })
            .collect();

        info!(
            "Deduplication: {} merged -> {} unique tracks ({} with positions, {} without positions)",
            stats.merged_rows,
            tracks.len(),
            with_position,
            without_position
        );
        (tracks, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::track::{Performer, TrackIdentity};

    fn policy(target: u32) -> ConvergencePolicy {
        ConvergencePolicy {
            target,
            default_target: 50,
            max_iterations: 80,
            max_elapsed: Duration::from_secs(600),
            stagnation_threshold: 3,
            grace_iterations: 5,
        }
    }

    fn row(position: Option<u32>, id: Option<&str>, title: &str) -> TrackRecord {
        TrackRecord {
            position,
            identity: TrackIdentity::from_parts(id, position, title),
            title: title.to_string(),
            performers: vec![Performer::placeholder()],
            container_name: None,
            container_url: None,
            item_url: id.map(|id| format!("https://open.spotify.com/track/{id}")),
            explicit: false,
        }
    }

    fn at(position: u32) -> TrackRecord {
        row(Some(position), None, &format!("Song {position}"))
    }

    #[test]
    fn duplicates_are_skipped() {
        let mut reconciler = Reconciler::new(policy(10));
        let first = reconciler.merge([at(1), at(2)]);
        let second = reconciler.merge([at(2), at(3)]);

        assert_eq!(first.new_items, 2);
        assert_eq!(second.new_items, 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(reconciler.total(), 3);
        assert_eq!(reconciler.highest_position(), 3);
    }

    #[test]
    fn richer_record_wins_in_either_order() {
        for identified_first in [false, true] {
            let plain = row(Some(4), None, "Four");
            let rich = row(Some(4), Some("id4"), "Four");
            let batches = if identified_first {
                [rich.clone(), plain.clone()]
            } else {
                [plain.clone(), rich.clone()]
            };

            let mut reconciler = Reconciler::new(policy(10));
            for record in batches {
                reconciler.merge([record]);
            }
            let (tracks, _) = reconciler.finalize();
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].record.track_id(), Some("id4"));
        }
    }

    #[test]
    fn unpositioned_records_follow_positioned_ones() {
        let mut reconciler = Reconciler::new(policy(10));
        reconciler.merge([row(None, Some("loose"), "Loose"), at(2), at(1)]);
        reconciler.merge([row(None, Some("loose"), "Loose again")]);

        let (tracks, stats) = reconciler.finalize();
        let titles: Vec<&str> = tracks.iter().map(|t| t.record.title.as_str()).collect();
        assert_eq!(titles, ["Song 1", "Song 2", "Loose"]);
        assert_eq!(tracks[2].position, 3);
        assert_eq!(tracks[2].original_position, None);
        assert_eq!(stats.without_position, 1);
    }

    #[test]
    fn renumbering_closes_gaps() {
        let mut reconciler = Reconciler::new(policy(10));
        reconciler.merge([at(2), at(5), at(9)]);

        let (tracks, _) = reconciler.finalize();
        let positions: Vec<u32> = tracks.iter().map(|t| t.position).collect();
        let originals: Vec<Option<u32>> = tracks.iter().map(|t| t.original_position).collect();
        assert_eq!(positions, [1, 2, 3]);
        assert_eq!(originals, [Some(2), Some(5), Some(9)]);
    }

    #[test]
    fn exact_trim_for_default_target() {
        let mut reconciler = Reconciler::new(policy(50));
        reconciler.merge((1..=56).map(at));
        reconciler.merge([row(None, Some("stray"), "Stray")]);
        assert!(reconciler.target_fully_collected());

        let (tracks, stats) = reconciler.finalize();
        assert_eq!(tracks.len(), 50);
        assert!(tracks.iter().zip(1u32..).all(|(t, p)| t.position == p));
        assert!(tracks.iter().all(|t| t.original_position.unwrap() <= 50));
        assert_eq!(stats.trimmed, 7);
    }

    #[test]
    fn no_trim_when_target_came_from_hint() {
        let mut reconciler = Reconciler::new(policy(30));
        reconciler.merge((1..=32).map(at));
        assert!(!reconciler.target_fully_collected());

        let (tracks, _) = reconciler.finalize();
        assert_eq!(tracks.len(), 32);
    }

    #[test]
    fn ceilings_come_first() {
        let mut reconciler = Reconciler::new(policy(3));
        reconciler.merge([at(1), at(2), at(3)]);

        assert_eq!(
            reconciler.check_before_iteration(2, Duration::from_secs(601)),
            Some(StopReason::TimeCeiling)
        );
        assert_eq!(
            reconciler.check_before_iteration(81, Duration::from_secs(1)),
            Some(StopReason::AttemptCeiling)
        );
    }

    #[test]
    fn target_reached_waits_for_grace() {
        let mut reconciler = Reconciler::new(policy(3));
        reconciler.merge([at(1), at(2), at(3)]);
        assert!(reconciler.target_reached());

        assert_eq!(reconciler.check_before_iteration(5, Duration::ZERO), None);
        assert_eq!(
            reconciler.check_before_iteration(6, Duration::ZERO),
            Some(StopReason::TargetReached)
        );
    }

    #[test]
    fn stagnation_at_bottom_boosts_until_target() {
        let mut reconciler = Reconciler::new(policy(10));
        reconciler.merge([at(1), at(2)]);
        for _ in 0..3 {
            reconciler.merge(std::iter::empty());
        }
        assert_eq!(reconciler.consecutive_stagnant(), 3);

        assert_eq!(
            reconciler.evaluate(BottomState::at_end(Some(true))),
            Verdict::Continue(StepAdjustment::Boost)
        );
        assert_eq!(
            reconciler.evaluate(BottomState::default()),
            Verdict::Continue(StepAdjustment::Reset)
        );
    }

    #[test]
    fn stagnation_at_bottom_stops_after_target() {
        let mut reconciler = Reconciler::new(policy(2));
        reconciler.merge([at(1), at(2)]);
        for _ in 0..3 {
            reconciler.merge(std::iter::empty());
        }
        assert_eq!(
            reconciler.evaluate(BottomState::at_end(Some(true))),
            Verdict::Stop(StopReason::StagnantAtBottom)
        );
    }

    #[test]
    fn true_bottom_needs_a_previous_measurement() {
        let mut reconciler = Reconciler::new(policy(10));
        reconciler.merge([at(1)]);

        assert_eq!(
            reconciler.evaluate(BottomState::at_end(None)),
            Verdict::Continue(StepAdjustment::Reset)
        );
        assert_eq!(
            reconciler.evaluate(BottomState::at_end(Some(true))),
            Verdict::Continue(StepAdjustment::Reset)
        );
        let near_only = BottomState {
            near_bottom: true,
            at_end: false,
            extent_grew: Some(false),
        };
        assert_eq!(reconciler.evaluate(near_only), Verdict::Continue(StepAdjustment::Reset));
        assert_eq!(
            reconciler.evaluate(BottomState::at_end(Some(false))),
            Verdict::Stop(StopReason::TrueBottom)
        );
    }

    #[test]
    fn policy_prefers_positive_hint() {
        let config = CollectorConfig::default();
        assert_eq!(ConvergencePolicy::from_config(&config, Some(120)).target, 120);
        assert_eq!(ConvergencePolicy::from_config(&config, Some(0)).target, 50);
        assert_eq!(ConvergencePolicy::from_config(&config, None).target, 50);
    }
}
