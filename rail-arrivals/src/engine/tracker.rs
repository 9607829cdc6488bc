//! The per-tracker poll cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::realtime::{FeedBatch, FeedClient, FeedResult, FeedSource};
use crate::schedule::{ScheduleSnapshot, ScheduleStore};
use crate::slots::{Publication, SlotBoard};

use super::candidates::{ArrivalCandidate, TrackerTarget, build_candidates, rank_candidates};
use super::matcher::{MatchContext, match_trips};

/// Ranked candidates for one poll, plus match statistics for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub candidates: Vec<ArrivalCandidate>,
    pub views: usize,
    pub not_found: usize,
    pub canceled: usize,
}

/// Run match, filter and rank for one target.
///
/// Pure: the same snapshot, batch, target and `now` always give the same
/// result.
pub fn evaluate(
    snapshot: &ScheduleSnapshot,
    batch: Option<&FeedBatch>,
    target: &TrackerTarget,
    tz: Tz,
    now: DateTime<Utc>,
) -> Evaluation {
    let ctx = MatchContext {
        line_id: &target.line_id,
        tz,
        now,
    };
    let outcome = match_trips(snapshot, batch, &ctx);
    let not_found = outcome.not_found();
    let canceled = outcome.drops.len() - not_found;

    let candidates = rank_candidates(build_candidates(&outcome.views, target, now));

    Evaluation {
        candidates,
        views: outcome.views.len(),
        not_found,
        canceled,
    }
}

/// What a cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fresh realtime data was published.
    Published { filled: usize },
    /// The feed has never succeeded; published from the schedule alone.
    ScheduleOnly { filled: usize },
    /// The feed failed; the previous publication stays up.
    KeptPrevious,
    /// No static schedule is loaded yet.
    NoSchedule,
}

/// Tracks one line and station pair.
///
/// Owns its feed client and publishes to its own [`SlotBoard`]. All
/// trackers share one [`ScheduleStore`].
pub struct Tracker<F> {
    config: TrackerConfig,
    tz: Tz,
    store: Arc<ScheduleStore>,
    feed: FeedClient<F>,
    board: Arc<SlotBoard>,
    has_fresh_publish: bool,
}

impl<F: FeedSource> Tracker<F> {
    pub fn new(
        config: TrackerConfig,
        tz: Tz,
        store: Arc<ScheduleStore>,
        feed: FeedClient<F>,
    ) -> Self {
        Self {
            config,
            tz,
            store,
            feed,
            board: Arc::new(SlotBoard::new()),
            has_fresh_publish: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The board this tracker publishes to.
    pub fn board(&self) -> Arc<SlotBoard> {
        Arc::clone(&self.board)
    }

    /// Run one fetch, match, rank and publish cycle as of `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let Some(snapshot) = self.store.snapshot().await else {
            warn!(tracker = %self.config.id, "no static schedule loaded, skipping cycle");
            return CycleOutcome::NoSchedule;
        };
        let target = TrackerTarget::resolve(&self.config, &snapshot);
        let local_now = now.with_timezone(&self.tz);

        match self.feed.poll(now).await {
            FeedResult::Fresh(batch) => {
                let eval = evaluate(&snapshot, Some(&*batch), &target, self.tz, now);
                let filled = eval.candidates.len();
                info!(
                    tracker = %self.config.id,
                    trips = batch.trips.len(),
                    views = eval.views,
                    not_found = eval.not_found,
                    canceled = eval.canceled,
                    filled,
                    "published arrivals"
                );

                let last_update = self.feed.last_success().map(|t| t.with_timezone(&self.tz));
                self.board
                    .publish(Publication::new(&target, eval.candidates, last_update, local_now))
                    .await;
                self.has_fresh_publish = true;
                CycleOutcome::Published { filled }
            }
            FeedResult::Stale { .. } if self.has_fresh_publish => {
                debug!(tracker = %self.config.id, "feed stale, keeping published slots");
                CycleOutcome::KeptPrevious
            }
            FeedResult::Stale { .. } => {
                let eval = evaluate(&snapshot, None, &target, self.tz, now);
                let filled = eval.candidates.len();
                info!(
                    tracker = %self.config.id,
                    filled,
                    "no realtime data yet, published scheduled arrivals"
                );
                self.board
                    .publish(Publication::new(&target, eval.candidates, None, local_now))
                    .await;
                CycleOutcome::ScheduleOnly { filled }
            }
        }
    }

    /// Run cycles every `every` until `shutdown` flips to true.
    ///
    /// Cycles run one at a time; a tick that comes due while a cycle is
    /// still running is skipped. Shutdown is only observed between cycles,
    /// so a publish is never cut short.
    pub async fn run(mut self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tracker = %self.config.id,
            line = %self.config.line_id,
            from = %self.config.departure_stop_id,
            to = %self.config.arrival_stop_id,
            "tracker started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle(Utc::now()).await;
        }

        info!(tracker = %self.config.id, "tracker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::FeedError;
    use crate::realtime::fake::ScriptedFeed;

    #[tokio::test]
    async fn no_schedule_skips_cycle() {
        let feed = FeedClient::new(ScriptedFeed::new(vec![]), Duration::from_secs(1));
        let mut tracker = Tracker::new(
            TrackerConfig::new("t", "L1", "A", "C"),
            chrono_tz::America::Chicago,
            Arc::new(ScheduleStore::new()),
            feed,
        );

        assert_eq!(tracker.run_cycle(Utc::now()).await, CycleOutcome::NoSchedule);
        assert_eq!(tracker.board().current().await.published_at, None);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let feed = ScriptedFeed::new(vec![Err(FeedError::Timeout)]);
        let tracker = Tracker::new(
            TrackerConfig::new("t", "L1", "A", "C"),
            chrono_tz::America::Chicago,
            Arc::new(ScheduleStore::new()),
            FeedClient::new(feed, Duration::from_millis(10)),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(tracker.run(Duration::from_millis(20), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
