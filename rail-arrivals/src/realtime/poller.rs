//! Soft-failure polling on top of a [`FeedSource`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::client::FeedSource;
use super::error::FeedError;
use super::types::FeedBatch;

/// Consecutive failures before the feed is reported as degraded.
pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

/// Outcome of one poll.
#[derive(Debug)]
pub enum FeedResult {
    /// The fetch succeeded this cycle.
    Fresh(Arc<FeedBatch>),
    /// The fetch failed; carries the last successful batch, if there was one.
    Stale {
        last_good: Option<Arc<FeedBatch>>,
        error: FeedError,
    },
}

impl FeedResult {
    pub fn is_fresh(&self) -> bool {
        matches!(self, FeedResult::Fresh(_))
    }

    /// The best batch available this cycle.
    pub fn batch(&self) -> Option<&Arc<FeedBatch>> {
        match self {
            FeedResult::Fresh(batch) => Some(batch),
            FeedResult::Stale { last_good, .. } => last_good.as_ref(),
        }
    }
}

/// Wraps a feed source with a hard timeout and last-good fallback.
///
/// A client belongs to one tracker and is polled sequentially, so it holds
/// its state directly rather than behind a lock.
#[derive(Debug)]
pub struct FeedClient<F> {
    source: F,
    timeout: Duration,
    degraded_after: u32,
    last_good: Option<Arc<FeedBatch>>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl<F: FeedSource> FeedClient<F> {
    /// Create a client. `timeout` should be shorter than the poll interval.
    pub fn new(source: F, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            degraded_after: DEFAULT_DEGRADED_AFTER,
            last_good: None,
            last_success: None,
            consecutive_failures: 0,
        }
    }

    /// Set the failure count that triggers degraded mode.
    pub fn with_degraded_after(mut self, failures: u32) -> Self {
        self.degraded_after = failures.max(1);
        self
    }

    /// Fetch the feed once.
    ///
    /// Never fails: transport and decode errors come back as
    /// [`FeedResult::Stale`] carrying the previous good batch.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> FeedResult {
        let result = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout),
        };

        match result {
            Ok(batch) => {
                if self.is_degraded() {
                    info!(
                        failures = self.consecutive_failures,
                        "realtime feed recovered"
                    );
                }
                let batch = Arc::new(batch);
                self.consecutive_failures = 0;
                self.last_success = Some(now);
                self.last_good = Some(Arc::clone(&batch));
                FeedResult::Fresh(batch)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == self.degraded_after {
                    error!(
                        failures = self.consecutive_failures,
                        last_success = ?self.last_success,
                        error = %e,
                        "realtime feed degraded"
                    );
                } else {
                    warn!(
                        failures = self.consecutive_failures,
                        error = %e,
                        "realtime fetch failed, using last good data"
                    );
                }
                FeedResult::Stale {
                    last_good: self.last_good.clone(),
                    error: e,
                }
            }
        }
    }

    /// When the feed last returned a usable batch.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns true once consecutive failures reach the threshold.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures >= self.degraded_after
    }
}
