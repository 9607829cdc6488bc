//! Scripted feed source for tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use super::client::FeedSource;
use super::error::FeedError;
use super::types::FeedBatch;

/// Replays a fixed list of fetch results, then keeps failing with a
/// status error once the script runs out.
pub struct ScriptedFeed {
    script: Mutex<VecDeque<Result<FeedBatch, FeedError>>>,
    delay: Duration,
}

impl ScriptedFeed {
    pub fn new(script: Vec<Result<FeedBatch, FeedError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl FeedSource for ScriptedFeed {
    fn fetch(&self) -> impl Future<Output = Result<FeedBatch, FeedError>> + Send {
        let next = self.script.lock().unwrap().pop_front();
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            next.unwrap_or(Err(FeedError::Status {
                status: 503,
                message: "script exhausted".into(),
            }))
        }
    }
}
