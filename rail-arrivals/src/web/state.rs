//! Application state for the web layer.

use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::schedule::ScheduleStore;
use crate::slots::SlotBoard;

/// A running tracker as seen by the API: its configuration and the board
/// it publishes to.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    pub config: TrackerConfig,
    pub board: Arc<SlotBoard>,
}

impl TrackerHandle {
    pub fn new(config: TrackerConfig, board: Arc<SlotBoard>) -> Self {
        Self { config, board }
    }
}

/// Shared application state.
///
/// Everything here is read-only from the handlers' point of view; the
/// trackers and the schedule refresh loop are the only writers.
#[derive(Clone)]
pub struct AppState {
    /// Static schedule, for line and stop lookups
    pub store: Arc<ScheduleStore>,

    /// Trackers in configuration order
    pub trackers: Arc<Vec<TrackerHandle>>,
}

impl AppState {
    /// Create a new app state.
    pub fn new(store: Arc<ScheduleStore>, trackers: Vec<TrackerHandle>) -> Self {
        Self {
            store,
            trackers: Arc::new(trackers),
        }
    }

    /// Find a tracker by id.
    pub fn tracker(&self, id: &str) -> Option<&TrackerHandle> {
        self.trackers.iter().find(|t| t.config.id == id)
    }
}
