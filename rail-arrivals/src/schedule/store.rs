//! Process-wide static schedule store with atomic snapshot replacement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::error::ScheduleError;
use super::parse::parse_archive;
use super::snapshot::{ScheduleSnapshot, ScheduleSummary};
use super::source::ScheduleSource;

/// Shared holder of the current schedule snapshot.
///
/// Readers take a cheap `Arc` clone of the current snapshot and use it for
/// a whole poll cycle. A load builds the next snapshot without holding the
/// lock and only takes the write lock to swap the pointer, so readers never
/// wait on parsing and never observe a partial index.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    current: RwLock<Option<Arc<ScheduleSnapshot>>>,
}

impl ScheduleStore {
    /// Create an empty store. Nothing is served until the first `load`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a snapshot.
    pub fn with_snapshot(snapshot: ScheduleSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// The current snapshot, if any load has succeeded.
    pub async fn snapshot(&self) -> Option<Arc<ScheduleSnapshot>> {
        self.current.read().await.clone()
    }

    /// Returns true once a snapshot has been loaded.
    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Fetch, unpack and index the archive, then replace the snapshot.
    ///
    /// On failure the previous snapshot stays in service. A failure before
    /// any snapshot exists is returned as-is; a failed refresh is wrapped in
    /// `ScheduleError::Stale`.
    pub async fn load<S: ScheduleSource>(&self, source: &S) -> Result<ScheduleSummary, ScheduleError> {
        let result = match source.fetch_archive().await {
            Ok(bytes) => parse_archive(&bytes, Utc::now()),
            Err(e) => Err(e),
        };

        let had_snapshot = self.is_loaded().await;
        match result {
            Ok(snapshot) => {
                let summary = snapshot.summary();
                self.replace(snapshot).await;
                info!(
                    stops = summary.stops,
                    routes = summary.routes,
                    trips = summary.trips,
                    "static schedule loaded"
                );
                Ok(summary)
            }
            Err(e) if had_snapshot => {
                warn!(error = %e, "static schedule refresh failed, keeping previous snapshot");
                Err(ScheduleError::Stale(Box::new(e)))
            }
            Err(e) => {
                error!(error = %e, "static schedule load failed");
                Err(e)
            }
        }
    }

    /// Swap in a new snapshot.
    pub async fn replace(&self, snapshot: ScheduleSnapshot) {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().await;
        *guard = Some(next);
    }

    /// Reload on a fixed interval until the task is dropped.
    ///
    /// The first tick is skipped; callers perform the startup load
    /// themselves so they can treat its failure as fatal.
    pub async fn run_refresh<S: ScheduleSource>(self: Arc<Self>, source: S, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            // Errors are already logged by `load`.
            let _ = self.load(&source).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    const STOPS_TXT: &str = "stop_id,stop_name\nOAKPARK,Oak Park\nOTC,Chicago OTC\n";
    const ROUTES_TXT: &str = "route_id,route_long_name\nUP-W,Union Pacific West\n";
    const TRIPS_TXT: &str = "route_id,service_id,trip_id\nUP-W,WK,UW40\n";
    const STOP_TIMES_TXT: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
        UW40,22:30:00,22:30:00,OAKPARK,1\n\
        UW40,22:49:00,22:49:00,OTC,2\n";

    fn archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [
            ("stops.txt", STOPS_TXT),
            ("routes.txt", ROUTES_TXT),
            ("trips.txt", TRIPS_TXT),
            ("stop_times.txt", STOP_TIMES_TXT),
        ] {
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Serves a queue of canned responses.
    struct ScriptedSource {
        responses: Mutex<Vec<Result<Vec<u8>, ScheduleError>>>,
    }

    impl ScriptedSource {
        fn new(mut responses: Vec<Result<Vec<u8>, ScheduleError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl ScheduleSource for ScriptedSource {
        fn fetch_archive(&self) -> impl Future<Output = Result<Vec<u8>, ScheduleError>> + Send {
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ScheduleError::Status { status: 599 }));
            async move { next }
        }
    }

    #[tokio::test]
    async fn first_load_failure_is_not_stale() {
        let store = ScheduleStore::new();
        let source = ScriptedSource::new(vec![Err(ScheduleError::Status { status: 500 })]);

        let err = store.load(&source).await.unwrap_err();
        assert!(!err.is_stale());
        assert!(store.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn load_then_failed_refresh_keeps_snapshot() {
        let store = ScheduleStore::new();
        let source = ScriptedSource::new(vec![
            Ok(archive()),
            Err(ScheduleError::Status { status: 502 }),
            Ok(b"corrupt".to_vec()),
        ]);

        let summary = store.load(&source).await.unwrap();
        assert_eq!(summary.trips, 1);
        let first = store.snapshot().await.unwrap();

        let err = store.load(&source).await.unwrap_err();
        assert!(err.is_stale());

        let err = store.load(&source).await.unwrap_err();
        assert!(err.is_stale());

        let current = store.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &current));
        assert!(current.lookup_trip("UW40").is_some());
    }

    #[tokio::test]
    async fn successful_refresh_swaps_snapshot() {
        let store = ScheduleStore::new();
        let source = ScriptedSource::new(vec![Ok(archive()), Ok(archive())]);

        store.load(&source).await.unwrap();
        let held = store.snapshot().await.unwrap();

        store.load(&source).await.unwrap();
        let current = store.snapshot().await.unwrap();

        // The reader's snapshot is untouched by the swap.
        assert!(!Arc::ptr_eq(&held, &current));
        assert!(held.lookup_trip("UW40").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_during_replace_see_whole_snapshots() {
        let store = Arc::new(ScheduleStore::new());
        store
            .load(&ScriptedSource::new(vec![Ok(archive())]))
            .await
            .unwrap();

        let writer = {
            let store = Arc::clone(&store);
            let source = ScriptedSource::new((0..50).map(|_| Ok(archive())).collect());
            tokio::spawn(async move {
                for _ in 0..50 {
                    store.load(&source).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            let snap = store.snapshot().await.unwrap();
            assert!(snap.lookup_trip("UW40").is_some());
            assert_eq!(snap.stops_for_line("UP-W").len(), 2);
        }
        writer.await.unwrap();
    }
}
