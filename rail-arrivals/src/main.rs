use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rail_arrivals::config::AppConfig;
use rail_arrivals::engine::Tracker;
use rail_arrivals::realtime::{FeedClient, HttpFeedSource};
use rail_arrivals::schedule::{HttpScheduleSource, ScheduleStore};
use rail_arrivals::web::{AppState, TrackerHandle, create_router};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rail_arrivals=info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let tz = config.tz()?;

    // Nothing can be matched without a schedule, so the first load is fatal.
    let schedule_source = HttpScheduleSource::new(&config.schedule.url, config.schedule.timeout())?;
    let store = Arc::new(ScheduleStore::new());
    store.load(&schedule_source).await?;

    tokio::spawn(
        Arc::clone(&store).run_refresh(schedule_source, config.schedule.refresh_interval()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(config.trackers.len());
    let mut tasks = Vec::with_capacity(config.trackers.len());

    for tracker_config in &config.trackers {
        let source = HttpFeedSource::new(
            &config.feed.url,
            config.feed.format,
            config.feed.credential.clone(),
            config.feed.timeout(),
        )?;
        let feed = FeedClient::new(source, config.feed.timeout())
            .with_degraded_after(config.feed.degraded_after_failures);
        let tracker = Tracker::new(tracker_config.clone(), tz, Arc::clone(&store), feed);

        handles.push(TrackerHandle::new(tracker_config.clone(), tracker.board()));
        tasks.push(tokio::spawn(
            tracker.run(config.feed.poll_interval(), shutdown_rx.clone()),
        ));
    }

    let app = create_router(AppState::new(Arc::clone(&store), handles));

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(
        addr = %config.listen,
        trackers = config.trackers.len(),
        "rail arrivals listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("shutting down trackers");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "tracker task failed");
        }
    }

    Ok(())
}
