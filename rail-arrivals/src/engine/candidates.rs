//! Filtering merged trips down to ranked arrival candidates.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::config::TrackerConfig;
use crate::domain::{LocalTime, RouteId, StopId, TripId};
use crate::schedule::ScheduleSnapshot;

use super::matcher::{MergedStop, MergedTripView};

/// Number of published slots.
pub const SLOT_COUNT: usize = 3;

/// The line and station pair a tracker watches, with display names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTarget {
    pub line_id: RouteId,
    pub line_name: String,
    pub departure_stop: StopId,
    pub arrival_stop: StopId,
    pub departure_name: String,
    pub arrival_name: String,
    /// Departed trains stay listed this long.
    pub grace: Duration,
}

impl TrackerTarget {
    /// Resolve names against the current schedule.
    ///
    /// Configured names win; otherwise the schedule's stop and route names
    /// are used, falling back to the raw ids.
    pub fn resolve(config: &TrackerConfig, snapshot: &ScheduleSnapshot) -> Self {
        let stop_name = |id: &StopId, name: &Option<String>| {
            name.clone()
                .or_else(|| snapshot.stop(id.as_str()).map(|s| s.name.clone()))
                .unwrap_or_else(|| id.to_string())
        };

        Self {
            line_id: config.line_id.clone(),
            line_name: snapshot
                .route(config.line_id.as_str())
                .map(|r| r.display_name().to_string())
                .unwrap_or_else(|| config.line_id.to_string()),
            departure_stop: config.departure_stop_id.clone(),
            arrival_stop: config.arrival_stop_id.clone(),
            departure_name: stop_name(&config.departure_stop_id, &config.departure_name),
            arrival_name: stop_name(&config.arrival_stop_id, &config.arrival_name),
            grace: config.departure_grace(),
        }
    }
}

/// A train that can take the rider from the departure to the arrival stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalCandidate {
    pub trip_id: TripId,
    pub service_date: NaiveDate,
    pub departure: LocalTime,
    /// `None` when neither realtime nor the schedule gives a time.
    pub arrival: Option<LocalTime>,
    pub departure_station: String,
    pub arrival_station: String,
    pub has_realtime: bool,
}

/// Turn merged views into candidates for `target`.
///
/// A view qualifies if it is on the target line, calls at the departure
/// stop and later at the arrival stop, neither of those calls is skipped,
/// and it has some departure time that is not more than `target.grace`
/// in the past.
pub fn build_candidates(
    views: &[MergedTripView],
    target: &TrackerTarget,
    now: DateTime<Utc>,
) -> Vec<ArrivalCandidate> {
    let cutoff = now - target.grace;

    views
        .iter()
        .filter(|v| v.route_id == target.line_id)
        .filter_map(|view| {
            let dep_idx = view.position_of(&target.departure_stop)?;
            let arr_idx = dep_idx
                + 1
                + view.stops[dep_idx + 1..]
                    .iter()
                    .position(|s| s.stop_id == target.arrival_stop)?;

            let dep = &view.stops[dep_idx];
            let arr = &view.stops[arr_idx];
            if dep.skipped || arr.skipped {
                debug!(trip_id = %view.trip_id, "tracked stop skipped");
                return None;
            }

            let departure = effective_departure(dep)?;
            if departure.with_timezone(&Utc) < cutoff {
                return None;
            }

            Some(ArrivalCandidate {
                trip_id: view.trip_id.clone(),
                service_date: view.service_date,
                departure,
                arrival: effective_arrival(arr),
                departure_station: target.departure_name.clone(),
                arrival_station: target.arrival_name.clone(),
                has_realtime: view.has_realtime,
            })
        })
        .collect()
}

/// Realtime departure, else realtime arrival, else the scheduled pair.
pub fn effective_departure(stop: &MergedStop) -> Option<LocalTime> {
    stop.realtime_departure
        .or(stop.realtime_arrival)
        .or(stop.scheduled_departure)
        .or(stop.scheduled_arrival)
}

/// Realtime arrival, else realtime departure, else the scheduled pair.
pub fn effective_arrival(stop: &MergedStop) -> Option<LocalTime> {
    stop.realtime_arrival
        .or(stop.realtime_departure)
        .or(stop.scheduled_arrival)
        .or(stop.scheduled_departure)
}

/// Sort by departure, keep each trip once, and keep the first three.
///
/// Ties on departure time are broken by trip id so the result does not
/// depend on input order.
pub fn rank_candidates(mut candidates: Vec<ArrivalCandidate>) -> Vec<ArrivalCandidate> {
    candidates.sort_by(|a, b| {
        a.departure
            .cmp(&b.departure)
            .then_with(|| a.trip_id.cmp(&b.trip_id))
    });

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.trip_id.clone()));
    candidates.truncate(SLOT_COUNT);
    candidates
}
