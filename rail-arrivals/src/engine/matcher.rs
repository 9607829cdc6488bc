//! Trip matching: realtime updates joined onto scheduled stop sequences.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::{LocalTime, RouteId, StopId, TripId};
use crate::realtime::{
    FeedBatch, StopRelationship, StopTimeEvent, StopTimeUpdate, TripRelationship, TripUpdate,
};
use crate::schedule::{ScheduleSnapshot, ScheduledStopTime, ScheduledTrip};

/// One stop of a merged trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedStop {
    pub stop_id: StopId,
    pub sequence: u32,
    pub scheduled_arrival: Option<LocalTime>,
    pub scheduled_departure: Option<LocalTime>,
    pub realtime_arrival: Option<LocalTime>,
    pub realtime_departure: Option<LocalTime>,
    /// The train will not call here.
    pub skipped: bool,
}

/// A scheduled trip with realtime overrides applied, for one service day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTripView {
    pub trip_id: TripId,
    pub route_id: RouteId,
    pub service_date: NaiveDate,
    /// False for views built from the schedule alone.
    pub has_realtime: bool,
    pub stops: Vec<MergedStop>,
}

impl MergedTripView {
    /// Position of the first call at `stop`.
    pub fn position_of(&self, stop: &StopId) -> Option<usize> {
        self.stops.iter().position(|s| &s.stop_id == stop)
    }
}

/// Why a realtime trip produced no view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDrop {
    /// The feed names a trip the static schedule does not have.
    TripNotFound(TripId),
    /// The whole trip was canceled.
    Canceled(TripId),
}

/// Result of matching one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub views: Vec<MergedTripView>,
    pub drops: Vec<MatchDrop>,
}

impl MatchOutcome {
    pub fn not_found(&self) -> usize {
        self.drops
            .iter()
            .filter(|d| matches!(d, MatchDrop::TripNotFound(_)))
            .count()
    }
}

/// Inputs that do not come from the schedule or the feed.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Line whose unreported trips get schedule-only views.
    pub line_id: &'a RouteId,
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

impl MatchContext<'_> {
    fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }
}

/// Merge a realtime batch onto the schedule.
///
/// Every trip in the batch is resolved against `snapshot`; unknown and
/// canceled trips are reported in `drops`. Trips on the context's line that
/// the batch does not mention (or every such trip, when `batch` is `None`)
/// get schedule-only views for yesterday, today and tomorrow, as far as the
/// service calendar says they run.
pub fn match_trips(
    snapshot: &ScheduleSnapshot,
    batch: Option<&FeedBatch>,
    ctx: &MatchContext<'_>,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    let mut reported: BTreeSet<&TripId> = BTreeSet::new();

    if let Some(batch) = batch {
        for (trip_id, update) in batch.by_trip() {
            reported.insert(trip_id);

            let Some(trip) = snapshot.lookup_trip(trip_id.as_str()) else {
                debug!(trip_id = %trip_id, "realtime trip not in static schedule");
                outcome.drops.push(MatchDrop::TripNotFound(trip_id.clone()));
                continue;
            };

            if update.relationship == TripRelationship::Canceled {
                debug!(trip_id = %trip_id, "trip canceled");
                outcome.drops.push(MatchDrop::Canceled(trip_id.clone()));
                continue;
            }

            let service_date = update
                .start_date
                .unwrap_or_else(|| infer_service_date(snapshot, trip, update, ctx));
            outcome
                .views
                .push(merge_trip(trip, Some(update), service_date, ctx.tz));
        }
    }

    let today = ctx.today();
    let days = [today.pred_opt(), Some(today), today.succ_opt()];
    for trip in snapshot.trips_for_line(ctx.line_id.as_str()) {
        if reported.contains(&trip.id) {
            continue;
        }
        for date in days.iter().flatten() {
            if snapshot.calendar().is_active(&trip.service_id, *date) {
                outcome.views.push(merge_trip(trip, None, *date, ctx.tz));
            }
        }
    }

    outcome
}

/// Pick the service day of a realtime trip that carries no start date.
///
/// Candidates are yesterday, today and tomorrow, limited to the days the
/// calendar says the trip runs (all three when it runs on none of them).
/// With an absolute stop time in the update, the day whose schedule is
/// closest to it wins; otherwise the day whose run is closest to `now`.
/// Ties go to today, then yesterday.
fn infer_service_date(
    snapshot: &ScheduleSnapshot,
    trip: &ScheduledTrip,
    update: &TripUpdate,
    ctx: &MatchContext<'_>,
) -> NaiveDate {
    let today = ctx.today();
    let all: Vec<NaiveDate> = [Some(today), today.pred_opt(), today.succ_opt()]
        .into_iter()
        .flatten()
        .collect();
    let active: Vec<NaiveDate> = all
        .iter()
        .copied()
        .filter(|d| snapshot.calendar().is_active(&trip.service_id, *d))
        .collect();
    let days = if active.is_empty() { all } else { active };

    let anchor = absolute_anchor(trip, update);
    let distance = |date: NaiveDate| -> Option<i64> {
        match anchor {
            Some((i, time)) => {
                let st = &trip.stop_times[i];
                let scheduled = st.departure.or(st.arrival)?.on(date, ctx.tz)?;
                Some((scheduled.with_timezone(&Utc) - time).num_seconds().abs())
            }
            None => {
                let times: Vec<DateTime<Utc>> = trip
                    .stop_times
                    .iter()
                    .filter_map(|st| st.departure.or(st.arrival))
                    .filter_map(|t| t.on(date, ctx.tz))
                    .map(|t| t.with_timezone(&Utc))
                    .collect();
                let first = times.iter().min()?;
                let last = times.iter().max()?;
                if ctx.now < *first {
                    Some((*first - ctx.now).num_seconds())
                } else if ctx.now > *last {
                    Some((ctx.now - *last).num_seconds())
                } else {
                    Some(0)
                }
            }
        }
    };

    let chosen = days
        .iter()
        .copied()
        .min_by_key(|d| distance(*d).unwrap_or(i64::MAX))
        .unwrap_or(today);
    if chosen != today {
        debug!(trip_id = %trip.id, service_date = %chosen, "inferred service date");
    }
    chosen
}

/// The first stop update carrying an absolute time, with the index of the
/// scheduled stop it refers to.
fn absolute_anchor(trip: &ScheduledTrip, update: &TripUpdate) -> Option<(usize, DateTime<Utc>)> {
    let matched = index_updates(trip, update);
    let mut anchored: Vec<(usize, DateTime<Utc>)> = matched
        .into_iter()
        .filter(|(_, stu)| stu.relationship == StopRelationship::Scheduled)
        .filter_map(|(i, stu)| {
            let time = stu
                .departure
                .and_then(|e| e.time)
                .or_else(|| stu.arrival.and_then(|e| e.time))?;
            Some((i, time))
        })
        .collect();
    anchored.sort_by_key(|(i, _)| *i);
    anchored.into_iter().next()
}

/// Build the merged view of one trip instance.
pub fn merge_trip(
    trip: &ScheduledTrip,
    update: Option<&TripUpdate>,
    service_date: NaiveDate,
    tz: Tz,
) -> MergedTripView {
    let matched = update.map(|u| index_updates(trip, u)).unwrap_or_default();
    let trip_delay = update.and_then(|u| u.delay_secs);

    let stops = trip
        .stop_times
        .iter()
        .enumerate()
        .map(|(i, st)| {
            let scheduled_arrival = st.arrival.and_then(|t| t.on(service_date, tz));
            let scheduled_departure = st.departure.and_then(|t| t.on(service_date, tz));

            let mut stop = MergedStop {
                stop_id: st.stop_id.clone(),
                sequence: st.sequence,
                scheduled_arrival,
                scheduled_departure,
                realtime_arrival: None,
                realtime_departure: None,
                skipped: false,
            };

            match matched.get(&i) {
                Some(stu) => match stu.relationship {
                    StopRelationship::Skipped => stop.skipped = true,
                    StopRelationship::NoData => {}
                    StopRelationship::Scheduled => {
                        stop.realtime_arrival =
                            stu.arrival.and_then(|e| resolve(e, scheduled_arrival, tz));
                        stop.realtime_departure =
                            stu.departure.and_then(|e| resolve(e, scheduled_departure, tz));
                    }
                },
                None => {
                    if let Some(delay) = trip_delay {
                        let shift = Duration::seconds(i64::from(delay));
                        stop.realtime_arrival = scheduled_arrival.map(|t| t + shift);
                        stop.realtime_departure = scheduled_departure.map(|t| t + shift);
                    }
                }
            }

            stop
        })
        .collect();

    MergedTripView {
        trip_id: trip.id.clone(),
        route_id: trip.route_id.clone(),
        service_date,
        has_realtime: update.is_some(),
        stops,
    }
}

/// Map each stop update to the index of the scheduled stop it refers to.
///
/// Stop sequence is preferred because a loop can visit one stop twice,
/// unless the update's stop id disagrees with the stop at that sequence.
/// Later updates for the same stop replace earlier ones.
fn index_updates<'u>(
    trip: &ScheduledTrip,
    update: &'u TripUpdate,
) -> HashMap<usize, &'u StopTimeUpdate> {
    let mut matched = HashMap::new();
    for stu in &update.stop_time_updates {
        let by_sequence = stu
            .stop_sequence
            .and_then(|seq| trip.stop_times.iter().position(|st| st.sequence == seq))
            .filter(|&i| match &stu.stop_id {
                Some(id) if *id != trip.stop_times[i].stop_id => {
                    debug!(
                        trip_id = %update.trip_id,
                        stop_id = %id,
                        stop_sequence = ?stu.stop_sequence,
                        "stop sequence names a different stop, matching by stop id"
                    );
                    false
                }
                _ => true,
            });
        let index = by_sequence.or_else(|| {
            stu.stop_id
                .as_ref()
                .and_then(|id| position_by_stop(&trip.stop_times, id))
        });

        match index {
            Some(i) => {
                matched.insert(i, stu);
            }
            None => debug!(
                trip_id = %update.trip_id,
                stop_id = ?stu.stop_id,
                stop_sequence = ?stu.stop_sequence,
                "stop update does not match the scheduled trip"
            ),
        }
    }
    matched
}

fn position_by_stop(stop_times: &[ScheduledStopTime], stop: &StopId) -> Option<usize> {
    stop_times.iter().position(|st| &st.stop_id == stop)
}

/// An absolute time wins; a bare delay shifts the scheduled time.
fn resolve(event: StopTimeEvent, scheduled: Option<LocalTime>, tz: Tz) -> Option<LocalTime> {
    if let Some(time) = event.time {
        return Some(time.with_timezone(&tz));
    }
    let delay = event.delay_secs?;
    scheduled.map(|t| t + Duration::seconds(i64::from(delay)))
}
