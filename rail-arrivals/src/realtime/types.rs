//! Decoded realtime trip updates.
//!
//! These are format-neutral: both the protobuf and JSON decoders produce
//! them. They live for a single poll.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{RouteId, StopId, TripId};

/// An estimated or actual arrival or departure at one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopTimeEvent {
    /// Absolute predicted time.
    pub time: Option<DateTime<Utc>>,
    /// Offset from the scheduled time, in seconds.
    pub delay_secs: Option<i32>,
}

impl StopTimeEvent {
    /// Returns true if the event carries any usable prediction.
    pub fn is_informative(&self) -> bool {
        self.time.is_some() || self.delay_secs.is_some()
    }
}

/// Per-stop relationship to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopRelationship {
    #[default]
    Scheduled,
    /// The train will not call at this stop.
    Skipped,
    /// No prediction; keep the scheduled time.
    NoData,
}

/// Trip-level relationship to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripRelationship {
    #[default]
    Scheduled,
    Added,
    Unscheduled,
    Canceled,
}

/// A realtime update for one stop of one trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopTimeUpdate {
    pub stop_id: Option<StopId>,
    pub stop_sequence: Option<u32>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    pub relationship: StopRelationship,
}

/// A realtime update for one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripUpdate {
    pub trip_id: TripId,
    pub route_id: Option<RouteId>,
    /// Service date the trip instance belongs to.
    pub start_date: Option<NaiveDate>,
    pub relationship: TripRelationship,
    /// Trip-wide delay, applied to stops without their own update.
    pub delay_secs: Option<i32>,
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

impl TripUpdate {
    /// Create an update with no stop-level data.
    pub fn new(trip_id: impl Into<TripId>) -> Self {
        Self {
            trip_id: trip_id.into(),
            route_id: None,
            start_date: None,
            relationship: TripRelationship::Scheduled,
            delay_secs: None,
            stop_time_updates: Vec::new(),
        }
    }
}

/// The result of one successful feed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedBatch {
    /// When this client received the payload.
    pub fetched_at: DateTime<Utc>,
    /// Header timestamp reported by the feed, if any.
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub trips: Vec<TripUpdate>,
}

impl FeedBatch {
    pub fn new(fetched_at: DateTime<Utc>, trips: Vec<TripUpdate>) -> Self {
        Self {
            fetched_at,
            feed_timestamp: None,
            trips,
        }
    }

    /// Updates keyed by trip id, in id order.
    ///
    /// A feed should carry at most one update per trip; if it repeats one,
    /// the later entity wins.
    pub fn by_trip(&self) -> BTreeMap<&TripId, &TripUpdate> {
        self.trips.iter().map(|t| (&t.trip_id, t)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_trip_last_wins() {
        let mut first = TripUpdate::new("T1");
        first.delay_secs = Some(60);
        let mut second = TripUpdate::new("T1");
        second.delay_secs = Some(120);

        let batch = FeedBatch::new(Utc::now(), vec![first, TripUpdate::new("T0"), second]);
        let grouped = batch.by_trip();

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&TripId::new("T1")].delay_secs, Some(120));
        let ids: Vec<&str> = grouped.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["T0", "T1"]);
    }

    #[test]
    fn informative_events() {
        assert!(!StopTimeEvent::default().is_informative());
        assert!(
            StopTimeEvent {
                time: None,
                delay_secs: Some(0)
            }
            .is_informative()
        );
    }
}
