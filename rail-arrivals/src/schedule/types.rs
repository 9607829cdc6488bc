//! In-memory static schedule records.
//!
//! These are the indexed forms of the GTFS tables the engine needs. All
//! of them are immutable once a snapshot is built; a refresh replaces the
//! whole snapshot rather than editing records in place.

use crate::domain::{RouteId, ServiceTime, StopId, TripId};

/// A stop or station (from stops.txt).
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: StopId,
    /// Human-readable name, e.g. "Oak Park".
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// A line (from routes.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

impl Route {
    /// Name to show for this line: long name, else short name, else the id.
    pub fn display_name(&self) -> &str {
        self.long_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.short_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(self.id.as_str())
    }
}

/// One scheduled call of a trip at a stop (from stop_times.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStopTime {
    pub stop_id: StopId,
    /// `stop_sequence`; strictly increasing along the trip.
    pub sequence: u32,
    pub arrival: Option<ServiceTime>,
    pub departure: Option<ServiceTime>,
}

/// A scheduled run of a train along its line (from trips.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrip {
    pub id: TripId,
    pub route_id: RouteId,
    pub service_id: String,
    pub headsign: Option<String>,
    pub direction_id: Option<u8>,
    /// Calls ordered by `sequence`.
    pub stop_times: Vec<ScheduledStopTime>,
}

impl ScheduledTrip {
    /// Position of the first call at `stop` in the ordered stop times.
    pub fn position_of(&self, stop: &StopId) -> Option<usize> {
        self.stop_times.iter().position(|st| &st.stop_id == stop)
    }

    /// Returns true if the trip calls at `from` and later at `to`.
    pub fn serves_in_order(&self, from: &StopId, to: &StopId) -> bool {
        match self.position_of(from) {
            Some(i) => self.stop_times[i + 1..].iter().any(|st| &st.stop_id == to),
            None => false,
        }
    }
}
