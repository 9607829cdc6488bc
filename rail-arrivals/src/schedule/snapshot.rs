//! Immutable, indexed view of one static schedule generation.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::{RouteId, StopId, TripId};

use super::calendar::ServiceCalendar;
use super::types::{Route, ScheduledTrip, Stop};

/// Counts reported after a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub stops: usize,
    pub routes: usize,
    pub trips: usize,
}

/// One fully-built schedule generation.
///
/// Built off to the side by the loader and then published as a whole, so
/// a reader holding an `Arc<ScheduleSnapshot>` never sees a half-built
/// index.
#[derive(Debug)]
pub struct ScheduleSnapshot {
    stops: HashMap<StopId, Stop>,
    routes: HashMap<RouteId, Route>,
    trips: HashMap<TripId, ScheduledTrip>,
    /// route_id -> trip ids on that route, sorted
    trips_by_route: HashMap<RouteId, Vec<TripId>>,
    calendar: ServiceCalendar,
    loaded_at: DateTime<Utc>,
}

impl ScheduleSnapshot {
    /// Build the lookup indices over the given tables.
    pub fn new(
        stops: Vec<Stop>,
        routes: Vec<Route>,
        trips: Vec<ScheduledTrip>,
        calendar: ServiceCalendar,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        let stops: HashMap<StopId, Stop> = stops.into_iter().map(|s| (s.id.clone(), s)).collect();
        let routes: HashMap<RouteId, Route> =
            routes.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut trips_by_route: HashMap<RouteId, Vec<TripId>> = HashMap::new();
        for trip in &trips {
            trips_by_route
                .entry(trip.route_id.clone())
                .or_default()
                .push(trip.id.clone());
        }
        for ids in trips_by_route.values_mut() {
            ids.sort();
            ids.dedup();
        }

        let trips = trips.into_iter().map(|t| (t.id.clone(), t)).collect();

        Self {
            stops,
            routes,
            trips,
            trips_by_route,
            calendar,
            loaded_at,
        }
    }

    /// Look up a scheduled trip by id.
    pub fn lookup_trip(&self, trip_id: &str) -> Option<&ScheduledTrip> {
        self.trips.get(trip_id)
    }

    /// Look up a stop by id.
    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    /// Look up a line by id.
    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    /// Trips on a line, in trip id order.
    pub fn trips_for_line(&self, route_id: &str) -> impl Iterator<Item = &ScheduledTrip> {
        self.trips_by_route
            .get(route_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.trips.get(id))
    }

    /// Stops served by a line, for station pickers.
    ///
    /// Ordered along the line's longest trip; stops only reached by other
    /// trips (branches, short turns) follow, sorted by name.
    pub fn stops_for_line(&self, route_id: &str) -> Vec<&Stop> {
        let longest = self
            .trips_for_line(route_id)
            .max_by(|a, b| {
                a.stop_times
                    .len()
                    .cmp(&b.stop_times.len())
                    .then_with(|| b.id.cmp(&a.id))
            });

        let mut seen: HashSet<&StopId> = HashSet::new();
        let mut ordered: Vec<&Stop> = Vec::new();

        if let Some(trip) = longest {
            for st in &trip.stop_times {
                if seen.insert(&st.stop_id)
                    && let Some(stop) = self.stops.get(&st.stop_id)
                {
                    ordered.push(stop);
                }
            }
        }

        let mut extra: Vec<&Stop> = self
            .trips_for_line(route_id)
            .flat_map(|t| t.stop_times.iter())
            .filter(|st| seen.insert(&st.stop_id))
            .filter_map(|st| self.stops.get(&st.stop_id))
            .collect();
        extra.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        ordered.extend(extra);
        ordered
    }

    /// The service calendar for this generation.
    pub fn calendar(&self) -> &ServiceCalendar {
        &self.calendar
    }

    /// When this generation was built.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn summary(&self) -> ScheduleSummary {
        ScheduleSummary {
            stops: self.stops.len(),
            routes: self.routes.len(),
            trips: self.trips.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduledStopTime;

    fn stop(id: &str, name: &str) -> Stop {
        Stop {
            id: StopId::new(id),
            name: name.to_string(),
            lat: None,
            lon: None,
        }
    }

    fn trip(id: &str, route: &str, stops: &[&str]) -> ScheduledTrip {
        ScheduledTrip {
            id: TripId::new(id),
            route_id: RouteId::new(route),
            service_id: "WK".to_string(),
            headsign: None,
            direction_id: None,
            stop_times: stops
                .iter()
                .enumerate()
                .map(|(i, s)| ScheduledStopTime {
                    stop_id: StopId::new(*s),
                    sequence: i as u32 + 1,
                    arrival: None,
                    departure: None,
                })
                .collect(),
        }
    }

    fn snapshot() -> ScheduleSnapshot {
        ScheduleSnapshot::new(
            vec![
                stop("ELBURN", "Elburn"),
                stop("GENEVA", "Geneva"),
                stop("OAKPARK", "Oak Park"),
                stop("OTC", "Chicago OTC"),
                stop("RIVER", "River Forest"),
                stop("BNSF1", "Aurora"),
            ],
            vec![Route {
                id: RouteId::new("UP-W"),
                short_name: None,
                long_name: Some("Union Pacific West".to_string()),
            }],
            vec![
                trip("T2", "UP-W", &["ELBURN", "GENEVA", "OAKPARK", "OTC"]),
                trip("T1", "UP-W", &["RIVER", "OAKPARK", "OTC"]),
                trip("B1", "BNSF", &["BNSF1", "OTC"]),
            ],
            ServiceCalendar::default(),
            Utc::now(),
        )
    }

    #[test]
    fn lookup_trip_by_id() {
        let snap = snapshot();
        assert_eq!(snap.lookup_trip("T1").unwrap().route_id.as_str(), "UP-W");
        assert!(snap.lookup_trip("missing").is_none());
    }

    #[test]
    fn trips_for_line_sorted() {
        let snap = snapshot();
        let ids: Vec<&str> = snap.trips_for_line("UP-W").map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
        assert_eq!(snap.trips_for_line("NOPE").count(), 0);
    }

    #[test]
    fn stops_for_line_follows_longest_trip() {
        let snap = snapshot();
        let names: Vec<&str> = snap
            .stops_for_line("UP-W")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["Elburn", "Geneva", "Oak Park", "Chicago OTC", "River Forest"]
        );
    }

    #[test]
    fn summary_counts() {
        let snap = snapshot();
        assert_eq!(
            snap.summary(),
            ScheduleSummary {
                stops: 6,
                routes: 1,
                trips: 3
            }
        );
    }
}
