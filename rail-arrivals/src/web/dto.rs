//! Response bodies for the JSON API.

use serde::Serialize;

use crate::schedule::{Route, Stop};
use crate::slots::{Publication, SlotView};

use super::state::TrackerHandle;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,

    /// Whether a static schedule has been loaded
    pub schedule_loaded: bool,

    /// When the current schedule was built (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_loaded_at: Option<String>,

    /// Number of configured trackers
    pub trackers: usize,
}

/// One entry in the tracker list.
#[derive(Debug, Serialize)]
pub struct TrackerSummary {
    pub id: String,
    pub line_id: String,
    pub departure_stop_id: String,
    pub arrival_stop_id: String,

    /// Last successful realtime poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    /// Number of slots holding a train
    pub filled: usize,
}

impl TrackerSummary {
    pub fn new(handle: &TrackerHandle, publication: &Publication) -> Self {
        Self {
            id: handle.config.id.clone(),
            line_id: handle.config.line_id.to_string(),
            departure_stop_id: handle.config.departure_stop_id.to_string(),
            arrival_stop_id: handle.config.arrival_stop_id.to_string(),
            last_update: publication.last_update.as_ref().map(|t| t.to_rfc3339()),
            filled: publication.filled(),
        }
    }
}

/// List of trackers.
#[derive(Debug, Serialize)]
pub struct TrackerListResponse {
    pub trackers: Vec<TrackerSummary>,
}

/// A tracker's current publication.
#[derive(Debug, Serialize)]
pub struct TrackerResponse {
    pub id: String,
    pub line_name: String,
    pub departure_station: String,
    pub arrival_station: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    /// When the slots were last rebuilt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    pub slots: Vec<SlotView>,
}

impl TrackerResponse {
    pub fn new(id: &str, publication: &Publication) -> Self {
        Self {
            id: id.to_string(),
            line_name: publication.line_name.clone(),
            departure_station: publication.departure_station.clone(),
            arrival_station: publication.arrival_station.clone(),
            last_update: publication.last_update.as_ref().map(|t| t.to_rfc3339()),
            published_at: publication.published_at.as_ref().map(|t| t.to_rfc3339()),
            slots: publication.views(),
        }
    }
}

/// A stop in a line's stop list.
#[derive(Debug, Serialize)]
pub struct StopResult {
    pub id: String,
    pub name: String,
}

impl From<&Stop> for StopResult {
    fn from(stop: &Stop) -> Self {
        Self {
            id: stop.id.to_string(),
            name: stop.name.clone(),
        }
    }
}

/// Stops served by a line, in line order.
#[derive(Debug, Serialize)]
pub struct LineStopsResponse {
    pub line_id: String,
    pub line_name: String,
    pub stops: Vec<StopResult>,
}

impl LineStopsResponse {
    pub fn new(route: &Route, stops: &[&Stop]) -> Self {
        Self {
            line_id: route.id.to_string(),
            line_name: route.display_name().to_string(),
            stops: stops.iter().map(|s| StopResult::from(*s)).collect(),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteId, StopId};

    #[test]
    fn line_stops_response() {
        let route = Route {
            id: RouteId::new("UP-W"),
            short_name: Some("UP-W".into()),
            long_name: Some("Union Pacific West".into()),
        };
        let oak = Stop {
            id: StopId::new("OAKPARK"),
            name: "Oak Park".into(),
            lat: None,
            lon: None,
        };

        let response = LineStopsResponse::new(&route, &[&oak]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["line_name"], "Union Pacific West");
        assert_eq!(json["stops"][0]["id"], "OAKPARK");
        assert_eq!(json["stops"][0]["name"], "Oak Park");
    }

    #[test]
    fn empty_publication_omits_timestamps() {
        let response = TrackerResponse::new("t", &Publication::empty());
        let json = serde_json::to_value(&response).unwrap();

        assert!(json.get("last_update").is_none());
        assert!(json.get("published_at").is_none());
        assert_eq!(json["slots"].as_array().unwrap().len(), 3);
        assert_eq!(json["slots"][0]["state"], "No data");
    }
}
