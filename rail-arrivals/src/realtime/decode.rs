//! Payload decoders for the realtime feed.
//!
//! Two encodings are supported: standard GTFS-realtime protobuf, and the
//! JSON rendering of the same messages served by some agencies (an array
//! of entities whose timestamps are wrapped as `{"low": "<ISO 8601>"}`).

use chrono::{DateTime, Utc};
use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{RouteId, StopId, TripId, parse_service_date};

use super::error::FeedError;
use super::types::{
    FeedBatch, StopRelationship, StopTimeEvent, StopTimeUpdate, TripRelationship, TripUpdate,
};

/// Payload encoding of the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Protobuf,
    Json,
}

// GTFS-realtime enum values, shared by both encodings.
const STOP_SKIPPED: i32 = 1;
const STOP_NO_DATA: i32 = 2;
const TRIP_ADDED: i32 = 1;
const TRIP_UNSCHEDULED: i32 = 2;
const TRIP_CANCELED: i32 = 3;
const TRIP_DELETED: i32 = 7;

/// Decode a payload in the given format.
pub fn decode_feed(
    format: FeedFormat,
    bytes: &[u8],
    fetched_at: DateTime<Utc>,
) -> Result<FeedBatch, FeedError> {
    match format {
        FeedFormat::Protobuf => decode_protobuf(bytes, fetched_at),
        FeedFormat::Json => decode_json(bytes, fetched_at),
    }
}

/// Decode a GTFS-realtime `FeedMessage`.
pub fn decode_protobuf(bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<FeedBatch, FeedError> {
    let feed = gtfs_rt::FeedMessage::decode(bytes)?;

    let feed_timestamp = feed
        .header
        .timestamp
        .and_then(|ts| i64::try_from(ts).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    let mut trips = Vec::new();
    for entity in &feed.entity {
        if entity.is_deleted == Some(true) {
            continue;
        }
        let Some(update) = &entity.trip_update else {
            continue;
        };
        let Some(trip_id) = update.trip.trip_id.as_deref().filter(|s| !s.is_empty()) else {
            debug!(entity = %entity.id, "trip update without trip_id");
            continue;
        };

        trips.push(TripUpdate {
            trip_id: TripId::new(trip_id),
            route_id: update.trip.route_id.as_deref().map(RouteId::new),
            start_date: update
                .trip
                .start_date
                .as_deref()
                .and_then(|d| parse_service_date(d).ok()),
            relationship: trip_relationship(update.trip.schedule_relationship),
            delay_secs: update.delay,
            stop_time_updates: update
                .stop_time_update
                .iter()
                .map(|stu| StopTimeUpdate {
                    stop_id: stu.stop_id.as_deref().map(StopId::new),
                    stop_sequence: stu.stop_sequence,
                    arrival: stu.arrival.as_ref().map(protobuf_event),
                    departure: stu.departure.as_ref().map(protobuf_event),
                    relationship: stop_relationship(stu.schedule_relationship),
                })
                .collect(),
        });
    }

    Ok(FeedBatch {
        fetched_at,
        feed_timestamp,
        trips,
    })
}

fn protobuf_event(event: &gtfs_rt::trip_update::StopTimeEvent) -> StopTimeEvent {
    StopTimeEvent {
        time: event.time.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        delay_secs: event.delay,
    }
}

fn stop_relationship(code: Option<i32>) -> StopRelationship {
    match code {
        Some(STOP_SKIPPED) => StopRelationship::Skipped,
        Some(STOP_NO_DATA) => StopRelationship::NoData,
        _ => StopRelationship::Scheduled,
    }
}

fn trip_relationship(code: Option<i32>) -> TripRelationship {
    match code {
        Some(TRIP_ADDED) => TripRelationship::Added,
        Some(TRIP_UNSCHEDULED) => TripRelationship::Unscheduled,
        Some(TRIP_CANCELED) | Some(TRIP_DELETED) => TripRelationship::Canceled,
        _ => TripRelationship::Scheduled,
    }
}

// --- JSON encoding ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFeed {
    Entities(Vec<JsonEntity>),
    Message {
        #[serde(default)]
        header: Option<JsonHeader>,
        #[serde(default)]
        entity: Vec<JsonEntity>,
    },
}

#[derive(Debug, Deserialize)]
struct JsonHeader {
    #[serde(default)]
    timestamp: Option<JsonTime>,
}

#[derive(Debug, Deserialize)]
struct JsonEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    is_deleted: Option<bool>,
    #[serde(default)]
    trip_update: Option<JsonTripUpdate>,
}

#[derive(Debug, Deserialize)]
struct JsonTripUpdate {
    #[serde(default)]
    trip: JsonTrip,
    #[serde(default)]
    stop_time_update: Vec<JsonStopTimeUpdate>,
    #[serde(default)]
    delay: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonTrip {
    #[serde(default)]
    trip_id: Option<String>,
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    schedule_relationship: Option<JsonRelationship>,
}

#[derive(Debug, Deserialize)]
struct JsonStopTimeUpdate {
    #[serde(default)]
    stop_sequence: Option<u32>,
    #[serde(default)]
    stop_id: Option<String>,
    #[serde(default)]
    arrival: Option<JsonEvent>,
    #[serde(default)]
    departure: Option<JsonEvent>,
    #[serde(default)]
    schedule_relationship: Option<JsonRelationship>,
}

#[derive(Debug, Deserialize)]
struct JsonEvent {
    #[serde(default)]
    delay: Option<i32>,
    #[serde(default)]
    time: Option<JsonTime>,
}

/// Timestamps appear as epoch seconds, ISO strings, or either of those
/// wrapped in a `{"low": ...}` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTime {
    Epoch(i64),
    Text(String),
    Wrapped {
        #[serde(default)]
        low: Option<Box<JsonTime>>,
    },
}

impl JsonTime {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            JsonTime::Epoch(secs) => DateTime::from_timestamp(*secs, 0),
            JsonTime::Text(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    debug!(value = %s, error = %e, "unparseable feed timestamp");
                    None
                }
            },
            JsonTime::Wrapped { low } => low.as_ref().and_then(|t| t.resolve()),
        }
    }
}

/// Enum fields may be numeric codes or their protobuf names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRelationship {
    Code(i32),
    Name(String),
}

impl JsonRelationship {
    fn stop_code(&self) -> i32 {
        match self {
            JsonRelationship::Code(c) => *c,
            JsonRelationship::Name(n) => match n.to_ascii_uppercase().as_str() {
                "SKIPPED" => STOP_SKIPPED,
                "NO_DATA" => STOP_NO_DATA,
                _ => 0,
            },
        }
    }

    fn trip_code(&self) -> i32 {
        match self {
            JsonRelationship::Code(c) => *c,
            JsonRelationship::Name(n) => match n.to_ascii_uppercase().as_str() {
                "ADDED" => TRIP_ADDED,
                "UNSCHEDULED" => TRIP_UNSCHEDULED,
                "CANCELED" | "CANCELLED" => TRIP_CANCELED,
                "DELETED" => TRIP_DELETED,
                _ => 0,
            },
        }
    }
}

/// Decode the JSON rendering of a trip-update feed.
pub fn decode_json(bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<FeedBatch, FeedError> {
    let feed: JsonFeed = serde_json::from_slice(bytes).map_err(|e| FeedError::Json {
        message: e.to_string(),
        body: Some(String::from_utf8_lossy(bytes).chars().take(500).collect()),
    })?;

    let (feed_timestamp, entities) = match feed {
        JsonFeed::Entities(entities) => (None, entities),
        JsonFeed::Message { header, entity } => (
            header
                .and_then(|h| h.timestamp)
                .and_then(|t| t.resolve()),
            entity,
        ),
    };

    let mut trips = Vec::new();
    for entity in entities {
        if entity.is_deleted == Some(true) {
            continue;
        }
        let Some(update) = entity.trip_update else {
            continue;
        };
        let Some(trip_id) = update.trip.trip_id.filter(|s| !s.is_empty()) else {
            debug!(entity = ?entity.id, "trip update without trip_id");
            continue;
        };

        trips.push(TripUpdate {
            trip_id: TripId::new(trip_id),
            route_id: update.trip.route_id.map(RouteId::new),
            start_date: update
                .trip
                .start_date
                .as_deref()
                .and_then(|d| parse_service_date(d).ok()),
            relationship: trip_relationship(
                update.trip.schedule_relationship.map(|r| r.trip_code()),
            ),
            delay_secs: update.delay,
            stop_time_updates: update
                .stop_time_update
                .into_iter()
                .map(|stu| StopTimeUpdate {
                    stop_id: stu.stop_id.map(StopId::new),
                    stop_sequence: stu.stop_sequence,
                    arrival: stu.arrival.map(json_event),
                    departure: stu.departure.map(json_event),
                    relationship: stop_relationship(
                        stu.schedule_relationship.map(|r| r.stop_code()),
                    ),
                })
                .collect(),
        });
    }

    Ok(FeedBatch {
        fetched_at,
        feed_timestamp,
        trips,
    })
}

fn json_event(event: JsonEvent) -> StopTimeEvent {
    StopTimeEvent {
        time: event.time.as_ref().and_then(JsonTime::resolve),
        delay_secs: event.delay,
    }
}
