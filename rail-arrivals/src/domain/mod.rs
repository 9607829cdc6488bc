//! Domain types shared by the schedule, realtime and engine layers.
//!
//! Identifiers are newtypes over GTFS strings; times carry
//! enough context (service date, time zone) to compare schedule and
//! realtime values directly.

mod ids;
mod time;

pub use ids::{RouteId, StopId, TripId};
pub use time::{LocalTime, ServiceTime, TimeError, clock, parse_service_date};
