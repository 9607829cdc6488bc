//! Commuter-rail arrival tracker.
//!
//! Reconciles a static GTFS schedule with a GTFS-realtime trip-update feed
//! and publishes, for each configured line and station pair, the next
//! three trains with their predicted departure and arrival times.

pub mod config;
pub mod domain;
pub mod engine;
pub mod realtime;
pub mod schedule;
pub mod slots;
pub mod web;
