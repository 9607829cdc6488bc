//! Arrival prediction engine.
//!
//! Each tracker cycle is a pure function of the schedule snapshot, the
//! realtime batch and the clock:
//!
//! 1. [`match_trips`] merges realtime updates onto scheduled trips.
//! 2. [`build_candidates`] keeps trips that serve the tracked stop pair in
//!    the right direction.
//! 3. [`rank_candidates`] orders them by departure and keeps the first three.
//!
//! [`Tracker`] drives that pipeline on a timer and publishes the result.

mod candidates;
mod matcher;
mod tracker;


pub use candidates::{
    ArrivalCandidate, SLOT_COUNT, TrackerTarget, build_candidates, effective_arrival,
    effective_departure, rank_candidates,
};
pub use matcher::{
    MatchContext, MatchDrop, MatchOutcome, MergedStop, MergedTripView, match_trips, merge_trip,
};
pub use tracker::{CycleOutcome, Evaluation, Tracker, evaluate};
