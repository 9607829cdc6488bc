//! Read-only JSON API over the published slots.
//!
//! Exposes each tracker's current publication and the stop lists used to
//! pick a station pair. Nothing here writes to the engine.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::{AppState, TrackerHandle};
