//! Static schedule store.
//!
//! Downloads the GTFS archive, indexes stops, routes, trips and stop
//! times, and serves immutable snapshots to the poll cycles. Static data
//! changes rarely, so the store is loaded at startup and refreshed on a
//! long interval.

mod calendar;
mod error;
mod parse;
mod snapshot;
mod source;
mod store;
mod types;

pub use calendar::{ServiceCalendar, ServiceException, WeeklyService};
pub use error::ScheduleError;
pub use parse::{GtfsTables, parse_archive};
pub use snapshot::{ScheduleSnapshot, ScheduleSummary};
pub use source::{HttpScheduleSource, ScheduleSource};
pub use store::ScheduleStore;
pub use types::{Route, ScheduledStopTime, ScheduledTrip, Stop};
