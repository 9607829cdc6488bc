//! Realtime trip-update feed.
//!
//! Fetches the GTFS-realtime feed on each tracker tick and decodes it into
//! [`FeedBatch`]es. [`FeedClient`] turns failures into stale results so the
//! poll loop always has the best available data.

mod client;
mod decode;
mod error;
#[cfg(test)]
pub(crate) mod fake;
mod poller;
mod types;

pub use client::{Credential, DEFAULT_KEY_PARAM, FeedSource, HttpFeedSource, MAX_FEED_BYTES};
pub use decode::{FeedFormat, decode_feed, decode_json, decode_protobuf};
pub use error::FeedError;
pub use poller::{DEFAULT_DEGRADED_AFTER, FeedClient, FeedResult};
pub use types::{
    FeedBatch, StopRelationship, StopTimeEvent, StopTimeUpdate, TripRelationship, TripUpdate,
};
