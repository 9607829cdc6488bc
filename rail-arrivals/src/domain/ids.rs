//! Identifier newtypes for GTFS entities.
//!
//! GTFS identifiers are opaque strings shared between the static schedule
//! and the realtime feed. Wrapping them keeps a stop id from being passed
//! where a trip id is expected, while `Borrow<str>` keeps map lookups by
//! plain `&str` cheap.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! gtfs_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
    };
}

gtfs_id!(
    /// A `trip_id` from trips.txt, also used by realtime trip descriptors.
    TripId
);

gtfs_id!(
    /// A `stop_id` from stops.txt.
    StopId
);

gtfs_id!(
    /// A `route_id` from routes.txt. A commuter-rail line is one route.
    RouteId
);
