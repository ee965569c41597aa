//! Unique identifiers for orchestration runs and their events.
//!
//! Both are ULIDs: they sort by creation time, so a run id also tells when
//! the run began.

use crate::Time;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            #[doc = concat!("Generate a new `", stringify!($name), "`")]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creation time encoded in the id, millisecond precision
            pub fn created_at(&self) -> Time {
                Utc.timestamp_millis_opt(self.0.timestamp_ms() as i64)
                    .single()
                    .unwrap_or_default()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

ulid_id!(
    /// Identifier of one packaging run
    RunId
);

ulid_id!(
    /// Identifier of a single run event
    EventId
);

impl RunId {
    /// Trailing random part of the id, enough to tell runs apart in logs.
    pub fn short(&self) -> String {
        let text = self.0.to_string();
        text[text.len() - 6..].to_string()
    }
}
