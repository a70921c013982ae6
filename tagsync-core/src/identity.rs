//! Identity types for tagsync records
//!
//! The remote store mints every identifier and version. The client only ever
//! echoes them back, so ids are opaque strings wrapped in distinct types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic version number minted by the store on every successful write.
pub type Version = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! persistent_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

persistent_id!(
    /// Persistent identifier of an entity (a table row).
    EntityId
);
persistent_id!(
    /// Persistent identifier of a tag definition (a table column).
    TagDefinitionId
);
persistent_id!(
    /// Persistent identifier of a single tag instance (a cell value).
    TagInstanceId
);
persistent_id!(
    /// Persistent identifier of a merge request.
    MergeRequestId
);
persistent_id!(UserId);
