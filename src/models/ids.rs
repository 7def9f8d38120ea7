//! Integer row identifiers.
//!
//! Every table uses a database-generated integer primary key. The newtypes
//! keep user, medication, and event identifiers from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Primary key of a `users` row.
    UserId
);

row_id!(
    /// Primary key of a `medications` row.
    MedicationId
);

row_id!(
    /// Primary key of a `medication_events` row.
    EventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&EventId::new(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_ids_display_raw_value() {
        assert_eq!(UserId::new(7).to_string(), "7");
        assert_eq!(MedicationId::from(3).get(), 3);
    }
}
