//! Strongly-typed UUID wrappers for directory resources.
//!
//! Wrapping the raw [`Uuid`] prevents identifier mix-ups at compile time
//! when several kinds of UUID flow through the same code paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Macro to generate strongly-typed UUID wrapper types.
macro_rules! uuid_type {
    ($(#[$meta:meta])* $name:ident, $doc:expr) => {
        $(#[$meta])*
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new UUID wrapper from a [`Uuid`].
            #[must_use]
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Creates a new random UUID (v4).
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the inner [`Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Converts to the inner [`Uuid`].
            #[must_use]
            pub const fn into_uuid(self) -> Uuid {
                self.0
            }

            /// Parses a UUID from a string.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not a valid UUID.
            pub fn parse_str(input: &str) -> Result<Self> {
                Uuid::parse_str(input)
                    .map(Self)
                    .map_err(|_| Error::InvalidArgument(format!("invalid UUID `{input}`")))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(wrapper: $name) -> Self {
                wrapper.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse_str(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

uuid_type!(AccountUuid, "Account (user) UUID, the primary identity of a directory account");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        let account = AccountUuid::parse_str(raw).unwrap();
        assert_eq!(account.to_string(), raw);
        assert_eq!(account, AccountUuid::new(*account.as_uuid()));
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = AccountUuid::parse_str("alice17").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn from_str_matches_parse_str() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        let parsed: AccountUuid = raw.parse().unwrap();
        assert_eq!(parsed, AccountUuid::parse_str(raw).unwrap());
    }

    #[test]
    fn random_uuids_are_distinct() {
        assert_ne!(AccountUuid::new_v4(), AccountUuid::new_v4());
    }
}
