//! Strongly-typed identifiers used across the domain.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[doc(hidden)]
pub use uuid::Uuid;

/// Declare a UUID-backed identifier newtype.
///
/// Downstream crates use this for their own identifiers (`DrugId`,
/// `PrescriptionId`, ...) so every id shares the same parsing and display rules.
/// The calling crate must depend on `serde`.
#[macro_export]
macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $t($crate::id::Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self($crate::id::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: $crate::id::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &$crate::id::Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::id::Uuid> for $t {
            fn from(value: $crate::id::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $crate::id::Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = <$crate::id::Uuid as core::str::FromStr>::from_str(s)
                    .map_err(|e| $crate::DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a user (the actor stamped on every mutation).
    UserId,
    "UserId"
);

uuid_newtype!(
    /// Untyped identifier of a persisted record, used for cross-crate references.
    AggregateId,
    "AggregateId"
);

/// A typed reference to the record that caused a side effect
/// (e.g. the prescription line behind a ledger entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record kind, e.g. `"prescription_line"`.
    pub kind: String,
    pub id: AggregateId,
}

impl RecordRef {
    pub fn new(kind: impl Into<String>, id: impl Into<AggregateId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl TryFrom<(&str, &str)> for RecordRef {
    type Error = DomainError;

    fn try_from((kind, id): (&str, &str)) -> Result<Self, Self::Error> {
        if kind.trim().is_empty() {
            return Err(DomainError::validation("record reference kind cannot be empty"));
        }
        Ok(Self::new(kind, id.parse::<AggregateId>()?))
    }
}
