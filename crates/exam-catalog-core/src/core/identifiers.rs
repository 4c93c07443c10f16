// crates/exam-catalog-core/src/core/identifiers.rs
// ============================================================================
// Module: Exam Catalog Identifiers
// Description: Store-assigned numeric identifiers for catalog entities.
// Purpose: Keep ids of different entity kinds from being mixed up.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every catalog row carries a positive integer id assigned by the store.
//! Identifiers serialize as bare JSON numbers. Each entity kind has its own
//! wrapper so a `DepartmentId` cannot be passed where a `MajorId` is expected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Declares a numeric identifier wrapper with the shared accessor surface.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from its raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

numeric_id!(
    /// University identifier.
    UniversityId
);
numeric_id!(
    /// Department identifier.
    DepartmentId
);
numeric_id!(
    /// Major identifier.
    MajorId
);
numeric_id!(
    /// Admission schedule identifier.
    AdmissionScheduleId
);
numeric_id!(
    /// Admission info identifier.
    AdmissionInfoId
);
numeric_id!(
    /// Test type identifier.
    TestTypeId
);
numeric_id!(
    /// Subject identifier.
    SubjectId
);
numeric_id!(
    /// Filter option identifier.
    FilterOptionId
);

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

    use super::*;

    #[test]
    fn identifiers_serialize_as_bare_numbers() {
        let id = DepartmentId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: DepartmentId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string(), "42");
    }
}
