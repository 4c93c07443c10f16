// crates/exam-catalog-core/src/runtime/error.rs
// ============================================================================
// Module: Exam Catalog Error Taxonomy
// Description: Service-level error kinds with structured details.
// Purpose: Preserve error kind across layers for transport status mapping.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`CatalogError`] is what every [`crate::CatalogService`] operation
//! returns. Its [`ErrorKind`] is stable and drives transport status codes;
//! [`CatalogError::details`] carries the structured context (field errors,
//! resource, id, operation) clients and logs need.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::interfaces::ResourceKind;
use crate::interfaces::StoreError;
use crate::validation::ValidationError;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Aggregate failed validation.
    Validation,
    /// Request was malformed.
    InvalidInput,
    /// Addressed entity or its parent does not exist.
    NotFound,
    /// Unique name constraint violated.
    DuplicateName,
    /// Optimistic concurrency conflict.
    Conflict,
    /// Deadline exceeded.
    Timeout,
    /// Caller cancelled the operation.
    Cancelled,
    /// Non-retryable persistence failure.
    Db,
    /// Unclassified failure.
    Internal,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog service errors.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Aggregate failed validation.
    #[error("validation failed")]
    Validation(#[from] ValidationError),
    /// Request was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Addressed entity does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Entity kind.
        resource: ResourceKind,
        /// Raw id.
        id: u64,
    },
    /// Parent of a scoped write does not exist.
    #[error("parent {resource} {id} not found")]
    ParentNotFound {
        /// Parent kind.
        resource: ResourceKind,
        /// Raw parent id.
        id: u64,
    },
    /// Unique name constraint violated.
    #[error("{resource} name already exists")]
    DuplicateName {
        /// Entity kind.
        resource: ResourceKind,
        /// Conflicting name.
        name: String,
    },
    /// Stored version differs from the supplied version.
    #[error("{resource} {id} was modified by another request")]
    Conflict {
        /// Entity kind.
        resource: ResourceKind,
        /// Raw id.
        id: u64,
        /// Version supplied by the caller.
        expected: i64,
    },
    /// Deadline exceeded.
    #[error("{operation} timed out")]
    Timeout {
        /// Operation label.
        operation: String,
    },
    /// Caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// Operation label.
        operation: String,
    },
    /// Non-retryable persistence failure (or retries exhausted).
    #[error("database error: {0}")]
    Db(String),
    /// Unclassified failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Returns the stable kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound {
                ..
            }
            | Self::ParentNotFound {
                ..
            } => ErrorKind::NotFound,
            Self::DuplicateName {
                ..
            } => ErrorKind::DuplicateName,
            Self::Conflict {
                ..
            } => ErrorKind::Conflict,
            Self::Timeout {
                ..
            } => ErrorKind::Timeout,
            Self::Cancelled {
                ..
            } => ErrorKind::Cancelled,
            Self::Db(_) => ErrorKind::Db,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the machine-readable code clients see.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound {
                ..
            } => "NOT_FOUND",
            Self::ParentNotFound {
                ..
            } => "PARENT_NOT_FOUND",
            Self::DuplicateName {
                ..
            } => "DUPLICATE_NAME",
            Self::Conflict {
                ..
            } => "CONFLICT",
            Self::Timeout {
                ..
            } => "TIMEOUT",
            Self::Cancelled {
                ..
            } => "CANCELLED",
            Self::Db(_) => "DB_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe message; engine detail never leaks.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Db(_) => "the catalog could not complete the request".to_string(),
            Self::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns structured details for transport and logs.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            Self::Validation(error) => {
                details.insert("errors".to_string(), json!(error.errors()));
            }
            Self::NotFound {
                resource,
                id,
            }
            | Self::ParentNotFound {
                resource,
                id,
            } => {
                details.insert("resource".to_string(), json!(resource));
                details.insert("id".to_string(), json!(id));
            }
            Self::DuplicateName {
                resource,
                name,
            } => {
                details.insert("resource".to_string(), json!(resource));
                details.insert("name".to_string(), json!(name));
            }
            Self::Conflict {
                resource,
                id,
                expected,
            } => {
                details.insert("resource".to_string(), json!(resource));
                details.insert("id".to_string(), json!(id));
                details.insert("expected_version".to_string(), json!(expected));
            }
            Self::Timeout {
                operation,
            }
            | Self::Cancelled {
                operation,
            } => {
                details.insert("operation".to_string(), json!(operation));
            }
            Self::InvalidInput(_) | Self::Db(_) | Self::Internal(_) => {}
        }
        details
    }

    /// Converts a store error, labelling deadline errors with the operation.
    #[must_use]
    pub fn from_store(error: StoreError, operation: &str) -> Self {
        match error {
            StoreError::NotFound {
                resource,
                id,
            } => Self::NotFound {
                resource,
                id,
            },
            StoreError::ParentNotFound {
                resource,
                id,
            } => Self::ParentNotFound {
                resource,
                id,
            },
            StoreError::DuplicateName {
                resource,
                name,
            } => Self::DuplicateName {
                resource,
                name,
            },
            StoreError::Conflict {
                resource,
                id,
                expected,
            } => Self::Conflict {
                resource,
                id,
                expected,
            },
            StoreError::Validation(error) => Self::Validation(error),
            StoreError::Cancelled => Self::Cancelled {
                operation: operation.to_string(),
            },
            StoreError::Timeout => Self::Timeout {
                operation: operation.to_string(),
            },
            StoreError::Invalid(message) => Self::InvalidInput(message),
            StoreError::Db(message)
            | StoreError::Corrupt(message)
            | StoreError::VersionMismatch(message) => Self::Db(message),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ErrorCode;

    #[test]
    fn store_errors_keep_their_kind() {
        let conflict = CatalogError::from_store(
            StoreError::Conflict {
                resource: ResourceKind::University,
                id: 7,
                expected: 3,
            },
            "update_university",
        );
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(conflict.details()["expected_version"], json!(3));

        let timeout = CatalogError::from_store(StoreError::Timeout, "create_university");
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(timeout.details()["operation"], json!("create_university"));
    }

    #[test]
    fn db_details_do_not_leak_into_public_message() {
        let error = CatalogError::Db("near \"SELEC\": syntax error".to_string());
        assert!(!error.public_message().contains("SELEC"));
        assert_eq!(error.code(), "DB_ERROR");
    }

    #[test]
    fn validation_details_list_field_errors() {
        let error = CatalogError::from(ValidationError::single(
            "departments[1].name",
            ErrorCode::DuplicateName,
            "duplicate",
        ));
        let details = error.details();
        assert_eq!(details["errors"][0]["field_path"], json!("departments[1].name"));
        assert_eq!(details["errors"][0]["code"], json!("DUPLICATE_NAME"));
    }
}
