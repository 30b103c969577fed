//! Error types for the DynamoDB storage backend.
//!
//! [`TableError`] is what a [`TableClient`](crate::TableClient) reports; it
//! keeps just enough of the SDK's error detail to decide how the failure maps
//! onto the generic [`StorageError`].

use std::fmt;

use thiserror::Error;
use versakv_storage::{BoxError, StorageError};

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Cancellation codes that mean a version condition lost.
const CONFLICT_CODES: [&str; 2] = ["ConditionalCheckFailed", "TransactionConflict"];

/// Errors reported by a table client.
#[derive(Debug, Error)]
pub enum TableError {
    /// The transaction was canceled. `reasons` holds one optional code per
    /// transaction item, in request order.
    #[error("transaction canceled: {}", Reasons(reasons))]
    TransactionCanceled {
        /// Per-item cancellation codes (`None` for items that passed).
        reasons: Vec<Option<String>>,
    },

    /// The request was malformed (too many items, duplicate keys, ...).
    #[error("request rejected: {0}")]
    Validation(String),

    /// Any other service or transport failure.
    #[error("{message}")]
    Service {
        /// Full error context, including nested causes.
        message: String,
        /// The underlying SDK error.
        #[source]
        source: BoxError,
    },
}

impl TableError {
    /// Returns `true` if a version condition failed or lost a race.
    #[must_use]
    pub fn is_condition_failure(&self) -> bool {
        match self {
            Self::TransactionCanceled { reasons } => reasons
                .iter()
                .flatten()
                .any(|code| CONFLICT_CODES.contains(&code.as_str())),
            Self::Validation(_) | Self::Service { .. } => false,
        }
    }

    /// Converts into the storage error reported for `operation`.
    #[must_use]
    pub fn into_storage_error(self, operation: &'static str) -> StorageError {
        if self.is_condition_failure() {
            tracing::debug!(operation, "version condition failed");
            return StorageError::conflict();
        }
        match self {
            Self::Validation(message) => StorageError::invalid_argument(message),
            Self::TransactionCanceled { reasons } => {
                let message = format!("transaction canceled: {}", Reasons(&reasons));
                tracing::warn!(operation, error = %message, "DynamoDB transaction canceled");
                StorageError::backend(operation, message)
            },
            Self::Service { message, source } => {
                tracing::warn!(operation, error = %message, "DynamoDB request failed");
                StorageError::backend_with_source(operation, message, source)
            },
        }
    }
}

struct Reasons<'a>(&'a [Option<String>]);

impl fmt::Display for Reasons<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, reason) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(reason.as_deref().unwrap_or("None"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    fn canceled(codes: &[Option<&str>]) -> TableError {
        TableError::TransactionCanceled {
            reasons: codes.iter().map(|code| code.map(str::to_owned)).collect(),
        }
    }

    #[rstest]
    #[case(&[None, Some("ConditionalCheckFailed")], true)]
    #[case(&[Some("TransactionConflict")], true)]
    #[case(&[Some("None"), Some("ConditionalCheckFailed")], true)]
    #[case(&[Some("ThrottlingError")], false)]
    #[case(&[Some("ValidationError"), None], false)]
    #[case(&[], false)]
    fn condition_failure_detection(#[case] codes: &[Option<&str>], #[case] conflict: bool) {
        assert_eq!(canceled(codes).is_condition_failure(), conflict);
    }

    #[test]
    fn condition_failure_maps_to_conflict() {
        let err = canceled(&[Some("ConditionalCheckFailed")]).into_storage_error("set");
        assert!(err.is_conflict());
    }

    #[test]
    fn other_cancellation_maps_to_backend() {
        let err = canceled(&[Some("ThrottlingError"), None]).into_storage_error("set");
        match err {
            StorageError::Backend { operation, message, .. } => {
                assert_eq!(operation, "set");
                assert_eq!(message, "transaction canceled: ThrottlingError, None");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_maps_to_invalid_argument() {
        let err = TableError::Validation("too many items".into()).into_storage_error("set");
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    #[test]
    fn service_error_keeps_its_source() {
        let source: BoxError = Arc::new(std::io::Error::other("connection reset"));
        let err = TableError::Service { message: "dispatch failure".into(), source }
            .into_storage_error("query_page");
        assert_eq!(err.operation(), Some("query_page"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
