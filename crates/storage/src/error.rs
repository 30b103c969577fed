//! Storage error types and result alias.
//!
//! Every backend maps its internal failures onto [`StorageError`], so callers
//! can tell "lost the race" apart from "the store is down" without knowing
//! which engine is active.
//!
//! # Error Types
//!
//! - [`StorageError::Conflict`] - A version condition failed (create-only on an existing item, or a
//!   stale version token)
//! - [`StorageError::Backend`] - The store was unreachable or rejected the request
//! - [`StorageError::Serialization`] - A payload could not be encoded or decoded
//! - [`StorageError::InvalidArgument`] - A key or batch failed validation
//! - [`StorageError::Config`] - Construction-time configuration problem
//!
//! # Example
//!
//! ```
//! use versakv_storage::{StorageError, StorageResult};
//!
//! fn save() -> StorageResult<()> {
//!     Err(StorageError::conflict())
//! }
//!
//! assert!(save().unwrap_err().is_conflict());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via `#[source]`, so tools that walk
/// [`std::error::Error::source`] see the underlying client failure.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A version condition failed.
    ///
    /// Raised when a create-only write finds a live item, or when a
    /// conditioned write or merge-update carries a token that no longer
    /// matches the stored one. Nothing in the batch was written. Callers
    /// recover by re-reading and retrying; this layer never retries.
    #[error("Version conflict")]
    Conflict,

    /// The underlying store failed for a non-conditional reason.
    ///
    /// Covers unreachable endpoints, throttling, rejected requests and
    /// malformed stored data. Not retried internally.
    #[error("Backend error during {operation}: {message}")]
    Backend {
        /// The storage operation that failed (`get`, `set`, ...).
        operation: &'static str,
        /// Description of the failure.
        message: String,
        /// The underlying client error.
        #[source]
        source: Option<BoxError>,
    },

    /// A payload could not be encoded for storage or decoded on read.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// A key, query or batch was rejected before reaching the store.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the validation failure.
        message: String,
    },

    /// Configuration was incomplete or invalid at construction time.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StorageError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Backend` error for the given operation.
    #[must_use]
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend { operation, message: message.into(), source: None }
    }

    /// Creates a new `Backend` error with a message and source error.
    #[must_use]
    pub fn backend_with_source(
        operation: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend { operation, message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Returns `true` if this error is a version conflict.
    ///
    /// Conflicts are the only errors a caller should answer with
    /// "re-read and retry".
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Returns the failed operation for `Backend` errors.
    #[must_use]
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Backend { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

/// Errors raised while validating backend configuration.
///
/// These surface only at construction time, before any operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting `{field}`")]
    Missing {
        /// Name of the missing setting.
        field: &'static str,
    },

    /// A numeric setting is below its allowed minimum.
    #[error("`{field}` must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the setting.
        field: &'static str,
        /// Smallest accepted value.
        min: String,
        /// Value that was supplied.
        value: String,
    },

    /// A numeric setting is above its allowed maximum.
    #[error("`{field}` must be at most {max}, got {value}")]
    AboveMaximum {
        /// Name of the setting.
        field: &'static str,
        /// Largest accepted value.
        max: String,
        /// Value that was supplied.
        value: String,
    },

    /// The backend discriminator named no known backend.
    #[error("unknown storage backend `{0}` (expected `embedded` or `distributed`)")]
    UnknownBackend(String),

    /// A setting is present but unusable.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Name of the setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
