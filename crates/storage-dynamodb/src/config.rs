//! Configuration for the DynamoDB storage backend.
//!
//! [`DynamoBackendConfig`] names the table and the region it lives in, and
//! optionally an endpoint override for local emulators.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use versakv_storage::ConfigError;

/// Default number of items requested per query page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Configuration for [`DynamoBackend`](crate::DynamoBackend).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use versakv_storage_dynamodb::DynamoBackendConfig;
///
/// let config = DynamoBackendConfig::builder()
///     .region("eu-west-1")
///     .table("app-data")
///     .endpoint("http://localhost:8000")
///     .operation_timeout(Duration::from_secs(5))
///     .build()?;
/// assert_eq!(config.page_size(), 1000);
/// # Ok::<(), versakv_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamoBackendConfig {
    /// AWS region of the table.
    pub(crate) region: String,

    /// Table name.
    pub(crate) table: String,

    /// Endpoint override, e.g. DynamoDB Local.
    #[serde(default)]
    pub(crate) endpoint: Option<String>,

    /// Items requested per query page.
    #[serde(default = "default_page_size")]
    pub(crate) page_size: usize,

    /// Deadline for a whole SDK operation, retries included.
    #[serde(default, with = "humantime_serde")]
    pub(crate) operation_timeout: Option<Duration>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[bon::bon]
impl DynamoBackendConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `region` or `table` is empty, and a
    /// range error if `page_size` is outside `1..=1000`.
    #[builder]
    pub fn new(
        #[builder(into)] region: String,
        #[builder(into)] table: String,
        #[builder(into)] endpoint: Option<String>,
        #[builder(default = DEFAULT_PAGE_SIZE)] page_size: usize,
        operation_timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let config = Self { region, table, endpoint, page_size, operation_timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks a configuration obtained through deserialization.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Missing { field: "region" });
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Missing { field: "table" });
        }
        if self.page_size == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "page_size",
                min: "1".into(),
                value: self.page_size.to_string(),
            });
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::AboveMaximum {
                field: "page_size",
                max: MAX_PAGE_SIZE.to_string(),
                value: self.page_size.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the endpoint override, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the query page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the operation timeout, if any.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }
}
