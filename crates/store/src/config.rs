//! Storage configuration.
//!
//! [`StorageConfig`] selects the backend and carries the settings of both.
//! It deserializes from any serde format, is built with a `bon` builder in
//! code, or is read from the process environment with
//! [`StorageConfig::from_env`].

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use versakv_storage::ConfigError;
use versakv_storage_dynamodb::{DEFAULT_PAGE_SIZE, DynamoBackendConfig};

/// Which backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded redb store.
    #[default]
    #[serde(alias = "kv")]
    Embedded,
    /// DynamoDB table.
    #[serde(alias = "aws", alias = "dynamodb")]
    Distributed,
}

impl BackendKind {
    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "kv" => Ok(Self::Embedded),
            "distributed" | "aws" | "dynamodb" => Ok(Self::Distributed),
            _ => Err(ConfigError::UnknownBackend(s.to_owned())),
        }
    }
}

/// Environment variable selecting the backend.
pub const ENV_BACKEND: &str = "STORAGE_BACKEND";
/// Environment variable holding the embedded database path.
pub const ENV_PATH: &str = "STORAGE_PATH";
/// Environment variable holding the AWS region.
pub const ENV_REGION: &str = "AWS_REGION";
/// Environment variable holding the DynamoDB table name.
pub const ENV_TABLE: &str = "DYNAMODB_TABLE";
/// Environment variable holding a DynamoDB endpoint override.
pub const ENV_ENDPOINT: &str = "DYNAMODB_ENDPOINT";

/// Configuration for [`open`](crate::open).
///
/// # Example
///
/// ```
/// use versakv::{BackendKind, StorageConfig};
///
/// let config = StorageConfig::builder()
///     .backend(BackendKind::Distributed)
///     .region("eu-west-1")
///     .table("app-data")
///     .build();
/// config.validate()?;
/// # Ok::<(), versakv::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend to open.
    #[serde(default)]
    #[builder(default)]
    pub backend: BackendKind,

    /// Embedded database file; in-memory when absent.
    #[serde(default)]
    #[builder(into)]
    pub path: Option<PathBuf>,

    /// Interval of the embedded background purge of expired items.
    #[serde(default, with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    /// AWS region of the table. Required for the distributed backend.
    #[serde(default)]
    #[builder(into)]
    pub region: Option<String>,

    /// DynamoDB table name. Required for the distributed backend.
    #[serde(default)]
    #[builder(into)]
    pub table: Option<String>,

    /// DynamoDB endpoint override, e.g. DynamoDB Local.
    #[serde(default)]
    #[builder(into)]
    pub endpoint: Option<String>,

    /// Items per query page.
    #[serde(default)]
    pub page_size: Option<usize>,

    /// Deadline for a whole DynamoDB operation, retries included.
    #[serde(default, with = "humantime_serde")]
    pub operation_timeout: Option<Duration>,
}

impl StorageConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] for an unrecognized
    /// `STORAGE_BACKEND`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] for an unrecognized backend.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let backend = read(ENV_BACKEND).map(|value| value.parse()).transpose()?.unwrap_or_default();

        Ok(Self {
            backend,
            path: read(ENV_PATH).map(PathBuf::from),
            region: read(ENV_REGION),
            table: read(ENV_TABLE),
            endpoint: read(ENV_ENDPOINT),
            ..Self::default()
        })
    }

    /// Checks that the selected backend has everything it needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming `region` or `table` when the
    /// distributed backend lacks them, or a range error for `page_size`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::Embedded => {
                if self.page_size == Some(0) {
                    return Err(ConfigError::BelowMinimum {
                        field: "page_size",
                        min: "1".into(),
                        value: "0".into(),
                    });
                }
                Ok(())
            },
            BackendKind::Distributed => self.dynamo_config().map(|_| ()),
        }
    }

    /// Builds the DynamoDB backend configuration.
    pub(crate) fn dynamo_config(&self) -> Result<DynamoBackendConfig, ConfigError> {
        let region = self.region.clone().ok_or(ConfigError::Missing { field: "region" })?;
        let table = self.table.clone().ok_or(ConfigError::Missing { field: "table" })?;
        DynamoBackendConfig::builder()
            .region(region)
            .table(table)
            .maybe_endpoint(self.endpoint.clone())
            .page_size(self.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
            .maybe_operation_timeout(self.operation_timeout)
            .build()
    }
}
