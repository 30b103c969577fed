//! Versioned key-value store, configured at startup.
//!
//! `versakv` ties the storage crates together: it reads a [`StorageConfig`]
//! (from code, a config file, or the environment), opens the selected backend,
//! and hands back a [`Store`] to inject into the rest of the application.
//! Consumers only ever see the [`Database`] API, so switching between the
//! embedded store and DynamoDB is a configuration change.
//!
//! # Quick Start
//!
//! ```
//! use serde_json::json;
//! use versakv::{Item, Key, Query, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // No path: an in-memory embedded store.
//!     let store = versakv::open(&StorageConfig::default()).await?;
//!
//!     let key = Key::new("THREAD", "t-1/MSG/0001");
//!     store.set([Item::new(key.clone(), json!({"text": "hi"})).create_only()]).await?;
//!     store.update([Item::new(key, json!({"read": true}))]).await?;
//!
//!     let messages = store.query::<serde_json::Value>(Query::new("THREAD").prefix("t-1/")).await?;
//!     assert_eq!(messages[0].data, json!({"text": "hi", "read": true}));
//!     Ok(())
//! }
//! ```
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `STORAGE_BACKEND` | `embedded` (default, alias `kv`) or `distributed` (aliases `aws`, `dynamodb`) |
//! | `STORAGE_PATH` | Embedded database file; in-memory when unset |
//! | `AWS_REGION` | Region of the DynamoDB table |
//! | `DYNAMODB_TABLE` | DynamoDB table name |
//! | `DYNAMODB_ENDPOINT` | Endpoint override, e.g. DynamoDB Local |

#![deny(unsafe_code)]

mod backend;
mod config;
mod factory;

pub use backend::Backend;
pub use config::{
    BackendKind, ENV_BACKEND, ENV_ENDPOINT, ENV_PATH, ENV_REGION, ENV_TABLE, StorageConfig,
};
pub use factory::{Store, open};
pub use versakv_storage::{
    ConfigError, Database, EmbeddedBackend, Item, ItemStream, Key, Page, Query, StorageBackend,
    StorageError, StorageResult, Version, VersionToken,
};
pub use versakv_storage_dynamodb::{DynamoBackend, DynamoBackendConfig};
