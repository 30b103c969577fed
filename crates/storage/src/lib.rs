//! Versioned key-value storage with interchangeable backends.
//!
//! This crate provides the [`StorageBackend`] trait, the typed [`Database`]
//! handle applications hold, and the embedded backend. Items live under a
//! partition key and a sort key; every write carries a version condition so
//! concurrent writers can never silently overwrite each other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │        (agents, threads, messages, ... as JSON items)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       Database<B>                           │
//! │   get │ set │ update (deep merge) │ delete │ query │ stream  │
//! │         (typed payloads, pagination, merge-updates)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    StorageBackend trait                     │
//! │        (get, set, delete, query_page, health_check)         │
//! ├───────────────────┬─────────────────────────────────────────┤
//! │  EmbeddedBackend  │        DynamoBackend                    │
//! │  (redb, local)    │  (in `versakv-storage-dynamodb`)        │
//! └───────────────────┴─────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use serde_json::json;
//! use versakv_storage::{Database, EmbeddedBackend, Item, Key, Query};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(EmbeddedBackend::in_memory()?);
//!
//!     // Create-only: fails with a conflict if the key is taken.
//!     let key = Key::new("AGENT", "helper");
//!     db.set([Item::new(key.clone(), json!({"name": "helper"})).create_only()]).await?;
//!
//!     // Reads carry the version token; writing the item back is a CAS.
//!     let current = db.get_one::<serde_json::Value>(&key).await?.ok_or("missing")?;
//!     db.set([current.map(|_| json!({"name": "helper", "tools": ["search"]}))]).await?;
//!
//!     let agents = db.query::<serde_json::Value>(Query::new("AGENT")).await?;
//!     assert_eq!(agents.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # Version Conditions
//!
//! | [`Version`] | Write succeeds when |
//! |-------------|---------------------|
//! | `Unset` | always (blind write) |
//! | `CreateOnly` | no live item exists under the key |
//! | `Token(t)` | a live item exists and its token is `t` |
//!
//! A batch succeeds or fails as a whole; a failed condition anywhere in it
//! yields [`StorageError::Conflict`] and writes nothing.
//!
//! # Expiry
//!
//! An item written with [`Item::with_expiry`] is never returned once its
//! deadline has passed, whether or not the backend has physically removed it
//! yet.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules (seeding helpers, a
//!   page-counting backend wrapper, assertion macros, and the shared backend contract suite).
//!   Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod backend;
pub mod codec;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod database;
pub mod embedded;
pub mod error;
pub mod merge;
pub mod pagination;
pub mod size_limits;
pub mod sse;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use database::Database;
pub use embedded::EmbeddedBackend;
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use merge::deep_merge;
pub use pagination::{ItemStream, paginate};
pub use size_limits::{MAX_PARTITION_KEY_SIZE, MAX_PAYLOAD_SIZE, MAX_SORT_KEY_SIZE};
pub use types::{Item, Key, Page, Query, Version, VersionToken, compose_key, decompose_key};
