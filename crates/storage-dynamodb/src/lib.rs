//! DynamoDB-backed implementation of [`StorageBackend`](versakv_storage::StorageBackend).
//!
//! This crate provides [`DynamoBackend`], the distributed storage backend. It
//! stores every item of the versakv data model as one DynamoDB item and maps
//! version conditions onto condition expressions evaluated inside
//! `TransactWriteItems`, so batches stay atomic and concurrent writers are
//! detected by the table itself.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Database<B>                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      DynamoBackend                          │
//! │   (validation, expiry filtering, version tokens, cursors)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    TableClient trait                        │
//! │     transact_write │ get_items │ query │ describe           │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │           SdkTable           │   MemoryTable (testutil)     │
//! │        (aws-sdk-dynamodb)    │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires AWS credentials and an existing table.
//! use serde_json::json;
//! use versakv_storage::{Database, Item, Key};
//! use versakv_storage_dynamodb::{DynamoBackend, DynamoBackendConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DynamoBackendConfig::builder().region("eu-west-1").table("app-data").build()?;
//!     let db = Database::new(DynamoBackend::new(config).await?);
//!
//!     db.set([Item::new(Key::new("AGENT", "helper"), json!({"name": "helper"}))]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Operation Mapping
//!
//! | StorageBackend | DynamoDB |
//! | -------------- | -------- |
//! | `get(keys)` | `TransactGetItems`, 100 keys per call |
//! | `set(items)` | `TransactWriteItems`: `Put`, conditional `Put`, or conditional `Update` per item |
//! | `delete(keys)` | `TransactWriteItems` of `Delete` |
//! | `query_page` | `Query` with `begins_with` on the sort key, consistent read |
//! | `health_check` | `DescribeTable` |
//!
//! # Table Requirements
//!
//! The table needs a string partition key `pk` and a string sort key `sk`.
//! Enabling native TTL on the `ttl` attribute lets DynamoDB delete expired
//! items; reads hide them either way.

#![deny(unsafe_code)]

mod attributes;
mod backend;
mod config;
mod error;
mod expressions;
mod keys;
mod sdk;
mod table;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use attributes::{DATA, EXPIRES_AT, TTL, VERSION};
pub use backend::DynamoBackend;
pub use config::{DEFAULT_PAGE_SIZE, DynamoBackendConfig, MAX_PAGE_SIZE};
pub use error::{Result, TableError};
pub use keys::{Attributes, PK, SK};
pub use sdk::SdkTable;
pub use table::{MAX_TRANSACTION_ITEMS, QueryPage, QueryRequest, TableClient, TableWrite};
