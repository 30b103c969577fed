//! Storage backend trait definition.
//!
//! [`StorageBackend`] is the contract both engines implement. It works on
//! JSON payloads ([`serde_json::Value`]); the typed surface lives in
//! [`Database`](crate::Database), which also layers merge-updates and
//! streaming on top of these primitives.
//!
//! # Implementing a Backend
//!
//! 1. Implement the point operations (`get`, `set`, `delete`) with all-or-nothing batches and
//!    per-item [`Version`](crate::Version) conditions.
//! 2. Implement [`query_page`](StorageBackend::query_page) over the engine's native range scan.
//!    Pagination, limits and streaming are built on it by [`crate::pagination`].
//! 3. Map engine errors to [`StorageError`](crate::StorageError), with failed conditions always
//!    surfacing as [`Conflict`](crate::StorageError::Conflict).
//!
//! See [`EmbeddedBackend`](crate::EmbeddedBackend) for a reference implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::StorageResult,
    types::{Item, Key, Page, Query},
};

/// Abstract versioned key-value store.
///
/// Backends must be `Send + Sync` and hold no per-call state; every
/// operation reflects the store at call time.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Batch point lookup, missing keys omitted |
/// | [`set`](StorageBackend::set) | All-or-nothing conditioned batch write |
/// | [`delete`](StorageBackend::delete) | All-or-nothing batch delete |
/// | [`query_page`](StorageBackend::query_page) | One page of an ordered range scan |
/// | [`page_size`](StorageBackend::page_size) | Native page size used by the pager |
/// | [`health_check`](StorageBackend::health_check) | Verify the store is reachable |
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Looks up `keys`, returning the live items in request order.
    ///
    /// Missing and expired keys are omitted. A repeated key yields its item
    /// once. Any failure aborts the whole call.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, keys: &[Key]) -> StorageResult<Vec<Item<Value>>>;

    /// Writes `items` atomically.
    ///
    /// Each item's [`Version`](crate::Version) selects blind, create-only or
    /// compare-and-swap semantics. If any condition fails, nothing is written
    /// and [`Conflict`](crate::StorageError::Conflict) is returned. Every
    /// written item receives a fresh version token. An empty batch is a
    /// no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, items: Vec<Item<Value>>) -> StorageResult<()>;

    /// Deletes `keys` atomically. Missing keys are ignored.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, keys: &[Key]) -> StorageResult<()>;

    /// Fetches at most `limit` live items of `query`, resuming after `cursor`.
    ///
    /// `query.limit` is ignored here; the pager enforces it across pages.
    /// The returned cursor is the last key evaluated, so expired items that
    /// were filtered out are never revisited.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&Key>,
        limit: usize,
    ) -> StorageResult<Page<Value>>;

    /// Native page size; the pager never asks for more per call.
    fn page_size(&self) -> usize;

    /// Verifies the store is reachable.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn health_check(&self) -> StorageResult<()>;
}
