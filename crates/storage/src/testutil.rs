//! Shared test utilities for storage backend testing.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! versakv-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use versakv_storage::testutil::{CountingBackend, make_key, seed};
//! ```

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Database,
    backend::StorageBackend,
    error::StorageResult,
    types::{Item, Key, Page, Query},
};

/// Creates a key whose sort key is `idx` zero-padded to 6 digits.
///
/// Zero-padding makes lexicographic order match numeric order, which range
/// tests rely on.
#[must_use]
pub fn make_key(pk: &str, idx: usize) -> Key {
    Key::new(pk, format!("{idx:06}"))
}

/// Writes `count` items `{ "n": idx }` under `pk`, keyed by [`make_key`].
///
/// Writes in batches no larger than the distributed store's transaction
/// bound.
///
/// # Panics
///
/// Panics if any write fails.
pub async fn seed<B: StorageBackend + ?Sized + 'static>(db: &Database<B>, pk: &str, count: usize) {
    let items: Vec<Item<Value>> =
        (0..count).map(|i| Item::new(make_key(pk, i), json!({ "n": i }))).collect();
    for chunk in items.chunks(100) {
        db.set(chunk.to_vec()).await.expect("seed write failed");
    }
}

/// Backend wrapper that records every page request.
///
/// Used to prove that pagination requests what it should and that a dropped
/// stream stops issuing requests.
pub struct CountingBackend<B> {
    inner: B,
    page_calls: AtomicUsize,
    page_limits: Mutex<Vec<usize>>,
}

impl<B> CountingBackend<B> {
    /// Wraps `inner`.
    pub fn new(inner: B) -> Self {
        Self { inner, page_calls: AtomicUsize::new(0), page_limits: Mutex::new(Vec::new()) }
    }

    /// Number of `query_page` calls so far.
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// The `limit` of every `query_page` call, in order.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn page_limits(&self) -> Vec<usize> {
        self.page_limits.lock().expect("lock poisoned").clone()
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for CountingBackend<B> {
    async fn get(&self, keys: &[Key]) -> StorageResult<Vec<Item<Value>>> {
        self.inner.get(keys).await
    }

    async fn set(&self, items: Vec<Item<Value>>) -> StorageResult<()> {
        self.inner.set(items).await
    }

    async fn delete(&self, keys: &[Key]) -> StorageResult<()> {
        self.inner.delete(keys).await
    }

    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&Key>,
        limit: usize,
    ) -> StorageResult<Page<Value>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.page_limits.lock().expect("lock poisoned").push(limit);
        self.inner.query_page(query, cursor, limit).await
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::Conflict`](crate::StorageError::Conflict).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use versakv_storage::{StorageError, StorageResult, assert_conflict};
///
/// let result: StorageResult<()> = Err(StorageError::Conflict);
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "{}: expected StorageError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::InvalidArgument`](crate::StorageError::InvalidArgument).
#[macro_export]
macro_rules! assert_invalid_argument {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::InvalidArgument { .. })),
            "expected StorageError::InvalidArgument, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::InvalidArgument { .. })),
            "{}: expected StorageError::InvalidArgument, got: {:?}",
            $msg,
            $result,
        );
    };
}
