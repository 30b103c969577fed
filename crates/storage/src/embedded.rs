//! Embedded storage backend on top of [`redb`].
//!
//! This module provides [`EmbeddedBackend`], a local, transactional, ordered
//! key-value store. It is the reference implementation of
//! [`StorageBackend`]: redb write transactions are serializable and commit
//! atomically, so version checks and writes for a whole batch run inside one
//! transaction and either all apply or none do.
//!
//! # Layout
//!
//! Items live in a single table keyed by the native composite key
//! `(pk, sk)`. redb orders tuple keys element-wise by bytes, which is exactly
//! the `(pk, sk)` order range queries must return. Values are JSON envelopes
//! `{data, versionstamp, expires_at}`.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use versakv_storage::{EmbeddedBackend, Item, Key, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = EmbeddedBackend::in_memory()?;
//!     backend.set(vec![Item::new(Key::new("USER", "1"), json!({"name": "ada"}))]).await?;
//!
//!     let items = backend.get(&[Key::new("USER", "1")]).await?;
//!     assert_eq!(items[0].data, json!({"name": "ada"}));
//!     Ok(())
//! }
//! ```
//!
//! # Expiry
//!
//! Expired items are filtered on every read. Physical removal happens in
//! [`purge_expired`](EmbeddedBackend::purge_expired), which an optional
//! background sweeper calls on a fixed interval.

use std::{ops::Bound, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde_json::Value;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::StorageBackend,
    codec::StoredRecord,
    error::{ConfigError, StorageError, StorageResult},
    size_limits::{dedup_keys, validate_batch, validate_key, validate_payload_size, validate_query},
    types::{Item, Key, Page, Query, VersionToken},
};

/// Default number of items per range-scan page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const ITEMS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("items");

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the sweeper exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort; the sweeper may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// Embedded storage backend using [`redb`].
///
/// # Cloning
///
/// `EmbeddedBackend` is cheaply cloneable. All clones share one database.
///
/// # Shutdown
///
/// When built with a `sweep_interval`, a background task purges expired
/// items. It stops once every clone is dropped, or on
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct EmbeddedBackend {
    db: Arc<redb::Database>,
    page_size: usize,
    shutdown_guard: Option<Arc<ShutdownGuard>>,
}

#[bon::bon]
impl EmbeddedBackend {
    /// Opens (or creates) the database.
    ///
    /// # Arguments
    ///
    /// * `path` - Database file. Without one the database lives in memory.
    /// * `page_size` - Items per range-scan page (default: 1000).
    /// * `sweep_interval` - Enables the background expiry sweeper. Requires a running tokio
    ///   runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] for a zero page size or a sweeper
    /// requested outside a runtime, and [`StorageError::Backend`] if the
    /// database cannot be opened.
    #[builder]
    pub fn new(
        #[builder(into)] path: Option<PathBuf>,
        #[builder(default = DEFAULT_PAGE_SIZE)] page_size: usize,
        sweep_interval: Option<Duration>,
    ) -> StorageResult<Self> {
        if page_size == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "page_size",
                min: "1".into(),
                value: "0".into(),
            }
            .into());
        }

        let db = match &path {
            Some(path) => redb::Database::create(path).map_err(redb_error("open"))?,
            None => redb::Database::builder()
                .create_with_backend(redb::backends::InMemoryBackend::new())
                .map_err(redb_error("open"))?,
        };

        // Create the table up front so read transactions can always open it.
        let txn = db.begin_write().map_err(redb_error("open"))?;
        txn.open_table(ITEMS).map_err(redb_error("open"))?;
        txn.commit().map_err(redb_error("open"))?;

        let db = Arc::new(db);
        let shutdown_guard = match sweep_interval {
            Some(interval) => Some(Arc::new(spawn_sweeper(Arc::clone(&db), interval)?)),
            None => None,
        };

        tracing::debug!(path = ?path, page_size, "opened embedded store");
        Ok(Self { db, page_size, shutdown_guard })
    }

    /// Opens a fresh in-memory database with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if redb cannot allocate the database.
    pub fn in_memory() -> StorageResult<Self> {
        Self::builder().build()
    }

    /// Physically removes every expired item, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the write transaction fails.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> StorageResult<usize> {
        self.blocking("purge_expired", purge_expired).await
    }

    /// Explicitly signals the background sweeper to stop.
    ///
    /// Optional; the sweeper also stops when all clones are dropped.
    pub fn shutdown(&self) {
        if let Some(guard) = &self.shutdown_guard {
            let _ = guard.shutdown_tx.send(());
        }
    }

    async fn blocking<R, F>(&self, operation: &'static str, f: F) -> StorageResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&redb::Database) -> StorageResult<R> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorageError::backend_with_source(operation, "storage task failed", e))?
    }
}

fn redb_error<E: std::fmt::Display>(operation: &'static str) -> impl FnOnce(E) -> StorageError {
    move |err| {
        tracing::warn!(operation, error = %err, "embedded store error");
        StorageError::backend(operation, err.to_string())
    }
}

fn spawn_sweeper(db: Arc<redb::Database>, interval: Duration) -> StorageResult<ShutdownGuard> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::Invalid {
        field: "sweep_interval",
        reason: "the expiry sweeper needs a running tokio runtime".into(),
    })?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    runtime.spawn(async move {
        loop {
            select! {
                _ = sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    return;
                }
            }

            let db = Arc::clone(&db);
            match tokio::task::spawn_blocking(move || purge_expired(&db)).await {
                Ok(Ok(0)) => {},
                Ok(Ok(removed)) => tracing::debug!(removed, "purged expired items"),
                Ok(Err(err)) => tracing::warn!(error = %err, "expiry sweep failed"),
                Err(err) => tracing::warn!(error = %err, "expiry sweep task failed"),
            }
        }
    });

    Ok(ShutdownGuard { shutdown_tx })
}

fn purge_expired(db: &redb::Database) -> StorageResult<usize> {
    let txn = db.begin_write().map_err(redb_error("purge_expired"))?;
    let removed = {
        let mut table = txn.open_table(ITEMS).map_err(redb_error("purge_expired"))?;
        let now = Utc::now();
        let mut expired = Vec::new();
        for entry in table.iter().map_err(redb_error("purge_expired"))? {
            let (key, value) = entry.map_err(redb_error("purge_expired"))?;
            let (pk, sk) = key.value();
            let key = Key::new(pk, sk);
            // Corrupt records are left for reads to report.
            if matches!(StoredRecord::decode(&key, value.value()), Ok(record) if !record.is_live(now))
            {
                expired.push(key);
            }
        }
        for key in &expired {
            table.remove((key.pk.as_str(), key.sk.as_str())).map_err(redb_error("purge_expired"))?;
        }
        expired.len()
    };
    txn.commit().map_err(redb_error("purge_expired"))?;
    Ok(removed)
}

struct PendingWrite {
    item: Item<Value>,
    bytes: Vec<u8>,
}

/// Checks every condition, then applies every write. Nothing is inserted
/// until all checks pass.
fn apply_writes(txn: &WriteTransaction, writes: &[PendingWrite]) -> StorageResult<()> {
    let mut table = txn.open_table(ITEMS).map_err(redb_error("set"))?;
    let now = Utc::now();

    for write in writes {
        let key = &write.item.key;
        let current = table
            .get((key.pk.as_str(), key.sk.as_str()))
            .map_err(redb_error("set"))?
            .map(|raw| StoredRecord::decode(key, raw.value()))
            .transpose()?
            .filter(|record| record.is_live(now));

        if !write.item.version.admits(current.as_ref().map(|record| record.versionstamp.as_str()))
        {
            tracing::debug!(key = %key, condition = ?write.item.version, "version check failed");
            return Err(StorageError::conflict());
        }
    }

    for write in writes {
        let key = &write.item.key;
        table
            .insert((key.pk.as_str(), key.sk.as_str()), write.bytes.as_slice())
            .map_err(redb_error("set"))?;
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for EmbeddedBackend {
    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get(&self, keys: &[Key]) -> StorageResult<Vec<Item<Value>>> {
        for key in keys {
            validate_key(key)?;
        }
        let keys = dedup_keys(keys);
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        self.blocking("get", move |db| {
            let txn = db.begin_read().map_err(redb_error("get"))?;
            let table = txn.open_table(ITEMS).map_err(redb_error("get"))?;
            let now = Utc::now();

            let mut items = Vec::with_capacity(keys.len());
            for key in keys {
                let record = table
                    .get((key.pk.as_str(), key.sk.as_str()))
                    .map_err(redb_error("get"))?
                    .map(|raw| StoredRecord::decode(&key, raw.value()))
                    .transpose()?;
                if let Some(record) = record.filter(|record| record.is_live(now)) {
                    items.push(record.into_item(key)?);
                }
            }
            Ok(items)
        })
        .await
    }

    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    async fn set(&self, items: Vec<Item<Value>>) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        validate_batch(items.iter().map(|item| &item.key))?;

        let writes = items
            .into_iter()
            .map(|item| {
                let record = StoredRecord::for_write(&item, &VersionToken::generate())?;
                // The limit applies to the payload text, as on the table store.
                validate_payload_size(&item.key, record.data.len())?;
                Ok(PendingWrite { item, bytes: record.encode()? })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        self.blocking("set", move |db| {
            let txn = db.begin_write().map_err(redb_error("set"))?;
            match apply_writes(&txn, &writes) {
                Ok(()) => txn.commit().map_err(redb_error("set")),
                Err(err) => {
                    txn.abort().map_err(redb_error("set"))?;
                    Err(err)
                },
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[Key]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        validate_batch(keys)?;
        let keys = keys.to_vec();

        self.blocking("delete", move |db| {
            let txn = db.begin_write().map_err(redb_error("delete"))?;
            {
                let mut table = txn.open_table(ITEMS).map_err(redb_error("delete"))?;
                for key in &keys {
                    table.remove((key.pk.as_str(), key.sk.as_str())).map_err(redb_error("delete"))?;
                }
            }
            txn.commit().map_err(redb_error("delete"))
        })
        .await
    }

    #[tracing::instrument(skip(self, query, cursor), fields(pk = %query.pk, reverse = query.reverse))]
    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&Key>,
        limit: usize,
    ) -> StorageResult<Page<Value>> {
        validate_query(query)?;
        if limit == 0 {
            return Ok(Page::last(Vec::new()));
        }
        let query = query.clone();
        let cursor = cursor.cloned();

        self.blocking("query_page", move |db| {
            let txn = db.begin_read().map_err(redb_error("query_page"))?;
            let table = txn.open_table(ITEMS).map_err(redb_error("query_page"))?;
            let now = Utc::now();
            let prefix = query.sk_prefix();
            // Smallest key of the next partition: nothing sorts between `pk` and `pk\0`.
            let partition_end = format!("{}\0", query.pk);

            let lower = match (&cursor, query.reverse) {
                (Some(cursor), false) => Bound::Excluded((cursor.pk.as_str(), cursor.sk.as_str())),
                _ => Bound::Included((query.pk.as_str(), prefix)),
            };
            let upper = match (&cursor, query.reverse) {
                (Some(cursor), true) => Bound::Excluded((cursor.pk.as_str(), cursor.sk.as_str())),
                _ => Bound::Excluded((partition_end.as_str(), "")),
            };

            let range = table.range((lower, upper)).map_err(redb_error("query_page"))?;
            let entries = range.map(|entry| {
                entry.map(|(key, value)| {
                    let (pk, sk) = key.value();
                    (Key::new(pk, sk), value.value().to_vec())
                })
            });
            let entries: Box<dyn Iterator<Item = _> + '_> =
                if query.reverse { Box::new(entries.rev()) } else { Box::new(entries) };

            let mut items = Vec::new();
            for entry in entries {
                let (key, bytes) = entry.map_err(redb_error("query_page"))?;
                if !key.sk.starts_with(prefix) {
                    // Descending scans start above the prefix range and skip down to it.
                    if query.reverse && key.sk.as_str() > prefix {
                        continue;
                    }
                    break;
                }

                let record = StoredRecord::decode(&key, &bytes)?;
                if record.is_live(now) {
                    items.push(record.into_item(key)?);
                    if items.len() == limit {
                        let cursor = items.last().map(|item| item.key.clone());
                        return Ok(Page { items, cursor });
                    }
                }
            }
            Ok(Page::last(items))
        })
        .await
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        self.blocking("health_check", |db| {
            let txn = db.begin_read().map_err(redb_error("health_check"))?;
            txn.open_table(ITEMS).map_err(redb_error("health_check"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    fn item(pk: &str, sk: &str, data: Value) -> Item<Value> {
        Item::new(Key::new(pk, sk), data)
    }

    #[tokio::test]
    async fn data_survives_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");

        {
            let backend = EmbeddedBackend::builder().path(path.clone()).build().unwrap();
            backend.set(vec![item("USER", "1", json!({"name": "ada"}))]).await.unwrap();
        }

        let reopened = EmbeddedBackend::builder().path(path).build().unwrap();
        let items = reopened.get(&[Key::new("USER", "1")]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, json!({"name": "ada"}));
    }

    #[tokio::test]
    async fn zero_page_size_is_a_config_error() {
        let err = EmbeddedBackend::builder().page_size(0).build().err().unwrap();
        assert!(matches!(err, StorageError::Config(ConfigError::BelowMinimum { .. })));
    }

    #[test]
    fn sweeper_outside_a_runtime_is_a_config_error() {
        let result = EmbeddedBackend::builder().sweep_interval(Duration::from_secs(1)).build();
        assert!(matches!(result, Err(StorageError::Config(ConfigError::Invalid { .. }))));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_items() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        let past = Utc::now() - TimeDelta::seconds(10);
        backend
            .set(vec![
                item("S", "expired", json!(1)).with_expiry(past),
                item("S", "forever", json!(2)),
                item("S", "later", json!(3)).expire_in(Duration::from_secs(3600)),
            ])
            .await
            .unwrap();

        assert_eq!(backend.purge_expired().await.unwrap(), 1);
        assert_eq!(backend.purge_expired().await.unwrap(), 0);

        let page = backend.query_page(&Query::new("S"), None, 10).await.unwrap();
        let keys: Vec<_> = page.items.iter().map(|item| item.key.sk.as_str()).collect();
        assert_eq!(keys, vec!["forever", "later"]);
    }

    async fn stored_raw(backend: &EmbeddedBackend, pk: &'static str, sk: &'static str) -> bool {
        let db = Arc::clone(&backend.db);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().unwrap();
            let table = txn.open_table(ITEMS).unwrap();
            table.get((pk, sk)).unwrap().is_some()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn sweeper_removes_expired_items_in_the_background() {
        let backend = EmbeddedBackend::builder()
            .sweep_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        backend
            .set(vec![item("S", "gone", json!(1)).with_expiry(Utc::now() - TimeDelta::seconds(1))])
            .await
            .unwrap();

        let mut removed = false;
        for _ in 0..100 {
            if !stored_raw(&backend, "S", "gone").await {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        backend.shutdown();
        assert!(removed, "sweeper never purged the expired item");
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        backend.set(vec![item("P", "a", json!(1))]).await.unwrap();

        let err = backend
            .set(vec![item("P", "b", json!(2)), item("P", "a", json!(3)).create_only()])
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let items = backend.get(&[Key::new("P", "a"), Key::new("P", "b")]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, json!(1));
    }

    #[tokio::test]
    async fn partitions_sharing_a_prefix_stay_separate() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        backend
            .set(vec![
                item("USER", "1", json!("user")),
                item("USER\u{1}", "0", json!("neighbour")),
                item("USERS", "1", json!("users")),
            ])
            .await
            .unwrap();

        for query in [Query::new("USER"), Query::new("USER").reverse()] {
            let page = backend.query_page(&query, None, 10).await.unwrap();
            assert_eq!(page.items.len(), 1, "{query:?}");
            assert_eq!(page.items[0].data, json!("user"));
        }
    }

    #[tokio::test]
    async fn reverse_prefix_scan_skips_keys_above_the_range() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        let items = ["a1", "b1", "b2", "b3", "c1", "c2"]
            .into_iter()
            .map(|sk| item("P", sk, json!(sk)))
            .collect();
        backend.set(items).await.unwrap();

        let page = backend.query_page(&Query::new("P").prefix("b").reverse(), None, 10).await.unwrap();
        let keys: Vec<_> = page.items.iter().map(|item| item.key.sk.as_str()).collect();
        assert_eq!(keys, vec!["b3", "b2", "b1"]);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn full_page_returns_a_cursor() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        let items = (0..5).map(|i| item("P", &i.to_string(), json!(i))).collect();
        backend.set(items).await.unwrap();

        let first = backend.query_page(&Query::new("P"), None, 2).await.unwrap();
        assert_eq!(first.cursor, Some(Key::new("P", "1")));

        let second = backend.query_page(&Query::new("P"), first.cursor.as_ref(), 2).await.unwrap();
        let keys: Vec<_> = second.items.iter().map(|item| item.key.sk.as_str()).collect();
        assert_eq!(keys, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn corrupt_payload_surfaces_as_serialization_error() {
        let backend = EmbeddedBackend::in_memory().unwrap();
        let db = Arc::clone(&backend.db);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().unwrap();
            txn.open_table(ITEMS).unwrap().insert(("P", "bad"), b"{oops".as_slice()).unwrap();
            txn.commit().unwrap();
        })
        .await
        .unwrap();

        let err = backend.get(&[Key::new("P", "bad")]).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
