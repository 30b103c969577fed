//! Typed handle over a [`StorageBackend`].
//!
//! [`Database`] is what the rest of an application holds: it converts typed
//! payloads to and from JSON, implements merge-updates on top of `get` and
//! `set`, and exposes range scans both eagerly ([`query`](Database::query))
//! and lazily ([`stream`](Database::stream)). It is constructed once from
//! configuration and cloned into every consumer.

use std::{collections::HashMap, fmt, sync::Arc};

use futures::{StreamExt, TryStreamExt};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    backend::StorageBackend,
    codec,
    error::StorageResult,
    merge::merge_item,
    pagination::{ItemStream, paginate},
    types::{Item, Key, Query},
};

/// Cheaply cloneable, typed storage handle.
pub struct Database<B: ?Sized> {
    backend: Arc<B>,
}

impl<B: ?Sized> fmt::Debug for Database<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl<B: ?Sized> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend) }
    }
}

impl<B: StorageBackend + 'static> Database<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self { backend: Arc::new(backend) }
    }
}

impl<B: StorageBackend + ?Sized + 'static> Database<B> {
    /// Wraps an already shared backend.
    pub fn from_arc(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetches the live items for `keys` in request order, omitting missing ones.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`](crate::StorageError::Backend) if the
    /// store fails, or [`StorageError::Serialization`](crate::StorageError::Serialization)
    /// if a payload does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, keys: &[Key]) -> StorageResult<Vec<Item<T>>> {
        self.backend.get(keys).await?.into_iter().map(decode).collect()
    }

    /// Fetches a single item.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn get_one<T: DeserializeOwned>(&self, key: &Key) -> StorageResult<Option<Item<T>>> {
        Ok(self.get(std::slice::from_ref(key)).await?.into_iter().next())
    }

    /// Writes `items` all-or-nothing.
    ///
    /// Accepts anything iterable, so a single item is `db.set([item])`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) if any
    /// item's version condition fails; nothing is written in that case.
    pub async fn set<T: Serialize>(
        &self,
        items: impl IntoIterator<Item = Item<T>>,
    ) -> StorageResult<()> {
        let items = encode_all(items)?;
        self.backend.set(items).await
    }

    /// Merges each item's payload into the stored one and writes the result
    /// back under a version condition.
    ///
    /// Nested objects merge key by key; arrays and scalars are replaced. The
    /// write-back is conditioned on the token that was read (or on the
    /// caller's own condition), so an item changed by someone else in between
    /// fails with [`Conflict`](crate::StorageError::Conflict) instead of being
    /// overwritten. A missing item is created from the patch as-is.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub async fn update<T: Serialize>(
        &self,
        items: impl IntoIterator<Item = Item<T>>,
    ) -> StorageResult<()> {
        let patches = encode_all(items)?;
        if patches.is_empty() {
            return Ok(());
        }

        let keys: Vec<Key> = patches.iter().map(|patch| patch.key.clone()).collect();
        let existing: HashMap<Key, Item<Value>> = self
            .backend
            .get(&keys)
            .await?
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();

        let merged = patches
            .into_iter()
            .map(|patch| {
                let current = existing.get(&patch.key);
                merge_item(current, patch)
            })
            .collect();
        self.backend.set(merged).await
    }

    /// Deletes `keys` all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`](crate::StorageError::Backend) if the
    /// store fails.
    pub async fn delete(&self, keys: &[Key]) -> StorageResult<()> {
        self.backend.delete(keys).await
    }

    /// Runs `query` to completion and returns every matching item.
    ///
    /// # Errors
    ///
    /// Fails with the first backend or decode error encountered.
    pub async fn query<T>(&self, query: Query) -> StorageResult<Vec<Item<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.stream(query).try_collect().await
    }

    /// Streams `query` lazily.
    ///
    /// Pages are fetched as the stream is polled. Dropping the stream stops
    /// all further backend calls.
    pub fn stream<T>(&self, query: Query) -> ItemStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        paginate(Arc::clone(&self.backend), query).map(|item| item.and_then(decode)).boxed()
    }

    /// Verifies the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if it is not.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.backend.health_check().await
    }
}

fn decode<T: DeserializeOwned>(item: Item<Value>) -> StorageResult<Item<T>> {
    let key = item.key.clone();
    item.try_map(|data| codec::from_value(&key, data))
}

fn encode_all<T: Serialize>(
    items: impl IntoIterator<Item = Item<T>>,
) -> StorageResult<Vec<Item<Value>>> {
    items.into_iter().map(|item| item.try_map(|data| codec::to_value(&data))).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::{EmbeddedBackend, StorageError, Version};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Agent {
        name: String,
        tools: Vec<String>,
    }

    fn db() -> Database<EmbeddedBackend> {
        Database::new(EmbeddedBackend::in_memory().unwrap())
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let db = db();
        let agent = Agent { name: "helper".into(), tools: vec!["search".into()] };
        db.set([Item::new(Key::new("AGENT", "1"), agent.clone())]).await.unwrap();

        let stored = db.get_one::<Agent>(&Key::new("AGENT", "1")).await.unwrap().unwrap();
        assert_eq!(stored.data, agent);
        assert!(matches!(stored.version, Version::Token(_)));
    }

    #[tokio::test]
    async fn get_one_missing_is_none() {
        let found = db().get_one::<Agent>(&Key::new("AGENT", "missing")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn payload_of_the_wrong_shape_is_a_serialization_error() {
        let db = db();
        db.set([Item::new(Key::new("AGENT", "1"), json!({"unexpected": true}))]).await.unwrap();

        let err = db.get::<Agent>(&[Key::new("AGENT", "1")]).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[tokio::test]
    async fn update_of_typed_struct_replaces_arrays() {
        let db = db();
        let agent = Agent { name: "helper".into(), tools: vec!["a".into(), "b".into()] };
        db.set([Item::new(Key::new("AGENT", "1"), agent)]).await.unwrap();

        db.update([Item::new(Key::new("AGENT", "1"), json!({"tools": ["c"]}))]).await.unwrap();

        let stored = db.get_one::<Agent>(&Key::new("AGENT", "1")).await.unwrap().unwrap();
        assert_eq!(stored.data, Agent { name: "helper".into(), tools: vec!["c".into()] });
    }

    #[tokio::test]
    async fn empty_update_is_a_noop() {
        db().update(Vec::<Item<Value>>::new()).await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_the_store() {
        let db = db();
        let other = db.clone();
        db.set([Item::new(Key::new("P", "s"), 1)]).await.unwrap();
        assert_eq!(other.get::<i32>(&[Key::new("P", "s")]).await.unwrap().len(), 1);
    }
}
