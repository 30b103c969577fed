//! [`StorageBackend`] implementation over a [`TableClient`].

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use versakv_storage::{
    Item, Key, Page, Query, StorageBackend, StorageError, StorageResult, Version, VersionToken,
    size_limits::{dedup_keys, validate_batch, validate_key, validate_query},
};

use crate::{
    attributes::{is_live, item_attributes, item_from_attributes},
    config::{DynamoBackendConfig, MAX_PAGE_SIZE},
    keys::{encode_sort_key, key_attributes, key_from_attributes},
    sdk::SdkTable,
    table::{MAX_TRANSACTION_ITEMS, QueryRequest, TableClient, TableWrite},
};

/// DynamoDB-backed storage.
///
/// Every batch is one `TransactWriteItems` call, so batches are limited to
/// 100 items; larger batches are rejected rather than split, since a split
/// batch would no longer be atomic.
#[derive(Clone)]
pub struct DynamoBackend {
    table: Arc<dyn TableClient>,
    page_size: usize,
}

impl fmt::Debug for DynamoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoBackend").field("page_size", &self.page_size).finish_non_exhaustive()
    }
}

impl DynamoBackend {
    /// Connects to the table described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if `config` is invalid.
    pub async fn new(config: DynamoBackendConfig) -> StorageResult<Self> {
        config.validate()?;
        let table = SdkTable::connect(&config).await;
        tracing::info!(table = config.table(), region = config.region(), "DynamoDB backend ready");
        Ok(Self::with_table(Arc::new(table), config.page_size()))
    }

    /// Uses an existing table client.
    #[must_use]
    pub fn with_table(table: Arc<dyn TableClient>, page_size: usize) -> Self {
        Self { table, page_size: page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    fn check_transaction_size(len: usize) -> StorageResult<()> {
        if len > MAX_TRANSACTION_ITEMS {
            return Err(StorageError::invalid_argument(format!(
                "batch of {len} items exceeds the {MAX_TRANSACTION_ITEMS} item transaction limit"
            )));
        }
        Ok(())
    }
}

fn to_write(item: &Item<Value>, now_ms: i64) -> StorageResult<TableWrite> {
    let attributes = item_attributes(item, &VersionToken::generate())?;
    Ok(match &item.version {
        Version::Unset => TableWrite::Put { item: attributes },
        Version::CreateOnly => TableWrite::Create { item: attributes, now_ms },
        Version::Token(expected) => TableWrite::Replace {
            item: attributes,
            expected_version: expected.as_str().to_owned(),
            now_ms,
        },
    })
}

#[async_trait]
impl StorageBackend for DynamoBackend {
    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get(&self, keys: &[Key]) -> StorageResult<Vec<Item<Value>>> {
        for key in keys {
            validate_key(key)?;
        }
        let keys = dedup_keys(keys);
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let slots = self
            .table
            .get_items(keys.iter().map(key_attributes).collect())
            .await
            .map_err(|e| e.into_storage_error("get"))?;

        let now_ms = Utc::now().timestamp_millis();
        let mut items = Vec::with_capacity(slots.len());
        for (key, attributes) in keys.iter().zip(slots) {
            let Some(attributes) = attributes else { continue };
            if is_live(key, &attributes, now_ms)? {
                items.push(item_from_attributes(&attributes)?);
            }
        }
        Ok(items)
    }

    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    async fn set(&self, items: Vec<Item<Value>>) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        validate_batch(items.iter().map(|item| &item.key))?;
        Self::check_transaction_size(items.len())?;

        let now_ms = Utc::now().timestamp_millis();
        let writes =
            items.iter().map(|item| to_write(item, now_ms)).collect::<StorageResult<Vec<_>>>()?;
        self.table.transact_write(writes).await.map_err(|e| e.into_storage_error("set"))
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[Key]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        validate_batch(keys)?;
        Self::check_transaction_size(keys.len())?;

        let writes = keys.iter().map(|key| TableWrite::Delete { key: key_attributes(key) }).collect();
        self.table.transact_write(writes).await.map_err(|e| e.into_storage_error("delete"))
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

        let request = QueryRequest {
            pk: query.pk.clone(),
            sk_prefix: encode_sort_key(query.sk_prefix()),
            reverse: query.reverse,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
            exclusive_start_key: cursor.map(key_attributes),
        };
        let page = self.table.query(request).await.map_err(|e| e.into_storage_error("query_page"))?;

        // The table counts expired items toward the limit, so a page may come
        // back short (or empty) and still carry a cursor.
        let now_ms = Utc::now().timestamp_millis();
        let mut items = Vec::with_capacity(page.items.len());
        for attributes in &page.items {
            let item = item_from_attributes(attributes)?;
            if is_live(&item.key, attributes, now_ms)? {
                items.push(item);
            }
        }
        let cursor = page.last_evaluated_key.as_ref().map(key_from_attributes).transpose()?;
        Ok(Page { items, cursor })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        self.table.describe().await.map_err(|e| e.into_storage_error("health_check"))
    }
}
