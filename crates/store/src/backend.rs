//! Unified backend enum.
//!
//! [`Backend`] holds whichever adapter configuration selected, keeping static
//! dispatch while letting the choice happen at runtime.
//!
//! | Variant | Use Case |
//! |---------|----------|
//! | [`Backend::Embedded`] | Single process, local file or in-memory |
//! | [`Backend::Distributed`] | Shared DynamoDB table |

use async_trait::async_trait;
use serde_json::Value;
use versakv_storage::{EmbeddedBackend, Item, Key, Page, Query, StorageBackend, StorageResult};
use versakv_storage_dynamodb::DynamoBackend;

/// Storage backend selected at runtime.
#[derive(Clone)]
pub enum Backend {
    /// Embedded redb store.
    Embedded(EmbeddedBackend),
    /// DynamoDB table.
    Distributed(DynamoBackend),
}

impl Backend {
    /// Creates an in-memory embedded backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        EmbeddedBackend::in_memory().map(Self::Embedded)
    }

    /// Returns `true` for the embedded backend.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    /// Returns `true` for the DynamoDB backend.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::Distributed(_))
    }
}

impl From<EmbeddedBackend> for Backend {
    fn from(backend: EmbeddedBackend) -> Self {
        Self::Embedded(backend)
    }
}

impl From<DynamoBackend> for Backend {
    fn from(backend: DynamoBackend) -> Self {
        Self::Distributed(backend)
    }
}

#[async_trait]
impl StorageBackend for Backend {
    async fn get(&self, keys: &[Key]) -> StorageResult<Vec<Item<Value>>> {
        match self {
            Self::Embedded(b) => b.get(keys).await,
            Self::Distributed(b) => b.get(keys).await,
        }
    }

    async fn set(&self, items: Vec<Item<Value>>) -> StorageResult<()> {
        match self {
            Self::Embedded(b) => b.set(items).await,
            Self::Distributed(b) => b.set(items).await,
        }
    }

    async fn delete(&self, keys: &[Key]) -> StorageResult<()> {
        match self {
            Self::Embedded(b) => b.delete(keys).await,
            Self::Distributed(b) => b.delete(keys).await,
        }
    }

    async fn query_page(
        &self,
        query: &Query,
        cursor: Option<&Key>,
        limit: usize,
    ) -> StorageResult<Page<Value>> {
        match self {
            Self::Embedded(b) => b.query_page(query, cursor, limit).await,
            Self::Distributed(b) => b.query_page(query, cursor, limit).await,
        }
    }

    fn page_size(&self) -> usize {
        match self {
            Self::Embedded(b) => b.page_size(),
            Self::Distributed(b) => b.page_size(),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        match self {
            Self::Embedded(b) => b.health_check().await,
            Self::Distributed(b) => b.health_check().await,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(_) => write!(f, "Backend::Embedded"),
            Self::Distributed(_) => write!(f, "Backend::Distributed"),
        }
    }
}
