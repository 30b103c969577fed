//! Opens a [`Store`] from a [`StorageConfig`].

use versakv_storage::{Database, EmbeddedBackend, StorageResult};
use versakv_storage_dynamodb::DynamoBackend;

use crate::{
    backend::Backend,
    config::{BackendKind, StorageConfig},
};

/// A database over whichever backend the configuration selected.
///
/// Cloning is cheap; clones share the underlying connection or file.
pub type Store = Database<Backend>;

/// Validates `config` and opens the backend it selects.
///
/// Distributed configurations missing `region` or `table` fail here, before
/// any AWS client is constructed.
///
/// # Errors
///
/// Returns [`StorageError::Config`](versakv_storage::StorageError::Config) for
/// an invalid configuration, and
/// [`StorageError::Backend`](versakv_storage::StorageError::Backend) if the
/// embedded database cannot be opened.
pub async fn open(config: &StorageConfig) -> StorageResult<Store> {
    config.validate()?;

    let backend = match config.backend {
        BackendKind::Embedded => {
            let backend = EmbeddedBackend::builder()
                .maybe_path(config.path.clone())
                .maybe_page_size(config.page_size)
                .maybe_sweep_interval(config.sweep_interval)
                .build()?;
            Backend::Embedded(backend)
        },
        BackendKind::Distributed => {
            Backend::Distributed(DynamoBackend::new(config.dynamo_config()?).await?)
        },
    };

    tracing::info!(backend = %config.backend, "storage opened");
    Ok(Database::new(backend))
}
