//! Key, payload and batch validation shared by every backend.
//!
//! The limits are those of the distributed table store. The embedded backend
//! enforces them too, so a workload that runs locally never starts failing
//! once it is pointed at the distributed store.
//!
//! | Limit | Value |
//! |-------|-------|
//! | partition key | 1 - 2048 bytes |
//! | sort key | 0 - 1023 bytes |
//! | encoded payload | 400 KiB |

use std::collections::HashSet;

use crate::{
    StorageError,
    error::StorageResult,
    types::{Key, Query},
};

/// Maximum partition key size in bytes.
pub const MAX_PARTITION_KEY_SIZE: usize = 2048;

/// Maximum sort key size in bytes.
///
/// One byte below the distributed store's limit, which is taken by the
/// sort-key marker that backend prepends.
pub const MAX_SORT_KEY_SIZE: usize = 1023;

/// Maximum encoded payload size in bytes (400 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 400 * 1024;

/// Validates a single key.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if the partition key is empty or
/// either part exceeds its size limit.
pub fn validate_key(key: &Key) -> StorageResult<()> {
    validate_partition_key(&key.pk)?;
    if key.sk.len() > MAX_SORT_KEY_SIZE {
        return Err(StorageError::invalid_argument(format!(
            "sort key of {} bytes exceeds the {MAX_SORT_KEY_SIZE} byte limit",
            key.sk.len()
        )));
    }
    Ok(())
}

fn validate_partition_key(pk: &str) -> StorageResult<()> {
    if pk.is_empty() {
        return Err(StorageError::invalid_argument("partition key must not be empty"));
    }
    if pk.len() > MAX_PARTITION_KEY_SIZE {
        return Err(StorageError::invalid_argument(format!(
            "partition key of {} bytes exceeds the {MAX_PARTITION_KEY_SIZE} byte limit",
            pk.len()
        )));
    }
    Ok(())
}

/// Validates a range query descriptor.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] for an empty or oversized
/// partition key, or an oversized prefix.
pub fn validate_query(query: &Query) -> StorageResult<()> {
    validate_partition_key(&query.pk)?;
    if query.sk_prefix().len() > MAX_SORT_KEY_SIZE {
        return Err(StorageError::invalid_argument("sort key prefix exceeds the sort key limit"));
    }
    Ok(())
}

/// Validates the size of an encoded payload.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] when `encoded_len` exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub fn validate_payload_size(key: &Key, encoded_len: usize) -> StorageResult<()> {
    if encoded_len > MAX_PAYLOAD_SIZE {
        return Err(StorageError::invalid_argument(format!(
            "payload for {key} is {encoded_len} bytes, limit is {MAX_PAYLOAD_SIZE}"
        )));
    }
    Ok(())
}

/// Validates every key of a write batch and rejects repeated keys.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] on the first invalid or repeated
/// key.
pub fn validate_batch<'a>(keys: impl IntoIterator<Item = &'a Key>) -> StorageResult<()> {
    let mut seen = HashSet::new();
    for key in keys {
        validate_key(key)?;
        if !seen.insert(key) {
            return Err(StorageError::invalid_argument(format!(
                "key {key} appears more than once in one batch"
            )));
        }
    }
    Ok(())
}

/// Returns `keys` without repeats, keeping first occurrences in order.
#[must_use]
pub fn dedup_keys(keys: &[Key]) -> Vec<Key> {
    let mut seen = HashSet::new();
    keys.iter().filter(|key| seen.insert(*key)).cloned().collect()
}
