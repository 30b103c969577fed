//! Deep-merge rules for partial updates.
//!
//! Objects merge key by key, recursively. Everything else (arrays, scalars,
//! `null`, and mismatched types) is replaced wholesale by the patch value.

use serde_json::Value;

use crate::types::{Item, Version};

/// Merges `patch` into `target` in place.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (field, value) in patch {
                match target.get_mut(&field) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        target.insert(field, value);
                    },
                }
            }
        },
        (slot, value) => *slot = value,
    }
}

/// Builds the write-back for one merge-update.
///
/// With an existing item the patch is merged into its payload and the write
/// is conditioned on the token that was read, unless the caller supplied a
/// condition of their own. Without one the patch is written as-is, create-only
/// when the caller gave no condition, so a concurrent creator is never
/// silently overwritten. The patch's expiry wins over the stored one.
pub(crate) fn merge_item(existing: Option<&Item<Value>>, patch: Item<Value>) -> Item<Value> {
    match existing {
        Some(current) => {
            let mut data = current.data.clone();
            deep_merge(&mut data, patch.data);
            let version = match patch.version {
                Version::Unset => current.version.clone(),
                explicit => explicit,
            };
            Item {
                key: patch.key,
                data,
                version,
                expires_at: patch.expires_at.or(current.expires_at),
            }
        },
        None => {
            let version = match patch.version {
                Version::Unset => Version::CreateOnly,
                explicit => explicit,
            };
            Item { version, ..patch }
        },
    }
}
