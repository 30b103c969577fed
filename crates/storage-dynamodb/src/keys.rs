//! Key encoding between [`Key`] and the table's key attributes.
//!
//! DynamoDB rejects empty strings in key attributes, so every sort key is
//! stored behind a one-byte marker. The marker is common to all sort keys,
//! which keeps the stored order identical to the logical byte order and lets
//! `begins_with` prefix conditions work unchanged.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use versakv_storage::{Key, StorageError, StorageResult};

/// Attribute map of one table item.
pub type Attributes = HashMap<String, AttributeValue>;

/// Partition key attribute.
pub const PK: &str = "pk";

/// Sort key attribute.
pub const SK: &str = "sk";

/// Prefix written in front of every stored sort key.
pub(crate) const SORT_KEY_MARKER: char = '#';

/// Encodes a logical sort key (or sort-key prefix) for storage.
pub(crate) fn encode_sort_key(sk: &str) -> String {
    let mut encoded = String::with_capacity(sk.len() + 1);
    encoded.push(SORT_KEY_MARKER);
    encoded.push_str(sk);
    encoded
}

/// Strips the storage marker from a stored sort key.
pub(crate) fn decode_sort_key(stored: &str) -> StorageResult<&str> {
    stored.strip_prefix(SORT_KEY_MARKER).ok_or_else(|| {
        StorageError::serialization(format!("stored sort key `{stored}` lacks its marker"))
    })
}

/// Builds the primary-key attribute map for `key`.
pub(crate) fn key_attributes(key: &Key) -> Attributes {
    HashMap::from([
        (PK.to_owned(), AttributeValue::S(key.pk.clone())),
        (SK.to_owned(), AttributeValue::S(encode_sort_key(&key.sk))),
    ])
}

/// Reads the logical key back out of an item or a `LastEvaluatedKey`.
pub(crate) fn key_from_attributes(attributes: &Attributes) -> StorageResult<Key> {
    let pk = string_attribute(attributes, PK)?;
    let sk = decode_sort_key(string_attribute(attributes, SK)?)?;
    Ok(Key::new(pk, sk))
}

fn string_attribute<'a>(attributes: &'a Attributes, name: &str) -> StorageResult<&'a str> {
    attributes
        .get(name)
        .and_then(|value| value.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| StorageError::serialization(format!("item lacks string attribute `{name}`")))
}
