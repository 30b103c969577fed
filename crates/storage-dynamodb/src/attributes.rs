//! Mapping between [`Item`]s and table attribute maps.
//!
//! | Attribute | Type | Content |
//! |-----------|------|---------|
//! | `pk` | S | partition key |
//! | `sk` | S | marker-prefixed sort key |
//! | `data` | S | JSON payload |
//! | `versionstamp` | S | version token |
//! | `ttl` | N | deadline in epoch seconds, rounded up (table TTL attribute) |
//! | `expires_at` | N | deadline in epoch milliseconds |
//!
//! The table's native TTL deletes items lazily and only to the second, so
//! reads and conditions use `expires_at`; `ttl` exists for physical cleanup.

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::Value;
use versakv_storage::{
    Item, Key, StorageError, StorageResult, VersionToken,
    codec::{decode_data, encode_data, millis_to_datetime},
    size_limits::validate_payload_size,
};

use crate::keys::{Attributes, key_attributes, key_from_attributes};

/// Payload attribute.
pub const DATA: &str = "data";

/// Version token attribute.
pub const VERSION: &str = "versionstamp";

/// Native TTL attribute (epoch seconds).
pub const TTL: &str = "ttl";

/// Precise deadline attribute (epoch milliseconds).
pub const EXPIRES_AT: &str = "expires_at";

/// Rounds a millisecond deadline up to whole seconds, so the table never
/// deletes an item before it has expired.
pub(crate) fn ttl_seconds(millis: i64) -> i64 {
    millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) != 0)
}

/// Builds the full attribute map written for `item` under `version`.
pub(crate) fn item_attributes(item: &Item<Value>, version: &VersionToken) -> StorageResult<Attributes> {
    let data = encode_data(&item.data)?;
    validate_payload_size(&item.key, data.len())?;

    let mut attributes = key_attributes(&item.key);
    attributes.insert(DATA.to_owned(), AttributeValue::S(data));
    attributes.insert(VERSION.to_owned(), AttributeValue::S(version.as_str().to_owned()));
    if let Some(deadline) = item.expires_at {
        let millis = deadline.timestamp_millis();
        attributes.insert(TTL.to_owned(), AttributeValue::N(ttl_seconds(millis).to_string()));
        attributes.insert(EXPIRES_AT.to_owned(), AttributeValue::N(millis.to_string()));
    }
    Ok(attributes)
}

/// Reads the millisecond deadline of a stored item, if it has one.
pub(crate) fn expires_at_millis(key: &Key, attributes: &Attributes) -> StorageResult<Option<i64>> {
    let Some(value) = attributes.get(EXPIRES_AT) else {
        return Ok(None);
    };
    let text = value.as_n().map_err(|_| {
        StorageError::serialization(format!("`{EXPIRES_AT}` of {key} is not a number"))
    })?;
    text.parse().map(Some).map_err(|_| {
        StorageError::serialization(format!("`{EXPIRES_AT}` of {key} is not an integer: {text}"))
    })
}

/// Returns `true` unless the stored item's deadline is at or before `now_ms`.
pub(crate) fn is_live(key: &Key, attributes: &Attributes, now_ms: i64) -> StorageResult<bool> {
    Ok(expires_at_millis(key, attributes)?.is_none_or(|deadline| deadline > now_ms))
}

/// Decodes a stored item.
pub(crate) fn item_from_attributes(attributes: &Attributes) -> StorageResult<Item<Value>> {
    let key = key_from_attributes(attributes)?;
    let text = attributes.get(DATA).and_then(|value| value.as_s().ok()).ok_or_else(|| {
        StorageError::serialization(format!("item {key} lacks a string `{DATA}` attribute"))
    })?;
    let version = attributes.get(VERSION).and_then(|value| value.as_s().ok()).ok_or_else(|| {
        StorageError::serialization(format!("item {key} lacks a string `{VERSION}` attribute"))
    })?;
    let expires_at = expires_at_millis(&key, attributes)?
        .map(|millis| millis_to_datetime(&key, millis))
        .transpose()?;

    let data = decode_data(&key, text)?;
    let item = Item::new(key, data).with_version(VersionToken::from(version.as_str()));
    Ok(match expires_at {
        Some(deadline) => item.with_expiry(deadline),
        None => item,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::keys::SK;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(999, 1)]
    #[case(1000, 1)]
    #[case(1001, 2)]
    #[case(-1, 0)]
    #[case(-1000, -1)]
    fn ttl_rounds_up(#[case] millis: i64, #[case] seconds: i64) {
        assert_eq!(ttl_seconds(millis), seconds);
    }

    #[test]
    fn item_round_trips_through_attributes() {
        let deadline = Utc.timestamp_millis_opt(1_900_000_000_123).unwrap();
        let item = Item::new(Key::new("AGENT", ""), json!({"name": "helper"})).with_expiry(deadline);
        let token = VersionToken::from("v1");

        let attributes = item_attributes(&item, &token).unwrap();
        assert_eq!(attributes[SK], AttributeValue::S("#".into()));
        assert_eq!(attributes[TTL], AttributeValue::N("1900000001".into()));
        assert_eq!(attributes[EXPIRES_AT], AttributeValue::N("1900000000123".into()));

        let decoded = item_from_attributes(&attributes).unwrap();
        assert_eq!(decoded.key, item.key);
        assert_eq!(decoded.data, item.data);
        assert_eq!(decoded.version.token(), Some(&token));
        assert_eq!(decoded.expires_at, Some(deadline));
    }

    #[test]
    fn no_expiry_writes_no_ttl_attributes() {
        let item = Item::new(Key::new("P", "s"), json!(1));
        let attributes = item_attributes(&item, &VersionToken::from("v")).unwrap();
        assert!(!attributes.contains_key(TTL));
        assert!(!attributes.contains_key(EXPIRES_AT));
        assert!(is_live(&item.key, &attributes, i64::MAX).unwrap());
    }

    #[test]
    fn deadline_equal_to_now_is_expired() {
        let item =
            Item::new(Key::new("P", "s"), json!(1)).with_expiry(Utc.timestamp_millis_opt(5_000).unwrap());
        let attributes = item_attributes(&item, &VersionToken::from("v")).unwrap();
        assert!(is_live(&item.key, &attributes, 4_999).unwrap());
        assert!(!is_live(&item.key, &attributes, 5_000).unwrap());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let item = Item::new(Key::new("P", "s"), json!("x".repeat(400 * 1024)));
        let err = item_attributes(&item, &VersionToken::from("v")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    #[test]
    fn corrupt_payload_is_a_serialization_error() {
        let mut attributes = item_attributes(
            &Item::new(Key::new("P", "s"), json!(1)),
            &VersionToken::from("v"),
        )
        .unwrap();
        attributes.insert(DATA.to_owned(), AttributeValue::S("{not json".into()));
        let err = item_from_attributes(&attributes).unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
