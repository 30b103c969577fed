//! Payload and envelope encoding.
//!
//! Payloads are stored as JSON text under a `data` field next to the version
//! token and the optional expiry, so either backend can reconstruct the
//! structured value on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    StorageError,
    error::StorageResult,
    types::{Item, Key, Version, VersionToken},
};

/// Encodes a typed payload into its JSON value.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if `T` cannot be represented as JSON.
pub fn to_value<T: Serialize>(data: &T) -> StorageResult<Value> {
    serde_json::to_value(data)
        .map_err(|e| StorageError::serialization_with_source("failed to encode payload", e))
}

/// Decodes a JSON value into a typed payload.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the value does not match `T`.
pub fn from_value<T: DeserializeOwned>(key: &Key, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| {
        StorageError::serialization_with_source(format!("failed to decode payload of {key}"), e)
    })
}

/// Renders a payload as the text stored in the `data` field.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if encoding fails.
pub fn encode_data(data: &Value) -> StorageResult<String> {
    serde_json::to_string(data)
        .map_err(|e| StorageError::serialization_with_source("failed to encode payload", e))
}

/// Parses the text stored in the `data` field.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the stored text is not JSON.
pub fn decode_data(key: &Key, text: &str) -> StorageResult<Value> {
    serde_json::from_str(text).map_err(|e| {
        StorageError::serialization_with_source(format!("stored payload of {key} is not JSON"), e)
    })
}

/// Converts a millisecond epoch timestamp back into a deadline.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] for timestamps chrono cannot
/// represent.
pub fn millis_to_datetime(key: &Key, millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        StorageError::serialization(format!("expiry {millis} of {key} is out of range"))
    })
}

/// Envelope persisted by the embedded backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub(crate) data: String,
    pub(crate) versionstamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires_at: Option<i64>,
}

impl StoredRecord {
    /// Builds the envelope for a write, stamping `version`.
    pub(crate) fn for_write(item: &Item<Value>, version: &VersionToken) -> StorageResult<Self> {
        Ok(Self {
            data: encode_data(&item.data)?,
            versionstamp: version.as_str().to_owned(),
            expires_at: item.expires_at.map(|deadline| deadline.timestamp_millis()),
        })
    }

    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| StorageError::serialization_with_source("failed to encode record", e))
    }

    pub(crate) fn decode(key: &Key, bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::serialization_with_source(format!("stored record of {key} is corrupt"), e)
        })
    }

    /// Returns `true` while the deadline, if any, lies after `now`.
    pub(crate) fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now.timestamp_millis())
    }

    pub(crate) fn into_item(self, key: Key) -> StorageResult<Item<Value>> {
        let data = decode_data(&key, &self.data)?;
        let expires_at = self.expires_at.map(|ms| millis_to_datetime(&key, ms)).transpose()?;
        Ok(Item {
            key,
            data,
            version: Version::Token(VersionToken::from(self.versionstamp)),
            expires_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    #[test]
    fn record_round_trips_through_bytes() {
        let key = Key::new("USER", "1");
        let deadline = DateTime::from_timestamp_millis(1_900_000_000_123).unwrap();
        let item = Item::new(key.clone(), json!({"tags": ["a", "b"]})).with_expiry(deadline);
        let token = VersionToken::generate();

        let record = StoredRecord::for_write(&item, &token).unwrap();
        let decoded = StoredRecord::decode(&key, &record.encode().unwrap()).unwrap();
        let read = decoded.into_item(key).unwrap();

        assert_eq!(read.data, item.data);
        assert_eq!(read.version, Version::Token(token));
        assert_eq!(read.expires_at, Some(deadline));
    }

    #[test]
    fn record_without_expiry_omits_the_field() {
        let item = Item::new(Key::new("p", "s"), json!(1));
        let record = StoredRecord::for_write(&item, &VersionToken::from("v")).unwrap();
        let text = String::from_utf8(record.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"data":"1","versionstamp":"v"}"#);
    }

    #[test]
    fn liveness_is_exclusive_of_the_deadline() {
        let now = Utc::now();
        let mut record =
            StoredRecord { data: "1".into(), versionstamp: "v".into(), expires_at: None };
        assert!(record.is_live(now));

        record.expires_at = Some(now.timestamp_millis());
        assert!(!record.is_live(now));

        record.expires_at = Some((now + TimeDelta::seconds(5)).timestamp_millis());
        assert!(record.is_live(now));
    }

    #[test]
    fn corrupt_record_is_a_serialization_error() {
        let err = StoredRecord::decode(&Key::new("p", "s"), b"not json").unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn typed_decode_reports_the_key() {
        let err = from_value::<u32>(&Key::new("USER", "7"), json!("seven")).unwrap_err();
        assert!(err.to_string().contains("USER/7"), "{err}");
    }
}
