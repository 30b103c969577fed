//! Key, item and query value types.
//!
//! A [`Key`] is a `(pk, sk)` pair: the partition key groups an entity
//! collection, the sort key orders items inside it. Keys order
//! lexicographically on `(pk, sk)`, which is also the order range queries
//! return.

use std::{fmt, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Separator used by [`compose_key`] and [`decompose_key`].
pub const KEY_SEPARATOR: char = '/';

/// Two-part item key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Partition key.
    pub pk: String,
    /// Sort key. May be empty.
    pub sk: String,
}

impl Key {
    /// Creates a key from its two parts.
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.pk, self.sk)
    }
}

/// Joins key segments with `/`, e.g. `["USER", "42"]` becomes `"USER/42"`.
#[must_use]
pub fn compose_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(part.as_ref());
    }
    out
}

/// Splits a composed key back into its segments.
#[must_use]
pub fn decompose_key(key: &str) -> Vec<&str> {
    key.split(KEY_SEPARATOR).collect()
}

/// Opaque version token assigned on every successful write.
///
/// Tokens are UUIDv7 values in lowercase hex without hyphens, so they are
/// unique and sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Generates a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VersionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write condition carried by an [`Item`].
///
/// Items returned by reads always carry [`Version::Token`], so passing a read
/// item straight back to `set` performs a compare-and-swap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Version {
    /// Blind write: overwrite whatever is stored.
    #[default]
    Unset,
    /// Create-only: fail if a live item exists at the key.
    CreateOnly,
    /// Compare-and-swap: fail unless the live item carries this token.
    Token(VersionToken),
}

impl Version {
    /// Returns the token, if this is [`Version::Token`].
    #[must_use]
    pub fn token(&self) -> Option<&VersionToken> {
        match self {
            Self::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Checks the condition against the token of the live item at the key
    /// (`None` when absent or expired).
    #[must_use]
    pub fn admits(&self, current: Option<&str>) -> bool {
        match self {
            Self::Unset => true,
            Self::CreateOnly => current.is_none(),
            Self::Token(expected) => current == Some(expected.as_str()),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Token(token) => serializer.serialize_some(token.as_str()),
            Self::Unset | Self::CreateOnly => serializer.serialize_none(),
        }
    }
}

/// A versioned item envelope.
///
/// Serializes flat as `{pk, sk, data, versionstamp, expires_at}`, which is the
/// shape pushed to event-stream clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item<T> {
    /// Item key.
    #[serde(flatten)]
    pub key: Key,
    /// Opaque payload.
    pub data: T,
    /// Write condition (on writes) or current token (on reads).
    #[serde(rename = "versionstamp")]
    pub version: Version,
    /// Deadline after which the item is no longer observable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl<T> Item<T> {
    /// Creates an item for a blind write.
    pub fn new(key: Key, data: T) -> Self {
        Self { key, data, version: Version::Unset, expires_at: None }
    }

    /// Turns this write into a create-only write.
    #[must_use]
    pub fn create_only(mut self) -> Self {
        self.version = Version::CreateOnly;
        self
    }

    /// Conditions this write on the stored token matching `token`.
    #[must_use]
    pub fn with_version(mut self, token: VersionToken) -> Self {
        self.version = Version::Token(token);
        self
    }

    /// Sets an absolute expiry deadline.
    #[must_use]
    pub fn with_expiry(mut self, deadline: DateTime<Utc>) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    /// Expires the item `ttl` from now.
    #[must_use]
    pub fn expire_in(self, ttl: Duration) -> Self {
        let deadline = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.with_expiry(deadline)
    }

    /// Returns `true` if the item's deadline is at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Maps the payload, keeping key, version and expiry.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Item<U> {
        Item { key: self.key, data: f(self.data), version: self.version, expires_at: self.expires_at }
    }

    /// Fallible variant of [`map`](Self::map).
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Item<U>, E> {
        Ok(Item {
            key: self.key,
            data: f(self.data)?,
            version: self.version,
            expires_at: self.expires_at,
        })
    }
}

/// Range scan over one partition.
///
/// The sort-key argument is always a prefix: `Query::new("TASK").prefix("2024-")`
/// matches every sort key starting with `2024-`, identically on every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Partition to scan.
    pub pk: String,
    /// Optional sort-key prefix.
    pub sk_prefix: Option<String>,
    /// Descending sort-key order when `true`.
    pub reverse: bool,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Scans the whole partition in ascending order.
    pub fn new(pk: impl Into<String>) -> Self {
        Self { pk: pk.into(), ..Self::default() }
    }

    /// Restricts the scan to sort keys starting with `prefix`.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sk_prefix = Some(prefix.into());
        self
    }

    /// Returns items in descending sort-key order.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Caps the number of returned items.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The sort-key prefix, with "no prefix" as the empty string.
    #[must_use]
    pub fn sk_prefix(&self) -> &str {
        self.sk_prefix.as_deref().unwrap_or_default()
    }
}

/// One page of a range scan.
///
/// `cursor` is the last key the backend *evaluated*, which may belong to an
/// expired item that was filtered out. `None` means the scan is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Live items in scan order.
    pub items: Vec<Item<T>>,
    /// Resume point for the next page.
    pub cursor: Option<Key>,
}

impl<T> Page<T> {
    /// A final page.
    #[must_use]
    pub fn last(items: Vec<Item<T>>) -> Self {
        Self { items, cursor: None }
    }
}
