//! In-memory stand-in for a DynamoDB table.
//!
//! [`MemoryTable`] implements [`TableClient`] with the semantics the backend
//! relies on: transactions of at most 100 distinct items that apply
//! all-or-nothing, per-item cancellation reasons, lexicographic sort-key
//! order, `Limit` counting evaluated items, and `LastEvaluatedKey` whenever a
//! page stops at its limit. Like the real table it never hides expired
//! items; filtering them is the backend's job.
//!
//! Feature-gated behind `testutil`.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use parking_lot::Mutex;

use crate::{
    attributes::{EXPIRES_AT, VERSION},
    error::{Result, TableError},
    keys::{Attributes, PK, SK, encode_sort_key},
    table::{MAX_TRANSACTION_ITEMS, QueryPage, QueryRequest, TableClient, TableWrite},
};

type StoredKey = (String, String);

/// In-memory table keyed by `(pk, stored sk)`.
#[derive(Debug, Default)]
pub struct MemoryTable {
    items: Mutex<BTreeMap<StoredKey, Attributes>>,
    unavailable: AtomicBool,
    write_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MemoryTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty, shared table.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes every call fail with a service error while `unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `transact_write` calls that reached the table.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of `query` calls that reached the table.
    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of stored items, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Raw attributes stored under the logical key `(pk, sk)`.
    #[must_use]
    pub fn stored(&self, pk: &str, sk: &str) -> Option<Attributes> {
        self.items.lock().get(&(pk.to_owned(), encode_sort_key(sk))).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            let source = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "table offline");
            return Err(TableError::Service {
                message: "dispatch failure: table offline".into(),
                source: Arc::new(source),
            });
        }
        Ok(())
    }
}

fn target(write: &TableWrite) -> Result<StoredKey> {
    write
        .target()
        .map(|(pk, sk)| (pk.to_owned(), sk.to_owned()))
        .ok_or_else(|| TableError::Validation("write lacks string key attributes".into()))
}

fn key_of(attributes: &Attributes) -> Result<StoredKey> {
    let read = |name: &str| {
        attributes
            .get(name)
            .and_then(|value| value.as_s().ok())
            .cloned()
            .ok_or_else(|| TableError::Validation(format!("key lacks string `{name}`")))
    };
    Ok((read(PK)?, read(SK)?))
}

fn expires_at(attributes: &Attributes) -> Option<i64> {
    attributes.get(EXPIRES_AT)?.as_n().ok()?.parse().ok()
}

fn live_version(stored: Option<&Attributes>, now_ms: i64) -> Option<&str> {
    let stored = stored?;
    if expires_at(stored).is_some_and(|deadline| deadline <= now_ms) {
        return None;
    }
    stored.get(VERSION)?.as_s().ok().map(String::as_str)
}

fn condition_holds(write: &TableWrite, stored: Option<&Attributes>) -> bool {
    match write {
        TableWrite::Put { .. } | TableWrite::Delete { .. } => true,
        TableWrite::Create { now_ms, .. } => {
            stored.is_none_or(|stored| expires_at(stored).is_some_and(|deadline| deadline <= *now_ms))
        },
        TableWrite::Replace { expected_version, now_ms, .. } => {
            live_version(stored, *now_ms) == Some(expected_version.as_str())
        },
    }
}

#[async_trait]
impl TableClient for MemoryTable {
    async fn transact_write(&self, writes: Vec<TableWrite>) -> Result<()> {
        self.check_available()?;
        if writes.is_empty() || writes.len() > MAX_TRANSACTION_ITEMS {
            return Err(TableError::Validation(format!(
                "transactions take 1 to {MAX_TRANSACTION_ITEMS} items, got {}",
                writes.len()
            )));
        }
        let targets = writes.iter().map(target).collect::<Result<Vec<_>>>()?;
        for (index, key) in targets.iter().enumerate() {
            if targets[..index].contains(key) {
                return Err(TableError::Validation(
                    "transaction cannot include multiple operations on one item".into(),
                ));
            }
        }

        let mut items = self.items.lock();
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let reasons: Vec<Option<String>> = writes
            .iter()
            .zip(&targets)
            .map(|(write, key)| {
                let code =
                    if condition_holds(write, items.get(key)) { "None" } else { "ConditionalCheckFailed" };
                Some(code.to_owned())
            })
            .collect();
        if reasons.iter().flatten().any(|code| code != "None") {
            return Err(TableError::TransactionCanceled { reasons });
        }

        for (write, key) in writes.into_iter().zip(targets) {
            match write {
                TableWrite::Put { item }
                | TableWrite::Create { item, .. }
                | TableWrite::Replace { item, .. } => {
                    items.insert(key, item);
                },
                TableWrite::Delete { .. } => {
                    items.remove(&key);
                },
            }
        }
        Ok(())
    }

    async fn get_items(&self, keys: Vec<Attributes>) -> Result<Vec<Option<Attributes>>> {
        self.check_available()?;
        let keys = keys.iter().map(key_of).collect::<Result<Vec<_>>>()?;
        for (index, key) in keys.iter().enumerate() {
            if keys[..index].contains(key) {
                return Err(TableError::Validation("duplicate key in one read".into()));
            }
        }

        let items = self.items.lock();
        Ok(keys.iter().map(|key| items.get(key).cloned()).collect())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        self.check_available()?;
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let limit = usize::try_from(request.limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| TableError::Validation("limit must be positive".into()))?;

        let start = request.exclusive_start_key.as_ref().map(key_of).transpose()?;
        let lower = (request.pk.clone(), request.sk_prefix.clone());
        let items = self.items.lock();
        let partition = items
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|((pk, sk), _)| *pk == request.pk && sk.starts_with(&request.sk_prefix));

        let mut matching: Vec<(&StoredKey, &Attributes)> = partition.collect();
        if request.reverse {
            matching.reverse();
        }
        let resumed = matching.into_iter().skip_while(|(key, _)| match &start {
            Some(start) if request.reverse => *key >= start,
            Some(start) => *key <= start,
            None => false,
        });

        let page: Vec<(&StoredKey, &Attributes)> = resumed.take(limit).collect();
        let last_evaluated_key = if page.len() == limit {
            page.last().map(|((pk, sk), _)| {
                HashMap::from([
                    (PK.to_owned(), AttributeValue::S(pk.clone())),
                    (SK.to_owned(), AttributeValue::S(sk.clone())),
                ])
            })
        } else {
            None
        };
        Ok(QueryPage {
            items: page.into_iter().map(|(_, attributes)| attributes.clone()).collect(),
            last_evaluated_key,
        })
    }

    async fn describe(&self) -> Result<()> {
        self.check_available()
    }
}
