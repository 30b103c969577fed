//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Every backend runs the same functions, so the embedded and distributed
//! stores are held to one contract: version conditions, batch atomicity,
//! ordering, pagination, expiry, merge-updates and stream cancellation.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each function with a fresh store:
//!
//! ```no_run
//! use versakv_storage::{Database, EmbeddedBackend, conformance};
//!
//! #[tokio::test]
//! async fn cas_concurrent_writers_have_one_winner() {
//!     let db = Database::new(EmbeddedBackend::in_memory().unwrap());
//!     conformance::cas_concurrent_writers_have_one_winner(&db).await;
//! }
//! ```
//!
//! The pagination checks write `2 * page_size + 3` items, so run them against
//! a backend configured with a small page size.
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | Point reads, writes, deletes and validation |
//! | CAS | Blind, create-only and token-conditioned writes |
//! | Batch | All-or-nothing writes and deletes |
//! | Range | Ordering, prefixes, limits and pagination |
//! | Stream | Lazy delivery and cancellation |
//! | TTL | Expired items are never observable |
//! | Merge | Deep-merge updates under version checks |

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use serde_json::{Value, json};

use crate::{
    Database,
    backend::StorageBackend,
    error::StorageError,
    size_limits::MAX_PAYLOAD_SIZE,
    testutil::{CountingBackend, make_key, seed},
    types::{Item, Key, Query, Version},
};

fn item(pk: &str, sk: &str, data: Value) -> Item<Value> {
    Item::new(Key::new(pk, sk), data)
}

async fn read<B: StorageBackend + 'static>(db: &Database<B>, pk: &str, sk: &str) -> Item<Value> {
    db.get_one(&Key::new(pk, sk)).await.expect("get_one").expect("item should exist")
}

async fn sort_keys<B: StorageBackend + 'static>(db: &Database<B>, query: Query) -> Vec<String> {
    let items: Vec<Item<Value>> = db.query(query).await.expect("query");
    items.into_iter().map(|item| item.key.sk).collect()
}

// ============================================================================
// CRUD
// ============================================================================

/// `get` omits keys that hold no item.
pub async fn crud_get_omits_missing_keys<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("USER", "1", json!("one"))]).await.expect("set");

    let items: Vec<Item<Value>> = db
        .get(&[Key::new("USER", "0"), Key::new("USER", "1"), Key::new("USER", "2")])
        .await
        .expect("get");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, Key::new("USER", "1"));
}

/// `set` then `get` round-trips payload and assigns a version token.
pub async fn crud_set_then_get_round_trips<B: StorageBackend + 'static>(db: &Database<B>) {
    let payload = json!({"name": "ada", "tags": ["x", "y"], "nested": {"n": 1.5, "ok": true}});
    db.set([item("USER", "ada", payload.clone())]).await.expect("set");

    let stored = read(db, "USER", "ada").await;
    assert_eq!(stored.data, payload);
    assert!(matches!(stored.version, Version::Token(_)), "reads carry a token");
    assert_eq!(stored.expires_at, None);
}

/// `get` returns items in request order.
pub async fn crud_get_preserves_request_order<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "a", json!(1)), item("P", "b", json!(2)), item("P", "c", json!(3))])
        .await
        .expect("set");

    let keys = [Key::new("P", "c"), Key::new("P", "missing"), Key::new("P", "a")];
    let items: Vec<Item<Value>> = db.get(&keys).await.expect("get");
    let order: Vec<_> = items.iter().map(|item| item.key.sk.as_str()).collect();
    assert_eq!(order, vec!["c", "a"]);
}

/// The empty sort key is an ordinary key.
pub async fn crud_empty_sort_key_is_valid<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("ROOT", "", json!("root")), item("ROOT", "child", json!("child"))])
        .await
        .expect("set");

    assert_eq!(read(db, "ROOT", "").await.data, json!("root"));
    assert_eq!(sort_keys(db, Query::new("ROOT")).await, vec!["", "child"]);
}

/// `get_one` returns the item or `None`.
pub async fn crud_get_one<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "s", json!(1))]).await.expect("set");
    let found: Option<Item<Value>> = db.get_one(&Key::new("P", "s")).await.expect("get_one");
    let missing: Option<Item<Value>> = db.get_one(&Key::new("P", "x")).await.expect("get_one");
    assert!(found.is_some());
    assert!(missing.is_none());
}

/// Every write assigns a new token.
pub async fn crud_every_write_assigns_a_fresh_token<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("P", "s", json!(1))]).await.expect("first write");
    let first = read(db, "P", "s").await.version;
    db.set([item("P", "s", json!(1))]).await.expect("identical rewrite");
    let second = read(db, "P", "s").await.version;
    assert_ne!(first, second);
}

/// `delete` removes items; deleting missing keys is a no-op.
pub async fn crud_delete_removes_items<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "a", json!(1)), item("P", "b", json!(2))]).await.expect("set");
    db.delete(&[Key::new("P", "a"), Key::new("P", "b"), Key::new("P", "ghost")])
        .await
        .expect("delete");

    let items: Vec<Item<Value>> =
        db.get(&[Key::new("P", "a"), Key::new("P", "b")]).await.expect("get");
    assert!(items.is_empty());
}

/// Empty batches are no-ops, not errors.
pub async fn crud_empty_batches_are_noops<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set(Vec::<Item<Value>>::new()).await.expect("empty set");
    db.update(Vec::<Item<Value>>::new()).await.expect("empty update");
    db.delete(&[]).await.expect("empty delete");
    let items: Vec<Item<Value>> = db.get(&[]).await.expect("empty get");
    assert!(items.is_empty());
}

/// An empty partition key is rejected everywhere.
pub async fn crud_empty_partition_key_is_rejected<B: StorageBackend + 'static>(db: &Database<B>) {
    let set = db.set([item("", "s", json!(1))]).await;
    crate::assert_invalid_argument!(set, "set");

    let get = db.get::<Value>(&[Key::new("", "s")]).await;
    crate::assert_invalid_argument!(get, "get");

    let query = db.query::<Value>(Query::new("")).await;
    crate::assert_invalid_argument!(query, "query");
}

/// A key repeated within one batch is rejected and nothing is written.
pub async fn crud_duplicate_keys_in_batch_are_rejected<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    let result = db.set([item("P", "dup", json!(1)), item("P", "dup", json!(2))]).await;
    crate::assert_invalid_argument!(result);

    let items: Vec<Item<Value>> = db.get(&[Key::new("P", "dup")]).await.expect("get");
    assert!(items.is_empty());
}

/// The payload limit counts the encoded payload alone; a quote-heavy payload
/// just under it is accepted and one just over it is rejected.
pub async fn crud_payload_limit_is_uniform<B: StorageBackend + 'static>(db: &Database<B>) {
    // `[""` + `,""` * (n - 1) + `]` encodes to 3n + 1 bytes.
    let empty_strings = |n: usize| Value::Array(vec![Value::String(String::new()); n]);
    let under = empty_strings((MAX_PAYLOAD_SIZE - 1) / 3);
    let over = empty_strings(MAX_PAYLOAD_SIZE / 3 + 1);

    db.set([item("BIG", "under", under.clone())]).await.expect("payload under the limit");
    assert_eq!(read(db, "BIG", "under").await.data, under);

    let result = db.set([item("BIG", "over", over)]).await;
    crate::assert_invalid_argument!(result, "payload over the limit");
    let items: Vec<Item<Value>> = db.get(&[Key::new("BIG", "over")]).await.expect("get");
    assert!(items.is_empty());
}

/// The backend reports itself healthy.
pub async fn crud_health_check_succeeds<B: StorageBackend + 'static>(db: &Database<B>) {
    db.health_check().await.expect("health check");
}

// ============================================================================
// CAS
// ============================================================================

/// Two writers holding the same token: exactly one wins.
pub async fn cas_concurrent_writers_have_one_winner<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("DOC", "1", json!({"rev": 0}))]).await.expect("seed");
    let token = read(db, "DOC", "1").await.version.token().cloned().expect("token");

    let first = db.set([item("DOC", "1", json!({"rev": "a"})).with_version(token.clone())]);
    let second = db.set([item("DOC", "1", json!({"rev": "b"})).with_version(token)]);
    let (first, second) = tokio::join!(first, second);

    let winners = [&first, &second].iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1, "first: {first:?}, second: {second:?}");
    let loser = if first.is_ok() { second } else { first };
    assert!(loser.as_ref().is_err_and(StorageError::is_conflict), "{loser:?}");

    let rev = read(db, "DOC", "1").await.data["rev"].clone();
    assert!(rev == json!("a") || rev == json!("b"));
}

/// Create-only fails on an existing item, even with an identical payload.
pub async fn cas_create_only_conflicts_with_existing<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("P", "s", json!({"same": true}))]).await.expect("seed");
    let result = db.set([item("P", "s", json!({"same": true})).create_only()]).await;
    crate::assert_conflict!(result);
}

/// Create-only succeeds on an absent key.
pub async fn cas_create_only_succeeds_when_absent<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "new", json!(1)).create_only()]).await.expect("create");
    assert_eq!(read(db, "P", "new").await.data, json!(1));
}

/// A token from an older read fails once the item has moved on.
pub async fn cas_stale_token_conflicts<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "s", json!(1))]).await.expect("seed");
    let stale = read(db, "P", "s").await;
    db.set([item("P", "s", json!(2))]).await.expect("concurrent write");

    let result = db.set([stale.clone().map(|_| json!(3))]).await;
    crate::assert_conflict!(result);
    assert_eq!(read(db, "P", "s").await.data, json!(2));
}

/// A matching token succeeds and the item gets a new token.
pub async fn cas_matching_token_succeeds<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "s", json!(1))]).await.expect("seed");
    let current = read(db, "P", "s").await;

    db.set([current.clone().map(|_| json!(2))]).await.expect("cas write");
    let updated = read(db, "P", "s").await;
    assert_eq!(updated.data, json!(2));
    assert_ne!(updated.version, current.version);
}

/// A token condition against a missing item fails.
pub async fn cas_token_on_missing_item_conflicts<B: StorageBackend + 'static>(db: &Database<B>) {
    let result = db.set([item("P", "ghost", json!(1)).with_version("never-issued".into())]).await;
    crate::assert_conflict!(result);
}

/// Blind writes overwrite regardless of the stored token.
pub async fn cas_blind_write_overwrites<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("P", "s", json!(1))]).await.expect("seed");
    db.set([item("P", "s", json!(2))]).await.expect("blind overwrite");
    assert_eq!(read(db, "P", "s").await.data, json!(2));
}

// ============================================================================
// Batch
// ============================================================================

/// One stale item in a batch keeps every item of the batch unwritten.
pub async fn batch_conflict_writes_nothing<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("ACC", "a", json!(100)), item("ACC", "b", json!(0))]).await.expect("seed");
    let a = read(db, "ACC", "a").await;
    let b = read(db, "ACC", "b").await;
    db.set([item("ACC", "a", json!(90))]).await.expect("make a stale");

    let result = db.set([a.map(|_| json!(50)), b.map(|_| json!(50))]).await;
    crate::assert_conflict!(result);

    assert_eq!(read(db, "ACC", "a").await.data, json!(90));
    assert_eq!(read(db, "ACC", "b").await.data, json!(0), "fresh item must not be written");
}

/// Mixed conditions in one batch apply independently per item.
pub async fn batch_mixed_conditions_apply_together<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("M", "cas", json!(1))]).await.expect("seed");
    let current = read(db, "M", "cas").await;

    db.set([
        item("M", "blind", json!("b")),
        item("M", "create", json!("c")).create_only(),
        current.map(|_| json!("t")),
    ])
    .await
    .expect("mixed batch");

    let items: Vec<Item<Value>> = db.query(Query::new("M")).await.expect("query");
    let data: Vec<_> = items.into_iter().map(|item| item.data).collect();
    assert_eq!(data, vec![json!("b"), json!("t"), json!("c")]);
}

/// A batch whose create-only item already exists writes nothing.
pub async fn batch_create_only_conflict_writes_nothing<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("P", "taken", json!(1))]).await.expect("seed");
    let result =
        db.set([item("P", "free", json!(2)), item("P", "taken", json!(3)).create_only()]).await;
    crate::assert_conflict!(result);

    let items: Vec<Item<Value>> = db.get(&[Key::new("P", "free")]).await.expect("get");
    assert!(items.is_empty());
}

// ============================================================================
// Range
// ============================================================================

/// Ascending order and limit.
pub async fn range_ascending_with_limit<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("N", "1", json!(1)), item("N", "2", json!(2)), item("N", "3", json!(3))])
        .await
        .expect("seed");
    assert_eq!(sort_keys(db, Query::new("N").limit(2)).await, vec!["1", "2"]);
    assert_eq!(sort_keys(db, Query::new("N")).await, vec!["1", "2", "3"]);
}

/// Descending order and limit.
pub async fn range_descending_with_limit<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("N", "1", json!(1)), item("N", "2", json!(2)), item("N", "3", json!(3))])
        .await
        .expect("seed");
    assert_eq!(sort_keys(db, Query::new("N").limit(2).reverse()).await, vec!["3", "2"]);
    assert_eq!(sort_keys(db, Query::new("N").reverse()).await, vec!["3", "2", "1"]);
}

/// The sort-key argument is a prefix match in both directions.
pub async fn range_prefix_filters_sort_keys<B: StorageBackend + 'static>(db: &Database<B>) {
    let items: Vec<_> = ["a/1", "b", "b/1", "b/2", "ba", "c/1"]
        .into_iter()
        .map(|sk| item("T", sk, json!(sk)))
        .collect();
    db.set(items).await.expect("seed");

    assert_eq!(sort_keys(db, Query::new("T").prefix("b/")).await, vec!["b/1", "b/2"]);
    assert_eq!(sort_keys(db, Query::new("T").prefix("b/").reverse()).await, vec!["b/2", "b/1"]);
    assert_eq!(sort_keys(db, Query::new("T").prefix("b")).await, vec!["b", "b/1", "b/2", "ba"]);
    assert_eq!(sort_keys(db, Query::new("T").prefix("b/1")).await, vec!["b/1"]);
    assert!(sort_keys(db, Query::new("T").prefix("z")).await.is_empty());
}

/// Queries never leak items from other partitions.
pub async fn range_isolates_partitions<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("A", "1", json!(1)), item("AB", "1", json!(2)), item("B", "1", json!(3))])
        .await
        .expect("seed");
    let items: Vec<Item<Value>> = db.query(Query::new("A")).await.expect("query");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].data, json!(1));

    let reversed: Vec<Item<Value>> = db.query(Query::new("A").reverse()).await.expect("query");
    assert_eq!(reversed.len(), 1);
}

/// Sort keys order by bytes, not numerically.
pub async fn range_orders_lexicographically<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("L", "10", json!(10)), item("L", "9", json!(9)), item("L", "100", json!(100))])
        .await
        .expect("seed");
    assert_eq!(sort_keys(db, Query::new("L")).await, vec!["10", "100", "9"]);
}

/// More items than one page come back complete, ordered and unique.
pub async fn range_paginates_transparently<B: StorageBackend + 'static>(db: &Database<B>) {
    let count = db.backend().page_size() * 2 + 3;
    seed(db, "PAGE", count).await;

    let forward = sort_keys(db, Query::new("PAGE")).await;
    let expected: Vec<_> = (0..count).map(|i| make_key("PAGE", i).sk).collect();
    assert_eq!(forward, expected);

    let backward = sort_keys(db, Query::new("PAGE").reverse()).await;
    let mut expected_backward = expected;
    expected_backward.reverse();
    assert_eq!(backward, expected_backward);
}

/// A limit that spans several pages is honored exactly.
pub async fn range_limit_spans_pages<B: StorageBackend + 'static>(db: &Database<B>) {
    let page_size = db.backend().page_size();
    seed(db, "PAGE", page_size * 2 + 3).await;

    let limit = page_size + page_size / 2 + 1;
    let keys = sort_keys(db, Query::new("PAGE").limit(limit)).await;
    let expected: Vec<_> = (0..limit).map(|i| make_key("PAGE", i).sk).collect();
    assert_eq!(keys, expected);
}

/// A zero limit returns nothing.
pub async fn range_zero_limit_is_empty<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("Z", "1", json!(1))]).await.expect("seed");
    assert!(sort_keys(db, Query::new("Z").limit(0)).await.is_empty());
}

// ============================================================================
// Stream
// ============================================================================

/// `stream` yields exactly what `query` returns.
pub async fn stream_matches_query<B: StorageBackend + 'static>(db: &Database<B>) {
    let page_size = db.backend().page_size();
    seed(db, "S", page_size + 2).await;

    for query in [Query::new("S"), Query::new("S").reverse().limit(page_size + 1)] {
        let eager: Vec<Item<Value>> = db.query(query.clone()).await.expect("query");
        let lazy: Vec<Item<Value>> = db
            .stream(query)
            .map(|item| item.expect("stream item"))
            .collect()
            .await;
        assert_eq!(lazy, eager);
    }
}

/// Dropping a stream after N items issues no further page requests.
pub async fn stream_stops_fetching_when_dropped<B: StorageBackend + 'static>(backend: B) {
    let db = Database::new(CountingBackend::new(backend));
    let page_size = db.backend().page_size();
    seed(&db, "S", page_size * 4).await;

    let mut stream = db.stream::<Value>(Query::new("S"));
    for _ in 0..page_size + 1 {
        stream.next().await.expect("item").expect("ok");
    }
    let calls_before_drop = db.backend().page_calls();
    drop(stream);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls_before_drop, 2, "only the pages that were consumed are fetched");
    assert_eq!(db.backend().page_calls(), calls_before_drop);
}

// ============================================================================
// TTL
// ============================================================================

/// An item past its deadline is invisible to `get`.
pub async fn ttl_expired_item_is_not_returned_by_get<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    let past = Utc::now() - TimeDelta::seconds(5);
    db.set([item("TTL", "old", json!(1)).with_expiry(past)]).await.expect("set");
    let items: Vec<Item<Value>> = db.get(&[Key::new("TTL", "old")]).await.expect("get");
    assert!(items.is_empty());
}

/// An item past its deadline is invisible to `query` and `stream`.
pub async fn ttl_expired_item_is_not_returned_by_query<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    let past = Utc::now() - TimeDelta::seconds(5);
    db.set([
        item("TTL", "1", json!(1)),
        item("TTL", "2", json!(2)).with_expiry(past),
        item("TTL", "3", json!(3)),
    ])
    .await
    .expect("set");

    assert_eq!(sort_keys(db, Query::new("TTL")).await, vec!["1", "3"]);
    assert_eq!(sort_keys(db, Query::new("TTL").limit(2)).await, vec!["1", "3"]);
    let streamed: Vec<_> = db.stream::<Value>(Query::new("TTL")).collect().await;
    assert_eq!(streamed.len(), 2);
}

/// Expiry is enforced across page boundaries without skipping live items.
pub async fn ttl_expired_items_across_pages<B: StorageBackend + 'static>(db: &Database<B>) {
    let page_size = db.backend().page_size();
    let past = Utc::now() - TimeDelta::seconds(5);
    let total = page_size * 3;
    let items: Vec<_> = (0..total)
        .map(|i| {
            let fresh = Item::new(make_key("TTLP", i), json!(i));
            if i % 2 == 0 { fresh.with_expiry(past) } else { fresh }
        })
        .collect();
    for chunk in items.chunks(100) {
        db.set(chunk.to_vec()).await.expect("seed");
    }

    let keys = sort_keys(db, Query::new("TTLP")).await;
    let expected: Vec<_> =
        (0..total).filter(|i| i % 2 == 1).map(|i| make_key("TTLP", i).sk).collect();
    assert_eq!(keys, expected);
}

/// An item that expires while stored disappears from reads.
pub async fn ttl_item_disappears_after_deadline<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("TTL", "short", json!(1)).expire_in(Duration::from_millis(200))])
        .await
        .expect("set");
    let before: Vec<Item<Value>> = db.get(&[Key::new("TTL", "short")]).await.expect("get");
    assert_eq!(before.len(), 1);
    assert!(before[0].expires_at.is_some());

    tokio::time::sleep(Duration::from_millis(350)).await;
    let after: Vec<Item<Value>> = db.get(&[Key::new("TTL", "short")]).await.expect("get");
    assert!(after.is_empty());
}

/// Create-only succeeds over an expired item.
pub async fn ttl_expired_item_counts_as_absent_for_create_only<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    let past = Utc::now() - TimeDelta::seconds(5);
    db.set([item("TTL", "k", json!("old")).with_expiry(past)]).await.expect("set");
    db.set([item("TTL", "k", json!("new")).create_only()]).await.expect("create over expired");
    assert_eq!(read(db, "TTL", "k").await.data, json!("new"));
}

/// A token read before expiry no longer matches once the item expired.
pub async fn ttl_expired_item_fails_token_condition<B: StorageBackend + 'static>(
    db: &Database<B>,
) {
    db.set([item("TTL", "k", json!(1)).expire_in(Duration::from_millis(200))])
        .await
        .expect("set");
    let token = read(db, "TTL", "k").await.version.token().cloned().expect("token");

    tokio::time::sleep(Duration::from_millis(350)).await;
    let result = db.set([item("TTL", "k", json!(2)).with_version(token)]).await;
    crate::assert_conflict!(result);
}

/// Writing without an expiry clears a previous one.
pub async fn ttl_rewrite_without_expiry_clears_it<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("TTL", "k", json!(1)).expire_in(Duration::from_secs(3600))])
        .await
        .expect("set");
    assert!(read(db, "TTL", "k").await.expires_at.is_some());

    let current = read(db, "TTL", "k").await;
    let token = current.version.token().cloned().expect("token");
    db.set([Item::new(current.key, json!(2)).with_version(token)]).await.expect("cas rewrite");
    assert_eq!(read(db, "TTL", "k").await.expires_at, None);
}

// ============================================================================
// Merge
// ============================================================================

/// Nested objects merge key by key.
pub async fn merge_nested_objects<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("U", "1", json!({"a": 1, "b": {"x": 1}}))]).await.expect("seed");
    db.update([item("U", "1", json!({"b": {"y": 2}}))]).await.expect("update");
    assert_eq!(read(db, "U", "1").await.data, json!({"a": 1, "b": {"x": 1, "y": 2}}));
}

/// Arrays are replaced, never concatenated.
pub async fn merge_replaces_arrays<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("U", "1", json!({"tags": ["a", "b"], "keep": true}))]).await.expect("seed");
    db.update([item("U", "1", json!({"tags": ["c"]}))]).await.expect("update");
    assert_eq!(read(db, "U", "1").await.data, json!({"tags": ["c"], "keep": true}));
}

/// Updating a missing item writes the patch as-is.
pub async fn merge_missing_item_writes_patch<B: StorageBackend + 'static>(db: &Database<B>) {
    db.update([item("U", "new", json!({"only": "patch"}))]).await.expect("update");
    assert_eq!(read(db, "U", "new").await.data, json!({"only": "patch"}));
}

/// An update built from a stale read fails like a plain `set`.
pub async fn merge_stale_read_conflicts<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("U", "1", json!({"a": 1}))]).await.expect("seed");
    let stale = read(db, "U", "1").await;
    db.update([item("U", "1", json!({"b": 2}))]).await.expect("concurrent update");

    let result = db.update([stale.map(|_| json!({"c": 3}))]).await;
    crate::assert_conflict!(result);
    assert_eq!(read(db, "U", "1").await.data, json!({"a": 1, "b": 2}));
}

/// A batch update is atomic: one stale item keeps all unwritten.
pub async fn merge_batch_is_atomic<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("U", "1", json!({"n": 1})), item("U", "2", json!({"n": 2}))])
        .await
        .expect("seed");
    let stale = read(db, "U", "2").await;
    db.set([item("U", "2", json!({"n": 20}))]).await.expect("concurrent write");

    let result =
        db.update([item("U", "1", json!({"m": 1})), stale.map(|_| json!({"m": 2}))]).await;
    crate::assert_conflict!(result);
    assert_eq!(read(db, "U", "1").await.data, json!({"n": 1}));
}

/// The stored expiry survives an update that sets none.
pub async fn merge_keeps_existing_expiry<B: StorageBackend + 'static>(db: &Database<B>) {
    db.set([item("U", "1", json!({"a": 1})).expire_in(Duration::from_secs(3600))])
        .await
        .expect("seed");
    let before = read(db, "U", "1").await.expires_at;

    db.update([item("U", "1", json!({"b": 2}))]).await.expect("update");
    let after = read(db, "U", "1").await;
    assert_eq!(after.data, json!({"a": 1, "b": 2}));
    assert_eq!(after.expires_at, before);
}
