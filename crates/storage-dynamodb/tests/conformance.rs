//! Conformance test suite for `DynamoBackend` over the in-memory table.
//!
//! The same checks the embedded backend passes, run through the DynamoDB
//! backend's request mapping. The page size is small so pagination crosses
//! several `LastEvaluatedKey` boundaries.

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use versakv_storage::{Database, conformance};
use versakv_storage_dynamodb::{DynamoBackend, TableClient, testutil::MemoryTable};

const PAGE_SIZE: usize = 7;

fn backend() -> DynamoBackend {
    let table: Arc<dyn TableClient> = MemoryTable::shared();
    DynamoBackend::with_table(table, PAGE_SIZE)
}

fn db() -> Database<DynamoBackend> {
    Database::new(backend())
}

// ============================================================================
// CRUD (12 tests)
// ============================================================================

#[tokio::test]
async fn crud_get_omits_missing_keys() {
    conformance::crud_get_omits_missing_keys(&db()).await;
}

#[tokio::test]
async fn crud_set_then_get_round_trips() {
    conformance::crud_set_then_get_round_trips(&db()).await;
}

#[tokio::test]
async fn crud_get_preserves_request_order() {
    conformance::crud_get_preserves_request_order(&db()).await;
}

#[tokio::test]
async fn crud_empty_sort_key_is_valid() {
    conformance::crud_empty_sort_key_is_valid(&db()).await;
}

#[tokio::test]
async fn crud_get_one() {
    conformance::crud_get_one(&db()).await;
}

#[tokio::test]
async fn crud_every_write_assigns_a_fresh_token() {
    conformance::crud_every_write_assigns_a_fresh_token(&db()).await;
}

#[tokio::test]
async fn crud_delete_removes_items() {
    conformance::crud_delete_removes_items(&db()).await;
}

#[tokio::test]
async fn crud_empty_batches_are_noops() {
    conformance::crud_empty_batches_are_noops(&db()).await;
}

#[tokio::test]
async fn crud_empty_partition_key_is_rejected() {
    conformance::crud_empty_partition_key_is_rejected(&db()).await;
}

#[tokio::test]
async fn crud_duplicate_keys_in_batch_are_rejected() {
    conformance::crud_duplicate_keys_in_batch_are_rejected(&db()).await;
}

#[tokio::test]
async fn crud_payload_limit_is_uniform() {
    conformance::crud_payload_limit_is_uniform(&db()).await;
}

#[tokio::test]
async fn crud_health_check_succeeds() {
    conformance::crud_health_check_succeeds(&db()).await;
}

// ============================================================================
// CAS (7 tests)
// ============================================================================

#[tokio::test]
async fn cas_concurrent_writers_have_one_winner() {
    conformance::cas_concurrent_writers_have_one_winner(&db()).await;
}

#[tokio::test]
async fn cas_create_only_conflicts_with_existing() {
    conformance::cas_create_only_conflicts_with_existing(&db()).await;
}

#[tokio::test]
async fn cas_create_only_succeeds_when_absent() {
    conformance::cas_create_only_succeeds_when_absent(&db()).await;
}

#[tokio::test]
async fn cas_stale_token_conflicts() {
    conformance::cas_stale_token_conflicts(&db()).await;
}

#[tokio::test]
async fn cas_matching_token_succeeds() {
    conformance::cas_matching_token_succeeds(&db()).await;
}

#[tokio::test]
async fn cas_token_on_missing_item_conflicts() {
    conformance::cas_token_on_missing_item_conflicts(&db()).await;
}

#[tokio::test]
async fn cas_blind_write_overwrites() {
    conformance::cas_blind_write_overwrites(&db()).await;
}

// ============================================================================
// Batch (3 tests)
// ============================================================================

#[tokio::test]
async fn batch_conflict_writes_nothing() {
    conformance::batch_conflict_writes_nothing(&db()).await;
}

#[tokio::test]
async fn batch_mixed_conditions_apply_together() {
    conformance::batch_mixed_conditions_apply_together(&db()).await;
}

#[tokio::test]
async fn batch_create_only_conflict_writes_nothing() {
    conformance::batch_create_only_conflict_writes_nothing(&db()).await;
}

// ============================================================================
// Range (8 tests)
// ============================================================================

#[tokio::test]
async fn range_ascending_with_limit() {
    conformance::range_ascending_with_limit(&db()).await;
}

#[tokio::test]
async fn range_descending_with_limit() {
    conformance::range_descending_with_limit(&db()).await;
}

#[tokio::test]
async fn range_prefix_filters_sort_keys() {
    conformance::range_prefix_filters_sort_keys(&db()).await;
}

#[tokio::test]
async fn range_isolates_partitions() {
    conformance::range_isolates_partitions(&db()).await;
}

#[tokio::test]
async fn range_orders_lexicographically() {
    conformance::range_orders_lexicographically(&db()).await;
}

#[tokio::test]
async fn range_paginates_transparently() {
    conformance::range_paginates_transparently(&db()).await;
}

#[tokio::test]
async fn range_limit_spans_pages() {
    conformance::range_limit_spans_pages(&db()).await;
}

#[tokio::test]
async fn range_zero_limit_is_empty() {
    conformance::range_zero_limit_is_empty(&db()).await;
}

// ============================================================================
// Stream (2 tests)
// ============================================================================

#[tokio::test]
async fn stream_matches_query() {
    conformance::stream_matches_query(&db()).await;
}

#[tokio::test]
async fn stream_stops_fetching_when_dropped() {
    conformance::stream_stops_fetching_when_dropped(backend()).await;
}

// ============================================================================
// TTL (7 tests)
// ============================================================================

#[tokio::test]
async fn ttl_expired_item_is_not_returned_by_get() {
    conformance::ttl_expired_item_is_not_returned_by_get(&db()).await;
}

#[tokio::test]
async fn ttl_expired_item_is_not_returned_by_query() {
    conformance::ttl_expired_item_is_not_returned_by_query(&db()).await;
}

#[tokio::test]
async fn ttl_expired_items_across_pages() {
    conformance::ttl_expired_items_across_pages(&db()).await;
}

#[tokio::test]
async fn ttl_item_disappears_after_deadline() {
    conformance::ttl_item_disappears_after_deadline(&db()).await;
}

#[tokio::test]
async fn ttl_expired_item_counts_as_absent_for_create_only() {
    conformance::ttl_expired_item_counts_as_absent_for_create_only(&db()).await;
}

#[tokio::test]
async fn ttl_expired_item_fails_token_condition() {
    conformance::ttl_expired_item_fails_token_condition(&db()).await;
}

#[tokio::test]
async fn ttl_rewrite_without_expiry_clears_it() {
    conformance::ttl_rewrite_without_expiry_clears_it(&db()).await;
}

// ============================================================================
// Merge (6 tests)
// ============================================================================

#[tokio::test]
async fn merge_nested_objects() {
    conformance::merge_nested_objects(&db()).await;
}

#[tokio::test]
async fn merge_replaces_arrays() {
    conformance::merge_replaces_arrays(&db()).await;
}

#[tokio::test]
async fn merge_missing_item_writes_patch() {
    conformance::merge_missing_item_writes_patch(&db()).await;
}

#[tokio::test]
async fn merge_stale_read_conflicts() {
    conformance::merge_stale_read_conflicts(&db()).await;
}

#[tokio::test]
async fn merge_batch_is_atomic() {
    conformance::merge_batch_is_atomic(&db()).await;
}

#[tokio::test]
async fn merge_keeps_existing_expiry() {
    conformance::merge_keeps_existing_expiry(&db()).await;
}
