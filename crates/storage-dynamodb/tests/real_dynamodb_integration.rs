//! Integration tests for the DynamoDB backend against a real table.
//!
//! These tests require a reachable DynamoDB (or DynamoDB Local) and an
//! existing table with string keys `pk` (HASH) and `sk` (RANGE). They are
//! skipped unless the `RUN_DYNAMODB_INTEGRATION_TESTS` environment variable
//! is set.
//!
//! # Running the tests
//!
//! ```bash
//! docker run -p 8000:8000 amazon/dynamodb-local
//! aws dynamodb create-table --endpoint-url http://localhost:8000 \
//!     --table-name versakv-test \
//!     --attribute-definitions AttributeName=pk,AttributeType=S AttributeName=sk,AttributeType=S \
//!     --key-schema AttributeName=pk,KeyType=HASH AttributeName=sk,KeyType=RANGE \
//!     --billing-mode PAY_PER_REQUEST
//!
//! RUN_DYNAMODB_INTEGRATION_TESTS=1 \
//! DYNAMODB_ENDPOINT=http://localhost:8000 \
//! DYNAMODB_TABLE=versakv-test \
//! AWS_REGION=us-east-1 AWS_ACCESS_KEY_ID=local AWS_SECRET_ACCESS_KEY=local \
//! cargo test -p versakv-storage-dynamodb --test real_dynamodb_integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::env;

use serde_json::{Value, json};
use uuid::Uuid;
use versakv_storage::{Database, Item, Key, Query, conformance};
use versakv_storage_dynamodb::{DynamoBackend, DynamoBackendConfig};

// ============================================================================
// Test Configuration
// ============================================================================

/// Check if real DynamoDB integration tests should run.
fn should_run() -> bool {
    env::var("RUN_DYNAMODB_INTEGRATION_TESTS").is_ok()
}

/// Routes SDK and backend logs to the test output; `RUST_LOG` filters them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a backend for the configured table.
async fn create_test_backend(page_size: usize) -> DynamoBackend {
    init_tracing();
    let config = DynamoBackendConfig::builder()
        .region(env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_owned()))
        .table(env::var("DYNAMODB_TABLE").unwrap_or_else(|_| "versakv-test".to_owned()))
        .maybe_endpoint(env::var("DYNAMODB_ENDPOINT").ok())
        .page_size(page_size)
        .build()
        .expect("valid config");
    DynamoBackend::new(config).await.expect("backend creation should succeed")
}

/// A partition no other test run has used.
fn unique_partition(label: &str) -> String {
    format!("{label}-{}", Uuid::now_v7().simple())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn real_dynamodb_health_check() {
    if !should_run() {
        eprintln!("Skipping real DynamoDB test (RUN_DYNAMODB_INTEGRATION_TESTS not set)");
        return;
    }

    let backend = create_test_backend(100).await;
    Database::new(backend).health_check().await.expect("table should be reachable");
}

#[tokio::test]
async fn real_dynamodb_create_only_then_cas() {
    if !should_run() {
        eprintln!("Skipping real DynamoDB test (RUN_DYNAMODB_INTEGRATION_TESTS not set)");
        return;
    }

    let db = Database::new(create_test_backend(100).await);
    let key = Key::new(unique_partition("cas"), "doc");

    db.set([Item::new(key.clone(), json!({"rev": 1})).create_only()]).await.expect("create");
    let again = db.set([Item::new(key.clone(), json!({"rev": 1})).create_only()]).await;
    assert!(again.unwrap_err().is_conflict());

    let current = db.get_one::<Value>(&key).await.unwrap().expect("item exists");
    db.set([current.clone().map(|_| json!({"rev": 2}))]).await.expect("cas write");
    let stale = db.set([current.map(|_| json!({"rev": 3}))]).await;
    assert!(stale.unwrap_err().is_conflict());
}

#[tokio::test]
async fn real_dynamodb_paginated_query() {
    if !should_run() {
        eprintln!("Skipping real DynamoDB test (RUN_DYNAMODB_INTEGRATION_TESTS not set)");
        return;
    }

    let db = Database::new(create_test_backend(4).await);
    let pk = unique_partition("page");
    let items: Vec<_> =
        (0..10).map(|i| Item::new(Key::new(pk.clone(), format!("{i:02}")), json!(i))).collect();
    db.set(items).await.expect("seed");

    let found: Vec<Item<Value>> = db.query(Query::new(pk.clone()).reverse()).await.unwrap();
    let sort_keys: Vec<_> = found.iter().map(|item| item.key.sk.clone()).collect();
    let expected: Vec<_> = (0..10).rev().map(|i| format!("{i:02}")).collect();
    assert_eq!(sort_keys, expected);
}

#[tokio::test]
async fn real_dynamodb_batch_conflict_writes_nothing() {
    if !should_run() {
        eprintln!("Skipping real DynamoDB test (RUN_DYNAMODB_INTEGRATION_TESTS not set)");
        return;
    }

    let db = Database::new(create_test_backend(100).await);
    conformance::batch_conflict_writes_nothing(&db).await;
}

#[tokio::test]
async fn real_dynamodb_merge_update() {
    if !should_run() {
        eprintln!("Skipping real DynamoDB test (RUN_DYNAMODB_INTEGRATION_TESTS not set)");
        return;
    }

    let db = Database::new(create_test_backend(100).await);
    let key = Key::new(unique_partition("merge"), "profile");
    db.set([Item::new(key.clone(), json!({"a": 1, "nested": {"x": 1}}))]).await.unwrap();
    db.update([Item::new(key.clone(), json!({"nested": {"y": 2}}))]).await.unwrap();

    let merged = db.get_one::<Value>(&key).await.unwrap().expect("item exists");
    assert_eq!(merged.data, json!({"a": 1, "nested": {"x": 1, "y": 2}}));
}
