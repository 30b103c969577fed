//! The table-client seam.
//!
//! [`DynamoBackend`](crate::DynamoBackend) speaks to DynamoDB only through
//! [`TableClient`], which names the four calls the backend needs in terms of
//! attribute maps. [`SdkTable`](crate::SdkTable) implements it with the AWS
//! SDK; tests substitute an in-memory table.

use async_trait::async_trait;

use crate::{
    error::Result,
    keys::{Attributes, PK, SK},
};

/// Most items DynamoDB accepts in one transaction.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// One item of a write transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TableWrite {
    /// Unconditional put of a full item.
    Put {
        /// Full item, key included.
        item: Attributes,
    },

    /// Put that succeeds only if no live item exists at `now_ms`.
    Create {
        /// Full item, key included.
        item: Attributes,
        /// Current time in epoch milliseconds.
        now_ms: i64,
    },

    /// Replaces a live item whose token is `expected_version`.
    Replace {
        /// Full item, key included.
        item: Attributes,
        /// Token the stored item must hold.
        expected_version: String,
        /// Current time in epoch milliseconds.
        now_ms: i64,
    },

    /// Unconditional delete.
    Delete {
        /// Primary key attributes.
        key: Attributes,
    },
}

impl TableWrite {
    /// The `(pk, stored sk)` pair this write targets, if its key is well formed.
    #[must_use]
    pub fn target(&self) -> Option<(&str, &str)> {
        let attributes = match self {
            Self::Put { item } | Self::Create { item, .. } | Self::Replace { item, .. } => item,
            Self::Delete { key } => key,
        };
        let pk = attributes.get(PK)?.as_s().ok()?;
        let sk = attributes.get(SK)?.as_s().ok()?;
        Some((pk.as_str(), sk.as_str()))
    }
}

/// One page of a partition query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Partition to read.
    pub pk: String,
    /// Stored (marker-prefixed) sort-key prefix.
    pub sk_prefix: String,
    /// Descending order when `true`.
    pub reverse: bool,
    /// Most items to evaluate.
    pub limit: i32,
    /// Key to resume after.
    pub exclusive_start_key: Option<Attributes>,
}

/// Result of one [`TableClient::query`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Items in key order.
    pub items: Vec<Attributes>,
    /// Present when the table stopped at `limit`; resume from here.
    pub last_evaluated_key: Option<Attributes>,
}

/// The calls [`DynamoBackend`](crate::DynamoBackend) makes against a table.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Applies `writes` as one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::TransactionCanceled`](crate::TableError::TransactionCanceled)
    /// with per-item reasons when a condition fails; nothing is applied.
    async fn transact_write(&self, writes: Vec<TableWrite>) -> Result<()>;

    /// Reads `keys` with strong consistency, returning one slot per key in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any read fails.
    async fn get_items(&self, keys: Vec<Attributes>) -> Result<Vec<Option<Attributes>>>;

    /// Runs one strongly consistent query page.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn query(&self, request: QueryRequest) -> Result<QueryPage>;

    /// Verifies the table exists and is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not.
    async fn describe(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use aws_sdk_dynamodb::types::AttributeValue;

    use super::*;

    #[test]
    fn target_reads_key_attributes() {
        let key = HashMap::from([
            (PK.to_owned(), AttributeValue::S("P".into())),
            (SK.to_owned(), AttributeValue::S("#s".into())),
        ]);
        assert_eq!(TableWrite::Delete { key }.target(), Some(("P", "#s")));
        assert_eq!(TableWrite::Put { item: HashMap::new() }.target(), None);
    }
}
