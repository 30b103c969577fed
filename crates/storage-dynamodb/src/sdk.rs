//! [`TableClient`] implementation on the AWS SDK.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client,
    config::{Region, timeout::TimeoutConfig},
    error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::transact_write_items::TransactWriteItemsError,
    types::{Delete, Get, Put, TransactGetItem, TransactWriteItem, Update},
};

use crate::{
    config::DynamoBackendConfig,
    error::{Result, TableError},
    expressions::{self, non_empty},
    keys::Attributes,
    table::{MAX_TRANSACTION_ITEMS, QueryPage, QueryRequest, TableClient, TableWrite},
};

/// A DynamoDB table reached through the AWS SDK.
#[derive(Clone)]
pub struct SdkTable {
    client: Client,
    table: String,
}

impl fmt::Debug for SdkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTable").field("table", &self.table).finish_non_exhaustive()
    }
}

impl SdkTable {
    /// Builds a client from the ambient AWS configuration (credentials chain,
    /// retry settings, HTTP client) with `config`'s overrides applied.
    pub async fn connect(config: &DynamoBackendConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
            .region(Region::new(config.region().to_owned()));

        if let Some(endpoint) = config.endpoint() {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout) = config.operation_timeout() {
            builder =
                builder.timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }

        tracing::debug!(
            table = config.table(),
            region = config.region(),
            endpoint = config.endpoint(),
            "created DynamoDB client"
        );
        Self::from_client(Client::from_conf(builder.build()), config.table())
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client, table: impl Into<String>) -> Self {
        Self { client, table: table.into() }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl TableClient for SdkTable {
    async fn transact_write(&self, writes: Vec<TableWrite>) -> Result<()> {
        if writes.len() > MAX_TRANSACTION_ITEMS {
            return Err(TableError::Validation(format!(
                "{} writes exceed the {MAX_TRANSACTION_ITEMS} item transaction limit",
                writes.len()
            )));
        }
        let items = writes
            .into_iter()
            .map(|write| transact_item(&self.table, write))
            .collect::<Result<Vec<_>>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(transact_write_error)?;
        Ok(())
    }

    async fn get_items(&self, keys: Vec<Attributes>) -> Result<Vec<Option<Attributes>>> {
        let mut found = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_TRANSACTION_ITEMS) {
            let gets = chunk
                .iter()
                .map(|key| {
                    let get = Get::builder()
                        .table_name(&self.table)
                        .set_key(Some(key.clone()))
                        .build()
                        .map_err(build_error)?;
                    Ok(TransactGetItem::builder().get(get).build())
                })
                .collect::<Result<Vec<_>>>()?;

            let output = self
                .client
                .transact_get_items()
                .set_transact_items(Some(gets))
                .send()
                .await
                .map_err(service_error)?;

            let responses = output.responses();
            if responses.len() != chunk.len() {
                return Err(TableError::Validation(format!(
                    "expected {} read responses, got {}",
                    chunk.len(),
                    responses.len()
                )));
            }
            found.extend(responses.iter().map(|response| response.item().cloned()));
        }
        Ok(found)
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        let condition = expressions::key_condition(&request.pk, &request.sk_prefix);
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression(condition.text)
            .set_expression_attribute_names(non_empty(condition.names))
            .set_expression_attribute_values(non_empty(condition.values))
            .consistent_read(true)
            .scan_index_forward(!request.reverse)
            .limit(request.limit)
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await
            .map_err(service_error)?;

        Ok(QueryPage {
            items: output.items().to_vec(),
            last_evaluated_key: output.last_evaluated_key().filter(|key| !key.is_empty()).cloned(),
        })
    }

    async fn describe(&self) -> Result<()> {
        self.client.describe_table().table_name(&self.table).send().await.map_err(service_error)?;
        Ok(())
    }
}

/// Translates one write into its transaction item.
fn transact_item(table: &str, write: TableWrite) -> Result<TransactWriteItem> {
    let item = match write {
        TableWrite::Put { item } => {
            let put = Put::builder()
                .table_name(table)
                .set_item(Some(item))
                .build()
                .map_err(build_error)?;
            TransactWriteItem::builder().put(put).build()
        },
        TableWrite::Create { item, now_ms } => {
            let condition = expressions::create_condition(now_ms);
            let put = Put::builder()
                .table_name(table)
                .set_item(Some(item))
                .condition_expression(condition.text)
                .set_expression_attribute_names(non_empty(condition.names))
                .set_expression_attribute_values(non_empty(condition.values))
                .build()
                .map_err(build_error)?;
            TransactWriteItem::builder().put(put).build()
        },
        TableWrite::Replace { item, expected_version, now_ms } => {
            let expression = expressions::replace(&item, &expected_version, now_ms)?;
            let (key, _) = expressions::split_key(item);
            let update = Update::builder()
                .table_name(table)
                .set_key(Some(key))
                .set_update_expression(expression.update)
                .condition_expression(expression.text)
                .set_expression_attribute_names(non_empty(expression.names))
                .set_expression_attribute_values(non_empty(expression.values))
                .build()
                .map_err(build_error)?;
            TransactWriteItem::builder().update(update).build()
        },
        TableWrite::Delete { key } => {
            let delete = Delete::builder()
                .table_name(table)
                .set_key(Some(key))
                .build()
                .map_err(build_error)?;
            TransactWriteItem::builder().delete(delete).build()
        },
    };
    Ok(item)
}

fn build_error(err: BuildError) -> TableError {
    TableError::Validation(err.to_string())
}

fn service_error<E, R>(err: SdkError<E, R>) -> TableError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let code = err.as_service_error().and_then(|service| service.code());
    if code == Some("ValidationException") {
        return TableError::Validation(message);
    }
    TableError::Service { message, source: Arc::new(err) }
}

fn transact_write_error<R>(err: SdkError<TransactWriteItemsError, R>) -> TableError
where
    R: fmt::Debug + Send + Sync + 'static,
{
    if let Some(TransactWriteItemsError::TransactionCanceledException(canceled)) =
        err.as_service_error()
    {
        let reasons = canceled
            .cancellation_reasons()
            .iter()
            .map(|reason| reason.code().map(str::to_owned))
            .collect();
        return TableError::TransactionCanceled { reasons };
    }
    service_error(err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use aws_sdk_dynamodb::{
        error::ErrorMetadata,
        types::{AttributeValue, CancellationReason, error::TransactionCanceledException},
    };
    use serde_json::json;
    use versakv_storage::{Item, Key, StorageError, VersionToken};

    use super::*;
    use crate::{
        attributes::{DATA, TTL, item_attributes},
        keys::{PK, SK, key_attributes},
    };

    const TABLE: &str = "items";

    fn canceled(codes: &[Option<&str>]) -> SdkError<TransactWriteItemsError, ()> {
        let reasons = codes
            .iter()
            .map(|code| CancellationReason::builder().set_code(code.map(str::to_owned)).build())
            .collect();
        let exception =
            TransactionCanceledException::builder().set_cancellation_reasons(Some(reasons)).build();
        SdkError::service_error(TransactWriteItemsError::TransactionCanceledException(exception), ())
    }

    fn stored_item() -> Attributes {
        let item = Item::new(Key::new("P", "s"), json!({"n": 1}));
        item_attributes(&item, &VersionToken::from("v2")).unwrap()
    }

    #[test]
    fn failed_condition_becomes_conflict() {
        let err = transact_write_error(canceled(&[None, Some("ConditionalCheckFailed")]));
        match &err {
            TableError::TransactionCanceled { reasons } => {
                assert_eq!(reasons, &[None, Some("ConditionalCheckFailed".to_owned())]);
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.into_storage_error("set").is_conflict());
    }

    #[test]
    fn transaction_conflict_becomes_conflict() {
        let err = transact_write_error(canceled(&[Some("TransactionConflict")]));
        assert!(err.into_storage_error("set").is_conflict());
    }

    #[test]
    fn throttled_cancellation_is_a_backend_error() {
        let err = transact_write_error(canceled(&[Some("ThrottlingError")]));
        let err = err.into_storage_error("set");
        assert!(!err.is_conflict());
        assert_eq!(err.operation(), Some("set"));
    }

    #[test]
    fn validation_exception_is_an_invalid_argument() {
        let meta = ErrorMetadata::builder()
            .code("ValidationException")
            .message("Transaction request cannot include multiple operations on one item")
            .build();
        let err: SdkError<TransactWriteItemsError, ()> =
            SdkError::service_error(TransactWriteItemsError::generic(meta), ());

        let err = transact_write_error(err);
        assert!(matches!(err, TableError::Validation(_)), "{err:?}");
        let err = err.into_storage_error("set");
        assert!(!err.is_conflict());
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    #[test]
    fn other_service_errors_keep_their_source() {
        let meta = ErrorMetadata::builder().code("InternalServerError").build();
        let err: SdkError<TransactWriteItemsError, ()> =
            SdkError::service_error(TransactWriteItemsError::generic(meta), ());

        let err = transact_write_error(err);
        assert!(matches!(err, TableError::Service { .. }), "{err:?}");
        let err = err.into_storage_error("delete");
        assert_eq!(err.operation(), Some("delete"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn blind_write_is_an_unconditional_put() {
        let item = transact_item(TABLE, TableWrite::Put { item: stored_item() }).unwrap();
        let put = item.put().expect("put");
        assert_eq!(put.table_name(), TABLE);
        assert!(put.condition_expression().is_none());
        assert!(put.item().contains_key(DATA));
    }

    #[test]
    fn create_is_a_conditional_put() {
        let write = TableWrite::Create { item: stored_item(), now_ms: 1_000 };
        let item = transact_item(TABLE, write).unwrap();

        let put = item.put().expect("put");
        assert_eq!(
            put.condition_expression(),
            Some("attribute_not_exists(#pk) OR #exp <= :now")
        );
        assert!(put.expression_attribute_names().is_some_and(|names| names.contains_key("#pk")));
        assert!(put.expression_attribute_values().is_some_and(|values| values.contains_key(":now")));
        assert!(item.update().is_none());
    }

    #[test]
    fn replace_is_a_conditional_update_on_the_key() {
        let write = TableWrite::Replace {
            item: stored_item(),
            expected_version: "v1".to_owned(),
            now_ms: 1_000,
        };
        let item = transact_item(TABLE, write).unwrap();
        assert!(item.put().is_none());

        let update = item.update().expect("update");
        assert_eq!(update.key().len(), 2);
        assert!(update.key().contains_key(PK) && update.key().contains_key(SK));
        assert_eq!(
            update.update_expression(),
            "SET #data = :data, #ver = :ver REMOVE #ttl, #exp"
        );
        assert!(update.condition_expression().is_some_and(|text| text.starts_with("#ver = :expected")));

        let names = update.expression_attribute_names().expect("names");
        assert_eq!(names.get("#ttl").map(String::as_str), Some(TTL));
        let values = update.expression_attribute_values().expect("values");
        assert_eq!(values.get(":expected"), Some(&AttributeValue::S("v1".to_owned())));
    }

    #[test]
    fn delete_targets_the_key() {
        let key = key_attributes(&Key::new("P", "s"));
        let item = transact_item(TABLE, TableWrite::Delete { key: key.clone() }).unwrap();

        let delete = item.delete().expect("delete");
        assert_eq!(delete.key(), &key);
        assert!(delete.condition_expression().is_none());
    }
}
