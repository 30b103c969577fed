//! Condition, update and key-condition expressions.
//!
//! Attribute names always go through `#` placeholders and values through `:`
//! placeholders, so user data never appears in expression text.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::{
    attributes::{DATA, EXPIRES_AT, TTL, VERSION},
    error::{Result, TableError},
    keys::{Attributes, PK, SK},
};

/// A rendered expression with its placeholder maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Expression {
    pub(crate) text: String,
    pub(crate) update: Option<String>,
    pub(crate) names: HashMap<String, String>,
    pub(crate) values: Attributes,
}

impl Expression {
    fn name(mut self, placeholder: &str, attribute: &str) -> Self {
        self.names.insert(placeholder.to_owned(), attribute.to_owned());
        self
    }

    fn value(mut self, placeholder: &str, value: AttributeValue) -> Self {
        self.values.insert(placeholder.to_owned(), value);
        self
    }
}

/// Returns `map` unless it is empty; DynamoDB rejects empty placeholder maps.
pub(crate) fn non_empty<K, V>(map: HashMap<K, V>) -> Option<HashMap<K, V>> {
    if map.is_empty() { None } else { Some(map) }
}

fn millis(now_ms: i64) -> AttributeValue {
    AttributeValue::N(now_ms.to_string())
}

/// Condition for a create-only put: no item, or only an expired one.
pub(crate) fn create_condition(now_ms: i64) -> Expression {
    Expression {
        text: "attribute_not_exists(#pk) OR #exp <= :now".to_owned(),
        ..Expression::default()
    }
    .name("#pk", PK)
    .name("#exp", EXPIRES_AT)
    .value(":now", millis(now_ms))
}

/// Update and condition for a token-conditioned write of `item`.
///
/// Replaces the payload, the token and the expiry; an item written without a
/// deadline has any previous one removed. The condition requires a live item
/// holding `expected_version`.
pub(crate) fn replace(item: &Attributes, expected_version: &str, now_ms: i64) -> Result<Expression> {
    let required = |name: &str| {
        item.get(name)
            .cloned()
            .ok_or_else(|| TableError::Validation(format!("write lacks `{name}` attribute")))
    };

    let mut expression = Expression {
        text: "#ver = :expected AND (attribute_not_exists(#exp) OR #exp > :now)".to_owned(),
        ..Expression::default()
    }
    .name("#data", DATA)
    .name("#ver", VERSION)
    .name("#ttl", TTL)
    .name("#exp", EXPIRES_AT)
    .value(":data", required(DATA)?)
    .value(":ver", required(VERSION)?)
    .value(":expected", AttributeValue::S(expected_version.to_owned()))
    .value(":now", millis(now_ms));

    let update = match (item.get(TTL), item.get(EXPIRES_AT)) {
        (Some(ttl), Some(expires_at)) => {
            expression = expression
                .value(":ttl", ttl.clone())
                .value(":exp", expires_at.clone());
            "SET #data = :data, #ver = :ver, #ttl = :ttl, #exp = :exp"
        },
        _ => "SET #data = :data, #ver = :ver REMOVE #ttl, #exp",
    };
    expression.update = Some(update.to_owned());
    Ok(expression)
}

/// Key condition selecting a partition and a stored sort-key prefix.
pub(crate) fn key_condition(pk: &str, stored_prefix: &str) -> Expression {
    Expression {
        text: "#pk = :pk AND begins_with(#sk, :prefix)".to_owned(),
        ..Expression::default()
    }
    .name("#pk", PK)
    .name("#sk", SK)
    .value(":pk", AttributeValue::S(pk.to_owned()))
    .value(":prefix", AttributeValue::S(stored_prefix.to_owned()))
}

/// Splits an item into its primary key and the remaining attributes.
pub(crate) fn split_key(mut item: Attributes) -> (Attributes, Attributes) {
    let mut key = HashMap::with_capacity(2);
    for name in [PK, SK] {
        if let Some((name, value)) = item.remove_entry(name) {
            key.insert(name, value);
        }
    }
    (key, item)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// Every placeholder used in the text must be defined, and vice versa.
    fn assert_placeholders_match(expression: &Expression) {
        let text = format!("{} {}", expression.text, expression.update.clone().unwrap_or_default());
        let used: Vec<&str> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '#' || c == ':' || c == '_'))
            .filter(|token| token.starts_with('#') || token.starts_with(':'))
            .collect();
        for token in &used {
            let defined = expression.names.contains_key(*token) || expression.values.contains_key(*token);
            assert!(defined, "`{token}` is used but not defined");
        }
        for placeholder in expression.names.keys().chain(expression.values.keys()) {
            assert!(used.contains(&placeholder.as_str()), "`{placeholder}` is defined but unused");
        }
    }

    fn stored(with_expiry: bool) -> Attributes {
        let mut item = HashMap::from([
            (PK.to_owned(), AttributeValue::S("P".into())),
            (SK.to_owned(), AttributeValue::S("#s".into())),
            (DATA.to_owned(), AttributeValue::S("{}".into())),
            (VERSION.to_owned(), AttributeValue::S("v2".into())),
        ]);
        if with_expiry {
            item.insert(TTL.to_owned(), AttributeValue::N("2".into()));
            item.insert(EXPIRES_AT.to_owned(), AttributeValue::N("1500".into()));
        }
        item
    }

    #[test]
    fn create_condition_admits_absent_or_expired() {
        let expression = create_condition(42);
        assert_eq!(expression.text, "attribute_not_exists(#pk) OR #exp <= :now");
        assert_eq!(expression.values[":now"], AttributeValue::N("42".into()));
        assert_eq!(expression.update, None);
        assert_placeholders_match(&expression);
    }

    #[test]
    fn replace_with_expiry_sets_both_deadline_attributes() {
        let expression = replace(&stored(true), "v1", 1000).unwrap();
        assert_eq!(
            expression.update.as_deref(),
            Some("SET #data = :data, #ver = :ver, #ttl = :ttl, #exp = :exp")
        );
        assert_eq!(expression.values[":expected"], AttributeValue::S("v1".into()));
        assert_eq!(expression.values[":ver"], AttributeValue::S("v2".into()));
        assert_placeholders_match(&expression);
    }

    #[test]
    fn replace_without_expiry_removes_deadline() {
        let expression = replace(&stored(false), "v1", 1000).unwrap();
        assert_eq!(
            expression.update.as_deref(),
            Some("SET #data = :data, #ver = :ver REMOVE #ttl, #exp")
        );
        assert!(!expression.values.contains_key(":ttl"));
        assert_placeholders_match(&expression);
    }

    #[test]
    fn replace_requires_payload() {
        let mut item = stored(false);
        item.remove(DATA);
        assert!(matches!(replace(&item, "v1", 0), Err(TableError::Validation(_))));
    }

    #[test]
    fn key_condition_uses_begins_with() {
        let expression = key_condition("THREAD", "#t1/");
        assert_eq!(expression.values[":prefix"], AttributeValue::S("#t1/".into()));
        assert_placeholders_match(&expression);
    }

    #[test]
    fn split_key_separates_primary_key() {
        let (key, rest) = split_key(stored(false));
        assert_eq!(key.len(), 2);
        assert!(key.contains_key(PK) && key.contains_key(SK));
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn empty_maps_are_omitted() {
        assert_eq!(non_empty(HashMap::<String, String>::new()), None);
        assert!(non_empty(HashMap::from([("#a".to_owned(), "a".to_owned())])).is_some());
    }
}
