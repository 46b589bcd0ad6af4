// src/query.rs
//! Query language: payload parsing and document matching
//!
//! A query payload is a JSON object. Each key is either a field name or one
//! of `$and`/`$or`; several keys form an implicit AND.
//!
//! ```text
//! {"age": 25}                              field equality
//! {"age": {"$gt": 20, "$lt": 30}}          operators on one field (implicit AND)
//! {"$or": [{"age": 25}, {"city": "London"}]}
//! ```
//!
//! Parsing produces a `Condition` tree; matching a document against the
//! tree never fails.

pub mod operators;

use std::fmt;

use serde_json::{Map, Value};

use crate::document::{json_type_name, Document};
use crate::error::{Result, StoreError};
use operators::{lookup_operator, OperatorMatcher};

/// Parsed, evaluable form of a query payload
#[derive(Clone)]
pub enum Condition {
    /// `field <operator> operand`
    Field {
        field: String,
        operator: &'static dyn OperatorMatcher,
        operand: Value,
    },
    /// Every sub-condition matches (empty list matches everything)
    And(Vec<Condition>),
    /// At least one sub-condition matches (empty list matches nothing)
    Or(Vec<Condition>),
}

impl Condition {
    /// Leaf condition for a named operator
    pub fn field(field: impl Into<String>, operator: &str, operand: Value) -> Result<Condition> {
        let matcher = lookup_operator(operator).ok_or_else(|| {
            StoreError::MalformedPayload(format!("unknown operator: {}", operator))
        })?;
        matcher.validate(&operand)?;
        Ok(Condition::Field {
            field: field.into(),
            operator: matcher,
            operand,
        })
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Condition::Field {
                field,
                operator,
                operand,
            } => operator.matches(document.get(field), operand),
            Condition::And(conditions) => conditions.iter().all(|c| c.matches(document)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.matches(document)),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Result<Condition> {
        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            let condition = match key.as_str() {
                "$and" => Condition::And(Self::from_list(key, value)?),
                "$or" => Condition::Or(Self::from_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(StoreError::MalformedPayload(format!(
                        "unknown top-level operator: {}",
                        op
                    )))
                }
                field => Self::from_field(field, value)?,
            };
            conditions.push(condition);
        }
        Ok(Self::conjunction(conditions))
    }

    fn from_list(operator: &str, value: &Value) -> Result<Vec<Condition>> {
        let items = value.as_array().ok_or_else(|| {
            StoreError::MalformedPayload(format!(
                "{} requires a list of conditions, got {}",
                operator,
                json_type_name(value)
            ))
        })?;
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Self::from_object(map),
                other => Err(StoreError::MalformedPayload(format!(
                    "{} entries must be condition objects, got {}",
                    operator,
                    json_type_name(other)
                ))),
            })
            .collect()
    }

    fn from_field(field: &str, value: &Value) -> Result<Condition> {
        let ops = match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
            // Bare literal or plain nested document: equality
            _ => return Self::field(field, "$eq", value.clone()),
        };

        if let Some(plain) = ops.keys().find(|k| !k.starts_with('$')) {
            return Err(StoreError::MalformedPayload(format!(
                "field '{}' mixes operators with plain key '{}'",
                field, plain
            )));
        }

        let conditions = ops
            .iter()
            .map(|(op, operand)| Self::field(field, op, operand.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::conjunction(conditions))
    }

    fn conjunction(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::And(conditions)
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Field {
                field,
                operator,
                operand,
            } => f
                .debug_struct("Field")
                .field("field", field)
                .field("operator", &operator.name())
                .field("operand", operand)
                .finish(),
            Condition::And(list) => f.debug_tuple("And").field(list).finish(),
            Condition::Or(list) => f.debug_tuple("Or").field(list).finish(),
        }
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Condition::Field {
                    field: f1,
                    operator: o1,
                    operand: v1,
                },
                Condition::Field {
                    field: f2,
                    operator: o2,
                    operand: v2,
                },
            ) => f1 == f2 && o1.name() == o2.name() && v1 == v2,
            (Condition::And(a), Condition::And(b)) | (Condition::Or(a), Condition::Or(b)) => a == b,
            _ => false,
        }
    }
}

/// A parsed query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    root: Condition,
}

impl Query {
    /// The empty query, matching every document
    pub fn all() -> Self {
        Query {
            root: Condition::And(Vec::new()),
        }
    }

    /// Parse a query payload; `null` is treated like `{}`
    pub fn parse(payload: &Value) -> Result<Self> {
        match payload {
            Value::Null => Ok(Query::all()),
            Value::Object(map) => Ok(Query {
                root: Condition::from_object(map)?,
            }),
            other => Err(StoreError::MalformedPayload(format!(
                "query must be a JSON object, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// Parse query text; blank text is the empty query
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Query::all());
        }
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| StoreError::MalformedPayload(format!("invalid query JSON: {}", e)))?;
        Self::parse(&payload)
    }

    pub fn condition(&self) -> &Condition {
        &self.root
    }

    /// True for the match-everything query
    pub fn is_empty(&self) -> bool {
        matches!(&self.root, Condition::And(list) if list.is_empty())
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.root.matches(document)
    }
}

/// Parse `filter` and match it against `document` in one step
pub fn matches_filter(document: &Document, filter: &Value) -> Result<bool> {
    Ok(Query::parse(filter)?.matches(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn alice() -> Document {
        doc(json!({"name": "Alice", "age": 25, "city": "London", "address": {"zip": "N1"}}))
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert!(Query::parse(&json!({})).unwrap().matches(&alice()));
        assert!(Query::parse(&Value::Null).unwrap().is_empty());
        assert!(Query::from_json("  ").unwrap().matches(&doc(json!({}))));
    }

    #[test]
    fn test_bare_value_is_equality() {
        let query = Query::parse(&json!({"age": 25})).unwrap();
        assert_eq!(
            query.condition(),
            &Condition::field("age", "$eq", json!(25)).unwrap()
        );
        assert!(query.matches(&alice()));
        assert!(!Query::parse(&json!({"age": 26})).unwrap().matches(&alice()));
    }

    #[test]
    fn test_nested_document_equality() {
        let query = Query::parse(&json!({"address": {"zip": "N1"}})).unwrap();
        assert!(query.matches(&alice()));
        let query = Query::parse(&json!({"address": {}})).unwrap();
        assert!(!query.matches(&alice()));
        let dotted = Query::parse(&json!({"address.zip": "N1"})).unwrap();
        assert!(dotted.matches(&alice()));
    }

    #[test]
    fn test_comparison_operators() {
        let gt = Query::parse(&json!({"age": {"$gt": 20}})).unwrap();
        let lt = Query::parse(&json!({"age": {"$lt": 30}})).unwrap();
        assert!(gt.matches(&alice()));
        assert!(lt.matches(&alice()));

        let string_age = doc(json!({"age": "25"}));
        assert!(!gt.matches(&string_age));
        assert!(!lt.matches(&string_age));
    }

    #[test]
    fn test_multiple_operators_implicit_and() {
        let query = Query::parse(&json!({"age": {"$gt": 20, "$lt": 25}})).unwrap();
        assert!(matches!(query.condition(), Condition::And(list) if list.len() == 2));
        assert!(!query.matches(&alice()));
        let query = Query::parse(&json!({"age": 25, "city": "Paris"})).unwrap();
        assert!(!query.matches(&alice()));
    }

    #[test]
    fn test_or_composition() {
        let query = Query::parse(&json!({"$or": [{"age": 25}, {"city": "London"}]})).unwrap();
        assert!(query.matches(&alice()));
        assert!(query.matches(&doc(json!({"age": 25, "city": "Paris"}))));
        assert!(query.matches(&doc(json!({"city": "London"}))));
        assert!(!query.matches(&doc(json!({"age": 30, "city": "Paris"}))));
        assert!(!Query::parse(&json!({"$or": []})).unwrap().matches(&alice()));
    }

    #[test]
    fn test_and_composition() {
        let query = Query::parse(&json!({
            "$and": [{"name": {"$like": "A%"}}, {"city": {"$in": ["London", "Paris"]}}]
        }))
        .unwrap();
        assert!(query.matches(&alice()));
        assert!(!query.matches(&doc(json!({"name": "Bob", "city": "London"}))));
    }

    #[test]
    fn test_missing_field_is_non_match() {
        for payload in [
            json!({"email": "x"}),
            json!({"email": {"$gt": 1}}),
            json!({"email": {"$like": "%"}}),
            json!({"email": {"$in": [null]}}),
        ] {
            assert!(!Query::parse(&payload).unwrap().matches(&alice()), "{}", payload);
        }
    }

    #[test]
    fn test_malformed_payloads() {
        for payload in [
            json!([1, 2]),
            json!("age"),
            json!({"age": {"$regex": "A.*"}}),
            json!({"age": {"$gt": 1, "plain": 2}}),
            json!({"$nor": [{"age": 1}]}),
            json!({"$and": {"age": 1}}),
            json!({"$or": [1, 2]}),
            json!({"city": {"$in": "London"}}),
        ] {
            let err = Query::parse(&payload).unwrap_err();
            assert!(matches!(err, StoreError::MalformedPayload(_)), "{}", payload);
        }
        assert!(Query::from_json("{age: 1").is_err());
    }

    #[test]
    fn test_matches_filter() {
        assert!(matches_filter(&alice(), &json!({"name": {"$like": "_lice"}})).unwrap());
        assert!(matches_filter(&alice(), &json!(7)).is_err());
    }
}
