// src/query_planner.rs
//! Index path selection
//!
//! Only a query made of one field clause can use an index: a bare literal
//! or a single `$eq`, `$gt`, `$lt` or `$in` on an indexed field. Anything
//! else is answered by a full scan.

use serde_json::Value;

use crate::document::DocumentId;
use crate::index::{IndexKey, OrderedIndex};
use crate::query::{Condition, Query};

/// Lookup to run against a single index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLookup {
    Exact(IndexKey),
    GreaterThan(IndexKey),
    LessThan(IndexKey),
    In(Vec<IndexKey>),
}

/// An index-backed execution plan for a query
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub field: String,
    pub lookup: IndexLookup,
}

impl IndexPlan {
    /// Candidate ids in ascending key order
    pub fn execute(&self, index: &OrderedIndex) -> Vec<DocumentId> {
        match &self.lookup {
            IndexLookup::Exact(key) => index.search(key),
            IndexLookup::GreaterThan(key) => index.search_greater_than(key),
            IndexLookup::LessThan(key) => index.search_less_than(key),
            IndexLookup::In(keys) => index.search_in(keys),
        }
    }
}

/// Pick an index plan, or `None` for a full scan
///
/// `has_index` tells whether a field is indexed. Operands the index cannot
/// represent (null, lists, nested documents, non-numeric range bounds) fall
/// back so both paths return the same documents.
pub fn plan_query<F>(query: &Query, has_index: F) -> Option<IndexPlan>
where
    F: Fn(&str) -> bool,
{
    let (field, operator, operand) = match query.condition() {
        Condition::Field {
            field,
            operator,
            operand,
        } => (field, operator.name(), operand),
        Condition::And(_) | Condition::Or(_) => return None,
    };
    if !has_index(field) {
        return None;
    }

    let lookup = match operator {
        "$eq" => IndexLookup::Exact(IndexKey::from_value(operand)?),
        "$gt" => IndexLookup::GreaterThan(numeric_key(operand)?),
        "$lt" => IndexLookup::LessThan(numeric_key(operand)?),
        "$in" => IndexLookup::In(
            operand
                .as_array()?
                .iter()
                .map(IndexKey::from_value)
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    };

    Some(IndexPlan {
        field: field.clone(),
        lookup,
    })
}

fn numeric_key(operand: &Value) -> Option<IndexKey> {
    match operand {
        Value::Number(_) => IndexKey::from_value(operand),
        _ => None,
    }
}
