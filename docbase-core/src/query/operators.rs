// src/query/operators.rs
//! Query operator trait definitions and implementations
//!
//! Each field operator is a separate type implementing `OperatorMatcher`.
//! The logical operators `$and`/`$or` are not matchers; they are nodes of
//! the condition tree in `query.rs`.
//!
//! ```text
//! OperatorMatcher trait
//!     ↓
//! ┌──────────────────────┬──────────────┬──────────────┐
//! │ Comparison           │ Pattern      │ Membership   │
//! │ ($eq, $gt, $lt)      │ ($like)      │ ($in)        │
//! └──────────────────────┴──────────────┴──────────────┘
//! ```

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde_json::Value;

use crate::document::json_type_name;
use crate::error::{Result, StoreError};
use crate::value_utils::{as_number, values_equal};

// ============================================================================
// TRAIT DEFINITION
// ============================================================================

/// Trait for all field operators
///
/// Matching never fails: a missing field or an operand of the wrong type is
/// a non-match. Operand shape errors are caught once, at parse time, by
/// `validate`.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use docbase_core::query::operators::{GtOperator, OperatorMatcher};
///
/// assert!(GtOperator.matches(Some(&json!(25)), &json!(20)));
/// assert!(!GtOperator.matches(Some(&json!("25")), &json!(20)));
/// ```
pub trait OperatorMatcher: Send + Sync {
    /// Returns the operator name (e.g., "$eq", "$gt")
    fn name(&self) -> &'static str;

    /// Checks a document value (None if the field is absent) against the operand
    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool;

    /// Rejects operands that can never be meaningful for this operator
    fn validate(&self, _operand: &Value) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// $eq operator: deep structural equality
///
/// ```json
/// { field: { $eq: value } }
/// // Shorthand: { field: value }
/// ```
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        doc_value.map_or(false, |v| values_equal(v, operand))
    }
}

/// $gt operator: numeric greater-than
pub struct GtOperator;

impl OperatorMatcher for GtOperator {
    fn name(&self) -> &'static str {
        "$gt"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numbers(doc_value, operand).map_or(false, |(a, b)| a > b)
    }
}

/// $lt operator: numeric less-than
pub struct LtOperator;

impl OperatorMatcher for LtOperator {
    fn name(&self) -> &'static str {
        "$lt"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        compare_numbers(doc_value, operand).map_or(false, |(a, b)| a < b)
    }
}

fn compare_numbers(doc_value: Option<&Value>, operand: &Value) -> Option<(f64, f64)> {
    Some((as_number(doc_value?)?, as_number(operand)?))
}

// ============================================================================
// PATTERN OPERATORS
// ============================================================================

/// $like operator: whole-string wildcard match, `%` any run, `_` one character
pub struct LikeOperator;

impl OperatorMatcher for LikeOperator {
    fn name(&self) -> &'static str {
        "$like"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        match (doc_value, operand) {
            (Some(Value::String(text)), Value::String(pattern)) => like_match(text, pattern),
            _ => false,
        }
    }
}

/// Wildcard match over characters
///
/// Greedy two-pointer scan: on a mismatch after a `%`, the `%` absorbs one
/// more character and matching resumes. Runs in O(text * pattern) worst case.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // (pattern position after the last '%', text position it currently absorbs up to)
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            p += 1;
            backtrack = Some((p, t));
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if let Some((resume_p, absorbed)) = backtrack {
            p = resume_p;
            t = absorbed + 1;
            backtrack = Some((resume_p, t));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

// ============================================================================
// MEMBERSHIP OPERATORS
// ============================================================================

/// $in operator: field deep-equals at least one list element
pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        match (doc_value, operand) {
            (Some(v), Value::Array(candidates)) => candidates.iter().any(|c| values_equal(v, c)),
            _ => false,
        }
    }

    fn validate(&self, operand: &Value) -> Result<()> {
        if operand.is_array() {
            Ok(())
        } else {
            Err(StoreError::MalformedPayload(format!(
                "$in requires a list, got {}",
                json_type_name(operand)
            )))
        }
    }
}

// ============================================================================
// OPERATOR REGISTRY
// ============================================================================

lazy_static! {
    /// Field operators by name
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let mut registry: HashMap<&'static str, Box<dyn OperatorMatcher>> = HashMap::new();

        registry.insert("$eq", Box::new(EqOperator));
        registry.insert("$gt", Box::new(GtOperator));
        registry.insert("$lt", Box::new(LtOperator));
        registry.insert("$like", Box::new(LikeOperator));
        registry.insert("$in", Box::new(InOperator));

        registry
    };
}

/// Look up a field operator by name
pub fn lookup_operator(name: &str) -> Option<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY.get(name).map(|op| op.as_ref())
}
