//! Declarative display conditions.
//!
//! A condition is a JSON object mapping context fields to expected values:
//!
//! ```json
//! {"Gender": "F", "Age": {"$gte": 18, "$lt": 65}, "Smoker": {"$in": ["current", "former"]}}
//! ```
//!
//! A literal value means equality. An object whose keys all start with `$`
//! is a set of operator clauses on the same field. Clauses are ANDed in the
//! order they were written, stopping at the first false clause. A field missing from the
//! context makes the whole condition false.
//!
//! Evaluation never fails: `null`, an empty object or a blank string means
//! "always shown", and a malformed condition means "never shown" and is
//! logged.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::template::context::{lookup, value_to_text, RenderContext};

/// Errors raised while parsing a condition
#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("Condition must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("Condition string is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown operator {operator} for field {field}")]
    UnknownOperator { field: String, operator: String },

    #[error("Field {field} mixes operator and literal keys")]
    MixedOperatorObject { field: String },

    #[error("Operator {operator} for field {field} expects {expected}")]
    InvalidOperand {
        field: String,
        operator: String,
        expected: &'static str,
    },
}

/// Comparison applied by a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Operator {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            "$in" => Some(Operator::In),
            "$nin" => Some(Operator::Nin),
            _ => None,
        }
    }
}

/// A single `field <op> expected` test
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub operator: Operator,
    pub expected: Value,
}

impl Clause {
    fn matches(&self, context: &RenderContext) -> bool {
        let Some(actual) = lookup(context, &self.field) else {
            return false;
        };

        match self.operator {
            Operator::Eq => values_equal(actual, &self.expected),
            Operator::Ne => !values_equal(actual, &self.expected),
            Operator::Gt => compare(actual, &self.expected).is_some_and(|o| o.is_gt()),
            Operator::Gte => compare(actual, &self.expected).is_some_and(|o| o.is_ge()),
            Operator::Lt => compare(actual, &self.expected).is_some_and(|o| o.is_lt()),
            Operator::Lte => compare(actual, &self.expected).is_some_and(|o| o.is_le()),
            Operator::In => self.candidates().any(|c| values_equal(actual, c)),
            Operator::Nin => !self.candidates().any(|c| values_equal(actual, c)),
        }
    }

    fn candidates(&self) -> impl Iterator<Item = &Value> {
        self.expected.as_array().into_iter().flatten()
    }
}

/// A parsed condition: the conjunction of its clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// Parse a raw condition value.
    ///
    /// A JSON string is accepted and parsed as JSON, so conditions stored as
    /// text behave the same as structured ones.
    pub fn parse(raw: &Value) -> Result<Self, ConditionError> {
        match raw {
            Value::Null => Ok(Self::default()),
            Value::String(text) if text.trim().is_empty() => Ok(Self::default()),
            Value::String(text) => {
                let parsed: Value = serde_json::from_str(text)
                    .map_err(|e| ConditionError::InvalidJson(e.to_string()))?;
                match parsed {
                    Value::String(_) => Err(ConditionError::NotAnObject("string".to_string())),
                    other => Self::parse(&other),
                }
            }
            Value::Object(map) => {
                let mut clauses = Vec::with_capacity(map.len());
                for (field, expected) in map {
                    push_clauses(&mut clauses, field, expected)?;
                }
                Ok(Self { clauses })
            }
            other => Err(ConditionError::NotAnObject(json_kind(other).to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluate against a context, short-circuiting on the first false clause
    pub fn matches(&self, context: &RenderContext) -> bool {
        self.clauses.iter().all(|clause| clause.matches(context))
    }
}

fn push_clauses(
    clauses: &mut Vec<Clause>,
    field: &str,
    expected: &Value,
) -> Result<(), ConditionError> {
    let operators = match expected {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        _ => {
            clauses.push(Clause {
                field: field.to_string(),
                operator: Operator::Eq,
                expected: expected.clone(),
            });
            return Ok(());
        }
    };

    if !operators.keys().all(|k| k.starts_with('$')) {
        return Err(ConditionError::MixedOperatorObject {
            field: field.to_string(),
        });
    }

    for (key, operand) in operators {
        let operator = Operator::parse(key).ok_or_else(|| ConditionError::UnknownOperator {
            field: field.to_string(),
            operator: key.clone(),
        })?;

        if matches!(operator, Operator::In | Operator::Nin) && !operand.is_array() {
            return Err(ConditionError::InvalidOperand {
                field: field.to_string(),
                operator: key.clone(),
                expected: "an array",
            });
        }

        clauses.push(Clause {
            field: field.to_string(),
            operator,
            expected: operand.clone(),
        });
    }

    Ok(())
}

/// Evaluate an optional raw condition against a context.
///
/// Absent or empty conditions are true; malformed ones are false.
pub fn evaluate(template_id: Uuid, condition: Option<&Value>, context: &RenderContext) -> bool {
    let Some(raw) = condition else {
        return true;
    };

    match Condition::parse(raw) {
        Ok(parsed) => parsed.matches(context),
        Err(e) => {
            tracing::warn!(
                template_id = %template_id,
                error = %e,
                "Malformed display condition evaluated as false"
            );
            false
        }
    }
}

/// JSON equality, with scalars also matching on their rendered text
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    is_scalar(actual) && is_scalar(expected) && value_to_text(actual) == value_to_text(expected)
}

/// Numeric comparison when both sides are numbers (or numeric strings),
/// otherwise lexical comparison of two strings
fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
