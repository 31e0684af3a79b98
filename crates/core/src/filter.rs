//! Attribute filter predicates.
//!
//! A predicate is a conjunction of per-column comparison conditions. The JSON
//! form mirrors the query syntax callers use:
//!
//! ```text
//! {"price": {"$gte": 30}}             one condition
//! {"price": {"$gte": 30, "$lt": 40}}  two conditions on one column (AND)
//! {"category": "book", "year": 2024}  bare scalars are shorthand for $eq
//! ```
//!
//! Conditions referencing undeclared columns are rejected when the predicate
//! is validated against the schema, never silently matched as empty.

use crate::config::{ColumnType, EngineConfig};
use crate::error::{Error, Result};
use crate::types::AttrValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operator for a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// `$eq`
    Eq,
    /// `$neq`
    Neq,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl FilterOp {
    /// Parse the `$`-prefixed operator token
    pub fn from_token(token: &str) -> Option<FilterOp> {
        match token {
            "$eq" => Some(FilterOp::Eq),
            "$neq" => Some(FilterOp::Neq),
            "$gt" => Some(FilterOp::Gt),
            "$gte" => Some(FilterOp::Gte),
            "$lt" => Some(FilterOp::Lt),
            "$lte" => Some(FilterOp::Lte),
            _ => None,
        }
    }

    /// The `$`-prefixed operator token
    pub fn token(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Neq => "$neq",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
        }
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Neq => ord != Ordering::Equal,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Gte => ord != Ordering::Less,
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// Compare two attribute values.
///
/// Numeric values cross-compare (int vs float via f64); strings compare
/// lexicographically. Mismatched kinds are incomparable and yield `None`.
pub fn compare_values(a: &AttrValue, b: &AttrValue) -> Option<Ordering> {
    match (a, b) {
        (AttrValue::Int(x), AttrValue::Int(y)) => Some(x.cmp(y)),
        (AttrValue::Str(x), AttrValue::Str(y)) => Some(x.cmp(y)),
        (AttrValue::Int(x), AttrValue::Float(y)) => (*x as f64).partial_cmp(y),
        (AttrValue::Float(x), AttrValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        (AttrValue::Float(x), AttrValue::Float(y)) => x.partial_cmp(y),
        _ => None,
    }
}

/// A single comparison condition on a declared column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column name
    pub column: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Literal to compare against
    pub value: AttrValue,
}

impl Condition {
    /// Whether a stored value satisfies this condition
    pub fn matches_value(&self, stored: &AttrValue) -> bool {
        match compare_values(stored, &self.value) {
            Some(ord) => self.op.holds(ord),
            // Incomparable kinds cannot satisfy any condition; validation
            // against the schema rejects these before evaluation.
            None => false,
        }
    }

    /// Check the literal is comparable with the column's declared type
    pub fn check_column_type(&self, ty: ColumnType) -> Result<()> {
        let compatible = match ty {
            ColumnType::Int | ColumnType::Float => {
                matches!(self.value, AttrValue::Int(_) | AttrValue::Float(_))
            }
            ColumnType::Str => matches!(self.value, AttrValue::Str(_)),
        };
        if compatible {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                column: self.column.clone(),
                expected: ty,
                got: self.value.type_name(),
            })
        }
    }
}

/// A conjunction of comparison conditions over declared attribute columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// The empty predicate (matches everything)
    pub fn new() -> Self {
        Predicate::default()
    }

    /// Add a condition (builder style)
    pub fn with(
        mut self,
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<AttrValue>,
    ) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add an equality condition (builder style)
    pub fn eq(self, column: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.with(column, FilterOp::Eq, value)
    }

    /// The conditions, in insertion order
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True if there are no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Parse the JSON query form (see module docs)
    pub fn from_json(value: &serde_json::Value) -> Result<Predicate> {
        let obj = value.as_object().ok_or_else(|| {
            Error::InvalidPredicate("predicate must be a JSON object".to_string())
        })?;

        let mut predicate = Predicate::new();
        for (column, rhs) in obj {
            match rhs {
                serde_json::Value::Object(ops) => {
                    if ops.is_empty() {
                        return Err(Error::InvalidPredicate(format!(
                            "no operators given for column {column:?}"
                        )));
                    }
                    for (token, literal) in ops {
                        let op = FilterOp::from_token(token).ok_or_else(|| {
                            Error::InvalidPredicate(format!("unknown operator {token:?}"))
                        })?;
                        let value = AttrValue::from_json(literal).ok_or_else(|| {
                            Error::InvalidPredicate(format!(
                                "literal for column {column:?} must be a number or string"
                            ))
                        })?;
                        predicate.conditions.push(Condition {
                            column: column.clone(),
                            op,
                            value,
                        });
                    }
                }
                // Bare scalar is shorthand for $eq
                scalar => {
                    let value = AttrValue::from_json(scalar).ok_or_else(|| {
                        Error::InvalidPredicate(format!(
                            "literal for column {column:?} must be a number or string"
                        ))
                    })?;
                    predicate.conditions.push(Condition {
                        column: column.clone(),
                        op: FilterOp::Eq,
                        value,
                    });
                }
            }
        }
        Ok(predicate)
    }

    /// Validate every condition against the declared schema.
    ///
    /// Rejects undeclared columns and type-incompatible literals.
    pub fn check_schema(&self, config: &EngineConfig) -> Result<()> {
        for condition in &self.conditions {
            let ty = config
                .column_type(&condition.column)
                .ok_or_else(|| Error::UndeclaredColumn {
                    column: condition.column.clone(),
                })?;
            condition.check_column_type(ty)?;
        }
        Ok(())
    }

    /// Whether a full attribute row satisfies every condition.
    ///
    /// A row missing a referenced column does not match.
    pub fn matches(&self, attributes: &BTreeMap<String, AttrValue>) -> bool {
        self.conditions.iter().all(|condition| {
            attributes
                .get(&condition.column)
                .is_some_and(|stored| condition.matches_value(stored))
        })
    }
}
