//! Columnar attribute storage.
//!
//! One `BTreeMap<VectorId, AttrValue>` per declared column. Values are
//! validated against the declared type when a row is set; the only accepted
//! widening is an integer value into a float column. Predicate evaluation
//! scans the referenced columns and intersects the matching id sets.

use std::collections::{BTreeMap, BTreeSet};

use cairn_core::{AttrValue, ColumnType, Error, Predicate, Result, VectorId};

/// A single declared column
struct Column {
    ty: ColumnType,
    values: BTreeMap<VectorId, AttrValue>,
}

/// Columnar store over the declared attribute schema
pub struct AttributeStore {
    /// Declared columns by name
    columns: BTreeMap<String, Column>,
    /// Every row id ever set and not removed; the universe for empty
    /// predicates and rows with no attribute values
    rows: BTreeSet<VectorId>,
}

impl AttributeStore {
    /// Create a store for the declared schema
    pub fn new(schema: &[(String, ColumnType)]) -> Self {
        AttributeStore {
            columns: schema
                .iter()
                .map(|(name, ty)| {
                    (
                        name.clone(),
                        Column {
                            ty: *ty,
                            values: BTreeMap::new(),
                        },
                    )
                })
                .collect(),
            rows: BTreeSet::new(),
        }
    }

    /// Validate a full attribute map against the schema without mutating.
    ///
    /// Rejects undeclared columns and type-mismatched values; an integer
    /// value is accepted for a float column.
    pub fn validate(&self, attributes: &BTreeMap<String, AttrValue>) -> Result<()> {
        for (name, value) in attributes {
            let column = self
                .columns
                .get(name)
                .ok_or_else(|| Error::UndeclaredColumn {
                    column: name.clone(),
                })?;
            let ok = match (column.ty, value) {
                (ColumnType::Int, AttrValue::Int(_)) => true,
                (ColumnType::Float, AttrValue::Float(_)) => true,
                (ColumnType::Float, AttrValue::Int(_)) => true,
                (ColumnType::Str, AttrValue::Str(_)) => true,
                _ => false,
            };
            if !ok {
                return Err(Error::TypeMismatch {
                    column: name.clone(),
                    expected: column.ty,
                    got: value.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Set the full attribute row for an id, replacing any previous row.
    ///
    /// The caller is expected to have run [`AttributeStore::validate`]
    /// first; this method re-checks and fails without partial writes.
    pub fn set(&mut self, id: VectorId, attributes: &BTreeMap<String, AttrValue>) -> Result<()> {
        self.validate(attributes)?;

        for column in self.columns.values_mut() {
            column.values.remove(&id);
        }
        for (name, value) in attributes {
            // Every name was checked by validate() above
            if let Some(column) = self.columns.get_mut(name) {
                let stored = match (column.ty, value) {
                    // Widen int into a declared float column
                    (ColumnType::Float, AttrValue::Int(i)) => AttrValue::Float(*i as f64),
                    _ => value.clone(),
                };
                column.values.insert(id, stored);
            }
        }
        self.rows.insert(id);
        Ok(())
    }

    /// Get the attribute row for an id
    pub fn get(&self, id: VectorId) -> BTreeMap<String, AttrValue> {
        let mut row = BTreeMap::new();
        for (name, column) in &self.columns {
            if let Some(value) = column.values.get(&id) {
                row.insert(name.clone(), value.clone());
            }
        }
        row
    }

    /// Remove an id from every column
    pub fn remove(&mut self, id: VectorId) {
        for column in self.columns.values_mut() {
            column.values.remove(&id);
        }
        self.rows.remove(&id);
    }

    /// Drop all rows, keeping the schema
    pub fn clear(&mut self) {
        for column in self.columns.values_mut() {
            column.values.clear();
        }
        self.rows.clear();
    }

    /// Evaluate a predicate, returning the set of matching row ids.
    ///
    /// The empty predicate matches every row. Conditions on undeclared
    /// columns are rejected.
    pub fn evaluate(&self, predicate: &Predicate) -> Result<BTreeSet<VectorId>> {
        if predicate.is_empty() {
            return Ok(self.rows.clone());
        }

        let mut result: Option<BTreeSet<VectorId>> = None;
        for condition in predicate.conditions() {
            let column =
                self.columns
                    .get(&condition.column)
                    .ok_or_else(|| Error::UndeclaredColumn {
                        column: condition.column.clone(),
                    })?;
            condition.check_column_type(column.ty)?;

            let matching: BTreeSet<VectorId> = column
                .values
                .iter()
                .filter(|(_, value)| condition.matches_value(value))
                .map(|(&id, _)| id)
                .collect();

            result = Some(match result {
                None => matching,
                Some(prev) => prev.intersection(&matching).copied().collect(),
            });

            if result.as_ref().is_some_and(|r| r.is_empty()) {
                break;
            }
        }

        Ok(result.unwrap_or_default())
    }
}
