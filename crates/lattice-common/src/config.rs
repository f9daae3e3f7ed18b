//! Configuration structures for Lattice indexes.

use crate::error::{LatticeError, Result};
use crate::policy::DuplicatePolicy;
use crate::types::TypeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placement of null keys relative to non-null keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullOrder {
    /// Nulls sort before every other value.
    #[default]
    First,
    /// Nulls sort after every other value.
    Last,
}

/// Iteration order of a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Configuration of one key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Column name (unique within the index).
    pub name: String,
    /// Kind of value held by the column.
    pub type_id: TypeId,
    /// Null placement.
    #[serde(default)]
    pub nulls: NullOrder,
    /// Iteration order.
    #[serde(default)]
    pub direction: SortDirection,
}

impl ColumnConfig {
    /// Creates an ascending, nulls-first column.
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            nulls: NullOrder::default(),
            direction: SortDirection::default(),
        }
    }
}

/// Index configuration: the key columns and the admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index name, used in log output.
    pub name: String,
    /// Duplicate and null admission policy.
    #[serde(default)]
    pub policy: DuplicatePolicy,
    /// Key columns in key order.
    pub columns: Vec<ColumnConfig>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "index".to_string(),
            policy: DuplicatePolicy::Disallow,
            columns: Vec::new(),
        }
    }
}

impl IndexConfig {
    /// Parses and validates a JSON index description.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the number of key columns.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Checks that the index has at least one column and no repeated names.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(LatticeError::ConfigError(format!(
                "index {} has no key columns",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(LatticeError::InvalidParameter {
                    name: "columns".to_string(),
                    value: column.name.clone(),
                });
            }
            if column.type_id == TypeId::Set || column.type_id == TypeId::Null {
                return Err(LatticeError::UnsupportedType(column.type_id.to_string()));
            }
        }
        Ok(())
    }
}
