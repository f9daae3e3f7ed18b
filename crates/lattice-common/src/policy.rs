//! Duplicate and null admission policy for index trees.

use crate::error::LatticeError;
use crate::types::TypeId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How an index treats null key components and repeated keys.
///
/// Chosen once per index; every level of a tree shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Nulls are stored; a repeated key is accepted but adds nothing.
    Ignore,
    /// Nulls are stored; a repeated key accumulates row ids.
    /// Used by non-unique and foreign-key indexes.
    Allow,
    /// Nulls and repeated keys are rejected. Used by primary and unique keys.
    #[default]
    Disallow,
}

impl DuplicatePolicy {
    /// Returns true if null key components are admitted.
    #[inline]
    pub fn admits_nulls(&self) -> bool {
        !matches!(self, DuplicatePolicy::Disallow)
    }

    /// Returns true if terminal branches hold sets of row ids.
    #[inline]
    pub fn allows_duplicates(&self) -> bool {
        matches!(self, DuplicatePolicy::Allow)
    }
}

impl FromStr for DuplicatePolicy {
    type Err = LatticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(DuplicatePolicy::Ignore),
            "allow" => Ok(DuplicatePolicy::Allow),
            "disallow" => Ok(DuplicatePolicy::Disallow),
            _ => Err(LatticeError::InvalidParameter {
                name: "policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DuplicatePolicy::Ignore => "ignore",
            DuplicatePolicy::Allow => "allow",
            DuplicatePolicy::Disallow => "disallow",
        };
        write!(f, "{}", name)
    }
}

/// Why an insert was refused. The tree is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A null component under `Disallow`.
    NullKey { column: usize },
    /// The key is already present under `Disallow`.
    DuplicateKey,
    KeyArity { expected: usize, actual: usize },
    TypeMismatch {
        column: usize,
        expected: TypeId,
        actual: TypeId,
    },
    /// A set of alternatives cannot be stored.
    SetValue { column: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NullKey { column } => write!(f, "null in column {}", column),
            Rejection::DuplicateKey => write!(f, "duplicate key"),
            Rejection::KeyArity { expected, actual } => {
                write!(f, "expected {} columns, got {}", expected, actual)
            }
            Rejection::TypeMismatch {
                column,
                expected,
                actual,
            } => write!(f, "column {} expects {}, got {}", column, expected, actual),
            Rejection::SetValue { column } => write!(f, "set value in column {}", column),
        }
    }
}

impl From<Rejection> for LatticeError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NullKey { .. } => LatticeError::NullNotAllowed,
            Rejection::DuplicateKey => LatticeError::DuplicateKey,
            Rejection::KeyArity { expected, actual } => LatticeError::KeyArity { expected, actual },
            Rejection::TypeMismatch {
                expected, actual, ..
            } => LatticeError::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            Rejection::SetValue { column } => {
                LatticeError::InvalidKey(format!("column {} holds a set of alternatives", column))
            }
        }
    }
}

/// Result of offering a (key, row) association to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; the count grew by one.
    Inserted,
    /// Accepted by the policy but already present. Nothing changed.
    Ignored,
    Rejected(Rejection),
}

impl InsertOutcome {
    #[inline]
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }

    /// True unless the policy refused the key.
    #[inline]
    pub fn is_admitted(&self) -> bool {
        !matches!(self, InsertOutcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            InsertOutcome::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}
