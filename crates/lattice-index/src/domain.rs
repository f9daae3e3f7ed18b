//! Column domains: per-column ordering, admission and key generation.

use crate::ordmap::KeyOrder;
use bytes::{BufMut, BytesMut};
use lattice_common::{
    ColumnConfig, IndexConfig, LatticeError, NullOrder, Result, SortDirection, TypeId, Value,
};
use std::cmp::Ordering;

/// Ordering and typing rules of one key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDomain {
    pub type_id: TypeId,
    pub nulls: NullOrder,
    pub direction: SortDirection,
}

impl ColumnDomain {
    /// Ascending, nulls-first column of the given type.
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            nulls: NullOrder::First,
            direction: SortDirection::Ascending,
        }
    }

    pub fn with_nulls(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }

    /// Compares two keys in iteration order.
    ///
    /// Nulls sit at the configured end regardless of direction. Non-null
    /// values are reversed for descending columns.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.nulls {
                NullOrder::First => Ordering::Less,
                NullOrder::Last => Ordering::Greater,
            },
            (false, true) => match self.nulls {
                NullOrder::First => Ordering::Greater,
                NullOrder::Last => Ordering::Less,
            },
            (false, false) => {
                let ord = a.total_cmp(b);
                match self.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
        }
    }

    /// Returns true if `value` may be stored in this column.
    ///
    /// Null is always admitted here; the duplicate policy decides nulls.
    pub fn admits(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Set(_) => false,
            Value::Int(_) => matches!(self.type_id, TypeId::Int64 | TypeId::Float64),
            other => other.type_id() == self.type_id,
        }
    }

    /// First generated key for an empty column.
    pub fn seed(&self) -> Result<Value> {
        match self.type_id {
            TypeId::Boolean => Ok(Value::Boolean(false)),
            TypeId::Int64 => Ok(Value::Int(1)),
            TypeId::Float64 => Ok(Value::Float(1.0)),
            TypeId::Text => Ok(Value::Text("1".to_string())),
            TypeId::Binary => Ok(Value::Binary(bytes::Bytes::from_static(&[1]))),
            TypeId::Date => Ok(Value::Date(1)),
            TypeId::Timestamp => Ok(Value::Timestamp(1)),
            other => Err(LatticeError::UnsupportedType(other.to_string())),
        }
    }

    /// Returns a value strictly greater than `value` in natural order.
    pub fn successor(&self, value: &Value) -> Result<Value> {
        let exhausted = || LatticeError::KeyExhausted(format!("{} after {}", self.type_id, value));
        match value {
            Value::Boolean(false) => Ok(Value::Boolean(true)),
            Value::Boolean(true) => Err(exhausted()),
            Value::Int(n) if self.type_id == TypeId::Float64 => {
                successor_float(*n as f64, value).ok_or_else(exhausted)
            }
            Value::Int(n) => n.checked_add(1).map(Value::Int).ok_or_else(exhausted),
            Value::Float(f) => successor_float(*f, value).ok_or_else(exhausted),
            Value::Text(s) => Ok(Value::Text(successor_text(s))),
            Value::Binary(b) => {
                let mut next = BytesMut::with_capacity(b.len() + 1);
                next.put_slice(b);
                next.put_u8(0);
                Ok(Value::Binary(next.freeze()))
            }
            Value::Date(d) => d.checked_add(1).map(Value::Date).ok_or_else(exhausted),
            Value::Timestamp(t) => t.checked_add(1).map(Value::Timestamp).ok_or_else(exhausted),
            other => Err(LatticeError::UnsupportedType(other.type_id().to_string())),
        }
    }
}

fn successor_float(f: f64, current: &Value) -> Option<Value> {
    let next = f.floor() + 1.0;
    if !next.is_finite() {
        return None;
    }
    // Beyond 2^53 adding one no longer changes the value
    let next = Value::Float(next);
    (next.total_cmp(current) == Ordering::Greater).then_some(next)
}

/// Decimal strings count up at the same width ("19" -> "20") and grow
/// by a digit on carry-out ("99" -> "990"). Any other string gets a "1"
/// appended. Both results sort strictly after the input.
fn successor_text(s: &str) -> String {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{s}1");
    }
    let mut digits = s.as_bytes().to_vec();
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return String::from_utf8_lossy(&digits).into_owned();
        }
    }
    format!("{s}0")
}

impl KeyOrder<Value> for ColumnDomain {
    #[inline]
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        ColumnDomain::compare(self, a, b)
    }
}

impl From<&ColumnConfig> for ColumnDomain {
    fn from(config: &ColumnConfig) -> Self {
        Self {
            type_id: config.type_id,
            nulls: config.nulls,
            direction: config.direction,
        }
    }
}

/// The ordered list of key columns of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<ColumnDomain>,
    names: Vec<Option<String>>,
}

impl ColumnSchema {
    /// Creates an unnamed schema. At least one column is required.
    pub fn new(columns: Vec<ColumnDomain>) -> Result<Self> {
        if columns.is_empty() {
            return Err(LatticeError::ConfigError(
                "an index needs at least one key column".to_string(),
            ));
        }
        let names = vec![None; columns.len()];
        Ok(Self { columns, names })
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            columns: config.columns.iter().map(ColumnDomain::from).collect(),
            names: config.columns.iter().map(|c| Some(c.name.clone())).collect(),
        })
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Domain of the column at `level`. Panics if out of range.
    #[inline]
    pub fn column(&self, level: usize) -> ColumnDomain {
        self.columns[level]
    }

    pub fn columns(&self) -> &[ColumnDomain] {
        &self.columns
    }

    pub fn column_name(&self, level: usize) -> Option<&str> {
        self.names.get(level).and_then(|n| n.as_deref())
    }

    /// Compares two full keys column by column in iteration order.
    pub fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((x, y), domain) in a.iter().zip(b.iter()).zip(&self.columns) {
            match domain.compare(x, y) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        a.len().cmp(&b.len())
    }
}
