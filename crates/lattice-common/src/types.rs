//! Scalar values, type identifiers and row identifiers for Lattice.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identifier for the column kinds an index key can hold.
///
/// Type IDs appear in index configuration and drive per-column
/// admission checks and surrogate key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeId {
    // Null type
    Null = 0,

    // Boolean
    Boolean = 1,

    // Numeric types
    Int64 = 13,
    Float64 = 31,

    // String types
    Text = 52,

    // Binary types
    Binary = 60,

    // Date/Time types
    Date = 70,
    Timestamp = 72,

    // UUID
    Uuid = 80,

    // Set of alternatives (probe keys only)
    Set = 100,
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeId::Null => "NULL",
            TypeId::Boolean => "BOOLEAN",
            TypeId::Int64 => "INT64",
            TypeId::Float64 => "FLOAT64",
            TypeId::Text => "TEXT",
            TypeId::Binary => "BINARY",
            TypeId::Date => "DATE",
            TypeId::Timestamp => "TIMESTAMP",
            TypeId::Uuid => "UUID",
            TypeId::Set => "SET",
        };
        write!(f, "{}", name)
    }
}

/// Opaque identifier of the row an index association points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl RowId {
    /// Creates a new row ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RowId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single scalar component of an index key.
///
/// `Set` only appears in probe keys: it stands for a collection of
/// alternative values at one key position and is never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(Bytes),
    /// Days since 1970-01-01.
    Date(i32),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Uuid(u128),
    Set(Vec<Value>),
}

impl Value {
    /// Returns true for the null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type identifier of this value.
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null => TypeId::Null,
            Value::Boolean(_) => TypeId::Boolean,
            Value::Int(_) => TypeId::Int64,
            Value::Float(_) => TypeId::Float64,
            Value::Text(_) => TypeId::Text,
            Value::Binary(_) => TypeId::Binary,
            Value::Date(_) => TypeId::Date,
            Value::Timestamp(_) => TypeId::Timestamp,
            Value::Uuid(_) => TypeId::Uuid,
            Value::Set(_) => TypeId::Set,
        }
    }

    /// Builds a set of alternatives.
    pub fn set<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Set(values.into_iter().map(Into::into).collect())
    }

    /// Ints and floats share a rank so they compare numerically.
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Binary(_) => 4,
            Value::Date(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Uuid(_) => 7,
            Value::Set(_) => 8,
        }
    }

    /// Total order over all values, nulls lowest.
    ///
    /// Values of different kinds order by kind. Floats use the IEEE 754
    /// total order, so NaN is a regular (largest) key.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

/// Compares an integer with a float exactly.
///
/// Integers sit where their real value falls among the floats. Zero equals
/// `+0.0` and sorts after `-0.0`; NaNs keep their total-order place beyond
/// the infinities.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f == 0.0 {
        return match i.cmp(&0) {
            Ordering::Equal if f.is_sign_negative() => Ordering::Greater,
            ord => ord,
        };
    }
    // 2^63; i64::MIN is exactly -2^63
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let whole = f.trunc();
    if whole >= LIMIT {
        return Ordering::Less;
    }
    if whole < -LIMIT {
        return Ordering::Greater;
    }
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.total_cmp(&(f - whole)),
        ord => ord,
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Binary(v) => {
                write!(f, "x'")?;
                for b in v.iter() {
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "'")
            }
            Value::Date(v) => write!(f, "DATE {}", v),
            Value::Timestamp(v) => write!(f, "TIMESTAMP {}", v),
            Value::Uuid(v) => write!(f, "{:032x}", v),
            Value::Set(vs) => {
                write!(f, "{{")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_display() {
        assert_eq!(TypeId::Null.to_string(), "NULL");
        assert_eq!(TypeId::Int64.to_string(), "INT64");
        assert_eq!(TypeId::Text.to_string(), "TEXT");
        assert_eq!(TypeId::Timestamp.to_string(), "TIMESTAMP");
        assert_eq!(TypeId::Set.to_string(), "SET");
    }

    #[test]
    fn test_type_id_serde_roundtrip() {
        let original = TypeId::Timestamp;
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: TypeId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_value_type_id() {
        assert_eq!(Value::Null.type_id(), TypeId::Null);
        assert_eq!(Value::from(7i64).type_id(), TypeId::Int64);
        assert_eq!(Value::from("x").type_id(), TypeId::Text);
        assert_eq!(Value::from(1.5).type_id(), TypeId::Float64);
        assert_eq!(Value::set([1i64, 2]).type_id(), TypeId::Set);
    }

    #[test]
    fn test_null_sorts_lowest() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Value::Text(String::new()).total_cmp(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.total_cmp(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_numeric_cross_compare() {
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.0).total_cmp(&Value::Int(3)), Ordering::Equal);
        assert_eq!(Value::Float(f64::NAN).total_cmp(&Value::Float(1.0)), Ordering::Greater);
    }

    #[test]
    fn test_int_float_compare_is_exact() {
        let big = 1i64 << 53;
        let f = Value::Float(big as f64);
        assert_eq!(Value::Int(big).total_cmp(&f), Ordering::Equal);
        assert_eq!(Value::Int(big + 1).total_cmp(&f), Ordering::Greater);
        assert_eq!(f.total_cmp(&Value::Int(big + 1)), Ordering::Less);
        assert_eq!(Value::Int(-big - 1).total_cmp(&Value::Float(-big as f64)), Ordering::Less);

        // i64::MAX rounds up to 2^63 as a float
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(i64::MAX as f64)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).total_cmp(&Value::Float(i64::MIN as f64)), Ordering::Equal);
        assert_eq!(Value::Int(i64::MIN).total_cmp(&Value::Float(-1e300)), Ordering::Greater);

        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Int(-2).total_cmp(&Value::Float(-2.5)), Ordering::Greater);
        assert_eq!(Value::Int(-3).total_cmp(&Value::Float(-2.5)), Ordering::Less);
    }

    #[test]
    fn test_int_float_compare_special_values() {
        assert_eq!(Value::Int(0).total_cmp(&Value::Float(0.0)), Ordering::Equal);
        assert_eq!(Value::Int(0).total_cmp(&Value::Float(-0.0)), Ordering::Greater);
        assert_eq!(Value::Int(-1).total_cmp(&Value::Float(-0.0)), Ordering::Less);
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(f64::INFINITY)), Ordering::Less);
        assert_eq!(
            Value::Int(i64::MIN).total_cmp(&Value::Float(f64::NEG_INFINITY)),
            Ordering::Greater
        );
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(f64::NAN)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).total_cmp(&Value::Float(-f64::NAN)), Ordering::Greater);
    }

    #[test]
    fn test_mixed_numeric_order_is_transitive() {
        let mut values: Vec<Value> = Vec::new();
        let big = 1i64 << 53;
        for i in [-big - 1, -big, -3, -1, 0, 1, 2, big, big + 1, big + 2, i64::MAX, i64::MIN] {
            values.push(Value::Int(i));
        }
        for f in [-0.0, 0.0, 0.5, -2.5, big as f64, (big + 2) as f64, 1e19, -1e19, f64::NAN] {
            values.push(Value::Float(f));
        }
        for a in &values {
            for b in &values {
                assert_eq!(a.total_cmp(b), b.total_cmp(a).reverse(), "{} vs {}", a, b);
                for c in &values {
                    if a.total_cmp(b).is_le() && b.total_cmp(c).is_le() {
                        assert!(a.total_cmp(c).is_le(), "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_mixed_kinds_order_by_rank() {
        assert_eq!(Value::Int(100).total_cmp(&Value::from("a")), Ordering::Less);
        assert_eq!(Value::Boolean(true).total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Uuid(0).total_cmp(&Value::Timestamp(9)), Ordering::Greater);
    }

    #[test]
    fn test_set_lexicographic() {
        let a = Value::set([1i64, 2]);
        let b = Value::set([1i64, 3]);
        let c = Value::set([1i64]);
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(c.total_cmp(&a), Ordering::Less);
        assert_eq!(a.total_cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("k")), Value::Text("k".to_string()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::from("abc").to_string(), "'abc'");
        assert_eq!(Value::Binary(Bytes::from_static(&[0x0a, 0xff])).to_string(), "x'0aff'");
        assert_eq!(Value::set([1i64, 2]).to_string(), "{1, 2}");
    }

    #[test]
    fn test_row_id() {
        let r = RowId::new(42);
        assert_eq!(r.as_u64(), 42);
        assert_eq!(RowId::from(42), r);
        assert_eq!(r.to_string(), "42");
        assert!(RowId(1) < RowId(2));
    }
}
