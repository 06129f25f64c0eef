//! Backend-neutral attribute values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// A single attribute value, independent of any storage backend.
///
/// Every backend adapter stores and filters these; the typed entity layer
/// converts them from and to the user's structs through the model schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Absent optional attribute.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Ordered list of values.
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Rank used to order values of different kinds deterministically.
    fn type_rank(&self) -> u8 {
        match self {
            AttributeValue::Null => 0,
            AttributeValue::Bool(_) => 1,
            AttributeValue::Int(_) | AttributeValue::Float(_) => 2,
            AttributeValue::Str(_) => 3,
            AttributeValue::DateTime(_) => 4,
            AttributeValue::List(_) => 5,
        }
    }

    /// Total ordering across values.
    ///
    /// Values of the same kind compare naturally (integers and floats compare
    /// numerically with each other); values of different kinds order by a
    /// fixed type rank so that sorting is deterministic on every backend.
    pub fn compare(&self, other: &AttributeValue) -> Ordering {
        use AttributeValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (List(a), List(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    match left.compare(right) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Converts the value into its JSON representation.
    ///
    /// Timestamps become RFC 3339 strings so that lexicographic comparison in
    /// text-based stores matches chronological order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Int(n) => serde_json::Value::from(*n),
            AttributeValue::Float(f) => serde_json::Value::from(*f),
            AttributeValue::Str(s) => serde_json::Value::from(s.clone()),
            AttributeValue::DateTime(dt) => {
                serde_json::Value::from(dt.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            AttributeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(n) => write!(f, "{}", n),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Str(s) => write!(f, "{}", s),
            AttributeValue::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison_across_kinds() {
        assert_eq!(
            AttributeValue::Int(3).compare(&AttributeValue::Float(3.5)),
            Ordering::Less
        );
        assert_eq!(
            AttributeValue::Float(4.0).compare(&AttributeValue::Int(4)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_type_rank_is_deterministic() {
        assert_eq!(
            AttributeValue::Null.compare(&AttributeValue::Bool(false)),
            Ordering::Less
        );
        assert_eq!(
            AttributeValue::Str("z".into()).compare(&AttributeValue::Int(9)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_datetime_json_is_rfc3339() {
        let dt: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        let json = AttributeValue::DateTime(dt).to_json();
        assert_eq!(json, serde_json::json!("2024-05-01T10:00:00.000000Z"));
    }

    #[test]
    fn test_list_comparison_is_elementwise() {
        let short: AttributeValue = vec![1i64, 2].into();
        let long: AttributeValue = vec![1i64, 2, 3].into();
        assert_eq!(short.compare(&long), Ordering::Less);
    }
}
