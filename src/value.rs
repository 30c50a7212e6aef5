//! Dynamically-typed values stored in configs and player data.
//!
//! Everything a module can persist is a [`Value`]: a tagged variant that
//! maps 1:1 onto JSON (and YAML for config files). Typed access goes
//! through [`FromValue`], which performs the documented best-effort
//! coercions: numeric widening, string→primitive parsing, bool↔int, and
//! element-wise conversion for lists and maps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A dynamically-typed scalar, list, or nested map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Human-readable name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Conversion failure between a stored value and a requested type.
#[derive(Debug, Clone, Error)]
#[error("cannot convert {found} value to {target}")]
pub struct ValueError {
    pub found: &'static str,
    pub target: &'static str,
}

impl ValueError {
    fn new(found: &Value, target: &'static str) -> Self {
        Self {
            found: found.kind(),
            target,
        }
    }
}

/// Typed extraction from a [`Value`], with best-effort coercion.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::String(s) => s.parse().map_err(|_| ValueError::new(value, "bool")),
            _ => Err(ValueError::new(value, "bool")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.is_finite() => Ok(f.round() as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| ValueError::new(value, "i64")),
            _ => Err(ValueError::new(value, "i64")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value).map_err(|mut e| {
            e.target = "i32";
            e
        })?;
        i32::try_from(wide).map_err(|_| ValueError::new(value, "i32"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value).map_err(|mut e| {
            e.target = "u64";
            e
        })?;
        u64::try_from(wide).map_err(|_| ValueError::new(value, "u64"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| ValueError::new(value, "f64")),
            _ => Err(ValueError::new(value, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        f64::from_value(value)
            .map(|f| f as f32)
            .map_err(|mut e| {
                e.target = "f32";
                e
            })
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            _ => Err(ValueError::new(value, "string")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ValueError::new(value, "datetime")),
            _ => Err(ValueError::new(value, "datetime")),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            _ => Err(ValueError::new(value, "list")),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => Err(ValueError::new(value, "map")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::String(v.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(i64::from_value(&Value::Int(6)).unwrap(), 6);
        assert_eq!(f64::from_value(&Value::Int(6)).unwrap(), 6.0);
        assert_eq!(i64::from_value(&Value::Float(2.6)).unwrap(), 3);
        assert_eq!(i32::from_value(&Value::Int(42)).unwrap(), 42);
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_string_parsing() {
        assert_eq!(i64::from_value(&Value::String("17".into())).unwrap(), 17);
        assert_eq!(
            f64::from_value(&Value::String("2.5".into())).unwrap(),
            2.5
        );
        assert!(bool::from_value(&Value::String("true".into())).unwrap());
        assert!(i64::from_value(&Value::String("abc".into())).is_err());
    }

    #[test]
    fn test_bool_int_coercion() {
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        assert!(!bool::from_value(&Value::Int(0)).unwrap());
        assert_eq!(i64::from_value(&Value::Bool(true)).unwrap(), 1);
    }

    #[test]
    fn test_list_elementwise() {
        let list = Value::List(vec![
            Value::Int(1),
            Value::String("2".into()),
            Value::Float(3.0),
        ]);
        let ints: Vec<i64> = Vec::from_value(&list).unwrap();
        assert_eq!(ints, vec![1, 2, 3]);

        let bad = Value::List(vec![Value::Int(1), Value::Null]);
        assert!(Vec::<i64>::from_value(&bad).is_err());
    }

    #[test]
    fn test_map_elementwise() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), Value::Int(1));
        entries.insert("b".to_string(), Value::String("2".into()));
        let map: BTreeMap<String, i64> = BTreeMap::from_value(&Value::Map(entries)).unwrap();
        assert_eq!(map["a"], 1);
        assert_eq!(map["b"], 2);
    }

    #[test]
    fn test_json_round_trip() {
        let value = Value::Map(BTreeMap::from([
            ("points".to_string(), Value::Int(100)),
            ("tags".to_string(), Value::List(vec![Value::String("vip".into())])),
            ("ratio".to_string(), Value::Float(0.5)),
            ("none".to_string(), Value::Null),
        ]));

        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_datetime_via_string() {
        let now = Utc::now();
        let value = Value::from(now);
        let parsed: DateTime<Utc> = DateTime::from_value(&value).unwrap();
        assert_eq!(parsed, now);
    }
}
