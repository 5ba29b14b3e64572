//! Attribute values carried by events
//!
//! Application code may attach anything to an event, including values that
//! have no JSON form. Those are kept as opaque `Debug` values and degrade to
//! their debug text when a record is formatted.

use std::fmt;
use std::sync::Arc;

/// Value of one named event attribute
#[derive(Clone)]
pub enum FieldValue {
    String(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
    /// Already-structured JSON
    Json(serde_json::Value),
    /// Value without a JSON representation
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl FieldValue {
    /// Wrap an arbitrary value that can only be rendered with `Debug`.
    pub fn opaque<T: fmt::Debug + Send + Sync + 'static>(value: T) -> Self {
        FieldValue::Opaque(Arc::new(value))
    }

    /// JSON projection. Never fails: non-finite floats and opaque values
    /// become their debug string.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::UInt(u) => serde_json::Value::Number((*u).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(format!("{:?}", f))),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Json(v) => v.clone(),
            FieldValue::Opaque(v) => serde_json::Value::String(format!("{:?}", v)),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "String({:?})", s),
            FieldValue::Int(i) => write!(f, "Int({})", i),
            FieldValue::UInt(u) => write!(f, "UInt({})", u),
            FieldValue::Float(fl) => write!(f, "Float({})", fl),
            FieldValue::Bool(b) => write!(f, "Bool({})", b),
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Json(v) => write!(f, "Json({})", v),
            FieldValue::Opaque(v) => write!(f, "Opaque({:?})", v),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::UInt(u) => write!(f, "{}", u),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => f.write_str("null"),
            FieldValue::Json(v) => write!(f, "{}", v),
            FieldValue::Opaque(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(u: u64) -> Self {
        FieldValue::UInt(u)
    }
}

impl From<u32> for FieldValue {
    fn from(u: u32) -> Self {
        FieldValue::UInt(u as u64)
    }
}

impl From<usize> for FieldValue {
    fn from(u: usize) -> Self {
        FieldValue::UInt(u as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Connection {
        fd: i32,
    }

    #[test]
    fn test_plain_values_to_json() {
        assert_eq!(FieldValue::from("x").to_json_value(), json!("x"));
        assert_eq!(FieldValue::from(-3i64).to_json_value(), json!(-3));
        assert_eq!(FieldValue::from(7u64).to_json_value(), json!(7));
        assert_eq!(FieldValue::from(true).to_json_value(), json!(true));
        assert_eq!(FieldValue::from(1.5).to_json_value(), json!(1.5));
        assert_eq!(FieldValue::Null.to_json_value(), json!(null));
        assert_eq!(FieldValue::from(None::<i64>).to_json_value(), json!(null));
    }

    #[test]
    fn test_non_finite_float_degrades_to_string() {
        assert_eq!(FieldValue::from(f64::NAN).to_json_value(), json!("NaN"));
        assert_eq!(FieldValue::from(f64::INFINITY).to_json_value(), json!("inf"));
    }

    #[test]
    fn test_opaque_uses_debug_text() {
        let value = FieldValue::opaque(Connection { fd: 4 });
        assert_eq!(value.to_json_value(), json!("Connection { fd: 4 }"));
        assert_eq!(value.to_string(), "Connection { fd: 4 }");
    }

    #[test]
    fn test_json_passthrough() {
        let value = FieldValue::from(json!({"a": [1, 2]}));
        assert_eq!(value.to_json_value(), json!({"a": [1, 2]}));
    }
}
