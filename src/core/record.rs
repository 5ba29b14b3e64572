//! Formatted, serializable projection of an event

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A record ready for transmission.
///
/// Holds JSON-safe fields only, always including the configured time field.
/// The original event time is kept alongside so name templates can apply
/// their own strftime patterns to it. Records are never mutated after the
/// formatter builds them.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: DateTime<Utc>,
    time_field: String,
    fields: Map<String, Value>,
}

impl Record {
    pub(crate) fn new(timestamp: DateTime<Utc>, time_field: String, fields: Map<String, Value>) -> Self {
        Self {
            timestamp,
            time_field,
            fields,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Name of the field holding the formatted timestamp
    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Single-line JSON document body.
    pub fn to_json(&self) -> String {
        // A map of `Value`s always serializes.
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accessors() {
        let mut fields = Map::new();
        fields.insert("time".to_string(), json!(1));
        fields.insert("msg".to_string(), json!("hello"));
        let record = Record::new(Utc::now(), "time".to_string(), fields);

        assert_eq!(record.time_field(), "time");
        assert_eq!(record.get("msg"), Some(&json!("hello")));
        assert_eq!(record.len(), 2);
        let parsed: Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(parsed, json!({"msg": "hello", "time": 1}));
    }
}
