//! Event to record projection
//!
//! Formatting is a pure function of the event and the formatter settings.
//! It has no failure path: missing attributes are skipped and values without
//! a JSON form are rendered as their debug text.

use super::event::Event;
use super::record::Record;
use super::timestamp::TimestampFormat;
use super::value::FieldValue;
use serde_json::Map;
use std::collections::BTreeMap;
use std::fmt;

/// Function reading one value out of an event
pub type Accessor = fn(&Event) -> Option<FieldValue>;

/// Where a mapped output field takes its value from
#[derive(Clone)]
pub enum FieldSource {
    /// Looked up with [`Event::attribute`]
    Attribute(String),
    /// Computed from the event
    Accessor(Accessor),
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Attribute(name) => write!(f, "Attribute({:?})", name),
            FieldSource::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

/// Ordered mapping of output field name to value source
///
/// # Example
///
/// ```
/// use bulk_log_shipper::core::FieldMapping;
///
/// let mapping = FieldMapping::new()
///     .attribute("logger", "name")
///     .attribute("level", "levelname")
///     .accessor("thread_count", |_event| Some(4u64.into()));
/// assert_eq!(mapping.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    entries: Vec<(String, FieldSource)>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `output` to the event attribute called `attribute`.
    #[must_use]
    pub fn attribute(mut self, output: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.entries
            .push((output.into(), FieldSource::Attribute(attribute.into())));
        self
    }

    /// Map `output` to a computed value.
    #[must_use]
    pub fn accessor(mut self, output: impl Into<String>, accessor: Accessor) -> Self {
        self.entries.push((output.into(), FieldSource::Accessor(accessor)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldSource)> {
        self.entries.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for FieldMapping
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(FieldMapping::new(), |mapping, (k, v)| mapping.attribute(k, v))
    }
}

/// Builds [`Record`]s from [`Event`]s.
#[derive(Debug, Clone)]
pub struct Formatter {
    mapping: Option<FieldMapping>,
    time_field: String,
    time_format: TimestampFormat,
    static_fields: BTreeMap<String, FieldValue>,
}

impl Formatter {
    pub fn new(time_field: impl Into<String>, time_format: TimestampFormat) -> Self {
        Self {
            mapping: None,
            time_field: time_field.into(),
            time_format,
            static_fields: BTreeMap::new(),
        }
    }

    /// Project only the mapped fields instead of every attribute.
    #[must_use]
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Fields added to every record. Event values win on name clashes.
    #[must_use]
    pub fn with_static_fields(mut self, fields: BTreeMap<String, FieldValue>) -> Self {
        self.static_fields = fields;
        self
    }

    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    pub fn format(&self, event: &Event) -> Record {
        let mut fields = Map::new();

        for (name, value) in &self.static_fields {
            fields.insert(name.clone(), value.to_json_value());
        }

        match &self.mapping {
            Some(mapping) => {
                for (output, source) in mapping.iter() {
                    let value = match source {
                        FieldSource::Attribute(name) => {
                            event.attribute(name).map(|v| v.to_json_value())
                        }
                        FieldSource::Accessor(accessor) => {
                            accessor(event).map(|v| v.to_json_value())
                        }
                    };
                    if let Some(value) = value {
                        fields.insert(output.clone(), value);
                    }
                }
            }
            None => {
                fields.insert("message".to_string(), event.message().into());
                fields.insert("level".to_string(), event.level().as_str().into());
                for (name, value) in event.attributes() {
                    fields.insert(name.clone(), value.to_json_value());
                }
            }
        }

        fields.insert(
            self.time_field.clone(),
            self.time_format.render(&event.timestamp()),
        );

        Record::new(event.timestamp(), self.time_field.clone(), fields)
    }
}
