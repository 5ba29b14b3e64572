//! Index and doctype name templates
//!
//! A template is literal text with `{field}` or `{field:pattern}` placeholders
//! substituted from record fields, e.g. `log-{@timestamp:%Y-%m-%d}`. When the
//! placeholder names the record's time field, the pattern is a strftime
//! format applied to the event time. `{{` and `}}` are literal braces.

use super::error::TemplateError;
use super::record::Record;
use super::timestamp::{is_valid_strftime, try_format};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { name: String, pattern: Option<String> },
}

/// Parsed name template
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if !closed || body.contains('{') {
                        return Err(TemplateError::Unbalanced {
                            template: source.to_string(),
                            brace: '{',
                            position,
                        });
                    }
                    let (name, pattern) = match body.split_once(':') {
                        Some((name, pattern)) => (name.trim(), Some(pattern.to_string())),
                        None => (body.trim(), None),
                    };
                    if name.is_empty() {
                        return Err(TemplateError::EmptyField(source.to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field {
                        name: name.to_string(),
                        pattern,
                    });
                }
                '}' => {
                    return Err(TemplateError::Unbalanced {
                        template: source.to_string(),
                        brace: '}',
                        position,
                    });
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the template has no placeholders.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Reject strftime patterns chrono cannot render for `time_field`.
    pub fn validate_time_patterns(&self, time_field: &str) -> Result<(), TemplateError> {
        for segment in &self.segments {
            if let Segment::Field {
                name,
                pattern: Some(pattern),
            } = segment
            {
                if name == time_field && !is_valid_strftime(pattern) {
                    return Err(TemplateError::InvalidTimeFormat {
                        field: name.clone(),
                        format: pattern.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn render(&self, record: &Record) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, pattern } => {
                    if name == record.time_field() {
                        if let Some(pattern) = pattern {
                            let text = try_format(&record.timestamp(), pattern).ok_or_else(|| {
                                TemplateError::InvalidTimeFormat {
                                    field: name.clone(),
                                    format: pattern.clone(),
                                }
                            })?;
                            out.push_str(&text);
                            continue;
                        }
                    }
                    let value = record
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingField(name.clone()))?;
                    push_value(&mut out, value);
                }
            }
        }
        Ok(out)
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({:?})", self.source)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
