//! Bulk response parsing
//!
//! A 2xx bulk response can still carry per-item failures:
//!
//! ```text
//! {"errors": true, "items": [
//!     {"index": {"status": 201}},
//!     {"index": {"status": 400, "error": {"type": "mapper_parsing_exception", "reason": "..."}}}
//! ]}
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Endpoint's rejection of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the record in the batch
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

/// Per-record result of a successful bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResponse {
    pub records: usize,
    pub failures: Vec<ItemFailure>,
    /// Set when the body of a 2xx response could not be read, so per-record
    /// results are unknown
    pub unverified: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, RawItem>>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkResponse {
    /// Every record accepted
    pub fn accepted(records: usize) -> Self {
        Self {
            records,
            failures: Vec::new(),
            unverified: None,
        }
    }

    /// Success status, but the body was lost on the way
    pub fn unverified(records: usize, error: impl Into<String>) -> Self {
        Self {
            unverified: Some(error.into()),
            ..Self::accepted(records)
        }
    }

    /// Parse a 2xx response body for a batch of `records`.
    ///
    /// A body that is not a bulk response (empty, proxy page, ...) is
    /// treated as full acceptance; the status code already said success.
    pub fn parse(body: &str, records: usize) -> Self {
        let raw: RawResponse = match serde_json::from_str(body) {
            Ok(raw) => raw,
            Err(_) => return Self::accepted(records),
        };
        if !raw.errors {
            return Self::accepted(records);
        }

        let failures = raw
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(position, item)| {
                let item = item.into_values().next()?;
                if item.status < 300 && item.error.is_none() {
                    return None;
                }
                Some(ItemFailure {
                    position,
                    status: item.status,
                    reason: describe_error(item.error.as_ref()),
                })
            })
            .filter(|failure| failure.position < records)
            .collect();

        Self {
            records,
            failures,
            unverified: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.records.saturating_sub(self.failures.len())
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

fn describe_error(error: Option<&Value>) -> String {
    match error {
        None => "rejected".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(map)) => {
            let kind = map.get("type").and_then(Value::as_str);
            let reason = map.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
                (Some(text), None) | (None, Some(text)) => text.to_string(),
                (None, None) => Value::Object(map.clone()).to_string(),
            }
        }
        Some(other) => other.to_string(),
    }
}
