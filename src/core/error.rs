//! Error types for the shipping pipeline

use std::fmt;

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// Invalid configuration, detected once when the handler is built
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Index or doctype template could not be parsed or rendered
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Failure talking to the bulk endpoint
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl ShipperError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        ShipperError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors produced while sending one bulk request.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Connection refused, DNS failure, read/connect timeout
    #[error("transport error against {host}: {message}")]
    Transport { host: String, message: String },

    /// Endpoint answered with a non-success status
    #[error("HTTP {status} from {host}: {body}")]
    Status {
        host: String,
        status: u16,
        body: String,
    },

    /// Request body could not be built
    #[error("payload error: {0}")]
    Payload(String),
}

impl DeliveryError {
    pub fn transport(host: impl Into<String>, message: impl Into<String>) -> Self {
        DeliveryError::Transport {
            host: host.into(),
            message: message.into(),
        }
    }

    pub fn status(host: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        DeliveryError::Status {
            host: host.into(),
            status,
            body: body.into(),
        }
    }

    /// Whether the same batch may succeed if sent again.
    ///
    /// Network failures, 429 and 5xx are transient. Any other 4xx means the
    /// payload itself is unacceptable, and payload errors never heal.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Transport { .. } => true,
            DeliveryError::Status { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Payload(_) => false,
        }
    }
}

/// Errors from index/doctype name templates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unbalanced '{brace}' at byte {position} in template '{template}'")]
    Unbalanced {
        template: String,
        brace: char,
        position: usize,
    },

    #[error("empty field name in template '{0}'")]
    EmptyField(String),

    #[error("invalid time format '{format}' for field '{field}'")]
    InvalidTimeFormat { field: String, format: String },

    #[error("record has no field '{0}'")]
    MissingField(String),
}

/// Returned by a non-blocking enqueue on a full queue; hands the item back.
#[derive(PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ShipperError::config("hosts", "at least one host is required");
        assert!(matches!(err, ShipperError::InvalidConfiguration { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid configuration for hosts: at least one host is required"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(DeliveryError::transport("http://a:9200", "connection refused").is_transient());
        assert!(DeliveryError::status("h", 503, "").is_transient());
        assert!(DeliveryError::status("h", 500, "").is_transient());
        assert!(DeliveryError::status("h", 429, "").is_transient());
        assert!(!DeliveryError::status("h", 400, "").is_transient());
        assert!(!DeliveryError::status("h", 404, "").is_transient());
        assert!(!DeliveryError::Payload("bad".into()).is_transient());
    }

    #[test]
    fn test_template_error_display() {
        let err = TemplateError::MissingField("host".to_string());
        assert_eq!(err.to_string(), "record has no field 'host'");

        let err: ShipperError = err.into();
        assert!(err.to_string().starts_with("Template error:"));
    }

    #[test]
    fn test_queue_full_returns_item() {
        let full = QueueFull(42);
        assert_eq!(full.to_string(), "queue is full");
        assert_eq!(full.into_inner(), 42);
    }
}
