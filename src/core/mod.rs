//! Core pipeline types: formatting, queueing, batching and delivery

pub mod batch;
pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod formatter;
pub mod handler;
pub mod metrics;
pub mod overflow_policy;
pub mod queue;
pub mod record;
pub mod retry;
pub mod shutdown;
pub mod template;
pub mod timestamp;
pub mod value;

pub use batch::{Batch, BatchBuilder, BulkAction, BulkPayload};
pub use config::HandlerConfig;
pub use delivery::{on_delivery_thread, DeliveryLoop, DeliveryOutcome};
pub use diagnostics::{Diagnostic, DiagnosticCallback, Diagnostics, RecordFailure, Severity};
pub use error::{DeliveryError, QueueFull, Result, ShipperError, TemplateError};
pub use event::{Event, LogLevel};
pub use formatter::{Accessor, FieldMapping, FieldSource, Formatter};
pub use handler::{Handler, HandlerBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::ShipperMetrics;
pub use overflow_policy::OverflowPolicy;
pub use queue::{BoundedQueue, QueueSlot, Wake};
pub use record::Record;
pub use retry::RetryPolicy;
pub use shutdown::ShutdownToken;
pub use template::Template;
pub use timestamp::TimestampFormat;
pub use value::FieldValue;
