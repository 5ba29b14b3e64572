//! # Bulk Log Shipper
//!
//! Ships structured log events to an HTTP bulk-ingest endpoint
//! (Elasticsearch/OpenSearch `_bulk`) from a background thread.
//!
//! ## Features
//!
//! - **Non-blocking submit**: events are formatted on the caller's thread and
//!   queued; the network is only touched by the delivery thread
//! - **Bounded memory**: a fixed-capacity queue with drop or block overflow
//!   policies
//! - **Batching**: everything queued (up to `bulk_size`) goes out in one request
//! - **Retry with backoff**: transient failures are retried, permanent ones
//!   dropped with a diagnostic so one bad batch never stalls the pipeline
//! - **Orderly shutdown**: `close()` returns once everything submitted before
//!   it has been attempted
//!
//! ```no_run
//! use bulk_log_shipper::prelude::*;
//!
//! let handler = Handler::builder()
//!     .hosts(["http://localhost:9200"])
//!     .index("app-{time:%Y.%m.%d}")
//!     .time_format(TimestampFormat::Iso8601)
//!     .build()?;
//!
//! bulk_log_shipper::event!(handler, LogLevel::Info, "user logged in", user = "alice", attempts = 1);
//! handler.close();
//! # Ok::<(), bulk_log_shipper::ShipperError>(())
//! ```

pub mod core;
#[cfg(feature = "tracing")]
pub mod layer;
pub mod macros;
pub mod transport;

pub mod prelude {
    pub use crate::core::{
        Diagnostic, DiagnosticCallback, Event, FieldMapping, FieldValue, Handler, HandlerBuilder,
        HandlerConfig, LogLevel, OverflowPolicy, Result, RetryPolicy, ShipperError,
        ShipperMetrics, ShutdownToken, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::transport::{BulkTransport, HttpTransport};
}

pub use crate::core::{
    Diagnostic, DiagnosticCallback, Event, FieldMapping, FieldValue, Handler, HandlerBuilder,
    HandlerConfig, LogLevel, OverflowPolicy, Result, RetryPolicy, ShipperError, ShipperMetrics,
    ShutdownToken, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use crate::transport::{BulkTransport, HttpTransport};
