//! Side-channel reporting for the pipeline itself
//!
//! Problems inside the shipper are written to stderr, never to the log
//! stream being shipped, so a broken endpoint cannot recurse into more log
//! traffic. A callback can observe the same diagnostics.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// Failure detail for one record rejected by the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position of the record inside its batch
    pub position: usize,
    pub status: u16,
    pub reason: String,
    /// Document line as sent
    pub document: String,
}

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A submission found the queue full and was dropped
    QueueFull { dropped_total: u64, capacity: usize },
    /// A submission arrived after shutdown was requested
    HandlerShutDown,
    /// The endpoint rejected part of a batch; rejected records are dropped
    PartialFailure {
        accepted: usize,
        failures: Vec<RecordFailure>,
    },
    /// A transient failure; the same batch will be sent again
    Retrying {
        attempt: u32,
        records: usize,
        delay_ms: u64,
        error: String,
    },
    /// A batch was given up on
    BatchDropped { records: usize, reason: String },
    /// A record's index or doctype could not be rendered
    TemplateFailed { error: String, document: String },
    /// A 2xx response whose body could not be read; the batch is counted
    /// as accepted without per-record results
    UnverifiedResponse { records: usize, error: String },
    /// The transport or the delivery thread panicked
    WorkerPanicked { message: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::QueueFull { .. }
            | Diagnostic::HandlerShutDown
            | Diagnostic::PartialFailure { .. }
            | Diagnostic::Retrying { .. }
            | Diagnostic::UnverifiedResponse { .. } => Severity::Warning,
            Diagnostic::BatchDropped { .. }
            | Diagnostic::TemplateFailed { .. }
            | Diagnostic::WorkerPanicked { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::QueueFull {
                dropped_total,
                capacity,
            } => write!(
                f,
                "Queue full ({} slots), {} records dropped. \
                 Consider a larger queue or a blocking overflow policy.",
                capacity, dropped_total
            ),
            Diagnostic::HandlerShutDown => {
                write!(f, "Record submitted after shutdown was requested; dropped")
            }
            Diagnostic::PartialFailure { accepted, failures } => {
                write!(
                    f,
                    "Bulk request partially failed: {} accepted, {} rejected and dropped",
                    accepted,
                    failures.len()
                )?;
                for failure in failures {
                    write!(
                        f,
                        "\n  #{} status {}: {} | {}",
                        failure.position, failure.status, failure.reason, failure.document
                    )?;
                }
                Ok(())
            }
            Diagnostic::Retrying {
                attempt,
                records,
                delay_ms,
                error,
            } => write!(
                f,
                "Bulk request of {} records failed ({}); retry #{} in {}ms",
                records, error, attempt, delay_ms
            ),
            Diagnostic::BatchDropped { records, reason } => {
                write!(f, "Dropped batch of {} records: {}", records, reason)
            }
            Diagnostic::TemplateFailed { error, document } => {
                write!(f, "Cannot route record ({}); dropped: {}", error, document)
            }
            Diagnostic::UnverifiedResponse { records, error } => write!(
                f,
                "Bulk request of {} records succeeded but the response could not be read ({}); \
                 per-record rejections are unknown",
                records, error
            ),
            Diagnostic::WorkerPanicked { message } => write!(f, "Delivery panicked: {}", message),
        }
    }
}

/// Callback receiving every diagnostic
///
/// Runs on producer threads and on the delivery thread. It must not submit
/// to the handler that reports to it. A panic inside it is caught and the
/// diagnostic goes to stderr instead.
pub type DiagnosticCallback = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Writes diagnostics to stderr and forwards them to an optional callback
#[derive(Clone, Default)]
pub struct Diagnostics {
    callback: Option<DiagnosticCallback>,
    quiet: bool,
}

impl Diagnostics {
    pub fn new(callback: Option<DiagnosticCallback>) -> Self {
        Self {
            callback,
            quiet: false,
        }
    }

    /// Suppress stderr output; the callback still runs.
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        if !self.quiet && Self::should_print(&diagnostic) {
            eprintln!("[SHIPPER {}] {}", diagnostic.severity(), diagnostic);
        }
        if let Some(ref callback) = self.callback {
            // The callback runs on producer and delivery threads alike
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&diagnostic))) {
                eprintln!(
                    "[SHIPPER ERROR] Diagnostic callback panicked ({}) while reporting: {}",
                    panic_message(payload.as_ref()),
                    diagnostic
                );
            }
        }
    }

    /// Queue-full lines go out on the first drop and every 1000th after.
    fn should_print(diagnostic: &Diagnostic) -> bool {
        match diagnostic {
            Diagnostic::QueueFull { dropped_total, .. } => {
                *dropped_total == 1 || dropped_total % 1000 == 0
            }
            _ => true,
        }
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("callback", &self.callback.is_some())
            .field("quiet", &self.quiet)
            .finish()
    }
}
