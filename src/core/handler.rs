//! The producer-facing side of the pipeline

use super::{
    batch::BatchBuilder,
    config::HandlerConfig,
    delivery::DeliveryLoop,
    diagnostics::{panic_message, Diagnostic, DiagnosticCallback, Diagnostics},
    error::Result,
    event::{Event, LogLevel},
    formatter::{FieldMapping, Formatter},
    metrics::ShipperMetrics,
    overflow_policy::OverflowPolicy,
    queue::{BoundedQueue, QueueSlot},
    record::Record,
    retry::RetryPolicy,
    shutdown::ShutdownToken,
    timestamp::TimestampFormat,
    value::FieldValue,
};
use crate::transport::{BasicAuth, BulkTransport, HttpTransport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default shutdown timeout used when a handler is dropped (5 seconds)
///
/// For custom timeout control, call [`Handler::close_timeout`] first.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `close` waits for room for the sentinel before checking on the
/// worker again
const SENTINEL_RETRY: Duration = Duration::from_millis(50);

type Worker = JoinHandle<Box<dyn BulkTransport>>;

/// Delivery thread bookkeeping, guarded by one lock
struct Lifecycle {
    /// Parked here between runs; owned by the thread while it runs
    transport: Option<Box<dyn BulkTransport>>,
    worker: Option<Worker>,
    /// Cancelled when the current run's thread exits, however it exits
    exited: ShutdownToken,
    /// The sentinel for the current run is already queued
    closing: bool,
}

/// Lives on the delivery thread and marks the run as over when the thread
/// exits, including by panic
struct RunGuard {
    running: Arc<AtomicBool>,
    exited: ShutdownToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.exited.cancel();
    }
}

/// Why a submission did not make it into the queue
enum Rejection {
    QueueFull,
    ShutDown,
    /// Already reported when the loss was noticed
    WorkerLost,
}

/// Ships events to a bulk endpoint from a background thread
///
/// `submit` never blocks on the network and never returns an error; what
/// goes wrong is reported through diagnostics and [`ShipperMetrics`].
///
/// # Example
///
/// ```no_run
/// use bulk_log_shipper::prelude::*;
///
/// let handler = Handler::builder()
///     .hosts(["http://localhost:9200"])
///     .index("logs-{time:%Y.%m.%d}")
///     .time_format(TimestampFormat::Iso8601)
///     .build()
///     .expect("valid configuration");
///
/// handler.submit(&Event::new(LogLevel::Info, "started").with_attribute("port", 8080));
/// handler.close();
/// ```
pub struct Handler {
    formatter: Formatter,
    queue: Arc<BoundedQueue<Record>>,
    builder: BatchBuilder,
    retry: RetryPolicy,
    session_timeout: Option<Duration>,
    overflow_policy: OverflowPolicy,
    token: ShutdownToken,
    diagnostics: Diagnostics,
    metrics: Arc<ShipperMetrics>,
    /// Fast path for `submit`: a delivery thread is alive
    running: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
}

impl Handler {
    /// Create a builder for Handler
    #[must_use]
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// Build a handler from a complete configuration.
    pub fn new(config: HandlerConfig) -> Result<Self> {
        HandlerBuilder::from_config(config).build()
    }

    fn from_parts(
        config: &HandlerConfig,
        transport: Box<dyn BulkTransport>,
        token: ShutdownToken,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        Ok(Self {
            formatter: config.formatter(),
            queue: Arc::new(BoundedQueue::new(config.queue_capacity)),
            builder: config.batch_builder()?,
            retry: config.retry.clone(),
            session_timeout: config.session_timeout,
            overflow_policy: config.overflow_policy,
            token,
            diagnostics,
            metrics: Arc::new(ShipperMetrics::new()),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle {
                transport: Some(transport),
                worker: None,
                exited: ShutdownToken::new(),
                closing: false,
            }),
        })
    }

    /// Format `event` and queue it for delivery.
    ///
    /// Starts the delivery thread on first use. When the queue is full the
    /// configured [`OverflowPolicy`] decides between dropping and waiting.
    pub fn submit(&self, event: &Event) {
        self.metrics.record_submitted();

        if self.token.is_cancelled() {
            self.reject_shut_down();
            return;
        }

        let record = self.formatter.format(event);
        let result = match self.overflow_policy {
            OverflowPolicy::Drop => self.enqueue_now(record),
            OverflowPolicy::Block => self.enqueue_blocking(record, None),
            OverflowPolicy::BlockWithTimeout(timeout) => {
                self.enqueue_blocking(record, Some(Instant::now() + timeout))
            }
        };

        match result {
            Ok(()) => {
                self.metrics.record_enqueued();
            }
            Err(Rejection::ShutDown) => self.reject_shut_down(),
            Err(Rejection::QueueFull) => self.reject_queue_full(),
            Err(Rejection::WorkerLost) => {
                self.metrics.record_dropped();
            }
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.submit(&Event::new(level, message));
    }

    #[inline]
    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message);
    }

    fn enqueue_now(&self, record: Record) -> std::result::Result<(), Rejection> {
        if !self.ensure_running() {
            return Err(Rejection::WorkerLost);
        }
        self.queue
            .enqueue(record, false)
            .map_err(|_| Rejection::QueueFull)
    }

    /// Wait for room until `deadline`, following the delivery thread if it
    /// stops and a new one takes over.
    fn enqueue_blocking(
        &self,
        record: Record,
        deadline: Option<Instant>,
    ) -> std::result::Result<(), Rejection> {
        let mut record = record;
        if self.running.load(Ordering::Acquire) {
            record = match self.queue.enqueue(record, false) {
                Ok(()) => return Ok(()),
                Err(full) => full.into_inner(),
            };
        }

        let mut blocked = false;
        loop {
            let exited = self.current_run(deadline)?;
            record = match self.queue.enqueue(record, false) {
                Ok(()) => return Ok(()),
                Err(full) => full.into_inner(),
            };
            if !blocked {
                blocked = true;
                self.metrics.record_block();
            }
            match self.queue.enqueue_until(record, &[&self.token, &exited], deadline) {
                Ok(()) => return Ok(()),
                Err(_) if self.token.is_cancelled() => return Err(Rejection::ShutDown),
                Err(full) if exited.is_cancelled() => record = full.into_inner(),
                Err(_) => return Err(Rejection::QueueFull),
            }
        }
    }

    fn reject_queue_full(&self) {
        self.metrics.record_queue_full();
        let dropped_total = self.metrics.record_dropped() + 1;
        self.diagnostics.report(Diagnostic::QueueFull {
            dropped_total,
            capacity: self.queue.capacity(),
        });
    }

    fn reject_shut_down(&self) {
        self.metrics.record_dropped();
        self.diagnostics.report(Diagnostic::HandlerShutDown);
    }

    /// Make sure a delivery thread is alive. `false` once the transport has
    /// been lost.
    fn ensure_running(&self) -> bool {
        self.running.load(Ordering::Acquire) || self.current_run(None).is_ok()
    }

    /// Exit signal of the live delivery thread, starting one if needed.
    ///
    /// A thread that has exited on its own is joined first; if it died, the
    /// records it left behind are discarded. Waiting for a concurrent
    /// `close` to release the lifecycle stops at `deadline`.
    fn current_run(&self, deadline: Option<Instant>) -> std::result::Result<ShutdownToken, Rejection> {
        let mut lifecycle = match deadline {
            Some(deadline) => self
                .lifecycle
                .try_lock_until(deadline)
                .ok_or(Rejection::QueueFull)?,
            None => self.lifecycle.lock(),
        };
        if lifecycle.exited.is_cancelled() {
            if let Some(handle) = lifecycle.worker.take() {
                self.reap(&mut lifecycle, handle);
            }
        }
        if lifecycle.worker.is_none() && !self.start_worker(&mut lifecycle) {
            return Err(Rejection::WorkerLost);
        }
        Ok(lifecycle.exited.clone())
    }

    fn start_worker(&self, lifecycle: &mut Lifecycle) -> bool {
        let Some(transport) = lifecycle.transport.take() else {
            self.diagnostics.report(Diagnostic::WorkerPanicked {
                message: "delivery thread is gone; record dropped".to_string(),
            });
            return false;
        };

        let exited = ShutdownToken::new();
        let guard = RunGuard {
            running: Arc::clone(&self.running),
            exited: exited.clone(),
        };
        let delivery = DeliveryLoop::new(
            Arc::clone(&self.queue),
            self.builder.clone(),
            transport,
            self.retry.clone(),
            self.session_timeout,
            self.token.clone(),
            self.diagnostics.clone(),
            Arc::clone(&self.metrics),
        );

        // Set before spawning; the guard clears it if the run ends at once
        self.running.store(true, Ordering::Release);
        match thread::Builder::new()
            .name("bulk-shipper".to_string())
            .spawn(move || {
                let _guard = guard;
                delivery.run()
            }) {
            Ok(handle) => {
                lifecycle.worker = Some(handle);
                lifecycle.exited = exited;
                lifecycle.closing = false;
                true
            }
            Err(e) => {
                eprintln!("[SHIPPER ERROR] Failed to start delivery thread: {}", e);
                false
            }
        }
    }

    /// Join an exited delivery thread and take the transport back.
    fn reap(&self, lifecycle: &mut Lifecycle, handle: Worker) -> bool {
        let stopped = match handle.join() {
            Ok(transport) => {
                lifecycle.transport = Some(transport);
                true
            }
            Err(payload) => {
                self.diagnostics.report(Diagnostic::WorkerPanicked {
                    message: format!("delivery thread died: {}", panic_message(payload.as_ref())),
                });
                self.discard_queued("delivery thread died");
                false
            }
        };
        lifecycle.closing = false;
        self.running.store(false, Ordering::Release);
        stopped
    }

    /// Count whatever is still queued as lost.
    fn discard_queued(&self, reason: &str) {
        let mut records = 0;
        while let Some(slot) = self.queue.try_dequeue() {
            if let QueueSlot::Item(_) = slot {
                records += 1;
            }
        }
        if records > 0 {
            self.metrics.record_batch_dropped(records);
            self.diagnostics.report(Diagnostic::BatchDropped {
                records,
                reason: reason.to_string(),
            });
        }
    }

    /// Whether a delivery thread is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue the sentinel and wait until everything submitted before it has
    /// been attempted.
    ///
    /// Records that slip in behind the sentinel while the thread winds down
    /// get one more run before `close` returns. Returns at once if the
    /// delivery thread was never started. A later `submit` starts a fresh
    /// delivery thread.
    pub fn close(&self) {
        self.close_until(None);
    }

    /// Like [`close`](Handler::close) but gives up after `timeout`.
    ///
    /// Returns `true` if the delivery thread stopped within the timeout. On
    /// `false` the thread keeps draining in the background and a later call
    /// can wait for it again.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bulk_log_shipper::prelude::*;
    /// use std::time::Duration;
    ///
    /// let handler = Handler::builder().index("logs").build().unwrap();
    /// handler.info("Important message");
    ///
    /// if !handler.close_timeout(Duration::from_secs(10)) {
    ///     eprintln!("Warning: shipper shutdown timed out");
    /// }
    /// ```
    pub fn close_timeout(&self, timeout: Duration) -> bool {
        self.close_until(Some(Instant::now() + timeout))
    }

    fn close_until(&self, deadline: Option<Instant>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if !self.stop_worker(&mut lifecycle, deadline) {
            return false;
        }
        if self.queue.is_empty() {
            return true;
        }
        self.start_worker(&mut lifecycle) && self.stop_worker(&mut lifecycle, deadline)
    }

    fn stop_worker(&self, lifecycle: &mut Lifecycle, deadline: Option<Instant>) -> bool {
        let Some(handle) = lifecycle.worker.take() else {
            return true;
        };
        let expired = || deadline.map_or(false, |d| Instant::now() >= d);

        // The worker may already have stopped on its own after a cancel
        while !lifecycle.closing && !handle.is_finished() {
            let wait = deadline.map_or(SENTINEL_RETRY, |d| {
                d.saturating_duration_since(Instant::now()).min(SENTINEL_RETRY)
            });
            if self.queue.close_timeout(wait) {
                lifecycle.closing = true;
            } else if expired() {
                eprintln!("[SHIPPER WARNING] Queue stayed full; could not signal shutdown in time");
                lifecycle.worker = Some(handle);
                return false;
            }
        }

        if deadline.is_some() {
            while !handle.is_finished() {
                if expired() {
                    eprintln!(
                        "[SHIPPER WARNING] Delivery thread did not finish within timeout. \
                         Queued records may still be sent."
                    );
                    lifecycle.worker = Some(handle);
                    return false;
                }
                thread::sleep(Duration::from_millis(10));
            }
        }

        self.reap(lifecycle, handle)
    }

    /// Get the handler metrics
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bulk_log_shipper::prelude::*;
    ///
    /// let handler = Handler::builder().index("logs").build().unwrap();
    /// let metrics = handler.metrics();
    /// println!("Dropped: {}", metrics.dropped_count());
    /// println!("Delivered: {}", metrics.records_delivered());
    /// println!("Drop rate: {:.2}%", metrics.drop_rate());
    /// ```
    pub fn metrics(&self) -> &ShipperMetrics {
        &self.metrics
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.token
    }

    /// Records waiting for the delivery thread
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        if self.close_timeout(DEFAULT_SHUTDOWN_TIMEOUT) {
            self.discard_queued("handler dropped before delivery");
        } else {
            eprintln!(
                "[SHIPPER WARNING] Delivery thread did not shut down cleanly within {:?}; \
                 some records may be lost.",
                DEFAULT_SHUTDOWN_TIMEOUT
            );
        }

        let dropped = self.metrics.dropped_count();
        if dropped > 0 && !self.diagnostics.is_quiet() {
            eprintln!(
                "[SHIPPER WARNING] Handler shutting down with {} dropped records (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("queue_capacity", &self.queue.capacity())
            .field("queued", &self.queue.len())
            .field("overflow_policy", &self.overflow_policy)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builder for constructing a [`Handler`] with a fluent API
///
/// # Example
/// ```
/// use bulk_log_shipper::prelude::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let handler = Handler::builder()
///     .hosts(["http://es-1:9200", "http://es-2:9200"])
///     .index("app-{time:%Y.%m.%d}")
///     .doc_type("log")
///     .queue_capacity(1000)
///     .bulk_size(200)
///     .overflow_policy(OverflowPolicy::BlockWithTimeout(Duration::from_millis(50)))
///     .retry(RetryPolicy::default().with_max_retries(3))
///     .static_field("service", "checkout")
///     .on_diagnostic(Arc::new(|d: &Diagnostic| eprintln!("shipper: {}", d)))
///     .build()
///     .unwrap();
/// # drop(handler);
/// ```
pub struct HandlerBuilder {
    config: HandlerConfig,
    token: Option<ShutdownToken>,
    on_diagnostic: Option<DiagnosticCallback>,
    quiet: bool,
    transport: Option<Box<dyn BulkTransport>>,
}

impl HandlerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::from_config(HandlerConfig::default())
    }

    pub fn from_config(config: HandlerConfig) -> Self {
        Self {
            config,
            token: None,
            on_diagnostic: None,
            quiet: false,
            transport: None,
        }
    }

    /// Base URLs of the bulk endpoint, tried in order on transient failures
    #[must_use = "builder methods return a new value"]
    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Index name template. `{field}` and `{time:%Y.%m.%d}` placeholders are
    /// filled from each record.
    #[must_use = "builder methods return a new value"]
    pub fn index(mut self, template: impl Into<String>) -> Self {
        self.config.index = template.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn doc_type(mut self, template: impl Into<String>) -> Self {
        self.config.doc_type = Some(template.into());
        self
    }

    /// Ship only the mapped fields instead of every attribute
    #[must_use = "builder methods return a new value"]
    pub fn fields(mut self, mapping: FieldMapping) -> Self {
        self.config.fields = Some(mapping);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn time_field(mut self, name: impl Into<String>) -> Self {
        self.config.time_field = name.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn time_format(mut self, format: TimestampFormat) -> Self {
        self.config.time_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn static_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.config.static_fields.insert(name.into(), value.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Maximum records per bulk request
    #[must_use = "builder methods return a new value"]
    pub fn bulk_size(mut self, size: usize) -> Self {
        self.config.bulk_size = size;
        self
    }

    /// Drop pooled connections after this long without records.
    /// `None` keeps them until shutdown.
    #[must_use = "builder methods return a new value"]
    pub fn session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the policy for a full queue. Default is `Drop`.
    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Gzip request bodies
    #[must_use = "builder methods return a new value"]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Tie the handler to an externally owned shutdown signal
    #[must_use = "builder methods return a new value"]
    pub fn shutdown_token(mut self, token: ShutdownToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Receive every diagnostic, in addition to stderr
    #[must_use = "builder methods return a new value"]
    pub fn on_diagnostic(mut self, callback: DiagnosticCallback) -> Self {
        self.on_diagnostic = Some(callback);
        self
    }

    /// Keep diagnostics off stderr
    #[must_use = "builder methods return a new value"]
    pub fn quiet_diagnostics(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Deliver through a custom transport instead of HTTP
    #[must_use = "builder methods return a new value"]
    pub fn transport(mut self, transport: Box<dyn BulkTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Validate the configuration and build the Handler
    ///
    /// No thread is started and no connection is made until the first
    /// `submit`.
    pub fn build(self) -> Result<Handler> {
        self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(self.config.transport_config())?),
        };
        let diagnostics = Diagnostics::new(self.on_diagnostic).quiet(self.quiet);
        Handler::from_parts(
            &self.config,
            transport,
            self.token.unwrap_or_default(),
            diagnostics,
        )
    }
}

impl Default for HandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
