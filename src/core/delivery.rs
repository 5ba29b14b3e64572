//! Background delivery loop
//!
//! A single thread moves through
//! `Idle -> Sending -> (Idle | Backoff -> Sending ...) -> Stopped`:
//!
//! - `Idle` waits on the queue (and the shutdown token). With a session
//!   timeout it wakes periodically to drop idle connections. The first
//!   record starts a batch, built from whatever else is already queued.
//! - `Sending` issues one bulk request for the batch.
//! - `Backoff` sleeps before re-sending the same batch. A batch that runs
//!   out of retries is dropped and the loop moves on.
//! - `Stopped` is reached once the close sentinel has been taken off the
//!   queue and the batch it terminated has been handled, or after a
//!   cancelled token has let the loop drain what was queued.
//!
//! Nothing here ever propagates an error to producer threads.

use super::batch::{Batch, BatchBuilder, BulkPayload};
use super::diagnostics::{panic_message, Diagnostic, Diagnostics, RecordFailure};
use super::error::DeliveryError;
use super::metrics::ShipperMetrics;
use super::queue::{BoundedQueue, QueueSlot, Wake};
use super::record::Record;
use super::retry::RetryPolicy;
use super::shutdown::ShutdownToken;
use crate::transport::{BulkResponse, BulkTransport};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is running a [`DeliveryLoop`]
///
/// Log bridges use this to keep the pipeline's own activity out of the
/// stream it ships.
pub fn on_delivery_thread() -> bool {
    DELIVERING.with(Cell::get)
}

/// Marks the current thread as delivering until dropped
struct DeliveringScope {
    previous: bool,
}

impl DeliveringScope {
    fn enter() -> Self {
        Self {
            previous: DELIVERING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for DeliveringScope {
    fn drop(&mut self) {
        DELIVERING.with(|flag| flag.set(self.previous));
    }
}

/// Per-batch result of a successful bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
}

impl DeliveryOutcome {
    /// Attach the sent documents to the endpoint's per-item failures.
    pub fn from_response(batch: &Batch, response: &BulkResponse) -> Self {
        let failures = response
            .failures
            .iter()
            .map(|failure| RecordFailure {
                position: failure.position,
                status: failure.status,
                reason: failure.reason.clone(),
                document: batch
                    .actions()
                    .get(failure.position)
                    .map(|action| action.document.clone())
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            succeeded: response.succeeded(),
            failed: response.failed(),
            failures,
        }
    }
}

/// Where the loop is
#[derive(Debug)]
enum State {
    Idle,
    Sending {
        batch: Batch,
        payload: BulkPayload,
        attempt: u32,
    },
    Backoff {
        batch: Batch,
        payload: BulkPayload,
        attempt: u32,
        error: DeliveryError,
    },
    Stopped,
}

/// The consumer side of the pipeline
pub struct DeliveryLoop<T: BulkTransport> {
    queue: Arc<BoundedQueue<Record>>,
    builder: BatchBuilder,
    transport: T,
    retry: RetryPolicy,
    session_timeout: Option<Duration>,
    token: ShutdownToken,
    diagnostics: Diagnostics,
    metrics: Arc<ShipperMetrics>,
}

impl<T: BulkTransport> DeliveryLoop<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<BoundedQueue<Record>>,
        builder: BatchBuilder,
        transport: T,
        retry: RetryPolicy,
        session_timeout: Option<Duration>,
        token: ShutdownToken,
        diagnostics: Diagnostics,
        metrics: Arc<ShipperMetrics>,
    ) -> Self {
        Self {
            queue,
            builder,
            transport,
            retry,
            session_timeout,
            token,
            diagnostics,
            metrics,
        }
    }

    /// Run until stopped, then hand the transport back for a later run.
    pub fn run(mut self) -> T {
        let _scope = DeliveringScope::enter();
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.idle(),
                State::Sending {
                    batch,
                    payload,
                    attempt,
                } => self.send(batch, payload, attempt),
                State::Backoff {
                    batch,
                    payload,
                    attempt,
                    error,
                } => self.backoff(batch, payload, attempt, error),
                State::Stopped => break,
            };
        }
        self.transport
    }

    fn idle(&mut self) -> State {
        let first = if self.token.is_cancelled() {
            match self.queue.try_dequeue() {
                Some(slot) => slot,
                None => return State::Stopped,
            }
        } else {
            match self.queue.wait(self.session_timeout, &self.token) {
                Wake::Slot(slot) => slot,
                Wake::Timeout => {
                    self.transport.reset();
                    return State::Idle;
                }
                Wake::Cancelled => return State::Idle,
            }
        };
        self.building(first)
    }

    fn building(&mut self, first: QueueSlot<Record>) -> State {
        let diagnostics = &self.diagnostics;
        let metrics = &self.metrics;
        let batch = self.builder.build_from(first, &self.queue, |error, record| {
            metrics.record_lost(1);
            diagnostics.report(Diagnostic::TemplateFailed {
                error: error.to_string(),
                document: record.to_json(),
            });
        });

        if batch.is_empty() {
            return Self::after(&batch);
        }
        let payload = batch.payload();
        State::Sending {
            batch,
            payload,
            attempt: 0,
        }
    }

    fn send(&mut self, batch: Batch, payload: BulkPayload, attempt: u32) -> State {
        let transport = &mut self.transport;
        let result = panic::catch_unwind(AssertUnwindSafe(|| transport.send(&payload)));

        match result {
            Ok(Ok(response)) => {
                if let Some(error) = response.unverified.clone() {
                    self.diagnostics.report(Diagnostic::UnverifiedResponse {
                        records: batch.len(),
                        error,
                    });
                }
                let outcome = DeliveryOutcome::from_response(&batch, &response);
                self.metrics
                    .record_batch_sent(outcome.succeeded, outcome.failed);
                if !outcome.failures.is_empty() {
                    self.diagnostics.report(Diagnostic::PartialFailure {
                        accepted: outcome.succeeded,
                        failures: outcome.failures,
                    });
                }
                Self::after(&batch)
            }
            Ok(Err(error)) if error.is_transient() => State::Backoff {
                batch,
                payload,
                attempt: attempt + 1,
                error,
            },
            Ok(Err(error)) => self.drop_batch(batch, error.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.diagnostics
                    .report(Diagnostic::WorkerPanicked { message: message.clone() });
                self.drop_batch(batch, format!("transport panicked: {}", message))
            }
        }
    }

    fn backoff(
        &mut self,
        batch: Batch,
        payload: BulkPayload,
        attempt: u32,
        error: DeliveryError,
    ) -> State {
        if self.token.is_cancelled() {
            return self.drop_batch(batch, format!("{} (shutdown requested)", error));
        }
        if !self.retry.allows(attempt) {
            return self.drop_batch(
                batch,
                format!("{} (gave up after {} attempts)", error, attempt),
            );
        }

        let delay = self.retry.delay(attempt);
        self.diagnostics.report(Diagnostic::Retrying {
            attempt,
            records: batch.len(),
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        });
        if self.token.wait_timeout(delay) {
            return self.drop_batch(batch, format!("{} (shutdown requested)", error));
        }

        self.metrics.record_retry();
        State::Sending {
            batch,
            payload,
            attempt,
        }
    }

    fn drop_batch(&mut self, batch: Batch, reason: String) -> State {
        self.metrics.record_batch_dropped(batch.len());
        self.diagnostics.report(Diagnostic::BatchDropped {
            records: batch.len(),
            reason,
        });
        Self::after(&batch)
    }

    fn after(batch: &Batch) -> State {
        if batch.is_closed() {
            State::Stopped
        } else {
            State::Idle
        }
    }
}
