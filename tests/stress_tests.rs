//! Stress tests for concurrent producers
//!
//! These tests verify:
//! - No record is lost or duplicated with a blocking policy under contention
//! - Per-producer order survives interleaving
//! - Dropping policy accounts for every submission
//! - Repeated close/restart cycles under load

use bulk_log_shipper::core::{BulkPayload, DeliveryError, Event, LogLevel};
use bulk_log_shipper::transport::{BulkResponse, BulkTransport};
use bulk_log_shipper::{Handler, OverflowPolicy, RetryPolicy};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PRODUCERS: usize = 8;
const PER_PRODUCER: usize = 500;

/// Collects `(producer, seq)` pairs, failing now and then with a 503
#[derive(Clone, Default)]
struct Flaky {
    delivered: Arc<Mutex<Vec<(u64, u64)>>>,
    failure_rate: f64,
}

impl BulkTransport for Flaky {
    fn send(&mut self, payload: &BulkPayload) -> Result<BulkResponse, DeliveryError> {
        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(DeliveryError::status("es", 503, "busy"));
        }
        let mut delivered = self.delivered.lock();
        for line in payload.body().lines().skip(1).step_by(2) {
            let doc: Value = serde_json::from_str(line).unwrap();
            delivered.push((
                doc["producer"].as_u64().unwrap(),
                doc["seq"].as_u64().unwrap(),
            ));
        }
        Ok(BulkResponse::accepted(payload.records()))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn spawn_producers(handler: &Arc<Handler>) {
    let workers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let handler = Arc::clone(handler);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    handler.submit(
                        &Event::new(LogLevel::Info, "load")
                            .with_attribute("producer", producer)
                            .with_attribute("seq", seq),
                    );
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_blocking_policy_loses_nothing_under_contention() {
    let transport = Flaky {
        failure_rate: 0.1,
        ..Flaky::default()
    };
    let handler = Arc::new(
        Handler::builder()
            .index("stress")
            .queue_capacity(16)
            .bulk_size(32)
            .session_timeout(None)
            .overflow_policy(OverflowPolicy::Block)
            .retry(
                RetryPolicy::unbounded()
                    .with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
            )
            .quiet_diagnostics(true)
            .transport(Box::new(transport.clone()))
            .build()
            .unwrap(),
    );

    spawn_producers(&handler);
    handler.close();

    let delivered = transport.delivered.lock();
    assert_eq!(delivered.len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(handler.metrics().dropped_count(), 0);
    assert_eq!(
        handler.metrics().records_delivered(),
        (PRODUCERS * PER_PRODUCER) as u64
    );

    // Each producer's records arrive in the order it submitted them
    let mut next: HashMap<u64, u64> = HashMap::new();
    for &(producer, seq) in delivered.iter() {
        let expected = next.entry(producer).or_insert(0);
        assert_eq!(seq, *expected, "producer {} out of order", producer);
        *expected += 1;
    }
}

#[test]
fn test_drop_policy_accounts_for_every_submission() {
    let transport = Flaky::default();
    let handler = Arc::new(
        Handler::builder()
            .index("stress")
            .queue_capacity(8)
            .bulk_size(4)
            .session_timeout(None)
            .quiet_diagnostics(true)
            .transport(Box::new(transport.clone()))
            .build()
            .unwrap(),
    );

    spawn_producers(&handler);
    handler.close();

    let metrics = handler.metrics();
    let total = (PRODUCERS * PER_PRODUCER) as u64;
    assert_eq!(metrics.submitted(), total);
    assert_eq!(metrics.enqueued() + metrics.dropped_count(), total);
    assert_eq!(metrics.records_delivered(), metrics.enqueued());
    assert_eq!(transport.delivered.lock().len() as u64, metrics.enqueued());
}

#[test]
fn test_close_and_restart_cycles() {
    let transport = Flaky::default();
    let handler = Handler::builder()
        .index("stress")
        .queue_capacity(64)
        .session_timeout(Some(Duration::from_millis(5)))
        .overflow_policy(OverflowPolicy::Block)
        .quiet_diagnostics(true)
        .transport(Box::new(transport.clone()))
        .build()
        .unwrap();

    for cycle in 0..20u64 {
        for seq in 0..25u64 {
            handler.submit(
                &Event::new(LogLevel::Debug, "cycle")
                    .with_attribute("producer", cycle)
                    .with_attribute("seq", seq),
            );
        }
        handler.close();
        assert!(!handler.is_running());
    }

    assert_eq!(transport.delivered.lock().len(), 20 * 25);
}
