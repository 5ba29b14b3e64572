//! Bulk shipping example
//!
//! Ships events from several threads to an Elasticsearch/OpenSearch
//! `_bulk` endpoint, then closes the handler and prints its metrics.
//!
//! Run with: cargo run --example ship_to_bulk -- http://localhost:9200

use bulk_log_shipper::prelude::*;
use bulk_log_shipper::event;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Bulk Log Shipper - Example ===\n");

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:9200".to_string());

    let handler = Handler::builder()
        .hosts([host.as_str()])
        .index("demo-{time:%Y.%m.%d}")
        .time_field("@timestamp")
        .time_format(TimestampFormat::Iso8601)
        .queue_capacity(1000)
        .bulk_size(100)
        .overflow_policy(OverflowPolicy::BlockWithTimeout(Duration::from_millis(100)))
        .retry(RetryPolicy::default().with_max_retries(3))
        .static_field("service", "ship_to_bulk")
        .on_diagnostic(Arc::new(|d: &Diagnostic| {
            println!("   diagnostic: {}", d);
        }))
        .build()?;

    println!("1. Single events:");
    handler.info("Example started");
    event!(handler, LogLevel::Warn, "disk usage high", mount = "/var", percent = 91);
    println!("   Submitted 2 events to {}", host);

    println!("\n2. Multi-threaded shipping:");
    let handler = Arc::new(handler);
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                for i in 0..50 {
                    event!(handler, LogLevel::Info, "job {} step {}", worker, i; worker = worker, step = i);
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }
    println!("   4 threads submitted 50 events each");

    println!("\n3. Closing:");
    if !handler.close_timeout(Duration::from_secs(10)) {
        println!("   Delivery did not finish in time");
    }

    let metrics = handler.metrics();
    println!("   Submitted:  {}", metrics.submitted());
    println!("   Delivered:  {}", metrics.records_delivered());
    println!("   Rejected:   {}", metrics.records_rejected());
    println!("   Lost:       {}", metrics.records_lost());
    println!("   Dropped:    {} ({:.2}%)", metrics.dropped_count(), metrics.drop_rate());

    println!("\n=== Example completed ===");
    Ok(())
}
