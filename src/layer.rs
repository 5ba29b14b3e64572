//! `tracing` integration
//!
//! [`ShipperLayer`] turns every `tracing` event into an [`Event`] and
//! submits it to a shared [`Handler`]. Span data is not forwarded, and
//! events raised on a delivery thread are skipped so the pipeline never
//! ships its own activity.

use crate::core::{on_delivery_thread, Event, FieldValue, Handler, LogLevel};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer feeding a [`Handler`]
///
/// ```no_run
/// use bulk_log_shipper::layer::ShipperLayer;
/// use bulk_log_shipper::prelude::*;
/// use std::sync::Arc;
/// use tracing_subscriber::prelude::*;
///
/// let handler = Arc::new(Handler::builder().index("app").build().unwrap());
/// tracing_subscriber::registry()
///     .with(ShipperLayer::new(Arc::clone(&handler)).with_min_level(LogLevel::Info))
///     .init();
///
/// tracing::info!(user = "alice", "logged in");
/// handler.close();
/// ```
pub struct ShipperLayer {
    handler: Arc<Handler>,
    min_level: LogLevel,
}

impl ShipperLayer {
    pub fn new(handler: Arc<Handler>) -> Self {
        Self {
            handler,
            min_level: LogLevel::Trace,
        }
    }

    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

impl<S> Layer<S> for ShipperLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if on_delivery_thread() {
            return;
        }
        let meta = event.metadata();
        let level = level_of(meta.level());
        if level < self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut shipped = Event::new(level, visitor.message.unwrap_or_default())
            .with_attribute("target", meta.target());
        if let Some(module) = meta.module_path() {
            shipped = shipped.with_attribute("module_path", module);
        }
        if let Some(file) = meta.file() {
            shipped = shipped.with_attribute("file", file);
        }
        if let Some(line) = meta.line() {
            shipped = shipped.with_attribute("line", line);
        }
        for (name, value) in visitor.fields {
            shipped = shipped.with_attribute(name, value);
        }

        self.handler.submit(&shipped);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, FieldValue)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: FieldValue) {
        self.fields.push((field.name().to_string(), value));
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.push(field, text.into());
        }
    }
}
