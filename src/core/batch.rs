//! Draining the queue into bulk batches
//!
//! The first draw of a batch waits; later draws only take what is already
//! queued, so a batch is whatever accumulated while the previous request
//! was in flight, capped at `max_items`. Seeing the close sentinel ends the
//! batch at once and marks it as the last one of the run.

use super::error::TemplateError;
use super::queue::{BoundedQueue, QueueSlot};
use super::record::Record;
use super::template::Template;
use serde_json::json;

/// One index action: routing metadata plus the document body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAction {
    pub index: String,
    pub doc_type: Option<String>,
    /// Single-line JSON document
    pub document: String,
}

impl BulkAction {
    /// Metadata line, e.g. `{"index":{"_index":"log-2025","_type":"app"}}`
    pub fn metadata_line(&self) -> String {
        let meta = match &self.doc_type {
            Some(doc_type) => json!({"index": {"_index": self.index, "_type": doc_type}}),
            None => json!({"index": {"_index": self.index}}),
        };
        meta.to_string()
    }
}

/// Newline-delimited request body for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPayload {
    body: String,
    records: usize,
}

impl BulkPayload {
    pub fn from_actions(actions: &[BulkAction]) -> Self {
        let mut body = String::new();
        for action in actions {
            body.push_str(&action.metadata_line());
            body.push('\n');
            body.push_str(&action.document);
            body.push('\n');
        }
        Self {
            body,
            records: actions.len(),
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Ordered group of actions sent in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    actions: Vec<BulkAction>,
    closed: bool,
}

impl Batch {
    pub fn new(actions: Vec<BulkAction>, closed: bool) -> Self {
        Self { actions, closed }
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The close sentinel was seen while building this batch.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn payload(&self) -> BulkPayload {
        BulkPayload::from_actions(&self.actions)
    }
}

/// Iterator over the records of one batch
///
/// Yields `first` (if it is a record) and then whatever `try_dequeue`
/// returns, stopping at `max_items`, an empty queue, or the sentinel.
pub struct Drain<'q> {
    queue: &'q BoundedQueue<Record>,
    first: Option<QueueSlot<Record>>,
    remaining: usize,
    closed: bool,
}

impl<'q> Drain<'q> {
    pub fn new(queue: &'q BoundedQueue<Record>, first: QueueSlot<Record>, max_items: usize) -> Self {
        Self {
            queue,
            first: Some(first),
            remaining: max_items.max(1),
            closed: false,
        }
    }

    /// Whether the sentinel ended this drain
    pub fn saw_close(&self) -> bool {
        self.closed
    }
}

impl Iterator for Drain<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.closed || self.remaining == 0 {
            return None;
        }
        let slot = match self.first.take() {
            Some(slot) => slot,
            None => self.queue.try_dequeue()?,
        };
        match slot {
            QueueSlot::Item(record) => {
                self.remaining -= 1;
                Some(record)
            }
            QueueSlot::Close => {
                self.closed = true;
                None
            }
        }
    }
}

/// Turns queued records into routed bulk batches
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    index: Template,
    doc_type: Option<Template>,
    max_items: usize,
}

impl BatchBuilder {
    pub fn new(index: Template, doc_type: Option<Template>, max_items: usize) -> Self {
        Self {
            index,
            doc_type,
            max_items: max_items.max(1),
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Build the next batch, blocking for its first record.
    pub fn build(
        &self,
        queue: &BoundedQueue<Record>,
        on_unroutable: impl FnMut(TemplateError, &Record),
    ) -> Batch {
        let first = queue.dequeue_blocking();
        self.build_from(first, queue, on_unroutable)
    }

    /// Build the next batch from an already dequeued first slot.
    ///
    /// Records whose index or doctype cannot be rendered are handed to
    /// `on_unroutable` and left out of the batch.
    pub fn build_from(
        &self,
        first: QueueSlot<Record>,
        queue: &BoundedQueue<Record>,
        mut on_unroutable: impl FnMut(TemplateError, &Record),
    ) -> Batch {
        let mut drain = Drain::new(queue, first, self.max_items);
        let mut actions = Vec::new();
        for record in drain.by_ref() {
            match self.action(&record) {
                Ok(action) => actions.push(action),
                Err(e) => on_unroutable(e, &record),
            }
        }
        Batch::new(actions, drain.saw_close())
    }

    /// Route and serialize a single record.
    pub fn action(&self, record: &Record) -> Result<BulkAction, TemplateError> {
        let index = self.index.render(record)?;
        let doc_type = match &self.doc_type {
            Some(template) => Some(template.render(record)?),
            None => None,
        };
        Ok(BulkAction {
            index,
            doc_type,
            document: record.to_json(),
        })
    }
}
