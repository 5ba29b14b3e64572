//! What `submit` does when the queue is at capacity

use std::fmt;
use std::time::Duration;

/// Policy for handling a full queue
///
/// # Example
///
/// ```
/// use bulk_log_shipper::OverflowPolicy;
/// use std::time::Duration;
///
/// // Default behavior: report and drop
/// let policy = OverflowPolicy::default();
/// assert_eq!(policy, OverflowPolicy::Drop);
///
/// // Backpressure the caller for at most 50ms, then drop
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Reject the new record and emit a diagnostic. The caller never waits.
    #[default]
    Drop,

    /// Wait until the delivery thread frees a slot.
    ///
    /// No record is lost, at the cost of stalling the logging call site
    /// while the endpoint is slow.
    Block,

    /// Wait up to the given duration, then drop.
    BlockWithTimeout(Duration),
}

impl OverflowPolicy {
    pub fn may_block(&self) -> bool {
        !matches!(self, OverflowPolicy::Drop)
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Drop => write!(f, "Drop"),
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
        }
    }
}
