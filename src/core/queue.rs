//! Bounded FIFO between producer threads and the delivery thread
//!
//! Backed by a crossbeam bounded channel; the queue keeps both ends so the
//! channel never disconnects while the queue is alive. Every push and pop
//! is atomic with respect to all other threads.

use super::error::QueueFull;
use super::shutdown::ShutdownToken;
use crossbeam_channel::{bounded, Receiver, Select, Sender, TrySendError};
use std::time::{Duration, Instant};

/// One queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSlot<T> {
    Item(T),
    /// No more input for the current delivery run
    Close,
}

/// Result of an idle wait on the consumer side
#[derive(Debug, PartialEq, Eq)]
pub enum Wake<T> {
    Slot(QueueSlot<T>),
    Timeout,
    Cancelled,
}

/// Thread-safe FIFO with fixed capacity
#[derive(Debug)]
pub struct BoundedQueue<T> {
    sender: Sender<QueueSlot<T>>,
    receiver: Receiver<QueueSlot<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.receiver.is_full()
    }

    /// Push an item.
    ///
    /// Non-blocking mode fails with [`QueueFull`] immediately when at
    /// capacity. Blocking mode waits for a free slot.
    pub fn enqueue(&self, item: T, blocking: bool) -> Result<(), QueueFull<T>> {
        if blocking {
            return self
                .sender
                .send(QueueSlot::Item(item))
                .map_err(|e| QueueFull(unwrap_item(e.into_inner())));
        }
        match self.sender.try_send(QueueSlot::Item(item)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(slot)) | Err(TrySendError::Disconnected(slot)) => {
                Err(QueueFull(unwrap_item(slot)))
            }
        }
    }

    /// Blocking push that gives up at `deadline` or as soon as any of
    /// `signals` is cancelled, whichever happens first. `None` waits without
    /// a deadline.
    pub fn enqueue_until(
        &self,
        item: T,
        signals: &[&ShutdownToken],
        deadline: Option<Instant>,
    ) -> Result<(), QueueFull<T>> {
        if signals.iter().any(|signal| signal.is_cancelled()) {
            return Err(QueueFull(item));
        }

        let mut select = Select::new();
        let send_index = select.send(&self.sender);
        for signal in signals {
            select.recv(signal.signal());
        }

        let selected = match deadline {
            Some(deadline) => match select.select_deadline(deadline) {
                Ok(selected) => selected,
                Err(_) => return Err(QueueFull(item)),
            },
            None => select.select(),
        };

        let index = selected.index();
        if index == send_index {
            return selected
                .send(&self.sender, QueueSlot::Item(item))
                .map_err(|e| QueueFull(unwrap_item(e.into_inner())));
        }
        // Signals were registered right after the send operation
        let _ = selected.recv(signals[index - send_index - 1].signal());
        Err(QueueFull(item))
    }

    /// Wait for the next entry.
    pub fn dequeue_blocking(&self) -> QueueSlot<T> {
        self.receiver.recv().unwrap_or(QueueSlot::Close)
    }

    /// Take the next entry if one is ready.
    pub fn try_dequeue(&self) -> Option<QueueSlot<T>> {
        self.receiver.try_recv().ok()
    }

    /// Idle wait used by the delivery loop: returns on the next entry, when
    /// `timeout` elapses, or when `token` is cancelled.
    pub fn wait(&self, timeout: Option<Duration>, token: &ShutdownToken) -> Wake<T> {
        let mut select = Select::new();
        let recv_index = select.recv(&self.receiver);
        select.recv(token.signal());

        let selected = match timeout {
            Some(timeout) => match select.select_timeout(timeout) {
                Ok(selected) => selected,
                Err(_) => return Wake::Timeout,
            },
            None => select.select(),
        };

        if selected.index() == recv_index {
            match selected.recv(&self.receiver) {
                Ok(slot) => Wake::Slot(slot),
                Err(_) => Wake::Slot(QueueSlot::Close),
            }
        } else {
            let _ = selected.recv(token.signal());
            Wake::Cancelled
        }
    }

    /// Enqueue the close sentinel, waiting for room.
    pub fn close(&self) {
        let _ = self.sender.send(QueueSlot::Close);
    }

    /// Enqueue the close sentinel, waiting at most `timeout` for room.
    pub fn close_timeout(&self, timeout: Duration) -> bool {
        self.sender.send_timeout(QueueSlot::Close, timeout).is_ok()
    }
}

fn unwrap_item<T>(slot: QueueSlot<T>) -> T {
    match slot {
        QueueSlot::Item(item) => item,
        QueueSlot::Close => unreachable!("only items are pushed through enqueue"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.enqueue(i, false).unwrap();
        }
        for i in 0..4 {
            assert_eq!(queue.try_dequeue(), Some(QueueSlot::Item(i)));
        }
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_non_blocking_enqueue_on_full_queue() {
        let queue = BoundedQueue::new(2);
        assert!(queue.enqueue("a", false).is_ok());
        assert!(queue.enqueue("b", false).is_ok());
        assert!(queue.is_full());

        let rejected = queue.enqueue("c", false).unwrap_err();
        assert_eq!(rejected.into_inner(), "c");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(1, false).is_ok());
        assert!(queue.enqueue(2, false).is_err());
    }

    #[test]
    fn test_blocking_enqueue_waits_for_space() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.enqueue(1, false).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(2, true))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.dequeue_blocking(), QueueSlot::Item(1));
        assert!(producer.join().unwrap().is_ok());
        assert_eq!(queue.dequeue_blocking(), QueueSlot::Item(2));
    }

    #[test]
    fn test_enqueue_until_times_out() {
        let queue = BoundedQueue::new(1);
        let token = ShutdownToken::new();
        queue.enqueue(1, false).unwrap();

        let deadline = Instant::now() + Duration::from_millis(20);
        let result = queue.enqueue_until(2, &[&token], Some(deadline));
        assert_eq!(result.unwrap_err().into_inner(), 2);
    }

    #[test]
    fn test_enqueue_until_released_by_cancel() {
        let queue = Arc::new(BoundedQueue::new(1));
        let token = ShutdownToken::new();
        queue.enqueue(1, false).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            thread::spawn(move || queue.enqueue_until(2, &[&token], None))
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(producer.join().unwrap().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_enqueue_until_released_by_any_signal() {
        let queue = Arc::new(BoundedQueue::new(1));
        let shutdown = ShutdownToken::new();
        let exited = ShutdownToken::new();
        queue.enqueue(1, false).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            let (shutdown, exited) = (shutdown.clone(), exited.clone());
            thread::spawn(move || queue.enqueue_until(2, &[&shutdown, &exited], None))
        };

        thread::sleep(Duration::from_millis(20));
        exited.cancel();
        assert_eq!(producer.join().unwrap().unwrap_err().into_inner(), 2);
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn test_close_sentinel_follows_items() {
        let queue = BoundedQueue::new(3);
        queue.enqueue("x", false).unwrap();
        queue.close();
        assert_eq!(queue.dequeue_blocking(), QueueSlot::Item("x"));
        assert_eq!(queue.dequeue_blocking(), QueueSlot::Close);
    }

    #[test]
    fn test_close_timeout_on_full_queue() {
        let queue = BoundedQueue::new(1);
        queue.enqueue(1, false).unwrap();
        assert!(!queue.close_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_outcomes() {
        let queue = BoundedQueue::<u8>::new(1);
        let token = ShutdownToken::new();

        assert_eq!(queue.wait(Some(Duration::from_millis(10)), &token), Wake::Timeout);

        queue.enqueue(7, false).unwrap();
        assert_eq!(
            queue.wait(Some(Duration::from_millis(10)), &token),
            Wake::Slot(QueueSlot::Item(7))
        );

        token.cancel();
        assert_eq!(queue.wait(None, &token), Wake::Cancelled);
    }
}
