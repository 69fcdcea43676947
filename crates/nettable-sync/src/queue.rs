//! Blocking transmit queue between batch producers and the writer thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use nettable_core::Message;

/// One flushed batch. Tombstoned slots from the merge buffer travel as
/// `None` and are filtered at encode time, so positions of the surviving
/// messages are preserved end to end. An empty batch is the writer
/// thread's termination signal.
pub type Batch = Vec<Option<Message>>;

/// Multi-producer single-consumer FIFO of message batches.
///
/// Producers are the merge-buffer flush, the handshake bypass path, and
/// the shutdown terminator; the sole consumer is the writer thread.
#[derive(Debug, Default)]
pub struct TransmitQueue {
    inner: Mutex<VecDeque<Batch>>,
    ready: Condvar,
}

impl TransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch and wake the consumer.
    pub fn push(&self, batch: Batch) {
        let mut q = self.inner.lock().unwrap();
        q.push_back(batch);
        self.ready.notify_one();
    }

    /// Block until a batch is available and take it.
    pub fn pop(&self) -> Batch {
        let mut q = self.inner.lock().unwrap();
        loop {
            if let Some(batch) = q.pop_front() {
                return batch;
            }
            q = self.ready.wait(q).unwrap();
        }
    }

    /// Take a batch if one is queued, without blocking.
    pub fn try_pop(&self) -> Option<Batch> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Drop all queued batches.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether no batches are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
