//! Bounded diagnostic buffers.
//!
//! Every diagnostic surface in the kernel (event trace, command log, error
//! log) is a fixed-capacity, oldest-evicted-first ring. Nothing in these
//! buffers is ever replayed automatically; they exist so a bug report can
//! carry the last few hundred things the engine did.

use crate::utils::current_timestamp_ms;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

/// Fixed-capacity FIFO buffer. Pushing onto a full buffer evicts the oldest
/// entry.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` entries. A capacity of
    /// zero is bumped to one so the buffer always retains the latest entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest if the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns an owned copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Identifies which registration produced an error record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// An event handler threw or returned an error
    EventHandler { event: String, handler: String },
    /// A command middleware threw or returned an error
    Middleware { name: String },
    /// A scheduled callback threw or returned an error
    ScheduledTask { owner: String },
    /// A plugin lifecycle call threw or returned an error
    Plugin { id: String },
}

/// One caught, non-fatal failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp_ms: u64,
    pub origin: ErrorOrigin,
    pub message: String,
}

/// Bounded log of caught failures across the whole engine.
///
/// Components record here instead of propagating: one broken handler should
/// degrade the runtime, not crash it, but the failure must still be visible.
#[derive(Debug)]
pub struct ErrorLog {
    inner: Mutex<RingBuffer<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Records a caught failure and emits a warning for live log streams.
    pub fn record(&self, origin: ErrorOrigin, message: impl Into<String>) {
        let message = message.into();
        warn!("⚠️ Caught failure in {:?}: {}", origin, message);
        let record = ErrorRecord {
            timestamp_ms: current_timestamp_ms(),
            origin,
            message,
        };
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(record);
    }

    /// Returns an owned copy of the recorded failures, oldest first.
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.snapshot()
    }

    pub fn len(&self) -> usize {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_first() {
        let mut buffer = RingBuffer::new(3);
        for n in 0..5 {
            buffer.push(n);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.snapshot(), vec!["b"]);
    }

    #[test]
    fn error_log_bounds_and_orders_records() {
        let log = ErrorLog::new(2);
        log.record(
            ErrorOrigin::Middleware {
                name: "first".to_string(),
            },
            "one",
        );
        log.record(
            ErrorOrigin::Middleware {
                name: "second".to_string(),
            },
            "two",
        );
        log.record(
            ErrorOrigin::ScheduledTask {
                owner: "autosave".to_string(),
            },
            "three",
        );

        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "two");
        assert_eq!(records[1].message, "three");
        assert_eq!(
            records[1].origin,
            ErrorOrigin::ScheduledTask {
                owner: "autosave".to_string()
            }
        );
    }
}
