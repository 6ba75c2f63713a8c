//! Synchronous publish/subscribe event bus with a bounded trace.
//!
//! Dispatch is fully synchronous: `emit` drains every subscriber registered
//! for the event name before it returns, in subscription order, and nothing
//! is ever queued across turns of the host loop. A handler that fails (or
//! panics) is caught, recorded in the engine error log, and delivery
//! continues to the remaining subscribers.
//!
//! Every emit is appended to a bounded trace ring regardless of handler
//! outcomes. The trace is diagnostics-only; it is never replayed.
//!
//! Event names are free-form non-empty strings. By convention they are
//! colon-namespaced (`combat:resolved`, `engine:tick`), but the bus does not
//! enforce any schema and promises no ordering between different names.

use crate::error::EventError;
use crate::trace::{ErrorLog, ErrorOrigin, RingBuffer};
use crate::utils::{current_timestamp_ms, panic_message};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// One emitted event, as retained in the trace ring.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Monotonic across the life of the bus, never reused
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub name: String,
    pub payload: Value,
}

/// Opaque handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type HandlerFn = Arc<dyn Fn(&Value) -> Result<(), EventError> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriberId,
    label: String,
    handler: HandlerFn,
}

/// Synchronous publish/subscribe bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    trace: Mutex<RingBuffer<EventRecord>>,
    sequence: AtomicU64,
    next_subscriber: AtomicU64,
    errors: Arc<ErrorLog>,
}

impl EventBus {
    /// Creates a bus whose trace retains at most `trace_capacity` records.
    pub fn new(trace_capacity: usize, errors: Arc<ErrorLog>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            trace: Mutex::new(RingBuffer::new(trace_capacity)),
            sequence: AtomicU64::new(0),
            next_subscriber: AtomicU64::new(0),
            errors,
        }
    }

    /// Subscribes a raw handler to `name`. Handlers for one name run in
    /// subscription order.
    pub fn on<F>(&self, name: &str, handler: F) -> Result<SubscriberId, EventError>
    where
        F: Fn(&Value) -> Result<(), EventError> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(EventError::EmptyName);
        }
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::SeqCst));
        let subscriber = Subscriber {
            id,
            label: format!("{name}#{id}"),
            handler: Arc::new(handler),
        };
        let mut guard = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(name.to_string()).or_default().push(subscriber);
        debug!("📝 Subscribed {id} to `{name}`");
        Ok(id)
    }

    /// Subscribes a typed handler: the payload is deserialized to `T` before
    /// the handler runs. A payload that does not match `T` counts as a
    /// handler failure and does not stop delivery to other subscribers.
    pub fn on_typed<T, F>(&self, name: &str, handler: F) -> Result<SubscriberId, EventError>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.on(name, move |payload| {
            let typed: T = serde_json::from_value(payload.clone())
                .map_err(|e| EventError::DeserializationFailed(e.to_string()))?;
            handler(typed)
        })
    }

    /// Removes one subscriber from `name`. Returns `false` if the id was not
    /// subscribed there.
    pub fn off(&self, name: &str, id: SubscriberId) -> bool {
        let mut guard = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(list) = guard.get_mut(name) {
            let before = list.len();
            list.retain(|s| s.id != id);
            let removed = list.len() < before;
            if list.is_empty() {
                guard.remove(name);
            }
            return removed;
        }
        false
    }

    /// Emits an event: appends it to the trace, then synchronously delivers
    /// the payload to every current subscriber of `name` in subscription
    /// order. Handler failures and panics are recorded and swallowed.
    ///
    /// Returns the trace record for the emit.
    pub fn emit(&self, name: &str, payload: Value) -> Result<EventRecord, EventError> {
        if name.is_empty() {
            return Err(EventError::EmptyName);
        }

        let record = EventRecord {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp_ms: current_timestamp_ms(),
            name: name.to_string(),
            payload,
        };

        // Traced before dispatch so a handler crash can never hide the event.
        {
            let mut guard = match self.trace.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.push(record.clone());
        }

        // Snapshot the subscriber list and release the lock before invoking
        // anything, so handlers can subscribe, unsubscribe, and re-emit.
        let subscribers: Vec<Subscriber> = {
            let guard = match self.subscribers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.get(name).cloned().unwrap_or_default()
        };

        if subscribers.is_empty() {
            trace!("📤 Emitted `{name}` (no subscribers)");
            return Ok(record);
        }

        trace!("📤 Emitting `{name}` to {} subscribers", subscribers.len());
        for subscriber in &subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(&record.payload)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.errors.record(
                    ErrorOrigin::EventHandler {
                        event: name.to_string(),
                        handler: subscriber.label.clone(),
                    },
                    e.to_string(),
                ),
                Err(panic_info) => self.errors.record(
                    ErrorOrigin::EventHandler {
                        event: name.to_string(),
                        handler: subscriber.label.clone(),
                    },
                    panic_message(panic_info),
                ),
            }
        }

        Ok(record)
    }

    /// Serializes `payload` and emits it under `name`.
    pub fn emit_typed<T: Serialize>(&self, name: &str, payload: &T) -> Result<EventRecord, EventError> {
        let value = serde_json::to_value(payload)?;
        self.emit(name, value)
    }

    /// Owned copy of the trace ring, oldest first.
    pub fn trace(&self) -> Vec<EventRecord> {
        let guard = match self.trace.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.snapshot()
    }

    /// Number of subscribers currently registered for `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        let guard = match self.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(name).map(Vec::len).unwrap_or(0)
    }
}
