//! Command dispatch pipeline with middleware and replay.
//!
//! Commands are the "do something" half of the kernel, next to the event
//! bus's "something happened" half. Each dispatch runs the command through an
//! ordered middleware chain: every middleware receives the dispatch context
//! and a [`Next`] token it must invoke to continue the chain. Not invoking
//! `next` short-circuits the remaining middleware, which is how validation
//! middleware denies a command.
//!
//! A middleware that fails or panics is caught, recorded in the error log,
//! and the chain continues from the next middleware. This matches the
//! long-standing dispatch semantics the game shipped with: one misbehaving
//! middleware must not block the others, even at the cost of partial effects.
//!
//! Commands are permissive by design: a command arriving without a type is
//! coerced to the sentinel [`UNKNOWN_COMMAND_KIND`] rather than rejected, so
//! malformed traffic still shows up in diagnostics. After the chain completes
//! (or short-circuits) the entry lands in a bounded replay tape and a
//! `command:dispatched` event is emitted.

use crate::error::CommandError;
use crate::event::EventBus;
use crate::state::{Snapshot, StateAccessor};
use crate::trace::{ErrorLog, ErrorOrigin, RingBuffer};
use crate::utils::{current_timestamp_ms, panic_message};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// Sentinel type assigned to commands dispatched without one.
pub const UNKNOWN_COMMAND_KIND: &str = "UNKNOWN";

/// Meta key used to tag replayed entries.
const REPLAY_META_KEY: &str = "replay";

/// A typed command. `payload` and `meta` are free-form; middleware that knows
/// a command's shape deserializes the payload, everything else treats it as
/// opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Command type, e.g. `bank:deposit`. Empty means unknown.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub meta: Value,
}

impl Command {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
            meta: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Whether this command is a replay of a logged entry.
    pub fn is_replay(&self) -> bool {
        self.meta
            .get(REPLAY_META_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// One dispatched command, as retained in the replay tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEntry {
    pub timestamp_ms: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub meta: Value,
}

impl CommandEntry {
    pub fn is_replay(&self) -> bool {
        self.meta
            .get(REPLAY_META_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Dispatch context handed to each middleware.
pub struct CommandContext<'a> {
    pub command: &'a Command,
    state: &'a Arc<dyn StateAccessor>,
    events: &'a Arc<EventBus>,
}

impl CommandContext<'_> {
    /// Current world snapshot.
    pub fn get_state(&self) -> Snapshot {
        self.state.get()
    }

    /// Commits a replacement snapshot.
    pub fn commit(&self, next: Snapshot, reason: &str) {
        self.state.commit(next, reason);
    }

    /// Emits an event through the shared bus.
    pub fn emit(&self, name: &str, payload: Value) -> Result<(), CommandError> {
        self.events
            .emit(name, payload)
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
        Ok(())
    }
}

/// Continuation token. A middleware that wants the chain to keep going must
/// call [`Next::invoke`]; returning without doing so short-circuits the rest.
pub struct Next {
    invoked: bool,
}

impl Next {
    fn new() -> Self {
        Self { invoked: false }
    }

    /// Continue to the next middleware after this one returns.
    pub fn invoke(&mut self) {
        self.invoked = true;
    }
}

/// A command middleware stage.
pub trait Middleware: Send + Sync {
    /// Name used in diagnostics when this middleware fails.
    fn name(&self) -> &str;

    fn handle(&self, ctx: &CommandContext<'_>, next: &mut Next) -> Result<(), CommandError>;
}

/// Closure-backed middleware for the common case.
struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&CommandContext<'_>, &mut Next) -> Result<(), CommandError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, ctx: &CommandContext<'_>, next: &mut Next) -> Result<(), CommandError> {
        (self.f)(ctx, next)
    }
}

/// Ordered middleware chain plus bounded replay tape.
pub struct CommandBus {
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    log: Mutex<RingBuffer<CommandEntry>>,
    state: Arc<dyn StateAccessor>,
    events: Arc<EventBus>,
    errors: Arc<ErrorLog>,
}

impl CommandBus {
    pub fn new(
        log_capacity: usize,
        state: Arc<dyn StateAccessor>,
        events: Arc<EventBus>,
        errors: Arc<ErrorLog>,
    ) -> Self {
        Self {
            middleware: RwLock::new(Vec::new()),
            log: Mutex::new(RingBuffer::new(log_capacity)),
            state,
            events,
            errors,
        }
    }

    /// Appends a middleware stage to the chain. Stages run in installation
    /// order on every dispatch.
    pub fn install(&self, middleware: Arc<dyn Middleware>) {
        let mut guard = match self.middleware.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!("🔗 Installed middleware `{}`", middleware.name());
        guard.push(middleware);
    }

    /// Appends a closure-backed middleware stage.
    pub fn install_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&CommandContext<'_>, &mut Next) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.install(Arc::new(FnMiddleware {
            name: name.into(),
            f,
        }));
    }

    /// Dispatches one command through the live middleware chain, logs the
    /// entry, and emits `command:dispatched`. Returns the logged entry.
    pub fn dispatch(&self, command: Command) -> CommandEntry {
        let mut command = command;
        if command.kind.is_empty() {
            command.kind = UNKNOWN_COMMAND_KIND.to_string();
        }

        let chain: Vec<Arc<dyn Middleware>> = {
            let guard = match self.middleware.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.clone()
        };

        trace!(
            "🎯 Dispatching `{}` through {} middleware",
            command.kind,
            chain.len()
        );

        let ctx = CommandContext {
            command: &command,
            state: &self.state,
            events: &self.events,
        };

        for middleware in &chain {
            let mut next = Next::new();
            let outcome = catch_unwind(AssertUnwindSafe(|| middleware.handle(&ctx, &mut next)));
            match outcome {
                Ok(Ok(())) => {
                    if !next.invoked {
                        trace!("✋ Middleware `{}` short-circuited the chain", middleware.name());
                        break;
                    }
                }
                // A failing middleware is skipped, not fatal: the chain keeps
                // running from the next stage.
                Ok(Err(e)) => self.errors.record(
                    ErrorOrigin::Middleware {
                        name: middleware.name().to_string(),
                    },
                    e.to_string(),
                ),
                Err(panic_info) => self.errors.record(
                    ErrorOrigin::Middleware {
                        name: middleware.name().to_string(),
                    },
                    panic_message(panic_info),
                ),
            }
        }

        let entry = CommandEntry {
            timestamp_ms: current_timestamp_ms(),
            kind: command.kind.clone(),
            payload: command.payload.clone(),
            meta: command.meta.clone(),
        };

        {
            let mut guard = match self.log.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.push(entry.clone());
        }

        if let Err(e) = self.events.emit(
            "command:dispatched",
            json!({
                "type": entry.kind,
                "replay": entry.is_replay(),
                "timestamp_ms": entry.timestamp_ms,
            }),
        ) {
            debug!("command:dispatched emission failed: {e}");
        }

        entry
    }

    /// Owned copy of the replay tape, oldest first.
    pub fn log(&self) -> Vec<CommandEntry> {
        let guard = match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.snapshot()
    }

    /// Re-dispatches the given entries (or the stored tape when `None`)
    /// through the current middleware chain, in original order. Each replayed
    /// command's meta is tagged with `replay: true` so middleware can
    /// suppress side effects it only wants on live traffic.
    pub fn replay(&self, entries: Option<Vec<CommandEntry>>) -> Vec<CommandEntry> {
        let tape = entries.unwrap_or_else(|| self.log());
        debug!("🔁 Replaying {} command entries", tape.len());

        tape.into_iter()
            .map(|entry| {
                let meta = tag_replay(entry.meta);
                self.dispatch(Command {
                    kind: entry.kind,
                    payload: entry.payload,
                    meta,
                })
            })
            .collect()
    }
}

/// Sets `replay: true` on the meta value, preserving existing meta fields.
/// Non-object meta is wrapped so the original value survives under
/// `"original"`.
fn tag_replay(meta: Value) -> Value {
    match meta {
        Value::Object(mut map) => {
            map.insert(REPLAY_META_KEY.to_string(), Value::Bool(true));
            Value::Object(map)
        }
        Value::Null => json!({ REPLAY_META_KEY: true }),
        other => json!({ REPLAY_META_KEY: true, "original": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    fn bus(log_capacity: usize) -> (CommandBus, Arc<ErrorLog>, Arc<EventBus>) {
        let errors = Arc::new(ErrorLog::new(32));
        let events = Arc::new(EventBus::new(32, errors.clone()));
        let state: Arc<dyn StateAccessor> = Arc::new(SharedState::new(json!({})));
        (
            CommandBus::new(log_capacity, state, events.clone(), errors.clone()),
            errors,
            events,
        )
    }

    #[test]
    fn dispatch_logs_one_well_formed_entry() {
        let (bus, _, _) = bus(8);
        bus.dispatch(Command::new("T").with_payload(json!(1)));

        let log = bus.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, "T");
        assert_eq!(log[0].payload, json!(1));
        assert!(log[0].timestamp_ms > 0);
    }

    #[test]
    fn missing_type_is_coerced_to_unknown() {
        let (bus, _, _) = bus(8);
        let entry = bus.dispatch(Command::new("").with_payload(json!({ "raw": true })));
        assert_eq!(entry.kind, UNKNOWN_COMMAND_KIND);
        assert_eq!(bus.log()[0].kind, UNKNOWN_COMMAND_KIND);
    }

    #[test]
    fn log_evicts_oldest_first_at_capacity() {
        let (bus, _, _) = bus(300);
        for n in 0..301 {
            bus.dispatch(Command::new("tick").with_payload(json!(n)));
        }
        let log = bus.log();
        assert_eq!(log.len(), 300);
        assert_eq!(log[0].payload, json!(1));
        assert_eq!(log[299].payload, json!(300));
    }

    #[test]
    fn middleware_runs_in_installation_order() {
        let (bus, _, _) = bus(8);
        let order = Arc::new(StdMutex::new(Vec::new()));

        for name in ["validate", "apply", "notify"] {
            let order = order.clone();
            bus.install_fn(name, move |_ctx, next| {
                order.lock().unwrap().push(name);
                next.invoke();
                Ok(())
            });
        }

        bus.dispatch(Command::new("T"));
        assert_eq!(*order.lock().unwrap(), vec!["validate", "apply", "notify"]);
    }

    #[test]
    fn omitting_next_short_circuits_but_still_logs() {
        let (bus, _, _) = bus(8);
        let reached = Arc::new(AtomicU64::new(0));

        bus.install_fn("deny", |ctx, next| {
            if ctx.command.kind == "forbidden" {
                return Ok(()); // no next.invoke(): chain stops here
            }
            next.invoke();
            Ok(())
        });
        let reached_inner = reached.clone();
        bus.install_fn("apply", move |_ctx, next| {
            reached_inner.fetch_add(1, Ordering::SeqCst);
            next.invoke();
            Ok(())
        });

        bus.dispatch(Command::new("forbidden"));
        bus.dispatch(Command::new("allowed"));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(bus.log().len(), 2);
    }

    #[test]
    fn failing_middleware_does_not_block_the_rest() {
        let (bus, errors, _) = bus(8);
        let reached = Arc::new(AtomicU64::new(0));

        bus.install_fn("broken", |_ctx, _next| -> Result<(), CommandError> {
            panic!("middleware down")
        });
        let reached_inner = reached.clone();
        bus.install_fn("apply", move |_ctx, next| {
            reached_inner.fetch_add(1, Ordering::SeqCst);
            next.invoke();
            Ok(())
        });

        bus.dispatch(Command::new("T"));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        let records = errors.snapshot();
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].origin,
            ErrorOrigin::Middleware { ref name } if name == "broken"
        ));
    }

    #[test]
    fn middleware_can_commit_state() {
        let errors = Arc::new(ErrorLog::new(8));
        let events = Arc::new(EventBus::new(8, errors.clone()));
        let shared = Arc::new(SharedState::new(json!({ "count": 0 })));
        let state: Arc<dyn StateAccessor> = shared.clone();
        let bus = CommandBus::new(8, state, events, errors);

        bus.install_fn("counter", |ctx, next| {
            let mut snapshot = ctx.get_state();
            let count = snapshot["count"].as_u64().unwrap_or(0);
            snapshot["count"] = json!(count + 1);
            ctx.commit(snapshot, "counter middleware");
            next.invoke();
            Ok(())
        });

        bus.dispatch(Command::new("inc"));
        bus.dispatch(Command::new("inc"));
        assert_eq!(shared.get()["count"], json!(2));
    }

    #[test]
    fn dispatch_emits_telemetry_event() {
        let (bus, _, events) = bus(8);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_inner = seen.clone();
        events
            .on("command:dispatched", move |payload| {
                seen_inner
                    .lock()
                    .unwrap()
                    .push(payload["type"].as_str().unwrap_or("?").to_string());
                Ok(())
            })
            .unwrap();

        bus.dispatch(Command::new("bank:deposit"));
        assert_eq!(*seen.lock().unwrap(), vec!["bank:deposit".to_string()]);
    }

    #[test]
    fn replay_redispatches_in_order_with_replay_tag() {
        let (bus, _, _) = bus(16);
        let replay_flags = Arc::new(StdMutex::new(Vec::new()));
        let flags_inner = replay_flags.clone();
        bus.install_fn("observe", move |ctx, next| {
            flags_inner
                .lock()
                .unwrap()
                .push((ctx.command.kind.clone(), ctx.command.is_replay()));
            next.invoke();
            Ok(())
        });

        bus.dispatch(Command::new("a"));
        bus.dispatch(Command::new("b").with_meta(json!({ "who": "tester" })));

        let live_log = bus.log();
        let replayed = bus.replay(Some(live_log));
        assert_eq!(replayed.len(), 2);
        assert!(replayed.iter().all(CommandEntry::is_replay));
        // Existing meta fields survive the tag.
        assert_eq!(replayed[1].meta["who"], json!("tester"));

        let flags = replay_flags.lock().unwrap();
        assert_eq!(
            *flags,
            vec![
                ("a".to_string(), false),
                ("b".to_string(), false),
                ("a".to_string(), true),
                ("b".to_string(), true),
            ]
        );
    }

    #[test]
    fn command_wire_shape_uses_type_field() {
        let command: Command =
            serde_json::from_value(json!({ "type": "quest:accept", "payload": { "id": 9 } }))
                .unwrap();
        assert_eq!(command.kind, "quest:accept");

        // Absent type deserializes to empty and is coerced on dispatch.
        let command: Command = serde_json::from_value(json!({ "payload": 1 })).unwrap();
        assert_eq!(command.kind, "");
    }
}
