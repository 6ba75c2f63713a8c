//! World-state accessor pair.
//!
//! The kernel never mutates game state directly. The host owns an opaque,
//! versioned snapshot and hands the kernel two operations: read the current
//! snapshot, and install a replacement wholesale. There is no partial update
//! path; plugins compute a new snapshot from the current one and commit it.
//!
//! The commit model is copy-on-write with a single logical writer per turn.
//! Two synchronous handlers committing in the same turn resolve by
//! last-write-wins in call order; the kernel does not arbitrate that race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

/// The opaque, versioned state value owned by the host.
pub type Snapshot = serde_json::Value;

/// Read/replace access to the host's world snapshot.
///
/// Invariant: `commit` installs the new snapshot atomically from the
/// perspective of all currently-running synchronous handlers; a `get` either
/// sees the old snapshot or the new one, never a mix.
pub trait StateAccessor: Send + Sync {
    /// Returns an owned copy of the current snapshot.
    fn get(&self) -> Snapshot;

    /// Replaces the snapshot wholesale. `reason` is a free-form label for
    /// diagnostics ("combat resolved", "autosave", ...).
    fn commit(&self, next: Snapshot, reason: &str);
}

/// Default in-memory state holder used by the host.
pub struct SharedState {
    snapshot: RwLock<Snapshot>,
    commits: AtomicU64,
}

impl SharedState {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(initial),
            commits: AtomicU64::new(0),
        }
    }

    /// Number of commits installed since creation.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl StateAccessor for SharedState {
    fn get(&self) -> Snapshot {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    fn commit(&self, next: Snapshot, reason: &str) {
        {
            let mut guard = match self.snapshot.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = next;
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("💾 State committed: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commit_replaces_snapshot_wholesale() {
        let state = SharedState::new(json!({ "gold": 10, "zone": "keep" }));

        state.commit(json!({ "gold": 25 }), "test");

        // The old "zone" field is gone: commits replace, they never merge.
        assert_eq!(state.get(), json!({ "gold": 25 }));
        assert_eq!(state.commit_count(), 1);
    }

    #[test]
    fn get_returns_an_owned_copy() {
        let state = SharedState::new(json!({ "gold": 1 }));
        let mut copy = state.get();
        copy["gold"] = json!(999);

        assert_eq!(state.get(), json!({ "gold": 1 }));
    }
}
