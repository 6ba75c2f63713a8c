//! Graph-based versioned state migration.
//!
//! Save formats change; the registry records how. Each registered edge is a
//! pure transform from one version label to another, and the registry is a
//! directed multigraph over free-form labels. Migrating a snapshot resolves
//! the shortest edge sequence with breadth-first search (ties broken by
//! registration order) and applies it step by step.
//!
//! Migration is the one part of the kernel that fails loudly: an unreachable
//! target version or an edge producing an invalid snapshot aborts the whole
//! call with the failing edge identified. A partially-migrated snapshot is
//! never returned; callers must treat any error as "do not load this state".
//!
//! The BFS keeps an explicit visited-node ceiling ([`MigrationConfig`]) so a
//! pathological or adversarial version graph has defined worst-case behavior.

use crate::error::MigrationError;
use crate::state::Snapshot;
use crate::utils::{current_timestamp_ms, panic_message};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Pure transform from one snapshot shape to the next.
pub type MigrationFn = Arc<dyn Fn(Snapshot) -> Result<Snapshot, MigrationError> + Send + Sync>;

struct MigrationEdge {
    from: String,
    to: String,
    transform: MigrationFn,
}

/// Tuning knobs for path resolution.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Ceiling on nodes visited during one BFS. Exceeding it fails the
    /// migration with [`MigrationError::TraversalCeiling`].
    pub max_visited: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self { max_visited: 10_000 }
    }
}

/// One completed or failed migration call, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReportEntry {
    pub timestamp_ms: u64,
    pub from: String,
    pub to: String,
    /// Version labels actually traversed, endpoints included
    pub path: Vec<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Registry of migration edges with BFS path resolution.
pub struct MigrationRegistry {
    edges: RwLock<Vec<MigrationEdge>>,
    config: MigrationConfig,
    report: Mutex<Vec<MigrationReportEntry>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    pub fn with_config(config: MigrationConfig) -> Self {
        Self {
            edges: RwLock::new(Vec::new()),
            config,
            report: Mutex::new(Vec::new()),
        }
    }

    /// Registers an edge. Multiple edges may leave the same version; the
    /// earliest-registered edge wins ties between equal-length paths.
    pub fn register<F>(&self, from: impl Into<String>, to: impl Into<String>, transform: F)
    where
        F: Fn(Snapshot) -> Result<Snapshot, MigrationError> + Send + Sync + 'static,
    {
        let from = from.into();
        let to = to.into();
        debug!("🗺️ Registered migration edge `{from}` -> `{to}`");
        let mut guard = match self.edges.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(MigrationEdge {
            from,
            to,
            transform: Arc::new(transform),
        });
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        let guard = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.len()
    }

    /// Migrates a snapshot from one version label to another.
    ///
    /// Identical labels return a copy of the input with zero edge
    /// applications. On any failure the input is left untouched and the
    /// error names the failing edge.
    pub fn migrate_state(
        &self,
        snapshot: &Snapshot,
        from: &str,
        to: &str,
    ) -> Result<Snapshot, MigrationError> {
        if from == to {
            self.record(from, to, vec![from.to_string()], true, None);
            return Ok(snapshot.clone());
        }

        let guard = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let path = match find_path(&guard, from, to, self.config.max_visited) {
            Ok(path) => path,
            Err(e) => {
                self.record(from, to, vec![from.to_string()], false, Some(e.to_string()));
                return Err(e);
            }
        };

        let mut labels = vec![from.to_string()];
        let mut current = snapshot.clone();
        for &edge_index in &path {
            let edge = &guard[edge_index];
            current = match apply_edge(edge, current) {
                Ok(next) => next,
                Err(e) => {
                    labels.push(edge.to.clone());
                    self.record(from, to, labels, false, Some(e.to_string()));
                    return Err(e);
                }
            };
            labels.push(edge.to.clone());
        }

        info!(
            "🗺️ Migrated state `{from}` -> `{to}` in {} steps",
            path.len()
        );
        self.record(from, to, labels, true, None);
        Ok(current)
    }

    /// Owned copy of the migration report, oldest first.
    pub fn report(&self) -> Vec<MigrationReportEntry> {
        let guard = match self.report.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    fn record(
        &self,
        from: &str,
        to: &str,
        path: Vec<String>,
        succeeded: bool,
        error: Option<String>,
    ) {
        let mut guard = match self.report.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(MigrationReportEntry {
            timestamp_ms: current_timestamp_ms(),
            from: from.to_string(),
            to: to.to_string(),
            path,
            succeeded,
            error,
        });
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// BFS for the shortest edge sequence from `from` to `to`. Expanding edges
/// in registration order out of a FIFO queue makes the first complete path
/// both shortest and earliest-registered among ties.
fn find_path(
    edges: &[MigrationEdge],
    from: &str,
    to: &str,
    max_visited: usize,
) -> Result<Vec<usize>, MigrationError> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut parent: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    visited.insert(from);
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            break;
        }
        for (index, edge) in edges.iter().enumerate() {
            if edge.from != current || visited.contains(edge.to.as_str()) {
                continue;
            }
            if visited.len() >= max_visited {
                return Err(MigrationError::TraversalCeiling { limit: max_visited });
            }
            visited.insert(&edge.to);
            parent.insert(&edge.to, index);
            queue.push_back(&edge.to);
        }
    }

    if !parent.contains_key(to) {
        return Err(MigrationError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    // Walk parents back from the target to recover the edge sequence.
    let mut path = Vec::new();
    let mut cursor = to;
    while cursor != from {
        let index = parent[cursor];
        path.push(index);
        cursor = &edges[index].from;
    }
    path.reverse();
    Ok(path)
}

/// Applies one edge, converting panics and invalid results into errors that
/// name the edge.
fn apply_edge(edge: &MigrationEdge, snapshot: Snapshot) -> Result<Snapshot, MigrationError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| (edge.transform)(snapshot)));
    let result = match outcome {
        Ok(result) => result,
        Err(panic_info) => {
            return Err(MigrationError::EdgeFailed {
                from: edge.from.clone(),
                to: edge.to.clone(),
                message: panic_message(panic_info),
            })
        }
    };
    match result {
        Ok(next) if next.is_null() => Err(MigrationError::InvalidResult {
            from: edge.from.clone(),
            to: edge.to.clone(),
        }),
        Ok(next) => Ok(next),
        Err(e) => Err(MigrationError::EdgeFailed {
            from: edge.from.clone(),
            to: edge.to.clone(),
            message: e.to_string(),
        }),
    }
}
