//! Live migration progress tracking.
//!
//! Each migration run gets its own progress handle, keyed by run id, so
//! concurrent runs cannot interleave writes into one shared slot. The
//! registry keeps the most recent run addressable without an id for status
//! pollers that just want "the" migration.
//!
//! Snapshots are lock-free: the engine is the only writer and increments
//! atomics; readers assemble a consistent-enough view at any time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Completed runs retained for status lookup before pruning.
const MAX_RETAINED_RUNS: usize = 16;

/// Point-in-time view of one migration's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub total_records: i64,
    pub migrated_records: i64,
    /// Derived: `round(migrated / total * 100)`, 0 when total is 0.
    pub percentage: i32,
    pub is_complete: bool,
}

impl MigrationProgress {
    /// The zero state a run starts from.
    pub fn zero() -> Self {
        Self {
            total_records: 0,
            migrated_records: 0,
            percentage: 0,
            is_complete: false,
        }
    }
}

/// Writer side of one run's progress. The migration engine holds this; any
/// number of status readers may snapshot it concurrently.
#[derive(Debug)]
pub struct ProgressHandle {
    run_id: Uuid,
    total: AtomicI64,
    migrated: AtomicI64,
    complete: AtomicBool,
}

impl ProgressHandle {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            total: AtomicI64::new(0),
            migrated: AtomicI64::new(0),
            complete: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Set the true total row count, once known.
    pub fn set_total(&self, total: i64) {
        self.total.store(total.max(0), Ordering::Relaxed);
    }

    /// Record one successfully inserted row. Returns the new migrated count.
    pub fn record_row(&self) -> i64 {
        self.migrated.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mark the run complete. Idempotent; returns whether this call was the
    /// transition.
    pub fn finish(&self) -> bool {
        !self.complete.swap(true, Ordering::SeqCst)
    }

    /// Read a snapshot.
    pub fn snapshot(&self) -> MigrationProgress {
        let total = self.total.load(Ordering::Relaxed);
        let migrated = self.migrated.load(Ordering::Relaxed);
        MigrationProgress {
            total_records: total,
            migrated_records: migrated,
            percentage: percentage(migrated, total),
            is_complete: self.complete.load(Ordering::SeqCst),
        }
    }
}

/// `round(migrated / total * 100)`, guarded against a zero total.
fn percentage(migrated: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    ((migrated as f64 / total as f64) * 100.0).round() as i32
}

/// Process-wide registry of migration runs.
#[derive(Default)]
pub struct ProgressRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    runs: HashMap<Uuid, Arc<ProgressHandle>>,
    order: VecDeque<Uuid>,
    latest: Option<Uuid>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new run. The handle starts in the zero state.
    pub fn begin_run(&self) -> Arc<ProgressHandle> {
        let run_id = Uuid::new_v4();
        let handle = Arc::new(ProgressHandle::new(run_id));

        let mut inner = self.inner.lock().expect("progress registry poisoned");
        inner.runs.insert(run_id, handle.clone());
        inner.order.push_back(run_id);
        inner.latest = Some(run_id);

        while inner.order.len() > MAX_RETAINED_RUNS {
            if let Some(old) = inner.order.pop_front() {
                inner.runs.remove(&old);
            }
        }

        handle
    }

    /// Look up a run by id.
    pub fn get(&self, run_id: Uuid) -> Option<Arc<ProgressHandle>> {
        self.inner
            .lock()
            .expect("progress registry poisoned")
            .runs
            .get(&run_id)
            .cloned()
    }

    /// The most recently started run, if any.
    pub fn latest(&self) -> Option<Arc<ProgressHandle>> {
        let inner = self.inner.lock().expect("progress registry poisoned");
        inner.latest.and_then(|id| inner.runs.get(&id).cloned())
    }

    /// Number of runs currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("progress registry poisoned").runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let registry = ProgressRegistry::new();
        let handle = registry.begin_run();
        assert_eq!(handle.snapshot(), MigrationProgress::zero());
    }

    #[test]
    fn percentage_rounds_and_guards_zero_total() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
        assert_eq!(percentage(0, 10), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(10, 10), 100);
        assert_eq!(percentage(5000, 7000), 71);
    }

    #[test]
    fn record_row_is_monotonic() {
        let registry = ProgressRegistry::new();
        let handle = registry.begin_run();
        handle.set_total(3);

        let mut last = 0;
        for _ in 0..3 {
            let n = handle.record_row();
            assert!(n > last);
            last = n;
            let snap = handle.snapshot();
            assert!(snap.percentage >= 0 && snap.percentage <= 100);
        }
        assert_eq!(handle.snapshot().percentage, 100);
    }

    #[test]
    fn finish_transitions_exactly_once() {
        let registry = ProgressRegistry::new();
        let handle = registry.begin_run();
        assert!(!handle.snapshot().is_complete);
        assert!(handle.finish());
        assert!(handle.snapshot().is_complete);
        // Second finish is a no-op, never a revert.
        assert!(!handle.finish());
        assert!(handle.snapshot().is_complete);
    }

    #[test]
    fn latest_tracks_most_recent_run() {
        let registry = ProgressRegistry::new();
        assert!(registry.latest().is_none());

        let first = registry.begin_run();
        let second = registry.begin_run();
        assert_eq!(registry.latest().unwrap().run_id(), second.run_id());
        // Older runs stay addressable by id.
        assert!(registry.get(first.run_id()).is_some());
    }

    #[test]
    fn old_runs_are_pruned() {
        let registry = ProgressRegistry::new();
        let first = registry.begin_run();
        for _ in 0..MAX_RETAINED_RUNS {
            registry.begin_run();
        }
        assert_eq!(registry.len(), MAX_RETAINED_RUNS);
        assert!(registry.get(first.run_id()).is_none());
    }

    #[test]
    fn progress_serializes_camel_case() {
        let json = serde_json::to_value(MigrationProgress {
            total_records: 10,
            migrated_records: 5,
            percentage: 50,
            is_complete: false,
        })
        .unwrap();
        assert_eq!(json["totalRecords"], serde_json::json!(10));
        assert_eq!(json["migratedRecords"], serde_json::json!(5));
        assert_eq!(json["percentage"], serde_json::json!(50));
        assert_eq!(json["isComplete"], serde_json::json!(false));
    }
}
