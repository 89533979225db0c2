//! Bidirectional reconciliation between two directory trees that refuses to
//! silently pick a winner.
//!
//! The pipeline a cycle runs (spec §4, §6):
//!
//! 1. [`probe::detect_mtime_tolerance`] — work out how much mtime jitter this
//!    pair of filesystems introduces on a plain copy.
//! 2. [`scan::scan`] each root.
//! 3. [`merge::merge`] the two scans into one case-aware view.
//! 4. [`snapshot::SnapshotStore::load`] the previous cycle's state.
//! 5. [`reconcile::reconcile`] — the pure decision engine.
//! 6. [`executor::Executor::execute`] — apply the plan, or just log it under
//!    `dry_run`.
//! 7. [`snapshot::SnapshotStore::save`] the new state for next time.
//!
//! [`reconcile_cycle`] wires all seven steps together for a host binary; each
//! module is usable standalone too.

pub mod config;
pub mod executor;
pub mod io;
pub mod merge;
pub mod model;
pub mod notify;
pub mod probe;
pub mod quarantine;
pub mod reconcile;
pub mod scan;
pub mod snapshot;

pub use config::Config;
pub use executor::Executor;
pub use model::{Action, ActionKind, FileMetadata};
pub use notify::CycleReport;
pub use reconcile::reconcile;
pub use snapshot::SnapshotStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run one complete reconcile cycle against `config`, persisting the new
/// snapshot at `snapshot_path` on success.
///
/// Scanning both roots is independent work, so it runs in parallel via
/// rayon's `join` the way the original scanner parallelized its hashing
/// pass — there's just less to parallelize here since there's only ever
/// two sides.
pub fn reconcile_cycle(config: &Config, snapshot_path: &std::path::Path) -> CycleReport {
    let tolerance = probe::detect_mtime_tolerance(&config.left_root, &config.right_root);
    tracing::info!(tolerance, "mtime tolerance probed");

    let current = scan_both(config);

    let store = snapshot::SnapshotStore::new(snapshot_path);
    let previous = store.load();

    let plan = reconcile::reconcile(&previous, &current, config, tolerance);
    tracing::info!(actions = plan.actions.len(), conflicts = plan.conflict_alerts.len(), "reconcile plan ready");

    let executor = executor::Executor::new(config);
    let mut report = executor.execute(&plan.actions);
    report.conflict_alerts = plan.conflict_alerts;

    // The snapshot must equal the merged view of both roots as they exist at
    // cycle end (spec invariant I2), not as they were before the executor
    // ran — a plain copy action alone would otherwise leave the snapshot
    // recording one side as absent forever, which reads back next cycle as
    // a spurious attribute change. Rescan rather than reuse `current`.
    if !config.dry_run {
        let post_execution = scan_both(config);
        if let Err(e) = store.save(&post_execution) {
            tracing::error!(error = %e, "failed to persist snapshot");
            report.snapshot_error = Some(e.to_string());
        }
    }

    report
}

fn scan_both(config: &Config) -> std::collections::BTreeMap<String, FileMetadata> {
    let (left_scan, right_scan) = rayon::join(
        || scan::scan(&config.left_root, &config.ignore),
        || scan::scan(&config.right_root, &config.ignore),
    );
    merge::merge(&left_scan, &right_scan)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn snapshot_write_failure_is_reported_as_fatal() {
        let left = tempdir().unwrap();
        let right = tempdir().unwrap();
        std::fs::write(left.path().join("a.txt"), b"hello").unwrap();

        let mut config = Config::new(left.path().to_path_buf(), right.path().to_path_buf());
        config.dry_run = false;

        // A directory where the snapshot file should go: the rename-into-place
        // in `SnapshotStore::save` can't replace a directory, so the cycle's
        // file operations all succeed while the snapshot write still fails.
        let snapshot_path = left.path().join("snapshot-is-a-dir");
        std::fs::create_dir(&snapshot_path).unwrap();

        let report = reconcile_cycle(&config, &snapshot_path);

        assert!(right.path().join("a.txt").exists(), "the copy action itself should have succeeded");
        assert_eq!(report.failed, 0, "no per-action failures, only the snapshot write");
        assert!(report.is_fatal());
        assert!(report.snapshot_error.is_some());
    }
}
