//! Property tests for the convergence invariant in spec.md §8: running a
//! reconcile cycle on a tree that's already converged must plan zero
//! further actions, no matter what mix of files produced that convergence.
//!
//! Mirrors `second_cycle_on_quiescent_trees_is_a_noop` in
//! `reconcile_cycle.rs`, but drives the scenario from randomly generated
//! file sets instead of one hand-picked case.

#![allow(clippy::all)]

use std::fs;
use std::path::Path;

use bisync::Config;
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone, Copy)]
enum Placement {
    LeftOnly,
    RightOnly,
    Both,
}

fn placement_strategy() -> impl Strategy<Value = Placement> {
    prop_oneof![
        Just(Placement::LeftOnly),
        Just(Placement::RightOnly),
        Just(Placement::Both),
    ]
}

/// A small set of distinctly-named files, each placed on one or both sides.
fn file_set_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>, Placement)>> {
    prop::collection::vec(
        (
            "[a-z]{3,8}\\.txt",
            prop::collection::vec(any::<u8>(), 0..64),
            placement_strategy(),
        ),
        0..6,
    )
    .prop_map(|mut entries| {
        // Drop duplicate names so the scenario has one unambiguous outcome
        // per file instead of two competing placements for the same path.
        let mut seen = std::collections::HashSet::new();
        entries.retain(|(name, _, _)| seen.insert(name.clone()));
        entries
    })
}

fn populate(left: &Path, right: &Path, entries: &[(String, Vec<u8>, Placement)]) {
    for (name, content, placement) in entries {
        match placement {
            Placement::LeftOnly => {
                fs::write(left.join(name), content).unwrap();
            }
            Placement::RightOnly => {
                fs::write(right.join(name), content).unwrap();
            }
            Placement::Both => {
                fs::write(left.join(name), content).unwrap();
                fs::write(right.join(name), content).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn converged_tree_needs_no_further_actions(entries in file_set_strategy()) {
        let left = tempdir().unwrap();
        let right = tempdir().unwrap();
        populate(left.path(), right.path(), &entries);

        let mut cfg = Config::new(left.path().to_path_buf(), right.path().to_path_buf());
        cfg.dry_run = false;
        let snapshot_path = left.path().join("snap.json");

        let first = bisync::reconcile_cycle(&cfg, &snapshot_path);
        prop_assert_eq!(first.failed, 0);

        let second = bisync::reconcile_cycle(&cfg, &snapshot_path);
        prop_assert_eq!(
            second.actions_planned, 0,
            "second cycle over an already-converged tree replanned actions"
        );

        // Idempotence (spec §7): a third cycle must agree with the second.
        let third = bisync::reconcile_cycle(&cfg, &snapshot_path);
        prop_assert_eq!(third.actions_planned, 0);
    }
}
