//! The reconciler (spec §4.5): a pure decision engine from `(previous,
//! current, config, tolerance)` to an ordered list of [`Action`]s.
//!
//! "Pure" with one deliberate exception: case-conflict detection needs to
//! snapshot the *bytes* of the losing variant at detection time, because by
//! the time the executor runs, that file may already have been overwritten
//! or removed. The original service does the same best-effort read inline
//! (`SyncEngine._safe_read_bytes`); we do the same, reading through the
//! roots recorded on `Config`.
//!
//! Phases run in the strict order from spec §4.5.1, each one claiming the
//! paths it has decided on so later phases skip them.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::{Config, ConflictResolution};
use crate::model::{Action, ActionKind, ConflictPayload, FileMetadata};
use crate::notify::{ConflictAlert, ConflictKind};

/// Output of one reconcile pass: the ordered actions for the executor, plus
/// the conflict alerts a caller will want to log or mail.
#[derive(Debug, Default)]
pub struct ReconcileOutput {
    pub actions: Vec<Action>,
    pub conflict_alerts: Vec<ConflictAlert>,
}

/// `current.mtime > previous.mtime + tolerance` (spec §4.5.2).
#[must_use]
pub fn changed(current_mtime: f64, previous_mtime: f64, tolerance: f64) -> bool {
    current_mtime > previous_mtime + tolerance
}

/// `|current.mtime - previous.mtime| <= tolerance` (spec §4.5.2).
#[must_use]
pub fn same_time(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Same-content heuristic (spec §4.5.3): equal size and mtime within
/// tolerance. Never true for a path missing one side.
fn same_content(curr: &FileMetadata, tolerance: f64) -> bool {
    match (curr.left, curr.right) {
        (Some(l), Some(r)) => l.size == r.size && same_time(l.mtime, r.mtime, tolerance),
        _ => false,
    }
}

fn metadata_conflict(curr: &FileMetadata) -> bool {
    if curr.is_directory() {
        return false;
    }
    match (curr.left, curr.right) {
        (Some(l), Some(r)) if l.size != r.size && l.size > 0 && r.size > 0 => {
            let diff = (l.size - r.size).unsigned_abs() as f64;
            let larger = l.size.max(r.size) as f64;
            diff / larger > 0.01
        }
        _ => false,
    }
}

/// Run one full reconcile pass.
#[must_use]
pub fn reconcile(
    previous: &BTreeMap<String, FileMetadata>,
    current: &BTreeMap<String, FileMetadata>,
    config: &Config,
    tolerance: f64,
) -> ReconcileOutput {
    let mut claimed: HashSet<String> = HashSet::new();

    let (case_conflict_actions, case_change_actions) =
        detect_case_phase(previous, current, config, &mut claimed);

    let (rename_actions, rename_conflict_actions) =
        detect_renames_phase(previous, current, &mut claimed);

    let (content_conflict_actions, conflict_alerts) =
        detect_conflicts_phase(previous, current, config, tolerance, &mut claimed);

    let mut per_path_actions = Vec::new();
    for (path, curr) in current {
        if claimed.contains(&path.to_lowercase()) {
            continue;
        }
        let prev = previous.get(path);
        per_path_actions.extend(apply_sync_rule(path, prev, curr, config, tolerance));
    }

    let mut dir_deletions = directory_deletion_sweep(previous, current, &claimed);
    dir_deletions.sort_by_key(|a: &Action| std::cmp::Reverse(a.path.matches('/').count()));

    let mut actions = Vec::with_capacity(
        case_conflict_actions.len()
            + rename_conflict_actions.len()
            + case_change_actions.len()
            + rename_actions.len()
            + content_conflict_actions.len()
            + per_path_actions.len()
            + dir_deletions.len(),
    );
    actions.extend(case_conflict_actions);
    actions.extend(rename_conflict_actions);
    actions.extend(case_change_actions);
    actions.extend(rename_actions);
    actions.extend(content_conflict_actions);
    actions.extend(per_path_actions);
    actions.extend(dir_deletions);

    ReconcileOutput {
        actions,
        conflict_alerts,
    }
}

// ---------------------------------------------------------------------
// Phase 1: case-change & case-conflict detection (spec §4.5.4)
// ---------------------------------------------------------------------

fn detect_case_phase(
    previous: &BTreeMap<String, FileMetadata>,
    current: &BTreeMap<String, FileMetadata>,
    config: &Config,
    claimed: &mut HashSet<String>,
) -> (Vec<Action>, Vec<Action>) {
    let mut by_lower: BTreeMap<String, Vec<&String>> = BTreeMap::new();
    for key in current.keys() {
        by_lower.entry(key.to_lowercase()).or_default().push(key);
    }

    let mut conflict_actions = Vec::new();
    let mut change_actions = Vec::new();

    for (lower, variants) in &by_lower {
        match variants.len() {
            1 => {
                let curr_path = variants[0];
                if previous.contains_key(curr_path) {
                    continue;
                }
                let Some(prev_path) = previous
                    .keys()
                    .find(|p| p.to_lowercase() == *lower && *p != curr_path)
                else {
                    continue;
                };

                claimed.insert(prev_path.to_lowercase());
                claimed.insert(curr_path.to_lowercase());
                change_actions.extend(build_case_change_actions(prev_path, curr_path, current));
            }
            2 => {
                let (v0, v1) = (variants[0], variants[1]);
                let meta0 = &current[v0];
                let (c_l, c_r) = if meta0.exists_left() { (v0, v1) } else { (v1, v0) };

                let Some(prev_path) = previous.keys().find(|p| p.to_lowercase() == *lower) else {
                    continue;
                };

                claimed.insert(prev_path.to_lowercase());
                claimed.insert(c_l.to_lowercase());
                claimed.insert(c_r.to_lowercase());
                conflict_actions.push(build_case_conflict_action(prev_path, c_l, c_r, current, config));
            }
            _ => {}
        }
    }

    (conflict_actions, change_actions)
}

fn build_case_change_actions(
    prev_path: &str,
    curr_path: &str,
    current: &BTreeMap<String, FileMetadata>,
) -> Vec<Action> {
    let meta = &current[curr_path];
    if meta.exists_left() && meta.exists_right() {
        vec![Action::new(
            ActionKind::RenameR,
            prev_path,
            format!("case change: {prev_path} -> {curr_path}"),
        )
        .with_secondary(curr_path)]
    } else if meta.exists_right() && !meta.exists_left() {
        vec![Action::new(
            ActionKind::RenameL,
            prev_path,
            format!("case change: {prev_path} -> {curr_path}"),
        )
        .with_secondary(curr_path)]
    } else {
        Vec::new()
    }
}

fn build_case_conflict_action(
    prev_path: &str,
    c_l: &str,
    c_r: &str,
    current: &BTreeMap<String, FileMetadata>,
    config: &Config,
) -> Action {
    let meta_l = &current[c_l];
    let meta_r = &current[c_r];
    let left_mtime = meta_l.left.map(|s| s.mtime).or_else(|| meta_l.right.map(|s| s.mtime)).unwrap_or(0.0);
    let right_mtime = meta_r.right.map(|s| s.mtime).or_else(|| meta_r.left.map(|s| s.mtime)).unwrap_or(0.0);

    // Tie-break: left wins on equal mtime, else the newer side wins.
    let (winner, loser, winner_mtime, loser_mtime) = if right_mtime > left_mtime {
        (c_r, c_l, right_mtime, left_mtime)
    } else {
        (c_l, c_r, left_mtime, right_mtime)
    };

    let loser_bytes = read_variant_bytes(config, loser, current);

    let payload = ConflictPayload {
        older_bytes: loser_bytes,
        older_mtime: Some(loser_mtime),
        newer_mtime: Some(winner_mtime),
    };

    Action::new(
        ActionKind::CaseConflict,
        winner,
        format!("case conflict: {prev_path} -> {c_l} (left) vs {c_r} (right)"),
    )
    .with_secondary(loser)
    .with_payload(payload)
}

fn read_variant_bytes(
    config: &Config,
    variant: &str,
    current: &BTreeMap<String, FileMetadata>,
) -> Option<Vec<u8>> {
    let meta = current.get(variant)?;
    let root = if meta.exists_left() {
        &config.left_root
    } else {
        &config.right_root
    };
    match std::fs::read(root.join(variant)) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(path = variant, error = %e, "unable to snapshot case-variant bytes");
            None
        }
    }
}

// ---------------------------------------------------------------------
// Phase 2: rename & rename-conflict detection (spec §4.5.5)
// ---------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Left,
    Right,
}

fn detect_renames_phase(
    previous: &BTreeMap<String, FileMetadata>,
    current: &BTreeMap<String, FileMetadata>,
    claimed: &mut HashSet<String>,
) -> (Vec<Action>, Vec<Action>) {
    type Key = (u8, u64, i64);
    let key_of = |side: Side, mtime: f64, size: i64| -> Key {
        (if side == Side::Left { 0 } else { 1 }, mtime.to_bits(), size)
    };

    let mut disappeared: HashMap<Key, Vec<&String>> = HashMap::new();
    for (path, meta) in previous {
        if current.contains_key(path) {
            continue;
        }
        if let Some(l) = meta.left {
            disappeared.entry(key_of(Side::Left, l.mtime, l.size)).or_default().push(path);
        }
        if let Some(r) = meta.right {
            disappeared.entry(key_of(Side::Right, r.mtime, r.size)).or_default().push(path);
        }
    }

    let mut appeared: HashMap<Key, Vec<&String>> = HashMap::new();
    for (path, meta) in current {
        if previous.contains_key(path) {
            continue;
        }
        if let Some(l) = meta.left {
            appeared.entry(key_of(Side::Left, l.mtime, l.size)).or_default().push(path);
        }
        if let Some(r) = meta.right {
            appeared.entry(key_of(Side::Right, r.mtime, r.size)).or_default().push(path);
        }
    }

    let mut renames_by_original: BTreeMap<String, Vec<(Side, String)>> = BTreeMap::new();
    for (key, appeared_list) in &appeared {
        if let Some(disappeared_list) = disappeared.get(key) {
            if appeared_list.len() == 1 && disappeared_list.len() == 1 {
                let old_path = disappeared_list[0].clone();
                let new_path = appeared_list[0].clone();
                let side = if key.0 == 0 { Side::Left } else { Side::Right };
                renames_by_original.entry(old_path).or_default().push((side, new_path));
            }
        }
    }

    let mut rename_actions = Vec::new();
    let mut conflict_actions = Vec::new();

    for (old_path, mut renames) in renames_by_original {
        if claimed.contains(&old_path.to_lowercase()) {
            continue;
        }
        if renames.iter().any(|(_, np)| claimed.contains(&np.to_lowercase())) {
            continue;
        }
        // Deterministic order regardless of hash-map iteration order upstream.
        renames.sort_by(|a, b| a.1.cmp(&b.1));

        if renames.len() == 2 {
            let left_new = renames.iter().find(|(s, _)| *s == Side::Left).map(|(_, p)| p.clone());
            let right_new = renames.iter().find(|(s, _)| *s == Side::Right).map(|(_, p)| p.clone());
            if let (Some(l), Some(r)) = (left_new, right_new) {
                claimed.insert(old_path.to_lowercase());
                if l != r {
                    claimed.insert(l.to_lowercase());
                    claimed.insert(r.to_lowercase());
                    conflict_actions.push(
                        Action::new(
                            ActionKind::RenameConflict,
                            l.clone(),
                            format!("rename conflict: {old_path} -> {l} (left) vs {r} (right)"),
                        )
                        .with_secondary(r),
                    );
                } else {
                    claimed.insert(l.to_lowercase());
                }
                continue;
            }
        }

        for (side, new_path) in &renames {
            claimed.insert(old_path.to_lowercase());
            claimed.insert(new_path.to_lowercase());
            match side {
                Side::Left => {
                    rename_actions.push(Action::new(
                        ActionKind::CopyLToR,
                        new_path.clone(),
                        format!("renamed from {old_path}"),
                    ));
                    rename_actions
                        .push(Action::new(ActionKind::DeleteR, old_path.clone(), format!("renamed to {new_path}")));
                }
                Side::Right => {
                    rename_actions.push(Action::new(
                        ActionKind::CopyRToL,
                        new_path.clone(),
                        format!("renamed from {old_path}"),
                    ));
                    rename_actions
                        .push(Action::new(ActionKind::DeleteL, old_path.clone(), format!("renamed to {new_path}")));
                }
            }
        }
    }

    (rename_actions, conflict_actions)
}

// ---------------------------------------------------------------------
// Phase 3: content-conflict detection (spec §4.5.6)
// ---------------------------------------------------------------------

fn detect_conflicts_phase(
    previous: &BTreeMap<String, FileMetadata>,
    current: &BTreeMap<String, FileMetadata>,
    config: &Config,
    tolerance: f64,
    claimed: &mut HashSet<String>,
) -> (Vec<Action>, Vec<ConflictAlert>) {
    let mut actions = Vec::new();
    let mut alerts = Vec::new();

    for (path, curr) in current {
        if claimed.contains(&path.to_lowercase()) {
            continue;
        }

        let kind = match previous.get(path) {
            None => {
                if curr.exists_left() && curr.exists_right() && !same_content(curr, tolerance) {
                    Some(ConflictKind::NewNew)
                } else {
                    None
                }
            }
            Some(prev) => {
                let left_changed = curr
                    .left
                    .zip(prev.left)
                    .is_some_and(|(c, p)| changed(c.mtime, p.mtime, tolerance));
                let right_changed = curr
                    .right
                    .zip(prev.right)
                    .is_some_and(|(c, p)| changed(c.mtime, p.mtime, tolerance));
                let modify_modify = left_changed && right_changed && !same_content(curr, tolerance);

                if metadata_conflict(curr) {
                    Some(ConflictKind::MetadataConflict)
                } else if modify_modify {
                    Some(ConflictKind::ModifyModify)
                } else {
                    None
                }
            }
        };

        let Some(kind) = kind else { continue };
        claimed.insert(path.to_lowercase());

        let policy = match kind {
            ConflictKind::ModifyModify => config.conflict_policy.modify_modify,
            ConflictKind::NewNew => config.conflict_policy.new_new,
            _ => config.conflict_policy.metadata_conflict,
        };

        let (action, resolution) = resolve_conflict(path, kind, policy);
        alerts.push(ConflictAlert {
            path: path.clone(),
            kind,
            left_mtime: curr.left.map(|s| s.mtime),
            right_mtime: curr.right.map(|s| s.mtime),
            left_size: curr.left.map(|s| s.size),
            right_size: curr.right.map(|s| s.size),
            resolution,
        });
        actions.push(action);
    }

    (actions, alerts)
}

fn resolve_conflict(path: &str, kind: ConflictKind, policy: ConflictResolution) -> (Action, String) {
    match policy {
        ConflictResolution::Clash => (
            Action::new(ActionKind::ClashCreate, path, format!("conflict type: {}", kind.as_str())),
            "clash_create".to_owned(),
        ),
        ConflictResolution::NotifyOnly => (
            Action::new(ActionKind::Noop, path, format!("conflict detected, notify only: {}", kind.as_str())),
            "notify_only".to_owned(),
        ),
        ConflictResolution::OverwriteNewer => (
            Action::new(
                ActionKind::ClashCreate,
                path,
                format!("conflict type: {} (overwrite newer)", kind.as_str()),
            ),
            "overwrite_newer".to_owned(),
        ),
    }
}

// ---------------------------------------------------------------------
// Phase 4: per-path sync rules (spec §4.5.7)
// ---------------------------------------------------------------------

fn apply_sync_rule(
    path: &str,
    prev: Option<&FileMetadata>,
    curr: &FileMetadata,
    config: &Config,
    tolerance: f64,
) -> Vec<Action> {
    if curr.is_directory() {
        return apply_directory_rule(path, prev, curr);
    }

    if curr.exists_left() && !curr.exists_right() {
        return apply_left_only_rule(path, prev, curr, config, tolerance);
    }
    if curr.exists_right() && !curr.exists_left() {
        return apply_right_only_rule(path, prev, curr, config, tolerance);
    }
    if curr.exists_left() && curr.exists_right() {
        return apply_both_sides_rule(path, prev, curr, tolerance);
    }
    Vec::new()
}

fn apply_directory_rule(path: &str, prev: Option<&FileMetadata>, curr: &FileMetadata) -> Vec<Action> {
    if prev.is_some() {
        return Vec::new();
    }
    if curr.exists_left() && !curr.exists_right() {
        vec![Action::new(ActionKind::CreateDirR, path, "new empty directory on left")]
    } else if curr.exists_right() && !curr.exists_left() {
        vec![Action::new(ActionKind::CreateDirL, path, "new empty directory on right")]
    } else {
        Vec::new()
    }
}

fn apply_left_only_rule(
    path: &str,
    prev: Option<&FileMetadata>,
    curr: &FileMetadata,
    config: &Config,
    tolerance: f64,
) -> Vec<Action> {
    let Some(prev) = prev else {
        return vec![Action::new(ActionKind::CopyLToR, path, "new file on left")];
    };
    if !prev.exists_right() {
        return Vec::new();
    }

    let curr_left_mtime = curr.left.expect("checked exists_left").mtime;
    let unchanged = prev
        .left
        .is_some_and(|p| same_time(curr_left_mtime, p.mtime, tolerance));

    if unchanged {
        let size = prev.right.map(|s| s.size).unwrap_or(0).max(0) as u64;
        if config.soft_delete.applies_to(size) {
            vec![Action::new(ActionKind::SoftDeleteL, path, "deleted on right (unchanged on left)")]
        } else {
            vec![Action::new(ActionKind::DeleteL, path, "deleted on right (unchanged on left)")]
        }
    } else {
        vec![Action::new(ActionKind::CopyLToR, path, "deleted on right but changed on left")]
    }
}

fn apply_right_only_rule(
    path: &str,
    prev: Option<&FileMetadata>,
    curr: &FileMetadata,
    config: &Config,
    tolerance: f64,
) -> Vec<Action> {
    let Some(prev) = prev else {
        return vec![Action::new(ActionKind::CopyRToL, path, "new file on right")];
    };
    if !prev.exists_left() {
        return Vec::new();
    }

    let curr_right_mtime = curr.right.expect("checked exists_right").mtime;
    let unchanged = prev
        .right
        .is_some_and(|p| same_time(curr_right_mtime, p.mtime, tolerance));

    if unchanged {
        let size = prev.left.map(|s| s.size).unwrap_or(0).max(0) as u64;
        if config.soft_delete.applies_to(size) {
            vec![Action::new(ActionKind::SoftDeleteR, path, "deleted on left (unchanged on right)")]
        } else {
            vec![Action::new(ActionKind::DeleteR, path, "deleted on left (unchanged on right)")]
        }
    } else {
        vec![Action::new(ActionKind::CopyRToL, path, "deleted on left but changed on right")]
    }
}

fn apply_both_sides_rule(path: &str, prev: Option<&FileMetadata>, curr: &FileMetadata, tolerance: f64) -> Vec<Action> {
    let left_changed = prev.is_some_and(|p| {
        curr.left.zip(p.left).is_some_and(|(c, pl)| changed(c.mtime, pl.mtime, tolerance))
    });
    let right_changed = prev.is_some_and(|p| {
        curr.right.zip(p.right).is_some_and(|(c, pr)| changed(c.mtime, pr.mtime, tolerance))
    });

    if left_changed && !right_changed {
        return vec![Action::new(ActionKind::CopyLToR, path, "changed only on left")];
    }
    if right_changed && !left_changed {
        return vec![Action::new(ActionKind::CopyRToL, path, "changed only on right")];
    }

    let Some(prev) = prev else {
        return Vec::new();
    };
    if left_changed || right_changed {
        return Vec::new();
    }

    let left_attrs_changed = prev.left.map(|s| s.attrs) != curr.left.map(|s| s.attrs);
    let right_attrs_changed = prev.right.map(|s| s.attrs) != curr.right.map(|s| s.attrs);

    if left_attrs_changed && !right_attrs_changed {
        vec![Action::new(ActionKind::SyncAttrsLToR, path, "attrs changed on left")
            .with_attrs(curr.left.expect("checked exists_left").attrs)]
    } else if right_attrs_changed && !left_attrs_changed {
        vec![Action::new(ActionKind::SyncAttrsRToL, path, "attrs changed on right")
            .with_attrs(curr.right.expect("checked exists_right").attrs)]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------
// Phase 5: directory-deletion sweep (spec §4.5.8)
// ---------------------------------------------------------------------

fn directory_deletion_sweep(
    previous: &BTreeMap<String, FileMetadata>,
    current: &BTreeMap<String, FileMetadata>,
    claimed: &HashSet<String>,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for (path, prev) in previous {
        if current.contains_key(path) {
            continue;
        }
        if claimed.contains(&path.to_lowercase()) {
            continue;
        }
        if !prev.is_directory() {
            continue;
        }
        if prev.exists_left() {
            actions.push(Action::new(ActionKind::DeleteDirL, path, "empty directory deleted"));
        }
        if prev.exists_right() {
            actions.push(Action::new(ActionKind::DeleteDirR, path, "empty directory deleted"));
        }
    }
    actions
}
