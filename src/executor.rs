//! Applies a reconciled [`Action`] list to both filesystems.
//!
//! Actions run sequentially, in the order the reconciler produced them —
//! directory deletions are already ordered leaves-first, and per-path
//! operations don't depend on each other, so there's nothing to gain from
//! parallelizing here the way the teacher's flat hash-sync did with rayon.
//! A failed action is recorded on the [`CycleReport`] and execution
//! continues; one bad path should never abort an otherwise-clean cycle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::io as bio;
use crate::model::{Action, ActionKind, ATTR_READONLY};
use crate::notify::CycleReport;
use crate::quarantine;

pub struct Executor<'a> {
    config: &'a Config,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Apply every action, or just log what would happen under `dry_run`.
    pub fn execute(&self, actions: &[Action]) -> CycleReport {
        let mut report = CycleReport {
            actions_planned: actions.len(),
            ..Default::default()
        };

        if self.config.dry_run {
            for action in actions {
                tracing::info!(kind = ?action.kind, path = %action.path, reason = %action.reason, "dry run, not applying");
            }
            report.executed = actions.len();
            return report;
        }

        for action in actions {
            match self.execute_one(action) {
                Ok(()) => {
                    tracing::debug!(kind = ?action.kind, path = %action.path, "applied");
                    report.executed += 1;
                }
                Err(e) => {
                    tracing::error!(kind = ?action.kind, path = %action.path, error = %e, "action failed");
                    report.record_error(action, e.to_string());
                }
            }
        }

        report
    }

    fn execute_one(&self, action: &Action) -> io::Result<()> {
        match action.kind {
            ActionKind::CopyLToR => self.copy(&self.config.left_root, &self.config.right_root, &action.path),
            ActionKind::CopyRToL => self.copy(&self.config.right_root, &self.config.left_root, &action.path),
            ActionKind::DeleteL => self.delete(&self.config.left_root, &action.path),
            ActionKind::DeleteR => self.delete(&self.config.right_root, &action.path),
            ActionKind::SoftDeleteL => self.soft_delete(&self.config.left_root, &action.path),
            ActionKind::SoftDeleteR => self.soft_delete(&self.config.right_root, &action.path),
            ActionKind::ClashCreate => self.clash_create(action),
            ActionKind::CaseConflict => self.case_conflict(action),
            ActionKind::RenameConflict => self.rename_conflict(action),
            ActionKind::RenameL => self.rename(&self.config.left_root, action),
            ActionKind::RenameR => self.rename(&self.config.right_root, action),
            ActionKind::CreateDirL => bio::ensure_directory(&self.config.left_root.join(&action.path)),
            ActionKind::CreateDirR => bio::ensure_directory(&self.config.right_root.join(&action.path)),
            ActionKind::DeleteDirL => delete_empty_dir(&self.config.left_root.join(&action.path)),
            ActionKind::DeleteDirR => delete_empty_dir(&self.config.right_root.join(&action.path)),
            ActionKind::SyncAttrsLToR => self.sync_attrs(&self.config.right_root, action),
            ActionKind::SyncAttrsRToL => self.sync_attrs(&self.config.left_root, action),
            ActionKind::Noop => Ok(()),
        }
    }

    fn copy(&self, src_root: &Path, dst_root: &Path, path: &str) -> io::Result<()> {
        let src = src_root.join(path);
        let dst = dst_root.join(path);
        if let Some(parent) = dst.parent() {
            bio::ensure_directory(parent)?;
        }
        bio::copy_file_with_metadata(&src, &dst, true)
    }

    fn delete(&self, root: &Path, path: &str) -> io::Result<()> {
        bio::remove_file_safe(&root.join(path))
    }

    fn soft_delete(&self, root: &Path, path: &str) -> io::Result<()> {
        let source = root.join(path);
        if !source.exists() {
            return Ok(());
        }

        let quarantine_dir = quarantine::quarantine_dir(root);
        bio::ensure_directory(&quarantine_dir)?;

        let basename = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let target = quarantine_dir.join(format!("{stamp}_{basename}"));

        match fs::rename(&source, &target) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Cross-device or otherwise non-atomic: fall back to copy then remove.
                bio::copy_file_with_metadata(&source, &target, true)?;
                bio::remove_file_safe(&source)
            }
        }
    }

    fn rename(&self, root: &Path, action: &Action) -> io::Result<()> {
        let Some(new_name) = action.secondary.as_deref() else {
            return Ok(());
        };
        case_safe_rename(root, &action.path, new_name)
    }

    fn clash_create(&self, action: &Action) -> io::Result<()> {
        let left_path = self.config.left_root.join(&action.path);
        let right_path = self.config.right_root.join(&action.path);

        if !left_path.exists() || !right_path.exists() {
            // Nothing to clash against any more; one side already resolved it.
            return Ok(());
        }

        let left_mtime = epoch_secs(fs::metadata(&left_path)?.modified().ok());
        let right_mtime = epoch_secs(fs::metadata(&right_path)?.modified().ok());

        // Tie-break: left wins on equal mtime (spec §4.5.4's convention, reused
        // here since §4.5.6 doesn't restate it), else the newer mtime wins.
        let (newer_path, older_path, older_mtime) = if right_mtime > left_mtime {
            (&right_path, &left_path, left_mtime)
        } else {
            (&left_path, &right_path, right_mtime)
        };

        let older_bytes = fs::read(older_path)?;
        let artifact = clash_artifact_rel_path(&action.path, older_mtime, &self.current_user());
        write_bytes(&self.config.left_root.join(&artifact), &older_bytes)?;
        write_bytes(&self.config.right_root.join(&artifact), &older_bytes)?;

        // Both roots converge on the newer content as the main file.
        bio::copy_file_with_metadata(newer_path, older_path, true)?;

        Ok(())
    }

    fn case_conflict(&self, action: &Action) -> io::Result<()> {
        let winner_name = &action.path;
        let Some(loser_name) = action.secondary.as_deref() else {
            return Ok(());
        };

        let winner_on_left = self.config.left_root.join(winner_name).exists();
        let (winner_root, loser_root) = if winner_on_left {
            (&self.config.left_root, &self.config.right_root)
        } else {
            (&self.config.right_root, &self.config.left_root)
        };

        if let Some(payload) = &action.payload {
            if let Some(bytes) = &payload.older_bytes {
                let artifact =
                    clash_artifact_rel_path(loser_name, payload.older_mtime.unwrap_or(0.0), &self.current_user());
                write_bytes(&winner_root.join(&artifact), bytes)?;
                write_bytes(&loser_root.join(&artifact), bytes)?;
            }
        }

        let winner_src = winner_root.join(winner_name);
        let loser_path = loser_root.join(loser_name);
        let temp_path = loser_root.join(format!("{winner_name}.bisync-case-hop"));

        bio::remove_file_safe(&temp_path)?;
        if loser_path.exists() {
            fs::rename(&loser_path, &temp_path)?;
        }
        bio::copy_file_with_metadata(&winner_src, &temp_path, true)?;
        fs::rename(&temp_path, &loser_root.join(winner_name))?;

        Ok(())
    }

    fn rename_conflict(&self, action: &Action) -> io::Result<()> {
        let winner_name = &action.path;
        let Some(loser_name) = action.secondary.as_deref() else {
            return Ok(());
        };

        // The canonical name always wins as left's rename target (spec §4.5.5 tie-break).
        let winner_src = self.config.left_root.join(winner_name);
        if winner_src.exists() {
            let winner_dst = self.config.right_root.join(winner_name);
            if let Some(parent) = winner_dst.parent() {
                bio::ensure_directory(parent)?;
            }
            bio::copy_file_with_metadata(&winner_src, &winner_dst, true)?;
        }

        let loser_src = self.config.right_root.join(loser_name);
        if loser_src.exists() {
            let mtime = epoch_secs(fs::metadata(&loser_src)?.modified().ok());
            let artifact = clash_artifact_rel_path(loser_name, mtime, &self.current_user());
            bio::copy_file_with_metadata(&loser_src, &self.config.right_root.join(&artifact), true)?;
            bio::copy_file_with_metadata(&loser_src, &self.config.left_root.join(&artifact), true)?;
            bio::remove_file_safe(&loser_src)?;
        }

        Ok(())
    }

    fn sync_attrs(&self, dst_root: &Path, action: &Action) -> io::Result<()> {
        let Some(attrs) = action.attrs else { return Ok(()) };
        apply_attrs(&dst_root.join(&action.path), attrs)
    }

    /// The `<user>` component of a conflict artifact name (spec §4.6, §6):
    /// an explicit override from config if set, else the OS-reported current
    /// user, else `unknown`.
    fn current_user(&self) -> String {
        current_user(self.config)
    }
}

fn current_user(config: &Config) -> String {
    if let Some(name) = config.notify.username.as_deref().filter(|s| !s.is_empty()) {
        return name.to_owned();
    }
    let detected = whoami::username();
    if detected.is_empty() {
        "unknown".to_owned()
    } else {
        detected
    }
}

/// Refuses to remove a directory that became non-empty between reconcile
/// and execution (spec §4.5.8, §4.6): that case is a skip-and-warn, not a
/// recorded failure, since a concurrently-created file there is expected
/// drift, not an error.
fn delete_empty_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if non_empty_directory(&e) => {
            tracing::warn!(path = %path.display(), "directory became non-empty before deletion, skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn non_empty_directory(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::DirectoryNotEmpty
        || e.raw_os_error().is_some_and(|code| code == libc_enotempty())
}

/// `ENOTEMPTY`'s numeric value on Linux/most Unix targets; used because
/// `ErrorKind::DirectoryNotEmpty` was only stabilized recently and some
/// platforms still surface this as a bare OS error code.
const fn libc_enotempty() -> i32 {
    39
}

/// Rename on a filesystem that may be case-insensitive: hop through a
/// throwaway name so `old` and `new` never alias the same directory entry
/// mid-rename.
fn case_safe_rename(root: &Path, old_name: &str, new_name: &str) -> io::Result<()> {
    let old_path = root.join(old_name);
    if !old_path.exists() {
        return Ok(());
    }
    let new_path = root.join(new_name);
    let temp_path = root.join(format!("{new_name}.bisync-rename-hop"));
    fs::rename(&old_path, &temp_path)?;
    fs::rename(&temp_path, &new_path)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        bio::ensure_directory(parent)?;
    }
    fs::write(path, bytes)
}

fn epoch_secs(mtime: Option<std::time::SystemTime>) -> f64 {
    mtime
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// `dir/stem.CONFLICT.<user>.<YYYYMMDD_HHMMSS>.ext`, relative to a sync root
/// (spec §4.6, §6).
fn clash_artifact_rel_path(original: &str, mtime: f64, user: &str) -> String {
    let path = Path::new(original);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(original);
    let ext = path.extension().and_then(|e| e.to_str());
    let timestamp = chrono::DateTime::<chrono::Utc>::from_timestamp(mtime.max(0.0) as i64, 0)
        .unwrap_or_else(chrono::Utc::now)
        .format("%Y%m%d_%H%M%S");

    let filename = match ext {
        Some(ext) => format!("{stem}.CONFLICT.{user}.{timestamp}.{ext}"),
        None => format!("{stem}.CONFLICT.{user}.{timestamp}"),
    };

    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(filename).to_string_lossy().into_owned(),
        None => filename,
    }
}

fn apply_attrs(path: &Path, attrs: u8) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(attrs & ATTR_READONLY != 0);
    fs::set_permissions(path, perms)
}
