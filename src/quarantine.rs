//! Quarantine (`.deleted/`) lifecycle maintenance.
//!
//! Soft-deleted files accumulate under `<root>/.deleted/` with no subtree
//! structure (spec §6). The reconcile/execute hot path only ever writes into
//! this directory; listing, sizing, and purging it is maintenance work a
//! host program runs on its own schedule — ported from the original's
//! `SoftDeleteManager`, which the distilled spec doesn't require but whose
//! lifecycle the Quarantine glossary entry assumes exists somewhere.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::io;

pub const QUARANTINE_DIR_NAME: &str = ".deleted";

/// Path to the quarantine directory for a given sync root.
#[must_use]
pub fn quarantine_dir(root: &Path) -> PathBuf {
    root.join(QUARANTINE_DIR_NAME)
}

/// List every quarantined file's path, sorted by name.
#[must_use]
pub fn list_quarantined(root: &Path) -> Vec<PathBuf> {
    let dir = quarantine_dir(root);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Total size in bytes of everything currently quarantined under `root`.
#[must_use]
pub fn quarantine_size(root: &Path) -> u64 {
    let dir = quarantine_dir(root);
    if !dir.exists() {
        return 0;
    }
    io::directory_size(&dir).unwrap_or(0)
}

/// Remove quarantined files whose soft-delete timestamp prefix is older than
/// `cutoff`. Files that don't match the `YYYYMMDD_HHMMSS_<basename>` naming
/// convention are left alone — they weren't written by the soft-delete path.
///
/// Returns the number of files removed.
pub fn purge_older_than(root: &Path, cutoff: SystemTime) -> std::io::Result<usize> {
    let dir = quarantine_dir(root);
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for path in list_quarantined(root) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(timestamp) = parse_quarantine_timestamp(name) else {
            continue;
        };
        if timestamp < cutoff {
            io::remove_file_safe(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_quarantine_timestamp(name: &str) -> Option<SystemTime> {
    // "YYYYMMDD_HHMMSS_basename" -- the first 15 characters are the stamp.
    if name.len() < 16 || name.as_bytes().get(15) != Some(&b'_') {
        return None;
    }
    let stamp = &name[..15];
    let dt = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok()?;
    let utc = dt.and_utc();
    Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(utc.timestamp().max(0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn lists_and_sizes_quarantined_files() {
        let dir = tempdir().unwrap();
        let q = quarantine_dir(dir.path());
        fs::create_dir_all(&q).unwrap();
        fs::write(q.join("20200101_000000_a.txt"), b"hello").unwrap();
        fs::write(q.join("20200101_000001_b.txt"), b"world!").unwrap();

        let files = list_quarantined(dir.path());
        assert_eq!(files.len(), 2);
        assert_eq!(quarantine_size(dir.path()), 11);
    }

    #[test]
    fn empty_when_no_quarantine_dir() {
        let dir = tempdir().unwrap();
        assert!(list_quarantined(dir.path()).is_empty());
        assert_eq!(quarantine_size(dir.path()), 0);
    }

    #[test]
    fn purges_only_old_entries() {
        let dir = tempdir().unwrap();
        let q = quarantine_dir(dir.path());
        fs::create_dir_all(&q).unwrap();
        fs::write(q.join("20000101_000000_old.txt"), b"old").unwrap();

        let future_name = {
            let now = chrono::Utc::now();
            format!("{}_new.txt", now.format("%Y%m%d_%H%M%S"))
        };
        fs::write(q.join(&future_name), b"new").unwrap();

        let cutoff = SystemTime::now() - Duration::from_secs(3600);
        let removed = purge_older_than(dir.path(), cutoff).unwrap();

        assert_eq!(removed, 1);
        assert!(!q.join("20000101_000000_old.txt").exists());
        assert!(q.join(&future_name).exists());
    }

    #[test]
    fn ignores_non_conforming_names() {
        let dir = tempdir().unwrap();
        let q = quarantine_dir(dir.path());
        fs::create_dir_all(&q).unwrap();
        fs::write(q.join("not_a_timestamp.txt"), b"x").unwrap();

        let removed = purge_older_than(dir.path(), SystemTime::now()).unwrap();
        assert_eq!(removed, 0);
        assert!(q.join("not_a_timestamp.txt").exists());
    }
}
