//! Directory scanner (spec §4.2).
//!
//! Walks one root and produces a mapping from relative, forward-slash,
//! case-preserved path to [`ScanEntry`]. Single-threaded and deterministic
//! per run; the two sides are scanned independently by the caller, which
//! may run them concurrently (see `reconcile_cycle` in `lib.rs`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::config::IgnoreConfig;
use crate::model::{ScanEntry, DIR_SENTINEL_SIZE};

/// Scan `root`, applying `ignore` rules, and return the set of relative
/// paths observed. Never fails: a missing root or unreadable root yields an
/// empty map with a warning, matching the scan's non-fatal error semantics.
pub fn scan(root: &Path, ignore: &IgnoreConfig) -> BTreeMap<String, ScanEntry> {
    let mut result = BTreeMap::new();

    if !root.exists() {
        tracing::warn!(root = %root.display(), "scan root does not exist");
        return result;
    }

    let ignore_dirs = ignore.directories_lower();

    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

    'entries: for entry in walker.into_iter().filter_map(|e| match e {
        Ok(e) => Some(e),
        Err(err) => {
            tracing::warn!(error = %err, "could not read directory entry during scan");
            None
        }
    }) {
        let path = entry.path();
        if path == root {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };

        for component in relative.components().rev().skip(1) {
            let name = component.as_os_str().to_string_lossy();
            if ignore_dirs.iter().any(|d| d == &name.to_lowercase()) {
                continue 'entries;
            }
        }

        let relative_str = normalize_separators(relative);

        let file_type = entry.file_type();
        if file_type.is_file() {
            let filename = match path.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => continue,
            };
            if should_ignore_file(&filename, ignore) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map_or(0.0, |d| d.as_secs_f64());
                    let attrs = platform_attrs(&meta);
                    result.insert(
                        relative_str,
                        ScanEntry {
                            mtime,
                            size: meta.len() as i64,
                            attrs,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(path = %relative_str, error = %err, "could not stat file during scan");
                }
            }
        } else if file_type.is_dir() {
            let is_empty = std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(false);
            if !is_empty {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map_or(0.0, |d| d.as_secs_f64());
                    result.insert(
                        relative_str,
                        ScanEntry {
                            mtime,
                            size: DIR_SENTINEL_SIZE,
                            attrs: 0,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(path = %relative_str, error = %err, "could not stat directory during scan");
                }
            }
        }
    }

    tracing::info!(root = %root.display(), count = result.len(), "scan complete");
    result
}

fn normalize_separators(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

fn should_ignore_file(filename: &str, ignore: &IgnoreConfig) -> bool {
    if ignore.filenames_exact.iter().any(|n| n == filename) {
        return true;
    }
    if ignore.filenames_prefix.iter().any(|p| filename.starts_with(p.as_str())) {
        return true;
    }
    if ignore.extensions.iter().any(|ext| filename.ends_with(ext.as_str())) {
        return true;
    }
    false
}

#[cfg(unix)]
fn platform_attrs(_meta: &std::fs::Metadata) -> u8 {
    0
}

#[cfg(windows)]
fn platform_attrs(meta: &std::fs::Metadata) -> u8 {
    use std::os::windows::fs::MetadataExt;
    use crate::model::{ATTR_ARCHIVE, ATTR_HIDDEN, ATTR_READONLY};

    let raw = meta.file_attributes();
    let mut bits = 0u8;
    if raw & 0x2 != 0 {
        bits |= ATTR_HIDDEN;
    }
    if raw & 0x1 != 0 {
        bits |= ATTR_READONLY;
    }
    if raw & 0x20 != 0 {
        bits |= ATTR_ARCHIVE;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scans_files_and_empty_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::create_dir(dir.path().join("nonempty")).unwrap();
        fs::write(dir.path().join("nonempty/b.txt"), b"x").unwrap();

        let entries = scan(dir.path(), &IgnoreConfig::default());
        assert!(entries.contains_key("a.txt"));
        assert!(entries.contains_key("empty"));
        assert_eq!(entries["empty"].size, DIR_SENTINEL_SIZE);
        assert!(entries.contains_key("nonempty/b.txt"));
        assert!(!entries.contains_key("nonempty"));
    }

    #[test]
    fn ignores_configured_directory_case_insensitively() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("System Volume Information")).unwrap();
        fs::write(dir.path().join("System Volume Information/x.txt"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let ignore = IgnoreConfig {
            directories: vec!["system volume information".to_owned()],
            ..Default::default()
        };
        let entries = scan(dir.path(), &ignore);
        assert!(entries.contains_key("keep.txt"));
        assert!(!entries.keys().any(|k| k.contains("System Volume Information")));
    }

    #[test]
    fn ignores_by_extension_prefix_and_exact_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.tmp"), b"x").unwrap();
        fs::write(dir.path().join("~lock"), b"x").unwrap();
        fs::write(dir.path().join("Thumbs.db"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let ignore = IgnoreConfig {
            extensions: vec![".tmp".to_owned()],
            filenames_prefix: vec!["~".to_owned()],
            filenames_exact: vec!["Thumbs.db".to_owned()],
            directories: vec![],
        };
        let entries = scan(dir.path(), &ignore);
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("keep.txt"));
    }

    #[test]
    fn missing_root_yields_empty_map() {
        let entries = scan(Path::new("/nonexistent/root"), &IgnoreConfig::default());
        assert!(entries.is_empty());
    }
}
