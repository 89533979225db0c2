//! Snapshot store (spec §4.4): the persisted post-sync state that the
//! reconciler uses as its three-way merge base on the next cycle.
//!
//! Storage is a single JSON document, one record per tracked path, written
//! atomically via [`crate::io::AtomicWriter`] so a concurrent `load()` from
//! another process never observes a half-written file. The schema carries an
//! explicit version; new attribute columns are added with `#[serde(default)]`
//! so older records deserialize with those fields absent rather than failing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::{self, AtomicWriter};
use crate::model::{FileMetadata, SideView};

/// Current on-disk schema version. Bump when adding a column that an older
/// reader would otherwise misinterpret; additive columns don't need a bump
/// because `#[serde(default)]` already covers them.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to write snapshot: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(default = "default_version")]
    version: u32,
    records: Vec<SnapshotRecord>,
}

const fn default_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    path: String,
    exists_left: bool,
    exists_right: bool,
    mtime_left: Option<f64>,
    mtime_right: Option<f64>,
    size_left: Option<i64>,
    size_right: Option<i64>,
    #[serde(default)]
    attrs_left: Option<u8>,
    #[serde(default)]
    attrs_right: Option<u8>,
}

impl From<&FileMetadata> for SnapshotRecord {
    fn from(meta: &FileMetadata) -> Self {
        Self {
            path: meta.relative_path.clone(),
            exists_left: meta.left.is_some(),
            exists_right: meta.right.is_some(),
            mtime_left: meta.left.map(|s| s.mtime),
            mtime_right: meta.right.map(|s| s.mtime),
            size_left: meta.left.map(|s| s.size),
            size_right: meta.right.map(|s| s.size),
            attrs_left: meta.left.map(|s| s.attrs),
            attrs_right: meta.right.map(|s| s.attrs),
        }
    }
}

impl From<SnapshotRecord> for FileMetadata {
    fn from(rec: SnapshotRecord) -> Self {
        let left = rec.exists_left.then(|| SideView {
            mtime: rec.mtime_left.unwrap_or(0.0),
            size: rec.size_left.unwrap_or(0),
            attrs: rec.attrs_left.unwrap_or(0),
        });
        let right = rec.exists_right.then(|| SideView {
            mtime: rec.mtime_right.unwrap_or(0.0),
            size: rec.size_right.unwrap_or(0),
            attrs: rec.attrs_right.unwrap_or(0),
        });
        FileMetadata::new(rec.path, left, right)
    }
}

/// A path-keyed store backed by a single JSON file.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the last persisted snapshot. A missing file, unreadable file, or
    /// corrupt document all degrade to an empty snapshot (first-run
    /// semantics) rather than failing the cycle.
    #[must_use]
    pub fn load(&self) -> BTreeMap<String, FileMetadata> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read snapshot, treating as first run");
                return BTreeMap::new();
            }
        };

        match serde_json::from_slice::<SnapshotFile>(&bytes) {
            Ok(file) => {
                tracing::debug!(version = file.version, count = file.records.len(), "loaded snapshot");
                file.records
                    .into_iter()
                    .map(|r| (r.path.clone(), FileMetadata::from(r)))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "snapshot corrupt, treating as first run");
                BTreeMap::new()
            }
        }
    }

    /// Persist `state` as the new post-sync snapshot, replacing the entire
    /// previous file atomically. A write failure is fatal to the cycle: the
    /// prior snapshot is left untouched because the rename into place never
    /// happens.
    pub fn save(&self, state: &BTreeMap<String, FileMetadata>) -> Result<(), SnapshotError> {
        let file = SnapshotFile {
            version: SCHEMA_VERSION,
            records: state.values().map(SnapshotRecord::from).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        io::ensure_directory(parent)?;
        let temp_path = io::generate_temp_path(parent);

        let mut writer = AtomicWriter::new(temp_path, self.path.clone())?;
        writer.write(&bytes)?;
        writer.commit()?;

        tracing::info!(path = %self.path.display(), count = state.len(), "saved snapshot");
        Ok(())
    }
}
