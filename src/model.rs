//! Core data model: scan entries, merged metadata, and reconciler actions.

use serde::{Deserialize, Serialize};

/// Hidden attribute bit.
pub const ATTR_HIDDEN: u8 = 0x01;
/// Read-only attribute bit.
pub const ATTR_READONLY: u8 = 0x02;
/// Archive attribute bit.
pub const ATTR_ARCHIVE: u8 = 0x04;

/// Sentinel size used for an empty-directory entry.
pub const DIR_SENTINEL_SIZE: i64 = -1;

/// A single side's view of one path, as produced by the scanner.
///
/// `size == DIR_SENTINEL_SIZE` marks an empty directory rather than a file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub mtime: f64,
    pub size: i64,
    pub attrs: u8,
}

impl ScanEntry {
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.size == DIR_SENTINEL_SIZE
    }
}

/// One side's contribution to a merged [`FileMetadata`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SideView {
    pub mtime: f64,
    pub size: i64,
    pub attrs: u8,
}

impl SideView {
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.size == DIR_SENTINEL_SIZE
    }
}

impl From<ScanEntry> for SideView {
    fn from(entry: ScanEntry) -> Self {
        Self {
            mtime: entry.mtime,
            size: entry.size,
            attrs: entry.attrs,
        }
    }
}

/// The unified entry produced by the merger and persisted in the snapshot.
///
/// At least one of `left`/`right` is always populated; a merged entry with
/// both sides empty is a logic error upstream and never constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub relative_path: String,
    pub left: Option<SideView>,
    pub right: Option<SideView>,
}

impl FileMetadata {
    #[must_use]
    pub fn new(relative_path: String, left: Option<SideView>, right: Option<SideView>) -> Self {
        Self {
            relative_path,
            left,
            right,
        }
    }

    #[must_use]
    pub fn exists_left(&self) -> bool {
        self.left.is_some()
    }

    #[must_use]
    pub fn exists_right(&self) -> bool {
        self.right.is_some()
    }

    /// A directory sentinel if either side says so; mixed file/dir entries
    /// at the same path are not produced by the scanner.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.left.map(SideView::is_directory).unwrap_or(false)
            || self.right.map(SideView::is_directory).unwrap_or(false)
    }
}

/// The kind of operation an [`Action`] asks the executor to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CopyLToR,
    CopyRToL,
    DeleteL,
    DeleteR,
    SoftDeleteL,
    SoftDeleteR,
    ClashCreate,
    CaseConflict,
    RenameL,
    RenameR,
    RenameConflict,
    CreateDirL,
    CreateDirR,
    DeleteDirL,
    DeleteDirR,
    SyncAttrsLToR,
    SyncAttrsRToL,
    Noop,
}

/// Bytes and timestamp of a file version captured at detection time, so the
/// executor can preserve it as a conflict artifact even if the live file is
/// mutated or removed before execution runs.
#[derive(Clone, Debug, Default)]
pub struct ConflictPayload {
    pub older_bytes: Option<Vec<u8>>,
    pub older_mtime: Option<f64>,
    pub newer_mtime: Option<f64>,
}

/// A single planned operation for the executor.
///
/// Value type, freely copyable in spirit (payload bytes aside), produced
/// once per reconcile cycle. `secondary` carries a rename destination or a
/// conflict counterpart depending on `kind`.
#[derive(Clone, Debug)]
pub struct Action {
    pub kind: ActionKind,
    pub path: String,
    pub secondary: Option<String>,
    pub attrs: Option<u8>,
    pub payload: Option<ConflictPayload>,
    pub reason: String,
}

impl Action {
    #[must_use]
    pub fn new(kind: ActionKind, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            secondary: None,
            attrs: None,
            payload: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: u8) -> Self {
        self.attrs = Some(attrs);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: ConflictPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}
