//! Alert records surfaced to the notification collaborator (spec §3, §6).
//!
//! The core never sends an email or writes a dry-run report itself; it only
//! decides when a conflict or a failure is notable and hands back typed
//! records. What a host program does with them (SMTP, a log line, nothing)
//! is outside this crate.

use crate::model::Action;

/// The three conflict shapes the reconciler's content-conflict phase
/// distinguishes (spec §4.5.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    ModifyModify,
    NewNew,
    MetadataConflict,
    CaseConflict,
    RenameConflict,
}

impl ConflictKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModifyModify => "modify_modify",
            Self::NewNew => "new_new",
            Self::MetadataConflict => "metadata_conflict",
            Self::CaseConflict => "case_conflict",
            Self::RenameConflict => "rename_conflict",
        }
    }
}

/// A conflict the reconciler detected, for post-cycle reporting.
#[derive(Clone, Debug)]
pub struct ConflictAlert {
    pub path: String,
    pub kind: ConflictKind,
    pub left_mtime: Option<f64>,
    pub right_mtime: Option<f64>,
    pub left_size: Option<i64>,
    pub right_size: Option<i64>,
    pub resolution: String,
}

/// An executor action that failed (recoverably) during a cycle.
#[derive(Clone, Debug)]
pub struct ErrorAlert {
    pub path: String,
    pub kind: String,
    pub message: String,
}

/// The outcome of one reconcile cycle, handed back to the caller for
/// logging, dry-run pretty-printing, or email delivery — none of which are
/// this crate's job.
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    pub conflict_alerts: Vec<ConflictAlert>,
    pub error_alerts: Vec<ErrorAlert>,
    pub executed: usize,
    pub failed: usize,
    pub actions_planned: usize,

    /// Set when the snapshot write at the end of the cycle failed (spec
    /// §4.4/§7: fatal, with the prior on-disk snapshot left untouched). A
    /// caller must not treat a cycle with this set as clean, even if every
    /// action succeeded — the next cycle will re-reconcile from stale state.
    pub snapshot_error: Option<String>,
}

impl CycleReport {
    #[must_use]
    pub fn completed_with_errors(&self) -> bool {
        self.failed > 0
    }

    /// Whether the cycle hit the one fatal failure class the core can raise
    /// on its own (spec §7): the post-cycle snapshot write.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.snapshot_error.is_some()
    }

    pub fn record_error(&mut self, action: &Action, message: impl Into<String>) {
        self.error_alerts.push(ErrorAlert {
            path: action.path.clone(),
            kind: format!("{:?}", action.kind),
            message: message.into(),
        });
        self.failed += 1;
    }
}
