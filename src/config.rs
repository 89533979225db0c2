//! Typed configuration view consumed by the reconciler and executor.
//!
//! Parsing a config document from disk (YAML, TOML, whatever the host
//! program prefers) is an external collaborator's job; this module only
//! defines the shape the core expects to receive, with the same defaults
//! the original service used.

use std::path::PathBuf;

use serde::Deserialize;

/// Root configuration consumed by a reconcile cycle.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub left_root: PathBuf,
    pub right_root: PathBuf,

    #[serde(default)]
    pub soft_delete: SoftDeleteConfig,

    #[serde(default)]
    pub conflict_policy: ConflictPolicyConfig,

    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// When set, the executor logs actions instead of applying them.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Carried through for the host program's notification transport (SMTP,
    /// etc); the core only ever logs alerts, it never sends mail itself.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Carried through for the host program's log sink setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_dry_run() -> bool {
    true
}

impl Config {
    #[must_use]
    pub fn new(left_root: PathBuf, right_root: PathBuf) -> Self {
        Self {
            left_root,
            right_root,
            soft_delete: SoftDeleteConfig::default(),
            conflict_policy: ConflictPolicyConfig::default(),
            ignore: IgnoreConfig::default(),
            dry_run: default_dry_run(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Soft-delete (quarantine) behavior.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftDeleteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Size cap in megabytes; absent means no cap.
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl Default for SoftDeleteConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_size_mb: None,
        }
    }
}

impl SoftDeleteConfig {
    #[must_use]
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.max_size_mb.map(|mb| mb * 1024 * 1024)
    }

    /// Whether a file of the given size is eligible for soft-delete under
    /// this policy (enabled and, if a cap is set, under it).
    #[must_use]
    pub fn applies_to(&self, size: u64) -> bool {
        self.enabled && self.max_size_bytes().is_none_or(|cap| size <= cap)
    }
}

const fn default_true() -> bool {
    true
}

/// Per-conflict-type resolution strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    #[default]
    Clash,
    NotifyOnly,
    OverwriteNewer,
}

/// Resolution policy for each of the three conflict kinds (§4.5.6).
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictPolicyConfig {
    #[serde(default)]
    pub modify_modify: ConflictResolution,
    #[serde(default)]
    pub new_new: ConflictResolution,
    #[serde(default)]
    pub metadata_conflict: ConflictResolution,
}

impl Default for ConflictPolicyConfig {
    fn default() -> Self {
        Self {
            modify_modify: ConflictResolution::default(),
            new_new: ConflictResolution::default(),
            metadata_conflict: ConflictResolution::default(),
        }
    }
}

/// Scanner ignore rules. Directory names are matched case-insensitively;
/// everything else is matched case-sensitively against the basename.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub filenames_prefix: Vec<String>,
    #[serde(default)]
    pub filenames_exact: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
}

impl IgnoreConfig {
    /// Lowercased directory-name set, ready for case-insensitive lookups.
    #[must_use]
    pub fn directories_lower(&self) -> Vec<String> {
        self.directories.iter().map(|d| d.to_lowercase()).collect()
    }
}

/// Email notification transport settings. The core never opens an SMTP
/// connection itself; it only decides *whether* an alert was raised and
/// hands the typed records to whatever collaborator reads this config.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP auth username; also used as the `<user>` in conflict artifact
    /// names (spec §4.6, §6) when set, overriding OS-user detection.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from_addr: Option<String>,
    #[serde(default)]
    pub to_addrs: Vec<String>,
}

const fn default_smtp_port() -> u16 {
    587
}

/// Log sink settings for the host binary's `tracing-subscriber` setup.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::new(PathBuf::from("/left"), PathBuf::from("/right"));
        assert!(cfg.dry_run);
        assert!(cfg.soft_delete.enabled);
        assert_eq!(cfg.soft_delete.max_size_mb, None);
        assert_eq!(cfg.conflict_policy.modify_modify, ConflictResolution::Clash);
        assert!(cfg.ignore.extensions.is_empty());
    }

    #[test]
    fn soft_delete_cap_applies() {
        let mut sd = SoftDeleteConfig::default();
        sd.max_size_mb = Some(1);
        assert!(sd.applies_to(1024 * 1024));
        assert!(!sd.applies_to(1024 * 1024 + 1));
    }

    #[test]
    fn soft_delete_disabled_never_applies() {
        let sd = SoftDeleteConfig {
            enabled: false,
            max_size_mb: None,
        };
        assert!(!sd.applies_to(1));
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "left_root": "/a",
            "right_root": "/b",
            "soft_delete": {"enabled": true, "max_size_mb": 20},
            "conflict_policy": {"modify_modify": "overwrite_newer", "new_new": "clash", "metadata_conflict": "notify_only"},
            "ignore": {"extensions": [".tmp"], "filenames_prefix": ["~"], "filenames_exact": ["Thumbs.db"], "directories": ["System Volume Information"]},
            "dry_run": false
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.left_root, PathBuf::from("/a"));
        assert_eq!(cfg.soft_delete.max_size_mb, Some(20));
        assert_eq!(cfg.conflict_policy.modify_modify, ConflictResolution::OverwriteNewer);
        assert_eq!(cfg.ignore.directories_lower(), vec!["system volume information"]);
        assert!(!cfg.dry_run);
    }

    #[test]
    fn missing_roots_is_fatal() {
        let err = serde_json::from_str::<Config>(r#"{"left_root": "/a"}"#).unwrap_err();
        assert!(err.to_string().contains("right_root"));
    }

    #[test]
    fn notify_and_logging_defaults() {
        let cfg = Config::new(PathBuf::from("/left"), PathBuf::from("/right"));
        assert!(!cfg.notify.enabled);
        assert_eq!(cfg.notify.smtp_port, 587);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.file_path.is_none());
    }

    #[test]
    fn parse_notify_config() {
        let json = r#"{
            "left_root": "/a",
            "right_root": "/b",
            "notify": {"enabled": true, "smtp_host": "mail.example.com", "to_addrs": ["a@example.com"]},
            "logging": {"level": "debug", "file_path": "/var/log/bisync.log"}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert!(cfg.notify.enabled);
        assert_eq!(cfg.notify.smtp_host.as_deref(), Some("mail.example.com"));
        assert_eq!(cfg.notify.to_addrs, vec!["a@example.com".to_owned()]);
        assert_eq!(cfg.logging.level, "debug");
    }
}
