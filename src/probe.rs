//! Filesystem mtime-precision probe (spec §4.1).
//!
//! Measures how much modification-time fidelity is lost copying a file
//! between the two roots, so the reconciler can use a tolerance wide
//! enough to avoid spurious "changed" classifications on lossy filesystems
//! (network drives, FAT).

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::io;

const PROBE_FILE_NAME: &str = ".bisync_precision_test.tmp";

/// Conservative fallback tolerance, used whenever the probe can't complete.
pub const FALLBACK_TOLERANCE_SECS: f64 = 2.0;

fn to_epoch_secs(t: SystemTime) -> f64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Detect the mtime tolerance that should be used for comparisons between
/// `left_root` and `right_root`. Never fails the calling cycle: any I/O
/// error collapses to [`FALLBACK_TOLERANCE_SECS`].
pub fn detect_mtime_tolerance(left_root: &Path, right_root: &Path) -> f64 {
    match try_probe(left_root, right_root) {
        Ok(tolerance) => tolerance,
        Err(e) => {
            tracing::warn!(error = %e, "mtime precision probe failed, using conservative tolerance");
            FALLBACK_TOLERANCE_SECS
        }
    }
}

fn try_probe(left_root: &Path, right_root: &Path) -> std::io::Result<f64> {
    let left_probe = left_root.join(PROBE_FILE_NAME);
    let right_probe = right_root.join(PROBE_FILE_NAME);

    let cleanup = |l: &Path, r: &Path| {
        let _ = io::remove_file_safe(l);
        let _ = io::remove_file_safe(r);
    };

    let result = (|| -> std::io::Result<f64> {
        std::fs::write(&left_probe, b"precision test")?;
        std::thread::sleep(Duration::from_millis(100));

        let original_mtime = std::fs::metadata(&left_probe)?.modified()?;
        io::copy_file_with_metadata(&left_probe, &right_probe, true)?;
        let copied_mtime = std::fs::metadata(&right_probe)?.modified()?;

        let diff = (to_epoch_secs(original_mtime) - to_epoch_secs(copied_mtime)).abs();
        tracing::debug!(diff_secs = diff, "mtime precision probe measured difference");

        let tolerance = if diff >= 1.0 {
            2.0
        } else if diff > 0.001 {
            (diff * 2.0).max(1.0)
        } else {
            0.1
        };
        Ok(tolerance)
    })();

    cleanup(&left_probe, &right_probe);
    result
}
