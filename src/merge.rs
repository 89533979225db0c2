//! Scan merger (spec §4.3).
//!
//! Fuses independent left/right scans into one mapping keyed by canonical
//! path, matching case-insensitively while preserving each side's actual
//! casing. A case mismatch between the two sides produces *two* output
//! entries — one under each casing — which is exactly the signal the
//! reconciler's case-change/case-conflict phase looks for.

use std::collections::{BTreeMap, HashMap};

use crate::model::{FileMetadata, ScanEntry};

/// Merge a left and right scan into the unified view consumed by the
/// reconciler. Every key from either input appears in the output under its
/// own casing at least once (spec invariant).
pub fn merge(
    left: &BTreeMap<String, ScanEntry>,
    right: &BTreeMap<String, ScanEntry>,
) -> BTreeMap<String, FileMetadata> {
    let mut result = BTreeMap::new();

    let right_lower_to_actual: HashMap<String, &String> =
        right.keys().map(|k| (k.to_lowercase(), k)).collect();
    let mut processed_right: std::collections::HashSet<&String> = std::collections::HashSet::new();

    for (left_path, left_entry) in left {
        let left_lower = left_path.to_lowercase();

        let right_actual: Option<&String> = if right.contains_key(left_path) {
            Some(left_path)
        } else {
            match right_lower_to_actual.get(&left_lower) {
                // Another left key already claims this right key by exact case;
                // don't steal it for a lossy case-insensitive match.
                Some(candidate) if left.contains_key(*candidate) => None,
                Some(candidate) => Some(*candidate),
                None => None,
            }
        };

        if let Some(r_path) = right_actual {
            processed_right.insert(r_path);
        }

        let right_entry = right_actual.map(|p| right[p]);

        result.insert(
            left_path.clone(),
            FileMetadata::new(left_path.clone(), Some((*left_entry).into()), right_entry.map(Into::into)),
        );

        if let Some(r_path) = right_actual {
            if r_path != left_path && !result.contains_key(r_path) {
                result.insert(
                    r_path.clone(),
                    FileMetadata::new(r_path.clone(), None, Some(right[r_path].into())),
                );
            }
        }
    }

    for (right_path, right_entry) in right {
        if processed_right.contains(right_path) {
            continue;
        }
        result.insert(
            right_path.clone(),
            FileMetadata::new(right_path.clone(), None, Some((*right_entry).into())),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanEntry;

    fn entry(mtime: f64, size: i64) -> ScanEntry {
        ScanEntry { mtime, size, attrs: 0 }
    }

    #[test]
    fn exact_case_match_merges_one_entry() {
        let mut left = BTreeMap::new();
        left.insert("a.txt".to_owned(), entry(1.0, 10));
        let mut right = BTreeMap::new();
        right.insert("a.txt".to_owned(), entry(1.0, 10));

        let merged = merge(&left, &right);
        assert_eq!(merged.len(), 1);
        let m = &merged["a.txt"];
        assert!(m.exists_left() && m.exists_right());
    }

    #[test]
    fn case_mismatch_emits_two_entries() {
        let mut left = BTreeMap::new();
        left.insert("File.txt".to_owned(), entry(1.0, 10));
        let mut right = BTreeMap::new();
        right.insert("file.txt".to_owned(), entry(2.0, 10));

        let merged = merge(&left, &right);
        assert_eq!(merged.len(), 2);
        assert!(merged["File.txt"].exists_left());
        assert!(merged["file.txt"].exists_right());
        assert!(!merged["file.txt"].exists_left());
    }

    #[test]
    fn exact_case_pair_on_both_sides_is_not_stolen() {
        // left has both "Test.txt" and "test.txt"; right only has "test.txt".
        // "test.txt" must match its exact-case left counterpart, not "Test.txt".
        let mut left = BTreeMap::new();
        left.insert("Test.txt".to_owned(), entry(1.0, 1));
        left.insert("test.txt".to_owned(), entry(2.0, 2));
        let mut right = BTreeMap::new();
        right.insert("test.txt".to_owned(), entry(3.0, 2));

        let merged = merge(&left, &right);
        assert!(merged["test.txt"].exists_left() && merged["test.txt"].exists_right());
        assert!(merged["Test.txt"].exists_left() && !merged["Test.txt"].exists_right());
    }

    #[test]
    fn right_only_keys_use_right_casing() {
        let left = BTreeMap::new();
        let mut right = BTreeMap::new();
        right.insert("Only.txt".to_owned(), entry(1.0, 1));

        let merged = merge(&left, &right);
        assert_eq!(merged.len(), 1);
        assert!(merged["Only.txt"].exists_right());
        assert!(!merged["Only.txt"].exists_left());
    }
}
