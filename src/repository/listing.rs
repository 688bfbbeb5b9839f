//! Listing normalization for flat-keyed backends.
//!
//! Object stores have no real directories, only keys. Backends that list
//! flat keys feed them through [`list_immediate_children`] so that every
//! backend groups keys into pseudo-directories, dedupes them, and applies
//! prefix boundaries the same way.

use super::FileInfo;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// A flat object key together with the metadata the backend returned for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatObject {
    /// Repository-relative key, `/`-separated, without a leading slash.
    pub key: String,
    /// Size of the object in bytes.
    pub size: u64,
    /// Last modification time, if the backend records one.
    pub modified: Option<DateTime<Utc>>,
}

/// Group flat keys into the immediate children of `prefix`.
///
/// Only keys strictly below `prefix/` count (every key counts for the root
/// prefix), so `dir-12345` is never a child of `dir`. A key with further
/// separators below the prefix contributes a single directory entry named
/// after its first segment, no matter how many keys share that segment.
/// Directory entries report zero size and no modification time. Entries
/// come back sorted by name.
pub fn list_immediate_children(prefix: &str, objects: &[FlatObject]) -> Vec<FileInfo> {
    let boundary = if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    };

    let mut files: Vec<FileInfo> = Vec::new();
    let mut dirs: BTreeSet<&str> = BTreeSet::new();

    for object in objects {
        let Some(rest) = object.key.strip_prefix(&boundary) else {
            continue;
        };
        if rest.is_empty() {
            // Placeholder object sitting exactly at the prefix itself.
            continue;
        }
        match rest.split_once('/') {
            None => files.push(FileInfo {
                name: rest.to_string(),
                size: object.size,
                modified: object.modified,
                is_dir: false,
            }),
            Some((first, _)) => {
                if !first.is_empty() {
                    dirs.insert(first);
                }
            }
        }
    }

    let mut entries: Vec<FileInfo> = dirs
        .into_iter()
        .map(|name| FileInfo {
            name: name.to_string(),
            size: 0,
            modified: None,
            is_dir: true,
        })
        .collect();
    entries.append(&mut files);
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str) -> FlatObject {
        FlatObject {
            key: key.to_string(),
            size: 10,
            modified: None,
        }
    }

    fn tree() -> Vec<FlatObject> {
        vec![
            object("dir/0"),
            object("dir/1"),
            object("dir/2"),
            object("dir/3/0"),
            object("dir/3/1"),
            object("dir/3/2"),
            object("dir-12345/9"),
        ]
    }

    #[test]
    fn test_groups_direct_children_and_subdirs() {
        let entries = list_immediate_children("dir", &tree());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["0", "1", "2", "3"]);
        assert!(!entries[0].is_dir);
        assert!(entries[3].is_dir);
        assert_eq!(entries[3].size, 0);
        assert_eq!(entries[3].modified, None);
    }

    #[test]
    fn test_lists_nested_prefix() {
        let entries = list_immediate_children("dir/3", &tree());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["0", "1", "2"]);
        assert!(entries.iter().all(|e| !e.is_dir));
    }

    #[test]
    fn test_prefix_boundary_is_exact() {
        // `dir-12345/9` must never show up under `dir`.
        let entries = list_immediate_children("dir", &tree());
        assert!(entries.iter().all(|e| e.name != "9"));

        let entries = list_immediate_children("", &tree());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["dir", "dir-12345"]);
        assert!(entries.iter().all(|e| e.is_dir));
    }

    #[test]
    fn test_deep_keys_collapse_to_one_directory() {
        let objects = vec![object("a/x/1"), object("a/x/2"), object("a/y/3/4")];
        let entries = list_immediate_children("a", &objects);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[test]
    fn test_no_matching_keys_yields_empty() {
        assert!(list_immediate_children("missing", &tree()).is_empty());
        assert!(list_immediate_children("dir/0", &tree()).is_empty());
        assert!(list_immediate_children("", &[]).is_empty());
    }

    #[test]
    fn test_placeholder_at_prefix_is_skipped() {
        // Some tools create a zero-byte marker at the directory key itself.
        let objects = vec![object("logs/"), object("logs/app.log")];
        let entries = list_immediate_children("logs", &objects);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["app.log"]);
    }

    #[test]
    fn test_marker_key_registers_directory() {
        let objects = vec![object("data/empty-dir/")];
        let entries = list_immediate_children("data", &objects);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "empty-dir");
        assert!(entries[0].is_dir);
    }

    #[test]
    fn test_file_metadata_is_preserved() {
        let modified = DateTime::from_timestamp(1_700_000_000, 0);
        let objects = vec![FlatObject {
            key: "dir/data.bin".to_string(),
            size: 4096,
            modified,
        }];
        let entries = list_immediate_children("dir", &objects);
        assert_eq!(entries[0].size, 4096);
        assert_eq!(entries[0].modified, modified);
    }
}
