//! Merkle change-detection cache.
//!
//! Tracks `(content_hash, mtime, size)` per workspace-relative path. The
//! (mtime, size) pair is a cheap pre-screen: when both match the cached
//! entry the file is not re-read. The root hash over all `(path, hash)`
//! pairs summarizes the indexed state and is independent of insertion
//! order.

use crate::ident::{hash16, sha256_hex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleEntry {
    pub hash: String,
    pub mtime_ms: i64,
    pub size: u64,
}

/// Classification of a file set against the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: HashMap<String, MerkleEntry>,
}

#[derive(Debug, Default)]
pub struct MerkleCache {
    entries: HashMap<String, MerkleEntry>,
    dirty: bool,
}

impl MerkleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when entries changed since the last `build_tree`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, path: &str) -> Option<&MerkleEntry> {
        self.entries.get(path)
    }

    /// Hash one file, re-reading only when the (mtime, size) pre-screen
    /// says the content may have changed.
    pub fn hash_file(&mut self, abs: &Path, key: &str) -> std::io::Result<MerkleEntry> {
        let (mtime_ms, size) = stat(abs)?;
        if let Some(cached) = self.entries.get(key) {
            if cached.mtime_ms == mtime_ms && cached.size == size {
                return Ok(cached.clone());
            }
        }

        // Hash raw bytes: files that are not valid UTF-8 still need
        // change tracking so the indexer can record their read failure.
        let bytes = fs::read(abs)?;
        let entry = MerkleEntry {
            hash: hash16(&bytes),
            mtime_ms,
            size,
        };
        self.insert(key, entry.clone());
        Ok(entry)
    }

    /// Classify `files` (workspace-relative, resolved against `root`)
    /// against the cache, updating it as a side effect. Unreadable files
    /// are skipped with a warning.
    pub fn find_changed(&mut self, root: &Path, files: &[String]) -> ChangeSet {
        let mut change_set = ChangeSet::default();

        for rel in files {
            let previous = self.entries.get(rel).map(|e| e.hash.clone());
            let entry = match self.hash_file(&root.join(rel), rel) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable file {rel}: {e}");
                    continue;
                }
            };

            match previous {
                None => change_set.added.push(rel.clone()),
                Some(old_hash) if old_hash != entry.hash => change_set.modified.push(rel.clone()),
                Some(_) => change_set.unchanged.push(rel.clone()),
            }
        }

        change_set
    }

    /// Files present in the cache but absent from `current_files`.
    pub fn find_deleted(&self, current_files: &[String]) -> Vec<String> {
        let current: HashSet<&str> = current_files.iter().map(|s| s.as_str()).collect();
        let mut deleted: Vec<String> = self
            .entries
            .keys()
            .filter(|path| !current.contains(path.as_str()))
            .cloned()
            .collect();
        deleted.sort();
        deleted
    }

    pub fn insert(&mut self, path: &str, entry: MerkleEntry) {
        self.entries.insert(path.to_string(), entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.dirty = true;
        }
        self.entries.clear();
    }

    /// Merkle root over sorted `(path, hash)` pairs. Odd levels duplicate
    /// the last node. Deterministic for a given entry set; clears the
    /// dirty flag.
    pub fn build_tree(&mut self) -> String {
        let sorted: BTreeMap<&String, &MerkleEntry> = self.entries.iter().collect();
        let mut level: Vec<String> = sorted
            .iter()
            .map(|(path, entry)| sha256_hex(format!("{path}\0{}", entry.hash).as_bytes()))
            .collect();

        if level.is_empty() {
            self.dirty = false;
            return sha256_hex(b"");
        }

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                level.push(level.last().cloned().unwrap_or_default());
            }
            level = level
                .chunks(2)
                .map(|pair| sha256_hex(format!("{}{}", pair[0], pair[1]).as_bytes()))
                .collect();
        }

        self.dirty = false;
        level.remove(0)
    }

    /// Persist the cache as versioned JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.clone(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, data)
    }

    /// Load a snapshot. Missing, unreadable, or version-mismatched content
    /// yields an empty cache rather than an error.
    pub fn load(path: &Path) -> Self {
        let Ok(data) = fs::read(path) else {
            return Self::new();
        };
        match serde_json::from_slice::<Snapshot>(&data) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Self {
                entries: snapshot.entries,
                dirty: false,
            },
            _ => {
                tracing::warn!("merkle snapshot at {} is unreadable, starting empty", path.display());
                Self::new()
            }
        }
    }
}

fn stat(path: &Path) -> std::io::Result<(i64, u64)> {
    let metadata = fs::metadata(path)?;
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok((mtime_ms, metadata.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn classifies_added_modified_unchanged() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", "fn a() {}");
        write(temp.path(), "b.rs", "fn b() {}");

        let mut cache = MerkleCache::new();
        let files = vec!["a.rs".to_string(), "b.rs".to_string()];

        let first = cache.find_changed(temp.path(), &files);
        assert_eq!(first.added.len(), 2);
        assert!(first.modified.is_empty());

        write(temp.path(), "a.rs", "fn a() { changed() }");
        let second = cache.find_changed(temp.path(), &files);
        assert_eq!(second.added.len(), 0);
        assert_eq!(second.modified, vec!["a.rs".to_string()]);
        assert_eq!(second.unchanged, vec!["b.rs".to_string()]);
    }

    #[test]
    fn find_changed_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", "fn a() {}");

        let mut cache = MerkleCache::new();
        let files = vec!["a.rs".to_string()];
        cache.find_changed(temp.path(), &files);
        let again = cache.find_changed(temp.path(), &files);
        assert!(again.is_empty());
        assert_eq!(again.unchanged, files);
    }

    #[test]
    fn finds_deleted() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", "fn a() {}");
        write(temp.path(), "b.rs", "fn b() {}");

        let mut cache = MerkleCache::new();
        cache.find_changed(
            temp.path(),
            &["a.rs".to_string(), "b.rs".to_string()],
        );

        let deleted = cache.find_deleted(&["a.rs".to_string()]);
        assert_eq!(deleted, vec!["b.rs".to_string()]);
    }

    #[test]
    fn root_is_order_independent() {
        let mut left = MerkleCache::new();
        let mut right = MerkleCache::new();
        let entry = |h: &str| MerkleEntry {
            hash: h.to_string(),
            mtime_ms: 0,
            size: 0,
        };

        left.insert("a.rs", entry("h1"));
        left.insert("b.rs", entry("h2"));
        left.insert("c.rs", entry("h3"));

        right.insert("c.rs", entry("h3"));
        right.insert("a.rs", entry("h1"));
        right.insert("b.rs", entry("h2"));

        assert_eq!(left.build_tree(), right.build_tree());
    }

    #[test]
    fn build_tree_clears_dirty() {
        let mut cache = MerkleCache::new();
        cache.insert(
            "a.rs",
            MerkleEntry {
                hash: "h".into(),
                mtime_ms: 0,
                size: 1,
            },
        );
        assert!(cache.is_dirty());
        cache.build_tree();
        assert!(!cache.is_dirty());
    }

    #[test]
    fn save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", "fn a() {}");

        let mut cache = MerkleCache::new();
        cache.find_changed(temp.path(), &["a.rs".to_string()]);
        let root_before = cache.build_tree();

        let snapshot = temp.path().join("cache/merkle.json");
        cache.save(&snapshot).unwrap();

        let mut restored = MerkleCache::load(&snapshot);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.build_tree(), root_before);
    }

    #[test]
    fn corrupt_snapshot_loads_empty() {
        let temp = TempDir::new().unwrap();
        let snapshot = temp.path().join("merkle.json");
        fs::write(&snapshot, "{ not json").unwrap();
        assert!(MerkleCache::load(&snapshot).is_empty());
    }
}
