//! `ScanResultCache` (`spec.md` §4.3).

use crate::entry::{ScanDependency, ScanEntry};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maps `absolute_file_path -> ScanEntry` (`spec.md` §4.3). A successful
/// scan inserts an entry; any modification to a file invalidates its own
/// entry; the executor removes an entry outright once the file finishes
/// building, since a freshly built file needs a fresh scan next time it is
/// read as an input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResultCache {
    entries: FxHashMap<PathBuf, ScanEntry>,
}

impl ScanResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful scan of `path`.
    pub fn insert(&mut self, path: PathBuf, dependencies: Vec<ScanDependency>) {
        self.entries.insert(path, ScanEntry::new(dependencies));
    }

    /// Returns the cached entry for `path` if one is present and still
    /// valid. A present-but-invalid entry is treated the same as a miss by
    /// callers that only want fresh results; use [`Self::peek`] to see a
    /// stale entry's former contents.
    pub fn get(&self, path: &Path) -> Option<&ScanEntry> {
        self.entries.get(path).filter(|e| e.valid)
    }

    /// Returns the cached entry for `path` regardless of validity.
    pub fn peek(&self, path: &Path) -> Option<&ScanEntry> {
        self.entries.get(path)
    }

    /// Invalidates `path`'s entry (a modification to the file was
    /// observed), without discarding the stale dependency list — the next
    /// scan overwrites it via [`Self::insert`].
    pub fn invalidate(&mut self, path: &Path) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.valid = false;
        }
    }

    /// Removes `path`'s entry outright, called by the executor once the
    /// file finishes building (`spec.md` §4.3).
    pub fn remove(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str) -> ScanDependency {
        ScanDependency::new(PathBuf::from("/usr/include"), name.to_string(), false)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut cache = ScanResultCache::new();
        let path = PathBuf::from("/src/main.c");
        cache.insert(path.clone(), vec![dep("stdio.h")]);
        let entry = cache.get(&path).unwrap();
        assert!(entry.valid);
        assert_eq!(entry.dependencies.len(), 1);
    }

    #[test]
    fn invalidate_hides_entry_from_get_but_keeps_peek() {
        let mut cache = ScanResultCache::new();
        let path = PathBuf::from("/src/main.c");
        cache.insert(path.clone(), vec![dep("stdio.h")]);
        cache.invalidate(&path);
        assert!(cache.get(&path).is_none());
        assert!(cache.peek(&path).is_some());
    }

    #[test]
    fn remove_drops_entry_entirely() {
        let mut cache = ScanResultCache::new();
        let path = PathBuf::from("/src/main.c");
        cache.insert(path.clone(), vec![dep("stdio.h")]);
        cache.remove(&path);
        assert!(cache.peek(&path).is_none());
    }

    #[test]
    fn reinsert_after_invalidate_restores_validity() {
        let mut cache = ScanResultCache::new();
        let path = PathBuf::from("/src/main.c");
        cache.insert(path.clone(), vec![dep("stdio.h")]);
        cache.invalidate(&path);
        cache.insert(path.clone(), vec![dep("stdio.h"), dep("stdlib.h")]);
        let entry = cache.get(&path).unwrap();
        assert!(entry.valid);
        assert_eq!(entry.dependencies.len(), 2);
    }
}
