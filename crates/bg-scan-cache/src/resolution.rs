//! Include-resolution cache keyed on `(filename, dirpath)` (`spec.md` §4.4
//! step 4d), distinct from [`crate::ScanResultCache`]: this one memoizes the
//! *resolved* absolute path for a given include name searched from a given
//! starting directory, so the scanner doesn't repeat an include-path walk
//! for the same `(name, dir)` pair within one invocation.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

pub type ResolutionKey = (String, PathBuf);

#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    resolved: FxHashMap<ResolutionKey, Option<PathBuf>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, dir: &Path) -> Option<Option<&PathBuf>> {
        self.resolved
            .get(&(name.to_string(), dir.to_path_buf()))
            .map(|v| v.as_ref())
    }

    /// Records the resolution outcome (`None` for "could not be resolved")
    /// so a later lookup from the same directory skips the search.
    pub fn put(&mut self, name: String, dir: PathBuf, resolved: Option<PathBuf>) {
        self.resolved.insert((name, dir), resolved);
    }

    pub fn clear(&mut self) {
        self.resolved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_both_hits_and_misses() {
        let mut cache = ResolutionCache::new();
        let dir = PathBuf::from("/usr/include");
        cache.put(
            "stdio.h".to_string(),
            dir.clone(),
            Some(PathBuf::from("/usr/include/stdio.h")),
        );
        cache.put("nope.h".to_string(), dir.clone(), None);

        assert_eq!(
            cache.get("stdio.h", &dir),
            Some(Some(&PathBuf::from("/usr/include/stdio.h")))
        );
        assert_eq!(cache.get("nope.h", &dir), Some(None));
        assert_eq!(cache.get("unseen.h", &dir), None);
    }
}
