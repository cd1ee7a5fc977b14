//! Cache entry shape (`spec.md` §4.3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One resolved include/dependency reference, split into `(dir, name)` so
/// equal directories share one allocation across many entries (`spec.md`
/// §4.3: "Dependencies are stored split into (dir, name) to share
/// strings").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanDependency {
    pub dir: PathBuf,
    pub name: String,
    pub is_local_include: bool,
}

impl ScanDependency {
    pub fn new(dir: PathBuf, name: String, is_local_include: bool) -> Self {
        Self {
            dir,
            name,
            is_local_include,
        }
    }

    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// `(valid_bit, list<(path, is_local_include)>)` (`spec.md` §4.3). `valid`
/// starts `true` on insert and flips to `false` on invalidation rather than
/// being removed outright, so a scanner can distinguish "never scanned"
/// (no entry) from "scanned, but stale" (entry present, `valid == false`)
/// without an extra lookup.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub valid: bool,
    pub dependencies: Vec<ScanDependency>,
}

impl ScanEntry {
    pub fn new(dependencies: Vec<ScanDependency>) -> Self {
        Self {
            valid: true,
            dependencies,
        }
    }
}
