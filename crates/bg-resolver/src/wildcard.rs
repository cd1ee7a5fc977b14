//! Wildcard source-group expansion (`spec.md` §4.6 step 3, §4.8 step 5
//! "re-expand wildcards and compare to stored wildcard file sets").
//!
//! `bg_core::SourceGroup` only stores glob pattern strings; matching against
//! disk is an external concern plugged in here via `globset`, the same way
//! `bg_core::rule::FileTagger`'s doc comment describes regex matching being
//! plugged in by this crate.

use crate::error::{ResolverError, Result};
use bg_core::ProductId;
use globset::{Glob, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Expands a set of glob patterns (relative to `base_dir`) against disk,
/// returning the matched files in a stable, sorted order so re-expansion for
/// drift detection (§4.8 step 5) is deterministic.
pub fn expand_wildcards(
    product: ProductId,
    base_dir: &Path,
    patterns: &[String],
) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ResolverError::InvalidWildcard {
            product,
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| ResolverError::InvalidWildcard {
        product,
        pattern: patterns.join(", "),
        message: e.to_string(),
    })?;

    let mut matches = Vec::new();
    walk(base_dir, base_dir, &set, &mut matches);
    matches.sort();
    matches.dedup();
    Ok(matches)
}

fn walk(root: &Path, dir: &Path, set: &globset::GlobSet, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(root, &path, set, out);
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            if set.is_match(relative) {
                out.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expands_nested_glob_against_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        fs::write(dir.path().join("src/a.cpp"), "").unwrap();
        fs::write(dir.path().join("src/sub/b.cpp"), "").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "").unwrap();

        let matched = expand_wildcards(
            ProductId(0),
            dir.path(),
            &["src/**/*.cpp".to_string()],
        )
        .unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn rejects_invalid_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let result = expand_wildcards(ProductId(0), dir.path(), &["[".to_string()]);
        assert!(result.is_err());
    }
}
