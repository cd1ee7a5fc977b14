//! Regex-over-filename tag inference (`spec.md` §3.1 "File tagger"). Plugged
//! in here via the `regex` crate, as `bg_core::rule::FileTagger`'s doc
//! comment anticipates.

use crate::error::{ResolverError, Result};
use bg_core::{FileTag, FileTagSet, FileTagger};
use regex::Regex;

/// Compiled form of a product's file taggers, evaluated once per resolve
/// pass rather than recompiling a pattern per source file.
pub struct CompiledTaggers(Vec<(Regex, FileTagSet)>);

impl CompiledTaggers {
    pub fn compile(taggers: &[FileTagger]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(taggers.len());
        for tagger in taggers {
            let regex = Regex::new(&tagger.pattern).map_err(|e| ResolverError::InvalidFileTagger {
                pattern: tagger.pattern.clone(),
                message: e.to_string(),
            })?;
            compiled.push((regex, tagger.tags.clone()));
        }
        Ok(Self(compiled))
    }

    /// Every tagger whose pattern matches `file_name` contributes its tags;
    /// a file may pick up tags from more than one tagger.
    pub fn tags_for(&self, file_name: &str) -> FileTagSet {
        let mut tags = FileTagSet::new();
        for (regex, tagger_tags) in &self.0 {
            if regex.is_match(file_name) {
                tags.union_with(tagger_tags);
            }
        }
        tags
    }
}

/// Convenience used by the AutoTag pre-pass (`spec.md` §4.7 step 3): returns
/// only the tags not already present on `existing`.
pub fn newly_inferred_tags(existing: &FileTagSet, inferred: &FileTagSet) -> Vec<FileTag> {
    inferred
        .iter()
        .filter(|t| !existing.contains(t))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_pattern_contributes_tags() {
        let taggers = vec![FileTagger::new(
            r"\.hpp$",
            FileTagSet::from_iter([FileTag::from("hpp")]),
        )];
        let compiled = CompiledTaggers::compile(&taggers).unwrap();
        let tags = compiled.tags_for("widget.hpp");
        assert!(tags.contains(&FileTag::from("hpp")));
        assert!(compiled.tags_for("widget.cpp").is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let taggers = vec![FileTagger::new("(", FileTagSet::new())];
        assert!(CompiledTaggers::compile(&taggers).is_err());
    }
}
