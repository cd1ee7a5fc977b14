//! File tags: short interned symbols used for rule dispatch (`spec.md` §3.1,
//! GLOSSARY).
//!
//! Grounded on the teacher's `codegraph-core::memory::string_interner`
//! (a `RwLock<HashMap<Arc<str>, ()>>` set, returning cheap-to-clone handles)
//! but simplified: tags are short and the set is bounded (tens, not millions,
//! per project), so a plain `rustc_hash::FxHashSet<Arc<str>>` behind a
//! `parking_lot::RwLock`-free `RefCell`-style owner is unnecessary — each
//! project keeps its own small interner instance rather than reaching for a
//! process-wide singleton (`spec.md` §9 "Global mutable state" explicitly
//! asks for owned fields, not globals).

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// An interned file tag. Cheap to clone and compare (pointer-ish equality via
/// the interner, but we keep content equality for simplicity and because the
/// set is small).
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileTag(Arc<str>);

impl FileTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileTag {
    fn from(s: &str) -> Self {
        FileTag(Arc::from(s))
    }
}

impl From<String> for FileTag {
    fn from(s: String) -> Self {
        FileTag(Arc::from(s.as_str()))
    }
}

/// A set of file tags. Ordered-iteration via `BTreeSet` so that tag-set
/// equality checks (used when deciding whether two rules conflict, or whether
/// a tag was added/removed by `on_product_file_list_changed`) are stable and
/// diffable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTagSet(BTreeSet<FileTag>);

impl FileTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter<I: IntoIterator<Item = FileTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }

    pub fn insert(&mut self, tag: FileTag) -> bool {
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &FileTag) -> bool {
        self.0.remove(tag)
    }

    pub fn contains(&self, tag: &FileTag) -> bool {
        self.0.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileTag> {
        self.0.iter()
    }

    /// True iff the two tag sets share at least one tag — used pervasively by
    /// the rules applicator and executor (`rule.inputs` vs an artifact's
    /// tags, `rule.usings` vs a dependency product's outputs, an active
    /// file-tag filter vs an artifact).
    pub fn intersects(&self, other: &FileTagSet) -> bool {
        // Iterate the smaller set for efficiency.
        if self.0.len() <= other.0.len() {
            self.0.iter().any(|t| other.0.contains(t))
        } else {
            other.0.iter().any(|t| self.0.contains(t))
        }
    }

    pub fn union_with(&mut self, other: &FileTagSet) {
        for t in &other.0 {
            self.0.insert(t.clone());
        }
    }

    pub fn as_fx_set(&self) -> FxHashSet<FileTag> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<FileTag> for FileTagSet {
    fn from_iter<I: IntoIterator<Item = FileTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FileTagSet {
    type Item = &'a FileTag;
    type IntoIter = std::collections::btree_set::Iter<'a, FileTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_detects_shared_tag() {
        let a = FileTagSet::from_iter([FileTag::from("c"), FileTag::from("cpp")]);
        let b = FileTagSet::from_iter([FileTag::from("cpp"), FileTag::from("obj")]);
        assert!(a.intersects(&b));
    }

    #[test]
    fn intersects_false_when_disjoint() {
        let a = FileTagSet::from_iter([FileTag::from("c")]);
        let b = FileTagSet::from_iter([FileTag::from("obj")]);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn tag_equality_is_content_based() {
        assert_eq!(FileTag::from("c"), FileTag::from("c".to_string()));
    }
}
