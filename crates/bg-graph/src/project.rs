//! `Project`: top-level owner of every artifact, transformer and product
//! (`spec.md` §3.2).

use crate::product_data::ProductEntry;
use bg_core::{
    Arena, Artifact, ArtifactId, ConfigValue, ProductId, Transformer, TransformerId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// I1's lookup key: `(dir_path, file_name)`. A single path may map to
/// several artifacts only if they belong to distinct products, and at most
/// one of those may be `Generated` (enforced in `bg-graph::graph`).
pub type LookupKey = (PathBuf, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub resolved_config: ConfigValue,
    /// Derived from a hash of `resolved_config` (`spec.md` §9
    /// "Build-directory layout"); rule-artifact fileName expressions
    /// resolve relative paths against this (`spec.md` §4.5 step 2).
    pub build_directory: PathBuf,
    pub artifacts: Arena<Artifact>,
    pub transformers: Arena<Transformer>,
    pub products: Arena<ProductEntry>,
    /// I1: every live artifact exactly once, keyed by `(dir_path, file_name)`.
    pub lookup: HashMap<LookupKey, Vec<ArtifactId>>,
    pub dirty: bool,
}

impl Project {
    pub fn new(resolved_config: ConfigValue) -> Self {
        Self {
            resolved_config,
            build_directory: PathBuf::new(),
            artifacts: Arena::new(),
            transformers: Arena::new(),
            products: Arena::new(),
            lookup: HashMap::new(),
            dirty: false,
        }
    }

    pub fn with_build_directory(mut self, build_directory: PathBuf) -> Self {
        self.build_directory = build_directory;
        self
    }

    pub fn artifact(&self, id: ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(id.index())
    }

    pub fn artifact_mut(&mut self, id: ArtifactId) -> Option<&mut Artifact> {
        self.artifacts.get_mut(id.index())
    }

    pub fn transformer(&self, id: TransformerId) -> Option<&Transformer> {
        self.transformers.get(id.index())
    }

    pub fn transformer_mut(&mut self, id: TransformerId) -> Option<&mut Transformer> {
        self.transformers.get_mut(id.index())
    }

    pub fn product(&self, id: ProductId) -> Option<&ProductEntry> {
        self.products.get(id.index())
    }

    pub fn product_mut(&mut self, id: ProductId) -> Option<&mut ProductEntry> {
        self.products.get_mut(id.index())
    }

    pub fn products_iter(&self) -> impl Iterator<Item = &ProductEntry> {
        self.products.iter().map(|(_, p)| p)
    }

    pub fn artifacts_iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().map(|(_, a)| a)
    }

    pub fn transformers_iter(&self) -> impl Iterator<Item = &Transformer> {
        self.transformers.iter().map(|(_, t)| t)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn lookup_key(dir: &std::path::Path, name: &str) -> LookupKey {
        (dir.to_path_buf(), name.to_string())
    }

    pub(crate) fn add_to_lookup(&mut self, id: ArtifactId) {
        if let Some(a) = self.artifact(id) {
            let key = Self::lookup_key(&a.path.dir_path, &a.path.file_name);
            let bucket = self.lookup.entry(key).or_default();
            if !bucket.contains(&id) {
                bucket.push(id);
            }
        }
    }

    pub(crate) fn remove_from_lookup(&mut self, id: ArtifactId) {
        if let Some(a) = self.artifact(id) {
            let key = Self::lookup_key(&a.path.dir_path, &a.path.file_name);
            if let Some(bucket) = self.lookup.get_mut(&key) {
                bucket.retain(|h| *h != id);
                if bucket.is_empty() {
                    self.lookup.remove(&key);
                }
            }
        }
    }

    /// All artifacts registered for a given path, across every product
    /// (I1). Most callers want [`crate::graph::lookup_artifact`] instead,
    /// which narrows to one product.
    pub fn artifacts_at_path(&self, path: &std::path::Path) -> &[ArtifactId] {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new(""));
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.lookup
            .get(&Self::lookup_key(dir, &name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
