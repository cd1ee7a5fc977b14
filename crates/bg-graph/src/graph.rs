//! Edge discipline and lookup (`spec.md` §4.2).

use crate::error::{GraphError, Result};
use crate::project::Project;
use bg_core::{Artifact, ArtifactId, ArtifactKind, FileTag, ProductId, TransformerId};
use std::collections::VecDeque;

/// Registers a freshly created artifact into both the owning product's
/// `own_artifacts` set and the project-wide lookup table (I1).
pub fn insert_artifact(project: &mut Project, artifact: Artifact) -> ArtifactId {
    let product = artifact.product;
    let id = ArtifactId::from_index(project.artifacts.insert(artifact));
    project.add_to_lookup(id);
    if let Some(p) = project.product_mut(product) {
        p.own_artifacts.insert(id);
    }
    project.mark_dirty();
    id
}

/// `connect(parent, child)` (`spec.md` §4.2): requires `parent != child`,
/// forbids duplicate children that share a file path but differ by handle,
/// inserts into both endpoints, marks the project dirty.
pub fn connect(project: &mut Project, parent: ArtifactId, child: ArtifactId) -> Result<()> {
    if parent == child {
        return Err(GraphError::SelfEdge(parent));
    }
    {
        let child_artifact = project
            .artifact(child)
            .ok_or(GraphError::ArtifactNotFound(child))?;
        let child_path = child_artifact.path.full_path();
        let parent_artifact = project
            .artifact(parent)
            .ok_or(GraphError::ArtifactNotFound(parent))?;
        for &existing_child in &parent_artifact.children {
            if existing_child == child {
                return Ok(()); // already connected, idempotent
            }
            if let Some(existing) = project.artifact(existing_child) {
                if existing.path.full_path() == child_path {
                    return Err(GraphError::DuplicateChildPath {
                        parent,
                        child: existing_child,
                    });
                }
            }
        }
    }
    if let Some(p) = project.artifact_mut(parent) {
        p.children.push(child);
    }
    if let Some(c) = project.artifact_mut(child) {
        c.parents.push(parent);
    }
    project.mark_dirty();
    Ok(())
}

/// `safe_connect` (`spec.md` §4.2): additionally rejects the edge if a path
/// from `child` to `parent` already exists via `children` edges — adding
/// `parent -> child` on top of such a path would close a cycle.
pub fn safe_connect(project: &mut Project, parent: ArtifactId, child: ArtifactId) -> Result<()> {
    if is_reachable(project, child, parent) {
        return Err(GraphError::WouldCycle { parent, child });
    }
    connect(project, parent, child)
}

fn is_reachable(project: &Project, from: ArtifactId, to: ArtifactId) -> bool {
    let mut visited = rustc_hash::FxHashSet::default();
    let mut queue = VecDeque::new();
    queue.push_back(from);
    visited.insert(from);
    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }
        if let Some(a) = project.artifact(current) {
            for &child in &a.children {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }
    false
}

/// `disconnect` (`spec.md` §4.2): symmetric; also removes the edge from
/// `children_added_by_scanner` and from the parent's transformer inputs if
/// one is present, returning the (former) parent's transformer so the
/// caller can schedule it for re-evaluation.
pub fn disconnect(
    project: &mut Project,
    parent: ArtifactId,
    child: ArtifactId,
) -> Result<Option<TransformerId>> {
    if let Some(p) = project.artifact_mut(parent) {
        p.children.retain(|&c| c != child);
    }
    let mut reevaluate = None;
    if let Some(c) = project.artifact_mut(child) {
        c.parents.retain(|&p| p != parent);
    }
    if let Some(p) = project.artifact_mut(parent) {
        p.children_added_by_scanner.remove(&child);
    }
    if let Some(p) = project.artifact(parent) {
        reevaluate = p.transformer;
    }
    if let Some(t_id) = reevaluate {
        if let Some(t) = project.transformer_mut(t_id) {
            t.inputs.remove(&child);
        }
    }
    project.mark_dirty();
    Ok(reevaluate)
}

/// `lookup_artifact(product, path)` (`spec.md` §4.2): locates the artifact
/// for `(product, path)`.
pub fn lookup_artifact(
    project: &Project,
    product: ProductId,
    path: &std::path::Path,
) -> Option<ArtifactId> {
    project
        .artifacts_at_path(path)
        .iter()
        .copied()
        .find(|&id| project.artifact(id).map(|a| a.product) == Some(product))
}

/// Cross-product lookup by product name, used when a rule's `usings`
/// expansion needs "every output artifact of every dependency product"
/// (`spec.md` §4.5 step 1) without the caller already holding a
/// `ProductId`.
pub fn lookup_artifact_in_named_product<'a>(
    project: &'a Project,
    product_name: &str,
    path: &std::path::Path,
) -> Option<ArtifactId> {
    let product_id = project
        .products_iter()
        .find(|p| p.product.name == product_name)
        .map(|p| p.product.id)?;
    lookup_artifact(project, product_id, path)
}

pub struct RemoveOptions {
    pub remove_from_disk: bool,
    pub remove_from_product: bool,
}

/// `remove_artifact(a, opts)` (`spec.md` §4.2): disconnects `a` from both
/// directions, removes it from the lookup table, optionally deletes the
/// on-disk file for a generated artifact, and returns every parent that
/// still carries a transformer so the caller can schedule those for
/// transformer re-evaluation.
pub fn remove_artifact(
    project: &mut Project,
    id: ArtifactId,
    opts: &RemoveOptions,
) -> Result<Vec<TransformerId>> {
    let artifact = project
        .artifact(id)
        .cloned()
        .ok_or(GraphError::ArtifactNotFound(id))?;

    let mut to_reevaluate = Vec::new();
    for &parent in artifact.parents.clone().iter() {
        if let Some(t) = disconnect(project, parent, id)? {
            to_reevaluate.push(t);
        }
    }
    for &child in artifact.children.clone().iter() {
        disconnect(project, id, child)?;
    }

    if opts.remove_from_disk && artifact.kind == ArtifactKind::Generated {
        let path = artifact.path.full_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }

    project.remove_from_lookup(id);
    if opts.remove_from_product {
        if let Some(p) = project.product_mut(artifact.product) {
            p.own_artifacts.remove(&id);
            p.target_artifacts.remove(&id);
        }
    }
    if let Some(t_id) = artifact.transformer {
        if let Some(t) = project.transformer_mut(t_id) {
            t.outputs.remove(&id);
        }
    }
    project.artifacts.remove(id.index());
    project.mark_dirty();
    Ok(to_reevaluate)
}

/// Supplemented query helper (`SPEC_FULL.md` §2, "Artifact-set helper
/// queries"): every live artifact in `product` carrying `tag`.
pub fn artifacts_with_tag(project: &Project, product: ProductId, tag: &FileTag) -> Vec<ArtifactId> {
    project
        .product(product)
        .map(|p| {
            p.own_artifacts
                .iter()
                .copied()
                .filter(|&id| {
                    project
                        .artifact(id)
                        .map(|a| a.file_tags.contains(tag))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn artifacts_in_product(project: &Project, product: ProductId) -> Vec<ArtifactId> {
    project
        .product(product)
        .map(|p| p.own_artifacts.iter().copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_core::{ConfigValue, PathSplit, PropertyMap};
    use std::path::Path;

    fn make_project() -> Project {
        let mut project = Project::new(ConfigValue::Null);
        let product = bg_core::Product::new(ProductId(0), "app", "app.qbs");
        project.products.insert(crate::product_data::ProductEntry::new(product));
        project
    }

    fn make_artifact(project: &mut Project, name: &str) -> ArtifactId {
        let a = Artifact::new(
            ArtifactId(0),
            ProductId(0),
            PathSplit::from_path(Path::new(&format!("/build/{name}"))),
            ArtifactKind::Source,
            PropertyMap::new(),
        );
        insert_artifact(project, a)
    }

    #[test]
    fn connect_is_bidirectional() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a.c");
        let b = make_artifact(&mut project, "b.o");
        connect(&mut project, b, a).unwrap();
        assert!(project.artifact(b).unwrap().children.contains(&a));
        assert!(project.artifact(a).unwrap().parents.contains(&b));
    }

    #[test]
    fn connect_rejects_self_edge() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a.c");
        assert!(matches!(
            connect(&mut project, a, a),
            Err(GraphError::SelfEdge(_))
        ));
    }

    #[test]
    fn safe_connect_rejects_cycle() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a");
        let b = make_artifact(&mut project, "b");
        let c = make_artifact(&mut project, "c");
        // a -> b -> c
        connect(&mut project, a, b).unwrap();
        connect(&mut project, b, c).unwrap();
        // c -> a would close the cycle
        assert!(matches!(
            safe_connect(&mut project, c, a),
            Err(GraphError::WouldCycle { .. })
        ));
    }

    #[test]
    fn disconnect_is_symmetric() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a");
        let b = make_artifact(&mut project, "b");
        connect(&mut project, b, a).unwrap();
        disconnect(&mut project, b, a).unwrap();
        assert!(!project.artifact(b).unwrap().children.contains(&a));
        assert!(!project.artifact(a).unwrap().parents.contains(&b));
    }

    #[test]
    fn lookup_artifact_finds_by_product_and_path() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a.c");
        let found = lookup_artifact(&project, ProductId(0), Path::new("/build/a.c"));
        assert_eq!(found, Some(a));
    }

    #[test]
    fn remove_artifact_clears_lookup_and_edges() {
        let mut project = make_project();
        let a = make_artifact(&mut project, "a");
        let b = make_artifact(&mut project, "b");
        connect(&mut project, b, a).unwrap();
        remove_artifact(
            &mut project,
            a,
            &RemoveOptions {
                remove_from_disk: false,
                remove_from_product: true,
            },
        )
        .unwrap();
        assert!(project.artifact(a).is_none());
        assert!(project.artifact(b).unwrap().children.is_empty());
        assert!(lookup_artifact(&project, ProductId(0), Path::new("/build/a")).is_none());
    }
}
