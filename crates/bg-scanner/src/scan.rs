//! Implicit-dependency refresh (`spec.md` §4.4).

use crate::error::{Result, ScannerError};
use crate::plugin::ScannerPlugin;
use crate::resolve::{flatten_include_paths, resolve_reference};
use bg_core::{Artifact, ArtifactId, ArtifactKind, PathSplit, PropertyMap};
use bg_graph::Project;
use bg_scan_cache::{ResolutionCache, ScanDependency, ScanResultCache};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Refreshes the implicit children of a generated artifact `a` whose
/// transformer has input set `I` (`spec.md` §4.4).
pub fn refresh_implicit_children(
    project: &mut Project,
    a: ArtifactId,
    scanners: &[Box<dyn ScannerPlugin>],
    scan_cache: &mut ScanResultCache,
    resolution_cache: &mut ResolutionCache,
) -> Result<()> {
    let transformer_id = project
        .artifact(a)
        .ok_or(ScannerError::ArtifactNotFound(a))?
        .transformer;
    let inputs: std::collections::BTreeSet<ArtifactId> = transformer_id
        .and_then(|t| project.transformer(t))
        .map(|t| t.inputs.clone())
        .unwrap_or_default();

    // Step 1: clear file_dependencies, disconnect regenerable children.
    if let Some(artifact) = project.artifact_mut(a) {
        artifact.file_dependencies.clear();
    }
    let stale_children: Vec<ArtifactId> = project
        .artifact(a)
        .map(|artifact| {
            artifact
                .children
                .iter()
                .copied()
                .filter(|c| !inputs.contains(c))
                .collect()
        })
        .unwrap_or_default();
    for child in stale_children {
        bg_graph::disconnect(project, a, child)?;
    }

    let product = project
        .artifact(a)
        .ok_or(ScannerError::ArtifactNotFound(a))?
        .product;

    let mut include_path_cache: FxHashMap<[u8; 32], Vec<PathBuf>> = FxHashMap::default();
    let mut visited_this_invocation: FxHashSet<PathBuf> = FxHashSet::default();

    for &input in &inputs {
        let Some(input_artifact) = project.artifact(input) else {
            continue;
        };
        // Step 2: scanners matching any of the input's tags.
        let matching: Vec<&Box<dyn ScannerPlugin>> = scanners
            .iter()
            .filter(|s| input_artifact.file_tags.contains(&s.file_tag()))
            .collect();
        if matching.is_empty() {
            continue;
        }

        // Step 3: flattened cpp.includePaths, cached per property-map
        // fingerprint.
        let include_paths = if matching.iter().any(|s| s.uses_cpp_include_paths()) {
            let fingerprint = input_artifact.properties.fingerprint();
            include_path_cache
                .entry(fingerprint)
                .or_insert_with(|| flatten_include_paths(&input_artifact.properties))
                .clone()
        } else {
            Vec::new()
        };

        let input_path = input_artifact.path.full_path();
        let input_dir = input_artifact.path.dir_path.clone();

        for scanner in matching {
            scan_one_input(
                project,
                a,
                input,
                product,
                &input_path,
                &input_dir,
                scanner.as_ref(),
                &include_paths,
                scan_cache,
                resolution_cache,
                &mut visited_this_invocation,
            )?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn scan_one_input(
    project: &mut Project,
    a: ArtifactId,
    input: ArtifactId,
    product: bg_core::ProductId,
    input_path: &Path,
    input_dir: &Path,
    scanner: &dyn ScannerPlugin,
    include_paths: &[PathBuf],
    scan_cache: &mut ScanResultCache,
    resolution_cache: &mut ResolutionCache,
    visited: &mut FxHashSet<PathBuf>,
) -> Result<()> {
    let Some(mut handle) = scanner.open(input_path) else {
        trace!(path = %input_path.display(), "scanner plug-in refused to open file");
        return Ok(());
    };

    let mut queue: Vec<PathBuf> = Vec::new();
    let mut dependencies = Vec::new();

    while let Some(reference) = handle.next() {
        let resolved = resolve_reference(&reference, input_dir, include_paths, resolution_cache);
        dependencies.push(ScanDependency::new(
            resolved
                .as_ref()
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .unwrap_or_default(),
            resolved
                .as_ref()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| reference.include_text.clone()),
            reference.is_local_include,
        ));

        let Some(resolved_path) = resolved else {
            trace!(include = %reference.include_text, "could not resolve scanned dependency");
            continue;
        };

        resolve_and_wire(project, a, input, product, &resolved_path)?;

        if scanner.recursive() && visited.insert(resolved_path.clone()) {
            queue.push(resolved_path);
        }
    }
    scan_cache.insert(input_path.to_path_buf(), dependencies);

    // Recursive expansion: scan further-resolved files with the same
    // scanner, deduplicated per top-level invocation (`spec.md` §4.4 step
    // 4: "queue each resolved dependency file for further scanning,
    // deduplicated per top-level invocation").
    while let Some(path) = queue.pop() {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(""));
        scan_one_input(
            project,
            a,
            input,
            product,
            &path,
            &dir,
            scanner,
            include_paths,
            scan_cache,
            resolution_cache,
            visited,
        )?;
    }
    Ok(())
}

/// Step 5: classify a resolved dependency path and wire it into the graph.
fn resolve_and_wire(
    project: &mut Project,
    a: ArtifactId,
    _input: ArtifactId,
    product: bg_core::ProductId,
    resolved_path: &Path,
) -> Result<()> {
    if let Some(existing) = bg_graph::lookup_artifact(project, product, resolved_path) {
        // A same-product match is wired as a DAG edge regardless of build
        // state; the caller is expected not to re-scan artifacts that are
        // already `Building` (`spec.md` §4.4 step 5).
        connect_as_scanned_child(project, a, existing)?;
        return Ok(());
    }

    // Cross-product: any artifact at this path belonging to a different
    // product is wired without re-inserting.
    if let Some(&other) = project.artifacts_at_path(resolved_path).first() {
        connect_as_scanned_child(project, a, other)?;
        return Ok(());
    }

    if resolved_path.exists() {
        // Present on disk but unknown to the project: synthesize a
        // FileDependency artifact (`spec.md` §4.4 step 5).
        let file_dep = Artifact::new(
            ArtifactId(0),
            product,
            PathSplit::from_path(resolved_path),
            ArtifactKind::FileDependency,
            PropertyMap::new(),
        );
        let id = bg_graph::insert_artifact(project, file_dep);
        if let Some(artifact) = project.artifact_mut(a) {
            artifact.file_dependencies.insert(id);
        }
        return Ok(());
    }

    trace!(path = %resolved_path.display(), "scanned dependency does not exist on disk; skipping");
    Ok(())
}

fn connect_as_scanned_child(project: &mut Project, parent: ArtifactId, child: ArtifactId) -> Result<()> {
    bg_graph::connect(project, parent, child)?;
    if let Some(artifact) = project.artifact_mut(parent) {
        artifact.children_added_by_scanner.insert(child);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{ScanHandle, ScannedReference};
    use bg_core::{ConfigValue, Product, ProductId, Transformer, TransformerId};
    use bg_graph::ProductEntry;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FixedScanner {
        tag: bg_core::FileTag,
        refs: Mutex<Vec<ScannedReference>>,
    }

    struct FixedHandle(Vec<ScannedReference>);

    impl ScanHandle for FixedHandle {
        fn next(&mut self) -> Option<ScannedReference> {
            self.0.pop()
        }
    }

    impl ScannerPlugin for FixedScanner {
        fn file_tag(&self) -> bg_core::FileTag {
            self.tag.clone()
        }

        fn open(&self, _path: &Path) -> Option<Box<dyn ScanHandle>> {
            let mut refs = self.refs.lock().unwrap().clone();
            refs.reverse();
            Some(Box::new(FixedHandle(refs)))
        }
    }

    fn make_project_with_input(dir: &Path) -> (Project, ArtifactId, ArtifactId, ProductId) {
        let mut project = Project::new(ConfigValue::Null);
        let product_id = ProductId(0);
        project
            .products
            .insert(ProductEntry::new(Product::new(product_id, "app", "app.qbs")));

        let input_path = dir.join("main.c");
        std::fs::write(&input_path, "").unwrap();
        let mut input = Artifact::new(
            ArtifactId(0),
            product_id,
            PathSplit::from_path(&input_path),
            ArtifactKind::Source,
            PropertyMap::new(),
        );
        input.file_tags = bg_core::FileTagSet::from_iter([bg_core::FileTag::from("c")]);
        let input_id = bg_graph::insert_artifact(&mut project, input);

        let output_path = dir.join("main.o");
        let output = Artifact::new(
            ArtifactId(0),
            product_id,
            PathSplit::from_path(&output_path),
            ArtifactKind::Generated,
            PropertyMap::new(),
        );
        let output_id = bg_graph::insert_artifact(&mut project, output);

        let mut transformer = Transformer::new(TransformerId(0), bg_core::RuleId(0));
        transformer.inputs.insert(input_id);
        transformer.outputs.insert(output_id);
        let transformer_id = TransformerId::from_index(project.transformers.insert(transformer));
        project.artifact_mut(output_id).unwrap().transformer = Some(transformer_id);

        (project, output_id, input_id, product_id)
    }

    #[test]
    fn synthesizes_file_dependency_for_unknown_disk_path() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("util.h");
        std::fs::write(&header_path, "").unwrap();

        let (mut project, output_id, _input_id, _product) = make_project_with_input(dir.path());
        let scanner: Box<dyn ScannerPlugin> = Box::new(FixedScanner {
            tag: bg_core::FileTag::from("c"),
            refs: Mutex::new(vec![ScannedReference {
                include_text: "util.h".to_string(),
                is_local_include: true,
            }]),
        });
        let mut scan_cache = ScanResultCache::new();
        let mut resolution_cache = ResolutionCache::new();

        refresh_implicit_children(
            &mut project,
            output_id,
            &[scanner],
            &mut scan_cache,
            &mut resolution_cache,
        )
        .unwrap();

        let output = project.artifact(output_id).unwrap();
        assert_eq!(output.file_dependencies.len(), 1);
    }

    #[test]
    fn unresolvable_reference_is_skipped_without_error() {
        let dir = tempdir().unwrap();
        let (mut project, output_id, _input_id, _product) = make_project_with_input(dir.path());
        let scanner: Box<dyn ScannerPlugin> = Box::new(FixedScanner {
            tag: bg_core::FileTag::from("c"),
            refs: Mutex::new(vec![ScannedReference {
                include_text: "missing.h".to_string(),
                is_local_include: true,
            }]),
        });
        let mut scan_cache = ScanResultCache::new();
        let mut resolution_cache = ResolutionCache::new();

        let result = refresh_implicit_children(
            &mut project,
            output_id,
            &[scanner],
            &mut scan_cache,
            &mut resolution_cache,
        );
        assert!(result.is_ok());
        assert!(project.artifact(output_id).unwrap().file_dependencies.is_empty());
    }
}
