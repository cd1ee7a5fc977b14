//! Product-level reconciliation between an old, persisted project and a
//! freshly resolved one (`spec.md` §4.8 steps 5-8).
//!
//! The data model here keeps handles as plain arena indices rather than the
//! original's raw back-pointers, so a fresh resolve never touches the old
//! project's arenas directly — every change is applied in place to the old
//! project so existing `ArtifactId`/`TransformerId` handles held elsewhere
//! keep working. "Rebuild" therefore means: overwrite the old product's
//! declarative fields from the fresh counterpart, discard whatever of its
//! old artifact set no longer applies, then re-run [`bg_resolver::reresolve_product`]
//! on the (same-arena) old project.

use crate::error::Result;
use bg_core::{same_command_signature, ArtifactId, ArtifactKind, ProductId, Timestamp};
use bg_graph::{Project, RemoveOptions};
use bg_rules::ScriptEngine;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Inputs to the drift checks of `spec.md` §4.8 step 5, gathered by the
/// caller (environment and the persisted file's own mtime are not things
/// this crate can observe on its own).
#[derive(Debug, Clone)]
pub struct ReconcileInputs<'a> {
    pub graph_file_timestamp: Timestamp,
    pub current_environment: &'a BTreeMap<String, String>,
}

/// `spec.md` §4.8 step 5: any of these flips the whole load into
/// "must re-resolve".
pub fn needs_reresolve(project: &Project, inputs: &ReconcileInputs) -> bool {
    for entry in project.products_iter() {
        let product = &entry.product;
        let project_file_timestamp = Timestamp::from_system_time(
            std::fs::metadata(&product.project_file)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        );
        if project_file_timestamp > inputs.graph_file_timestamp {
            debug!(product = %product.name, "project file newer than persisted graph");
            return true;
        }
        for (key, stored_value) in &product.used_environment {
            if inputs.current_environment.get(key) != Some(stored_value) {
                debug!(product = %product.name, %key, "used-environment entry changed");
                return true;
            }
        }
    }
    for artifact in project.artifacts_iter() {
        if artifact.kind == ArtifactKind::FileDependency && !artifact.path.full_path().exists() {
            debug!(path = %artifact.path.full_path().display(), "file dependency no longer exists on disk");
            return true;
        }
    }
    for entry in project.products_iter() {
        if product_has_wildcard_drift(project, entry.id()) {
            return true;
        }
    }
    false
}

fn product_has_wildcard_drift(project: &Project, product: ProductId) -> bool {
    let Some(entry) = project.product(product) else {
        return false;
    };
    if !entry.product.groups.iter().any(|g| g.is_wildcard()) {
        return false;
    }
    let base_dir = entry
        .product
        .project_file
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_default();
    let mut fresh: BTreeSet<PathBuf> = BTreeSet::new();
    for group in &entry.product.groups {
        fresh.extend(group.explicit_files.iter().map(|f| resolve_path(&base_dir, f)));
        match bg_resolver::expand_wildcards(product, &base_dir, &group.wildcards) {
            Ok(matches) => fresh.extend(matches),
            Err(e) => {
                warn!(product = %entry.product.name, error = %e, "wildcard re-expansion failed during drift check");
                return true;
            }
        }
    }
    let stored: BTreeSet<PathBuf> = entry
        .own_artifacts
        .iter()
        .filter_map(|&id| project.artifact(id))
        .filter(|a| a.kind == ArtifactKind::Source)
        .map(|a| a.path.full_path())
        .collect();
    fresh != stored
}

fn resolve_path(base_dir: &std::path::Path, candidate: &std::path::Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductChange {
    Added,
    Removed,
    StructurallyChanged,
    FilesChanged,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub changes: Vec<(String, ProductChange)>,
    pub rescued_artifacts: usize,
    pub invalidated_artifacts: usize,
}

/// `spec.md` §4.8 steps 6-8: matches every old product against its
/// freshly resolved counterpart by `(name, project_file)` (a `ProductId` is
/// only a slot index within one resolve pass and carries no identity across
/// two of them), applies the bucket-appropriate reconciliation, rescues
/// timestamps by command-signature match, then re-checks for cycles.
pub fn reconcile<E: ScriptEngine>(
    old: &mut Project,
    fresh: &Project,
    engine: &E,
) -> Result<ReconciliationReport> {
    let mut report = ReconciliationReport::default();

    let old_ids: Vec<ProductId> = old.products_iter().map(|p| p.id()).collect();
    let mut matched_fresh: BTreeSet<ProductId> = BTreeSet::new();

    for old_id in old_ids {
        let Some(old_entry) = old.product(old_id) else {
            continue;
        };
        let key = (old_entry.product.name.clone(), old_entry.product.project_file.clone());
        let fresh_match = fresh
            .products_iter()
            .find(|p| (p.product.name.clone(), p.product.project_file.clone()) == key)
            .map(|p| p.id());

        match fresh_match {
            None => {
                remove_product(old, old_id)?;
                report.changes.push((key.0, ProductChange::Removed));
            }
            Some(fresh_id) => {
                matched_fresh.insert(fresh_id);
                let change = classify(old, fresh, old_id, fresh_id);
                match change {
                    ProductChange::Unchanged => {}
                    ProductChange::StructurallyChanged => {
                        let rescue_snapshot = snapshot(old, old_id);
                        teardown_product(old, old_id)?;
                        sync_declarative_fields(old, fresh, old_id, fresh_id);
                        bg_resolver::reresolve_product(old, old_id, engine)?;
                        let (rescued, invalidated) = rescue(old, &rescue_snapshot, old_id);
                        report.rescued_artifacts += rescued;
                        report.invalidated_artifacts += invalidated;
                    }
                    ProductChange::FilesChanged => {
                        let rescue_snapshot = snapshot(old, old_id);
                        sync_declarative_fields(old, fresh, old_id, fresh_id);
                        prune_stale_sources(old, fresh, old_id, fresh_id)?;
                        bg_resolver::reresolve_product(old, old_id, engine)?;
                        let (rescued, invalidated) = rescue(old, &rescue_snapshot, old_id);
                        report.rescued_artifacts += rescued;
                        report.invalidated_artifacts += invalidated;
                    }
                    ProductChange::Added | ProductChange::Removed => unreachable!(),
                }
                report.changes.push((key.0, change));
            }
        }
    }

    for fresh_entry in fresh.products_iter() {
        if matched_fresh.contains(&fresh_entry.id()) {
            continue;
        }
        let new_id = ProductId::from_index(old.products.insert(bg_graph::ProductEntry::new(fresh_entry.product.clone())));
        if let Some(e) = old.product_mut(new_id) {
            e.product.id = new_id;
        }
        bg_resolver::reresolve_product(old, new_id, engine)?;
        report.changes.push((fresh_entry.product.name.clone(), ProductChange::Added));
    }

    bg_graph::detect_cycle(old)?;
    info!(changes = report.changes.len(), rescued = report.rescued_artifacts, invalidated = report.invalidated_artifacts, "reconciliation complete");
    Ok(report)
}

fn classify(old: &Project, fresh: &Project, old_id: ProductId, fresh_id: ProductId) -> ProductChange {
    let (Some(old_entry), Some(fresh_entry)) = (old.product(old_id), fresh.product(fresh_id)) else {
        return ProductChange::Unchanged;
    };
    let o = &old_entry.product;
    let f = &fresh_entry.product;
    // `ProductId` is a per-resolve arena slot, not a stable identity across
    // two resolves, so dependency sets compare by the dependency's name
    // rather than its handle.
    let old_dep_names: BTreeSet<&str> = o
        .dependencies
        .iter()
        .filter_map(|&id| old.product(id))
        .map(|p| p.product.name.as_str())
        .collect();
    let fresh_dep_names: BTreeSet<&str> = f
        .dependencies
        .iter()
        .filter_map(|&id| fresh.product(id))
        .map(|p| p.product.name.as_str())
        .collect();
    let structurally_equal = o.rules == f.rules
        && o.manual_transformers == f.manual_transformers
        && old_dep_names == fresh_dep_names
        && o.properties == f.properties;
    if !structurally_equal {
        return ProductChange::StructurallyChanged;
    }
    let old_sources: BTreeSet<PathBuf> = old_entry
        .own_artifacts
        .iter()
        .filter_map(|&id| old.artifact(id))
        .filter(|a| a.kind == ArtifactKind::Source)
        .map(|a| a.path.full_path())
        .collect();
    let fresh_sources: BTreeSet<PathBuf> = fresh_entry
        .own_artifacts
        .iter()
        .filter_map(|&id| fresh.artifact(id))
        .filter(|a| a.kind == ArtifactKind::Source)
        .map(|a| a.path.full_path())
        .collect();
    if old_sources != fresh_sources {
        ProductChange::FilesChanged
    } else {
        ProductChange::Unchanged
    }
}

/// Overwrites every declarative field but `id` from the fresh counterpart
/// so subsequent rule application reads the up-to-date description.
fn sync_declarative_fields(old: &mut Project, fresh: &Project, old_id: ProductId, fresh_id: ProductId) {
    let Some(fresh_product) = fresh.product(fresh_id).map(|e| e.product.clone()) else {
        return;
    };
    if let Some(old_entry) = old.product_mut(old_id) {
        let id = old_entry.product.id;
        old_entry.product = fresh_product;
        old_entry.product.id = id;
    }
}

/// Removes a whole product's build data (`spec.md` §4.8 step 6, "Removed
/// product"): every owned artifact, deleting generated files from disk.
fn remove_product(project: &mut Project, id: ProductId) -> Result<()> {
    let own: Vec<ArtifactId> = project
        .product(id)
        .map(|e| e.own_artifacts.iter().copied().collect())
        .unwrap_or_default();
    for artifact_id in own {
        if project.artifact(artifact_id).is_some() {
            bg_graph::remove_artifact(
                project,
                artifact_id,
                &RemoveOptions { remove_from_disk: true, remove_from_product: true },
            )?;
        }
    }
    project.products.remove(id.index());
    Ok(())
}

/// Discards every artifact a structurally-changed product owns before it
/// gets rebuilt from its fresh rule list (`spec.md` §4.8 step 6, "tear down
/// its build data entirely"). Files are kept on disk — rescue below may
/// still recover their timestamps if the same command resurfaces.
fn teardown_product(project: &mut Project, id: ProductId) -> Result<()> {
    let own: Vec<ArtifactId> = project
        .product(id)
        .map(|e| e.own_artifacts.iter().copied().collect())
        .unwrap_or_default();
    for artifact_id in own {
        if project.artifact(artifact_id).is_some() {
            bg_graph::remove_artifact(
                project,
                artifact_id,
                &RemoveOptions { remove_from_disk: false, remove_from_product: true },
            )?;
        }
    }
    Ok(())
}

/// `on_product_file_list_changed` (`spec.md` §4.8 step 6, "Product with
/// only file-list differences"): removes source artifacts no longer
/// covered by the fresh group expansion, together with their exclusive
/// dependents. Newly added files are picked up by the subsequent
/// `reresolve_product` call via its own `insert_if_absent` step.
fn prune_stale_sources(old: &mut Project, fresh: &Project, old_id: ProductId, fresh_id: ProductId) -> Result<()> {
    let fresh_sources: BTreeSet<PathBuf> = fresh
        .product(fresh_id)
        .map(|e| e.own_artifacts.iter().copied().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|id| fresh.artifact(id))
        .filter(|a| a.kind == ArtifactKind::Source)
        .map(|a| a.path.full_path())
        .collect();
    let stale: Vec<ArtifactId> = old
        .product(old_id)
        .map(|e| e.own_artifacts.iter().copied().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .filter(|&id| {
            old.artifact(id)
                .map(|a| a.kind == ArtifactKind::Source && !fresh_sources.contains(&a.path.full_path()))
                .unwrap_or(false)
        })
        .collect();
    for id in stale {
        remove_exclusive(old, id)?;
    }
    Ok(())
}

/// `spec.md` §4.8, "Exclusive-dependents removal": removing `id` may orphan
/// a parent (no remaining children, or its transformer's `inputs` becomes
/// empty), in which case that parent is removed too, recursively.
fn remove_exclusive(project: &mut Project, id: ArtifactId) -> Result<()> {
    let Some(parents) = project.artifact(id).map(|a| a.parents.clone()) else {
        return Ok(());
    };
    bg_graph::remove_artifact(project, id, &RemoveOptions { remove_from_disk: false, remove_from_product: true })?;
    for parent_id in parents {
        let Some(parent) = project.artifact(parent_id) else {
            continue;
        };
        let children_empty = parent.children.is_empty();
        let inputs_empty = parent
            .transformer
            .and_then(|t| project.transformer(t))
            .map(|t| t.inputs.is_empty())
            .unwrap_or(false);
        if children_empty || inputs_empty {
            remove_exclusive(project, parent_id)?;
        }
    }
    Ok(())
}

/// Snapshot of `(path -> command signature, timestamp, aux_timestamp)` for
/// every generated artifact a product owns, taken just before that product
/// is torn down or patched, so [`rescue`] can transfer state afterward.
struct RescueSnapshot(Vec<(PathBuf, Vec<bg_core::Command>, Timestamp, Timestamp)>);

fn snapshot(project: &Project, product: ProductId) -> RescueSnapshot {
    let mut entries = Vec::new();
    if let Some(entry) = project.product(product) {
        for &id in &entry.own_artifacts {
            let Some(artifact) = project.artifact(id) else {
                continue;
            };
            if artifact.kind != ArtifactKind::Generated {
                continue;
            }
            let commands = artifact
                .transformer
                .and_then(|t| project.transformer(t))
                .map(|t| t.commands.clone())
                .unwrap_or_default();
            entries.push((artifact.path.full_path(), commands, artifact.timestamp, artifact.aux_timestamp));
        }
    }
    RescueSnapshot(entries)
}

/// `spec.md` §4.8 step 7: transfers timestamps onto the freshly (re)built
/// artifact at the same path when its transformer's command signature still
/// equals the snapshotted one; otherwise invalidates it on disk so the next
/// executor run rebuilds it.
fn rescue(project: &mut Project, snapshot: &RescueSnapshot, product: ProductId) -> (usize, usize) {
    let mut rescued = 0;
    let mut invalidated = 0;
    let current: Vec<ArtifactId> = project
        .product(product)
        .map(|e| e.own_artifacts.iter().copied().collect())
        .unwrap_or_default();
    for id in current {
        let Some(artifact) = project.artifact(id) else {
            continue;
        };
        if artifact.kind != ArtifactKind::Generated {
            continue;
        }
        let path = artifact.path.full_path();
        let Some((_, old_commands, old_timestamp, old_aux)) = snapshot.0.iter().find(|(p, ..)| *p == path) else {
            continue;
        };
        let new_commands = artifact
            .transformer
            .and_then(|t| project.transformer(t))
            .map(|t| t.commands.clone())
            .unwrap_or_default();
        if same_command_signature(old_commands, &new_commands) {
            let (ts, aux) = (*old_timestamp, *old_aux);
            if let Some(a) = project.artifact_mut(id) {
                a.timestamp = ts;
                a.aux_timestamp = aux;
            }
            rescued += 1;
        } else {
            if path.exists() {
                let _ = std::fs::remove_file(&path);
            }
            if let Some(a) = project.artifact_mut(id) {
                a.timestamp = Timestamp::INVALID;
            }
            invalidated += 1;
        }
    }
    (rescued, invalidated)
}
