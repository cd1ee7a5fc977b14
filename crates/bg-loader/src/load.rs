//! `load(parameters)` (`spec.md` §4.8): derives the persisted build-graph
//! path from the resolved configuration, restores it, and reconciles it
//! against a freshly resolved project when warranted.

use crate::error::{BuildGraphError, Result};
use crate::reconcile::{needs_reresolve, reconcile, ReconcileInputs, ReconciliationReport};
use bg_core::{ArtifactId, ConfigValue, Timestamp};
use bg_graph::Project;
use bg_rules::ScriptEngine;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub enum LoadOutcome {
    /// No persisted graph exists for this project id; the caller must
    /// resolve from scratch.
    NotFound,
    /// The persisted configuration is not compatible with the requested one
    /// (`spec.md` §4.8 step 2); the caller discards it and resolves fresh.
    Stale,
    /// Restored as-is: either "restore only" was requested, or nothing
    /// warranted a re-resolve.
    Restored(Project),
    /// Re-resolved and reconciled against the persisted graph.
    Reconciled(Project, ReconciliationReport),
}

pub struct LoadRequest<'a> {
    pub build_dir: &'a Path,
    pub resolved_config: &'a ConfigValue,
    pub restore_only: bool,
    pub current_environment: &'a BTreeMap<String, String>,
}

/// Drives `spec.md` §4.8 steps 1-8. `fresh_unresolved` is only invoked when
/// a re-resolve actually proves necessary (project-file parsing is this
/// workspace's own caller's concern, not this crate's).
pub fn load<E: ScriptEngine>(
    request: &LoadRequest,
    fresh_unresolved: impl FnOnce() -> Project,
    engine: &E,
) -> Result<LoadOutcome> {
    let path = bg_pool::build_graph_path(request.build_dir, request.resolved_config);
    if !path.exists() {
        return Ok(LoadOutcome::NotFound);
    }

    let (_head, mut project) = match bg_pool::load::<Project>(&path, request.resolved_config) {
        Ok(v) => v,
        Err(bg_pool::PoolError::IncompatibleConfiguration) => return Ok(LoadOutcome::Stale),
        Err(e) => return Err(BuildGraphError::Pool(e)),
    };

    validate_back_pointers(&project, &path)?;

    if request.restore_only {
        return Ok(LoadOutcome::Restored(project));
    }

    let graph_file_timestamp = Timestamp::from_system_time(
        std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
    );
    let inputs = ReconcileInputs {
        graph_file_timestamp,
        current_environment: request.current_environment,
    };
    if !needs_reresolve(&project, &inputs) {
        return Ok(LoadOutcome::Restored(project));
    }

    info!(path = %path.display(), "reconciliation inputs drifted, re-resolving");
    let mut fresh = fresh_unresolved();
    bg_resolver::resolve_project(&mut fresh, engine)?;
    let report = reconcile(&mut project, &fresh, engine)?;
    Ok(LoadOutcome::Reconciled(project, report))
}

/// Persists `project` at the path its own resolved configuration derives
/// (`spec.md` §6 "a single binary file named `<project_id>.bg`").
pub fn store(build_dir: &Path, project: &Project) -> Result<()> {
    let path = bg_pool::build_graph_path(build_dir, &project.resolved_config);
    let head = bg_pool::Head::new(bg_pool::project_id_for(&project.resolved_config), project.resolved_config.clone());
    bg_pool::store(&path, &head, project)?;
    Ok(())
}

/// `spec.md` §4.8 step 3, "Restore back-pointers". This data model has no
/// raw pointers to patch — `artifact.product` and the lookup table are
/// plain data serialized with the rest of the graph — so this instead
/// re-validates that data is internally consistent, catching a corrupted or
/// hand-edited persisted file early rather than misbehaving later.
fn validate_back_pointers(project: &Project, path: &Path) -> Result<()> {
    for entry in project.products_iter() {
        for &id in &entry.own_artifacts {
            let Some(artifact) = project.artifact(id) else {
                return Err(BuildGraphError::CorruptGraph {
                    path: path.to_path_buf(),
                    detail: format!("product {:?} owns missing artifact {:?}", entry.id(), id),
                });
            };
            if artifact.product != entry.id() {
                return Err(BuildGraphError::CorruptGraph {
                    path: path.to_path_buf(),
                    detail: format!(
                        "artifact {:?} claims product {:?} but is owned by {:?}",
                        id,
                        artifact.product,
                        entry.id()
                    ),
                });
            }
        }
    }
    for (idx, artifact) in project.artifacts.iter() {
        let id = ArtifactId::from_index(idx);
        if !project.artifacts_at_path(&artifact.path.full_path()).contains(&id) {
            return Err(BuildGraphError::CorruptGraph {
                path: path.to_path_buf(),
                detail: format!("artifact {:?} missing from the path lookup table", id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_core::{FileTag, FileTagSet, SourceGroup};
    use bg_rules::{PrepareScriptOutcome, ScriptError, ScriptScope};

    struct FakeEngine;
    impl ScriptEngine for FakeEngine {
        type Compiled = ();
        fn compile_prepare_script(&self, _s: &str, _l: &bg_core::SourceLocation) -> std::result::Result<Self::Compiled, ScriptError> {
            Ok(())
        }
        fn evaluate_prepare_script(
            &self,
            _c: &Self::Compiled,
            _s: &ScriptScope,
            _r: &mut bg_core::PropertyReadRecorder,
        ) -> std::result::Result<PrepareScriptOutcome, ScriptError> {
            Ok(PrepareScriptOutcome { commands: vec![] })
        }
        fn evaluate_expression(
            &self,
            _src: &str,
            _l: &bg_core::SourceLocation,
            _s: &ScriptScope,
            _r: &mut bg_core::PropertyReadRecorder,
        ) -> std::result::Result<ConfigValue, ScriptError> {
            Ok(ConfigValue::str("out"))
        }
    }

    fn empty_project(dir: &Path) -> Project {
        let mut project = Project::new(ConfigValue::str("debug")).with_build_directory(dir.join("build"));
        let product_id = bg_core::ProductId(0);
        let mut product = bg_core::Product::new(product_id, "app", dir.join("app.qbs"));
        product.groups.push(SourceGroup::new("files"));
        product.type_tags = FileTagSet::from_iter([FileTag::from("application")]);
        project.products.insert(bg_graph::ProductEntry::new(product));
        project
    }

    #[test]
    fn missing_graph_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let request = LoadRequest {
            build_dir: dir.path(),
            resolved_config: &ConfigValue::str("debug"),
            restore_only: false,
            current_environment: &BTreeMap::new(),
        };
        let outcome = load(&request, || empty_project(dir.path()), &FakeEngine).unwrap();
        assert!(matches!(outcome, LoadOutcome::NotFound));
    }

    #[test]
    fn incompatible_configuration_reports_stale() {
        let dir = tempfile::tempdir().unwrap();
        let project = empty_project(dir.path());
        store(dir.path(), &project).unwrap();

        let request = LoadRequest {
            build_dir: dir.path(),
            resolved_config: &ConfigValue::str("release"),
            restore_only: false,
            current_environment: &BTreeMap::new(),
        };
        let outcome = load(&request, || empty_project(dir.path()), &FakeEngine).unwrap();
        assert!(matches!(outcome, LoadOutcome::Stale));
    }

    #[test]
    fn restore_only_skips_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let project = empty_project(dir.path());
        store(dir.path(), &project).unwrap();

        let request = LoadRequest {
            build_dir: dir.path(),
            resolved_config: &ConfigValue::str("debug"),
            restore_only: true,
            current_environment: &BTreeMap::new(),
        };
        let outcome = load(&request, || empty_project(dir.path()), &FakeEngine).unwrap();
        assert!(matches!(outcome, LoadOutcome::Restored(_)));
    }

    #[test]
    fn unchanged_graph_restores_without_reresolve() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.qbs"), "").unwrap();
        let project = empty_project(dir.path());
        store(dir.path(), &project).unwrap();

        let request = LoadRequest {
            build_dir: dir.path(),
            resolved_config: &ConfigValue::str("debug"),
            restore_only: false,
            current_environment: &BTreeMap::new(),
        };
        let outcome = load(&request, || empty_project(dir.path()), &FakeEngine).unwrap();
        assert!(matches!(outcome, LoadOutcome::Restored(_)));
    }
}
