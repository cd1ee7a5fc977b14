//! The executor's coordinator loop (`spec.md` §4.7). All graph mutations
//! happen here, on the single coordinator "thread" (this function's own
//! call stack); workers only run commands (`spec.md` §5).

use crate::error::Result;
use crate::runner::CommandRunner;
use crate::worker_pool::{Job, WorkerPool};
use bg_core::{ArtifactId, ArtifactKind, BuildState, FileTagSet, Timestamp, TransformerId};
use bg_graph::Project;
use bg_scan_cache::{ResolutionCache, ScanResultCache};
use bg_scanner::ScannerPlugin;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExecutorState {
    Idle,
    Running,
    Canceling,
}

/// `SPEC_FULL.md` §2 "Worker-pool sizing": defaults to the host's available
/// parallelism, overridable by the caller.
pub struct ExecutorConfig {
    pub worker_count: usize,
    pub keep_going: bool,
    /// `spec.md` §4.7 main loop: "If an active file-tag filter excludes
    /// `a`, finalize without building." `None` disables filtering.
    pub active_file_tag_filter: Option<FileTagSet>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            keep_going: false,
            active_file_tag_filter: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub built: usize,
    pub up_to_date: usize,
    pub failed: Vec<(TransformerId, String)>,
}

/// Runs one full build toward `targets` (`spec.md` §4.7). `changed_files`,
/// when given, seeds the initial leaf set directly instead of recomputing it
/// from scratch, per the spec's "explicit changed files list" branch.
pub fn run_build<R: CommandRunner + 'static>(
    project: &mut Project,
    targets: &[ArtifactId],
    changed_files: Option<&[ArtifactId]>,
    scanners: &[Box<dyn ScannerPlugin>],
    scan_cache: &mut ScanResultCache,
    resolution_cache: &mut ResolutionCache,
    runner: Arc<R>,
    config: ExecutorConfig,
    cancel: &AtomicBool,
) -> Result<ExecutionReport> {
    // Initialization.
    for id in all_artifact_ids(project) {
        if let Some(a) = project.artifact_mut(id) {
            a.reset_transient();
        }
    }

    let reachable = reachable_closure(project, targets);
    for &id in &reachable {
        if let Some(a) = project.artifact_mut(id) {
            a.build_state = BuildState::Buildable;
        }
    }

    if let Some(changed) = changed_files {
        let autotag_changed = crate::autotag::run(project, scanners, changed)?;
        for id in autotag_changed {
            debug!(?id, "autotag pre-pass inferred new file tags");
        }
    }

    let mut leaves: VecDeque<ArtifactId> = VecDeque::new();
    let mut enqueued: FxHashSet<ArtifactId> = FxHashSet::default();
    match changed_files {
        Some(changed) => {
            for &id in changed {
                if reachable.contains(&id) && enqueued.insert(id) {
                    leaves.push_back(id);
                }
                mark_ancestors_buildable(project, id);
            }
        }
        None => {
            for &id in &reachable {
                if project.artifact(id).map(|a| a.is_leaf()).unwrap_or(false) && enqueued.insert(id) {
                    leaves.push_back(id);
                }
            }
        }
    }

    let mut state = ExecutorState::Running;
    let pool = WorkerPool::spawn(config.worker_count.max(1), runner);
    let mut building: FxHashMap<TransformerId, Vec<ArtifactId>> = FxHashMap::default();
    let mut report = ExecutionReport::default();

    while !leaves.is_empty() || !building.is_empty() {
        if cancel.load(Ordering::SeqCst) && state != ExecutorState::Canceling {
            warn!("build canceled");
            state = ExecutorState::Canceling;
        }

        while state != ExecutorState::Canceling && building.len() < config.worker_count.max(1) {
            let Some(a) = leaves.pop_front() else { break };
            enqueued.remove(&a);
            process_leaf(
                project,
                a,
                scanners,
                scan_cache,
                resolution_cache,
                &config,
                &pool,
                &mut leaves,
                &mut enqueued,
                &mut building,
                &mut report,
            )?;
        }

        if building.is_empty() {
            if state == ExecutorState::Canceling {
                break;
            }
            continue;
        }

        let result = pool.results().recv();
        let Ok(result) = result else { break };
        let Some(outputs) = building.remove(&result.transformer) else {
            continue;
        };

        match result.outcome {
            Ok(()) => {
                on_worker_success(project, &outputs, scan_cache, &mut leaves, &mut enqueued);
                report.built += 1;
            }
            Err(e) => {
                error!(transformer = ?result.transformer, error = %e, "command failed");
                report.failed.push((result.transformer, e.to_string()));
                if !config.keep_going {
                    state = ExecutorState::Canceling;
                }
            }
        }
    }

    pool.shutdown();
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn process_leaf(
    project: &mut Project,
    a: ArtifactId,
    scanners: &[Box<dyn ScannerPlugin>],
    scan_cache: &mut ScanResultCache,
    resolution_cache: &mut ResolutionCache,
    config: &ExecutorConfig,
    pool: &WorkerPool,
    leaves: &mut VecDeque<ArtifactId>,
    enqueued: &mut FxHashSet<ArtifactId>,
    building: &mut FxHashMap<TransformerId, Vec<ArtifactId>>,
    report: &mut ExecutionReport,
) -> Result<()> {
    let Some(artifact) = project.artifact(a) else {
        return Ok(());
    };
    if artifact.build_state == BuildState::Built {
        return Ok(());
    }
    if artifact.kind != ArtifactKind::Generated {
        finalize(project, a, scan_cache, leaves, enqueued);
        return Ok(());
    }
    let transformer_id = artifact.transformer;
    if let Some(t_id) = transformer_id {
        if building.contains_key(&t_id) {
            if let Some(art) = project.artifact_mut(a) {
                art.build_state = BuildState::Building;
            }
            return Ok(());
        }
    }
    if let Some(filter) = &config.active_file_tag_filter {
        if !artifact.file_tags.intersects(filter) {
            finalize(project, a, scan_cache, leaves, enqueued);
            return Ok(());
        }
    }

    let always_run = transformer_id
        .and_then(|t| project.transformer(t))
        .map(|t| t.always_run)
        .unwrap_or(false);
    if !always_run && is_up_to_date(project, a) {
        report.up_to_date += 1;
        finalize(project, a, scan_cache, leaves, enqueued);
        return Ok(());
    }

    let Some(t_id) = transformer_id else {
        // I5/I2: a Generated artifact always has a transformer.
        finalize(project, a, scan_cache, leaves, enqueued);
        return Ok(());
    };

    for output in transformer_outputs(project, t_id) {
        if let Some(out_artifact) = project.artifact(output) {
            std::fs::create_dir_all(&out_artifact.path.dir_path)?;
        }
    }

    // Scanning may attach new implicit children; diff against the set we
    // had before the call since `refresh_implicit_children` mutates the
    // graph directly rather than reporting what it added.
    let children_before: FxHashSet<ArtifactId> = project
        .artifact(a)
        .map(|x| x.children.iter().copied().collect())
        .unwrap_or_default();
    bg_scanner::refresh_implicit_children(project, a, scanners, scan_cache, resolution_cache)?;
    let new_children: Vec<ArtifactId> = project
        .artifact(a)
        .map(|x| x.children.iter().copied().filter(|c| !children_before.contains(c)).collect())
        .unwrap_or_default();

    if !new_children.is_empty() {
        for child in new_children {
            let not_built = project
                .artifact(child)
                .map(|c| c.build_state != BuildState::Built)
                .unwrap_or(false);
            if not_built && enqueued.insert(child) {
                leaves.push_back(child);
            }
        }
        if enqueued.insert(a) {
            leaves.push_back(a);
        }
        return Ok(());
    }

    let outputs = transformer_outputs(project, t_id);
    for &output in &outputs {
        if let Some(art) = project.artifact_mut(output) {
            art.build_state = BuildState::Building;
        }
    }
    let commands = project.transformer(t_id).map(|t| t.commands.clone()).unwrap_or_default();
    let environment = project
        .artifact(a)
        .map(|x| x.product)
        .and_then(|pid| project.product(pid))
        .map(|p| p.product.used_environment.clone())
        .unwrap_or_default();
    pool.dispatch(Job {
        transformer: t_id,
        commands,
        environment,
    });
    building.insert(t_id, outputs);
    Ok(())
}

fn finalize(
    project: &mut Project,
    a: ArtifactId,
    scan_cache: &mut ScanResultCache,
    leaves: &mut VecDeque<ArtifactId>,
    enqueued: &mut FxHashSet<ArtifactId>,
) {
    if let Some(art) = project.artifact_mut(a) {
        if !art.timestamp.is_valid() {
            art.timestamp = disk_or_now(&art.path.full_path());
        }
        art.build_state = BuildState::Built;
    }
    let path = project.artifact(a).map(|x| x.path.full_path());
    if let Some(path) = path {
        scan_cache.remove(&path);
    }
    enqueue_ready_parents(project, a, leaves, enqueued);
}

fn on_worker_success(
    project: &mut Project,
    outputs: &[ArtifactId],
    scan_cache: &mut ScanResultCache,
    leaves: &mut VecDeque<ArtifactId>,
    enqueued: &mut FxHashSet<ArtifactId>,
) {
    let now = Timestamp::from_system_time(SystemTime::now());
    for &output in outputs {
        let always_updated = project.artifact(output).map(|a| a.always_updated).unwrap_or(true);
        let stamp = if always_updated {
            now
        } else {
            let path = project.artifact(output).map(|a| a.path.full_path());
            path.and_then(|p| std::fs::metadata(p).ok())
                .and_then(|m| m.modified().ok())
                .map(Timestamp::from_system_time)
                .unwrap_or(now)
        };
        if let Some(a) = project.artifact_mut(output) {
            a.timestamp = stamp;
            a.build_state = BuildState::Built;
        }
        let path = project.artifact(output).map(|a| a.path.full_path());
        if let Some(path) = path {
            scan_cache.remove(&path);
        }
        let owner = project.artifact(output).map(|a| a.product);
        if let Some(product) = owner {
            if let Some(entry) = project.product_mut(product) {
                entry.dirty = true;
            }
        }
    }
    for &output in outputs {
        enqueue_ready_parents(project, output, leaves, enqueued);
    }
}

fn enqueue_ready_parents(
    project: &Project,
    a: ArtifactId,
    leaves: &mut VecDeque<ArtifactId>,
    enqueued: &mut FxHashSet<ArtifactId>,
) {
    let parents = project.artifact(a).map(|x| x.parents.clone()).unwrap_or_default();
    for parent in parents {
        let ready = project
            .artifact(parent)
            .map(|p| {
                p.children
                    .iter()
                    .all(|c| project.artifact(*c).map(|c| c.build_state == BuildState::Built).unwrap_or(false))
            })
            .unwrap_or(false);
        if ready && enqueued.insert(parent) {
            leaves.push_back(parent);
        }
    }
}

fn is_up_to_date(project: &Project, a: ArtifactId) -> bool {
    let Some(artifact) = project.artifact(a) else {
        return false;
    };
    if !artifact.timestamp.is_valid() {
        return false;
    }
    for &child in &artifact.children {
        let Some(child) = project.artifact(child) else {
            return false;
        };
        if !child.timestamp.is_valid() || child.timestamp > artifact.timestamp {
            return false;
        }
    }
    for &dep in &artifact.file_dependencies {
        if let Some(dep) = project.artifact(dep) {
            if let Ok(meta) = std::fs::metadata(dep.path.full_path()) {
                if let Ok(modified) = meta.modified() {
                    if Timestamp::from_system_time(modified) > artifact.timestamp {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Finalizing an artifact without running its (non-existent, for this path)
/// command: a non-`Generated` artifact's timestamp is whatever is actually
/// on disk, falling back to "now" only when the file is missing.
fn disk_or_now(path: &std::path::Path) -> Timestamp {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(Timestamp::from_system_time)
        .unwrap_or_else(|_| Timestamp::from_system_time(SystemTime::now()))
}

fn transformer_outputs(project: &Project, t_id: TransformerId) -> Vec<ArtifactId> {
    project
        .transformer(t_id)
        .map(|t| t.outputs.iter().copied().collect())
        .unwrap_or_default()
}

fn mark_ancestors_buildable(project: &mut Project, start: ArtifactId) {
    let mut stack = vec![start];
    let mut visited = FxHashSet::default();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let parents = project.artifact(id).map(|a| a.parents.clone()).unwrap_or_default();
        for parent in parents {
            if let Some(a) = project.artifact_mut(parent) {
                a.build_state = BuildState::Buildable;
            }
            stack.push(parent);
        }
    }
}

fn reachable_closure(project: &Project, targets: &[ArtifactId]) -> FxHashSet<ArtifactId> {
    let mut visited = FxHashSet::default();
    let mut stack: Vec<ArtifactId> = targets.to_vec();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(a) = project.artifact(id) {
            for &child in &a.children {
                stack.push(child);
            }
        }
    }
    visited
}

fn all_artifact_ids(project: &Project) -> Vec<ArtifactId> {
    project.artifacts_iter().map(|a| a.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_core::{
        Artifact, Command, ConfigValue, PathSplit, ProcessCommand, Product, ProductId, PropertyMap,
        Transformer,
    };
    use bg_graph::{connect, insert_artifact, ProductEntry};
    use bg_scan_cache::{ResolutionCache, ScanResultCache};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;

    struct AlwaysOk;
    impl CommandRunner for AlwaysOk {
        fn run_process(
            &self,
            _: &ProcessCommand,
            _: &BTreeMap<String, String>,
        ) -> Result<crate::runner::CommandOutcome> {
            Ok(crate::runner::CommandOutcome { exit_code: 0 })
        }
        fn run_script(&self, _: &bg_core::ScriptCommand) -> Result<crate::runner::CommandOutcome> {
            unreachable!("test graph only uses process commands")
        }
    }

    fn one_rule_project(dir: &Path) -> (Project, ArtifactId, ArtifactId) {
        let mut project = Project::new(ConfigValue::Null).with_build_directory(dir.to_path_buf());
        let product_id = ProductId(0);
        project
            .products
            .insert(ProductEntry::new(Product::new(product_id, "app", "app.qbs")));

        let source_path = dir.join("main.c");
        std::fs::write(&source_path, "int main(){return 0;}").unwrap();
        let source = Artifact::new(
            ArtifactId(0),
            product_id,
            PathSplit::from_path(&source_path),
            ArtifactKind::Source,
            PropertyMap::new(),
        );
        let source_id = insert_artifact(&mut project, source);

        let transformer_id = TransformerId(0);
        let mut transformer = Transformer::new(transformer_id, bg_core::RuleId(0));
        transformer.inputs.insert(source_id);
        transformer.commands.push(Command::Process(ProcessCommand::new("true", dir)));
        project.transformers.insert(transformer);

        let out_path = dir.join("main.o");
        let mut output = Artifact::new(
            ArtifactId(0),
            product_id,
            PathSplit::from_path(&out_path),
            ArtifactKind::Generated,
            PropertyMap::new(),
        );
        output.transformer = Some(transformer_id);
        let output_id = insert_artifact(&mut project, output);
        project.transformer_mut(transformer_id).unwrap().outputs.insert(output_id);
        connect(&mut project, output_id, source_id).unwrap();

        (project, source_id, output_id)
    }

    #[test]
    fn builds_generated_artifact_from_leaf_source() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut project, _source, output) = one_rule_project(tmp.path());
        std::fs::write(tmp.path().join("main.o"), "obj").unwrap();

        let mut scan_cache = ScanResultCache::new();
        let mut resolution_cache = ResolutionCache::new();
        let cancel = AtomicBool::new(false);
        let report = run_build(
            &mut project,
            &[output],
            None,
            &[],
            &mut scan_cache,
            &mut resolution_cache,
            Arc::new(AlwaysOk),
            ExecutorConfig::default(),
            &cancel,
        )
        .unwrap();

        assert_eq!(report.built, 1);
        assert!(report.failed.is_empty());
        assert_eq!(project.artifact(output).unwrap().build_state, BuildState::Built);
    }

    #[test]
    fn up_to_date_output_is_not_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut project, source, output) = one_rule_project(tmp.path());
        let now = Timestamp::from_system_time(SystemTime::now());
        project.artifact_mut(source).unwrap().timestamp = Timestamp(now.0 - 10);
        project.artifact_mut(output).unwrap().timestamp = now;

        let mut scan_cache = ScanResultCache::new();
        let mut resolution_cache = ResolutionCache::new();
        let cancel = AtomicBool::new(false);
        let report = run_build(
            &mut project,
            &[output],
            None,
            &[],
            &mut scan_cache,
            &mut resolution_cache,
            Arc::new(AlwaysOk),
            ExecutorConfig::default(),
            &cancel,
        )
        .unwrap();

        assert_eq!(report.built, 0);
        assert_eq!(report.up_to_date, 1);
    }
}
