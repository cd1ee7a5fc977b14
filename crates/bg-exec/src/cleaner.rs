//! Build-artifact cleaner (`spec.md` §6 "Artifact cleaner", supplemented by
//! `SPEC_FULL.md` §2 "Artifact cleaner detail" from the original
//! `buildgraph/artifactcleaner.cpp`): removes generated files from disk and
//! then walks upward deleting any output directory that becomes empty,
//! stopping at the build root.

use crate::error::Result;
use bg_core::ArtifactKind;
use bg_graph::Project;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CleanType {
    /// Remove every generated artifact in the selected products.
    All,
    /// Remove only artifacts that have a parent, i.e. intermediates
    /// consumed by something else (`spec.md` §6). An artifact with no
    /// parent is a terminal target and survives.
    Temporaries,
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub clean_type: CleanType,
    pub dry_run: bool,
    pub keep_going: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            clean_type: CleanType::All,
            dry_run: false,
            keep_going: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed_files: Vec<PathBuf>,
    pub removed_directories: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Cleans every `Generated` artifact owned by `products` (or, if empty,
/// every product in the project).
pub fn clean(
    project: &Project,
    products: &[bg_core::ProductId],
    options: &CleanOptions,
) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    let mut candidate_dirs: FxHashSet<PathBuf> = FxHashSet::default();

    let target_products: Vec<bg_core::ProductId> = if products.is_empty() {
        project.products_iter().map(|p| p.id()).collect()
    } else {
        products.to_vec()
    };

    for product_id in target_products {
        let Some(entry) = project.product(product_id) else {
            continue;
        };
        for &id in &entry.own_artifacts {
            let Some(artifact) = project.artifact(id) else {
                continue;
            };
            if artifact.kind != ArtifactKind::Generated {
                continue;
            }
            if options.clean_type == CleanType::Temporaries && artifact.parents.is_empty() {
                continue;
            }
            let path = artifact.path.full_path();
            if options.dry_run {
                debug!(path = %path.display(), "would remove");
                report.removed_files.push(path.clone());
                candidate_dirs.insert(artifact.path.dir_path.clone());
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    report.removed_files.push(path);
                    candidate_dirs.insert(artifact.path.dir_path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove artifact");
                    report.failures.push((path, e.to_string()));
                    if !options.keep_going {
                        return Ok(report);
                    }
                }
            }
        }
    }

    for dir in candidate_dirs {
        remove_empty_ancestors(&dir, &project.build_directory, options.dry_run, &mut report);
    }

    Ok(report)
}

/// Walks upward from `dir`, removing directories that are empty (or would
/// be, under `dry_run`), stopping once a non-empty directory or
/// `build_root` is reached (`SPEC_FULL.md` §2 "Artifact cleaner detail").
fn remove_empty_ancestors(dir: &Path, build_root: &Path, dry_run: bool, report: &mut CleanReport) {
    let mut current = dir.to_path_buf();
    loop {
        if !current.starts_with(build_root) || current == build_root {
            break;
        }
        let is_empty = std::fs::read_dir(&current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            break;
        }
        if dry_run {
            report.removed_directories.push(current.clone());
        } else if std::fs::remove_dir(&current).is_ok() {
            report.removed_directories.push(current.clone());
        } else {
            break;
        }
        let Some(parent) = current.parent() else {
            break;
        };
        current = parent.to_path_buf();
    }
}
