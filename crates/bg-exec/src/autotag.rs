//! AutoTag pre-pass (`spec.md` §4.7 "Initialization" step 3): for every
//! source artifact whose tags match a tag-inferring scanner, read the
//! scanner's `additional_file_tags` and merge any new ones in. Idempotent
//! across runs by keying on `aux_timestamp >= timestamp`.

use crate::error::Result;
use bg_core::{ArtifactId, ArtifactKind, FileTag, Timestamp};
use bg_graph::Project;
use bg_scanner::ScannerPlugin;
use std::time::SystemTime;

/// Runs the pre-pass over `candidates` (typically the set of source
/// artifacts touched since the last build) and returns every artifact whose
/// tag set actually changed, so the caller can re-evaluate tag-driven rule
/// membership (`bg-exec` does not depend on `bg-rules`; that re-evaluation
/// is the caller's job — `bg-loader` wires the two together).
pub fn run(
    project: &mut Project,
    scanners: &[Box<dyn ScannerPlugin>],
    candidates: &[ArtifactId],
) -> Result<Vec<ArtifactId>> {
    let mut changed = Vec::new();
    for &id in candidates {
        let Some(artifact) = project.artifact(id) else {
            continue;
        };
        if artifact.kind != ArtifactKind::Source {
            continue;
        }
        if artifact.aux_timestamp.is_valid() && artifact.aux_timestamp >= artifact.timestamp {
            continue; // already tagged since the last time this file changed
        }
        let path = artifact.path.full_path();
        let mut new_tags: Vec<FileTag> = Vec::new();
        for scanner in scanners {
            if !artifact.file_tags.contains(&scanner.file_tag()) {
                continue;
            }
            let Some(mut handle) = scanner.open(&path) else {
                continue;
            };
            for tag in handle.additional_file_tags() {
                if !artifact.file_tags.contains(&tag) && !new_tags.contains(&tag) {
                    new_tags.push(tag);
                }
            }
        }
        if new_tags.is_empty() {
            if let Some(a) = project.artifact_mut(id) {
                a.aux_timestamp = Timestamp::from_system_time(SystemTime::now());
            }
            continue;
        }
        if let Some(a) = project.artifact_mut(id) {
            for tag in new_tags {
                a.file_tags.insert(tag);
            }
            a.aux_timestamp = Timestamp::from_system_time(SystemTime::now());
        }
        changed.push(id);
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_core::{Artifact, FileTagSet, PathSplit, ProductId, PropertyMap};
    use bg_scanner::{ScanHandle, ScannedReference};
    use std::path::Path;

    struct HeaderTagger;
    struct HeaderHandle;

    impl ScanHandle for HeaderHandle {
        fn next(&mut self) -> Option<ScannedReference> {
            None
        }
        fn additional_file_tags(&mut self) -> Vec<FileTag> {
            vec![FileTag::from("moc_hpp")]
        }
    }

    impl ScannerPlugin for HeaderTagger {
        fn file_tag(&self) -> FileTag {
            FileTag::from("hpp")
        }
        fn open(&self, _path: &Path) -> Option<Box<dyn ScanHandle>> {
            Some(Box::new(HeaderHandle))
        }
    }

    #[test]
    fn newly_inferred_tag_is_merged_once() {
        let mut project = Project::new(bg_core::ConfigValue::Null);
        let product = ProductId(0);
        project
            .products
            .insert(bg_graph::ProductEntry::new(bg_core::Product::new(product, "app", "app.qbs")));
        let mut artifact = Artifact::new(
            ArtifactId(0),
            product,
            PathSplit::from_path(Path::new("/src/widget.hpp")),
            ArtifactKind::Source,
            PropertyMap::new(),
        );
        artifact.file_tags = FileTagSet::from_iter([FileTag::from("hpp")]);
        let id = bg_graph::insert_artifact(&mut project, artifact);

        let scanners: Vec<Box<dyn ScannerPlugin>> = vec![Box::new(HeaderTagger)];
        let changed = run(&mut project, &scanners, &[id]).unwrap();
        assert_eq!(changed, vec![id]);
        assert!(project.artifact(id).unwrap().file_tags.contains(&FileTag::from("moc_hpp")));

        let changed_again = run(&mut project, &scanners, &[id]).unwrap();
        assert!(changed_again.is_empty());
    }
}
