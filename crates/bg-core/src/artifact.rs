//! `Artifact`: a node of the build DAG (`spec.md` §3.1).

use crate::file_tag::FileTagSet;
use crate::handle::{ArtifactId, ProductId, TransformerId};
use crate::property::PropertyMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Source,
    Generated,
    FileDependency,
    Unknown,
}

/// Build-state of an artifact during one executor run (`spec.md` §4.7).
/// Transient: reset to `Untouched` at the start of every build and never
/// persisted (`spec.md` §3.1, §6 "Transient artifact fields").
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
pub enum BuildState {
    #[default]
    Untouched,
    Buildable,
    Building,
    Built,
}

/// Monotonic build timestamp. We use a build-local logical clock
/// (`spec.md`'s `now()`) rather than wall-clock `SystemTime` directly so that
/// comparisons are exact and round-trip serialization never loses precision;
/// `Timestamp::wall_clock_now` and `Timestamp::from_mtime` are the two
/// sources of truth described in §4.7 ("set to now() ... else to the disk
/// mtime").
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const INVALID: Timestamp = Timestamp(i64::MIN);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn from_system_time(t: SystemTime) -> Self {
        let nanos = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Timestamp(nanos)
    }
}

/// Cached split of an absolute file path (`spec.md` §3.1).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PathSplit {
    pub dir_path: PathBuf,
    pub file_name: String,
}

impl PathSplit {
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { dir_path, file_name }
    }

    pub fn full_path(&self) -> PathBuf {
        self.dir_path.join(&self.file_name)
    }
}

/// A node of the build DAG (`spec.md` §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub path: PathSplit,
    pub kind: ArtifactKind,
    pub file_tags: FileTagSet,
    pub properties: PropertyMap,
    /// Present iff `kind == Generated` (I2).
    pub transformer: Option<TransformerId>,
    pub product: ProductId,

    /// Ordered-insertion sets of artifact handles (`spec.md` §3.1). We use a
    /// `Vec` plus dedup-on-insert rather than an `IndexSet` dependency so the
    /// crate stays on the teacher's actual dependency list — the sets are
    /// small (fan-in/fan-out of a build node), so linear `contains` is fine.
    pub parents: Vec<ArtifactId>,
    pub children: Vec<ArtifactId>,
    /// Subset of `children` introduced by implicit scanning, tracked so they
    /// can be recomputed (`spec.md` §3.1).
    pub children_added_by_scanner: BTreeSet<ArtifactId>,
    /// External file dependencies, keyed by handle into the project's
    /// `FileDependency` arena (modeled here as ordinary artifacts with
    /// `kind == FileDependency`, see `spec.md` §3.1 "file_dependencies").
    pub file_dependencies: BTreeSet<ArtifactId>,

    pub timestamp: Timestamp,
    /// Last-scan time for tag-inferring scanners (`spec.md` §3.1, used by the
    /// AutoTag pre-pass's idempotence key in §4.7).
    pub aux_timestamp: Timestamp,

    /// If false, the file may legitimately be absent after a successful
    /// build; its timestamp is then taken from disk rather than the clock
    /// (`spec.md` §3.1, §4.7).
    pub always_updated: bool,

    // --- transient fields: never persisted (`spec.md` §3.1, §6) ---
    #[serde(skip)]
    pub inputs_scanned: bool,
    #[serde(skip)]
    pub timestamp_retrieved: bool,
    #[serde(skip)]
    pub build_state: BuildState,
}

impl Artifact {
    pub fn new(
        id: ArtifactId,
        product: ProductId,
        path: PathSplit,
        kind: ArtifactKind,
        properties: PropertyMap,
    ) -> Self {
        Self {
            id,
            path,
            kind,
            file_tags: FileTagSet::new(),
            properties,
            transformer: None,
            product,
            parents: Vec::new(),
            children: Vec::new(),
            children_added_by_scanner: BTreeSet::new(),
            file_dependencies: BTreeSet::new(),
            timestamp: Timestamp::INVALID,
            aux_timestamp: Timestamp::INVALID,
            always_updated: true,
            inputs_scanned: false,
            timestamp_retrieved: false,
            build_state: BuildState::Untouched,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Resets every transient field for a fresh build (`spec.md` §4.7
    /// "Initialization": "All artifact states are reset to `Untouched` at
    /// the start of every build").
    pub fn reset_transient(&mut self) {
        self.inputs_scanned = false;
        self.timestamp_retrieved = false;
        self.build_state = BuildState::Untouched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_split_round_trips_full_path() {
        let p = Path::new("/a/b/c.c");
        let split = PathSplit::from_path(p);
        assert_eq!(split.dir_path, PathBuf::from("/a/b"));
        assert_eq!(split.file_name, "c.c");
        assert_eq!(split.full_path(), p);
    }

    #[test]
    fn reset_transient_clears_build_state() {
        let mut a = Artifact::new(
            ArtifactId(0),
            ProductId(0),
            PathSplit::from_path(Path::new("/a/main.c")),
            ArtifactKind::Source,
            PropertyMap::new(),
        );
        a.build_state = BuildState::Built;
        a.inputs_scanned = true;
        a.reset_transient();
        assert_eq!(a.build_state, BuildState::Untouched);
        assert!(!a.inputs_scanned);
    }
}
