//! The head block every persisted build-graph file carries
//! (`spec.md` §4.1, §6 "Persisted build graph").

use bg_core::ConfigValue;
use serde::{Deserialize, Serialize};

/// Bump whenever the on-disk shape of the body changes in a way old readers
/// cannot tolerate. A mismatch is a hard failure (`PoolError::UnsupportedFormatVersion`),
/// distinct from a configuration mismatch (which the caller may treat as a
/// cache miss, `spec.md` §4.1 "Failure").
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head {
    pub format_version: u32,
    pub project_id: String,
    pub resolved_config: ConfigValue,
}

impl Head {
    pub fn new(project_id: impl Into<String>, resolved_config: ConfigValue) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            project_id: project_id.into(),
            resolved_config,
        }
    }
}

/// Derives a stable project id from the resolved configuration
/// (`spec.md` §4.8 step 1).
pub fn project_id_for(config: &ConfigValue) -> String {
    let digest = config.stable_hash();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derives the build-graph file path from a build directory and the resolved
/// configuration (`spec.md` §6: "a single binary file named
/// `<project_id>.bg`"). Any deterministic function of the configuration is
/// acceptable per `spec.md` §9 "Build-directory layout"; we use the project
/// id directly, matching §6's literal naming.
pub fn build_graph_path(
    build_dir: &std::path::Path,
    config: &ConfigValue,
) -> std::path::PathBuf {
    build_dir.join(format!("{}.bg", project_id_for(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn project_id_is_stable_across_calls() {
        let mut m = BTreeMap::new();
        m.insert("profile".to_string(), ConfigValue::str("release"));
        let cfg = ConfigValue::Map(m);
        assert_eq!(project_id_for(&cfg), project_id_for(&cfg));
    }

    #[test]
    fn project_id_differs_for_different_config() {
        let mut a = BTreeMap::new();
        a.insert("profile".to_string(), ConfigValue::str("release"));
        let mut b = BTreeMap::new();
        b.insert("profile".to_string(), ConfigValue::str("debug"));
        assert_ne!(
            project_id_for(&ConfigValue::Map(a)),
            project_id_for(&ConfigValue::Map(b))
        );
    }
}
