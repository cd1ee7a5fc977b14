//! Include resolution (`spec.md` §4.4 step 4).

use crate::plugin::ScannedReference;
use bg_scan_cache::ResolutionCache;
use std::path::{Path, PathBuf};

/// Resolves one scanned reference against the input's own directory and a
/// flattened include-path list, per `spec.md` §4.4 step 4:
///
/// a. absolute path ⇒ take verbatim
/// b. local include ⇒ try the input's directory first
/// c. else try include paths in order
/// d. resolution cache keyed on `(filename, dirpath)` consulted first
pub fn resolve_reference(
    reference: &ScannedReference,
    input_dir: &Path,
    include_paths: &[PathBuf],
    resolution_cache: &mut ResolutionCache,
) -> Option<PathBuf> {
    let name = &reference.include_text;
    let as_path = Path::new(name);
    if as_path.is_absolute() {
        return Some(as_path.to_path_buf());
    }

    if let Some(cached) = resolution_cache.get(name, input_dir) {
        return cached.cloned();
    }

    let resolved = resolve_uncached(reference, input_dir, include_paths);
    resolution_cache.put(name.clone(), input_dir.to_path_buf(), resolved.clone());
    resolved
}

fn resolve_uncached(
    reference: &ScannedReference,
    input_dir: &Path,
    include_paths: &[PathBuf],
) -> Option<PathBuf> {
    let name = &reference.include_text;
    if reference.is_local_include {
        let candidate = input_dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    for dir in include_paths {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Flattens `cpp.includePaths` out of a property map (`spec.md` §4.4 step
/// 3). Non-string / non-list values are ignored rather than rejected — a
/// malformed module property is a rule-evaluation concern, not a scanning
/// one.
pub fn flatten_include_paths(properties: &bg_core::PropertyMap) -> Vec<PathBuf> {
    match properties.get("cpp", "includePaths") {
        Some(bg_core::ConfigValue::List(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(PathBuf::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_reference_resolves_verbatim() {
        let mut cache = ResolutionCache::new();
        let reference = ScannedReference {
            include_text: "/usr/include/stdio.h".to_string(),
            is_local_include: false,
        };
        let resolved = resolve_reference(&reference, Path::new("/src"), &[], &mut cache);
        assert_eq!(resolved, Some(PathBuf::from("/usr/include/stdio.h")));
    }

    #[test]
    fn flatten_include_paths_reads_cpp_module() {
        let props = bg_core::PropertyMap::new().with_override(
            "cpp",
            "includePaths",
            bg_core::ConfigValue::List(vec![
                bg_core::ConfigValue::str("/usr/include"),
                bg_core::ConfigValue::str("/opt/include"),
            ]),
        );
        let paths = flatten_include_paths(&props);
        assert_eq!(
            paths,
            vec![PathBuf::from("/usr/include"), PathBuf::from("/opt/include")]
        );
    }
}
