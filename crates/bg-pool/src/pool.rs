//! Store/load contract for the persistent pool (`spec.md` §4.1).
//!
//! The head block is written first, then the body, as two sequential
//! bincode-encoded values on the same stream — there is no random-access
//! index (`spec.md` §4.1 "Streams are strictly sequential"). A caller that
//! only needs to check configuration compatibility can call
//! [`load_head`] without paying to decode the (potentially large) body.

use crate::error::{PoolError, Result};
use crate::head::{Head, FORMAT_VERSION};
use bg_core::ConfigValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard()
}

/// Serializes `head` followed by `body` into `path`, overwriting any
/// existing file. Mirrors the teacher's own store-then-load-round-trips
/// contract (`codegraph-graph::storage`'s `SerializableCodeNode`/`From`
/// pairs), except the whole graph is one sequential stream rather than a
/// keyed store.
pub fn store<T: Serialize>(path: &Path, head: &Head, body: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serde::encode_into_std_write(head, &mut writer, bincode_config())?;
    bincode::serde::encode_into_std_write(body, &mut writer, bincode_config())?;
    Ok(())
}

/// Reads only the head block. Used by the loader to decide compatibility
/// before committing to decoding the full body (`spec.md` §4.8 step 2).
pub fn load_head(path: &Path) -> Result<Head> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let head: Head = bincode::serde::decode_from_std_read(&mut reader, bincode_config())?;
    if head.format_version != FORMAT_VERSION {
        return Err(PoolError::UnsupportedFormatVersion {
            found: head.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(head)
}

/// Reads the head block followed by the body, failing with
/// [`PoolError::IncompatibleConfiguration`] if `expected_config` is not
/// compatible with the stored configuration (`spec.md` §4.8 step 2) — the
/// caller treats this as "discard and re-resolve" rather than a fatal error.
pub fn load<T: DeserializeOwned>(path: &Path, expected_config: &ConfigValue) -> Result<(Head, T)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let head: Head = bincode::serde::decode_from_std_read(&mut reader, bincode_config())?;
    if head.format_version != FORMAT_VERSION {
        return Err(PoolError::UnsupportedFormatVersion {
            found: head.format_version,
            expected: FORMAT_VERSION,
        });
    }
    if !head.resolved_config.is_compatible_with(expected_config) {
        return Err(PoolError::IncompatibleConfiguration);
    }
    let body: T = bincode::serde::decode_from_std_read(&mut reader, bincode_config())?;
    Ok((head, body))
}

/// Loads the body unconditionally ("restore only", `spec.md` §4.8 step 4),
/// skipping the compatibility check.
pub fn load_unchecked<T: DeserializeOwned>(path: &Path) -> Result<(Head, T)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let head: Head = bincode::serde::decode_from_std_read(&mut reader, bincode_config())?;
    if head.format_version != FORMAT_VERSION {
        return Err(PoolError::UnsupportedFormatVersion {
            found: head.format_version,
            expected: FORMAT_VERSION,
        });
    }
    let body: T = bincode::serde::decode_from_std_read(&mut reader, bincode_config())?;
    Ok((head, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Body {
        values: Vec<i32>,
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.bg");
        let head = Head::new("abc123", ConfigValue::str("release"));
        let body = Body {
            values: vec![1, 2, 3],
        };
        store(&path, &head, &body).unwrap();
        let (loaded_head, loaded_body): (Head, Body) =
            load(&path, &ConfigValue::str("release")).unwrap();
        assert_eq!(loaded_head.project_id, "abc123");
        assert_eq!(loaded_body, body);
    }

    #[test]
    fn load_rejects_incompatible_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.bg");
        let head = Head::new("abc123", ConfigValue::str("release"));
        let body = Body { values: vec![] };
        store(&path, &head, &body).unwrap();
        let result: Result<(Head, Body)> = load(&path, &ConfigValue::str("debug"));
        assert!(matches!(result, Err(PoolError::IncompatibleConfiguration)));
    }

    #[test]
    fn load_head_does_not_require_matching_body_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.bg");
        let head = Head::new("xyz", ConfigValue::Bool(true));
        let body = Body {
            values: vec![42],
        };
        store(&path, &head, &body).unwrap();
        let loaded = load_head(&path).unwrap();
        assert_eq!(loaded.project_id, "xyz");
    }
}
