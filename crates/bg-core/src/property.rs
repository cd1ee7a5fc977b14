//! Evaluated module/product configuration values, and the property-access
//! recording contract used by the rules applicator (`spec.md` §3.1, §4.5
//! step 5, §9 "Property-read observation").

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A value in a resolved configuration tree. Used both for module/product
/// properties (`PropertyMap`) and for the project's resolved configuration
/// that the persistent pool hashes into a project id (`spec.md` §4.8.1) and
/// compares for compatibility (§4.8.2) — one recursive value type covers
/// both, matching the teacher's own nested `serde_json::Value`-style
/// configuration trees (`codegraph-graph::nodes::Node::properties`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(ordered_float_bits::OrderedF64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

/// `f64` doesn't implement `Eq`/`Ord`, but configuration comparison (§4.8.2)
/// and canonicalization need a total order. Bit-pattern comparison is exactly
/// what we want here: two floats compare equal under this scheme iff they
/// are bit-identical, which is the right notion of "same configuration value"
/// for change detection (NaN-vs-NaN included).
mod ordered_float_bits {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct OrderedF64(pub f64);

    impl PartialEq for OrderedF64 {
        fn eq(&self, other: &Self) -> bool {
            self.0.to_bits() == other.0.to_bits()
        }
    }
    impl Eq for OrderedF64 {}

    impl From<f64> for OrderedF64 {
        fn from(v: f64) -> Self {
            OrderedF64(v)
        }
    }
}

impl ConfigValue {
    pub fn str<S: Into<String>>(s: S) -> Self {
        ConfigValue::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Deterministic byte encoding: sorted map keys recursively, used by
    /// both the project-id hash (`spec.md` §4.8.1) and property-map
    /// fingerprinting (P6). `BTreeMap` already iterates in key order, so this
    /// is a straightforward recursive walk.
    fn canonicalize_into(&self, out: &mut Vec<u8>) {
        match self {
            ConfigValue::Null => out.push(0),
            ConfigValue::Bool(b) => {
                out.push(1);
                out.push(*b as u8);
            }
            ConfigValue::Int(i) => {
                out.push(2);
                out.extend_from_slice(&i.to_le_bytes());
            }
            ConfigValue::Float(f) => {
                out.push(3);
                out.extend_from_slice(&f.0.to_bits().to_le_bytes());
            }
            ConfigValue::String(s) => {
                out.push(4);
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            ConfigValue::List(items) => {
                out.push(5);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.canonicalize_into(out);
                }
            }
            ConfigValue::Map(map) => {
                out.push(6);
                out.extend_from_slice(&(map.len() as u64).to_le_bytes());
                for (k, v) in map {
                    out.extend_from_slice(&(k.len() as u64).to_le_bytes());
                    out.extend_from_slice(k.as_bytes());
                    v.canonicalize_into(out);
                }
            }
        }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.canonicalize_into(&mut out);
        out
    }

    /// Structural compatibility per `spec.md` §4.8.2: same keys, same
    /// values, nested maps recurse. Lists compare element-wise in order
    /// (the resolved configuration never relies on list-as-set semantics).
    pub fn is_compatible_with(&self, other: &ConfigValue) -> bool {
        match (self, other) {
            (ConfigValue::Map(a), ConfigValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.get(k).map(|bv| v.is_compatible_with(bv)).unwrap_or(false)
                    })
            }
            (ConfigValue::List(a), ConfigValue::List(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.is_compatible_with(y))
            }
            _ => self == other,
        }
    }

    /// Stable hash used to derive the build-graph file path from the
    /// resolved configuration (§4.8.1).
    pub fn stable_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        hasher.finalize().into()
    }
}

/// An evaluated module/product property map (`spec.md` §3.1 `properties`
/// field). Immutable and reference-counted: deriving a per-artifact override
/// (`spec.md` §4.5 step 6, "artifact-local overrides of product-wide
/// properties") clones the map's contents into a new `Arc`, leaving every
/// other holder of the original untouched — the same copy-on-write shape as
/// the teacher's `Arc<str>` string interning, just applied to a whole map
/// instead of a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap {
    modules: Arc<BTreeMap<String, BTreeMap<String, ConfigValue>>>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&ConfigValue> {
        self.modules.get(module).and_then(|m| m.get(name))
    }

    /// Returns a new map with `(module, name)` set to `value`, sharing
    /// everything else via the underlying `Arc` until mutated again.
    pub fn with_override(&self, module: &str, name: &str, value: ConfigValue) -> PropertyMap {
        let mut modules = (*self.modules).clone();
        modules
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), value);
        PropertyMap {
            modules: Arc::new(modules),
        }
    }

    pub fn modules(&self) -> &BTreeMap<String, BTreeMap<String, ConfigValue>> {
        &self.modules
    }

    /// Fingerprint stable across store/load cycles (P6): built from the same
    /// canonical byte encoding `ConfigValue` uses, so it is insensitive to
    /// map-insertion order.
    pub fn fingerprint(&self) -> [u8; 32] {
        let as_config = ConfigValue::Map(
            self.modules
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        ConfigValue::Map(v.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                    )
                })
                .collect(),
        );
        as_config.stable_hash()
    }
}

/// One `(module, property)` access recorded during prepare-script evaluation
/// (`spec.md` §4.5 step 5, §9 "Property-read observation"). `kind`
/// distinguishes a product-scoped read from an artifact-scoped read, per
/// `spec.md` §3.1's two separate fields on `Transformer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyReadKind {
    Product,
    Artifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRead {
    pub kind: PropertyReadKind,
    pub module: String,
    pub name: String,
    pub value: ConfigValue,
}

/// Recording wrapper the script VM integration reports reads through
/// (`spec.md` §9: "a small recording wrapper" instead of a global observer).
/// An executor session owns one of these per prepare-script evaluation; it is
/// never a process-wide singleton.
#[derive(Debug, Default)]
pub struct PropertyReadRecorder {
    reads: Vec<PropertyRead>,
}

impl PropertyReadRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: PropertyReadKind, module: &str, name: &str, value: ConfigValue) {
        self.reads.push(PropertyRead {
            kind,
            module: module.to_string(),
            name: name.to_string(),
            value,
        });
    }

    pub fn into_reads(self) -> Vec<PropertyRead> {
        self.reads
    }

    pub fn reads(&self) -> &[PropertyRead] {
        &self.reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_override_does_not_mutate_original() {
        let base = PropertyMap::new().with_override("cpp", "optimization", ConfigValue::str("fast"));
        let derived = base.with_override("cpp", "optimization", ConfigValue::str("debug"));
        assert_eq!(
            base.get("cpp", "optimization"),
            Some(&ConfigValue::str("fast"))
        );
        assert_eq!(
            derived.get("cpp", "optimization"),
            Some(&ConfigValue::str("debug"))
        );
    }

    #[test]
    fn fingerprint_stable_across_clone() {
        let a = PropertyMap::new().with_override("cpp", "x", ConfigValue::Int(1));
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_insensitive_to_insertion_order() {
        let a = PropertyMap::new()
            .with_override("cpp", "x", ConfigValue::Int(1))
            .with_override("cpp", "y", ConfigValue::Int(2));
        let b = PropertyMap::new()
            .with_override("cpp", "y", ConfigValue::Int(2))
            .with_override("cpp", "x", ConfigValue::Int(1));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn config_value_compatibility_recurses_into_maps() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), ConfigValue::Int(1));
        let mut b = a.clone();
        assert!(ConfigValue::Map(a.clone()).is_compatible_with(&ConfigValue::Map(b.clone())));
        b.insert("x".to_string(), ConfigValue::Int(2));
        assert!(!ConfigValue::Map(a).is_compatible_with(&ConfigValue::Map(b)));
    }
}
