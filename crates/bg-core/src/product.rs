//! `Product`, `Module`, manual transformers and source groups
//! (`spec.md` §3.1 "Resolved product").

use crate::file_tag::FileTagSet;
use crate::handle::{ModuleId, ProductId};
use crate::property::PropertyMap;
use crate::rule::{FileTagger, Rule, ScriptExpr};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A group of source artifacts: either an explicit file list, a set of glob
/// wildcards evaluated against disk, or both. Wildcard drift detection (S3,
/// `spec.md` §4.8 step 5 "re-expand wildcards and compare to stored wildcard
/// file sets") keys off `wildcards`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub name: String,
    pub explicit_files: Vec<PathBuf>,
    pub wildcards: Vec<String>,
    pub file_tags: FileTagSet,
}

impl SourceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            explicit_files: Vec::new(),
            wildcards: Vec::new(),
            file_tags: FileTagSet::new(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !self.wildcards.is_empty()
    }
}

/// A manually declared transformer (`spec.md` §4.6 step 4): named inputs
/// resolved by file name within the product, one generated output per
/// declared output descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTransformerOutput {
    pub file_name: PathBuf,
    pub tags: FileTagSet,
    pub always_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTransformer {
    pub name: String,
    pub input_file_names: Vec<PathBuf>,
    pub outputs: Vec<ManualTransformerOutput>,
    pub prepare_script: ScriptExpr,
    pub explicitly_depends_on: FileTagSet,
}

/// Owning module for a rule (`spec.md` §3.1 "Rule.module": "carries imports
/// visible during evaluation"). The core does not evaluate imports; it only
/// threads the handle through so the (external) script VM can resolve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
}

/// Aggregate of groups, rules, file taggers, manual transformers, module
/// dependencies and a property map (`spec.md` §3.1 "Resolved product").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub enabled: bool,
    pub project_file: PathBuf,
    pub groups: Vec<SourceGroup>,
    pub rules: Vec<Rule>,
    pub file_taggers: Vec<FileTagger>,
    pub manual_transformers: Vec<ManualTransformer>,
    /// Other products this one depends on (`spec.md` §4.6 step 1, §4.5
    /// "usings expansion").
    pub dependencies: Vec<ProductId>,
    pub properties: PropertyMap,
    /// The product's own type tags: target artifacts are every generated
    /// artifact whose tags intersect this set (`spec.md` §4.6 step 6).
    pub type_tags: FileTagSet,
    /// Environment variables the resolver/rules read while evaluating this
    /// product (`spec.md` §4.8 step 5 "stored used-environment entries").
    pub used_environment: std::collections::BTreeMap<String, String>,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, project_file: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            project_file: project_file.into(),
            groups: Vec::new(),
            rules: Vec::new(),
            file_taggers: Vec::new(),
            manual_transformers: Vec::new(),
            dependencies: Vec::new(),
            properties: PropertyMap::new(),
            type_tags: FileTagSet::new(),
            used_environment: std::collections::BTreeMap::new(),
        }
    }

    /// Rules topologically ordered producer-before-consumer
    /// (`spec.md` §4.5 "Ordering and tie-breaks"). A simple Kahn's-algorithm
    /// pass over the produce/consume relation between rules in this product;
    /// ties (rules with no tag relationship) keep their declared order,
    /// matching "observable... insertion order" semantics elsewhere in the
    /// spec.
    pub fn topologically_sorted_rules(&self) -> Vec<&Rule> {
        let n = self.rules.len();
        let mut in_degree = vec![0usize; n];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, consumer) in self.rules.iter().enumerate() {
            for (j, producer) in self.rules.iter().enumerate() {
                if i == j {
                    continue;
                }
                let shares_tag = producer
                    .artifacts
                    .iter()
                    .flat_map(|a| a.output_tags.iter())
                    .any(|t| consumer.consumes_tag(t));
                if shares_tag {
                    edges[j].push(i);
                    in_degree[i] += 1;
                }
            }
        }
        let mut ready: std::collections::VecDeque<usize> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);
        let mut seen = vec![false; n];
        while let Some(i) = ready.pop_front() {
            if seen[i] {
                continue;
            }
            seen[i] = true;
            order.push(i);
            for &dep in &edges[i] {
                in_degree[dep] -= 1;
                if in_degree[dep] == 0 {
                    ready.push_back(dep);
                }
            }
        }
        // Any rule not reached (cyclic tag relationship between rules,
        // which is legal — cycles are only forbidden at the artifact level,
        // `spec.md` I4) is appended in declaration order.
        for i in 0..n {
            if !seen[i] {
                order.push(i);
            }
        }
        order.into_iter().map(|i| &self.rules[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SourceLocation;
    use crate::file_tag::FileTag;
    use crate::rule::RuleArtifact;

    fn loc() -> SourceLocation {
        SourceLocation::new("x.qbs", 1, 1)
    }

    fn rule(name: &str, input_tag: &str, output_tag: &str) -> Rule {
        Rule {
            name: name.into(),
            location: loc(),
            inputs: FileTagSet::from_iter([FileTag::from(input_tag)]),
            auxiliary_inputs: FileTagSet::new(),
            usings: FileTagSet::new(),
            explicitly_depends_on: FileTagSet::new(),
            artifacts: vec![RuleArtifact::new(
                ScriptExpr::new("x", loc()),
                FileTagSet::from_iter([FileTag::from(output_tag)]),
            )],
            prepare_script: ScriptExpr::new("", loc()),
            multiplex: false,
            module: ModuleId(0),
            always_run: false,
        }
    }

    #[test]
    fn topological_order_runs_producer_before_consumer() {
        let mut p = Product::new(ProductId(0), "app", "x.qbs");
        // Declared out of order: linker before compiler.
        p.rules.push(rule("linker", "obj", "application"));
        p.rules.push(rule("compiler", "cpp", "obj"));
        let order: Vec<&str> = p
            .topologically_sorted_rules()
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(order, vec!["compiler", "linker"]);
    }
}
