//! `Rule` and its nested types (`spec.md` §3.1), plus `FileTagger`.

use crate::command::SourceLocation;
use crate::file_tag::FileTagSet;
use crate::handle::ModuleId;
use serde::{Deserialize, Serialize};

/// Opaque script source evaluated by the embedded VM the core does not own
/// (`spec.md` §1 "Out of scope", §9 "Script VM integration"). The core only
/// ever stores and compares the source text and its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptExpr {
    pub source: String,
    pub location: SourceLocation,
}

impl ScriptExpr {
    pub fn new(source: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            source: source.into(),
            location,
        }
    }
}

/// `(qualified-name, expression, location)` property binding re-evaluated in
/// an output artifact's scope and merged into its property map
/// (`spec.md` §3.1, §4.5 step 6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBinding {
    pub qualified_name: String,
    pub expression: ScriptExpr,
    pub location: SourceLocation,
}

/// One output-artifact template within a rule (`spec.md` §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleArtifact {
    pub file_name_expression: ScriptExpr,
    pub output_tags: FileTagSet,
    pub always_updated: bool,
    pub property_bindings: Vec<PropertyBinding>,
}

impl RuleArtifact {
    pub fn new(file_name_expression: ScriptExpr, output_tags: FileTagSet) -> Self {
        Self {
            file_name_expression,
            output_tags,
            always_updated: true,
            property_bindings: Vec::new(),
        }
    }
}

/// Declarative production recipe (`spec.md` §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub location: SourceLocation,
    pub inputs: FileTagSet,
    pub auxiliary_inputs: FileTagSet,
    pub usings: FileTagSet,
    pub explicitly_depends_on: FileTagSet,
    pub artifacts: Vec<RuleArtifact>,
    pub prepare_script: ScriptExpr,
    pub multiplex: bool,
    pub module: ModuleId,
    /// Supplemented feature (`SPEC_FULL.md` §2): force every transformer
    /// this rule produces to always run.
    pub always_run: bool,
}

impl Rule {
    /// A rule "produces tag `t`" iff any of its rule-artifact templates
    /// declares `t` among its output tags — used to compute the
    /// producer-before-consumer topological rule order (`spec.md` §4.5
    /// "Ordering and tie-breaks").
    pub fn produces_tag(&self, tag: &crate::file_tag::FileTag) -> bool {
        self.artifacts.iter().any(|a| a.output_tags.contains(tag))
    }

    pub fn consumes_tag(&self, tag: &crate::file_tag::FileTag) -> bool {
        self.inputs.contains(tag) || self.auxiliary_inputs.contains(tag)
    }
}

/// Regex-over-filename to tag-set (`spec.md` §3.1 "File tagger"). The regex
/// engine itself is an external collaborator (`spec.md` §1); this just
/// stores the pattern source and the tags it yields. Compiling/matching is
/// plugged in by `bg-resolver` via the `regex` crate, kept out of `bg-core`
/// so the entity layer stays dependency-light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTagger {
    pub pattern: String,
    pub tags: FileTagSet,
}

impl FileTagger {
    pub fn new(pattern: impl Into<String>, tags: FileTagSet) -> Self {
        Self {
            pattern: pattern.into(),
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_tag::FileTag;

    fn loc() -> SourceLocation {
        SourceLocation::new("rules.qbs", 1, 1)
    }

    #[test]
    fn produces_tag_checks_rule_artifacts() {
        let rule = Rule {
            name: "cpp-compiler".into(),
            location: loc(),
            inputs: FileTagSet::from_iter([FileTag::from("cpp")]),
            auxiliary_inputs: FileTagSet::new(),
            usings: FileTagSet::new(),
            explicitly_depends_on: FileTagSet::new(),
            artifacts: vec![RuleArtifact::new(
                ScriptExpr::new("input.baseName + '.o'", loc()),
                FileTagSet::from_iter([FileTag::from("obj")]),
            )],
            prepare_script: ScriptExpr::new("", loc()),
            multiplex: false,
            module: ModuleId(0),
            always_run: false,
        };
        assert!(rule.produces_tag(&FileTag::from("obj")));
        assert!(!rule.produces_tag(&FileTag::from("cpp")));
        assert!(rule.consumes_tag(&FileTag::from("cpp")));
    }
}
