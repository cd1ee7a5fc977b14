//! `Transformer`: one invocation site for a rule (`spec.md` §3.1).

use crate::command::Command;
use crate::handle::{ArtifactId, RuleId, TransformerId};
use crate::property::PropertyRead;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub id: TransformerId,
    pub rule: RuleId,
    pub inputs: BTreeSet<ArtifactId>,
    pub outputs: BTreeSet<ArtifactId>,
    pub commands: Vec<Command>,

    /// The exact `(module, name, value)` tuples read while evaluating the
    /// prepare script in product scope (`spec.md` §3.1).
    pub properties_requested_from_product_in_prepare_script: Vec<PropertyRead>,
    /// Same, but reads that went through an output artifact's scope
    /// (`spec.md` §3.1).
    pub properties_requested_from_artifact_in_prepare_script: Vec<PropertyRead>,

    /// Supplemented feature (`SPEC_FULL.md` §2): force this transformer to
    /// run regardless of the up-to-date check.
    pub always_run: bool,
}

impl Transformer {
    pub fn new(id: TransformerId, rule: RuleId) -> Self {
        Self {
            id,
            rule,
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            commands: Vec::new(),
            properties_requested_from_product_in_prepare_script: Vec::new(),
            properties_requested_from_artifact_in_prepare_script: Vec::new(),
            always_run: false,
        }
    }

    /// I5: at least one output must be `always_updated` to define freshness.
    /// Checked by the caller against the owning artifacts' `always_updated`
    /// flags (the transformer itself only stores handles).
    pub fn has_commands(&self) -> bool {
        !self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::RuleId;

    #[test]
    fn new_transformer_has_no_commands() {
        let t = Transformer::new(TransformerId(0), RuleId(0));
        assert!(!t.has_commands());
    }
}
