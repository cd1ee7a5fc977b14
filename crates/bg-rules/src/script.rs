//! Prepare-script VM contract (`spec.md` §9 "Script VM integration"):
//! "compile-a-function-once, evaluate-with-scope, observe-property-reads,
//! catch-exceptions-with-location". The core does not own a script engine
//! (`spec.md` §1 non-goals); `bg-rules` only defines the trait boundary an
//! external embedder must satisfy to drive `apply_rule`/`do_apply`.

use bg_core::{ArtifactId, Command, ConfigValue, FileTagSet, PropertyMap, PropertyReadRecorder, SourceLocation};
use std::path::PathBuf;

/// Everything a rule script can see while evaluating one rule-artifact
/// fileName expression, a property binding, or the prepare script itself
/// (`spec.md` §4.5 step 2 "rule scope", step 5 "evaluation").
#[derive(Debug, Clone)]
pub struct ScriptScope {
    pub product_properties: PropertyMap,
    /// Per-input scope exposed when the rule is not multiplexed
    /// (`spec.md` §4.5 "exposing per-input `fileName`, `baseName`,
    /// `completeBaseName`, `baseDir`"); empty for a multiplex invocation,
    /// which instead sees the whole tagged input set via `inputs`.
    pub primary_input: Option<InputScope>,
    pub inputs: Vec<InputScope>,
    pub outputs: Vec<ArtifactId>,
}

#[derive(Debug, Clone)]
pub struct InputScope {
    pub artifact: ArtifactId,
    pub file_name: String,
    pub base_name: String,
    pub complete_base_name: String,
    pub base_dir: PathBuf,
    pub tags: FileTagSet,
    pub properties: PropertyMap,
}

impl InputScope {
    pub fn from_path(artifact: ArtifactId, path: &std::path::Path, tags: FileTagSet, properties: PropertyMap) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        // "completeBaseName" strips every extension, not just the last one
        // (qbs convention: `archive.tar.gz` -> `archive`).
        let complete_base_name = file_name
            .split('.')
            .next()
            .unwrap_or(&file_name)
            .to_string();
        let base_dir = path.parent().map(PathBuf::from).unwrap_or_default();
        Self {
            artifact,
            file_name,
            base_name,
            complete_base_name,
            base_dir,
            tags,
            properties,
        }
    }
}

/// Outcome of evaluating a rule's prepare script (`spec.md` §4.5 step 5):
/// "The script's return value is either one command or an array".
#[derive(Debug, Clone)]
pub struct PrepareScriptOutcome {
    pub commands: Vec<Command>,
}

/// The engine contract consumed by `do_apply`. `Compiled` is the engine's own
/// opaque compiled-function representation, cached per rule by the caller
/// (`spec.md` §4.5 step 5: "wrapped into a function on first evaluation and
/// cached per rule").
pub trait ScriptEngine {
    type Compiled;

    fn compile_prepare_script(
        &self,
        source: &str,
        location: &SourceLocation,
    ) -> Result<Self::Compiled, ScriptError>;

    fn evaluate_prepare_script(
        &self,
        compiled: &Self::Compiled,
        scope: &ScriptScope,
        recorder: &mut PropertyReadRecorder,
    ) -> Result<PrepareScriptOutcome, ScriptError>;

    /// Evaluates a small one-off expression (a rule-artifact `fileName`
    /// expression or a property binding, `spec.md` §4.5 steps 2 and 6).
    /// These are not cached per the spec's own "wrapped... cached per rule"
    /// language, which is specific to the prepare script.
    fn evaluate_expression(
        &self,
        expression_source: &str,
        location: &SourceLocation,
        scope: &ScriptScope,
        recorder: &mut PropertyReadRecorder,
    ) -> Result<ConfigValue, ScriptError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {location}")]
pub struct ScriptError {
    pub location: SourceLocation,
    pub message: String,
}
