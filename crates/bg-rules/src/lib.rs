//! Rules applicator (`spec.md` §4.5): turns a rule plus a tagged input set
//! into one or more transformers.

pub mod apply;
pub mod error;
pub mod script;

pub use apply::{apply_rule, do_apply, CompiledScriptCache};
pub use error::{Result, RulesError};
pub use script::{InputScope, PrepareScriptOutcome, ScriptEngine, ScriptError, ScriptScope};
