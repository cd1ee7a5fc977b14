//! `Command`: the tagged union produced by a rule's prepare script
//! (`spec.md` §3.1). Structural equality between two `Command`s is the
//! *command signature* used by the loader to decide whether a transformer's
//! outputs can be rescued across an incremental reload (`spec.md` §3.1,
//! §4.8 step 7, GLOSSARY).

use crate::property::ConfigValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Source location used purely for diagnostics (script-command exceptions,
/// rule-conflict errors in `spec.md` §4.5 step 2 / S4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A process invocation (`spec.md` §3.1 "Process command", §6
/// "Process-command execution").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCommand {
    pub program: String,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
    /// Overlays (and may shadow) the product's build environment; does not
    /// replace it wholesale (`spec.md` §6).
    pub environment_overlay: BTreeMap<String, String>,
    pub max_exit_code: i32,
    /// Source of an optional stdout/stderr filter function, evaluated by the
    /// script VM over the raw output lines (`spec.md` §3.1). `None` means no
    /// filtering.
    pub output_filter_source: Option<String>,
    /// `>= 0` enables the response-file mechanism once
    /// `program.len() + argv_joined.len()` exceeds this many bytes
    /// (`spec.md` §6); negative disables it.
    pub response_file_threshold: i64,
    pub response_file_usage_prefix: String,
    /// Ambient progress-reporting string, not used for execution or
    /// equality comparisons that matter for up-to-date decisions beyond the
    /// fields above — see `SPEC_FULL.md` §2 "Command description string".
    pub description: Option<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
            working_directory: working_directory.into(),
            environment_overlay: BTreeMap::new(),
            max_exit_code: 0,
            output_filter_source: None,
            response_file_threshold: -1,
            response_file_usage_prefix: String::new(),
            description: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Structural equality ignoring `description` (an ambient UX string, not
    /// part of the command signature).
    fn signature_eq(&self, other: &Self) -> bool {
        self.program == other.program
            && self.arguments == other.arguments
            && self.working_directory == other.working_directory
            && self.environment_overlay == other.environment_overlay
            && self.max_exit_code == other.max_exit_code
            && self.output_filter_source == other.output_filter_source
            && self.response_file_threshold == other.response_file_threshold
            && self.response_file_usage_prefix == other.response_file_usage_prefix
    }

    /// Whether the argv would need to be written to a response file per
    /// `spec.md` §6.
    pub fn needs_response_file(&self) -> bool {
        if self.response_file_threshold < 0 {
            return false;
        }
        let argv_joined_len: usize = self.arguments.iter().map(|a| a.len() + 1).sum();
        (self.program.len() + argv_joined_len) as i64 > self.response_file_threshold
    }
}

/// An in-engine script invocation (`spec.md` §3.1 "In-engine script
/// command").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCommand {
    pub source: String,
    pub properties: BTreeMap<String, ConfigValue>,
    pub location: SourceLocation,
    pub description: Option<String>,
}

impl ScriptCommand {
    fn signature_eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.properties == other.properties
            && self.location == other.location
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Process(ProcessCommand),
    Script(ScriptCommand),
}

impl Command {
    /// Command-signature equality (`spec.md` §3.1): ignores the ambient
    /// `description` field, compares everything else structurally.
    pub fn same_signature(&self, other: &Command) -> bool {
        match (self, other) {
            (Command::Process(a), Command::Process(b)) => a.signature_eq(b),
            (Command::Script(a), Command::Script(b)) => a.signature_eq(b),
            _ => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Command::Process(p) => p
                .description
                .clone()
                .unwrap_or_else(|| format!("running {}", p.program)),
            Command::Script(s) => s
                .description
                .clone()
                .unwrap_or_else(|| format!("running script at {}", s.location)),
        }
    }
}

/// A transformer's command signature: the ordered list of commands compared
/// structurally, used by the loader to decide whether to rescue a
/// transformer's outputs (`spec.md` §3.1, §4.8 step 7, GLOSSARY
/// "Command signature").
pub fn same_command_signature(a: &[Command], b: &[Command]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.same_signature(y))
}
