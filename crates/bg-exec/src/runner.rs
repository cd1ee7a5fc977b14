//! Command execution (`spec.md` §6 "Process-command execution"). Process
//! commands are run for real via `std::process::Command`; script commands
//! are delegated to an externally supplied handler since the embedded
//! script engine is out of scope here exactly as it is for `bg-rules`
//! (`spec.md` §1 non-goals).

use crate::error::{ExecutorError, Result};
use bg_core::{Command, ProcessCommand, ScriptCommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Stdio;

/// Outcome of running one command (`spec.md` §6: "Success is
/// `exit_code ≤ max_exit_code`").
pub struct CommandOutcome {
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn is_success(&self, max_exit_code: i32) -> bool {
        self.exit_code <= max_exit_code
    }
}

/// The coordinator's view of "run this command with the product's build
/// environment" (`spec.md` §6). Implementors must not touch the graph —
/// workers only execute and report back (`spec.md` §5 "Shared resources").
pub trait CommandRunner: Send + Sync {
    fn run_process(
        &self,
        command: &ProcessCommand,
        base_environment: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome>;

    fn run_script(&self, command: &ScriptCommand) -> Result<CommandOutcome>;

    fn run(&self, command: &Command, base_environment: &BTreeMap<String, String>) -> Result<CommandOutcome> {
        match command {
            Command::Process(p) => self.run_process(p, base_environment),
            Command::Script(s) => self.run_script(s),
        }
    }
}

/// Default runner: real out-of-process execution for `ProcessCommand`,
/// the response-file mechanism of `spec.md` §6, and an optional injected
/// handler for `ScriptCommand` (there is no embedded script VM in this
/// crate).
pub struct ProcessCommandRunner {
    script_handler: Option<Box<dyn Fn(&ScriptCommand) -> Result<CommandOutcome> + Send + Sync>>,
}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self { script_handler: None }
    }
}

impl ProcessCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script_handler(
        mut self,
        handler: impl Fn(&ScriptCommand) -> Result<CommandOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.script_handler = Some(Box::new(handler));
        self
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run_process(
        &self,
        command: &ProcessCommand,
        base_environment: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome> {
        let mut environment = base_environment.clone();
        for (k, v) in &command.environment_overlay {
            environment.insert(k.clone(), v.clone());
        }

        let response_file = if command.needs_response_file() {
            Some(write_response_file(command)?)
        } else {
            None
        };

        let mut invocation = std::process::Command::new(&command.program);
        invocation
            .current_dir(&command.working_directory)
            .env_clear()
            .envs(&environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match &response_file {
            Some(path) => {
                invocation.arg(format!(
                    "{}{}",
                    command.response_file_usage_prefix,
                    path.display()
                ));
            }
            None => {
                invocation.args(&command.arguments);
            }
        }

        let output = invocation
            .output()
            .map_err(|source| ExecutorError::ProcessSpawnFailed {
                program: command.program.clone(),
                source,
            })?;

        // On Windows the temp file must outlive process exit; we delete it
        // only after `output()` has returned (`spec.md` §6).
        if let Some(path) = response_file {
            let _ = std::fs::remove_file(path);
        }

        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn run_script(&self, command: &ScriptCommand) -> Result<CommandOutcome> {
        match &self.script_handler {
            Some(handler) => handler(command),
            None => Err(ExecutorError::NoScriptRunner(command.location.to_string())),
        }
    }
}

fn write_response_file(command: &ProcessCommand) -> Result<std::path::PathBuf> {
    let mut file = tempfile_in_build_dir(&command.working_directory)?;
    for arg in &command.arguments {
        writeln!(file.1, "{arg}")?;
    }
    Ok(file.0)
}

fn tempfile_in_build_dir(
    dir: &std::path::Path,
) -> Result<(std::path::PathBuf, std::fs::File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(".bg-response-{}", std::process::id()));
    let file = std::fs::File::create(&path)?;
    Ok((path, file))
}
