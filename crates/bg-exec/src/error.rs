//! `ExecutorError` (`spec.md` §7 "Command failure", §4.7).

use bg_core::{ArtifactId, TransformerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("artifact {0:?} not found in project")]
    ArtifactNotFound(ArtifactId),
    #[error("process {program:?} failed to start: {source}")]
    ProcessSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command for transformer {transformer:?} exited with code {code} (max allowed {max_allowed})")]
    CommandFailed {
        transformer: TransformerId,
        code: i32,
        max_allowed: i32,
    },
    #[error("script command execution is not wired up: {0}")]
    NoScriptRunner(String),
    #[error("build was canceled")]
    Canceled,
    #[error("scanner error: {0}")]
    Scanner(#[from] bg_scanner::error::ScannerError),
    #[error("graph operation failed during execution: {0}")]
    Graph(#[from] bg_graph::GraphError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
