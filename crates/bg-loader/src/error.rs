//! `BuildGraphError` (`spec.md` §7): the facade error a CLI front-end links
//! against, unifying every downstream crate's own error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildGraphError {
    #[error("persisted build graph I/O or decode error: {0}")]
    Pool(#[from] bg_pool::PoolError),

    #[error("graph operation failed during reconciliation: {0}")]
    Graph(#[from] bg_graph::GraphError),

    #[error("rule application failed during reconciliation: {0}")]
    Rules(#[from] bg_rules::RulesError),

    #[error("resolve failed during reconciliation: {0}")]
    Resolver(#[from] bg_resolver::ResolverError),

    #[error("executor error: {0}")]
    Executor(#[from] bg_exec::ExecutorError),

    #[error("scanner error: {0}")]
    Scanner(#[from] bg_scanner::ScannerError),

    #[error("persisted build graph at {path} failed its back-pointer consistency check: {detail}")]
    CorruptGraph { path: std::path::PathBuf, detail: String },
}

pub type Result<T> = std::result::Result<T, BuildGraphError>;
