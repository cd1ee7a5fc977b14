use bg_core::SourceLocation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("rule at {0} and rule at {1} both produce output path {2:?}")]
    ConflictingOutputs(SourceLocation, SourceLocation, std::path::PathBuf),

    #[error("rule at {0} produced no commands")]
    NoCommands(SourceLocation),

    #[error("product {0:?} depends on unknown product {1:?} via `usings`")]
    UnknownUsingsProduct(String, String),

    #[error("script evaluation failed at {location}: {message}")]
    Script {
        location: SourceLocation,
        message: String,
    },

    #[error("graph operation failed while applying rule: {0}")]
    Graph(#[from] bg_graph::GraphError),
}

pub type Result<T> = std::result::Result<T, RulesError>;
