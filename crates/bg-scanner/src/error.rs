use bg_core::ArtifactId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("artifact {0:?} not found")]
    ArtifactNotFound(ArtifactId),

    #[error("graph operation failed while wiring scanned dependency: {0}")]
    Graph(#[from] bg_graph::GraphError),
}

pub type Result<T> = std::result::Result<T, ScannerError>;
