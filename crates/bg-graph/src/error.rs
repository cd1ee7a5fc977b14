use bg_core::ArtifactId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("cannot connect an artifact to itself ({0:?})")]
    SelfEdge(ArtifactId),

    #[error("artifact {child:?} is already a child of {parent:?} under a different handle for the same path")]
    DuplicateChildPath { parent: ArtifactId, child: ArtifactId },

    #[error("connecting {child:?} as a child of {parent:?} would introduce a cycle")]
    WouldCycle { parent: ArtifactId, child: ArtifactId },

    #[error("cycle detected among artifacts: {0:?}")]
    CycleDetected(Vec<ArtifactId>),

    #[error("duplicate generated artifact for path within one product (I6): {0:?}")]
    DuplicateGeneratedPath(ArtifactId),

    #[error("artifact {0:?} not found")]
    ArtifactNotFound(ArtifactId),

    #[error("io error removing artifact from disk: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
