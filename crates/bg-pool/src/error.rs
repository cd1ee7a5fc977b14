use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("io error accessing build graph file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode build graph: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode build graph: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("build graph format version {found} is not supported (expected {expected})")]
    UnsupportedFormatVersion { found: u32, expected: u32 },

    #[error("stored project configuration is not compatible with the requested one")]
    IncompatibleConfiguration,
}

pub type Result<T> = std::result::Result<T, PoolError>;
