use thiserror::Error;

/// Flat error enum for the entity layer, following the same one-enum-per-crate
/// shape as the rest of the workspace (each downstream crate adds its own
/// enum and wraps this one with `#[from]` where it can surface one of these).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid rule-artifact file name expression: {0}")]
    InvalidFileName(String),

    #[error("unknown file tag: {0}")]
    UnknownFileTag(String),

    #[error("property {module}.{name} not found")]
    PropertyNotFound { module: String, name: String },

    #[error("malformed property value for {module}.{name}: {reason}")]
    InvalidPropertyValue {
        module: String,
        name: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
