//! `ResolverError` (`spec.md` §4.6, §7 "Configuration error").

use bg_core::{ProductId, RuleId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("product {dependent:?} depends on disabled product {dependency:?}")]
    DisabledDependency {
        dependent: ProductId,
        dependency: ProductId,
    },
    #[error("product {0:?} has a dependency cycle through {1:?}")]
    DependencyCycle(ProductId, ProductId),
    #[error("manual transformer {transformer} in product {product:?} references unknown input {input:?}")]
    ManualTransformerInputNotFound {
        product: ProductId,
        transformer: String,
        input: std::path::PathBuf,
    },
    #[error("invalid wildcard pattern {pattern:?} in product {product:?}: {message}")]
    InvalidWildcard {
        product: ProductId,
        pattern: String,
        message: String,
    },
    #[error("invalid file tagger pattern {pattern:?}: {message}")]
    InvalidFileTagger { pattern: String, message: String },
    #[error("rule application failed: {0}")]
    Rules(#[from] bg_rules::RulesError),
    #[error("graph operation failed while resolving: {0}")]
    Graph(#[from] bg_graph::GraphError),
    #[error("unknown rule id {0:?} in product {1:?}")]
    UnknownRule(RuleId, ProductId),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
