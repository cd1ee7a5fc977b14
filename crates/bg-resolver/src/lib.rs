//! Build-data resolver (`spec.md` §4.6): builds each enabled product's
//! initial artifact set from its declared groups, rules and manual
//! transformers.

pub mod error;
pub mod file_tagger;
pub mod resolve;
pub mod wildcard;

pub use error::{ResolverError, Result};
pub use file_tagger::CompiledTaggers;
pub use resolve::{resolve_project, reresolve_product};
pub use wildcard::expand_wildcards;
