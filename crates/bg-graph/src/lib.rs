//! Bipartite artifact/transformer graph: the project's DAG, edge discipline
//! and cycle detection (`spec.md` §3.2, §4.2).

pub mod cycle;
pub mod error;
pub mod graph;
pub mod product_data;
pub mod project;

pub use cycle::detect_cycle;
pub use error::{GraphError, Result};
pub use graph::{
    artifacts_in_product, artifacts_with_tag, connect, disconnect, insert_artifact,
    lookup_artifact, lookup_artifact_in_named_product, remove_artifact, safe_connect,
    RemoveOptions,
};
pub use product_data::ProductEntry;
pub use project::{LookupKey, Project};
