//! Persistent pool: id-interned, versioned, streamed serialization of the
//! build graph (`spec.md` §4.1). Generic over the body type so the actual
//! graph structure (owned by `bg-graph`) stays decoupled from the
//! serialization contract.

pub mod error;
pub mod head;
pub mod pool;

pub use error::{PoolError, Result};
pub use head::{build_graph_path, project_id_for, Head, FORMAT_VERSION};
pub use pool::{load, load_head, load_unchecked, store};
