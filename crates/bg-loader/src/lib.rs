//! Change tracker / loader (`spec.md` §4.8): the facade a CLI front-end
//! links against. Ties the persistent pool (`bg-pool`), the resolver
//! (`bg-resolver`) and the graph (`bg-graph`) together into one
//! `load`/`store` contract, reconciling a freshly resolved project against
//! whatever was last persisted.

pub mod error;
pub mod load;
pub mod reconcile;

pub use error::{BuildGraphError, Result};
pub use load::{load, store, LoadOutcome, LoadRequest};
pub use reconcile::{reconcile, needs_reresolve, ProductChange, ReconcileInputs, ReconciliationReport};
