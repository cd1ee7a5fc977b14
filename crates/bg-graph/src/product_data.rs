//! `ProductBuildData` (`spec.md` §3.1 "Resolved product" / §3.2 ownership):
//! the build-time state layered on top of a declarative `bg_core::Product`.

use bg_core::{ArtifactId, Product, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A product's declarative description plus the build-time bookkeeping the
/// resolver, rules applicator and executor all need (`spec.md` §3.1, §4.6
/// step 6, §4.8 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEntry {
    pub product: Product,
    /// Every artifact in the project-wide arena owned by this product
    /// (`spec.md` §3.2: "owns every `Artifact` in the product").
    pub own_artifacts: BTreeSet<ArtifactId>,
    /// Generated artifacts whose tags intersect the product's own type tags
    /// (`spec.md` §4.6 step 6).
    pub target_artifacts: BTreeSet<ArtifactId>,
    /// Set when any structural mutation touches this product's artifacts or
    /// transformers (`spec.md` §4.2 "marks the project dirty", §4.7 "mark
    /// the owning product's build data dirty").
    pub dirty: bool,
}

impl ProductEntry {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            own_artifacts: BTreeSet::new(),
            target_artifacts: BTreeSet::new(),
            dirty: false,
        }
    }

    pub fn id(&self) -> ProductId {
        self.product.id
    }
}
