//! Non-owning handle types backed by per-project arenas.
//!
//! `spec.md` §9 calls for arena-allocated nodes addressed by integer index
//! rather than the bidirectional raw pointers the original C++ uses; this
//! mirrors the `NodeId`/`EdgeId` handle pattern the teacher crate uses for its
//! own graph (`codegraph-graph::edges::Edge` addressed by `NodeId`), except
//! backed by a plain arena index instead of a `Uuid` since handles here never
//! need to be globally unique outside one project's lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_handle {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn from_index(idx: usize) -> Self {
                Self(idx as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

define_handle!(ArtifactId, "Handle to an `Artifact` in a project's arena.");
define_handle!(
    TransformerId,
    "Handle to a `Transformer` in a project's arena."
);
define_handle!(RuleId, "Handle to a `Rule` owned by a product.");
define_handle!(ProductId, "Handle to a `Product` in a project.");
define_handle!(ModuleId, "Handle to a `Module` owned by the project.");

/// A simple append-only arena with tombstone-based removal. `remove` leaves a
/// hole (`None`) rather than shifting indices, so previously issued handles
/// never dangle silently into an unrelated entry — they resolve to `None`
/// instead, which callers must treat as "no longer live".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> usize {
        self.slots.push(Some(value));
        self.len += 1;
        self.slots.len() - 1
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, idx: usize) -> Option<T> {
        let slot = self.slots.get_mut(idx)?;
        let taken = slot.take();
        if taken.is_some() {
            self.len -= 1;
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (i, v)))
    }
}
