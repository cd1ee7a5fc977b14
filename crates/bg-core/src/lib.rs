//! Shared entities, handles and error types for the build-graph core.
//!
//! This crate has no knowledge of graph structure, persistence, scanning,
//! rule evaluation or scheduling — it only defines the data model of
//! `spec.md` §3 so every other crate in the workspace shares one vocabulary.

pub mod artifact;
pub mod command;
pub mod error;
pub mod file_tag;
pub mod handle;
pub mod product;
pub mod property;
pub mod rule;

pub use artifact::{Artifact, ArtifactKind, BuildState, PathSplit, Timestamp};
pub use command::{
    same_command_signature, Command, ProcessCommand, ScriptCommand, SourceLocation,
};
pub use error::{CoreError, Result};
pub use file_tag::{FileTag, FileTagSet};
pub use handle::{Arena, ArtifactId, ModuleId, ProductId, RuleId, TransformerId};
pub use product::{ManualTransformer, ManualTransformerOutput, Module, Product, SourceGroup};
pub use property::{
    ConfigValue, PropertyMap, PropertyRead, PropertyReadKind, PropertyReadRecorder,
};
pub use rule::{FileTagger, PropertyBinding, Rule, RuleArtifact, ScriptExpr};
pub use transformer::Transformer;

pub mod transformer;
