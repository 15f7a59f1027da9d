//! # Structdoc Schema
//!
//! The definition registry: compiles schema markup into an immutable arena
//! of [`Definition`]s that documents are instantiated from.
//!
//! ## Loading
//!
//! ```text
//! schema sources ──parse──▶ definitions + local/global dictionaries
//!                 ──resolve─▶ Enum keys, Reference keys wired to DefIds
//! ```
//!
//! Definitions are never mutated after [`SchemaLoader::finish`]. Recursive
//! schemas are expressed through `DefId`s, so no definition owns another
//! that it merely references.

pub mod colour;
pub mod definition;
pub mod error;
pub mod expression;
pub mod loader;
pub mod schema;

pub use colour::Colour;
pub use definition::{
    BooleanDefinition, CollectionChildDefinition, CollectionDefinition, ColourDefinition, DefId,
    Definition, DefinitionKind, EnumDefinition, FileDefinition, GraphNodeOptions,
    GraphReferenceDefinition, NumberDefinition, PairDefinition, ReferenceDefinition,
    StringDefinition, StructDefinition, TreeDefinition,
};
pub use error::{SchemaError, SchemaResult, SchemaWarning};
pub use expression::{CompareOp, Expression, ExpressionError, PathSegment, Statement};
pub use loader::SchemaLoader;
pub use schema::Schema;
