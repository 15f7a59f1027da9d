//! Error types for the editor

use crate::item::ItemId;
use structdoc_markup::MarkupError;
use structdoc_schema::SchemaError;
use thiserror::Error;

pub use crate::graph::GraphError;
pub use crate::undo_stack::UndoError;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Visibility error: {0}")]
    Visibility(#[from] VisibilityError),

    #[error("Undo error: {0}")]
    Undo(#[from] UndoError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Two graph nodes share GUID '{guid}'")]
    SaveGuidCollision { guid: String },

    #[error("{item} is a {actual}, expected {expected}")]
    WrongKind {
        item: ItemId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid value '{value}' for {item}")]
    InvalidValue { item: ItemId, value: String },

    #[error("Collection {item} already holds its maximum of {max} entries")]
    CollectionFull { item: ItemId, max: usize },

    #[error("Collection {item} already holds its minimum of {min} entries")]
    CollectionAtMinimum { item: ItemId, min: usize },

    #[error("Collection {item} already contains a '{name}'")]
    DuplicateChild { item: ItemId, name: String },

    #[error("'{key}' is not a permitted kind for {item}")]
    UnknownKey { item: ItemId, key: String },

    #[error("Operation not supported on {item}: {reason}")]
    NotSupported { item: ItemId, reason: &'static str },
}

/// Fatal problems binding a `VisibleIf` statement to its target.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisibilityError {
    #[error("Operator '{op}' cannot be applied to {kind} '{target}'")]
    OperatorTypeMismatch {
        op: String,
        target: String,
        kind: &'static str,
    },

    #[error("Literal '{literal}' is not a valid value for '{target}'")]
    InvalidLiteral { literal: String, target: String },
}

pub type EditorResult<T> = Result<T, EditorError>;
