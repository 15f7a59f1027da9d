//! # Structdoc Editor
//!
//! Schema-driven editing engine for structured XML documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ schema: definitions → resolved registry     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document lifecycle + edits          │
//! │  - Create/load/save item trees              │
//! │  - Recorded, grouped undo/redo              │
//! │  - VisibleIf re-evaluation on change        │
//! │  - Graph nodes linked by GUID               │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ host: drains notifications, renders rows    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Definitions are shared**: items point at a definition, never own one
//! 2. **Edits are data**: every change is a self-inverting [`TreeEdit`]
//! 3. **Derived state is recomputed**: descriptions and visibility follow
//!    change events, they are never stored by hand
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use structdoc_editor::Document;
//! use structdoc_schema::Schema;
//!
//! let schema = Rc::new(Schema::parse(&schema_text)?);
//! let mut doc = Document::load(schema, &xml)?;
//!
//! let level = doc.find("Stats/Level").unwrap();
//! doc.set_value(level, 12.0)?;
//! for notification in doc.drain_notifications() {
//!     // refresh rows
//! }
//! doc.undo()?;
//!
//! let text = doc.save()?;
//! ```

mod clipboard;
mod description;
mod document;
mod errors;
mod filter;
mod graph;
mod instantiate;
mod item;
mod mutations;
mod post_effects;
mod serializer;
mod tree;
mod undo_stack;
mod visibility;

pub use clipboard::Clipboard;
pub use document::Document;
pub use errors::{EditorError, EditorResult, VisibilityError};
pub use filter::FilterQuery;
pub use graph::{GraphError, GraphRegistry};
pub use instantiate::LoadOptions;
pub use item::{DataItem, GraphLink, GraphNodeData, ItemId, ItemValue, LinkType, Value};
pub use mutations::{LinkState, TreeEdit};
pub use post_effects::{Notification, PostEffect, PostEffectEngine};
pub use serializer::{SaveOptions, JSON_NAMESPACE, META_NAMESPACE};
pub use tree::{ChangeEvent, DataTree};
pub use undo_stack::{
    Clock, DisableUndoScope, HistoryEntry, HistoryKind, ManualClock, SystemClock, UndoError,
    UndoRedoLog, DEFAULT_GROUPING,
};
pub use visibility::VisibilityEngine;

// Re-export schema types hosts need alongside the editor
pub use structdoc_schema::{Colour, DefId, Definition, DefinitionKind, Schema};
