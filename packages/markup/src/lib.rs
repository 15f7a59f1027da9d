//! # Structdoc Markup
//!
//! Owned XML element tree used by the schema loader and the document
//! serializer. Parsing goes through quick-xml's pull reader; writing is an
//! indenting string serializer.

pub mod ast;
pub mod error;
pub mod parser;
pub mod serializer;

pub use ast::{Attribute, Element, Node};
pub use error::{MarkupError, MarkupResult};
pub use parser::parse;
pub use serializer::{serialize, serialize_document, Serializer};
