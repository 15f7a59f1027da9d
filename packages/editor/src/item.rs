//! Data items: the live instances of definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use structdoc_schema::{Colour, DefId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub(crate) usize);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a graph reference holds its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkType {
    /// The reference exclusively owns the node; saved inline.
    #[default]
    Duplicate,
    /// The node is shared through the registry; saved as a GUID marker.
    Reference,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Duplicate => f.write_str("Duplicate"),
            LinkType::Reference => f.write_str("Reference"),
        }
    }
}

/// Identity and canvas placement of a graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNodeData {
    pub guid: String,
    pub x: f64,
    pub y: f64,
    pub comment: Option<String>,
    pub comment_data: Option<String>,
}

impl GraphNodeData {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            x: 0.0,
            y: 0.0,
            comment: None,
            comment_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphLink {
    pub link_type: LinkType,
    pub target: Option<ItemId>,
    /// GUID read from markup that has not met its node yet.
    pub pending_guid: Option<String>,
    /// Node kind offered by `create_graph_node` when none is given.
    pub selected: Option<DefId>,
}

/// Variant-specific value slot of a [`DataItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Enum(String),
    Colour(Colour),
    File(String),
    Pair { key: String, value: String },
    Comment(String),
    Struct,
    Collection,
    Tree,
    /// Collection entry; its payload is the single child.
    CollectionChild,
    /// Chosen-kind slot; its payload, if any, is the single child.
    Reference,
    GraphNode(GraphNodeData),
    GraphCollection(GraphNodeData),
    GraphReference(GraphLink),
}

impl ItemValue {
    /// Markup text of primitive values; `None` for composites.
    pub fn primitive_text(&self, format_number: impl Fn(f64) -> String) -> Option<String> {
        match self {
            ItemValue::String(value) | ItemValue::Enum(value) | ItemValue::File(value) => {
                Some(value.clone())
            }
            ItemValue::Number(value) => Some(format_number(*value)),
            ItemValue::Boolean(value) => Some(value.to_string()),
            ItemValue::Colour(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ItemValue::String(_)
                | ItemValue::Number(_)
                | ItemValue::Boolean(_)
                | ItemValue::Enum(_)
                | ItemValue::Colour(_)
                | ItemValue::File(_)
        )
    }

    pub fn graph_node(&self) -> Option<&GraphNodeData> {
        match self {
            ItemValue::GraphNode(data) | ItemValue::GraphCollection(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn graph_node_mut(&mut self) -> Option<&mut GraphNodeData> {
        match self {
            ItemValue::GraphNode(data) | ItemValue::GraphCollection(data) => Some(data),
            _ => None,
        }
    }

    pub fn graph_link(&self) -> Option<&GraphLink> {
        match self {
            ItemValue::GraphReference(link) => Some(link),
            _ => None,
        }
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(self, ItemValue::CollectionChild | ItemValue::Reference)
    }
}

/// Value accepted by `Document::set_value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Boolean(bool),
    Colour(Colour),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Colour> for Value {
    fn from(value: Colour) -> Self {
        Value::Colour(value)
    }
}

/// One node of the document tree.
#[derive(Debug, Clone)]
pub struct DataItem {
    pub(crate) definition: DefId,
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) attributes: Vec<ItemId>,
    pub(crate) value: ItemValue,
    pub(crate) is_expanded: bool,
    pub(crate) is_search_filtered: bool,
}

impl DataItem {
    pub(crate) fn new(definition: DefId, name: impl Into<String>, value: ItemValue) -> Self {
        Self {
            definition,
            name: name.into(),
            index: 0,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            value,
            is_expanded: false,
            is_search_filtered: false,
        }
    }

    pub fn definition(&self) -> DefId {
        self.definition
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the owner's children (or attributes).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    pub fn attributes(&self) -> &[ItemId] {
        &self.attributes
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    pub fn is_search_filtered(&self) -> bool {
        self.is_search_filtered
    }

    pub fn has_content(&self) -> bool {
        !self.children.is_empty() || !self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_text() {
        let format = |v: f64| format!("{}", v);
        assert_eq!(
            ItemValue::Number(2.5).primitive_text(format).as_deref(),
            Some("2.5")
        );
        assert_eq!(
            ItemValue::Boolean(true).primitive_text(format).as_deref(),
            Some("true")
        );
        assert_eq!(
            ItemValue::Colour(Colour::rgba(1, 2, 3, 4))
                .primitive_text(format)
                .as_deref(),
            Some("1,2,3,4")
        );
        assert_eq!(ItemValue::Struct.primitive_text(format), None);
    }

    #[test]
    fn test_wrappers() {
        assert!(ItemValue::CollectionChild.is_wrapper());
        assert!(ItemValue::Reference.is_wrapper());
        assert!(!ItemValue::Struct.is_wrapper());
        assert!(!ItemValue::String(String::new()).is_wrapper());
    }

    #[test]
    fn test_link_type_default_is_duplicate() {
        assert_eq!(LinkType::default(), LinkType::Duplicate);
        assert_eq!(LinkType::Reference.to_string(), "Reference");
    }
}
