//! # Instantiation
//!
//! Building detached subtrees from definitions, either with defaults
//! (`create_data`) or from markup (`load_data`).
//!
//! ## Design
//!
//! - Neither path touches the undo log; callers attach the result through a
//!   recorded edit. Events raised on the detached items are discarded.
//! - Loading is forgiving: unknown elements are skipped, values that fail to
//!   parse fall back to their default, numbers are clamped.
//! - Graph nodes built while loading are collected in [`LoadContext`] and
//!   registered by the caller once the whole document is in memory, so GUID
//!   markers that precede their node still resolve.

use crate::item::{DataItem, GraphLink, GraphNodeData, ItemId, ItemValue, LinkType};
use crate::tree::DataTree;
use std::rc::Rc;
use structdoc_markup::{Element, Node};
use structdoc_schema::{
    CollectionDefinition, DefId, Definition, DefinitionKind, Schema, StructDefinition,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Past this depth references are left empty and collections unfilled, so a
/// self-referencing schema still instantiates.
const MAX_CREATE_DEPTH: usize = 48;

pub const META_X: &str = "meta:X";
pub const META_Y: &str = "meta:Y";
pub const META_COMMENT: &str = "meta:Comment";
pub const META_COMMENT_DATA: &str = "meta:CommentData";
pub const META_LINK_TYPE: &str = "meta:LinkType";
pub const JSON_ARRAY: &str = "json:Array";
pub const REF_KEY: &str = "RefKey";
pub const GUID: &str = "GUID";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Plain collections were written without their wrapper element.
    pub array_mode: bool,
}

#[derive(Debug, Default)]
pub(crate) struct LoadContext {
    pub options: LoadOptions,
    /// Graph nodes built during the load, in document order.
    pub nodes: Vec<ItemId>,
}

impl LoadContext {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
        }
    }
}

pub(crate) fn new_guid() -> String {
    Uuid::new_v4().to_string()
}

/// Default value slot of a fresh item.
fn default_value(definition: &Definition) -> ItemValue {
    match &definition.kind {
        DefinitionKind::String(def) => ItemValue::String(def.default.clone()),
        DefinitionKind::Number(def) => ItemValue::Number(def.default),
        DefinitionKind::Boolean(def) => ItemValue::Boolean(def.default),
        DefinitionKind::Colour(def) => ItemValue::Colour(def.default),
        DefinitionKind::Enum(def) => ItemValue::Enum(def.default_value()),
        DefinitionKind::File(def) => ItemValue::File(def.default.clone()),
        DefinitionKind::Pair(def) => ItemValue::Pair {
            key: def.default_key.clone(),
            value: def.default_value.clone(),
        },
        DefinitionKind::Comment => ItemValue::Comment(String::new()),
        DefinitionKind::Struct(_) => ItemValue::Struct,
        DefinitionKind::Collection(_) => ItemValue::Collection,
        DefinitionKind::Tree(_) => ItemValue::Tree,
        DefinitionKind::CollectionChild(_) => ItemValue::CollectionChild,
        DefinitionKind::Reference(_) => ItemValue::Reference,
        DefinitionKind::GraphStruct(..) => ItemValue::GraphNode(GraphNodeData::new(new_guid())),
        DefinitionKind::GraphCollection(..) => {
            ItemValue::GraphCollection(GraphNodeData::new(new_guid()))
        }
        DefinitionKind::GraphReference(def) => ItemValue::GraphReference(GraphLink {
            link_type: LinkType::Duplicate,
            target: None,
            pending_guid: None,
            selected: def.definitions.first().map(|(_, id)| *id),
        }),
    }
}

/// Parse markup text into a primitive value. `None` when the text is not a
/// valid value for the definition.
pub(crate) fn parse_primitive(definition: &Definition, text: &str) -> Option<ItemValue> {
    match &definition.kind {
        DefinitionKind::String(def) => {
            let value = match def.max_length {
                Some(max) => text.chars().take(max).collect(),
                None => text.to_string(),
            };
            Some(ItemValue::String(value))
        }
        DefinitionKind::Number(def) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(|value| ItemValue::Number(def.clamp(value))),
        DefinitionKind::Boolean(_) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(ItemValue::Boolean(true)),
            "false" => Some(ItemValue::Boolean(false)),
            _ => None,
        },
        DefinitionKind::Colour(_) => text.trim().parse().ok().map(ItemValue::Colour),
        DefinitionKind::Enum(def) => {
            let text = text.trim();
            if !def.values.is_empty() && !def.values.iter().any(|v| v == text) {
                warn!(definition = %definition.name, value = %text, "value is not in the enum");
            }
            Some(ItemValue::Enum(text.to_string()))
        }
        DefinitionKind::File(_) => Some(ItemValue::File(text.trim().to_string())),
        DefinitionKind::Comment => Some(ItemValue::Comment(text.to_string())),
        _ => None,
    }
}

fn parse_float(element: &Element, name: &str) -> f64 {
    element
        .attribute(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0.0)
}

impl DataTree {
    /// Build a detached, default-valued subtree for `definition`.
    pub(crate) fn create_data(&mut self, definition: DefId) -> ItemId {
        let schema = self.schema_rc();
        self.create_item(&schema, definition, 0)
    }

    fn create_item(&mut self, schema: &Rc<Schema>, def_id: DefId, depth: usize) -> ItemId {
        let definition = schema.definition(def_id);
        let id = self.alloc(DataItem::new(
            def_id,
            definition.name.clone(),
            default_value(definition),
        ));
        let too_deep = depth >= MAX_CREATE_DEPTH;
        if too_deep {
            warn!(definition = %definition.name, "schema recursion limit reached");
        }

        let mut children = Vec::new();
        let mut attributes = Vec::new();
        match &definition.kind {
            DefinitionKind::Struct(def) | DefinitionKind::GraphStruct(def, _) => {
                for child in &def.children {
                    children.push(self.create_item(schema, *child, depth + 1));
                }
            }
            DefinitionKind::Collection(def) | DefinitionKind::GraphCollection(def, _) => {
                if let [only] = def.child_definitions.as_slice() {
                    if !too_deep {
                        for _ in 0..def.min_count {
                            children.push(self.create_item(schema, *only, depth + 1));
                        }
                    }
                }
            }
            DefinitionKind::CollectionChild(def) => {
                children.push(self.create_item(schema, def.wrapped, depth + 1));
            }
            DefinitionKind::Reference(def) => {
                if let Some(only) = def.auto_create().filter(|_| !too_deep) {
                    children.push(self.create_item(schema, only, depth + 1));
                }
            }
            _ => {}
        }
        for attribute in definition.attributes() {
            attributes.push(self.create_item(schema, *attribute, depth + 1));
        }
        self.adopt(id, children, attributes);
        id
    }

    /// Build a detached subtree for `definition` from `element`.
    pub(crate) fn load_data(
        &mut self,
        def_id: DefId,
        element: &Element,
        ctx: &mut LoadContext,
    ) -> ItemId {
        let schema = self.schema_rc();
        let definition = schema.definition(def_id);

        match &definition.kind {
            DefinitionKind::Struct(def) | DefinitionKind::GraphStruct(def, _) => {
                let id = self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    self.load_node_value(definition, element),
                ));
                let children = self.load_struct_children(&schema, def, element, ctx);
                let attributes = self.load_attributes(&schema, definition, element);
                self.adopt(id, children, attributes);
                if definition.is_graph_node() {
                    ctx.nodes.push(id);
                }
                id
            }
            DefinitionKind::Collection(def) | DefinitionKind::GraphCollection(def, _) => {
                let id = self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    self.load_node_value(definition, element),
                ));
                let children =
                    self.load_collection_entries(&schema, def, element.children.iter(), ctx);
                let attributes = self.load_attributes(&schema, definition, element);
                self.adopt(id, children, attributes);
                if definition.is_graph_node() {
                    ctx.nodes.push(id);
                }
                id
            }
            DefinitionKind::CollectionChild(def) => {
                let id = self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    ItemValue::CollectionChild,
                ));
                let payload = self.load_data(def.wrapped, element, ctx);
                self.adopt(id, vec![payload], Vec::new());
                id
            }
            DefinitionKind::Tree(def) => {
                let id =
                    self.alloc(DataItem::new(def_id, definition.name.clone(), ItemValue::Tree));
                let mut children = Vec::new();
                for child in element.elements() {
                    match def
                        .node_definitions
                        .iter()
                        .copied()
                        .find(|node| schema.definition(*node).name == child.name)
                    {
                        Some(node) => children.push(self.load_data(node, child, ctx)),
                        None => debug!(
                            element = %child.name,
                            tree = %definition.name,
                            "skipping unknown tree node"
                        ),
                    }
                }
                self.adopt(id, children, Vec::new());
                id
            }
            DefinitionKind::Reference(def) => {
                let id = self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    ItemValue::Reference,
                ));
                let chosen = match element.attribute(REF_KEY) {
                    Some(key) => {
                        let found = def.find(key);
                        if found.is_none() {
                            warn!(reference = %definition.name, key = %key, "unknown RefKey");
                        }
                        found
                    }
                    None if element.has_elements() || !element.attributes.is_empty() => {
                        def.definitions.first().map(|(_, id)| *id)
                    }
                    None => def.auto_create(),
                };
                let children = chosen
                    .map(|chosen| vec![self.load_data(chosen, element, ctx)])
                    .unwrap_or_default();
                self.adopt(id, children, Vec::new());
                id
            }
            DefinitionKind::GraphReference(def) => {
                let mut link = GraphLink {
                    link_type: LinkType::Duplicate,
                    target: None,
                    pending_guid: None,
                    selected: def.definitions.first().map(|(_, id)| *id),
                };
                let text = element.text().trim().to_string();
                let inline = if element.has_attribute(META_X) {
                    let key = element.attribute(REF_KEY).unwrap_or(element.name.as_str());
                    let found = def.find(key).or(link.selected);
                    if found.is_none() {
                        warn!(
                            reference = %definition.name,
                            key = %key,
                            "inline graph node of unknown kind"
                        );
                    }
                    found
                } else {
                    None
                };
                match inline {
                    Some(node_def) => link.selected = Some(node_def),
                    None if element.attribute(META_LINK_TYPE) == Some("Reference") => {
                        link.link_type = LinkType::Reference;
                    }
                    None => {}
                }

                let id = self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    ItemValue::GraphReference(link),
                ));
                if let Some(node_def) = inline {
                    let node = self.load_data(node_def, element, ctx);
                    self.set_link(id, Some(node), None);
                } else if !text.is_empty() {
                    self.set_link(id, None, Some(text));
                }
                id
            }
            DefinitionKind::Pair(def) => {
                let key = element
                    .attribute("Key")
                    .map(str::to_string)
                    .unwrap_or_else(|| def.default_key.clone());
                let value = if element.children.is_empty() {
                    def.default_value.clone()
                } else {
                    element.text()
                };
                self.alloc(DataItem::new(
                    def_id,
                    definition.name.clone(),
                    ItemValue::Pair { key, value },
                ))
            }
            _ => {
                let value = parse_primitive(definition, &element.text()).unwrap_or_else(|| {
                    debug!(
                        definition = %definition.name,
                        text = %element.text(),
                        "falling back to default"
                    );
                    default_value(definition)
                });
                self.alloc(DataItem::new(def_id, definition.name.clone(), value))
            }
        }
    }

    /// Graph node identity from `GUID` and `meta:` attributes; plain value
    /// slot for non-node kinds.
    fn load_node_value(&self, definition: &Definition, element: &Element) -> ItemValue {
        let data = GraphNodeData {
            guid: element
                .attribute(GUID)
                .map(str::to_string)
                .unwrap_or_else(new_guid),
            x: parse_float(element, META_X),
            y: parse_float(element, META_Y),
            comment: element.attribute(META_COMMENT).map(str::to_string),
            comment_data: element.attribute(META_COMMENT_DATA).map(str::to_string),
        };
        match &definition.kind {
            DefinitionKind::GraphStruct(..) => ItemValue::GraphNode(data),
            DefinitionKind::GraphCollection(..) => ItemValue::GraphCollection(data),
            DefinitionKind::Collection(_) => ItemValue::Collection,
            _ => ItemValue::Struct,
        }
    }

    fn load_struct_children(
        &mut self,
        schema: &Rc<Schema>,
        def: &StructDefinition,
        element: &Element,
        ctx: &mut LoadContext,
    ) -> Vec<ItemId> {
        let mut children = Vec::new();
        for child_id in &def.children {
            let child_def = schema.definition(*child_id);
            let inline_collection = match &child_def.kind {
                DefinitionKind::Collection(collection)
                    if ctx.options.array_mode && collection.attributes.is_empty() =>
                {
                    Some(collection)
                }
                _ => None,
            };

            if let Some(collection) = inline_collection {
                let entries: Vec<&Element> = element.elements_named(&child_def.name).collect();
                let id = self.alloc(DataItem::new(
                    *child_id,
                    child_def.name.clone(),
                    ItemValue::Collection,
                ));
                let items = self.load_array_entries(schema, collection, &entries, ctx);
                self.adopt(id, items, Vec::new());
                children.push(id);
                continue;
            }

            match element.element(&child_def.name) {
                Some(child) => children.push(self.load_data(*child_id, child, ctx)),
                None => children.push(self.create_data(*child_id)),
            }
        }
        for child in element.elements() {
            let known = def
                .children
                .iter()
                .any(|id| schema.definition(*id).name == child.name);
            if !known {
                debug!(element = %child.name, "skipping unknown element");
            }
        }
        children
    }

    fn load_collection_entries<'a>(
        &mut self,
        schema: &Rc<Schema>,
        def: &CollectionDefinition,
        nodes: impl Iterator<Item = &'a Node>,
        ctx: &mut LoadContext,
    ) -> Vec<ItemId> {
        let mut children = Vec::new();
        let mut entries = 0usize;
        for node in nodes {
            match node {
                Node::Comment(text) => {
                    let comment = schema.comment_definition();
                    children.push(self.alloc(DataItem::new(
                        comment,
                        "Comment",
                        ItemValue::Comment(text.clone()),
                    )));
                }
                Node::Element(child) => {
                    if entries >= def.max_count {
                        warn!(
                            element = %child.name,
                            max = def.max_count,
                            "collection is full, dropping entry"
                        );
                        continue;
                    }
                    match find_entry_definition(schema, def, &child.name) {
                        Some(wrapper) => {
                            children.push(self.load_data(wrapper, child, ctx));
                            entries += 1;
                        }
                        None => debug!(element = %child.name, "skipping unknown collection entry"),
                    }
                }
                Node::Text(_) => {}
            }
        }
        children
    }

    fn load_array_entries(
        &mut self,
        schema: &Rc<Schema>,
        def: &CollectionDefinition,
        entries: &[&Element],
        ctx: &mut LoadContext,
    ) -> Vec<ItemId> {
        let mut children = Vec::new();
        for entry in entries.iter().take(def.max_count) {
            let wrapper = match entry.attribute(REF_KEY) {
                Some(key) => find_entry_definition(schema, def, key),
                None => def.child_definitions.first().copied(),
            };
            match wrapper {
                Some(wrapper) => children.push(self.load_data(wrapper, entry, ctx)),
                None => debug!(element = %entry.name, "skipping unknown array entry"),
            }
        }
        children
    }

    fn load_attributes(
        &mut self,
        schema: &Rc<Schema>,
        definition: &Definition,
        element: &Element,
    ) -> Vec<ItemId> {
        let mut attributes = Vec::new();
        for attribute_id in definition.attributes() {
            let attribute = schema.definition(*attribute_id);
            let id = match element.attribute(&attribute.name) {
                Some(text) => {
                    let value = parse_primitive(attribute, text)
                        .unwrap_or_else(|| default_value(attribute));
                    self.alloc(DataItem::new(*attribute_id, attribute.name.clone(), value))
                }
                None => self.create_data(*attribute_id),
            };
            attributes.push(id);
        }
        attributes
    }
}

/// The `CollectionChild` wrapper whose payload is named `name`.
pub(crate) fn find_entry_definition(
    schema: &Schema,
    def: &CollectionDefinition,
    name: &str,
) -> Option<DefId> {
    def.child_definitions
        .iter()
        .copied()
        .find(|wrapper| schema.definition(*wrapper).name == name)
        .or_else(|| {
            def.child_definitions
                .iter()
                .copied()
                .find(|wrapper| schema.definition(*wrapper).name.eq_ignore_ascii_case(name))
        })
}
