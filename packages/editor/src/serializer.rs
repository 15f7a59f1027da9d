//! # Document Serializer
//!
//! Converts a [`DataTree`] back into a markup element tree.
//!
//! ## Design
//!
//! - A first pass decides which graph nodes are *shared*: more than one live
//!   referrer, any `Reference` referrer, no referrer at all, or a
//!   `FlattenData` document. Shared nodes are written once, with their GUID,
//!   in the node store; everything that points at them writes a GUID marker.
//! - Every other node is written inline at its only referrer.
//! - Items hidden by `VisibleIf` are left out.

use crate::description::{attribute_is_significant, value_text};
use crate::errors::{EditorError, EditorResult};
use crate::instantiate::{
    GUID, JSON_ARRAY, META_COMMENT, META_COMMENT_DATA, META_LINK_TYPE, META_X, META_Y, REF_KEY,
};
use crate::item::{ItemId, ItemValue, LinkType};
use crate::tree::DataTree;
use crate::visibility::VisibilityEngine;
use std::collections::{HashMap, HashSet};
use structdoc_markup::Element;
use structdoc_schema::DefinitionKind;
use tracing::debug;

pub const META_NAMESPACE: &str = "structdoc/meta";
pub const JSON_NAMESPACE: &str = "http://james.newtonking.com/projects/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write plain collections without their wrapper element.
    pub array_mode: bool,
    pub indent: String,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            array_mode: false,
            indent: "  ".to_string(),
        }
    }
}

pub(crate) struct Saver<'a> {
    tree: &'a DataTree,
    visibility: &'a VisibilityEngine,
    array_mode: bool,
    shared: Vec<ItemId>,
    shared_set: HashSet<ItemId>,
    uses_meta: bool,
    uses_json: bool,
}

impl<'a> Saver<'a> {
    pub fn new(tree: &'a DataTree, visibility: &'a VisibilityEngine, array_mode: bool) -> Self {
        let flatten = tree.graph_options().flatten_data;
        let shared: Vec<ItemId> = tree
            .graph()
            .nodes()
            .iter()
            .copied()
            .filter(|node| {
                let referrers = tree.live_referrers(*node);
                flatten
                    || referrers.len() != 1
                    || referrers
                        .iter()
                        .any(|r| tree.link_type(*r) == Some(LinkType::Reference))
            })
            .collect();
        let shared_set = shared.iter().copied().collect();
        Self {
            tree,
            visibility,
            array_mode,
            shared,
            shared_set,
            uses_meta: false,
            uses_json: false,
        }
    }

    pub fn is_shared(&self, node: ItemId) -> bool {
        self.shared_set.contains(&node)
    }

    /// The whole document: root element, node store, namespaces.
    pub fn save_document(mut self) -> EditorResult<Element> {
        let mut seen: HashMap<&str, ItemId> = HashMap::new();
        for node in &self.shared {
            if let Some(data) = self.tree.item(*node).value().graph_node() {
                if seen.insert(data.guid.as_str(), *node).is_some() {
                    return Err(EditorError::SaveGuidCollision {
                        guid: data.guid.clone(),
                    });
                }
            }
        }

        let root = self.tree.root();
        let mut element = self
            .build(root)
            .unwrap_or_else(|| Element::new(self.tree.item(root).name()));

        if !self.shared.is_empty() {
            let mut store = Element::new(self.tree.graph_options().node_store_name);
            for node in self.shared.clone() {
                store.push_element(self.build_node(node, true));
            }
            debug!(nodes = self.shared.len(), "wrote node store");
            element.push_element(store);
        }

        if self.uses_meta {
            element.set_attribute("xmlns:meta", META_NAMESPACE);
        }
        if self.uses_json {
            element.set_attribute("xmlns:json", JSON_NAMESPACE);
        }
        Ok(element)
    }

    /// A single item, for the clipboard. No node store is written.
    pub fn save_fragment(mut self, id: ItemId) -> Option<Element> {
        let mut element = self.build(id)?;
        if self.uses_meta {
            element.set_attribute("xmlns:meta", META_NAMESPACE);
        }
        if self.uses_json {
            element.set_attribute("xmlns:json", JSON_NAMESPACE);
        }
        Some(element)
    }

    /// Append whatever `id` writes to `out`.
    fn write(&mut self, id: ItemId, out: &mut Element) {
        if !self.visibility.is_visible(id) {
            return;
        }
        let item = self.tree.item(id);
        match item.value() {
            ItemValue::Comment(text) => out.push_comment(text.clone()),
            ItemValue::Collection if self.writes_inline_array(id) => {
                let multi_kind = self
                    .tree
                    .definition(id)
                    .as_collection()
                    .is_some_and(|def| def.child_definitions.len() > 1);
                let mut entries = Vec::new();
                for entry in item.children().to_vec() {
                    if !self.visibility.is_visible(entry) {
                        continue;
                    }
                    let payload = self.tree.unwrap_item(entry);
                    if let ItemValue::Comment(text) = self.tree.item(payload).value() {
                        out.push_comment(text.clone());
                        continue;
                    }
                    if let Some(mut element) = self.build(payload) {
                        if multi_kind {
                            element.attributes.insert(0, ref_key(self.tree.item(payload).name()));
                        }
                        element.name = item.name().to_string();
                        entries.push(element);
                    }
                }
                if let [single] = entries.as_mut_slice() {
                    single.set_attribute(JSON_ARRAY, "true");
                    self.uses_json = true;
                }
                for element in entries {
                    out.push_element(element);
                }
            }
            _ => {
                if let Some(element) = self.build(id) {
                    out.push_element(element);
                }
            }
        }
    }

    /// The element for one item, or `None` when it writes nothing.
    fn build(&mut self, id: ItemId) -> Option<Element> {
        let item = self.tree.item(id);
        let name = item.name().to_string();
        match item.value() {
            ItemValue::Pair { key, value } => {
                let mut element = Element::with_text(name, value.clone());
                element.set_attribute("Key", key.clone());
                Some(element)
            }
            ItemValue::Comment(_) => None,
            ItemValue::CollectionChild => {
                let payload = self.tree.wrapped(id)?;
                self.build(payload)
            }
            ItemValue::Reference => {
                let payload = self.tree.wrapped(id)?;
                let mut element = self.build(payload)?;
                element.name = name;
                element
                    .attributes
                    .insert(0, ref_key(self.tree.item(payload).name()));
                Some(element)
            }
            ItemValue::GraphReference(link) => {
                let link_type = link.link_type;
                let pending = link.pending_guid.clone();
                match link.target {
                    Some(node) if self.is_shared(node) => {
                        let guid = self.tree.item(node).value().graph_node()?.guid.clone();
                        Some(self.marker(name, guid, link_type))
                    }
                    Some(node) => {
                        let mut element = self.build_node(node, false);
                        element.name = name;
                        element
                            .attributes
                            .insert(0, ref_key(self.tree.item(node).name()));
                        Some(element)
                    }
                    None => pending.map(|guid| self.marker(name, guid, link_type)),
                }
            }
            ItemValue::GraphNode(_) | ItemValue::GraphCollection(_) => {
                Some(self.build_node(id, false))
            }
            value if value.is_primitive() => {
                Some(Element::with_text(name, value_text(self.tree, id).unwrap_or_default()))
            }
            _ => {
                let mut element = Element::new(name);
                self.write_attributes(id, &mut element);
                for child in item.children().to_vec() {
                    self.write(child, &mut element);
                }
                Some(element)
            }
        }
    }

    fn build_node(&mut self, node: ItemId, with_guid: bool) -> Element {
        let item = self.tree.item(node);
        let mut element = Element::new(item.name());
        if let Some(data) = item.value().graph_node() {
            element.set_attribute(META_X, format!("{}", data.x));
            element.set_attribute(META_Y, format!("{}", data.y));
            if with_guid {
                element.set_attribute(GUID, data.guid.clone());
            }
            if let Some(comment) = &data.comment {
                element.set_attribute(META_COMMENT, comment.clone());
            }
            if let Some(comment_data) = &data.comment_data {
                element.set_attribute(META_COMMENT_DATA, comment_data.clone());
            }
            self.uses_meta = true;
        }
        self.write_attributes(node, &mut element);
        for child in item.children().to_vec() {
            self.write(child, &mut element);
        }
        element
    }

    fn marker(&mut self, name: String, guid: String, link_type: LinkType) -> Element {
        let mut element = Element::with_text(name, guid);
        if link_type == LinkType::Reference {
            element.set_attribute(META_LINK_TYPE, "Reference");
            self.uses_meta = true;
        }
        element
    }

    fn write_attributes(&mut self, id: ItemId, element: &mut Element) {
        for attribute in self.tree.item(id).attributes() {
            if !self.visibility.is_visible(*attribute)
                || !attribute_is_significant(self.tree, *attribute)
            {
                continue;
            }
            let name = self.tree.item(*attribute).name().to_string();
            element.set_attribute(name, value_text(self.tree, *attribute).unwrap_or_default());
        }
    }

    /// Plain collection without attributes, directly inside a struct-like
    /// owner, while array mode is on.
    fn writes_inline_array(&self, id: ItemId) -> bool {
        if !self.array_mode {
            return false;
        }
        let plain = matches!(
            &self.tree.definition(id).kind,
            DefinitionKind::Collection(def) if def.attributes.is_empty()
        );
        let in_struct = self.tree.item(id).parent().is_some_and(|parent| {
            matches!(
                self.tree.item(parent).value(),
                ItemValue::Struct | ItemValue::GraphNode(_)
            )
        });
        plain && in_struct
    }
}

fn ref_key(name: &str) -> structdoc_markup::Attribute {
    structdoc_markup::Attribute {
        name: REF_KEY.to_string(),
        value: name.to_string(),
    }
}
