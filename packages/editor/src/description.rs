//! Derived one-line summaries of items.

use crate::item::{ItemId, ItemValue};
use crate::tree::DataTree;
use crate::visibility::VisibilityEngine;
use std::collections::HashSet;
use structdoc_schema::{Definition, DefinitionKind};

/// Children descriptions are cut once the summary passes this length.
const MAX_DESCRIPTION: usize = 500;
const FOCUS_LIMIT: usize = 13;
const FOCUS_KEEP: usize = 10;

/// Markup text of a primitive item, formatted the way it is saved.
pub fn value_text(tree: &DataTree, id: ItemId) -> Option<String> {
    let definition = tree.definition(id);
    tree.item(id).value().primitive_text(|value| format_number(definition, value))
}

fn format_number(definition: &Definition, value: f64) -> String {
    match &definition.kind {
        DefinitionKind::Number(def) => def.format(value),
        _ => format!("{}", value),
    }
}

/// Is the attribute written on save (and listed in its owner's summary)?
pub fn attribute_is_significant(tree: &DataTree, id: ItemId) -> bool {
    let definition = tree.definition(id);
    definition.name == "Name"
        || !definition.skip_if_default
        || value_text(tree, id) != definition.default_text()
}

pub fn describe(tree: &DataTree, visibility: &VisibilityEngine, id: ItemId) -> String {
    Describer {
        tree,
        visibility,
        visiting: HashSet::new(),
    }
    .describe(id)
}

struct Describer<'a> {
    tree: &'a DataTree,
    visibility: &'a VisibilityEngine,
    /// Nodes on the current path; reference cycles describe by name.
    visiting: HashSet<ItemId>,
}

impl Describer<'_> {
    fn describe(&mut self, id: ItemId) -> String {
        let item = self.tree.item(id);
        match item.value() {
            ItemValue::Pair { key, value } => format!("{}: {}", key, value),
            ItemValue::Comment(text) => text.clone(),
            ItemValue::CollectionChild | ItemValue::Reference => match self.tree.wrapped(id) {
                Some(payload) => self.describe(payload),
                None => String::new(),
            },
            ItemValue::GraphReference(link) => match link.target {
                Some(target) => self.describe(target),
                None => "Unset".to_string(),
            },
            value if value.is_primitive() => value_text(self.tree, id).unwrap_or_default(),
            _ => {
                if !self.visiting.insert(id) {
                    return item.name().to_string();
                }
                let description = self.describe_complex(id);
                self.visiting.remove(&id);
                description
            }
        }
    }

    fn describe_complex(&mut self, id: ItemId) -> String {
        let item = self.tree.item(id);
        if !item.has_content() {
            return String::new();
        }

        let definition = self.tree.definition(id);
        if let Some(child_name) = definition
            .as_struct()
            .and_then(|def| def.description_child.as_deref())
        {
            return match self.tree.find_child(id, child_name) {
                Some(child) => self.describe(child),
                None => "null".to_string(),
            };
        }

        if !item.attributes().is_empty() {
            return item
                .attributes()
                .iter()
                .copied()
                .filter(|attribute| attribute_is_significant(self.tree, *attribute))
                .map(|attribute| {
                    format!("{}={}", self.tree.item(attribute).name(), self.describe(attribute))
                })
                .collect::<Vec<_>>()
                .join(", ");
        }

        let mut builder = String::new();
        for child in item.children().iter().copied() {
            if !self.visibility.is_visible(child) {
                continue;
            }
            if !builder.is_empty() {
                builder.push_str(", ");
            }
            builder.push_str(&self.describe(child));
            if builder.len() > MAX_DESCRIPTION {
                if !builder.ends_with("...") {
                    builder.push_str("...");
                }
                break;
            }
        }
        builder
    }
}

/// `Name`, or `Name:description` with long descriptions shortened.
pub fn focus_name(tree: &DataTree, visibility: &VisibilityEngine, id: ItemId) -> String {
    let name = tree.item(id).name();
    let description = describe(tree, visibility, id);
    if description.is_empty() {
        return name.to_string();
    }
    if description.chars().count() > FOCUS_LIMIT {
        let short: String = description.chars().take(FOCUS_KEEP).collect();
        format!("{}:{}...", name, short)
    } else {
        format!("{}:{}", name, description)
    }
}

/// Row label: collection entries are prefixed with their position.
pub fn display_name(tree: &DataTree, id: ItemId) -> String {
    let item = tree.item(id);
    match item.value() {
        ItemValue::CollectionChild => format!("[{}] {}", item.index(), item.name()),
        _ => item.name().to_string(),
    }
}
