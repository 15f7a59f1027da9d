//! Search filtering over the item tree.

use crate::description::value_text;
use crate::item::{ItemId, ItemValue};
use crate::tree::DataTree;
use crate::visibility::VisibilityEngine;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// A text (or regex) search over item names and primitive values.
#[derive(Debug, Clone)]
pub struct FilterQuery {
    pub text: String,
    pub regex: Option<Regex>,
    pub case_sensitive: bool,
    /// When false, a match inside a collection entry's struct reveals the
    /// whole struct.
    pub matches_only: bool,
}

impl FilterQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            regex: None,
            case_sensitive: false,
            matches_only: false,
        }
    }

    /// Treat `pattern` as a regular expression.
    pub fn regex(pattern: &str, case_sensitive: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self {
            text: pattern.to_string(),
            regex: Some(regex),
            case_sensitive,
            matches_only: false,
        })
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn matches_only(mut self, matches_only: bool) -> Self {
        self.matches_only = matches_only;
        self
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None if self.case_sensitive => candidate.contains(&self.text),
            None => candidate
                .to_lowercase()
                .contains(&self.text.to_lowercase()),
        }
    }
}

/// Depth-first filter from `id`. Returns whether anything in the subtree
/// matched. `None` clears every filter flag.
pub(crate) fn filter(
    tree: &mut DataTree,
    visibility: &VisibilityEngine,
    id: ItemId,
    query: Option<&FilterQuery>,
) -> bool {
    filter_item(tree, visibility, id, query, &mut HashSet::new())
}

/// `path` holds the items being filtered above `id`; a link back into it is
/// not followed again.
fn filter_item(
    tree: &mut DataTree,
    visibility: &VisibilityEngine,
    id: ItemId,
    query: Option<&FilterQuery>,
    path: &mut HashSet<ItemId>,
) -> bool {
    if !path.insert(id) {
        return false;
    }
    let children = tree.logical_children(id);
    let mut match_found = false;
    for child in &children {
        if filter_item(tree, visibility, *child, query, path) {
            match_found = true;
        }
    }
    path.remove(&id);

    if let Some(query) = query {
        if match_found && !query.matches_only && reveals_whole_struct(tree, id) {
            for descendant in logical_descendants(tree, id) {
                tree.set_search_filtered(descendant, false);
            }
        }
    }

    match query {
        None => tree.set_search_filtered(id, false),
        Some(query) if !match_found => {
            if visibility.is_visible(id) {
                let item = tree.item(id);
                let mut candidates = vec![item.name().to_string()];
                if item.value().is_primitive() {
                    candidates.extend(value_text(tree, id));
                }
                match_found = candidates.iter().any(|candidate| query.is_match(candidate));
            }
            tree.set_search_filtered(id, !match_found);
        }
        Some(_) => {
            tree.set_expanded(id, true);
            tree.set_search_filtered(id, false);
        }
    }
    match_found
}

/// A struct inside a collection entry, or an entry wrapping a struct.
fn reveals_whole_struct(tree: &DataTree, id: ItemId) -> bool {
    let item = tree.item(id);
    match item.value() {
        ItemValue::Struct | ItemValue::GraphNode(_) => item
            .parent()
            .is_some_and(|parent| matches!(tree.item(parent).value(), ItemValue::CollectionChild)),
        ItemValue::CollectionChild => tree.wrapped(id).is_some_and(|payload| {
            matches!(
                tree.item(payload).value(),
                ItemValue::Struct | ItemValue::GraphNode(_)
            )
        }),
        _ => false,
    }
}

fn logical_descendants(tree: &DataTree, id: ItemId) -> Vec<ItemId> {
    let mut visited = HashSet::from([id]);
    let mut result = Vec::new();
    let mut stack = tree.logical_children(id);
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        result.push(current);
        stack.extend(tree.logical_children(current));
    }
    result
}
