//! # Graph Reference Resolver
//!
//! Membership of graph nodes and the back-references held against them.
//!
//! ## Design
//!
//! - Every graph node reached through a link is registered, whether a
//!   duplicate link owns it or it is shared. Nodes owned by a collection or
//!   struct are written in place and never registered.
//! - `link_parents` records which references currently point at each node.
//!   Detached referrers stay listed so undo can restore them; callers that
//!   care filter with [`DataTree::live_referrers`].
//! - Cycle detection is a depth-first walk over link edges starting at the
//!   candidate target.

use crate::item::{ItemId, LinkType};
use crate::tree::DataTree;
use std::collections::{HashMap, HashSet};
use structdoc_schema::GraphNodeOptions;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Linking {reference} to {node} would create a cycle")]
    CircularLink { reference: ItemId, node: ItemId },

    #[error("Reference links are disabled for this document")]
    ReferenceLinksDisabled,

    #[error("{node} is not a registered graph node")]
    NotRegistered { node: ItemId },

    #[error("'{key}' is not a node kind accepted by {reference}")]
    UnknownNodeKind { reference: ItemId, key: String },
}

#[derive(Debug, Clone, Default)]
pub struct GraphRegistry {
    nodes: Vec<ItemId>,
    link_parents: HashMap<ItemId, Vec<ItemId>>,
    pending: Vec<ItemId>,
}

impl GraphRegistry {
    /// Registered nodes in registration order.
    pub fn nodes(&self) -> &[ItemId] {
        &self.nodes
    }

    pub fn contains(&self, node: ItemId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn link_parents(&self, node: ItemId) -> &[ItemId] {
        self.link_parents.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// References still waiting for a node with their GUID.
    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }

    pub(crate) fn insert(&mut self, node: ItemId) -> bool {
        if self.contains(node) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub(crate) fn remove(&mut self, node: ItemId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| *n != node);
        before != self.nodes.len()
    }

    pub(crate) fn add_link_parent(&mut self, node: ItemId, reference: ItemId) {
        let parents = self.link_parents.entry(node).or_default();
        if !parents.contains(&reference) {
            parents.push(reference);
        }
    }

    pub(crate) fn remove_link_parent(&mut self, node: ItemId, reference: ItemId) {
        if let Some(parents) = self.link_parents.get_mut(&node) {
            parents.retain(|r| *r != reference);
        }
    }

    pub(crate) fn add_pending(&mut self, reference: ItemId) {
        if !self.pending.contains(&reference) {
            self.pending.push(reference);
        }
    }

    pub(crate) fn remove_pending(&mut self, reference: ItemId) {
        self.pending.retain(|r| *r != reference);
    }

    /// Drop reclaimed items from the back-reference and pending lists.
    pub(crate) fn forget(&mut self, freed: &HashSet<ItemId>) {
        self.link_parents.retain(|node, _| !freed.contains(node));
        for parents in self.link_parents.values_mut() {
            parents.retain(|reference| !freed.contains(reference));
        }
        self.pending.retain(|reference| !freed.contains(reference));
    }
}

impl DataTree {
    /// Graph policy of the document, taken from the root definition.
    pub fn graph_options(&self) -> GraphNodeOptions {
        self.definition(self.root())
            .graph_options()
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_node_by_guid(&self, guid: &str) -> Option<ItemId> {
        self.graph.nodes().iter().copied().find(|node| {
            self.item(*node)
                .value()
                .graph_node()
                .is_some_and(|data| data.guid == guid)
        })
    }

    /// References to `node` that are themselves part of the document.
    pub fn live_referrers(&self, node: ItemId) -> Vec<ItemId> {
        self.graph
            .link_parents(node)
            .iter()
            .copied()
            .filter(|reference| self.is_attached(*reference))
            .collect()
    }

    /// Would pointing `reference` at `node` with `link_type` be allowed?
    pub fn check_link(
        &self,
        reference: ItemId,
        node: ItemId,
        link_type: LinkType,
    ) -> Result<(), GraphError> {
        let options = self.graph_options();
        if link_type == LinkType::Reference && !options.allow_reference_links {
            return Err(GraphError::ReferenceLinksDisabled);
        }
        let circular_allowed = link_type == LinkType::Reference && options.allow_circular_links;
        if !circular_allowed && self.would_cycle(reference, node) {
            return Err(GraphError::CircularLink { reference, node });
        }
        Ok(())
    }

    fn would_cycle(&self, reference: ItemId, node: ItemId) -> bool {
        match self.enclosing_graph_node(reference) {
            Some(owner) => owner == node || self.reaches(node, owner),
            None => false,
        }
    }

    /// Is `goal` reachable from `from` through owned items and link edges?
    pub fn reaches(&self, from: ItemId, goal: ItemId) -> bool {
        let mut visited = HashSet::from([from]);
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            for item in self.subtree(current) {
                if let Some(target) = self.link_target(item) {
                    if target == goal {
                        return true;
                    }
                    if visited.insert(target) {
                        stack.push(target);
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_parents_are_deduplicated() {
        let mut registry = GraphRegistry::default();
        registry.add_link_parent(ItemId(1), ItemId(2));
        registry.add_link_parent(ItemId(1), ItemId(2));
        registry.add_link_parent(ItemId(1), ItemId(3));
        assert_eq!(registry.link_parents(ItemId(1)), &[ItemId(2), ItemId(3)]);

        registry.remove_link_parent(ItemId(1), ItemId(2));
        assert_eq!(registry.link_parents(ItemId(1)), &[ItemId(3)]);
        assert!(registry.link_parents(ItemId(9)).is_empty());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = GraphRegistry::default();
        assert!(registry.insert(ItemId(4)));
        assert!(!registry.insert(ItemId(4)));
        assert!(registry.contains(ItemId(4)));
        assert!(registry.remove(ItemId(4)));
        assert!(!registry.remove(ItemId(4)));
    }
}
