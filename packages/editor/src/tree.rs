//! # Data Item Tree
//!
//! Arena of [`DataItem`]s addressed by [`ItemId`].
//!
//! ## Design
//!
//! - A detached subtree stays addressable while the undo log can put it back.
//!   [`DataTree::collect`] frees items that neither the document nor the
//!   retained history reaches; their slots are reused by later allocations,
//!   so ids of freed items must not be kept.
//! - Collection entries and reference slots hold their payload as their single
//!   child, so every owned edge is a `children` or `attributes` edge.
//! - Graph links are not ownership edges; they live in the item value and the
//!   document's [`GraphRegistry`].
//! - Every structural mutator enqueues [`ChangeEvent`]s. `Document` drains
//!   them into the post-effect engine at the end of each operation.

use crate::graph::GraphRegistry;
use crate::item::{DataItem, ItemId, ItemValue, LinkType};
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use structdoc_schema::{Definition, DefinitionKind, Schema};
use tracing::debug;

/// Low-level change recorded by a tree mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A primitive, pair, comment or graph node value changed.
    Value(ItemId),
    /// The owner's children or attributes list changed.
    Children(ItemId),
    /// The item was attached to or detached from an owner.
    Parent(ItemId),
    /// A graph reference changed target or link type.
    Link(ItemId),
    /// A graph node entered or left the registry.
    Registry(ItemId),
}

#[derive(Debug)]
pub struct DataTree {
    schema: Rc<Schema>,
    items: Vec<DataItem>,
    free: BTreeSet<ItemId>,
    root: ItemId,
    pub(crate) graph: GraphRegistry,
    events: Vec<ChangeEvent>,
}

impl DataTree {
    /// An empty arena. The root is set once the document item exists.
    pub(crate) fn new(schema: Rc<Schema>) -> Self {
        Self {
            schema,
            items: Vec::new(),
            free: BTreeSet::new(),
            root: ItemId(0),
            graph: GraphRegistry::default(),
            events: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn schema_rc(&self) -> Rc<Schema> {
        Rc::clone(&self.schema)
    }

    pub fn root(&self) -> ItemId {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: ItemId) {
        self.root = root;
    }

    pub fn item(&self, id: ItemId) -> &DataItem {
        &self.items[id.0]
    }

    /// `None` for ids past the arena or freed by [`Self::collect`].
    pub fn get(&self, id: ItemId) -> Option<&DataItem> {
        if self.free.contains(&id) {
            return None;
        }
        self.items.get(id.0)
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> &mut DataItem {
        &mut self.items[id.0]
    }

    /// Items currently allocated, detached ones included.
    pub fn len(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn definition(&self, id: ItemId) -> &Definition {
        self.schema.definition(self.items[id.0].definition)
    }

    pub fn graph(&self) -> &GraphRegistry {
        &self.graph
    }

    pub(crate) fn alloc(&mut self, item: DataItem) -> ItemId {
        if let Some(id) = self.free.pop_first() {
            self.items[id.0] = item;
            return id;
        }
        let id = ItemId(self.items.len());
        self.items.push(item);
        id
    }

    /// Free every item not reachable from the root, a registered node or
    /// `retained`, following owned edges and graph links. Returns the ids
    /// freed by this pass.
    pub(crate) fn collect(
        &mut self,
        retained: impl IntoIterator<Item = ItemId>,
    ) -> HashSet<ItemId> {
        let mut marked = vec![false; self.items.len()];
        let mut stack = vec![self.root];
        stack.extend(self.graph.nodes().iter().copied());
        stack.extend(retained);
        while let Some(current) = stack.pop() {
            if std::mem::replace(&mut marked[current.0], true) {
                continue;
            }
            let item = &self.items[current.0];
            stack.extend(item.children.iter().chain(item.attributes.iter()).copied());
            stack.extend(self.link_target(current));
        }

        let freed: HashSet<ItemId> = (0..self.items.len())
            .map(ItemId)
            .filter(|id| !marked[id.0] && !self.free.contains(id))
            .collect();
        for item in &mut self.items {
            if item.parent.is_some_and(|parent| freed.contains(&parent)) {
                item.parent = None;
            }
        }
        for id in &freed {
            let item = &mut self.items[id.0];
            item.children.clear();
            item.attributes.clear();
        }
        self.free.extend(freed.iter().copied());
        self.graph.forget(&freed);
        if !freed.is_empty() {
            debug!(freed = freed.len(), live = self.len(), "reclaimed items");
        }
        freed
    }

    /// Set the initial owned lists of a freshly built item. No events.
    pub(crate) fn adopt(&mut self, owner: ItemId, children: Vec<ItemId>, attributes: Vec<ItemId>) {
        for list in [&children, &attributes] {
            for (index, child) in list.iter().enumerate() {
                let item = &mut self.items[child.0];
                item.parent = Some(owner);
                item.index = index;
            }
        }
        let item = &mut self.items[owner.0];
        item.children = children;
        item.attributes = attributes;
    }

    // -- Queries -------------------------------------------------------------

    /// Payload of a collection entry or reference slot.
    pub fn wrapped(&self, id: ItemId) -> Option<ItemId> {
        let item = self.item(id);
        if item.value.is_wrapper() {
            item.children.first().copied()
        } else {
            None
        }
    }

    /// Follow wrapper layers down to the payload (or the last empty wrapper).
    pub fn unwrap_item(&self, mut id: ItemId) -> ItemId {
        while let Some(inner) = self.wrapped(id) {
            id = inner;
        }
        id
    }

    pub fn link_target(&self, id: ItemId) -> Option<ItemId> {
        self.item(id).value.graph_link().and_then(|link| link.target)
    }

    pub fn link_type(&self, id: ItemId) -> Option<LinkType> {
        self.item(id).value.graph_link().map(|link| link.link_type)
    }

    /// Owners from the nearest up to the top of the item's subtree.
    pub fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut result = Vec::new();
        let mut current = self.item(id).parent;
        while let Some(parent) = current {
            result.push(parent);
            current = self.item(parent).parent;
        }
        result
    }

    pub fn top(&self, id: ItemId) -> ItemId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Reachable from the document root or from a registered graph node.
    pub fn is_attached(&self, id: ItemId) -> bool {
        let top = self.top(id);
        top == self.root || self.graph.contains(top)
    }

    /// Graph node whose subtree holds this item, the item itself included.
    /// The document root never counts.
    pub fn enclosing_graph_node(&self, id: ItemId) -> Option<ItemId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|candidate| {
                *candidate != self.root && self.definition(*candidate).is_graph_node()
            })
    }

    /// Owned child or attribute by name.
    pub fn find_child(&self, owner: ItemId, name: &str) -> Option<ItemId> {
        let item = self.item(owner);
        item.children
            .iter()
            .chain(item.attributes.iter())
            .copied()
            .find(|child| self.item(*child).name == name)
    }

    /// Resolve a `/`-separated path from the root. Numeric segments index
    /// into collections; wrappers are passed through.
    pub fn find_path(&self, path: &str) -> Option<ItemId> {
        let mut current = self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let owner = self.unwrap_item(current);
            current = match segment.parse::<usize>() {
                Ok(index) if matches!(
                    self.item(owner).value,
                    ItemValue::Collection | ItemValue::GraphCollection(_) | ItemValue::Tree
                ) =>
                {
                    *self.item(owner).children.get(index)?
                }
                _ => match self.find_child(owner, segment) {
                    Some(child) => child,
                    None => self
                        .link_target(owner)
                        .and_then(|node| self.find_child(node, segment))?,
                },
            };
        }
        Some(self.unwrap_item(current))
    }

    /// The item and every owned descendant, depth first. Graph links are not
    /// followed.
    pub fn subtree(&self, id: ItemId) -> Vec<ItemId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            let item = self.item(current);
            stack.extend(item.attributes.iter().rev());
            stack.extend(item.children.iter().rev());
        }
        result
    }

    /// Children as shown in a tree view: owned children, plus the node held
    /// by a duplicate link.
    pub fn logical_children(&self, id: ItemId) -> Vec<ItemId> {
        let item = self.item(id);
        match item.value.graph_link() {
            Some(link) if link.link_type == LinkType::Duplicate => {
                link.target.into_iter().collect()
            }
            Some(_) => Vec::new(),
            None => item.children.clone(),
        }
    }

    /// Is `definition` a kind that may hold owned children?
    pub fn is_complex(&self, id: ItemId) -> bool {
        !matches!(
            self.definition(id).kind,
            DefinitionKind::String(_)
                | DefinitionKind::Number(_)
                | DefinitionKind::Boolean(_)
                | DefinitionKind::Colour(_)
                | DefinitionKind::Enum(_)
                | DefinitionKind::File(_)
                | DefinitionKind::Pair(_)
                | DefinitionKind::Comment
                | DefinitionKind::GraphReference(_)
        )
    }

    // -- Mutators ------------------------------------------------------------

    pub(crate) fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn set_children(&mut self, owner: ItemId, children: Vec<ItemId>) {
        let old = std::mem::replace(&mut self.items[owner.0].children, children.clone());
        self.relink(owner, &old, &children);
        self.events.push(ChangeEvent::Children(owner));
    }

    pub(crate) fn set_attributes(&mut self, owner: ItemId, attributes: Vec<ItemId>) {
        let old = std::mem::replace(&mut self.items[owner.0].attributes, attributes.clone());
        self.relink(owner, &old, &attributes);
        self.events.push(ChangeEvent::Children(owner));
    }

    fn relink(&mut self, owner: ItemId, old: &[ItemId], new: &[ItemId]) {
        for child in old.iter().filter(|child| !new.contains(child)) {
            let item = &mut self.items[child.0];
            if item.parent == Some(owner) {
                item.parent = None;
                self.events.push(ChangeEvent::Parent(*child));
            }
        }
        for (index, child) in new.iter().enumerate() {
            let item = &mut self.items[child.0];
            item.index = index;
            if item.parent != Some(owner) {
                item.parent = Some(owner);
                self.events.push(ChangeEvent::Parent(*child));
            }
        }
    }

    /// Replace a non-link value. Graph links go through [`Self::set_link`].
    pub(crate) fn set_value(&mut self, id: ItemId, value: ItemValue) {
        let item = &mut self.items[id.0];
        if item.value != value {
            item.value = value;
            self.events.push(ChangeEvent::Value(id));
        }
    }

    /// Point a graph reference at `target`, or leave it waiting for `pending`.
    pub(crate) fn set_link(
        &mut self,
        reference: ItemId,
        target: Option<ItemId>,
        pending: Option<String>,
    ) {
        let ItemValue::GraphReference(link) = &mut self.items[reference.0].value else {
            return;
        };
        let previous = link.target;
        link.target = target;
        link.pending_guid = pending.clone();

        if let Some(previous) = previous {
            self.graph.remove_link_parent(previous, reference);
        }
        if let Some(target) = target {
            self.graph.add_link_parent(target, reference);
        }
        if pending.is_some() {
            self.graph.add_pending(reference);
        } else {
            self.graph.remove_pending(reference);
        }
        self.events.push(ChangeEvent::Link(reference));
    }

    pub(crate) fn set_link_type(&mut self, reference: ItemId, link_type: LinkType) {
        if let ItemValue::GraphReference(link) = &mut self.items[reference.0].value {
            link.link_type = link_type;
            self.events.push(ChangeEvent::Link(reference));
        }
    }

    /// Add a node to the registry and resolve references waiting on its GUID.
    pub(crate) fn register_node(&mut self, node: ItemId) {
        if !self.graph.insert(node) {
            return;
        }
        self.events.push(ChangeEvent::Registry(node));

        let Some(guid) = self.item(node).value.graph_node().map(|data| data.guid.clone()) else {
            return;
        };
        let waiting: Vec<ItemId> = self
            .graph
            .pending()
            .iter()
            .copied()
            .filter(|reference| {
                self.item(*reference)
                    .value
                    .graph_link()
                    .and_then(|link| link.pending_guid.as_deref())
                    == Some(guid.as_str())
            })
            .collect();
        for reference in waiting {
            debug!(%reference, %node, guid = %guid, "resolved pending graph reference");
            self.set_link(reference, Some(node), None);
        }
    }

    pub(crate) fn unregister_node(&mut self, node: ItemId) {
        if self.graph.remove(node) {
            self.events.push(ChangeEvent::Registry(node));
        }
    }

    pub(crate) fn set_expanded(&mut self, id: ItemId, expanded: bool) {
        self.items[id.0].is_expanded = expanded;
    }

    pub(crate) fn set_search_filtered(&mut self, id: ItemId, filtered: bool) {
        self.items[id.0].is_search_filtered = filtered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> DataTree {
        let schema = Schema::parse(
            r#"<Struct Name="Root">
                 <String Name="A" />
                 <Collection Name="List"><String Name="Entry" /></Collection>
               </Struct>"#,
        )
        .unwrap();
        let schema = Rc::new(schema);
        let mut tree = DataTree::new(Rc::clone(&schema));
        let root = tree.create_data(schema.default_root().unwrap());
        tree.set_root(root);
        tree.take_events();
        tree
    }

    #[test]
    fn test_set_children_reindexes_and_reports() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.find_child(root, "A").unwrap();
        let list = tree.find_child(root, "List").unwrap();

        tree.set_children(root, vec![list, a]);
        assert_eq!(tree.item(list).index(), 0);
        assert_eq!(tree.item(a).index(), 1);
        assert_eq!(tree.take_events(), vec![ChangeEvent::Children(root)]);

        tree.set_children(root, vec![list]);
        assert_eq!(tree.item(a).parent(), None);
        assert!(!tree.is_attached(a));
        assert_eq!(
            tree.take_events(),
            vec![ChangeEvent::Parent(a), ChangeEvent::Children(root)]
        );
    }

    #[test]
    fn test_find_path() {
        let tree = tree();
        let a = tree.find_path("A").unwrap();
        assert_eq!(tree.item(a).name(), "A");
        assert!(tree.find_path("List/0").is_none());
        assert!(tree.find_path("Missing").is_none());
    }

    #[test]
    fn test_subtree_is_depth_first() {
        let tree = tree();
        let root = tree.root();
        let subtree = tree.subtree(root);
        assert_eq!(subtree[0], root);
        assert_eq!(subtree.len(), 3);
    }

    #[test]
    fn test_collect_frees_only_unreachable_items() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.find_child(root, "A").unwrap();
        let list = tree.find_child(root, "List").unwrap();
        tree.set_children(root, vec![list]);
        let live = tree.len();

        assert!(tree.collect([a]).is_empty());
        assert!(tree.get(a).is_some());

        let freed = tree.collect(std::iter::empty());
        assert_eq!(freed, HashSet::from([a]));
        assert!(tree.get(a).is_none());
        assert_eq!(tree.len(), live - 1);

        let slots = tree.items.len();
        let definition = tree.schema_rc().default_root().unwrap();
        tree.create_data(definition);
        assert!(tree.get(a).is_some(), "the freed slot is reused first");
        assert_eq!(tree.items.len(), slots + 2);
    }
}
