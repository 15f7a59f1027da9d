//! # Document Handle
//!
//! One open structured document: the item tree, its undo log, visibility
//! state and the notifications waiting for the host.
//!
//! ## Lifecycle
//!
//! ```text
//! Schema → new/load → edit (recorded) → drain notifications → save
//!                        ↓
//!                  undo / redo
//! ```
//!
//! Every editing operation builds a list of [`TreeEdit`]s from the current
//! state and records it as one undoable action. Queued change events are
//! processed before the operation returns.

use crate::clipboard::Clipboard;
use crate::description;
use crate::errors::{EditorError, EditorResult};
use crate::filter::{self, FilterQuery};
use crate::graph::GraphError;
use crate::instantiate::{find_entry_definition, parse_primitive, LoadContext, LoadOptions};
use crate::item::{DataItem, GraphNodeData, ItemId, ItemValue, LinkType, Value};
use crate::mutations::{LinkState, TreeEdit};
use crate::post_effects::{Notification, PostEffectEngine};
use crate::serializer::{SaveOptions, Saver};
use crate::tree::DataTree;
use crate::undo_stack::{DisableUndoScope, HistoryEntry, UndoRedoLog};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use structdoc_markup::{parse, Element, Serializer};
use structdoc_schema::{CollectionDefinition, DefId, DefinitionKind, Schema, SchemaError};
use tracing::{debug, info, warn};

/// New graph nodes are placed this far right of the node that creates them.
const NODE_SPACING: f64 = 300.0;

pub struct Document {
    tree: DataTree,
    effects: PostEffectEngine,
    history: UndoRedoLog<DataTree>,
    notifications: Vec<Notification>,
    clipboard: Clipboard,
    /// Edit batches handed to the undo log; dead once the log drops them.
    batches: Vec<Weak<Vec<TreeEdit>>>,
    reclaimed_len: usize,
}

/// Arena size below which growth alone never triggers reclamation.
const RECLAIM_FLOOR: usize = 1024;

impl Document {
    /// A default-valued document for `root_name`, or the schema's first root.
    pub fn new(schema: Rc<Schema>, root_name: Option<&str>) -> EditorResult<Self> {
        let definition = match root_name {
            Some(name) => schema.require_root(name)?,
            None => schema.default_root()?,
        };
        let mut tree = DataTree::new(schema);
        let root = tree.create_data(definition);
        tree.set_root(root);
        info!(root = %tree.item(root).name(), items = tree.len(), "created document");
        Self::from_tree(tree)
    }

    pub fn load(schema: Rc<Schema>, source: &str) -> EditorResult<Self> {
        Self::load_with(schema, source, LoadOptions::default())
    }

    pub fn load_with(schema: Rc<Schema>, source: &str, options: LoadOptions) -> EditorResult<Self> {
        let element = parse(source)?;
        let definition = schema
            .root(&element.name)
            .ok_or_else(|| SchemaError::UnknownRoot {
                name: element.name.clone(),
            })?;

        let mut tree = DataTree::new(Rc::clone(&schema));
        let mut ctx = LoadContext::new(options);
        let root = tree.load_data(definition, &element, &mut ctx);
        tree.set_root(root);

        let store_name = tree.graph_options().node_store_name;
        if tree.find_child(root, &store_name).is_none() {
            if let Some(store) = element.element(&store_name) {
                for child in store.elements() {
                    match schema.graph_node_definition(&child.name) {
                        Some(node_definition) => {
                            tree.load_data(node_definition, child, &mut ctx);
                        }
                        None => warn!(element = %child.name, "node store entry of unknown kind"),
                    }
                }
            }
        }

        // Nodes owned by a collection or struct are written in place.
        let linked: Vec<ItemId> = ctx
            .nodes
            .iter()
            .copied()
            .filter(|node| *node != root && tree.item(*node).parent().is_none())
            .collect();
        for node in linked {
            tree.register_node(node);
        }
        for reference in tree.graph().pending() {
            warn!(%reference, "graph reference GUID did not resolve");
        }
        info!(
            root = %element.name,
            items = tree.len(),
            nodes = tree.graph().nodes().len(),
            "loaded document"
        );
        Self::from_tree(tree)
    }

    fn from_tree(mut tree: DataTree) -> EditorResult<Self> {
        let mut effects = PostEffectEngine::new();
        effects.reset(&mut tree)?;
        let reclaimed_len = tree.len();
        Ok(Self {
            tree,
            effects,
            history: UndoRedoLog::new(),
            notifications: Vec::new(),
            clipboard: Clipboard::global(),
            batches: Vec::new(),
            reclaimed_len,
        })
    }

    pub fn with_clipboard(mut self, clipboard: Clipboard) -> Self {
        self.clipboard = clipboard;
        self
    }

    /// Replace the undo log, e.g. with one on a manual clock.
    pub fn with_history(mut self, history: UndoRedoLog<DataTree>) -> Self {
        self.history = history;
        self
    }

    pub fn save(&self) -> EditorResult<String> {
        self.save_with(&SaveOptions::default())
    }

    pub fn save_with(&self, options: &SaveOptions) -> EditorResult<String> {
        let element = self.save_element(options.array_mode)?;
        let text = Serializer::with_indent(&options.indent).serialize_document(&element);
        info!(bytes = text.len(), "saved document");
        Ok(text)
    }

    pub fn save_element(&self, array_mode: bool) -> EditorResult<Element> {
        Saver::new(&self.tree, self.effects.visibility(), array_mode).save_document()
    }

    // -- Queries -------------------------------------------------------------

    pub fn tree(&self) -> &DataTree {
        &self.tree
    }

    pub fn schema(&self) -> &Schema {
        self.tree.schema()
    }

    pub fn root(&self) -> ItemId {
        self.tree.root()
    }

    pub fn item(&self, id: ItemId) -> &DataItem {
        self.tree.item(id)
    }

    /// Item at a `/`-separated path from the root, e.g. `Stats/Level` or
    /// `Spells/0`.
    pub fn find(&self, path: &str) -> Option<ItemId> {
        self.tree.find_path(path)
    }

    pub fn description(&self, id: ItemId) -> String {
        description::describe(&self.tree, self.effects.visibility(), id)
    }

    pub fn focus_name(&self, id: ItemId) -> String {
        description::focus_name(&self.tree, self.effects.visibility(), id)
    }

    pub fn display_name(&self, id: ItemId) -> String {
        description::display_name(&self.tree, id)
    }

    pub fn value_text(&self, id: ItemId) -> Option<String> {
        description::value_text(&self.tree, id)
    }

    pub fn is_visible(&self, id: ItemId) -> bool {
        self.effects.visibility().is_visible(id)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // -- Recording -----------------------------------------------------------

    fn commit(&mut self, edits: Vec<TreeEdit>, description: impl Into<String>) -> EditorResult<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let description = description.into();
        debug!(edits = edits.len(), %description, "recording");
        let edits = Rc::new(edits);
        self.batches.push(Rc::downgrade(&edits));
        let forward = Rc::clone(&edits);
        let mark = self.notifications.len();
        let effects = &mut self.effects;
        let notifications = &mut self.notifications;
        let result = self.history.try_apply_do_undo(
            &mut self.tree,
            move |tree: &mut DataTree| forward.iter().for_each(|edit| edit.apply(tree)),
            move |tree: &mut DataTree| edits.iter().rev().for_each(|edit| edit.revert(tree)),
            |tree: &mut DataTree| -> EditorResult<()> {
                effects.process(tree, notifications)?;
                Ok(())
            },
            description,
        );
        match result {
            Ok(()) => {}
            Err(EditorError::Undo(err)) => {
                self.flush()?;
                return Err(err.into());
            }
            Err(err) => {
                // Rolled back: the host never sees the forward changes.
                self.notifications.truncate(mark);
                if let Err(rebind) = self.flush() {
                    warn!(error = %rebind, "visibility did not settle after rollback");
                }
                self.notifications.truncate(mark);
                return Err(err);
            }
        }
        self.reclaim(false);
        Ok(())
    }

    fn flush(&mut self) -> EditorResult<()> {
        self.effects
            .process(&mut self.tree, &mut self.notifications)?;
        Ok(())
    }

    /// Free items that neither the document nor the undo log can reach.
    /// Runs after the log drops an action, or once the arena has doubled
    /// since the last pass, unless `force` is set.
    fn reclaim(&mut self, force: bool) -> usize {
        let before = self.batches.len();
        self.batches.retain(|batch| batch.strong_count() > 0);
        let dropped = self.batches.len() != before;
        let grown = self.tree.len() > 2 * self.reclaimed_len.max(RECLAIM_FLOOR);
        if !(force || dropped || grown) {
            return 0;
        }
        let retained: Vec<ItemId> = self
            .batches
            .iter()
            .filter_map(Weak::upgrade)
            .flat_map(|batch| batch.iter().flat_map(TreeEdit::items).collect::<Vec<_>>())
            .collect();
        let freed = self.tree.collect(retained);
        self.effects.visibility.forget(&freed);
        self.reclaimed_len = self.tree.len();
        freed.len()
    }

    fn wrong_kind(&self, item: ItemId, expected: &'static str) -> EditorError {
        EditorError::WrongKind {
            item,
            expected,
            actual: self.tree.definition(item).kind_name(),
        }
    }

    /// Registered nodes that only the items in `removed` keep alive through
    /// duplicate links.
    fn orphaned_nodes(&self, removed: &[ItemId]) -> Vec<ItemId> {
        let mut inside: HashSet<ItemId> = HashSet::new();
        let mut stack = removed.to_vec();
        let mut nodes = Vec::new();
        while let Some(top) = stack.pop() {
            let subtree = self.tree.subtree(top);
            inside.extend(subtree.iter().copied());
            for id in subtree {
                let Some(target) = self.tree.link_target(id) else {
                    continue;
                };
                let owned = self.tree.link_type(id) == Some(LinkType::Duplicate)
                    && self.tree.graph().contains(target)
                    && !nodes.contains(&target)
                    && self
                        .tree
                        .live_referrers(target)
                        .iter()
                        .all(|referrer| inside.contains(referrer));
                if owned {
                    nodes.push(target);
                    stack.push(target);
                }
            }
        }
        nodes
    }

    fn unregister_edits(&self, removed: &[ItemId]) -> Vec<TreeEdit> {
        self.orphaned_nodes(removed)
            .into_iter()
            .map(|node| TreeEdit::Unregister { node })
            .collect()
    }

    /// Edits that give `target` the content of the detached `source`.
    fn replace_content(&self, target: ItemId, source: ItemId) -> EditorResult<Vec<TreeEdit>> {
        let source_item = self.tree.item(source);
        let edits = match source_item.value() {
            ItemValue::GraphReference(link) => {
                if let Some(node) = link.target {
                    self.tree.check_link(target, node, link.link_type)?;
                }
                let mut edits = self.unregister_edits(&[target]);
                edits.insert(
                    0,
                    TreeEdit::set_link(
                        &self.tree,
                        target,
                        LinkState {
                            target: link.target,
                            pending: link.pending_guid.clone(),
                        },
                    ),
                );
                if let Some(old) = self.tree.link_type(target) {
                    edits.insert(
                        1,
                        TreeEdit::SetLinkType {
                            reference: target,
                            old,
                            new: link.link_type,
                        },
                    );
                }
                edits
            }
            ItemValue::GraphNode(_) | ItemValue::GraphCollection(_) => {
                self.replace_children(target, source_item)
            }
            value if !self.tree.is_complex(source) => {
                vec![TreeEdit::set_value(&self.tree, target, value.clone())]
            }
            _ => self.replace_children(target, source_item),
        };
        Ok(edits)
    }

    fn replace_children(&self, target: ItemId, source: &DataItem) -> Vec<TreeEdit> {
        let target_item = self.tree.item(target);
        let removed: Vec<ItemId> = target_item
            .children()
            .iter()
            .chain(target_item.attributes())
            .copied()
            .collect();
        let mut edits = vec![
            TreeEdit::set_children(&self.tree, target, source.children().to_vec()),
            TreeEdit::set_attributes(&self.tree, target, source.attributes().to_vec()),
        ];
        edits.extend(self.unregister_edits(&removed));
        edits
    }

    /// Link references in a freshly loaded subtree to nodes that already
    /// exist, and register the nodes it brought along.
    fn adopt_loaded(&mut self, ctx: LoadContext, subtree_root: ItemId) -> Vec<TreeEdit> {
        for id in self.tree.subtree(subtree_root) {
            let pending = self
                .tree
                .item(id)
                .value()
                .graph_link()
                .and_then(|link| link.pending_guid.clone());
            if let Some(guid) = pending {
                match self.tree.find_node_by_guid(&guid) {
                    Some(node) => self.tree.set_link(id, Some(node), None),
                    None => self.tree.set_link(id, None, None),
                }
            }
        }
        self.tree.take_events();
        ctx.nodes
            .into_iter()
            .filter(|node| *node != subtree_root && self.tree.item(*node).parent().is_none())
            .map(|node| TreeEdit::Register { node })
            .collect()
    }

    // -- Values --------------------------------------------------------------

    pub fn set_value(&mut self, id: ItemId, value: impl Into<Value>) -> EditorResult<()> {
        let schema = self.tree.schema_rc();
        let definition = schema.definition(self.tree.item(id).definition());
        let value = value.into();
        let invalid = |value: String| EditorError::InvalidValue { item: id, value };

        let new = match (&definition.kind, value) {
            (DefinitionKind::Number(def), Value::Number(number)) => {
                if !number.is_finite() {
                    return Err(invalid(number.to_string()));
                }
                ItemValue::Number(def.clamp(number))
            }
            (DefinitionKind::Boolean(_), Value::Boolean(flag)) => ItemValue::Boolean(flag),
            (DefinitionKind::Colour(_), Value::Colour(colour)) => ItemValue::Colour(colour),
            (DefinitionKind::Pair(_), Value::Text(text)) => match self.tree.item(id).value() {
                ItemValue::Pair { key, .. } => ItemValue::Pair {
                    key: key.clone(),
                    value: text,
                },
                _ => return Err(self.wrong_kind(id, "Pair")),
            },
            (DefinitionKind::Comment, Value::Text(text)) => ItemValue::Comment(text),
            (_, Value::Text(text)) if definition.is_primitive() => {
                parse_primitive(definition, &text).ok_or_else(|| invalid(text.clone()))?
            }
            _ => return Err(self.wrong_kind(id, "primitive")),
        };

        let old = self.tree.item(id).value().clone();
        if old == new {
            return Ok(());
        }
        let describe = |value: &ItemValue| {
            value
                .primitive_text(|n| match &definition.kind {
                    DefinitionKind::Number(def) => def.format(n),
                    _ => n.to_string(),
                })
                .unwrap_or_default()
        };
        let text = format!(
            "Set {} from {} to {}",
            definition.name,
            describe(&old),
            describe(&new)
        );
        self.commit(vec![TreeEdit::SetValue { item: id, old, new }], text)
    }

    pub fn set_text(&mut self, id: ItemId, text: &str) -> EditorResult<()> {
        self.set_value(id, Value::Text(text.to_string()))
    }

    pub fn set_pair_key(&mut self, id: ItemId, key: &str) -> EditorResult<()> {
        let ItemValue::Pair { value, .. } = self.tree.item(id).value() else {
            return Err(self.wrong_kind(id, "Pair"));
        };
        let new = ItemValue::Pair {
            key: key.to_string(),
            value: value.clone(),
        };
        let name = self.tree.item(id).name().to_string();
        self.commit(
            vec![TreeEdit::set_value(&self.tree, id, new)],
            format!("Set {} key to {}", name, key),
        )
    }

    // -- Collections and trees -----------------------------------------------

    fn collection_definition<'s>(
        &self,
        schema: &'s Schema,
        collection: ItemId,
    ) -> EditorResult<&'s CollectionDefinition> {
        schema
            .definition(self.tree.item(collection).definition())
            .as_collection()
            .ok_or_else(|| self.wrong_kind(collection, "Collection"))
    }

    fn entry_count(&self, collection: ItemId) -> usize {
        self.tree
            .item(collection)
            .children()
            .iter()
            .filter(|child| !matches!(self.tree.item(**child).value(), ItemValue::Comment(_)))
            .count()
    }

    /// The collection entry holding `id`: the item itself, or its wrapper
    /// when `id` is an entry's payload.
    fn entry_of(&self, id: ItemId) -> ItemId {
        match self.tree.item(id).parent() {
            Some(parent)
                if matches!(self.tree.item(parent).value(), ItemValue::CollectionChild) =>
            {
                parent
            }
            _ => id,
        }
    }

    /// Build a new entry for `collection`, checking its limits.
    fn new_entry(&mut self, collection: ItemId, key: Option<&str>) -> EditorResult<ItemId> {
        let schema = self.tree.schema_rc();
        let def = self.collection_definition(&schema, collection)?;
        let wrapper = match key {
            Some(key) => find_entry_definition(&schema, def, key).ok_or_else(|| {
                EditorError::UnknownKey {
                    item: collection,
                    key: key.to_string(),
                }
            })?,
            None => def
                .child_definitions
                .first()
                .copied()
                .ok_or_else(|| EditorError::UnknownKey {
                    item: collection,
                    key: String::new(),
                })?,
        };

        if self.entry_count(collection) >= def.max_count {
            return Err(EditorError::CollectionFull {
                item: collection,
                max: def.max_count,
            });
        }
        let name = &schema.definition(wrapper).name;
        if def.children_are_unique
            && self
                .tree
                .item(collection)
                .children()
                .iter()
                .any(|child| self.tree.item(*child).name() == name)
        {
            return Err(EditorError::DuplicateChild {
                item: collection,
                name: name.clone(),
            });
        }
        Ok(self.tree.create_data(wrapper))
    }

    /// Append a new default entry. `key` picks the entry kind of a
    /// multi-kind collection.
    pub fn add_new(&mut self, collection: ItemId, key: Option<&str>) -> EditorResult<ItemId> {
        let entry = self.new_entry(collection, key)?;
        let mut children = self.tree.item(collection).children().to_vec();
        children.push(entry);
        let description = format!(
            "Add {} to {}",
            self.tree.item(entry).name(),
            self.tree.item(collection).name()
        );
        self.commit(vec![TreeEdit::set_children(&self.tree, collection, children)], description)?;
        Ok(entry)
    }

    /// Insert a new default entry right after `sibling`.
    pub fn insert_new(&mut self, sibling: ItemId, key: Option<&str>) -> EditorResult<ItemId> {
        let sibling = self.entry_of(sibling);
        let collection = self.tree.item(sibling).parent().ok_or(EditorError::NotSupported {
            item: sibling,
            reason: "item is not in a collection",
        })?;
        let entry = self.new_entry(collection, key)?;
        let mut children = self.tree.item(collection).children().to_vec();
        let at = self.tree.item(sibling).index() + 1;
        children.insert(at.min(children.len()), entry);
        let description = format!(
            "Insert {} into {}",
            self.tree.item(entry).name(),
            self.tree.item(collection).name()
        );
        self.commit(vec![TreeEdit::set_children(&self.tree, collection, children)], description)?;
        Ok(entry)
    }

    /// Remove a collection entry, comment or tree node.
    pub fn remove(&mut self, entry: ItemId) -> EditorResult<()> {
        let entry = self.entry_of(entry);
        let owner = self.tree.item(entry).parent().ok_or(EditorError::NotSupported {
            item: entry,
            reason: "item has no owner",
        })?;
        let schema = self.tree.schema_rc();
        let owner_definition = schema.definition(self.tree.item(owner).definition());
        match &owner_definition.kind {
            DefinitionKind::Collection(def) | DefinitionKind::GraphCollection(def, _) => {
                let is_comment = matches!(self.tree.item(entry).value(), ItemValue::Comment(_));
                if !is_comment && self.entry_count(owner) <= def.min_count {
                    return Err(EditorError::CollectionAtMinimum {
                        item: owner,
                        min: def.min_count,
                    });
                }
            }
            DefinitionKind::Tree(_) => {}
            _ => {
                return Err(EditorError::NotSupported {
                    item: entry,
                    reason: "only collection entries and tree nodes can be removed",
                })
            }
        }

        let children: Vec<ItemId> = self
            .tree
            .item(owner)
            .children()
            .iter()
            .copied()
            .filter(|child| *child != entry)
            .collect();
        let mut edits = vec![TreeEdit::set_children(&self.tree, owner, children)];
        edits.extend(self.unregister_edits(&[entry]));
        let description = format!(
            "Remove {} from {}",
            self.tree.item(entry).name(),
            self.tree.item(owner).name()
        );
        self.commit(edits, description)
    }

    /// Move an entry to `index` within its owner.
    pub fn move_item(&mut self, entry: ItemId, index: usize) -> EditorResult<()> {
        let entry = self.entry_of(entry);
        let owner = self.tree.item(entry).parent().ok_or(EditorError::NotSupported {
            item: entry,
            reason: "item has no owner",
        })?;
        if !matches!(
            self.tree.item(owner).value(),
            ItemValue::Collection | ItemValue::GraphCollection(_) | ItemValue::Tree
        ) {
            return Err(EditorError::NotSupported {
                item: entry,
                reason: "only collection entries and tree nodes can be moved",
            });
        }
        let mut children = self.tree.item(owner).children().to_vec();
        let from = self.tree.item(entry).index();
        if from == index || index >= children.len() {
            return Ok(());
        }
        let moved = children.remove(from);
        children.insert(index, moved);
        let description =
            format!("Move {} from {} to {}", self.tree.item(entry).name(), from, index);
        self.commit(vec![TreeEdit::set_children(&self.tree, owner, children)], description)
    }

    /// Copy an entry in place; inline graph nodes get fresh GUIDs.
    pub fn duplicate(&mut self, entry: ItemId) -> EditorResult<ItemId> {
        let entry = self.entry_of(entry);
        let owner = self.tree.item(entry).parent().ok_or(EditorError::NotSupported {
            item: entry,
            reason: "item has no owner",
        })?;
        let schema = self.tree.schema_rc();
        let def = self.collection_definition(&schema, owner)?;
        if self.entry_count(owner) >= def.max_count {
            return Err(EditorError::CollectionFull {
                item: owner,
                max: def.max_count,
            });
        }
        if def.children_are_unique {
            return Err(EditorError::DuplicateChild {
                item: owner,
                name: self.tree.item(entry).name().to_string(),
            });
        }

        let element = Saver::new(&self.tree, self.effects.visibility(), false)
            .save_fragment(entry)
            .ok_or(EditorError::NotSupported {
                item: entry,
                reason: "item writes no markup",
            })?;
        let mut ctx = LoadContext::default();
        let copy = self.tree.load_data(self.tree.item(entry).definition(), &element, &mut ctx);
        let mut edits = self.adopt_loaded(ctx, copy);

        let mut children = self.tree.item(owner).children().to_vec();
        children.insert(self.tree.item(entry).index() + 1, copy);
        edits.insert(0, TreeEdit::set_children(&self.tree, owner, children));
        let description = format!("Duplicate {}", self.tree.item(entry).name());
        self.commit(edits, description)?;
        Ok(copy)
    }

    /// Remove every entry, then refill to `MinCount` defaults.
    pub fn clear(&mut self, collection: ItemId) -> EditorResult<()> {
        let schema = self.tree.schema_rc();
        let def = self.collection_definition(&schema, collection)?;
        let removed = self.tree.item(collection).children().to_vec();
        let mut children = Vec::new();
        if let [only] = def.child_definitions.as_slice() {
            for _ in 0..def.min_count {
                children.push(self.tree.create_data(*only));
            }
        }
        let mut edits = vec![TreeEdit::set_children(&self.tree, collection, children)];
        edits.extend(self.unregister_edits(&removed));
        let description = format!("{} cleared", self.tree.item(collection).name());
        self.commit(edits, description)
    }

    /// Append a node of kind `key` to a tree item.
    pub fn add_tree_child(&mut self, tree_item: ItemId, key: &str) -> EditorResult<ItemId> {
        let schema = self.tree.schema_rc();
        let definition = schema.definition(self.tree.item(tree_item).definition());
        let DefinitionKind::Tree(def) = &definition.kind else {
            return Err(self.wrong_kind(tree_item, "Tree"));
        };
        let node_definition = def
            .node_definitions
            .iter()
            .copied()
            .find(|node| schema.definition(*node).name.eq_ignore_ascii_case(key))
            .ok_or_else(|| EditorError::UnknownKey {
                item: tree_item,
                key: key.to_string(),
            })?;
        let child = self.tree.create_data(node_definition);
        let mut children = self.tree.item(tree_item).children().to_vec();
        children.push(child);
        let description = format!("Add {} to {}", key, self.tree.item(tree_item).name());
        self.commit(vec![TreeEdit::set_children(&self.tree, tree_item, children)], description)?;
        Ok(child)
    }

    // -- References ----------------------------------------------------------

    /// Give a reference slot a fresh payload of kind `key`.
    pub fn choose_reference(&mut self, reference: ItemId, key: &str) -> EditorResult<ItemId> {
        let schema = self.tree.schema_rc();
        let definition = schema.definition(self.tree.item(reference).definition());
        let DefinitionKind::Reference(def) = &definition.kind else {
            return Err(self.wrong_kind(reference, "Reference"));
        };
        let chosen = def.find(key).ok_or_else(|| EditorError::UnknownKey {
            item: reference,
            key: key.to_string(),
        })?;
        let payload = self.tree.create_data(chosen);
        let removed = self.tree.item(reference).children().to_vec();
        let mut edits = vec![TreeEdit::set_children(&self.tree, reference, vec![payload])];
        edits.extend(self.unregister_edits(&removed));
        let description = format!("Set {} to {}", self.tree.item(reference).name(), key);
        self.commit(edits, description)?;
        Ok(payload)
    }

    pub fn clear_reference(&mut self, reference: ItemId) -> EditorResult<()> {
        let schema = self.tree.schema_rc();
        let definition = schema.definition(self.tree.item(reference).definition());
        let DefinitionKind::Reference(def) = &definition.kind else {
            return Err(self.wrong_kind(reference, "Reference"));
        };
        if !def.nullable {
            return Err(EditorError::NotSupported {
                item: reference,
                reason: "reference is not nullable",
            });
        }
        let removed = self.tree.item(reference).children().to_vec();
        let mut edits = vec![TreeEdit::set_children(&self.tree, reference, Vec::new())];
        edits.extend(self.unregister_edits(&removed));
        let description = format!("Clear {}", self.tree.item(reference).name());
        self.commit(edits, description)
    }

    // -- Graph ---------------------------------------------------------------

    fn require_graph_reference(&self, reference: ItemId) -> EditorResult<()> {
        match self.tree.item(reference).value() {
            ItemValue::GraphReference(_) => Ok(()),
            _ => Err(self.wrong_kind(reference, "GraphReference")),
        }
    }

    fn require_node(&self, node: ItemId) -> EditorResult<()> {
        match self.tree.item(node).value().graph_node() {
            Some(_) => Ok(()),
            None => Err(self.wrong_kind(node, "GraphStruct")),
        }
    }

    /// Create a node of kind `key` (or the slot's selected kind) and point
    /// the reference at it.
    pub fn create_graph_node(
        &mut self,
        reference: ItemId,
        key: Option<&str>,
    ) -> EditorResult<ItemId> {
        self.require_graph_reference(reference)?;
        let schema = self.tree.schema_rc();
        let definition = schema.definition(self.tree.item(reference).definition());
        let DefinitionKind::GraphReference(def) = &definition.kind else {
            return Err(self.wrong_kind(reference, "GraphReference"));
        };
        let selected = self
            .tree
            .item(reference)
            .value()
            .graph_link()
            .and_then(|link| link.selected);
        let node_definition: DefId = match key {
            Some(key) => def.find(key),
            None => selected,
        }
        .ok_or_else(|| GraphError::UnknownNodeKind {
            reference,
            key: key.unwrap_or_default().to_string(),
        })?;

        let node = self.tree.create_data(node_definition);
        let origin = self
            .tree
            .enclosing_graph_node(reference)
            .and_then(|owner| self.tree.item(owner).value().graph_node().cloned());
        let data = self.tree.item_mut(node).value.graph_node_mut();
        if let (Some(origin), Some(data)) = (origin, data) {
            data.x = origin.x + NODE_SPACING;
            data.y = origin.y;
        }

        let mut edits = vec![
            TreeEdit::set_link(&self.tree, reference, LinkState::to(node)),
            TreeEdit::Register { node },
        ];
        edits.extend(self.unregister_edits(&[reference]));
        self.commit(edits, "Create Item")?;
        Ok(node)
    }

    /// Detach the pointer. The node stays registered.
    pub fn clear_graph_reference(&mut self, reference: ItemId) -> EditorResult<()> {
        self.require_graph_reference(reference)?;
        let edit = TreeEdit::set_link(&self.tree, reference, LinkState::default());
        self.commit(vec![edit], "Clear Item")
    }

    /// Point a reference at an existing registered node.
    pub fn link_graph_reference(&mut self, reference: ItemId, node: ItemId) -> EditorResult<()> {
        self.require_graph_reference(reference)?;
        if !self.tree.graph().contains(node) {
            return Err(GraphError::NotRegistered { node }.into());
        }
        let link_type = self.tree.link_type(reference).unwrap_or_default();
        self.tree.check_link(reference, node, link_type)?;
        let mut edits = vec![TreeEdit::set_link(&self.tree, reference, LinkState::to(node))];
        edits.extend(self.unregister_edits(&[reference]));
        let description = format!(
            "Link {} to {}",
            self.tree.item(reference).name(),
            self.tree.item(node).name()
        );
        self.commit(edits, description)
    }

    pub fn set_link_type(&mut self, reference: ItemId, link_type: LinkType) -> EditorResult<()> {
        self.require_graph_reference(reference)?;
        let old = self.tree.link_type(reference).unwrap_or_default();
        if old == link_type {
            return Ok(());
        }
        if let Some(node) = self.tree.link_target(reference) {
            self.tree.check_link(reference, node, link_type)?;
        }
        self.commit(
            vec![TreeEdit::SetLinkType {
                reference,
                old,
                new: link_type,
            }],
            format!("Change LinkType from {} to {}", old, link_type),
        )
    }

    /// Remove a node from the registry and clear every reference to it.
    pub fn delete_graph_node(&mut self, node: ItemId) -> EditorResult<()> {
        self.require_node(node)?;
        if !self.tree.graph().contains(node) {
            return Err(GraphError::NotRegistered { node }.into());
        }
        let mut edits: Vec<TreeEdit> = self
            .tree
            .live_referrers(node)
            .into_iter()
            .map(|reference| TreeEdit::set_link(&self.tree, reference, LinkState::default()))
            .collect();
        edits.push(TreeEdit::Unregister { node });
        edits.extend(
            self.unregister_edits(&[node])
                .into_iter()
                .filter(|edit| *edit != TreeEdit::Unregister { node }),
        );
        let description = format!("Delete {}", self.tree.item(node).name());
        self.commit(edits, description)
    }

    fn edit_node(
        &mut self,
        node: ItemId,
        description: String,
        change: impl FnOnce(&mut GraphNodeData),
    ) -> EditorResult<()> {
        self.require_node(node)?;
        let mut value = self.tree.item(node).value().clone();
        if let Some(data) = value.graph_node_mut() {
            change(data);
        }
        if &value == self.tree.item(node).value() {
            return Ok(());
        }
        self.commit(vec![TreeEdit::set_value(&self.tree, node, value)], description)
    }

    pub fn set_node_position(&mut self, node: ItemId, x: f64, y: f64) -> EditorResult<()> {
        let description = format!("Move {}", self.tree.item(node).name());
        self.edit_node(node, description, |data| {
            data.x = x;
            data.y = y;
        })
    }

    pub fn set_node_guid(&mut self, node: ItemId, guid: &str) -> EditorResult<()> {
        let description = format!("Set {} GUID to {}", self.tree.item(node).name(), guid);
        self.edit_node(node, description, |data| data.guid = guid.to_string())
    }

    pub fn set_node_comment(
        &mut self,
        node: ItemId,
        comment: Option<String>,
        comment_data: Option<String>,
    ) -> EditorResult<()> {
        let description = format!("Comment {}", self.tree.item(node).name());
        self.edit_node(node, description, |data| {
            data.comment = comment;
            data.comment_data = comment_data;
        })
    }

    // -- Whole-item operations -------------------------------------------------

    /// Restore the item's subtree to its definition defaults.
    pub fn reset_to_default(&mut self, id: ItemId) -> EditorResult<()> {
        let fresh = self.tree.create_data(self.tree.item(id).definition());
        let edits = self.replace_content(id, fresh)?;
        let description = format!("Reset {} to default", self.tree.item(id).name());
        self.commit(edits, description)
    }

    /// The definition whose copy key addresses `id` on the clipboard.
    fn copy_key(&self, id: ItemId) -> String {
        let id = match self.tree.item(id).value() {
            ItemValue::CollectionChild => self.tree.unwrap_item(id),
            _ => id,
        };
        self.tree.definition(id).copy_key()
    }

    pub fn copy(&self, id: ItemId) -> EditorResult<()> {
        let element = Saver::new(&self.tree, self.effects.visibility(), false)
            .save_fragment(id)
            .ok_or(EditorError::NotSupported {
                item: id,
                reason: "item writes no markup",
            })?;
        let key = self.copy_key(id);
        debug!(%key, "copied");
        self.clipboard.set(key, Serializer::new().serialize(&element));
        Ok(())
    }

    /// Replace `id`'s content with the clipboard slot for its kind. Returns
    /// false, changing nothing, when the slot is empty.
    pub fn paste(&mut self, id: ItemId) -> EditorResult<bool> {
        let key = self.copy_key(id);
        let Some(payload) = self.clipboard.get(&key) else {
            return Ok(false);
        };
        let element = parse(&payload)?;
        let target = match self.tree.item(id).value() {
            ItemValue::CollectionChild => self.tree.unwrap_item(id),
            _ => id,
        };

        let mut ctx = LoadContext::default();
        let source = self.tree.load_data(self.tree.item(target).definition(), &element, &mut ctx);
        let mut edits = self.adopt_loaded(ctx, source);
        let replaced = self.replace_content(target, source);
        // The loaded root only carries content; it must not stay a referrer.
        self.tree.set_link(source, None, None);
        self.tree.take_events();
        edits.splice(0..0, replaced?);
        let description = format!("Paste {}", self.tree.item(target).name());
        self.commit(edits, description)?;
        Ok(true)
    }

    // -- Search and navigation -----------------------------------------------

    /// Filter the whole tree. Returns whether anything matched; `None`
    /// clears the filter.
    pub fn filter(&mut self, query: Option<&FilterQuery>) -> bool {
        let root = self.tree.root();
        filter::filter(&mut self.tree, self.effects.visibility(), root, query)
    }

    /// Expand every owner of `id` and return the breadcrumb of focus names
    /// from the root.
    pub fn focus(&mut self, id: ItemId) -> Vec<String> {
        let mut path = self.tree.ancestors(id);
        for ancestor in &path {
            self.tree.set_expanded(*ancestor, true);
        }
        path.reverse();
        path.push(id);
        path.into_iter().map(|item| self.focus_name(item)).collect()
    }

    pub fn set_expanded(&mut self, id: ItemId, expanded: bool) {
        self.tree.set_expanded(id, expanded);
    }

    // -- History -------------------------------------------------------------

    pub fn undo(&mut self) -> EditorResult<bool> {
        let done = self.history.undo(&mut self.tree);
        self.flush()?;
        Ok(done)
    }

    pub fn redo(&mut self) -> EditorResult<bool> {
        let done = self.history.redo(&mut self.tree);
        self.flush()?;
        Ok(done)
    }

    pub fn undo_n(&mut self, count: usize) -> EditorResult<usize> {
        let done = self.history.undo_n(&mut self.tree, count);
        self.flush()?;
        Ok(done)
    }

    pub fn redo_n(&mut self, count: usize) -> EditorResult<usize> {
        let done = self.history.redo_n(&mut self.tree, count);
        self.flush()?;
        Ok(done)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn mark_save_point(&self) {
        self.history.mark_save_point();
    }

    pub fn is_modified(&self) -> bool {
        self.history.is_modified()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.history()
    }

    pub fn history_log(&self) -> &UndoRedoLog<DataTree> {
        &self.history
    }

    /// Operations run while the returned guard lives are applied but not
    /// recorded.
    pub fn disable_undo_scope(&self) -> DisableUndoScope {
        self.history.disable_undo_scope()
    }

    /// Free every item the document and its undo log no longer reach.
    /// Returns how many were freed. Ids of freed items may be reused.
    pub fn compact(&mut self) -> usize {
        self.reclaim(true)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.tree.root())
            .field("items", &self.tree.len())
            .field("nodes", &self.tree.graph().nodes().len())
            .field("history", &self.history)
            .finish()
    }
}
