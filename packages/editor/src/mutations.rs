//! # Tree Edits
//!
//! Primitive, reversible changes to a [`DataTree`].
//!
//! ## Design Principles
//!
//! 1. **Self-inverting**: every edit carries its old and new state, so
//!    `revert` is exact and needs no snapshot.
//! 2. **Minimal**: one edit per structural concern (value, child list,
//!    attribute list, link, registry membership).
//! 3. **Batched**: a document operation records a list of edits as a single
//!    undoable action; undo reverts them in reverse order.

use crate::item::{ItemId, ItemValue, LinkType};
use crate::tree::DataTree;

/// Target and pending GUID of a graph reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkState {
    pub target: Option<ItemId>,
    pub pending: Option<String>,
}

impl LinkState {
    pub fn of(tree: &DataTree, reference: ItemId) -> Self {
        match tree.item(reference).value().graph_link() {
            Some(link) => Self {
                target: link.target,
                pending: link.pending_guid.clone(),
            },
            None => Self::default(),
        }
    }

    pub fn to(target: ItemId) -> Self {
        Self {
            target: Some(target),
            pending: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEdit {
    SetValue {
        item: ItemId,
        old: ItemValue,
        new: ItemValue,
    },
    SetChildren {
        owner: ItemId,
        old: Vec<ItemId>,
        new: Vec<ItemId>,
    },
    SetAttributes {
        owner: ItemId,
        old: Vec<ItemId>,
        new: Vec<ItemId>,
    },
    SetLink {
        reference: ItemId,
        old: LinkState,
        new: LinkState,
    },
    SetLinkType {
        reference: ItemId,
        old: LinkType,
        new: LinkType,
    },
    Register {
        node: ItemId,
    },
    Unregister {
        node: ItemId,
    },
}

impl TreeEdit {
    /// Replace `item`'s value with `new`, remembering the current one.
    pub fn set_value(tree: &DataTree, item: ItemId, new: ItemValue) -> Self {
        TreeEdit::SetValue {
            item,
            old: tree.item(item).value().clone(),
            new,
        }
    }

    pub fn set_children(tree: &DataTree, owner: ItemId, new: Vec<ItemId>) -> Self {
        TreeEdit::SetChildren {
            owner,
            old: tree.item(owner).children().to_vec(),
            new,
        }
    }

    pub fn set_attributes(tree: &DataTree, owner: ItemId, new: Vec<ItemId>) -> Self {
        TreeEdit::SetAttributes {
            owner,
            old: tree.item(owner).attributes().to_vec(),
            new,
        }
    }

    pub fn set_link(tree: &DataTree, reference: ItemId, new: LinkState) -> Self {
        TreeEdit::SetLink {
            reference,
            old: LinkState::of(tree, reference),
            new,
        }
    }

    pub fn apply(&self, tree: &mut DataTree) {
        match self {
            TreeEdit::SetValue { item, new, .. } => tree.set_value(*item, new.clone()),
            TreeEdit::SetChildren { owner, new, .. } => tree.set_children(*owner, new.clone()),
            TreeEdit::SetAttributes { owner, new, .. } => tree.set_attributes(*owner, new.clone()),
            TreeEdit::SetLink { reference, new, .. } => {
                tree.set_link(*reference, new.target, new.pending.clone())
            }
            TreeEdit::SetLinkType { reference, new, .. } => tree.set_link_type(*reference, *new),
            TreeEdit::Register { node } => tree.register_node(*node),
            TreeEdit::Unregister { node } => tree.unregister_node(*node),
        }
    }

    /// Every item the edit can touch or restore, link targets included.
    pub fn items(&self) -> Vec<ItemId> {
        match self {
            TreeEdit::SetValue { item, .. } => vec![*item],
            TreeEdit::SetChildren { owner, old, new }
            | TreeEdit::SetAttributes { owner, old, new } => std::iter::once(*owner)
                .chain(old.iter().copied())
                .chain(new.iter().copied())
                .collect(),
            TreeEdit::SetLink { reference, old, new } => std::iter::once(*reference)
                .chain(old.target)
                .chain(new.target)
                .collect(),
            TreeEdit::SetLinkType { reference, .. } => vec![*reference],
            TreeEdit::Register { node } | TreeEdit::Unregister { node } => vec![*node],
        }
    }

    pub fn revert(&self, tree: &mut DataTree) {
        self.inverse().apply(tree);
    }

    pub fn inverse(&self) -> TreeEdit {
        match self.clone() {
            TreeEdit::SetValue { item, old, new } => TreeEdit::SetValue {
                item,
                old: new,
                new: old,
            },
            TreeEdit::SetChildren { owner, old, new } => TreeEdit::SetChildren {
                owner,
                old: new,
                new: old,
            },
            TreeEdit::SetAttributes { owner, old, new } => TreeEdit::SetAttributes {
                owner,
                old: new,
                new: old,
            },
            TreeEdit::SetLink {
                reference,
                old,
                new,
            } => TreeEdit::SetLink {
                reference,
                old: new,
                new: old,
            },
            TreeEdit::SetLinkType {
                reference,
                old,
                new,
            } => TreeEdit::SetLinkType {
                reference,
                old: new,
                new: old,
            },
            TreeEdit::Register { node } => TreeEdit::Unregister { node },
            TreeEdit::Unregister { node } => TreeEdit::Register { node },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use structdoc_schema::Schema;

    fn tree() -> DataTree {
        let schema = Rc::new(
            Schema::parse(
                r#"<Struct Name="C">
                     <String Name="A" Default="a" />
                     <Collection Name="L" MinCount="2"><Number Name="N" /></Collection>
                   </Struct>"#,
            )
            .unwrap(),
        );
        let mut tree = DataTree::new(Rc::clone(&schema));
        let root = tree.create_data(schema.default_root().unwrap());
        tree.set_root(root);
        tree
    }

    #[test]
    fn test_set_value_round_trip() {
        let mut tree = tree();
        let a = tree.find_path("A").unwrap();
        let edit = TreeEdit::set_value(&tree, a, ItemValue::String("b".into()));

        edit.apply(&mut tree);
        assert_eq!(tree.item(a).value(), &ItemValue::String("b".into()));
        edit.revert(&mut tree);
        assert_eq!(tree.item(a).value(), &ItemValue::String("a".into()));
    }

    #[test]
    fn test_set_children_round_trip() {
        let mut tree = tree();
        let list = tree.find_path("L").unwrap();
        let before = tree.item(list).children().to_vec();
        let reversed: Vec<ItemId> = before.iter().rev().copied().collect();
        let edit = TreeEdit::set_children(&tree, list, reversed.clone());

        edit.apply(&mut tree);
        assert_eq!(tree.item(list).children(), reversed.as_slice());
        assert_eq!(tree.item(reversed[0]).index(), 0);

        edit.revert(&mut tree);
        assert_eq!(tree.item(list).children(), before.as_slice());
        assert_eq!(tree.item(before[1]).index(), 1);
    }

    #[test]
    fn test_inverse_of_register_is_unregister() {
        let edit = TreeEdit::Register { node: ItemId(3) };
        assert_eq!(edit.inverse(), TreeEdit::Unregister { node: ItemId(3) });
        assert_eq!(edit.items(), vec![ItemId(3)]);
        assert_eq!(edit.inverse().inverse(), edit);
    }
}
