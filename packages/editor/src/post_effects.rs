//! # Post-Effect System
//!
//! Tree mutators only record low-level [`ChangeEvent`]s. At the end of every
//! document operation the queued events are handed to the
//! [`PostEffectEngine`], which turns them into host-facing
//! [`Notification`]s and keeps derived state (visibility) current.
//!
//! ## Design
//!
//! - **Synchronous**: events are drained once per operation, no timers.
//! - **Deduplicated**: a burst of events produces each notification once.
//! - **Composable**: each effect sees the whole event batch.

use crate::errors::VisibilityError;
use crate::item::ItemId;
use crate::tree::{ChangeEvent, DataTree};
use crate::visibility::VisibilityEngine;
use serde::Serialize;
use std::collections::HashSet;

/// Change reported to the host after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notification {
    ValueChanged { item: ItemId },
    ChildrenChanged { item: ItemId },
    DescriptionChanged { item: ItemId },
    VisibilityChanged { item: ItemId, visible: bool },
    LinkChanged { item: ItemId },
    RegistryChanged { node: ItemId },
}

/// Reaction to a batch of change events.
pub trait PostEffect: std::fmt::Debug {
    fn analyze(
        &mut self,
        events: &[ChangeEvent],
        tree: &DataTree,
        out: &mut Vec<Notification>,
    ) -> Result<(), VisibilityError>;
}

/// Value, child-list, link and registry notifications, plus description
/// changes for every owner up the chain.
#[derive(Debug, Default)]
pub struct ChangeNotifier;

impl PostEffect for ChangeNotifier {
    fn analyze(
        &mut self,
        events: &[ChangeEvent],
        tree: &DataTree,
        out: &mut Vec<Notification>,
    ) -> Result<(), VisibilityError> {
        let describe = |item: ItemId, out: &mut Vec<Notification>| {
            out.push(Notification::DescriptionChanged { item });
            for ancestor in tree.ancestors(item) {
                out.push(Notification::DescriptionChanged { item: ancestor });
            }
        };

        for event in events {
            match *event {
                ChangeEvent::Value(item) => {
                    out.push(Notification::ValueChanged { item });
                    describe(item, out);
                }
                ChangeEvent::Children(item) => {
                    out.push(Notification::ChildrenChanged { item });
                    describe(item, out);
                }
                ChangeEvent::Link(item) => {
                    out.push(Notification::LinkChanged { item });
                    describe(item, out);
                }
                ChangeEvent::Registry(node) => out.push(Notification::RegistryChanged { node }),
                ChangeEvent::Parent(_) => {}
            }
        }
        Ok(())
    }
}

impl PostEffect for VisibilityEngine {
    fn analyze(
        &mut self,
        events: &[ChangeEvent],
        tree: &DataTree,
        out: &mut Vec<Notification>,
    ) -> Result<(), VisibilityError> {
        let mut recheck = Vec::new();
        for event in events {
            match *event {
                ChangeEvent::Value(item) | ChangeEvent::Link(item) => {
                    recheck.extend(self.dependents_of(item));
                }
                ChangeEvent::Children(item) => {
                    self.invalidate_scope(item);
                    recheck.extend(self.dependents_of(item));
                }
                ChangeEvent::Parent(item) | ChangeEvent::Registry(item) => {
                    self.invalidate_subtree(tree, item);
                }
            }
        }
        for (item, visible) in self.refresh(tree, recheck)? {
            out.push(Notification::VisibilityChanged { item, visible });
        }
        Ok(())
    }
}

/// Runs every effect over a drained event batch.
#[derive(Debug, Default)]
pub struct PostEffectEngine {
    notifier: ChangeNotifier,
    pub(crate) visibility: VisibilityEngine,
}

impl PostEffectEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility(&self) -> &VisibilityEngine {
        &self.visibility
    }

    /// Rebind visibility for a freshly built or reloaded tree.
    pub fn reset(&mut self, tree: &mut DataTree) -> Result<(), VisibilityError> {
        tree.take_events();
        self.visibility.rebuild(tree)
    }

    /// Drain the tree's events and append the resulting notifications.
    pub fn process(
        &mut self,
        tree: &mut DataTree,
        out: &mut Vec<Notification>,
    ) -> Result<(), VisibilityError> {
        let events = tree.take_events();
        if events.is_empty() {
            return Ok(());
        }
        let mut batch = Vec::new();
        self.notifier.analyze(&events, tree, &mut batch)?;
        let result = self.visibility.analyze(&events, tree, &mut batch);

        let mut seen: HashSet<Notification> = out.iter().copied().collect();
        for notification in batch {
            if seen.insert(notification) {
                out.push(notification);
            }
        }
        result
    }
}
