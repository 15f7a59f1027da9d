//! # Visibility Engine
//!
//! Binds each item's `VisibleIf` expression to the items it reads and keeps
//! the computed visibility current as the tree changes.
//!
//! ## Design
//!
//! - A binding caches one resolved target per statement, plus every
//!   container the resolution looked into.
//! - Two reverse indexes drive invalidation: `dependents` (target → owners)
//!   for value changes, `scopes` (container → owners) for child-list changes
//!   that may make a path resolve differently.
//! - Bindings are rebuilt lazily: events only mark owners stale, and
//!   [`VisibilityEngine::refresh`] rebinds and re-evaluates them in one pass.
//! - Type errors (ordering on a non-number, a literal the target cannot hold)
//!   are reported when binding. An unresolved target just evaluates to false.

use crate::errors::VisibilityError;
use crate::item::{ItemId, ItemValue};
use crate::tree::DataTree;
use std::collections::{BTreeSet, HashMap, HashSet};
use structdoc_schema::{Expression, PathSegment, Statement};
use tracing::debug;

#[derive(Debug, Clone)]
struct Binding {
    /// Resolved target per statement, in `Expression::statements` order.
    targets: Vec<Option<ItemId>>,
    dependencies: Vec<ItemId>,
    scopes: Vec<ItemId>,
}

#[derive(Debug, Default)]
pub struct VisibilityEngine {
    bindings: HashMap<ItemId, Binding>,
    dependents: HashMap<ItemId, HashSet<ItemId>>,
    scopes: HashMap<ItemId, HashSet<ItemId>>,
    visible: HashMap<ItemId, bool>,
    stale: BTreeSet<ItemId>,
}

impl VisibilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached visibility. Items without an expression are always visible.
    pub fn is_visible(&self, item: ItemId) -> bool {
        self.visible.get(&item).copied().unwrap_or(true)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Forget everything and bind every attached item from scratch.
    pub fn rebuild(&mut self, tree: &DataTree) -> Result<(), VisibilityError> {
        self.bindings.clear();
        self.dependents.clear();
        self.scopes.clear();
        self.visible.clear();
        self.stale.clear();

        let mut tops = vec![tree.root()];
        tops.extend(tree.graph().nodes().iter().copied());
        for top in tops {
            self.stale.extend(tree.subtree(top));
        }
        self.refresh(tree, std::iter::empty()).map(|_| ())
    }

    /// The item and its owned subtree need rebinding.
    pub fn invalidate_subtree(&mut self, tree: &DataTree, item: ItemId) {
        self.stale.extend(tree.subtree(item));
    }

    /// `container`'s child list changed; paths that looked into it may now
    /// resolve elsewhere.
    pub fn invalidate_scope(&mut self, container: ItemId) {
        if let Some(owners) = self.scopes.get(&container) {
            self.stale.extend(owners.iter().copied());
        }
    }

    /// Owners whose expressions read `target`.
    pub fn dependents_of(&self, target: ItemId) -> Vec<ItemId> {
        self.dependents
            .get(&target)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rebind stale owners, then re-evaluate them and `recheck`. Returns the
    /// owners whose previously known visibility flipped.
    pub fn refresh(
        &mut self,
        tree: &DataTree,
        recheck: impl IntoIterator<Item = ItemId>,
    ) -> Result<Vec<(ItemId, bool)>, VisibilityError> {
        let mut stale = std::mem::take(&mut self.stale).into_iter();
        let mut to_evaluate: BTreeSet<ItemId> = recheck.into_iter().collect();

        while let Some(owner) = stale.next() {
            let expression = tree.definition(owner).visible_if.as_ref();
            match expression {
                Some(expression) if tree.is_attached(owner) => {
                    let binding = match bind(tree, owner, expression) {
                        Ok(binding) => binding,
                        Err(err) => {
                            // The old binding stays; this owner and the rest
                            // are retried on the next refresh.
                            self.stale.insert(owner);
                            self.stale.extend(stale);
                            return Err(err);
                        }
                    };
                    self.unbind(owner);
                    self.index(owner, &binding);
                    self.bindings.insert(owner, binding);
                    to_evaluate.insert(owner);
                }
                _ => {
                    self.unbind(owner);
                    self.visible.remove(&owner);
                }
            }
        }

        let mut changed = Vec::new();
        for owner in to_evaluate {
            let Some(binding) = self.bindings.get(&owner) else {
                continue;
            };
            let Some(expression) = tree.definition(owner).visible_if.as_ref() else {
                continue;
            };
            let visible = evaluate(tree, expression, binding);
            if let Some(previous) = self.visible.insert(owner, visible) {
                if previous != visible {
                    debug!(%owner, visible, "visibility changed");
                    changed.push((owner, visible));
                }
            }
        }
        Ok(changed)
    }

    /// Drop everything held for items the arena reclaimed.
    pub fn forget(&mut self, freed: &HashSet<ItemId>) {
        for item in freed {
            self.unbind(*item);
            self.visible.remove(item);
            self.stale.remove(item);
            self.dependents.remove(item);
            self.scopes.remove(item);
        }
    }

    fn unbind(&mut self, owner: ItemId) {
        let Some(binding) = self.bindings.remove(&owner) else {
            return;
        };
        for target in &binding.dependencies {
            if let Some(owners) = self.dependents.get_mut(target) {
                owners.remove(&owner);
            }
        }
        for scope in &binding.scopes {
            if let Some(owners) = self.scopes.get_mut(scope) {
                owners.remove(&owner);
            }
        }
    }

    fn index(&mut self, owner: ItemId, binding: &Binding) {
        for target in &binding.dependencies {
            self.dependents.entry(*target).or_default().insert(owner);
        }
        for scope in &binding.scopes {
            self.scopes.entry(*scope).or_default().insert(owner);
        }
    }
}

/// Nearest owner that is not a collection, collection entry or reference
/// slot.
fn enclosing_complex(tree: &DataTree, item: ItemId) -> Option<ItemId> {
    tree.ancestors(item).into_iter().find(|ancestor| {
        !matches!(
            tree.item(*ancestor).value(),
            ItemValue::Collection | ItemValue::CollectionChild | ItemValue::Reference
        )
    })
}

/// Where name lookups happen when a path passes through `item`.
fn container_of(tree: &DataTree, item: ItemId) -> ItemId {
    let item = tree.unwrap_item(item);
    tree.link_target(item).map(|node| tree.unwrap_item(node)).unwrap_or(item)
}

fn resolve(
    tree: &DataTree,
    owner: ItemId,
    statement: &Statement,
    binding: &mut Binding,
) -> Option<ItemId> {
    let mut current = enclosing_complex(tree, owner)?;
    let mut found = None;
    for segment in &statement.path {
        match segment {
            PathSegment::Root => {
                current = tree.root();
                found = Some(current);
            }
            PathSegment::Parent => {
                current = enclosing_complex(tree, current)?;
                found = Some(current);
            }
            PathSegment::Name(name) => {
                let container = container_of(tree, current);
                binding.scopes.push(container);
                let item = tree.item(container);
                let hit = item
                    .children()
                    .iter()
                    .chain(item.attributes().iter())
                    .copied()
                    .find(|child| *child != owner && tree.item(*child).name() == name)?;
                current = hit;
                found = Some(hit);
            }
        }
    }
    let target = found?;
    // Wrapper layers between the slot and its payload.
    let mut layer = target;
    binding.dependencies.push(layer);
    while tree.item(layer).value().is_wrapper() {
        binding.scopes.push(layer);
        let Some(inner) = tree.wrapped(layer) else {
            break;
        };
        layer = inner;
        binding.dependencies.push(layer);
    }
    Some(target)
}

fn bind(
    tree: &DataTree,
    owner: ItemId,
    expression: &Expression,
) -> Result<Binding, VisibilityError> {
    let mut binding = Binding {
        targets: Vec::new(),
        dependencies: Vec::new(),
        scopes: Vec::new(),
    };
    for statement in expression.statements() {
        let target = resolve(tree, owner, statement, &mut binding);
        if let Some(target) = target {
            validate(tree, target, statement)?;
        }
        binding.targets.push(target);
    }
    Ok(binding)
}

fn validate(tree: &DataTree, target: ItemId, statement: &Statement) -> Result<(), VisibilityError> {
    let inner = tree.unwrap_item(target);
    let target_name = statement.path_display();
    match tree.item(inner).value() {
        // Empty slot: nothing to compare yet, ordering just reads false.
        ItemValue::Reference => {}
        ItemValue::Number(_) => {
            if statement.literal.trim().parse::<f64>().is_err() {
                return Err(VisibilityError::InvalidLiteral {
                    literal: statement.literal.clone(),
                    target: target_name,
                });
            }
        }
        ItemValue::Boolean(_) => {
            if statement.op.is_ordering() {
                return Err(mismatch(statement, target_name, "Boolean"));
            }
            if parse_bool(&statement.literal).is_none() {
                return Err(VisibilityError::InvalidLiteral {
                    literal: statement.literal.clone(),
                    target: target_name,
                });
            }
        }
        _ if statement.op.is_ordering() => {
            return Err(mismatch(statement, target_name, tree.definition(inner).kind_name()));
        }
        _ => {}
    }
    Ok(())
}

fn mismatch(statement: &Statement, target: String, kind: &'static str) -> VisibilityError {
    VisibilityError::OperatorTypeMismatch {
        op: statement.op.symbol().to_string(),
        target,
        kind,
    }
}

fn parse_bool(literal: &str) -> Option<bool> {
    match literal.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn evaluate(tree: &DataTree, expression: &Expression, binding: &Binding) -> bool {
    let mut targets = binding.targets.iter();
    let mut any_group = false;
    for group in &expression.groups {
        let mut all = true;
        for statement in group {
            let target = targets.next().copied().flatten();
            // Keep consuming targets even after the group has failed.
            all &= evaluate_statement(tree, target, statement);
        }
        any_group |= all;
    }
    any_group
}

fn evaluate_statement(tree: &DataTree, target: Option<ItemId>, statement: &Statement) -> bool {
    let Some(target) = target else {
        return false;
    };

    let item = tree.item(tree.unwrap_item(target));
    // A slot holding a primitive compares by value; otherwise by its choice.
    if matches!(tree.item(target).value(), ItemValue::Reference) && !item.value().is_primitive() {
        if statement.op.is_ordering() {
            return false;
        }
        let payload = tree.wrapped(target);
        let chosen = payload.map(|payload| tree.item(payload).name().to_string());
        return compare_composite(statement, payload.is_some(), chosen.as_deref());
    }

    match item.value() {
        ItemValue::Number(value) => match statement.literal.trim().parse::<f64>() {
            Ok(literal) if statement.op.is_ordering() => {
                statement.op.compare_numbers(*value, literal)
            }
            Ok(literal) => statement.op.apply_equality(*value == literal),
            Err(_) => false,
        },
        ItemValue::Boolean(value) => match parse_bool(&statement.literal) {
            Some(literal) => statement.op.apply_equality(*value == literal),
            None => false,
        },
        ItemValue::String(text) | ItemValue::Enum(text) | ItemValue::File(text) => {
            compare_text(statement, text)
        }
        ItemValue::Pair { value, .. } | ItemValue::Comment(value) => compare_text(statement, value),
        ItemValue::Colour(colour) => compare_text(statement, &colour.to_string()),
        ItemValue::GraphReference(link) => {
            compare_composite(statement, link.target.is_some(), None)
        }
        _ => compare_composite(statement, item.has_content(), None),
    }
}

fn compare_text(statement: &Statement, text: &str) -> bool {
    let equal = if statement.literal_is_null() {
        text.is_empty()
    } else {
        statement.literal_matches(text)
    };
    statement.op.apply_equality(equal)
}

fn compare_composite(statement: &Statement, has_content: bool, chosen: Option<&str>) -> bool {
    let equal = if statement.literal_is_null() {
        !has_content
    } else if let Some(literal) = parse_bool(&statement.literal) {
        has_content == literal
    } else {
        chosen.is_some_and(|chosen| statement.literal_matches(chosen))
    };
    statement.op.apply_equality(equal)
}
