use crate::definition::{DefId, Definition, DefinitionKind};
use crate::error::{SchemaError, SchemaResult, SchemaWarning};
use crate::loader::SchemaLoader;
use std::collections::HashMap;

/// Compiled, immutable schema.
#[derive(Debug)]
pub struct Schema {
    pub(crate) definitions: Vec<Definition>,
    pub(crate) roots: Vec<DefId>,
    pub(crate) global: HashMap<String, DefId>,
    pub(crate) graph_nodes: HashMap<String, DefId>,
    pub(crate) comment: DefId,
    pub(crate) warnings: Vec<SchemaWarning>,
}

impl Schema {
    /// Compile a schema from a single markup source.
    pub fn parse(source: &str) -> SchemaResult<Schema> {
        let mut loader = SchemaLoader::new();
        loader.add_source("<inline>", source)?;
        loader.finish()
    }

    pub fn definition(&self, id: DefId) -> &Definition {
        &self.definitions[id.0]
    }

    pub fn get(&self, id: DefId) -> Option<&Definition> {
        self.definitions.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefId, &Definition)> {
        self.definitions
            .iter()
            .enumerate()
            .map(|(index, def)| (DefId(index), def))
    }

    /// Top-level non-`DEF` definitions, in load order. Documents are
    /// instantiated from one of these.
    pub fn roots(&self) -> &[DefId] {
        &self.roots
    }

    pub fn root(&self, name: &str) -> Option<DefId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.definition(*id).name.eq_ignore_ascii_case(name))
    }

    pub fn default_root(&self) -> SchemaResult<DefId> {
        self.roots.first().copied().ok_or(SchemaError::NoRootDefinition)
    }

    pub fn require_root(&self, name: &str) -> SchemaResult<DefId> {
        self.root(name).ok_or_else(|| SchemaError::UnknownRoot {
            name: name.to_string(),
        })
    }

    /// Global (`*DEF`) definition by case-insensitive name.
    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.global.get(&name.to_ascii_lowercase()).copied()
    }

    /// Any graph node definition with this name, used to load node stores.
    pub fn graph_node_definition(&self, name: &str) -> Option<DefId> {
        self.graph_nodes.get(name).copied()
    }

    /// Definition shared by every comment item.
    pub fn comment_definition(&self) -> DefId {
        self.comment
    }

    pub fn warnings(&self) -> &[SchemaWarning] {
        &self.warnings
    }

    /// The definition a collection entry or reference ultimately holds.
    pub fn unwrap_collection_child(&self, id: DefId) -> DefId {
        match &self.definition(id).kind {
            DefinitionKind::CollectionChild(child) => child.wrapped,
            _ => id,
        }
    }
}
