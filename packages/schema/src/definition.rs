//! Definition kinds.
//!
//! A [`Definition`] is the compiled form of one schema element. Nested
//! definitions (struct children, attributes, collection entries) are owned by
//! the [`Schema`](crate::Schema) arena and addressed by [`DefId`]; resolved
//! keys (enum sources, reference targets) are plain `DefId`s into the same
//! arena.

use crate::colour::Colour;
use crate::expression::Expression;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DefId(pub(crate) usize);

impl DefId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub visible_if: Option<Expression>,
    /// When true (the default) attributes equal to their default are not
    /// written on save.
    pub skip_if_default: bool,
    pub kind: DefinitionKind,
}

#[derive(Debug, Clone)]
pub enum DefinitionKind {
    String(StringDefinition),
    Number(NumberDefinition),
    Boolean(BooleanDefinition),
    Colour(ColourDefinition),
    Enum(EnumDefinition),
    File(FileDefinition),
    Pair(PairDefinition),
    Comment,
    Struct(StructDefinition),
    Collection(CollectionDefinition),
    CollectionChild(CollectionChildDefinition),
    Reference(ReferenceDefinition),
    Tree(TreeDefinition),
    GraphStruct(StructDefinition, GraphNodeOptions),
    GraphCollection(CollectionDefinition, GraphNodeOptions),
    GraphReference(GraphReferenceDefinition),
}

#[derive(Debug, Clone, Default)]
pub struct StringDefinition {
    pub default: String,
    pub max_length: Option<usize>,
    pub multiline: bool,
}

#[derive(Debug, Clone)]
pub struct NumberDefinition {
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub use_integers: bool,
}

impl NumberDefinition {
    /// Clamp into `[min, max]`, rounding first when the number is integral.
    pub fn clamp(&self, value: f64) -> f64 {
        let value = if self.use_integers { value.round() } else { value };
        value.max(self.min).min(self.max)
    }

    pub fn format(&self, value: f64) -> String {
        if self.use_integers {
            format!("{}", value.round() as i64)
        } else {
            format!("{}", value)
        }
    }
}

impl Default for NumberDefinition {
    fn default() -> Self {
        Self {
            default: 0.0,
            min: f64::MIN,
            max: f64::MAX,
            use_integers: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BooleanDefinition {
    pub default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ColourDefinition {
    pub default: Colour,
}

#[derive(Debug, Clone, Default)]
pub struct EnumDefinition {
    /// Name of an `EnumDef` to take values from; resolved in the second pass.
    pub key: Option<String>,
    pub values: Vec<String>,
    pub default: Option<String>,
}

impl EnumDefinition {
    pub fn default_value(&self) -> String {
        self.default
            .clone()
            .or_else(|| self.values.first().cloned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileDefinition {
    pub default: String,
    pub base_path: Option<String>,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PairDefinition {
    pub default_key: String,
    pub default_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct StructDefinition {
    pub children: Vec<DefId>,
    pub attributes: Vec<DefId>,
    /// Child whose description stands in for the whole struct.
    pub description_child: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    /// `CollectionChild` wrapper definitions, one per permitted entry kind.
    pub child_definitions: Vec<DefId>,
    pub attributes: Vec<DefId>,
    pub min_count: usize,
    pub max_count: usize,
    pub children_are_unique: bool,
}

impl Default for CollectionDefinition {
    fn default() -> Self {
        Self {
            child_definitions: Vec::new(),
            attributes: Vec::new(),
            min_count: 0,
            max_count: usize::MAX,
            children_are_unique: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionChildDefinition {
    pub wrapped: DefId,
}

#[derive(Debug, Clone)]
pub struct ReferenceDefinition {
    pub keys: Vec<String>,
    /// Resolved `(key, definition)` pairs in key order.
    pub definitions: Vec<(String, DefId)>,
    pub nullable: bool,
}

impl ReferenceDefinition {
    pub fn find(&self, key: &str) -> Option<DefId> {
        self.definitions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, id)| *id)
    }

    /// A payload is created eagerly only when there is exactly one choice and
    /// the slot may not be empty.
    pub fn auto_create(&self) -> Option<DefId> {
        match self.definitions.as_slice() {
            [(_, only)] if !self.nullable => Some(*only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeDefinition {
    pub node_definitions: Vec<DefId>,
}

#[derive(Debug, Clone)]
pub struct GraphNodeOptions {
    pub allow_reference_links: bool,
    pub allow_circular_links: bool,
    pub flatten_data: bool,
    pub node_store_name: String,
    pub background: Option<Colour>,
}

impl Default for GraphNodeOptions {
    fn default() -> Self {
        Self {
            allow_reference_links: true,
            allow_circular_links: false,
            flatten_data: false,
            node_store_name: "Nodes".to_string(),
            background: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphReferenceDefinition {
    pub keys: Vec<String>,
    pub definitions: Vec<(String, DefId)>,
}

impl GraphReferenceDefinition {
    pub fn find(&self, key: &str) -> Option<DefId> {
        self.definitions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, id)| *id)
    }
}

impl Definition {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            DefinitionKind::String(def) if def.multiline => "MultilineString",
            DefinitionKind::String(_) => "String",
            DefinitionKind::Number(_) => "Number",
            DefinitionKind::Boolean(_) => "Boolean",
            DefinitionKind::Colour(_) => "Colour",
            DefinitionKind::Enum(_) => "Enum",
            DefinitionKind::File(_) => "File",
            DefinitionKind::Pair(_) => "Pair",
            DefinitionKind::Comment => "Comment",
            DefinitionKind::Struct(_) => "Struct",
            DefinitionKind::Collection(_) => "Collection",
            DefinitionKind::CollectionChild(_) => "CollectionChild",
            DefinitionKind::Reference(_) => "Reference",
            DefinitionKind::Tree(_) => "Tree",
            DefinitionKind::GraphStruct(..) => "GraphStruct",
            DefinitionKind::GraphCollection(..) => "GraphCollection",
            DefinitionKind::GraphReference(_) => "GraphReference",
        }
    }

    /// Clipboard slot for items of this definition.
    pub fn copy_key(&self) -> String {
        format!("structdoc.{}.{}", self.kind_name(), self.name)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self.kind,
            DefinitionKind::String(_)
                | DefinitionKind::Number(_)
                | DefinitionKind::Boolean(_)
                | DefinitionKind::Colour(_)
                | DefinitionKind::Enum(_)
                | DefinitionKind::File(_)
        )
    }

    pub fn is_graph_node(&self) -> bool {
        matches!(
            self.kind,
            DefinitionKind::GraphStruct(..) | DefinitionKind::GraphCollection(..)
        )
    }

    /// Default value rendered as markup text, for primitive kinds.
    pub fn default_text(&self) -> Option<String> {
        match &self.kind {
            DefinitionKind::String(def) => Some(def.default.clone()),
            DefinitionKind::Number(def) => Some(def.format(def.default)),
            DefinitionKind::Boolean(def) => Some(def.default.to_string()),
            DefinitionKind::Colour(def) => Some(def.default.to_string()),
            DefinitionKind::Enum(def) => Some(def.default_value()),
            DefinitionKind::File(def) => Some(def.default.clone()),
            _ => None,
        }
    }

    /// Attribute definitions of struct-like and collection-like kinds.
    pub fn attributes(&self) -> &[DefId] {
        match &self.kind {
            DefinitionKind::Struct(def) | DefinitionKind::GraphStruct(def, _) => &def.attributes,
            DefinitionKind::Collection(def) | DefinitionKind::GraphCollection(def, _) => {
                &def.attributes
            }
            _ => &[],
        }
    }

    pub fn graph_options(&self) -> Option<&GraphNodeOptions> {
        match &self.kind {
            DefinitionKind::GraphStruct(_, options)
            | DefinitionKind::GraphCollection(_, options) => {
                Some(options)
            }
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionDefinition> {
        match &self.kind {
            DefinitionKind::Collection(def) | DefinitionKind::GraphCollection(def, _) => Some(def),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructDefinition> {
        match &self.kind {
            DefinitionKind::Struct(def) | DefinitionKind::GraphStruct(def, _) => Some(def),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(min: f64, max: f64, use_integers: bool) -> NumberDefinition {
        NumberDefinition {
            default: 0.0,
            min,
            max,
            use_integers,
        }
    }

    #[test]
    fn test_number_clamp_and_format() {
        let def = number(0.0, 10.0, true);
        assert_eq!(def.clamp(12.0), 10.0);
        assert_eq!(def.clamp(-1.0), 0.0);
        assert_eq!(def.clamp(3.6), 4.0);
        assert_eq!(def.format(4.0), "4");

        let def = number(f64::MIN, f64::MAX, false);
        assert_eq!(def.format(0.5), "0.5");
        assert_eq!(def.format(2.0), "2");
    }

    #[test]
    fn test_enum_default_falls_back_to_first_value() {
        let def = EnumDefinition {
            key: None,
            values: vec!["Fire".into(), "Ice".into()],
            default: None,
        };
        assert_eq!(def.default_value(), "Fire");
    }

    #[test]
    fn test_reference_auto_create() {
        let single = ReferenceDefinition {
            keys: vec!["Sword".into()],
            definitions: vec![("Sword".into(), DefId(3))],
            nullable: false,
        };
        assert_eq!(single.auto_create(), Some(DefId(3)));
        assert_eq!(single.find("sword"), Some(DefId(3)));

        let nullable = ReferenceDefinition {
            nullable: true,
            ..single.clone()
        };
        assert_eq!(nullable.auto_create(), None);
    }

    #[test]
    fn test_copy_key_is_type_qualified() {
        let def = Definition {
            name: "Weapon".into(),
            visible_if: None,
            skip_if_default: true,
            kind: DefinitionKind::Struct(StructDefinition::default()),
        };
        assert_eq!(def.copy_key(), "structdoc.Struct.Weapon");
    }
}
