//! Schema loading in two passes.
//!
//! ## Design
//!
//! - `add_source` parses definition markup into the arena and records each
//!   source's top-level names in a local dictionary; `*DEF` tags also go in
//!   the global dictionary
//! - `finish` walks every top-level definition and resolves Enum `Key` and
//!   Reference `Keys`, local dictionary first
//! - A missing enum key is a warning; a missing reference key is an error

use crate::colour::Colour;
use crate::definition::{
    BooleanDefinition, CollectionChildDefinition, CollectionDefinition, ColourDefinition, DefId,
    Definition, DefinitionKind, EnumDefinition, FileDefinition, GraphNodeOptions,
    GraphReferenceDefinition, NumberDefinition, PairDefinition, ReferenceDefinition,
    StringDefinition, StructDefinition, TreeDefinition,
};
use crate::error::{SchemaError, SchemaResult, SchemaWarning};
use crate::expression::Expression;
use crate::schema::Schema;
use std::collections::HashMap;
use std::str::FromStr;
use structdoc_markup::Element;
use tracing::{debug, info, warn};

const CONTAINER_TAG: &str = "Definitions";
const ATTRIBUTES_TAG: &str = "Attributes";

#[derive(Debug, Default)]
struct SourceScope {
    name: String,
    top_level: Vec<DefId>,
    local: HashMap<String, DefId>,
}

/// Accumulates schema sources, then resolves them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaLoader {
    definitions: Vec<Definition>,
    sources: Vec<SourceScope>,
    roots: Vec<DefId>,
    global: HashMap<String, DefId>,
    warnings: Vec<SchemaWarning>,
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one schema source. Its root is a single definition or a
    /// `<Definitions>` container of definitions.
    pub fn add_source(&mut self, source_name: &str, text: &str) -> SchemaResult<()> {
        let element = structdoc_markup::parse(text).map_err(|error| SchemaError::Markup {
            source_name: source_name.to_string(),
            error,
        })?;
        self.add_element(source_name, &element)
    }

    pub fn add_element(&mut self, source_name: &str, element: &Element) -> SchemaResult<()> {
        let top_elements: Vec<&Element> = if element.name.eq_ignore_ascii_case(CONTAINER_TAG) {
            element.elements().collect()
        } else {
            vec![element]
        };

        let mut scope = SourceScope {
            name: source_name.to_string(),
            ..SourceScope::default()
        };

        for top in top_elements {
            let id = self.parse_definition(top)?;
            let key = self.definitions[id.0].name.to_ascii_lowercase();
            scope.local.insert(key.clone(), id);
            scope.top_level.push(id);

            if top.name.to_ascii_uppercase().ends_with("DEF") {
                if let Some(previous) = self.global.insert(key, id) {
                    warn!(
                        name = %self.definitions[id.0].name,
                        previous = previous.0,
                        "global definition redefined"
                    );
                }
            } else {
                self.roots.push(id);
            }
        }

        debug!(
            source = %scope.name,
            definitions = scope.top_level.len(),
            "schema source parsed"
        );
        self.sources.push(scope);
        Ok(())
    }

    /// Resolution pass. Consumes the loader.
    pub fn finish(mut self) -> SchemaResult<Schema> {
        for scope in 0..self.sources.len() {
            let top_level = self.sources[scope].top_level.clone();
            for id in top_level {
                self.resolve_recursive(id, scope)?;
            }
        }

        let comment = self.alloc(Definition {
            name: "Comment".to_string(),
            visible_if: None,
            skip_if_default: true,
            kind: DefinitionKind::Comment,
        });

        let mut graph_nodes = HashMap::new();
        for (index, def) in self.definitions.iter().enumerate() {
            if def.is_graph_node() {
                graph_nodes.entry(def.name.clone()).or_insert(DefId(index));
            }
        }

        info!(
            definitions = self.definitions.len(),
            roots = self.roots.len(),
            warnings = self.warnings.len(),
            "schema loaded"
        );

        Ok(Schema {
            definitions: self.definitions,
            roots: self.roots,
            global: self.global,
            graph_nodes,
            comment,
            warnings: self.warnings,
        })
    }

    fn alloc(&mut self, definition: Definition) -> DefId {
        self.definitions.push(definition);
        DefId(self.definitions.len() - 1)
    }

    fn parse_definition(&mut self, element: &Element) -> SchemaResult<DefId> {
        let tag = element.name.to_ascii_uppercase();
        let name = element
            .attribute_ignore_case("Name")
            .ok_or_else(|| SchemaError::missing_attribute(&element.name, "Name"))?
            .to_string();

        let visible_if = match element.attribute_ignore_case("VisibleIf") {
            Some(source) if !source.trim().is_empty() => Some(
                Expression::parse(source).map_err(|error| SchemaError::InvalidExpression {
                    owner: name.clone(),
                    error,
                })?,
            ),
            _ => None,
        };
        let skip_if_default = parse_or(element, &name, "SkipIfDefault", true);

        let kind = match tag.as_str() {
            "STRING" | "MULTILINESTRING" => DefinitionKind::String(StringDefinition {
                default: text_attr(element, "Default").unwrap_or_default(),
                max_length: element
                    .attribute_ignore_case("MaxLength")
                    .and_then(|value| value.trim().parse().ok()),
                multiline: tag == "MULTILINESTRING",
            }),
            "NUMBER" => DefinitionKind::Number(parse_number(element, &name)),
            "BOOLEAN" => DefinitionKind::Boolean(BooleanDefinition {
                default: parse_or(element, &name, "Default", false),
            }),
            "COLOUR" => DefinitionKind::Colour(ColourDefinition {
                default: parse_or(element, &name, "Default", Colour::WHITE),
            }),
            "ENUM" | "ENUMDEF" => DefinitionKind::Enum(parse_enum(element)),
            "FILE" => DefinitionKind::File(FileDefinition {
                default: text_attr(element, "Default").unwrap_or_default(),
                base_path: text_attr(element, "BasePath"),
                allowed_extensions: element
                    .attribute_ignore_case("AllowedFileTypes")
                    .map(split_list)
                    .unwrap_or_default(),
            }),
            "PAIR" => DefinitionKind::Pair(PairDefinition {
                default_key: text_attr(element, "Key").unwrap_or_else(|| name.clone()),
                default_value: text_attr(element, "Default").unwrap_or_default(),
            }),
            "STRUCT" | "STRUCTDEF" => DefinitionKind::Struct(self.parse_struct(element, &name)?),
            "GRAPHSTRUCT" | "GRAPHSTRUCTDEF" => DefinitionKind::GraphStruct(
                self.parse_struct(element, &name)?,
                parse_graph_options(element, &name),
            ),
            "COLLECTION" => DefinitionKind::Collection(self.parse_collection(element, &name)?),
            "GRAPHCOLLECTION" | "GRAPHCOLLECTIONDEF" => DefinitionKind::GraphCollection(
                self.parse_collection(element, &name)?,
                parse_graph_options(element, &name),
            ),
            "REFERENCE" => DefinitionKind::Reference(ReferenceDefinition {
                keys: required_keys(element)?,
                definitions: Vec::new(),
                nullable: parse_or(element, &name, "Nullable", true),
            }),
            "GRAPHREFERENCE" => DefinitionKind::GraphReference(GraphReferenceDefinition {
                keys: required_keys(element)?,
                definitions: Vec::new(),
            }),
            "TREE" => {
                let mut node_definitions = Vec::new();
                for child in element.elements() {
                    node_definitions.push(self.parse_definition(child)?);
                }
                DefinitionKind::Tree(TreeDefinition { node_definitions })
            }
            _ => {
                return Err(SchemaError::UnknownKind {
                    tag: element.name.clone(),
                })
            }
        };

        Ok(self.alloc(Definition {
            name,
            visible_if,
            skip_if_default,
            kind,
        }))
    }

    fn parse_struct(&mut self, element: &Element, name: &str) -> SchemaResult<StructDefinition> {
        let mut def = StructDefinition {
            description_child: text_attr(element, "DescriptionChild"),
            ..StructDefinition::default()
        };
        for child in element.elements() {
            if child.name.eq_ignore_ascii_case(ATTRIBUTES_TAG) {
                def.attributes = self.parse_attributes(child, name)?;
            } else {
                def.children.push(self.parse_definition(child)?);
            }
        }
        Ok(def)
    }

    fn parse_collection(
        &mut self,
        element: &Element,
        name: &str,
    ) -> SchemaResult<CollectionDefinition> {
        let mut def = CollectionDefinition {
            min_count: parse_or(element, name, "MinCount", 0),
            max_count: parse_or(element, name, "MaxCount", usize::MAX),
            children_are_unique: parse_or(element, name, "ChildrenAreUnique", false),
            ..CollectionDefinition::default()
        };
        for child in element.elements() {
            if child.name.eq_ignore_ascii_case(ATTRIBUTES_TAG) {
                def.attributes = self.parse_attributes(child, name)?;
                continue;
            }
            let wrapped = self.parse_definition(child)?;
            let wrapped_name = self.definitions[wrapped.0].name.clone();
            let wrapper = self.alloc(Definition {
                name: wrapped_name,
                visible_if: None,
                skip_if_default: true,
                kind: DefinitionKind::CollectionChild(CollectionChildDefinition { wrapped }),
            });
            def.child_definitions.push(wrapper);
        }
        if def.min_count > def.max_count {
            return Err(SchemaError::invalid_attribute(
                name,
                "MinCount",
                def.min_count.to_string(),
            ));
        }
        Ok(def)
    }

    fn parse_attributes(&mut self, element: &Element, owner: &str) -> SchemaResult<Vec<DefId>> {
        let mut attributes = Vec::new();
        for child in element.elements() {
            let id = self.parse_definition(child)?;
            if !self.definitions[id.0].is_primitive() {
                return Err(SchemaError::invalid_attribute(owner, ATTRIBUTES_TAG, &child.name));
            }
            attributes.push(id);
        }
        Ok(attributes)
    }

    /// Definitions owned by `id`; resolved references are not followed.
    fn owned_children(&self, id: DefId) -> Vec<DefId> {
        let def = &self.definitions[id.0];
        match &def.kind {
            DefinitionKind::Struct(s) | DefinitionKind::GraphStruct(s, _) => {
                s.children.iter().chain(&s.attributes).copied().collect()
            }
            DefinitionKind::Collection(c) | DefinitionKind::GraphCollection(c, _) => {
                c.child_definitions.iter().chain(&c.attributes).copied().collect()
            }
            DefinitionKind::CollectionChild(child) => vec![child.wrapped],
            DefinitionKind::Tree(tree) => tree.node_definitions.clone(),
            _ => Vec::new(),
        }
    }

    fn lookup(&self, scope: usize, key: &str) -> Option<DefId> {
        let key = key.trim().to_ascii_lowercase();
        self.sources[scope]
            .local
            .get(&key)
            .or_else(|| self.global.get(&key))
            .copied()
    }

    fn resolve_recursive(&mut self, id: DefId, scope: usize) -> SchemaResult<()> {
        let owner = self.definitions[id.0].name.clone();

        match &self.definitions[id.0].kind {
            DefinitionKind::Enum(def) => {
                if let Some(key) = def.key.clone() {
                    self.resolve_enum(id, scope, &owner, &key);
                }
            }
            DefinitionKind::Reference(def) => {
                let keys = def.keys.clone();
                let resolved = self.resolve_keys(scope, &owner, &keys, |def| {
                    !matches!(
                        def.kind,
                        DefinitionKind::CollectionChild(_) | DefinitionKind::Comment
                    )
                })?;
                if let DefinitionKind::Reference(def) = &mut self.definitions[id.0].kind {
                    def.definitions = resolved;
                }
            }
            DefinitionKind::GraphReference(def) => {
                let keys = def.keys.clone();
                let resolved = self.resolve_keys(scope, &owner, &keys, Definition::is_graph_node)?;
                if let DefinitionKind::GraphReference(def) = &mut self.definitions[id.0].kind {
                    def.definitions = resolved;
                }
            }
            _ => {}
        }

        for child in self.owned_children(id) {
            self.resolve_recursive(child, scope)?;
        }
        Ok(())
    }

    fn resolve_enum(&mut self, id: DefId, scope: usize, owner: &str, key: &str) {
        let source = self.lookup(scope, key).and_then(|target| {
            match &self.definitions[target.0].kind {
                DefinitionKind::Enum(source) => Some(source.values.clone()),
                _ => None,
            }
        });

        match source {
            Some(values) => {
                if let DefinitionKind::Enum(def) = &mut self.definitions[id.0].kind {
                    def.values = values;
                    if def.default.as_ref().is_some_and(|d| !def.values.contains(d)) {
                        def.default = None;
                    }
                }
            }
            None => {
                warn!(owner = %owner, key = %key, "enum key not found, leaving values empty");
                self.warnings.push(SchemaWarning::MissingEnumKey {
                    owner: owner.to_string(),
                    key: key.to_string(),
                });
            }
        }
    }

    fn resolve_keys(
        &self,
        scope: usize,
        owner: &str,
        keys: &[String],
        accepts: impl Fn(&Definition) -> bool,
    ) -> SchemaResult<Vec<(String, DefId)>> {
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            match self.lookup(scope, key) {
                Some(target) if accepts(&self.definitions[target.0]) => {
                    resolved.push((self.definitions[target.0].name.clone(), target));
                }
                _ => {
                    return Err(SchemaError::UnresolvedReference {
                        owner: owner.to_string(),
                        key: key.clone(),
                    })
                }
            }
        }
        Ok(resolved)
    }
}

fn text_attr(element: &Element, name: &str) -> Option<String> {
    element.attribute_ignore_case(name).map(str::to_string)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an optional attribute, falling back to `default` on absence or
/// malformed input.
fn parse_or<T: FromStr>(element: &Element, owner: &str, attribute: &str, default: T) -> T {
    match element.attribute_ignore_case(attribute) {
        None => default,
        Some(raw) => match parse_value::<T>(raw) {
            Some(value) => value,
            None => {
                warn!(
                    owner = %owner,
                    attribute = %attribute,
                    value = %raw,
                    "unparseable attribute, using default"
                );
                default
            }
        },
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    let trimmed = raw.trim();
    // Booleans are written in any case in hand-made schemas.
    let lowered = trimmed.to_ascii_lowercase();
    trimmed.parse().ok().or_else(|| lowered.parse().ok())
}

fn parse_number(element: &Element, name: &str) -> NumberDefinition {
    let use_integers = element
        .attribute_ignore_case("Type")
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("INT"));
    let mut def = NumberDefinition {
        default: parse_or(element, name, "Default", 0.0),
        min: parse_or(element, name, "Min", f64::MIN),
        max: parse_or(element, name, "Max", f64::MAX),
        use_integers,
    };
    def.default = def.clamp(def.default);
    def
}

fn parse_enum(element: &Element) -> EnumDefinition {
    let values = match element.attribute_ignore_case("EnumValues") {
        Some(list) => split_list(list),
        None => element
            .text()
            .split(|c| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
    };
    EnumDefinition {
        key: text_attr(element, "Key"),
        values,
        default: text_attr(element, "Default"),
    }
}

fn parse_graph_options(element: &Element, name: &str) -> GraphNodeOptions {
    let defaults = GraphNodeOptions::default();
    GraphNodeOptions {
        allow_reference_links: parse_or(
            element,
            name,
            "AllowReferenceLinks",
            defaults.allow_reference_links,
        ),
        allow_circular_links: parse_or(
            element,
            name,
            "AllowCircularLinks",
            defaults.allow_circular_links,
        ),
        flatten_data: parse_or(element, name, "FlattenData", defaults.flatten_data),
        node_store_name: text_attr(element, "NodeStoreName").unwrap_or(defaults.node_store_name),
        background: element
            .attribute_ignore_case("Background")
            .and_then(|value| value.parse().ok()),
    }
}

fn required_keys(element: &Element) -> SchemaResult<Vec<String>> {
    let keys = element
        .attribute_ignore_case("Keys")
        .map(split_list)
        .unwrap_or_default();
    if keys.is_empty() {
        return Err(SchemaError::missing_attribute(&element.name, "Keys"));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fall_back_on_bad_input() {
        let schema = Schema::parse(
            r#"<Struct Name="S">
                 <Number Name="N" Default="abc" Min="0" Max="10" Type="INT" />
                 <Boolean Name="B" Default="TRUE" />
                 <Colour Name="C" Default="not a colour" />
               </Struct>"#,
        )
        .unwrap();

        let root = schema.default_root().unwrap();
        let children = &schema.definition(root).as_struct().unwrap().children;

        match &schema.definition(children[0]).kind {
            DefinitionKind::Number(n) => {
                assert_eq!(n.default, 0.0);
                assert!(n.use_integers);
                assert_eq!(n.max, 10.0);
            }
            other => panic!("expected number, got {:?}", other),
        }
        match &schema.definition(children[1]).kind {
            DefinitionKind::Boolean(b) => assert!(b.default),
            other => panic!("expected boolean, got {:?}", other),
        }
        match &schema.definition(children[2]).kind {
            DefinitionKind::Colour(c) => assert_eq!(c.default, Colour::WHITE),
            other => panic!("expected colour, got {:?}", other),
        }
    }

    #[test]
    fn test_number_default_is_clamped() {
        let schema = Schema::parse(r#"<Number Name="N" Default="50" Min="0" Max="10" />"#).unwrap();
        match &schema.definition(schema.default_root().unwrap()).kind {
            DefinitionKind::Number(n) => assert_eq!(n.default, 10.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let err = Schema::parse(r#"<Struct><String /></Struct>"#).unwrap_err();
        assert!(matches!(err, SchemaError::MissingAttribute { .. }));
    }

    #[test]
    fn test_attributes_must_be_primitive() {
        let err = Schema::parse(
            r#"<Struct Name="S"><Attributes><Struct Name="Inner" /></Attributes></Struct>"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_collection_min_above_max_is_rejected() {
        let err = Schema::parse(
            r#"<Collection Name="C" MinCount="3" MaxCount="1"><String Name="S" /></Collection>"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_graph_options() {
        let schema = Schema::parse(
            r#"<GraphStruct Name="Graph" AllowCircularLinks="true" FlattenData="true"
                            NodeStoreName="Store" Background="10,20,30,255" />"#,
        )
        .unwrap();
        let options = schema
            .definition(schema.default_root().unwrap())
            .graph_options()
            .unwrap()
            .clone();
        assert!(options.allow_circular_links);
        assert!(options.allow_reference_links);
        assert!(options.flatten_data);
        assert_eq!(options.node_store_name, "Store");
        assert_eq!(options.background, Some(Colour::rgba(10, 20, 30, 255)));
    }
}
