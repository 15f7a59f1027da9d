use crate::ast::{Element, Node};
use quick_xml::escape::escape;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Serializer converts an element tree back to markup text.
///
/// Elements holding only text are written on one line, empty elements are
/// self-closed, everything else is indented one level per depth.
pub struct Serializer {
    indent_level: usize,
    indent_string: String,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_string: "  ".to_string(),
        }
    }

    pub fn with_indent(indent: &str) -> Self {
        Self {
            indent_level: 0,
            indent_string: indent.to_string(),
        }
    }

    /// Serialize a full document, declaration included.
    pub fn serialize_document(&mut self, root: &Element) -> String {
        let mut output = String::from(DECLARATION);
        output.push('\n');
        self.serialize_element(root, &mut output);
        output
    }

    /// Serialize a single element as a fragment.
    pub fn serialize(&mut self, element: &Element) -> String {
        let mut output = String::new();
        self.serialize_element(element, &mut output);
        output
    }

    fn serialize_element(&mut self, element: &Element, output: &mut String) {
        self.write_indent(output);
        output.push('<');
        output.push_str(&element.name);
        for attr in &element.attributes {
            output.push(' ');
            output.push_str(&attr.name);
            output.push_str("=\"");
            output.push_str(&escape(attr.value.as_str()));
            output.push('"');
        }

        if element.children.is_empty() {
            output.push_str(" />\n");
            return;
        }

        let text_only = element
            .children
            .iter()
            .all(|node| matches!(node, Node::Text(_)));
        if text_only {
            output.push('>');
            output.push_str(&escape(element.text().as_str()));
            output.push_str("</");
            output.push_str(&element.name);
            output.push_str(">\n");
            return;
        }

        output.push_str(">\n");
        self.indent_level += 1;
        for node in &element.children {
            match node {
                Node::Element(child) => self.serialize_element(child, output),
                Node::Text(text) => {
                    self.write_indent(output);
                    output.push_str(&escape(text.as_str()));
                    output.push('\n');
                }
                Node::Comment(text) => {
                    self.write_indent(output);
                    output.push_str("<!-- ");
                    output.push_str(&text.replace("--", "- -"));
                    output.push_str(" -->\n");
                }
            }
        }
        self.indent_level -= 1;

        self.write_indent(output);
        output.push_str("</");
        output.push_str(&element.name);
        output.push_str(">\n");
    }

    fn write_indent(&self, output: &mut String) {
        for _ in 0..self.indent_level {
            output.push_str(&self.indent_string);
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to serialize a fragment
pub fn serialize(element: &Element) -> String {
    Serializer::new().serialize(element)
}

/// Convenience function to serialize a document with declaration
pub fn serialize_document(root: &Element) -> String {
    Serializer::new().serialize_document(root)
}
