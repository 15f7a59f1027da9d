use crate::ast::{Attribute, Element, Node};
use crate::error::{MarkupError, MarkupResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Parse a markup document into its root element.
///
/// Whitespace-only text between elements is dropped; text inside leaf
/// elements is kept verbatim. Declarations, processing instructions and
/// comments outside the root are ignored.
pub fn parse(source: &str) -> MarkupResult<Element> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let pos = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| MarkupError::xml(pos, e))?;

        match event {
            Event::Start(start) => {
                stack.push(element_from_start(&start, pos)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start, pos)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| MarkupError::UnbalancedClose {
                    pos,
                    found: String::from_utf8_lossy(end.name().as_ref()).into_owned(),
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| MarkupError::xml(pos, e))?;
                if let Some(parent) = stack.last_mut() {
                    if !value.trim().is_empty() {
                        parent.children.push(Node::Text(value.into_owned()));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let value = std::str::from_utf8(&data)?;
                    parent.children.push(Node::Text(value.to_string()));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    let value = std::str::from_utf8(&comment)?;
                    parent.children.push(Node::Comment(value.trim().to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(MarkupError::Unclosed { name: open.name });
    }

    root.ok_or(MarkupError::MissingRoot)
}

fn element_from_start(start: &BytesStart<'_>, pos: u64) -> MarkupResult<Element> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarkupError::xml(pos, e))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| MarkupError::xml(pos, e))?
            .into_owned();
        element.attributes.push(Attribute { name: key, value });
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> MarkupResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_some() => Err(MarkupError::MultipleRoots { name: element.name }),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let root = parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Character Name="Hero">
  <Level>5</Level>
  <Label>Brave &amp; Bold</Label>
  <Empty/>
</Character>"#,
        )
        .unwrap();

        assert_eq!(root.name, "Character");
        assert_eq!(root.attribute("Name"), Some("Hero"));
        assert_eq!(root.elements().count(), 3);
        assert_eq!(root.element("Level").unwrap().text(), "5");
        assert_eq!(root.element("Label").unwrap().text(), "Brave & Bold");
        assert!(root.element("Empty").unwrap().children.is_empty());
    }

    #[test]
    fn test_parse_keeps_comments_inside_root() {
        let root = parse("<Items><!-- first --><Item>1</Item></Items>").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0], Node::Comment("first".to_string()));
    }

    #[test]
    fn test_parse_namespaced_attributes() {
        let root = parse(r#"<Node xmlns:meta="urn:meta" meta:X="10" meta:Y="20"/>"#).unwrap();
        assert_eq!(root.attribute("meta:X"), Some("10"));
        assert_eq!(root.attribute("meta:Y"), Some("20"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(MarkupError::MissingRoot)));
        assert!(matches!(parse("<a><b></a>"), Err(_)));
        assert!(parse("<a>").is_err());
        assert!(matches!(parse("<a/><b/>"), Err(MarkupError::MultipleRoots { .. })));
    }
}
