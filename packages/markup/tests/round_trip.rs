//! Round-trip tests: parse → serialize → parse must reproduce the tree.

use structdoc_markup::{parse, serialize_document, Element, Node};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Graph xmlns:meta="structdoc-meta">
  <Start RefKey="State" meta:X="0" meta:Y="0">
    <Name>Idle</Name>
    <Next RefKey="State" meta:X="300" meta:Y="0">
      <Name>Walk &gt; Run</Name>
    </Next>
  </Start>
  <!-- shared nodes -->
  <Nodes>
    <State GUID="0b8e" meta:X="600" meta:Y="0"><Name>Shared</Name></State>
  </Nodes>
</Graph>
"#;

#[test]
fn test_document_survives_round_trip() {
    let first = parse(DOCUMENT).unwrap();
    let written = serialize_document(&first);
    let second = parse(&written).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_structure_is_preserved() {
    let root = parse(DOCUMENT).unwrap();

    let start = root.element("Start").unwrap();
    assert_eq!(start.attribute("RefKey"), Some("State"));
    let next = start.element("Next").unwrap();
    assert_eq!(next.element("Name").unwrap().text(), "Walk > Run");

    assert!(matches!(root.children[1], Node::Comment(ref c) if c == "shared nodes"));
    let store: Vec<&Element> = root.element("Nodes").unwrap().elements().collect();
    assert_eq!(store.len(), 1);
    assert_eq!(store[0].attribute("GUID"), Some("0b8e"));
}
