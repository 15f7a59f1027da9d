//! Graph nodes: creation, sharing through the node store, link policy and
//! GUID resolution on load.

mod common;

use common::{machine_schema, new_machine};
use std::time::Duration;
use structdoc_editor::{
    Clipboard, Document, EditorError, FilterQuery, GraphError, ItemId, LinkType, ManualClock,
    Notification, UndoRedoLog,
};

fn guid(doc: &Document, node: ItemId) -> String {
    doc.item(node).value().graph_node().unwrap().guid.clone()
}

#[test]
fn test_single_referrer_is_written_inline() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();
    assert_eq!(doc.history_log().undo_description().as_deref(), Some("Create Item"));
    assert_eq!(doc.tree().graph().nodes(), &[node]);

    let label = doc.find("Start/Label").unwrap();
    doc.set_text(label, "walking").unwrap();

    let saved = doc.save().unwrap();
    assert!(saved.contains(r#"<Start RefKey="State" meta:X="0" meta:Y="0">"#), "{saved}");
    assert!(saved.contains("<Label>walking</Label>"), "{saved}");
    assert!(!saved.contains("<Nodes>"), "{saved}");
    assert!(!saved.contains("GUID="), "{saved}");
    assert!(saved.contains("xmlns:meta="), "{saved}");

    let reloaded = Document::load(machine_schema(), &saved).unwrap();
    assert_eq!(reloaded.tree().graph().nodes().len(), 1);
    let label = reloaded.find("Start/Label").unwrap();
    assert_eq!(reloaded.value_text(label).as_deref(), Some("walking"));
}

#[test]
fn test_new_nodes_are_placed_right_of_their_creator() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let first = doc.create_graph_node(start, None).unwrap();
    doc.set_node_position(first, 40.0, 25.0).unwrap();

    let next = doc.find("Start/Next").unwrap();
    let second = doc.create_graph_node(next, Some("State")).unwrap();
    let data = doc.item(second).value().graph_node().unwrap();
    assert_eq!((data.x, data.y), (340.0, 25.0));
    assert_ne!(guid(&doc, first), guid(&doc, second));
}

#[test]
fn test_shared_node_is_stored_once() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let fallback = doc.find("Fallback").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();

    doc.set_link_type(fallback, LinkType::Reference).unwrap();
    assert!(doc
        .history_log()
        .undo_description()
        .unwrap()
        .ends_with("Change LinkType from Duplicate to Reference"));
    doc.link_graph_reference(fallback, node).unwrap();

    let id = guid(&doc, node);
    let saved = doc.save().unwrap();
    assert_eq!(saved.matches("<State ").count(), 1, "{saved}");
    assert!(saved.contains("<Nodes>"), "{saved}");
    assert!(saved.contains(&format!(r#"GUID="{id}""#)), "{saved}");
    assert!(saved.contains(&format!("<Start>{id}</Start>")), "{saved}");
    assert!(
        saved.contains(&format!(r#"<Fallback meta:LinkType="Reference">{id}</Fallback>"#)),
        "{saved}"
    );

    let reloaded = Document::load(machine_schema(), &saved).unwrap();
    let tree = reloaded.tree();
    let start = reloaded.find("Start").unwrap();
    let fallback = reloaded.find("Fallback").unwrap();
    let target = tree.link_target(start).unwrap();
    assert_eq!(tree.link_target(fallback), Some(target));
    assert_eq!(tree.link_type(fallback), Some(LinkType::Reference));
    assert_eq!(guid(&reloaded, target), id);
    assert!(tree.graph().pending().is_empty());
    assert_eq!(reloaded.save().unwrap(), saved);
}

#[test]
fn test_duplicate_cycles_are_rejected() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();
    let next = doc.find("Start/Next").unwrap();

    let err = doc.link_graph_reference(next, node).unwrap_err();
    assert!(matches!(
        err,
        EditorError::Graph(GraphError::CircularLink { .. })
    ));

    // circular links are allowed by the machine, but only as references
    doc.set_link_type(next, LinkType::Reference).unwrap();
    doc.link_graph_reference(next, node).unwrap();
    assert_eq!(doc.tree().link_target(next), Some(node));
    assert!(matches!(
        doc.set_link_type(next, LinkType::Duplicate),
        Err(EditorError::Graph(GraphError::CircularLink { .. }))
    ));
}

#[test]
fn test_reference_links_can_be_disabled() {
    let schema = std::rc::Rc::new(
        structdoc_editor::Schema::parse(
            r#"<Definitions>
                 <GraphStructDef Name="State"><GraphReference Name="Next" Keys="State" /></GraphStructDef>
                 <GraphStruct Name="Machine" AllowReferenceLinks="false">
                   <GraphReference Name="Start" Keys="State" />
                 </GraphStruct>
               </Definitions>"#,
        )
        .unwrap(),
    );
    let mut doc = Document::new(schema, None).unwrap();
    let start = doc.find("Start").unwrap();
    doc.create_graph_node(start, None).unwrap();
    assert!(matches!(
        doc.set_link_type(start, LinkType::Reference),
        Err(EditorError::Graph(GraphError::ReferenceLinksDisabled))
    ));
}

#[test]
fn test_clear_keeps_the_node_registered() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();

    doc.clear_graph_reference(start).unwrap();
    assert!(doc.history_log().undo_description().unwrap().ends_with("Clear Item"));
    assert_eq!(doc.tree().link_target(start), None);
    assert!(doc.tree().graph().contains(node));

    // an orphan is kept in the store so it is not lost
    let saved = doc.save().unwrap();
    assert!(saved.contains("<Nodes>"), "{saved}");
    assert!(!saved.contains("<Start"), "{saved}");
}

#[test]
fn test_delete_clears_every_referrer() {
    let clock = ManualClock::new();
    let mut doc = new_machine().with_history(UndoRedoLog::with_clock(Box::new(clock.clone())));
    let start = doc.find("Start").unwrap();
    let fallback = doc.find("Fallback").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();
    doc.set_link_type(fallback, LinkType::Reference).unwrap();
    doc.link_graph_reference(fallback, node).unwrap();
    doc.drain_notifications();

    clock.advance(Duration::from_secs(1));
    doc.delete_graph_node(node).unwrap();
    assert!(doc.tree().graph().nodes().is_empty());
    assert_eq!(doc.tree().link_target(start), None);
    assert_eq!(doc.tree().link_target(fallback), None);
    let notifications = doc.drain_notifications();
    assert!(notifications.contains(&Notification::RegistryChanged { node }));
    assert!(notifications.contains(&Notification::LinkChanged { item: fallback }));

    doc.undo().unwrap();
    assert_eq!(doc.tree().graph().nodes(), &[node]);
    assert_eq!(doc.tree().link_target(start), Some(node));
    assert_eq!(doc.tree().link_target(fallback), Some(node));
}

#[test]
fn test_undo_of_create_unregisters() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    doc.create_graph_node(start, None).unwrap();

    doc.undo().unwrap();
    assert!(doc.tree().graph().nodes().is_empty());
    assert_eq!(doc.tree().link_target(start), None);

    doc.redo().unwrap();
    assert_eq!(doc.tree().graph().nodes().len(), 1);
    assert!(doc.tree().link_target(start).is_some());
}

#[test]
fn test_guid_collision_fails_the_save() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let fallback = doc.find("Fallback").unwrap();
    doc.set_link_type(start, LinkType::Reference).unwrap();
    doc.set_link_type(fallback, LinkType::Reference).unwrap();
    let first = doc.create_graph_node(start, None).unwrap();
    let second = doc.create_graph_node(fallback, None).unwrap();

    let id = guid(&doc, first);
    doc.set_node_guid(second, &id).unwrap();
    assert!(matches!(
        doc.save(),
        Err(EditorError::SaveGuidCollision { guid }) if guid == id
    ));
}

#[test]
fn test_unresolved_guid_stays_pending() {
    let doc = Document::load(
        machine_schema(),
        r#"<Machine meta:X="0" meta:Y="0" xmlns:meta="structdoc/meta"><Start>missing-guid</Start></Machine>"#,
    )
    .unwrap();
    let start = doc.find("Start").unwrap();
    assert_eq!(doc.tree().link_target(start), None);
    assert_eq!(doc.tree().graph().pending(), &[start]);
    assert_eq!(doc.description(start), "Unset");

    // the marker survives a save
    let saved = doc.save().unwrap();
    assert!(saved.contains("<Start>missing-guid</Start>"), "{saved}");
}

#[test]
fn test_node_comments_round_trip() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let node = doc.create_graph_node(start, None).unwrap();
    doc.set_node_comment(node, Some("entry point".into()), None).unwrap();

    let saved = doc.save().unwrap();
    assert!(saved.contains(r#"meta:Comment="entry point""#), "{saved}");

    let reloaded = Document::load(machine_schema(), &saved).unwrap();
    let target = reloaded.tree().link_target(reloaded.find("Start").unwrap()).unwrap();
    let data = reloaded.item(target).value().graph_node().unwrap();
    assert_eq!(data.comment.as_deref(), Some("entry point"));
}

#[test]
fn test_shared_node_outlives_one_referrer() {
    let mut doc = new_machine();
    let start = doc.find("Start").unwrap();
    let fallback = doc.find("Fallback").unwrap();
    doc.set_link_type(start, LinkType::Reference).unwrap();
    doc.set_link_type(fallback, LinkType::Reference).unwrap();
    let node = doc.create_graph_node(start, None).unwrap();
    doc.link_graph_reference(fallback, node).unwrap();

    doc.clear_graph_reference(start).unwrap();
    assert!(doc.tree().graph().contains(node));
    assert_eq!(doc.tree().live_referrers(node), vec![fallback]);

    let id = guid(&doc, node);
    let saved = doc.save().unwrap();
    assert_eq!(saved.matches(&format!(r#"GUID="{id}""#)).count(), 1, "{saved}");
    assert!(!saved.contains("<Start"), "{saved}");
}

/// Start → A → B by duplicate links, with Fallback also holding B so it is
/// written as a GUID marker.
fn shared_chain() -> (Document, ItemId, ItemId) {
    let mut doc = new_machine().with_clipboard(Clipboard::new());
    let start = doc.find("Start").unwrap();
    let fallback = doc.find("Fallback").unwrap();
    doc.create_graph_node(start, None).unwrap();
    let a_next = doc.find("Start/Next").unwrap();
    let b = doc.create_graph_node(a_next, None).unwrap();
    doc.set_link_type(fallback, LinkType::Reference).unwrap();
    doc.link_graph_reference(fallback, b).unwrap();
    (doc, a_next, b)
}

#[test]
fn test_pasted_marker_cannot_close_a_duplicate_cycle() {
    let (mut doc, a_next, b) = shared_chain();
    doc.copy(a_next).unwrap();
    let b_next = doc.find("Start/Next/Next").unwrap();
    let levels = doc.history_log().undo_levels();

    let err = doc.paste(b_next).unwrap_err();
    assert!(matches!(
        err,
        EditorError::Graph(GraphError::CircularLink { .. })
    ));
    assert_eq!(doc.tree().link_target(b_next), None);
    assert_eq!(doc.history_log().undo_levels(), levels);
    assert_eq!(doc.tree().graph().link_parents(b).len(), 2);

    assert!(doc.filter(Some(&FilterQuery::new("idle"))));
    assert!(!doc.filter(Some(&FilterQuery::new("nothing-matches"))));
}

#[test]
fn test_pasted_link_leaves_no_detached_referrer() {
    let (mut doc, a_next, b) = shared_chain();
    let fallback = doc.find("Fallback").unwrap();
    doc.copy(fallback).unwrap();
    assert!(doc.paste(fallback).unwrap());
    assert_eq!(doc.tree().link_target(fallback), Some(b));
    assert_eq!(
        doc.tree().graph().link_parents(b).to_vec(),
        doc.tree().live_referrers(b)
    );

    doc.delete_graph_node(b).unwrap();
    assert!(doc.tree().graph().link_parents(b).is_empty());
    assert_eq!(doc.tree().link_target(a_next), None);
    assert_eq!(doc.tree().link_target(fallback), None);

    doc.undo().unwrap();
    assert_eq!(doc.tree().link_target(a_next), Some(b));
    assert_eq!(doc.tree().link_target(fallback), Some(b));
    assert_eq!(doc.tree().live_referrers(b).len(), 2);
    doc.redo().unwrap();
    assert!(!doc.tree().graph().contains(b));
}
