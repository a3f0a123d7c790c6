use mind_loom::graph_utils::graph::{GraphDocument, Link, MindMapStore, Node, NodeUpdate, SuggestionKind};
use mind_loom::graph_utils::history::MAX_HISTORY_ITEMS;
use mind_loom::graph_utils::node_types::{NodeType, NodeTypeUpdate, DEFAULT_TYPE_ID};
use mind_loom::markup::command_interface::execute_input;
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn new_store() -> MindMapStore {
    MindMapStore::new()
}

fn add(store: &mut MindMapStore, text: &str) -> Uuid {
    store.add_node(Node::new(text, DEFAULT_TYPE_ID)).expect("node should be added")
}

fn texts(store: &MindMapStore) -> Vec<String> {
    store.nodes().iter().map(|n| n.text.clone()).collect()
}

#[test]
fn store_rejects_duplicate_labels_case_insensitively() {
    let mut store = new_store();
    add(&mut store, "Alpha");
    assert!(store.add_node(Node::new("alpha", DEFAULT_TYPE_ID)).is_none());
    assert!(store.add_node(Node::new("  ALPHA ", "task")).is_none());
    assert!(store.add_node(Node::new("   ", DEFAULT_TYPE_ID)).is_none());
    assert_eq!(store.node_count(), 1);
}

#[test]
fn synonyms_count_towards_uniqueness() {
    let mut store = new_store();
    let mut a = Node::new("Car", DEFAULT_TYPE_ID);
    a.synonyms = vec!["Automobile".into()];
    store.add_node(a).unwrap();
    assert!(store.add_node(Node::new("automobile", DEFAULT_TYPE_ID)).is_none());

    let mut b = Node::new("Truck", DEFAULT_TYPE_ID);
    b.synonyms = vec!["car".into()];
    assert!(store.add_node(b).is_none(), "synonym equal to an existing label is rejected");
}

#[test]
fn try_add_node_reports_the_collision() {
    let mut store = new_store();
    add(&mut store, "Plan");
    let err = store.try_add_node(Node::new("plan", DEFAULT_TYPE_ID)).unwrap_err();
    assert!(err.to_string().contains("plan"), "got: {err}");
}

#[test]
fn update_node_keeps_labels_unique() {
    let mut store = new_store();
    let a = add(&mut store, "A");
    add(&mut store, "B");
    let rename = NodeUpdate { text: Some("b".into()), ..Default::default() };
    assert!(!store.update_node(a, rename));
    assert_eq!(store.get_node(a).unwrap().text, "A");

    let ok = NodeUpdate { text: Some("A prime".into()), tags: Some(vec!["X".into(), "x".into()]), ..Default::default() };
    assert!(store.update_node(a, ok));
    let node = store.get_node(a).unwrap();
    assert_eq!(node.text, "A prime");
    assert_eq!(node.tags, vec!["x".to_string()]);
}

#[test]
fn links_require_existing_distinct_endpoints_and_are_unique() {
    let mut store = new_store();
    let a = add(&mut store, "A");
    let b = add(&mut store, "B");
    assert!(store.add_link(a, b));
    assert!(!store.add_link(a, b), "duplicate directed link");
    assert!(store.add_link(b, a), "reverse direction is a different link");
    assert!(!store.add_link(a, a), "self link");
    assert!(!store.add_link(a, Uuid::now_v7()), "dangling target");
    assert_eq!(store.link_count(), 2);
}

#[test]
fn removing_a_node_cascades_to_links_and_selection() {
    let mut store = new_store();
    let a = add(&mut store, "A");
    let b = add(&mut store, "B");
    let c = add(&mut store, "C");
    store.add_link(a, b);
    store.add_link(b, c);
    store.set_selected_node(Some(b));
    assert!(store.remove_node(b));
    assert_eq!(store.link_count(), 0);
    assert_eq!(store.selected_id(), None);
    assert!(!store.remove_node(b));
}

#[test]
fn cleanup_invalid_links_is_idempotent() {
    let a = Node::new("A", DEFAULT_TYPE_ID);
    let b = Node::new("B", DEFAULT_TYPE_ID);
    let ghost = Uuid::now_v7();
    let links = vec![Link::new(a.id, b.id), Link::new(a.id, ghost)];
    let mut store = MindMapStore::from_parts(vec![a, b], links, Vec::new(), Default::default());
    // from_parts already drops the dangling link
    assert_eq!(store.link_count(), 1);
    assert_eq!(store.cleanup_invalid_links(), 0);
    assert_eq!(store.cleanup_invalid_links(), 0);
    assert_eq!(store.link_count(), 1);
}

#[test]
fn chain_creates_nodes_and_links_in_order() {
    let mut store = new_store();
    let outcome = execute_input(&mut store, "A -> B -> C", DEFAULT_TYPE_ID);
    assert_eq!(outcome.created.len(), 3);
    assert_eq!(outcome.links_added, 2);
    assert_eq!(texts(&store), vec!["A", "B", "C"]);
    let id = |t: &str| store.find_by_text_or_synonym(t).unwrap().id;
    assert!(store.has_link(id("A"), id("B")));
    assert!(store.has_link(id("B"), id("C")));
    assert!(!store.has_link(id("A"), id("C")));
}

#[test]
fn multi_line_input_runs_in_document_order() {
    let mut store = new_store();
    let outcome = execute_input(&mut store, "Root -> Left\n\nLeft -> Leaf\n", DEFAULT_TYPE_ID);
    assert_eq!(texts(&store), vec!["Root", "Left", "Leaf"]);
    assert_eq!(outcome.links_added, 2);
    assert_eq!(outcome.merged.len(), 1, "second line reuses Left");
}

#[test]
fn type_prefix_registers_a_new_type() {
    let mut store = new_store();
    let outcome = execute_input(&mut store, "Spike:Try websockets", DEFAULT_TYPE_ID);
    let node = store.find_by_text_or_synonym("Try websockets").unwrap();
    assert_eq!(node.node_type, "spike");
    assert_eq!(outcome.types_registered, vec!["spike".to_string()]);
    assert_eq!(store.get_node_type("spike").unwrap().name, "Spike");

    let again = execute_input(&mut store, "spike:Other", DEFAULT_TYPE_ID);
    assert!(again.types_registered.is_empty());
}

#[test]
fn repeated_label_merges_metadata() {
    let mut store = new_store();
    execute_input(&mut store, "Server ~tags@infra", DEFAULT_TYPE_ID);
    execute_input(
        &mut store,
        "server ~tags@infra,prod ~synonyms@Backend ~details@\"runs the API\"",
        DEFAULT_TYPE_ID,
    );
    assert_eq!(store.node_count(), 1);
    let node = store.find_by_text_or_synonym("backend").unwrap();
    assert_eq!(node.text, "Server");
    assert_eq!(node.tags, vec!["infra".to_string(), "prod".to_string()]);
    assert_eq!(node.synonyms, vec!["Backend".to_string()]);
    assert_eq!(node.details, "runs the API");
}

#[test]
fn synonym_clause_unions_into_existing_node() {
    let mut store = new_store();
    let mut fever = Node::new("fever", DEFAULT_TYPE_ID);
    fever.synonyms = vec!["pyrexia".into()];
    store.add_node(fever).unwrap();
    let outcome = execute_input(&mut store, "fever ~ synonym@chills,ague", DEFAULT_TYPE_ID);
    assert!(outcome.created.is_empty());
    assert_eq!(store.node_count(), 1);
    assert_eq!(
        store.find_by_text_or_synonym("ague").unwrap().synonyms,
        vec!["pyrexia".to_string(), "chills".to_string(), "ague".to_string()]
    );
}

#[test]
fn synonym_colliding_with_other_label_is_dropped() {
    let mut store = new_store();
    execute_input(&mut store, "Client", DEFAULT_TYPE_ID);
    execute_input(&mut store, "Server ~synonyms@client,Host", DEFAULT_TYPE_ID);
    let server = store.find_by_text_or_synonym("Server").unwrap();
    assert_eq!(server.synonyms, vec!["Host".to_string()]);
    assert_eq!(store.find_by_text_or_synonym("client").unwrap().text, "Client");
}

#[test]
fn malformed_clauses_do_not_abort_the_line() {
    let mut store = new_store();
    let outcome = execute_input(&mut store, "A ~bogus ~tags@ -> B", DEFAULT_TYPE_ID);
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.links_added, 1);
}

#[test]
fn import_replaces_graph_and_filters_links() {
    let mut store = new_store();
    add(&mut store, "Old");
    let a = Node::new("A", DEFAULT_TYPE_ID);
    let b = Node::new("B", DEFAULT_TYPE_ID);
    let dup = Node::new("a", DEFAULT_TYPE_ID);
    let doc = GraphDocument {
        links: vec![Link::new(a.id, b.id), Link::new(a.id, dup.id), Link::new(a.id, Uuid::now_v7())],
        nodes: vec![a, b, dup],
    };
    let report = store.import(doc);
    assert_eq!(texts(&store), vec!["A", "B"]);
    assert_eq!(report.nodes_added, 2);
    assert_eq!(report.nodes_rejected, 1);
    assert_eq!(report.links_added, 1);
    assert_eq!(report.links_dropped, 2);
}

#[test]
fn import_json_with_bad_ids_fails_before_mutation() {
    let raw = r#"{ "nodes": [ { "id": "not-a-uuid", "text": "X" } ], "links": [] }"#;
    assert!(serde_json::from_str::<GraphDocument>(raw).is_err());
}

#[test]
fn import_accepts_minimal_nodes() {
    let id = Uuid::now_v7();
    let raw = format!(r#"{{ "nodes": [ {{ "id": "{id}", "text": "X", "type": null, "tags": null }} ] }}"#);
    let doc: GraphDocument = serde_json::from_str(&raw).unwrap();
    let mut store = new_store();
    store.import(doc);
    let node = store.get_node(id).unwrap();
    assert_eq!(node.node_type, DEFAULT_TYPE_ID);
    assert!(node.tags.is_empty());
    assert!(node.layout_pending);
}

#[test]
fn history_keeps_the_most_recent_entries() {
    let mut store = new_store();
    for i in 0..60 {
        store.add_to_history(&format!("item {i}"));
    }
    let texts = &store.history().node_texts;
    assert_eq!(texts.len(), MAX_HISTORY_ITEMS);
    assert_eq!(texts.first().map(String::as_str), Some("item 10"));
    assert_eq!(texts.last().map(String::as_str), Some("item 59"));
}

#[test]
fn history_strips_type_prefixes() {
    let mut store = new_store();
    store.add_to_history("idea:Launch -> task:Write brief");
    assert_eq!(store.history().node_texts, vec!["Launch".to_string(), "Write brief".to_string()]);
}

#[test]
fn history_records_node_text_not_colon_tails() {
    let mut store = new_store();
    execute_input(&mut store, "note to self: call mom", DEFAULT_TYPE_ID);
    execute_input(&mut store, "Meeting ~ details@\"at 10:30\"", DEFAULT_TYPE_ID);
    let labels: Vec<&str> = store.nodes().iter().map(|n| n.text.as_str()).collect();
    assert_eq!(labels, vec!["note to self: call mom", "Meeting"]);
    assert_eq!(store.history().node_texts, vec!["note to self: call mom".to_string(), "Meeting".to_string()]);
}

#[test]
fn tags_become_a_caption() {
    let mut store = new_store();
    execute_input(&mut store, "Launch ~ tags@Urgent,q3", DEFAULT_TYPE_ID);
    execute_input(&mut store, "Plain", DEFAULT_TYPE_ID);
    let launch = store.find_by_text_or_synonym("Launch").unwrap();
    assert_eq!(launch.tag_caption().as_deref(), Some("urgent, q3"));
    assert_eq!(store.find_by_text_or_synonym("Plain").unwrap().tag_caption(), None);
}

#[test]
fn node_type_can_be_renamed_and_recolored() {
    let mut store = new_store();
    let rev = store.revision();
    assert!(store.update_node_type(
        "task",
        NodeTypeUpdate { name: Some("Chore".into()), color: Some("#010203".into()) },
    ));
    let t = store.resolve_type("task");
    assert_eq!((t.name.as_str(), t.color.as_str()), ("Chore", "#010203"));
    assert!(store.revision() > rev);

    assert!(store.update_node_type("task", NodeTypeUpdate { name: Some("Todo".into()), ..Default::default() }));
    assert_eq!(store.resolve_type("task").color, "#010203");
    assert!(!store.update_node_type("missing", NodeTypeUpdate::default()));
}

#[test]
fn removed_default_type_falls_back_to_static_type() {
    let mut store = new_store();
    let id = store.add_node(Node::new("Orphan", DEFAULT_TYPE_ID)).unwrap();
    assert!(store.remove_node_type(DEFAULT_TYPE_ID));
    assert!(store.get_node_type(DEFAULT_TYPE_ID).is_none());
    assert!(!store.remove_node_type(DEFAULT_TYPE_ID));

    let fallback = store.resolve_type("ghost");
    assert_eq!(fallback.id, DEFAULT_TYPE_ID);
    assert_eq!(fallback.name, "Information");
    let node_type = store.get_node(id).unwrap().node_type.clone();
    assert_eq!(store.resolve_type(&node_type), fallback);
}

#[test]
fn unknown_type_resolves_to_default() {
    let mut store = new_store();
    let id = store.add_node(Node::new("X", "nope")).unwrap();
    let node_type = store.get_node(id).unwrap().node_type.clone();
    assert_eq!(store.resolve_type(&node_type).id, DEFAULT_TYPE_ID);

    assert!(store.add_node_type(NodeType::new("nope", "Nope", "#123456")));
    assert_eq!(store.resolve_type("nope").color, "#123456");
    assert!(!store.add_node_type(NodeType::new("nope", "Again", "#000000")));
}

#[test]
fn suggestions_cover_nodes_history_and_patterns() {
    let mut store = new_store();
    execute_input(&mut store, "Taskforce", DEFAULT_TYPE_ID);
    let kinds: Vec<SuggestionKind> = store.suggestions("task").iter().map(|s| s.kind).collect();
    assert!(kinds.contains(&SuggestionKind::Node));
    assert!(kinds.contains(&SuggestionKind::Pattern));
    let values: Vec<String> = store.suggestions("task").into_iter().map(|s| s.value).collect();
    let unique: std::collections::HashSet<&String> = values.iter().collect();
    assert_eq!(unique.len(), values.len(), "suggestions are deduplicated");
    assert!(store.suggestions("   ").is_empty());
}

#[test]
fn revision_counters_track_mutations() {
    let mut store = new_store();
    let shape0 = store.shape_revision();
    let a = add(&mut store, "A");
    assert!(store.shape_revision() > shape0);
    let shape1 = store.shape_revision();
    let rev1 = store.revision();
    store.set_node_position(a, 10.0, 20.0);
    assert_eq!(store.shape_revision(), shape1, "moving a node is not a shape change");
    assert!(store.revision() > rev1);
    assert!(!store.get_node(a).unwrap().layout_pending);
}
