use std::fs;
use std::path::PathBuf;

use mind_loom::graph_utils::graph::{GraphDocument, MindMapStore};
use mind_loom::graph_utils::node_types::DEFAULT_TYPE_ID;
use mind_loom::markup::command_interface::execute_input;
use mind_loom::persistence::persist::{self, AppStateFile, STATE_FILE_NAME};
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mind-loom-{tag}-{}", Uuid::now_v7()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample_store() -> MindMapStore {
    let mut store = MindMapStore::new();
    execute_input(&mut store, "goal:Ship -> task:Write docs ~tags@docs -> Review", DEFAULT_TYPE_ID);
    store
}

#[test]
fn state_file_round_trips_through_disk() {
    let dir = scratch_dir("state");
    let store = sample_store();
    let state = AppStateFile::from_store(&store);
    let path = persist::save_active_in(&dir, &state).unwrap();
    assert!(path.ends_with(STATE_FILE_NAME));

    let loaded = persist::load_active_in(&dir).unwrap().expect("state present");
    assert_eq!(loaded, state);
    let restored = loaded.into_store();
    assert_eq!(restored.node_count(), 3);
    assert_eq!(restored.link_count(), 2);
    assert!(restored.get_node_type("goal").is_some());
    assert_eq!(restored.history(), store.history());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn state_file_uses_camel_case_keys() {
    let state = AppStateFile::from_store(&sample_store());
    let json = serde_json::to_value(&state).unwrap();
    assert!(json.get("nodeTypes").is_some());
    assert!(json["nodeHistory"].get("nodeTexts").is_some());
    assert!(json["nodes"][0].get("type").is_some());
}

#[test]
fn missing_state_is_not_an_error() {
    let dir = scratch_dir("empty");
    assert!(persist::load_active_in(&dir).unwrap().is_none());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn corrupt_state_is_quarantined() {
    let dir = scratch_dir("corrupt");
    fs::write(dir.join(STATE_FILE_NAME), "{ not json").unwrap();
    assert!(persist::load_active_in(&dir).unwrap().is_none());
    assert!(!dir.join(STATE_FILE_NAME).exists());
    assert!(dir.join("mind-map-storage.json.corrupt").exists());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn versions_are_listed_newest_first() {
    let dir = scratch_dir("versions");
    let state = AppStateFile::from_store(&sample_store());
    let saved = persist::save_versioned_in(&dir, &state).unwrap();
    fs::write(dir.join("state_19990101_000000.json"), "{}").unwrap();
    fs::write(dir.join("unrelated.json"), "{}").unwrap();
    let versions = persist::list_versions_in(&dir).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0], saved);
    assert_eq!(persist::load_from_path(&saved).unwrap(), state);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn export_then_import_restores_the_graph() {
    let dir = scratch_dir("export");
    let original = sample_store();
    let path = persist::export_document_to_dir(&dir, &original.export_document()).unwrap();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap();
    assert!(name.starts_with("mindmap-export_") && name.ends_with(".json"));

    let doc = persist::import_document_from_path(&path).unwrap();
    let mut target = MindMapStore::new();
    execute_input(&mut target, "Stale", DEFAULT_TYPE_ID);
    let report = target.import(doc);
    assert_eq!(report.nodes_added, 3);
    assert_eq!(report.links_added, 2);
    assert!(target.find_by_text_or_synonym("Stale").is_none());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn invalid_import_file_is_an_error() {
    let dir = scratch_dir("bad-import");
    let path = dir.join("broken.json");
    fs::write(&path, "[1, 2, 3]").unwrap();
    assert!(persist::import_document_from_path(&path).is_err());
    assert!(persist::import_document_from_path(&dir.join("absent.json")).is_err());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn csv_export_lists_every_node() {
    let dir = scratch_dir("csv");
    let store = sample_store();
    let path = dir.join("nodes.csv");
    persist::export_nodes_csv(&store, &path).unwrap();
    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["id", "text", "type", "tags", "synonyms", "details"]);
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[1][1], "Write docs");
    assert_eq!(&rows[1][2], "task");
    assert_eq!(&rows[1][3], "docs");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn empty_document_parses() {
    let doc: GraphDocument = serde_json::from_str("{}").unwrap();
    assert!(doc.nodes.is_empty() && doc.links.is_empty());
}
