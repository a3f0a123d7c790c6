use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::graph_utils::graph::{GraphDocument, Link, MindMapStore, Node};
use crate::graph_utils::history::NodeHistory;
use crate::graph_utils::node_types::NodeType;
use super::settings::AppSettings;

pub const STATE_FILE_NAME: &str = "mind-map-storage.json";

/// Everything that survives a restart: graph, type catalog and input history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateFile {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub node_types: Vec<NodeType>,
    #[serde(default)]
    pub node_history: NodeHistory,
}

impl AppStateFile {
    pub fn from_store(store: &MindMapStore) -> Self {
        Self {
            nodes: store.nodes().to_vec(),
            links: store.links().to_vec(),
            node_types: store.node_types().to_vec(),
            node_history: store.history().clone(),
        }
    }

    /// Rebuild a store, re-validating every node and link on the way in.
    pub fn into_store(self) -> MindMapStore {
        MindMapStore::from_parts(self.nodes, self.links, self.node_types, self.node_history)
    }
}

static SETTINGS_OVERRIDE: OnceCell<AppSettings> = OnceCell::new();

/// Pin the settings used for directory resolution for the rest of the process.
/// Only the first call wins.
pub fn set_settings_override(settings: AppSettings) {
    if SETTINGS_OVERRIDE.set(settings).is_err() {
        warn!("settings override already installed; ignoring");
    }
}

fn current_settings() -> AppSettings {
    if let Some(settings) = SETTINGS_OVERRIDE.get() {
        return settings.clone();
    }
    AppSettings::load().unwrap_or_else(|e| {
        warn!("falling back to default settings: {e:#}");
        AppSettings::default()
    })
}

pub fn autosave_dir() -> PathBuf {
    current_settings().autosave_dir()
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    now.format(fmt).unwrap_or_else(|_| "unknown".to_string())
}

pub fn active_state_path_in(dir: &Path) -> PathBuf {
    dir.join(STATE_FILE_NAME)
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let s = serde_json::to_string_pretty(value)?;
    atomic_write(path, s.as_bytes()).with_context(|| format!("writing {}", path.display()))
}

pub fn save_active(state: &AppStateFile) -> anyhow::Result<PathBuf> {
    save_active_in(&autosave_dir(), state)
}

pub fn save_active_in(dir: &Path, state: &AppStateFile) -> anyhow::Result<PathBuf> {
    let path = active_state_path_in(dir);
    write_json(&path, state)?;
    Ok(path)
}

/// Timestamped snapshot next to the active state (`state_<stamp>.json`).
pub fn save_versioned(state: &AppStateFile) -> anyhow::Result<PathBuf> {
    save_versioned_in(&autosave_dir(), state)
}

pub fn save_versioned_in(dir: &Path, state: &AppStateFile) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("state_{}.json", timestamp()));
    write_json(&path, state)?;
    info!("saved snapshot {}", path.display());
    Ok(path)
}

pub fn load_active() -> anyhow::Result<Option<AppStateFile>> {
    load_active_in(&autosave_dir())
}

/// Load the active state. A file that exists but does not parse is renamed to
/// `*.corrupt` and treated as absent, so the next save does not clobber it.
pub fn load_active_in(dir: &Path) -> anyhow::Result<Option<AppStateFile>> {
    let path = active_state_path_in(dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = read_to_string(&path)?;
    match serde_json::from_str::<AppStateFile>(&raw) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            let quarantined = path.with_extension("json.corrupt");
            warn!("state file {} is corrupt ({e}); moving it to {}", path.display(), quarantined.display());
            fs::rename(&path, &quarantined)
                .with_context(|| format!("quarantining {}", path.display()))?;
            Ok(None)
        }
    }
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppStateFile> {
    let raw = read_to_string(path)?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub fn list_versions_in(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            if let Some(name) = p.file_name().and_then(|s| s.to_str())
                && name.starts_with("state_") && name.ends_with(".json")
            {
                entries.push(p);
            }
        }
    }
    // newest first (timestamped names sort chronologically)
    entries.sort();
    entries.reverse();
    Ok(entries)
}

/// Write `{ nodes, links }` as `mindmap-export_<stamp>.json` into `dir`.
pub fn export_document_to_dir(dir: &Path, doc: &GraphDocument) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("mindmap-export_{}.json", timestamp()));
    write_json(&path, doc)?;
    info!("exported {} nodes / {} links to {}", doc.nodes.len(), doc.links.len(), path.display());
    Ok(path)
}

/// Parse an export document. Nothing is applied here, so a bad file leaves the
/// caller's store untouched.
pub fn import_document_from_path(path: &Path) -> anyhow::Result<GraphDocument> {
    let raw = read_to_string(path)?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a mind-map export", path.display()))
}

pub fn export_nodes_csv(store: &MindMapStore, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["id", "text", "type", "tags", "synonyms", "details"])?;
    for n in store.nodes() {
        wtr.write_record([
            n.id.to_string(),
            n.text.clone(),
            n.node_type.clone(),
            n.tags.join(";"),
            n.synonyms.join(";"),
            n.details.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn read_to_string(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    Ok(buf)
}
