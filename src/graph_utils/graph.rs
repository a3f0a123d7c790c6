use std::collections::HashSet;
use std::fmt;

use anyhow::{anyhow, Result};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::history::NodeHistory;
use super::node_types::{builtin_node_types, NodeType, NodeTypeUpdate, DEFAULT_TYPE_ID, FALLBACK_TYPE};

// Basic type aliases for clarity
pub type NodeId = Uuid;

pub const DEFAULT_LINK_DISTANCE: f32 = 150.0;

const PREDEFINED_PATTERNS: [&str; 6] = [
    "condition:if x > 0",
    "task:complete project",
    "idea:new feature",
    "milestone:phase 1",
    "resource:team member",
    "goal:increase sales",
];

fn default_type_id() -> String {
    DEFAULT_TYPE_ID.to_string()
}

// Older exports carry `null` for optional fields; treat that like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    #[serde(rename = "type", default = "default_type_id")]
    pub node_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub synonyms: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub x: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub y: f32,
    // Set while the node only has a placeholder position; cleared by layout or drag.
    #[serde(skip)]
    pub layout_pending: bool,
}

impl Node {
    pub fn new(text: impl Into<String>, node_type: impl Into<String>) -> Self {
        Node {
            id: Uuid::now_v7(),
            text: text.into(),
            node_type: node_type.into(),
            tags: Vec::new(),
            synonyms: Vec::new(),
            details: String::new(),
            x: 0.0,
            y: 0.0,
            layout_pending: true,
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// True when `text` equals this node's label or one of its synonyms, ignoring case.
    pub fn matches_label(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        self.text.to_lowercase() == needle
            || self.synonyms.iter().any(|s| s.to_lowercase() == needle)
    }

    /// Case-insensitive substring match on the label or any synonym.
    pub fn contains_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.text.to_lowercase().contains(&q)
            || self.synonyms.iter().any(|s| s.to_lowercase().contains(&q))
    }

    /// Caption drawn under the node box; `None` without tags.
    pub fn tag_caption(&self) -> Option<String> {
        (!self.tags.is_empty()).then(|| self.tags.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

impl Link {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Link { source, target, distance: Some(DEFAULT_LINK_DISTANCE), link_type: None }
    }

    pub fn connects(&self, source: NodeId, target: NodeId) -> bool {
        self.source == source && self.target == target
    }

    pub fn touches(&self, id: NodeId) -> bool {
        self.source == id || self.target == id
    }
}

/// Partial update for `MindMapStore::update_node`. `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct NodeUpdate {
    pub text: Option<String>,
    pub node_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub synonyms: Option<Vec<String>>,
    pub details: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
}

/// The export/import document: nodes and links only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub nodes_added: usize,
    pub nodes_rejected: usize,
    pub links_added: usize,
    pub links_dropped: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SuggestionKind {
    Node,
    History,
    Markup,
    Pattern,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Rejection {
    BlankText,
    DuplicateId,
    DuplicateLabel,
    SynonymCollision,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BlankText => write!(f, "node text must not be empty"),
            Rejection::DuplicateId => write!(f, "node id already exists"),
            Rejection::DuplicateLabel => write!(f, "node with this label already exists"),
            Rejection::SynonymCollision => write!(f, "a synonym collides with an existing node label"),
        }
    }
}

pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

pub(crate) fn normalize_synonyms(synonyms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    synonyms
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// Single source of truth for nodes, links, node types and input history.
///
/// Every public mutation leaves the store with unique labels (text and synonyms,
/// case-insensitive), no dangling links and no duplicate directed links.
#[derive(Clone, Debug)]
pub struct MindMapStore {
    nodes: Vec<Node>,
    links: Vec<Link>,
    node_types: Vec<NodeType>,
    history: NodeHistory,
    selected: Option<NodeId>,
    revision: u64,
    shape_revision: u64,
}

impl Default for MindMapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MindMapStore {
    // Instantiate an empty store with the built-in node types
    pub fn new() -> Self {
        MindMapStore {
            nodes: Vec::new(),
            links: Vec::new(),
            node_types: builtin_node_types(),
            history: NodeHistory::new(),
            selected: None,
            revision: 0,
            shape_revision: 0,
        }
    }

    /// Rebuild a store from persisted parts, re-applying every invariant through the
    /// normal add paths. Nodes sitting at the origin are queued for layout.
    pub fn from_parts(
        nodes: Vec<Node>,
        links: Vec<Link>,
        node_types: Vec<NodeType>,
        mut history: NodeHistory,
    ) -> Self {
        let mut store = MindMapStore::new();
        if !node_types.is_empty() {
            store.node_types.clear();
            for t in node_types {
                store.add_node_type(t);
            }
        }
        for mut node in nodes {
            node.layout_pending = node.x == 0.0 && node.y == 0.0;
            if store.add_node(node).is_none() {
                debug!("dropping persisted node that violates label uniqueness");
            }
        }
        for link in links {
            store.insert_link(link);
        }
        history.enforce_bounds();
        store.history = history;
        store.revision = 0;
        store
    }

    pub fn nodes(&self) -> &[Node] { &self.nodes }
    pub fn links(&self) -> &[Link] { &self.links }
    pub fn node_types(&self) -> &[NodeType] { &self.node_types }
    pub fn history(&self) -> &NodeHistory { &self.history }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn link_count(&self) -> usize { self.links.len() }

    /// Bumped on every mutation.
    pub fn revision(&self) -> u64 { self.revision }

    /// Bumped only when the node set or link set changes.
    pub fn shape_revision(&self) -> u64 { self.shape_revision }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn has_link(&self, source: NodeId, target: NodeId) -> bool {
        self.links.iter().any(|l| l.connects(source, target))
    }

    fn touch(&mut self, shape_changed: bool) {
        self.revision += 1;
        if shape_changed {
            self.shape_revision += 1;
        }
    }

    fn text_collides(&self, text: &str, exclude: Option<NodeId>) -> bool {
        self.nodes
            .iter()
            .filter(|n| Some(n.id) != exclude)
            .any(|n| n.matches_label(text))
    }

    fn synonyms_collide(&self, synonyms: &[String], exclude: Option<NodeId>) -> bool {
        self.nodes.iter().filter(|n| Some(n.id) != exclude).any(|n| {
            let label = n.text.to_lowercase();
            synonyms.iter().any(|s| s.trim().to_lowercase() == label)
        })
    }

    /// Synonyms from `candidates` that would not collide with another node's label.
    pub fn admissible_synonyms(&self, candidates: &[String], exclude: Option<NodeId>) -> Vec<String> {
        candidates
            .iter()
            .filter(|s| !self.synonyms_collide(std::slice::from_ref(*s), exclude))
            .cloned()
            .collect()
    }

    fn validate_new(&self, node: &Node) -> std::result::Result<(), Rejection> {
        if node.text.trim().is_empty() {
            return Err(Rejection::BlankText);
        }
        if self.contains_node(node.id) {
            return Err(Rejection::DuplicateId);
        }
        if self.text_collides(&node.text, None) {
            return Err(Rejection::DuplicateLabel);
        }
        if self.synonyms_collide(&node.synonyms, None) {
            return Err(Rejection::SynonymCollision);
        }
        Ok(())
    }

    fn push_node(&mut self, mut node: Node) -> NodeId {
        node.text = node.text.trim().to_string();
        node.tags = normalize_tags(&node.tags);
        node.synonyms = normalize_synonyms(&node.synonyms);
        let id = node.id;
        self.nodes.push(node);
        self.touch(true);
        id
    }

    /// Add a node; returns `None` (and leaves the store untouched) on a label collision.
    pub fn add_node(&mut self, node: Node) -> Option<NodeId> {
        match self.validate_new(&node) {
            Ok(()) => Some(self.push_node(node)),
            Err(reason) => {
                debug!("add_node rejected '{}': {}", node.text, reason);
                None
            }
        }
    }

    /// Strict variant of `add_node` for callers that surface the failure to the user.
    pub fn try_add_node(&mut self, node: Node) -> Result<NodeId> {
        self.validate_new(&node)
            .map_err(|reason| anyhow!("{}: '{}'", reason, node.text.trim()))?;
        Ok(self.push_node(node))
    }

    pub fn update_node(&mut self, id: NodeId, update: NodeUpdate) -> bool {
        if !self.contains_node(id) {
            return false;
        }
        if let Some(text) = &update.text {
            if text.trim().is_empty() || self.text_collides(text, Some(id)) {
                debug!("update_node rejected: label '{}' collides", text);
                return false;
            }
        }
        if let Some(synonyms) = &update.synonyms {
            if self.synonyms_collide(synonyms, Some(id)) {
                debug!("update_node rejected: synonym collides with another label");
                return false;
            }
        }
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else { return false };
        if let Some(text) = update.text {
            node.text = text.trim().to_string();
        }
        if let Some(t) = update.node_type {
            node.node_type = t;
        }
        if let Some(tags) = update.tags {
            node.tags = normalize_tags(&tags);
        }
        if let Some(synonyms) = update.synonyms {
            node.synonyms = normalize_synonyms(&synonyms);
        }
        if let Some(details) = update.details {
            node.details = details;
        }
        if update.x.is_some() || update.y.is_some() {
            node.x = update.x.unwrap_or(node.x);
            node.y = update.y.unwrap_or(node.y);
            node.layout_pending = false;
        }
        self.touch(false);
        true
    }

    pub fn set_node_position(&mut self, id: NodeId, x: f32, y: f32) -> bool {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.x = x;
            node.y = y;
            node.layout_pending = false;
            self.touch(false);
            true
        } else {
            false
        }
    }

    // Delete operations
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        // Cascade delete links involving this node
        self.links.retain(|l| !l.touches(id));
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.touch(true);
        true
    }

    fn link_admissible(&self, source: NodeId, target: NodeId) -> bool {
        source != target
            && !self.has_link(source, target)
            && self.contains_node(source)
            && self.contains_node(target)
    }

    fn insert_link(&mut self, link: Link) -> bool {
        if !self.link_admissible(link.source, link.target) {
            return false;
        }
        self.links.push(link);
        self.touch(true);
        true
    }

    /// Add a directed link if both endpoints exist and the pair is new.
    pub fn add_link(&mut self, source: NodeId, target: NodeId) -> bool {
        self.insert_link(Link::new(source, target))
    }

    pub fn remove_link(&mut self, source: NodeId, target: NodeId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| !l.connects(source, target));
        if self.links.len() == before {
            return false;
        }
        self.touch(true);
        true
    }

    /// Drop links whose source or target no longer exists. Returns the number removed.
    pub fn cleanup_invalid_links(&mut self) -> usize {
        let ids: HashSet<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        let before = self.links.len();
        self.links.retain(|l| ids.contains(&l.source) && ids.contains(&l.target));
        let removed = before - self.links.len();
        if removed > 0 {
            debug!("cleanup_invalid_links removed {} dangling links", removed);
            self.touch(true);
        }
        removed
    }

    pub fn selected_id(&self) -> Option<NodeId> { self.selected }

    pub fn selected_node(&self) -> Option<&Node> {
        self.selected.and_then(|id| self.get_node(id))
    }

    pub fn set_selected_node(&mut self, id: Option<NodeId>) {
        self.selected = id.filter(|id| self.contains_node(*id));
    }

    // Node type catalog
    pub fn get_node_type(&self, id: &str) -> Option<&NodeType> {
        self.node_types.iter().find(|t| t.id == id)
    }

    /// Look up a type, falling back to the default type for unresolved ids.
    pub fn resolve_type(&self, id: &str) -> &NodeType {
        self.get_node_type(id)
            .or_else(|| self.get_node_type(DEFAULT_TYPE_ID))
            .unwrap_or_else(|| &*FALLBACK_TYPE)
    }

    pub fn add_node_type(&mut self, node_type: NodeType) -> bool {
        if node_type.id.trim().is_empty() || self.get_node_type(&node_type.id).is_some() {
            return false;
        }
        self.node_types.push(node_type);
        self.touch(false);
        true
    }

    /// Return the id of the type registered for `prefix`, registering it when unknown.
    pub fn ensure_node_type(&mut self, prefix: &str) -> String {
        let id = prefix.trim().to_lowercase();
        if self.get_node_type(&id).is_none() {
            self.add_node_type(NodeType::from_prefix(prefix));
        }
        id
    }

    pub fn update_node_type(&mut self, id: &str, update: NodeTypeUpdate) -> bool {
        let Some(t) = self.node_types.iter_mut().find(|t| t.id == id) else { return false };
        if let Some(name) = update.name {
            t.name = name;
        }
        if let Some(color) = update.color {
            t.color = color;
        }
        self.touch(false);
        true
    }

    pub fn remove_node_type(&mut self, id: &str) -> bool {
        let before = self.node_types.len();
        self.node_types.retain(|t| t.id != id);
        if self.node_types.len() == before {
            return false;
        }
        self.touch(false);
        true
    }

    pub fn add_to_history(&mut self, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }
        self.history.record(raw);
        self.touch(false);
    }

    // Fetch helpers
    pub fn find_by_text_or_synonym(&self, text: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.matches_label(text))
    }

    /// First node (insertion order) whose label or a synonym contains `query`.
    pub fn find_first_match(&self, query: &str) -> Option<&Node> {
        let q = query.trim();
        if q.is_empty() {
            return None;
        }
        self.nodes.iter().find(|n| n.contains_query(q))
    }

    pub fn search_nodes(&self, query: &str) -> Vec<&Node> {
        let q = query.trim();
        self.nodes.iter().filter(|n| q.is_empty() || n.contains_query(q)).collect()
    }

    /// Autocomplete entries for the command input, deduplicated by value.
    pub fn suggestions(&self, input: &str) -> Vec<Suggestion> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        let candidates = self
            .nodes
            .iter()
            .filter(|n| hit(n.text.as_str()))
            .map(|n| (SuggestionKind::Node, n.text.as_str()))
            .chain(self.history.node_texts.iter().filter(|t| hit(t.as_str())).map(|t| (SuggestionKind::History, t.as_str())))
            .chain(self.history.markup_patterns.iter().filter(|p| hit(p.as_str())).map(|p| (SuggestionKind::Markup, p.as_str())))
            .chain(PREDEFINED_PATTERNS.iter().filter(|p| hit(**p)).map(|p| (SuggestionKind::Pattern, *p)));

        let mut seen = HashSet::new();
        candidates
            .filter(|(_, v)| seen.insert(v.to_string()))
            .map(|(kind, v)| Suggestion { kind, value: v.to_string() })
            .collect()
    }

    pub fn pending_layout_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().filter(|n| n.layout_pending).map(|n| n.id).collect()
    }

    pub fn export_document(&self) -> GraphDocument {
        GraphDocument { nodes: self.nodes.clone(), links: self.links.clone() }
    }

    /// Replace nodes and links with the document's contents. Nodes go through the
    /// collision-checked add path; links survive only if both endpoints were imported.
    pub fn import(&mut self, doc: GraphDocument) -> ImportReport {
        let mut report = ImportReport::default();
        self.nodes.clear();
        self.links.clear();
        self.touch(true);

        let imported_ids: HashSet<NodeId> = doc.nodes.iter().map(|n| n.id).collect();
        for mut node in doc.nodes {
            node.layout_pending = node.x == 0.0 && node.y == 0.0;
            if node.node_type.trim().is_empty() {
                node.node_type = default_type_id();
            }
            match self.add_node(node) {
                Some(_) => report.nodes_added += 1,
                None => report.nodes_rejected += 1,
            }
        }
        for link in doc.links {
            let endpoints_imported = imported_ids.contains(&link.source) && imported_ids.contains(&link.target);
            if endpoints_imported && self.insert_link(link) {
                report.links_added += 1;
            } else {
                report.links_dropped += 1;
            }
        }
        if self.selected.is_some_and(|id| !self.contains_node(id)) {
            self.selected = None;
        }
        report
    }
}
