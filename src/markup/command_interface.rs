use log::{debug, info};
use rand::Rng;

use crate::graph_utils::graph::{MindMapStore, Node, NodeId, NodeUpdate};
use super::markup_syntax::{parse_input, Line, Segment};

// Placeholder coordinates for new nodes; the level layout replaces them on the next frame.
const PLACEHOLDER_EXTENT: f32 = 500.0;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandOutcome {
    pub created: Vec<NodeId>,
    pub merged: Vec<NodeId>,
    pub links_added: usize,
    pub types_registered: Vec<String>,
    pub skipped_segments: usize,
}

impl CommandOutcome {
    pub fn mutated(&self) -> bool {
        !self.created.is_empty() || !self.merged.is_empty() || self.links_added > 0
    }
}

/// Apply a (possibly multi-line) submission to the store.
///
/// Lines run top to bottom and segments left to right, so later lines can refer to
/// nodes created by earlier ones. Never fails: malformed clauses are ignored and
/// duplicate labels merge into the existing node.
pub fn execute_input(store: &mut MindMapStore, input: &str, default_type: &str) -> CommandOutcome {
    let mut outcome = CommandOutcome::default();
    if input.trim().is_empty() {
        return outcome;
    }
    store.add_to_history(input);
    for line in parse_input(input) {
        execute_line(store, &line, default_type, &mut outcome);
    }
    info!(
        "command applied: {} created, {} merged, {} links",
        outcome.created.len(),
        outcome.merged.len(),
        outcome.links_added
    );
    outcome
}

pub fn execute_line(store: &mut MindMapStore, line: &Line, default_type: &str, outcome: &mut CommandOutcome) {
    let resolved: Vec<NodeId> = line
        .segments
        .iter()
        .filter_map(|seg| {
            let id = resolve_segment(store, seg, default_type, outcome);
            if id.is_none() {
                outcome.skipped_segments += 1;
            }
            id
        })
        .collect();

    for pair in resolved.windows(2) {
        if store.add_link(pair[0], pair[1]) {
            outcome.links_added += 1;
        }
    }
}

fn resolve_segment(
    store: &mut MindMapStore,
    seg: &Segment,
    default_type: &str,
    outcome: &mut CommandOutcome,
) -> Option<NodeId> {
    if seg.base.is_empty() {
        return None;
    }
    let type_id = match &seg.type_prefix {
        Some(prefix) => {
            let known = store.get_node_type(&prefix.to_lowercase()).is_some();
            let id = store.ensure_node_type(prefix);
            if !known {
                outcome.types_registered.push(id.clone());
            }
            id
        }
        None => default_type.to_string(),
    };

    let tags = seg.tags();
    let synonyms = seg.synonyms();
    let details = seg.details();

    if let Some(existing) = store.find_by_text_or_synonym(&seg.base) {
        let id = existing.id;
        let mut update = NodeUpdate::default();

        let mut merged_tags = existing.tags.clone();
        for tag in tags {
            if !merged_tags.contains(&tag) {
                merged_tags.push(tag);
            }
        }
        if merged_tags.len() != existing.tags.len() {
            update.tags = Some(merged_tags);
        }

        let fresh: Vec<String> = synonyms.into_iter().filter(|s| !existing.matches_label(s)).collect();
        let admissible = store.admissible_synonyms(&fresh, Some(id));
        if admissible.len() < fresh.len() {
            debug!("dropped {} synonyms colliding with other labels", fresh.len() - admissible.len());
        }
        if !admissible.is_empty() {
            let mut merged = existing.synonyms.clone();
            merged.extend(admissible);
            update.synonyms = Some(merged);
        }
        update.details = details;

        if update.tags.is_some() || update.synonyms.is_some() || update.details.is_some() {
            store.update_node(id, update);
        }
        outcome.merged.push(id);
        return Some(id);
    }

    let mut rng = rand::thread_rng();
    let mut node = Node::new(seg.base.clone(), type_id).with_position(
        rng.gen_range(0.0..PLACEHOLDER_EXTENT),
        rng.gen_range(0.0..PLACEHOLDER_EXTENT),
    );
    node.tags = tags;
    node.synonyms = store.admissible_synonyms(&synonyms, None);
    node.details = details.unwrap_or_default();

    let id = store.add_node(node)?;
    outcome.created.push(id);
    Some(id)
}
