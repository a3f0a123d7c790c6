use serde::{Deserialize, Serialize};

use crate::markup::markup_syntax::{parse_input, CHAIN};

pub const MAX_HISTORY_ITEMS: usize = 50;

/// Previously entered node texts and chain patterns, used only for input suggestions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHistory {
    #[serde(default)]
    pub node_texts: Vec<String>,
    #[serde(default)]
    pub markup_patterns: Vec<String>,
}

impl NodeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the node text of every segment (type prefix and clauses removed, the
    /// same way the command parser reads them) and, for chains, the whole input.
    pub fn record(&mut self, raw: &str) {
        for line in parse_input(raw) {
            for segment in &line.segments {
                if !segment.base.is_empty() {
                    push_bounded(&mut self.node_texts, &segment.base);
                }
            }
        }
        let trimmed = raw.trim();
        if trimmed.contains(CHAIN) {
            push_bounded(&mut self.markup_patterns, trimmed);
        }
    }

    // Keeps the invariant on data hydrated from disk as well
    pub(crate) fn enforce_bounds(&mut self) {
        dedup_in_place(&mut self.node_texts);
        dedup_in_place(&mut self.markup_patterns);
        truncate_oldest(&mut self.node_texts);
        truncate_oldest(&mut self.markup_patterns);
    }
}

// Existing entries keep their slot; new ones append; oldest are evicted first.
fn push_bounded(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
    truncate_oldest(list);
}

fn truncate_oldest(list: &mut Vec<String>) {
    if list.len() > MAX_HISTORY_ITEMS {
        let excess = list.len() - MAX_HISTORY_ITEMS;
        list.drain(..excess);
    }
}

fn dedup_in_place(list: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    list.retain(|v| seen.insert(v.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_records_segments_and_pattern() {
        let mut h = NodeHistory::new();
        h.record("fruit -> tension:rotten -> bad apple");
        assert_eq!(h.node_texts, vec!["fruit", "rotten", "bad apple"]);
        assert_eq!(h.markup_patterns, vec!["fruit -> tension:rotten -> bad apple"]);
    }

    #[test]
    fn only_single_word_prefixes_are_stripped() {
        let mut h = NodeHistory::new();
        h.record("note to self: call mom");
        h.record("Meeting ~ details@\"at 10:30\" ~ tags@work");
        assert_eq!(h.node_texts, vec!["note to self: call mom", "Meeting"]);
    }

    #[test]
    fn duplicates_keep_original_slot() {
        let mut h = NodeHistory::new();
        h.record("a");
        h.record("b");
        h.record("a");
        assert_eq!(h.node_texts, vec!["a", "b"]);
        assert!(h.markup_patterns.is_empty());
    }
}
