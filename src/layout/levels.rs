use std::collections::{BTreeMap, HashMap, VecDeque};

use log::warn;

use crate::graph_utils::graph::{Link, Node, NodeId};
use super::LevelOrdering;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelAssignment {
    pub levels: HashMap<NodeId, usize>,
    /// Nodes on (or downstream of) a cycle, in insertion order. These get the
    /// tie-break level described on `assign_levels`.
    pub cyclic: Vec<NodeId>,
}

impl LevelAssignment {
    pub fn level_of(&self, id: NodeId) -> Option<usize> {
        self.levels.get(&id).copied()
    }

    pub fn has_cycles(&self) -> bool {
        !self.cyclic.is_empty()
    }
}

/// Longest-path level of every node: 0 for roots, otherwise 1 + the highest parent level.
///
/// Runs Kahn's algorithm. Nodes never released by the queue sit on a cycle or below one;
/// they are reported in `cyclic` and, in insertion order, placed one below their highest
/// already-leveled parent (0 when no parent has a level yet).
pub fn assign_levels(nodes: &[Node], links: &[Link]) -> LevelAssignment {
    let mut indegree: HashMap<NodeId, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
    let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for link in links {
        if !indegree.contains_key(&link.source) || !indegree.contains_key(&link.target) {
            continue;
        }
        *indegree.entry(link.target).or_insert(0) += 1;
        outgoing.entry(link.source).or_default().push(link.target);
    }

    let mut levels: HashMap<NodeId, usize> = HashMap::new();
    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .filter(|n| indegree.get(&n.id).copied().unwrap_or(0) == 0)
        .map(|n| n.id)
        .collect();
    for id in &queue {
        levels.insert(*id, 0);
    }

    while let Some(id) = queue.pop_front() {
        let level = levels.get(&id).copied().unwrap_or(0);
        for &target in outgoing.get(&id).map(|v| v.as_slice()).unwrap_or(&[]) {
            let entry = levels.entry(target).or_insert(0);
            *entry = (*entry).max(level + 1);
            if let Some(degree) = indegree.get_mut(&target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    let mut cyclic = Vec::new();
    for node in nodes {
        if indegree.get(&node.id).copied().unwrap_or(0) == 0 {
            continue;
        }
        cyclic.push(node.id);
        // Parents that already carry a settled level decide the tie-break.
        let parent_max = links
            .iter()
            .filter(|l| l.target == node.id && l.source != node.id)
            .filter_map(|l| {
                let settled = indegree.get(&l.source).copied().unwrap_or(0) == 0
                    || cyclic.contains(&l.source);
                if settled { levels.get(&l.source).map(|lv| lv + 1) } else { None }
            })
            .max();
        levels.insert(node.id, parent_max.unwrap_or(0));
    }
    if !cyclic.is_empty() {
        warn!("level layout: {} nodes sit on or below a cycle", cyclic.len());
    }

    LevelAssignment { levels, cyclic }
}

/// Group node ids by level (ascending), ordered within each level per `ordering`.
pub fn group_by_level(
    nodes: &[Node],
    links: &[Link],
    assignment: &LevelAssignment,
    ordering: LevelOrdering,
) -> Vec<(usize, Vec<NodeId>)> {
    let mut groups: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for node in nodes {
        let level = assignment.level_of(node.id).unwrap_or(0);
        groups.entry(level).or_default().push(node.id);
    }

    if ordering == LevelOrdering::Degree {
        let mut degree: HashMap<NodeId, usize> = HashMap::new();
        for link in links {
            *degree.entry(link.source).or_insert(0) += 1;
            *degree.entry(link.target).or_insert(0) += 1;
        }
        for ids in groups.values_mut() {
            // stable sort keeps insertion order among equal degrees
            ids.sort_by_key(|id| std::cmp::Reverse(degree.get(id).copied().unwrap_or(0)));
        }
    }

    groups.into_iter().collect()
}
