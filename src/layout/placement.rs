use std::collections::HashMap;

use egui::Pos2;
use log::debug;

use crate::graph_utils::graph::{Link, MindMapStore, Node, NodeId};
use super::levels::{assign_levels, group_by_level};
use super::LayoutConfig;

/// Level-based target position for every node.
///
/// Each level is a horizontal band `spacing_x` apart, centered under the viewport;
/// level `k` sits at `offset_y + k * spacing_y`.
pub fn compute_level_positions(
    nodes: &[Node],
    links: &[Link],
    config: &LayoutConfig,
    viewport_width: f32,
) -> HashMap<NodeId, Pos2> {
    let assignment = assign_levels(nodes, links);
    let mut out = HashMap::with_capacity(nodes.len());
    for (level, ids) in group_by_level(nodes, links, &assignment, config.ordering) {
        let band_width = ids.len() as f32 * config.spacing_x;
        let start_x = config.offset_x + (viewport_width - band_width) / 2.0;
        let y = config.offset_y + level as f32 * config.spacing_y;
        for (i, id) in ids.into_iter().enumerate() {
            out.insert(id, Pos2::new(start_x + i as f32 * config.spacing_x, y));
        }
    }
    out
}

/// Give every layout-pending node its level position. Nodes that already have a
/// position (dragged, loaded, or laid out earlier) keep it. Returns the ids placed.
pub fn apply_level_layout(store: &mut MindMapStore, config: &LayoutConfig, viewport_width: f32) -> Vec<NodeId> {
    let pending = store.pending_layout_ids();
    if pending.is_empty() {
        return Vec::new();
    }
    let targets = compute_level_positions(store.nodes(), store.links(), config, viewport_width);
    let mut placed = Vec::with_capacity(pending.len());
    for id in pending {
        if let Some(p) = targets.get(&id)
            && store.set_node_position(id, p.x, p.y)
        {
            placed.push(id);
        }
    }
    debug!("level layout placed {} nodes", placed.len());
    placed
}
