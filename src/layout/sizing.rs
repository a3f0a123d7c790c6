use egui::{Pos2, Vec2};

pub const MIN_NODE_SIZE: f32 = 60.0;
pub const NODE_PADDING: f32 = 20.0;
pub const ARROW_SIZE: f32 = 10.0;
pub const LABEL_FONT_SIZE: f32 = 12.0;

/// Measures the rendered bounding box of a node label.
pub trait TextMeasure {
    fn measure(&self, text: &str) -> Vec2;
}

/// Fixed-advance approximation, used when no font system is at hand (tests, headless).
#[derive(Copy, Clone, Debug)]
pub struct ApproxTextMeasure {
    pub char_width: f32,
    pub line_height: f32,
}

impl Default for ApproxTextMeasure {
    fn default() -> Self {
        Self { char_width: LABEL_FONT_SIZE * 0.6, line_height: LABEL_FONT_SIZE * 1.2 }
    }
}

impl TextMeasure for ApproxTextMeasure {
    fn measure(&self, text: &str) -> Vec2 {
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let lines = text.lines().count().max(1);
        Vec2::new(longest as f32 * self.char_width, lines as f32 * self.line_height)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeSize {
    pub width: f32,
    pub height: f32,
}

impl NodeSize {
    /// Radius used to trim link endpoints at the node border.
    pub fn radius(&self) -> f32 {
        self.width.max(self.height) / 2.0
    }
}

pub fn node_size(text: &str, measure: &dyn TextMeasure) -> NodeSize {
    let bbox = measure.measure(text);
    NodeSize {
        width: (bbox.x + NODE_PADDING * 2.0).max(MIN_NODE_SIZE),
        height: (bbox.y + NODE_PADDING * 2.0).max(MIN_NODE_SIZE),
    }
}

/// Start and end of a link segment so that neither the line nor its arrowhead
/// overlaps the node bodies. `None` when the centers coincide.
pub fn link_path(source: Pos2, source_radius: f32, target: Pos2, target_radius: f32) -> Option<(Pos2, Pos2)> {
    let delta = target - source;
    let len = delta.length();
    if len <= f32::EPSILON {
        return None;
    }
    let dir = delta / len;
    let start = source + dir * source_radius;
    let end = target - dir * (target_radius + ARROW_SIZE);
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_labels_clamp_to_minimum_square() {
        let size = node_size("a", &ApproxTextMeasure::default());
        assert_eq!(size, NodeSize { width: MIN_NODE_SIZE, height: MIN_NODE_SIZE });
        assert_eq!(size.radius(), 30.0);
    }

    #[test]
    fn long_labels_grow_with_padding() {
        let m = ApproxTextMeasure { char_width: 10.0, line_height: 10.0 };
        let size = node_size("abcdefghij", &m);
        assert_eq!(size.width, 100.0 + 2.0 * NODE_PADDING);
        assert_eq!(size.height, MIN_NODE_SIZE);
    }

    #[test]
    fn link_path_trims_both_ends() {
        let (a, b) = link_path(Pos2::new(0.0, 0.0), 30.0, Pos2::new(200.0, 0.0), 40.0).unwrap();
        assert_eq!(a, Pos2::new(30.0, 0.0));
        assert_eq!(b, Pos2::new(200.0 - 40.0 - ARROW_SIZE, 0.0));
        assert!(link_path(Pos2::ZERO, 10.0, Pos2::ZERO, 10.0).is_none());
    }
}
