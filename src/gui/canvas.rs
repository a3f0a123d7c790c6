use std::collections::{HashMap, HashSet};

use egui::{Pos2, Rect, Vec2};
use log::{debug, info};

use crate::graph_utils::graph::{MindMapStore, Node, NodeId};
use crate::graph_utils::node_types::DEFAULT_TYPE_ID;
use crate::layout::sizing::{link_path, node_size, TextMeasure};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 4.0;
pub const INITIAL_ZOOM: f32 = 0.8;

/// Directed link identity: (source, target).
pub type LinkKey = (NodeId, NodeId);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CanvasConfig {
    pub focus_zoom: f32,
    /// Seconds until search dimming is lifted.
    pub highlight_restore_secs: f64,
    pub focus_animation_secs: f64,
    /// Screen-space pick distance for links.
    pub link_hit_tolerance: f32,
    /// Screen-space radius of the link delete control.
    pub delete_control_radius: f32,
    pub circle_min_points: usize,
    pub circle_max_variance: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            focus_zoom: 1.5,
            highlight_restore_secs: 2.0,
            focus_animation_secs: 0.3,
            link_hit_tolerance: 6.0,
            delete_control_radius: 8.0,
            circle_min_points: 10,
            circle_max_variance: 500.0,
        }
    }
}

/// World-to-screen mapping: `screen = origin + pan + world * zoom`, where `origin`
/// is the top-left corner of the canvas rect.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewTransform {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self { pan: Vec2::ZERO, zoom: INITIAL_ZOOM }
    }
}

impl ViewTransform {
    pub fn to_screen(&self, origin: Pos2, world: Pos2) -> Pos2 {
        origin + self.pan + world.to_vec2() * self.zoom
    }

    pub fn to_world(&self, origin: Pos2, screen: Pos2) -> Pos2 {
        ((screen - origin - self.pan) / self.zoom).to_pos2()
    }

    /// Scale by `factor` keeping the world point under `anchor` fixed on screen.
    pub fn zoom_about(&mut self, origin: Pos2, anchor: Pos2, factor: f32) {
        let world = self.to_world(origin, anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan = anchor - origin - world.to_vec2() * self.zoom;
    }

    /// A view at `zoom` that puts `world` in the middle of a viewport of `size`.
    pub fn centered_on(world: Pos2, size: Vec2, zoom: f32) -> Self {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        Self { pan: size / 2.0 - world.to_vec2() * zoom, zoom }
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            pan: self.pan + (other.pan - self.pan) * t,
            zoom: self.zoom + (other.zoom - self.zoom) * t,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LinkState {
    Idle,
    /// A link gesture started on `from`; `pointer` is the world position the
    /// temporary line follows.
    LinkingFrom { from: NodeId, pointer: Pos2 },
}

#[derive(Copy, Clone, Debug)]
struct DragOverride {
    id: NodeId,
    pos: Pos2,
}

#[derive(Copy, Clone, Debug)]
struct ViewAnimation {
    from: ViewTransform,
    to: ViewTransform,
    start: f64,
    duration: f64,
}

impl ViewAnimation {
    fn sample(&self, now: f64) -> (ViewTransform, bool) {
        if self.duration <= 0.0 {
            return (self.to, true);
        }
        let t = ((now - self.start) / self.duration).clamp(0.0, 1.0) as f32;
        if t >= 1.0 {
            return (self.to, true);
        }
        // ease-in-out
        let eased = t * t * (3.0 - 2.0 * t);
        (self.from.lerp(&self.to, eased), false)
    }
}

#[derive(Clone, Debug)]
struct SearchFocus {
    matched: HashSet<NodeId>,
    restore_at: f64,
}

/// Outcome of finishing a freeform stroke.
#[derive(Clone, Debug, PartialEq)]
pub enum StrokeOutcome {
    TooShort,
    NotACircle { variance: f32 },
    Created(NodeId),
    /// Recognized a circle but the generated label is already taken.
    Rejected,
}

/// Interaction state of the mind-map canvas. Holds no graph data of its own: every
/// committed change goes through the `MindMapStore` passed in.
#[derive(Clone, Debug)]
pub struct CanvasController {
    pub config: CanvasConfig,
    pub view: ViewTransform,
    pub draw_mode: bool,
    link_state: LinkState,
    drag: Option<DragOverride>,
    hovered_node: Option<NodeId>,
    hovered_link: Option<LinkKey>,
    pending_delete: Option<LinkKey>,
    focus: Option<SearchFocus>,
    animation: Option<ViewAnimation>,
    stroke: Vec<Pos2>,
    stroking: bool,
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl CanvasController {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            config,
            view: ViewTransform::default(),
            draw_mode: false,
            link_state: LinkState::Idle,
            drag: None,
            hovered_node: None,
            hovered_link: None,
            pending_delete: None,
            focus: None,
            animation: None,
            stroke: Vec::new(),
            stroking: false,
        }
    }

    // ---- link state machine ----

    pub fn link_state(&self) -> &LinkState {
        &self.link_state
    }

    pub fn is_linking(&self) -> bool {
        matches!(self.link_state, LinkState::LinkingFrom { .. })
    }

    /// Plain click on a node: selects it, or completes a pending link gesture.
    pub fn click_node(&mut self, store: &mut MindMapStore, id: NodeId) {
        match self.link_state {
            LinkState::LinkingFrom { from, .. } => {
                if from != id && store.add_link(from, id) {
                    info!("linked {} -> {}", from, id);
                }
                self.link_state = LinkState::Idle;
            }
            LinkState::Idle => store.set_selected_node(Some(id)),
        }
    }

    /// Start-link gesture (Ctrl/Cmd + press) on `from`.
    pub fn begin_link(&mut self, store: &MindMapStore, from: NodeId, pointer: Pos2) {
        if store.contains_node(from) {
            self.link_state = LinkState::LinkingFrom { from, pointer };
        }
    }

    pub fn pointer_moved(&mut self, pointer: Pos2) {
        if let LinkState::LinkingFrom { pointer: p, .. } = &mut self.link_state {
            *p = pointer;
        }
    }

    /// Pointer released while linking. Over another node the link is created and the
    /// gesture ends; anywhere off a node it is cancelled. Returns true when a link was
    /// added.
    ///
    /// A release over the origin node is the one pointer-up that does not leave
    /// `LinkingFrom`: a Ctrl/Cmd click on a node arms the gesture without dragging, so
    /// it stays armed for a follow-up click on the target. From there a click on a
    /// node (the origin itself just disarms), Esc (`cancel_link`) or a background click
    /// ends it.
    pub fn pointer_released(&mut self, store: &mut MindMapStore, over: Option<NodeId>) -> bool {
        let LinkState::LinkingFrom { from, .. } = self.link_state else {
            return false;
        };
        match over {
            Some(target) if target == from => false,
            Some(target) => {
                self.link_state = LinkState::Idle;
                store.add_link(from, target)
            }
            None => {
                self.link_state = LinkState::Idle;
                false
            }
        }
    }

    pub fn cancel_link(&mut self) {
        self.link_state = LinkState::Idle;
    }

    /// World-space temporary line from the link origin to the pointer.
    pub fn temp_line(&self, store: &MindMapStore) -> Option<(Pos2, Pos2)> {
        match self.link_state {
            LinkState::LinkingFrom { from, pointer } => Some((self.effective_position(store, from)?, pointer)),
            LinkState::Idle => None,
        }
    }

    // ---- drag ----

    pub fn begin_drag(&mut self, store: &MindMapStore, id: NodeId) {
        if let Some(pos) = self.effective_position(store, id) {
            self.drag = Some(DragOverride { id, pos });
        }
    }

    pub fn drag_to(&mut self, pos: Pos2) {
        if let Some(d) = &mut self.drag {
            d.pos = pos;
        }
    }

    pub fn drag_by(&mut self, delta: Vec2) {
        if let Some(d) = &mut self.drag {
            d.pos += delta;
        }
    }

    pub fn dragging(&self) -> Option<NodeId> {
        self.drag.map(|d| d.id)
    }

    /// Commit the dragged position to the store.
    pub fn end_drag(&mut self, store: &mut MindMapStore) -> Option<NodeId> {
        let d = self.drag.take()?;
        store.set_node_position(d.id, d.pos.x, d.pos.y).then_some(d.id)
    }

    pub fn effective_position(&self, store: &MindMapStore, id: NodeId) -> Option<Pos2> {
        match self.drag {
            Some(d) if d.id == id => Some(d.pos),
            _ => store.get_node(id).map(|n| Pos2::new(n.x, n.y)),
        }
    }

    pub fn effective_positions(&self, store: &MindMapStore) -> HashMap<NodeId, Pos2> {
        store
            .nodes()
            .iter()
            .map(|n| (n.id, self.effective_position(store, n.id).unwrap_or(Pos2::new(n.x, n.y))))
            .collect()
    }

    // ---- hit testing ----

    /// Topmost node whose box contains `world`.
    pub fn node_at(&self, store: &MindMapStore, world: Pos2, measure: &dyn TextMeasure) -> Option<NodeId> {
        store.nodes().iter().rev().find_map(|n| {
            let center = self.effective_position(store, n.id)?;
            let size = node_size(&n.text, measure);
            Rect::from_center_size(center, Vec2::new(size.width, size.height))
                .contains(world)
                .then_some(n.id)
        })
    }

    /// Visible segment of a link in world space, trimmed at both node borders.
    pub fn link_segment(&self, store: &MindMapStore, key: LinkKey, measure: &dyn TextMeasure) -> Option<(Pos2, Pos2)> {
        let (src, dst) = (store.get_node(key.0)?, store.get_node(key.1)?);
        let a = self.effective_position(store, key.0)?;
        let b = self.effective_position(store, key.1)?;
        link_path(a, node_size(&src.text, measure).radius(), b, node_size(&dst.text, measure).radius())
    }

    pub fn link_at(&self, store: &MindMapStore, world: Pos2, measure: &dyn TextMeasure) -> Option<LinkKey> {
        let tolerance = self.config.link_hit_tolerance / self.view.zoom;
        store
            .links()
            .iter()
            .filter_map(|l| {
                let key = (l.source, l.target);
                let (a, b) = self.link_segment(store, key, measure)?;
                let d = point_segment_distance(world, a, b);
                (d <= tolerance).then_some((key, d))
            })
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(key, _)| key)
    }

    // ---- hover and link deletion ----

    pub fn set_hovered_node(&mut self, id: Option<NodeId>) {
        self.hovered_node = id;
    }

    pub fn hovered_node(&self) -> Option<NodeId> {
        self.hovered_node
    }

    /// Hovering a link marks it pending-delete; leaving hover clears the mark.
    pub fn set_hovered_link(&mut self, key: Option<LinkKey>) {
        if self.hovered_link != key {
            debug!("link hover {:?}", key);
        }
        self.hovered_link = key;
        self.pending_delete = key;
    }

    pub fn pending_delete(&self) -> Option<LinkKey> {
        self.pending_delete
    }

    /// True when the link should be drawn emphasized (hovered, or incident to the hovered node).
    pub fn is_link_emphasized(&self, key: LinkKey) -> bool {
        self.hovered_link == Some(key)
            || self.hovered_node.is_some_and(|id| key.0 == id || key.1 == id)
    }

    /// World-space center of the delete control of the pending link.
    pub fn delete_control(&self, store: &MindMapStore, measure: &dyn TextMeasure) -> Option<Pos2> {
        let key = self.pending_delete?;
        let (a, b) = self.link_segment(store, key, measure)?;
        Some(a + (b - a) / 2.0)
    }

    pub fn hits_delete_control(&self, store: &MindMapStore, world: Pos2, measure: &dyn TextMeasure) -> bool {
        self.delete_control(store, measure)
            .is_some_and(|c| c.distance(world) <= self.config.delete_control_radius / self.view.zoom)
    }

    pub fn delete_pending_link(&mut self, store: &mut MindMapStore) -> bool {
        let Some((source, target)) = self.pending_delete.take() else {
            return false;
        };
        self.hovered_link = None;
        let removed = store.remove_link(source, target);
        if removed {
            info!("removed link {} -> {}", source, target);
        }
        removed
    }

    // ---- search and focus ----

    /// Focus the first node matching `query`, dim everything else, and schedule the
    /// highlight to lift. A new search replaces any pending restore. Returns the
    /// focused node.
    pub fn search(&mut self, store: &MindMapStore, query: &str, viewport: Vec2, now: f64) -> Option<NodeId> {
        let query = query.trim();
        if query.is_empty() {
            self.focus = None;
            return None;
        }
        let Some(first) = store.find_first_match(query) else {
            self.focus = None;
            return None;
        };
        let target = self.effective_position(store, first.id)?;
        let matched = store.search_nodes(query).into_iter().map(|n| n.id).collect();
        self.focus = Some(SearchFocus { matched, restore_at: now + self.config.highlight_restore_secs });
        self.animation = Some(ViewAnimation {
            from: self.current_view(now),
            to: ViewTransform::centered_on(target, viewport, self.config.focus_zoom),
            start: now,
            duration: self.config.focus_animation_secs,
        });
        Some(first.id)
    }

    pub fn is_highlighting(&self) -> bool {
        self.focus.is_some()
    }

    pub fn highlight_deadline(&self) -> Option<f64> {
        self.focus.as_ref().map(|f| f.restore_at)
    }

    /// Whether `id` is dimmed by an active search highlight.
    pub fn is_dimmed(&self, id: NodeId) -> bool {
        self.focus.as_ref().is_some_and(|f| !f.matched.contains(&id))
    }

    pub fn is_link_dimmed(&self, key: LinkKey) -> bool {
        self.focus
            .as_ref()
            .is_some_and(|f| !(f.matched.contains(&key.0) && f.matched.contains(&key.1)))
    }

    /// Advance time-driven state: finish view animations and lift expired highlights.
    /// Returns true while something is still animating.
    pub fn tick(&mut self, now: f64) -> bool {
        if let Some(anim) = self.animation {
            let (view, done) = anim.sample(now);
            self.view = view;
            if done {
                self.animation = None;
            }
        }
        if self.focus.as_ref().is_some_and(|f| now >= f.restore_at) {
            debug!("search highlight restored");
            self.focus = None;
        }
        self.animation.is_some() || self.focus.is_some()
    }

    pub fn current_view(&self, now: f64) -> ViewTransform {
        match self.animation {
            Some(anim) => anim.sample(now).0,
            None => self.view,
        }
    }

    /// User pan/zoom takes over from a running focus animation.
    pub fn interrupt_animation(&mut self) {
        self.animation = None;
    }

    // ---- freeform stroke ----

    pub fn begin_stroke(&mut self, screen: Pos2) {
        self.stroke.clear();
        self.stroke.push(screen);
        self.stroking = true;
    }

    pub fn extend_stroke(&mut self, screen: Pos2) {
        if self.stroking {
            self.stroke.push(screen);
        }
    }

    pub fn stroke_points(&self) -> &[Pos2] {
        &self.stroke
    }

    /// Classify the finished stroke; a closed circle becomes a default-type node at the
    /// world-space centroid.
    pub fn finish_stroke(&mut self, store: &mut MindMapStore, origin: Pos2) -> StrokeOutcome {
        self.stroking = false;
        let points = std::mem::take(&mut self.stroke);
        if points.len() < self.config.circle_min_points {
            return StrokeOutcome::TooShort;
        }
        let (centroid, variance) = radial_variance(&points);
        if variance >= self.config.circle_max_variance {
            return StrokeOutcome::NotACircle { variance };
        }
        let world = self.view.to_world(origin, centroid);
        let label = format!("Node {}", store.node_count() + 1);
        let node = Node::new(label, DEFAULT_TYPE_ID).with_position(world.x, world.y);
        match store.add_node(node) {
            Some(id) => {
                // drawn nodes keep the spot they were drawn at
                store.set_node_position(id, world.x, world.y);
                StrokeOutcome::Created(id)
            }
            None => StrokeOutcome::Rejected,
        }
    }
}

/// Centroid of `points` and the variance of their distances to it.
pub fn radial_variance(points: &[Pos2]) -> (Pos2, f32) {
    if points.is_empty() {
        return (Pos2::ZERO, 0.0);
    }
    let n = points.len() as f32;
    let sum = points.iter().fold(Vec2::ZERO, |acc, p| acc + p.to_vec2());
    let centroid = (sum / n).to_pos2();
    let distances: Vec<f32> = points.iter().map(|p| p.distance(centroid)).collect();
    let mean = distances.iter().sum::<f32>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / n;
    (centroid, variance)
}

// Distance from point P to segment AB
pub fn point_segment_distance(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_sq();
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}
