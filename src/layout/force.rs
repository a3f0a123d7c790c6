use std::collections::{HashMap, HashSet};

use egui::{Pos2, Vec2};
use log::debug;

use crate::graph_utils::graph::{Link, MindMapStore, NodeId, DEFAULT_LINK_DISTANCE};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ForceParams {
    /// Link spring stiffness (units/s^2 per unit of stretch).
    pub link_strength: f32,
    /// Preferred link length when the link carries no distance of its own.
    pub target_distance: f32,
    pub repulsion_strength: f32,
    /// Pairs closer than this push apart.
    pub min_separation: f32,
    pub damping: f32,
    pub max_speed: f32,
    /// Displacement clamp per step.
    pub max_step: f32,
    /// Total kinetic energy below which a run counts as settled.
    pub energy_threshold: f32,
    pub max_steps: u32,
    /// Move nodes horizontally only, so every node stays on its level row.
    pub lock_rows: bool,
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            link_strength: 4.0,
            target_distance: DEFAULT_LINK_DISTANCE,
            repulsion_strength: 10.0,
            min_separation: 90.0,
            damping: 6.0,
            max_speed: 600.0,
            max_step: 5.0,
            energy_threshold: 0.5,
            max_steps: 600,
            lock_rows: true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Positions were updated; the run continues.
    Moved { energy: f32 },
    /// The run ended this step (low energy, zero strengths or step cap).
    Settled,
    /// No run is active.
    Stopped,
    /// The caller's generation no longer matches the active run; nothing was written.
    Stale,
}

/// Spring-damper refinement driven one tick at a time by the host.
///
/// A run only moves the nodes it was started with; every other node still pulls
/// and pushes but keeps its position.
#[derive(Clone, Debug, Default)]
pub struct ForceRefiner {
    pub params: ForceParams,
    generation: Option<u64>,
    movable: HashSet<NodeId>,
    velocities: HashMap<NodeId, Vec2>,
    steps: u32,
}

impl ForceRefiner {
    pub fn new(params: ForceParams) -> Self {
        Self { params, ..Default::default() }
    }

    /// Begin a new run bound to `generation` that may move only `movable`; any older
    /// run is abandoned.
    pub fn restart(&mut self, generation: u64, movable: impl IntoIterator<Item = NodeId>) {
        self.generation = Some(generation);
        self.movable = movable.into_iter().collect();
        self.velocities.clear();
        self.steps = 0;
    }

    pub fn stop(&mut self) {
        self.generation = None;
        self.movable.clear();
        self.velocities.clear();
    }

    /// Take `id` out of the active run, e.g. once the user has placed it by hand.
    pub fn freeze(&mut self, id: NodeId) {
        self.movable.remove(&id);
        self.velocities.remove(&id);
    }

    pub fn is_movable(&self, id: NodeId) -> bool {
        self.movable.contains(&id)
    }

    pub fn is_running(&self) -> bool {
        self.generation.is_some()
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn step(
        &mut self,
        generation: u64,
        positions: &mut HashMap<NodeId, Pos2>,
        links: &[Link],
        pinned: &HashSet<NodeId>,
        dt: f32,
    ) -> StepOutcome {
        let Some(active) = self.generation else {
            return StepOutcome::Stopped;
        };
        if active != generation {
            return StepOutcome::Stale;
        }
        let p = self.params;
        if (p.link_strength == 0.0 && p.repulsion_strength == 0.0) || self.movable.is_empty() {
            self.stop();
            return StepOutcome::Settled;
        }

        let forces = self.accumulate_forces(positions, links);

        let mut energy = 0.0;
        for (id, pos) in positions.iter_mut() {
            if pinned.contains(id) || !self.movable.contains(id) {
                self.velocities.remove(id);
                continue;
            }
            let mut v = self.velocities.get(id).copied().unwrap_or(Vec2::ZERO);
            let mut f = forces.get(id).copied().unwrap_or(Vec2::ZERO);
            if p.lock_rows {
                f.y = 0.0;
                v.y = 0.0;
            }
            // unit mass: a = f - c*v
            v += (f - v * p.damping) * dt;
            let speed = v.length();
            if speed > p.max_speed {
                v *= p.max_speed / speed;
            }
            let mut step = v * dt;
            let step_len = step.length();
            if step_len > p.max_step {
                step *= p.max_step / step_len;
            }
            *pos += step;
            energy += 0.5 * v.length_sq();
            self.velocities.insert(*id, v);
        }

        self.steps += 1;
        if energy < p.energy_threshold || self.steps >= p.max_steps {
            debug!("force refinement settled after {} steps (energy {:.3})", self.steps, energy);
            self.stop();
            return StepOutcome::Settled;
        }
        StepOutcome::Moved { energy }
    }

    /// One step over `positions` (the store's positions plus any transient overrides),
    /// committing moved nodes back to the store.
    pub fn step_store(
        &mut self,
        generation: u64,
        store: &mut MindMapStore,
        mut positions: HashMap<NodeId, Pos2>,
        pinned: &HashSet<NodeId>,
        dt: f32,
    ) -> StepOutcome {
        let before = positions.clone();
        let movable = self.movable.clone();
        let outcome = self.step(generation, &mut positions, store.links(), pinned, dt);
        if matches!(outcome, StepOutcome::Moved { .. } | StepOutcome::Settled) {
            for (id, p) in positions {
                if movable.contains(&id) && !pinned.contains(&id) && before.get(&id) != Some(&p) {
                    store.set_node_position(id, p.x, p.y);
                }
            }
        }
        outcome
    }

    fn accumulate_forces(&self, positions: &HashMap<NodeId, Pos2>, links: &[Link]) -> HashMap<NodeId, Vec2> {
        let p = self.params;
        let mut forces: HashMap<NodeId, Vec2> = HashMap::new();

        // Springs: attract when stretched, repel when compressed.
        for link in links {
            let (Some(pa), Some(pb)) = (positions.get(&link.source), positions.get(&link.target)) else {
                continue;
            };
            let delta = *pb - *pa;
            let dist = delta.length();
            if dist <= 1e-3 {
                continue;
            }
            let mut target = link.distance.unwrap_or(p.target_distance);
            if p.lock_rows {
                // rows are fixed, so the rest length is a horizontal offset
                target = target.hypot(delta.y);
            }
            let f = delta / dist * (p.link_strength * (dist - target));
            *forces.entry(link.source).or_insert(Vec2::ZERO) += f;
            *forces.entry(link.target).or_insert(Vec2::ZERO) -= f;
        }

        let ids: Vec<(NodeId, Pos2)> = positions.iter().map(|(k, v)| (*k, *v)).collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, pa) = ids[i];
                let (b, pb) = ids[j];
                let delta = pb - pa;
                let dist = delta.length();
                if dist <= 1e-3 || dist >= p.min_separation {
                    continue;
                }
                let f = delta / dist * (p.repulsion_strength * (p.min_separation - dist));
                *forces.entry(a).or_insert(Vec2::ZERO) -= f;
                *forces.entry(b).or_insert(Vec2::ZERO) += f;
            }
        }
        forces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pair(distance: f32) -> (NodeId, NodeId, HashMap<NodeId, Pos2>) {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut positions = HashMap::new();
        positions.insert(a, Pos2::new(0.0, 0.0));
        positions.insert(b, Pos2::new(distance, 0.0));
        (a, b, positions)
    }

    #[test]
    fn stretched_link_pulls_endpoints_together() {
        let (a, b, mut positions) = pair(400.0);
        let links = vec![Link::new(a, b)];
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(1, [a, b]);
        for _ in 0..10 {
            refiner.step(1, &mut positions, &links, &HashSet::new(), 1.0 / 60.0);
        }
        let gap = positions[&b].x - positions[&a].x;
        assert!(gap < 400.0, "gap was {gap}");
    }

    #[test]
    fn stale_generation_writes_nothing() {
        let (a, b, mut positions) = pair(400.0);
        let before = positions.clone();
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(2, [a, b]);
        let out = refiner.step(1, &mut positions, &[Link::new(a, b)], &HashSet::new(), 0.016);
        assert_eq!(out, StepOutcome::Stale);
        assert_eq!(positions, before);
    }

    #[test]
    fn zero_strengths_mean_static_placement() {
        let (a, b, mut positions) = pair(400.0);
        let before = positions.clone();
        let params = ForceParams { link_strength: 0.0, repulsion_strength: 0.0, ..Default::default() };
        let mut refiner = ForceRefiner::new(params);
        refiner.restart(7, [a, b]);
        let out = refiner.step(7, &mut positions, &[Link::new(a, b)], &HashSet::new(), 0.016);
        assert_eq!(out, StepOutcome::Settled);
        assert!(!refiner.is_running());
        assert_eq!(positions, before);
        assert_eq!(refiner.step(7, &mut positions, &[], &HashSet::new(), 0.016), StepOutcome::Stopped);
    }

    #[test]
    fn pinned_nodes_stay_put() {
        let (a, b, mut positions) = pair(400.0);
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(1, [a, b]);
        let pinned: HashSet<NodeId> = [a].into_iter().collect();
        refiner.step(1, &mut positions, &[Link::new(a, b)], &pinned, 0.016);
        assert_eq!(positions[&a], Pos2::new(0.0, 0.0));
        assert!(positions[&b].x < 400.0);
    }

    #[test]
    fn resting_graph_settles_immediately() {
        let (a, b, mut positions) = pair(DEFAULT_LINK_DISTANCE);
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(3, [a, b]);
        let out = refiner.step(3, &mut positions, &[Link::new(a, b)], &HashSet::new(), 0.016);
        assert_eq!(out, StepOutcome::Settled);
    }

    #[test]
    fn locked_rows_only_move_sideways() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut positions = HashMap::new();
        positions.insert(a, Pos2::new(0.0, 0.0));
        positions.insert(b, Pos2::new(400.0, 150.0));
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(1, [b]);
        for _ in 0..120 {
            let out = refiner.step(1, &mut positions, &[Link::new(a, b)], &HashSet::new(), 1.0 / 60.0);
            if !matches!(out, StepOutcome::Moved { .. }) {
                break;
            }
        }
        assert_eq!(positions[&a], Pos2::new(0.0, 0.0));
        assert_eq!(positions[&b].y, 150.0);
        assert!(positions[&b].x < 400.0);
    }

    #[test]
    fn frozen_node_leaves_the_run() {
        let (a, b, mut positions) = pair(400.0);
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(1, [a, b]);
        refiner.freeze(b);
        assert!(!refiner.is_movable(b));
        refiner.step(1, &mut positions, &[Link::new(a, b)], &HashSet::new(), 0.016);
        assert_eq!(positions[&b], Pos2::new(400.0, 0.0));
        assert!(positions[&a].x > 0.0);
    }

    #[test]
    fn run_without_movable_nodes_settles() {
        let (a, b, mut positions) = pair(400.0);
        let before = positions.clone();
        let mut refiner = ForceRefiner::new(ForceParams::default());
        refiner.restart(4, Vec::<NodeId>::new());
        assert_eq!(refiner.step(4, &mut positions, &[Link::new(a, b)], &HashSet::new(), 0.016), StepOutcome::Settled);
        assert_eq!(positions, before);
    }
}
