pub mod force;
pub mod levels;
pub mod placement;
pub mod sizing;

use serde::{Deserialize, Serialize};

/// How nodes sharing a level are ordered left to right.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelOrdering {
    /// Store insertion order.
    #[default]
    Insertion,
    /// Descending total degree (in + out links); ties keep insertion order.
    Degree,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LayoutConfig {
    pub spacing_x: f32,
    pub spacing_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub ordering: LevelOrdering,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            spacing_x: 250.0,
            spacing_y: 150.0,
            offset_x: 100.0,
            offset_y: 50.0,
            ordering: LevelOrdering::Insertion,
        }
    }
}
