pub mod graph;
pub mod history;
pub mod node_types;
