pub mod graph_utils;
pub mod gui;
pub mod layout;
pub mod markup;
pub mod persistence;
