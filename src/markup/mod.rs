pub mod command_interface;
pub mod markup_syntax;
