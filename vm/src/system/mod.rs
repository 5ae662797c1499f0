pub mod program;
pub mod system;
