pub mod logging;
pub mod program;
