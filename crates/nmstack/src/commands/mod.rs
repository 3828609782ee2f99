pub mod install_runtime;
pub mod plan;
pub mod render;
pub mod up;
