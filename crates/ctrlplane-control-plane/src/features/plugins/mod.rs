pub mod hooks;
pub mod registry;

pub use hooks::*;
pub use registry::{HookFailureListener, PluginRegistry};
