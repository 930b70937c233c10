pub mod error;
pub mod registry;

pub use error::PluginError;
pub use registry::{PluginEntry, PluginRegistry, PluginSource};
