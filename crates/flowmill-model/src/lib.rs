//! The workflow definition model: the data the graph builder consumes.
//!
//! This crate intentionally knows nothing about how a flow is executed; it
//! only describes *what was declared*. Loading is abstracted behind
//! [`FlowLoader`] so the core engine never depends on a file format.

mod conf;
mod loader;
mod toml_loader;
mod types;

pub use conf::ConfValue;
pub use loader::{FlowLoader, LoadError};
pub use toml_loader::TomlFlowLoader;
pub use types::{FlowModel, ModuleModel, PortModel};
