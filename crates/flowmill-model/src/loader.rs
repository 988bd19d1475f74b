use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::FlowModel;

/// An error encountered while loading a flow definition.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error("could not read flow file `{path}`")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("could not parse flow file `{path}`")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

/// Produces [`FlowModel`]s from wherever flows are stored.
///
/// The core engine depends only on this trait, never on a concrete file
/// format: `initialize` calls `load_from_file` once for the root flow, and
/// the graph builder calls `load_from_ref` for every `flow_ref` it
/// encounters while expanding the tree.
pub trait FlowLoader: Send + Sync {
	/// Load the root flow from a path.
	fn load_from_file(&self, path: &Path) -> Result<FlowModel, LoadError>;

	/// Load a flow referenced by `uri`, resolved relative to `relative_to`
	/// (the file that contains the `flow_ref`).
	fn load_from_ref(&self, uri: &str, relative_to: &Path) -> Result<FlowModel, LoadError>;
}
