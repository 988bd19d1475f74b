use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::trace;

use crate::{
	loader::{FlowLoader, LoadError},
	types::FlowModel,
};

#[derive(Deserialize)]
struct FlowDoc {
	flow: FlowModel,
}

/// The default [`FlowLoader`]: one flow per TOML file, under a `[flow]`
/// table. A `flow_ref` is a path resolved relative to the directory of the
/// file that references it.
#[derive(Debug, Default)]
pub struct TomlFlowLoader;

impl TomlFlowLoader {
	pub fn new() -> Self {
		Self
	}

	fn load_path(&self, path: &Path) -> Result<FlowModel, LoadError> {
		trace!(message = "Loading flow", path = ?path);

		let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
			path: path.to_path_buf(),
			source,
		})?;

		let doc: FlowDoc = toml::from_str(&text).map_err(|source| LoadError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

		Ok(doc.flow)
	}
}

impl FlowLoader for TomlFlowLoader {
	fn load_from_file(&self, path: &Path) -> Result<FlowModel, LoadError> {
		self.load_path(path)
	}

	fn load_from_ref(&self, uri: &str, relative_to: &Path) -> Result<FlowModel, LoadError> {
		let base = relative_to.parent().unwrap_or_else(|| Path::new("."));
		let resolved: PathBuf = base.join(uri);
		self.load_path(&resolved)
	}
}
