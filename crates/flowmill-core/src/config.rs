use std::path::PathBuf;

use serde::Deserialize;

use crate::ids::Ident;

/// The options the core consumes. The CLI binary loads
/// these from environment variables / `.env` via `envy` and passes them
/// straight through; the core itself never touches the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
	/// Root directory for `ports/`, `tasks/`, `output/`.
	pub work_path: PathBuf,

	/// Wipe `work_path` at `initialize`.
	#[serde(default)]
	pub clean: bool,

	/// Stop submitting new batches once any task fails.
	#[serde(default = "default_stop_on_errors")]
	pub stop_on_errors: bool,

	/// Default work size for a port/module that doesn't specify one.
	#[serde(default = "default_wsize")]
	pub default_wsize: u64,

	/// Default max-parallelism; 0 = unbounded.
	#[serde(default)]
	pub default_maxpar: u64,

	/// Dotted id of a module; every module before it in topological order is
	/// forced to `Finished` at `initialize`.
	#[serde(default)]
	pub start_module: Option<Ident>,

	/// Name of the job scheduler backend to use.
	#[serde(default = "default_scheduler")]
	pub scheduler: String,

	/// Delete a task's persisted record after it is reaped.
	#[serde(default)]
	pub auto_remove_task: bool,
}

fn default_stop_on_errors() -> bool {
	true
}

fn default_wsize() -> u64 {
	1
}

fn default_scheduler() -> String {
	"local".to_string()
}

impl InstanceConfig {
	/// `effective_wsize`: the port's own `wsize`, else the module's,
	/// else the instance default (the default alone is floored at 1; an
	/// explicit `0` on a port or module is honoured literally and surfaces as
	/// partitioner case 3, "no partitioning").
	pub fn effective_wsize(&self, port_wsize: Option<u64>, module_wsize: Option<u64>) -> u64 {
		port_wsize.or(module_wsize).unwrap_or_else(|| self.default_wsize.max(1))
	}

	/// `effective_maxpar`: `min(instance.maxpar, module.maxpar)`,
	/// treating 0 as "no limit" — 0 wins only when *both* sides are 0.
	pub fn effective_maxpar(&self, module_maxpar: Option<u64>) -> u64 {
		let module_maxpar = module_maxpar.unwrap_or(0);
		match (self.default_maxpar, module_maxpar) {
			(0, 0) => 0,
			(0, m) => m,
			(i, 0) => i,
			(i, m) => i.min(m),
		}
	}
}
