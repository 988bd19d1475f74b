use flowmill_core::{Ident, InstanceConfig};
use flowmill_scheduler_local::LocalSchedulerConfig;
use flowmill_util::logging::LoggingPreset;
use serde::Deserialize;

/// Environment-sourced knobs, loaded by `envy`/`.env`.
/// Note the flat, snake_case fields: envy is case-insensitive and doesn't
/// understand nested structs, so the instance and scheduler configs it
/// feeds are assembled from this one struct rather than deserialized
/// directly.
#[derive(Debug, Deserialize, Clone)]
pub struct FlowmilldConfig {
	/// Root directory for `ports/`, `tasks/`, `output/`.
	pub work_path: std::path::PathBuf,

	#[serde(default)]
	pub clean: bool,

	#[serde(default = "FlowmilldConfig::default_stop_on_errors")]
	pub stop_on_errors: bool,

	#[serde(default = "FlowmilldConfig::default_wsize")]
	pub default_wsize: u64,

	#[serde(default)]
	pub default_maxpar: u64,

	#[serde(default)]
	pub start_module: Option<Ident>,

	#[serde(default = "FlowmilldConfig::default_scheduler")]
	pub scheduler: String,

	#[serde(default)]
	pub auto_remove_task: bool,

	/// Program invoked for every task by the local scheduler backend.
	#[serde(default = "FlowmilldConfig::default_worker_command")]
	pub worker_command: String,

	#[serde(default)]
	pub loglevel: LoggingPreset,
}

impl FlowmilldConfig {
	fn default_stop_on_errors() -> bool {
		true
	}

	fn default_wsize() -> u64 {
		1
	}

	fn default_scheduler() -> String {
		"local".to_string()
	}

	fn default_worker_command() -> String {
		"flowmill-worker".to_string()
	}

	pub fn instance_config(&self) -> InstanceConfig {
		InstanceConfig {
			work_path: self.work_path.clone(),
			clean: self.clean,
			stop_on_errors: self.stop_on_errors,
			default_wsize: self.default_wsize,
			default_maxpar: self.default_maxpar,
			start_module: self.start_module.clone(),
			scheduler: self.scheduler.clone(),
			auto_remove_task: self.auto_remove_task,
		}
	}

	pub fn local_scheduler_config(&self) -> LocalSchedulerConfig {
		LocalSchedulerConfig {
			worker_command: self.worker_command.clone(),
			output_path: self.work_path.join("output"),
		}
	}
}
