use serde::Deserialize;

/// Knobs for the local process-pool backend, loaded under the
/// `schedulers.local.*` namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSchedulerConfig {
	/// Program invoked for every task; receives the task record path as its
	/// sole argument. Defaults to a worker binary expected on `PATH`.
	#[serde(default = "LocalSchedulerConfig::default_worker_command")]
	pub worker_command: String,

	/// Directory combined stdout/stderr logs are written under
	/// (`<work_path>/output/<task-id>.txt`).
	pub output_path: std::path::PathBuf,
}

impl LocalSchedulerConfig {
	fn default_worker_command() -> String {
		"flowmill-worker".to_string()
	}
}
