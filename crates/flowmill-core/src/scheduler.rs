use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::Ident;

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("could not start the job scheduler backend")]
	Start(#[source] Box<dyn std::error::Error + Send + Sync>),

	#[error("could not submit task `{task_id}`")]
	Submit {
		task_id: Ident,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},

	#[error("error while waiting for tasks to complete")]
	Wait(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Why a task's job exited: distinguishes a clean `exit.code`/`exit.message`
/// result from the `exit.exception` case that forces `EXCEPTION_WAITING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
	Success,
	Unknown,
	ExceptionWaiting,
	TaskException,
}

impl ExitReason {
	pub fn from_code(code: i32) -> Self {
		if code == 0 {
			Self::Success
		} else {
			Self::TaskException
		}
	}

	pub fn is_success(self) -> bool {
		matches!(self, Self::Success)
	}
}

/// A task descriptor handed to the job scheduler at submit time.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
	pub task_id: Ident,
	pub module_id: Ident,
	/// Path to the persisted task record (`tasks/<task-id>.json`), which the
	/// worker program reads to find its config and port bindings.
	pub task_record_path: PathBuf,
	pub priority: f64,
}

/// The outcome of one task's job, returned from `wait`.
#[derive(Debug, Clone)]
pub struct JobResult {
	pub task_id: Ident,
	pub reason: ExitReason,
	pub message: String,
	pub exception: Option<String>,
	pub output_path: PathBuf,
}

/// The job scheduler contract: `start/clean/submit/wait/stop/exit`.
/// Concrete backends (local process pool, DRMAA, ...) are registered by
/// name from [`crate::InstanceConfig::scheduler`]; the engine never depends
/// on a specific one.
#[async_trait]
pub trait JobScheduler: Send + Sync {
	async fn start(&self) -> Result<(), SchedulerError>;

	async fn clean(&self) -> Result<(), SchedulerError>;

	/// Idempotent relative to `task.task_id`: submitting the same task id
	/// twice (e.g. after a control-plane retry) is a no-op that returns the
	/// existing job id rather than starting a second job.
	async fn submit(&self, task: &TaskSubmission) -> Result<Ident, SchedulerError>;

	/// Block up to `timeout` waiting for at least one task to complete;
	/// returns immediately once any have. An empty result is not an error.
	async fn wait(&self, timeout: Duration) -> Result<Vec<JobResult>, SchedulerError>;

	async fn stop(&self) -> Result<(), SchedulerError>;

	async fn exit(&self) -> Result<(), SchedulerError>;
}
