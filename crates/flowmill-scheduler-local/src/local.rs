use std::{collections::HashMap, path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use flowmill_core::{ExitReason, Ident, JobResult, JobScheduler, SchedulerError, TaskSubmission};
use tokio::{
	io::AsyncReadExt,
	process::Command,
	sync::{mpsc, Mutex},
	task::JoinHandle,
};
use tracing::{error, warn};

use crate::config::LocalSchedulerConfig;

/// A [`JobScheduler`] that runs every task as a child process on the local
/// machine, the shipped default backend. One `tokio::spawn`ed
/// supervisor per task reads its combined stdout/stderr, persists it under
/// `output/<task-id>.txt`, and reports the exit status back through an
/// unbounded channel that `wait` drains.
pub struct LocalScheduler {
	config: LocalSchedulerConfig,
	tx: mpsc::UnboundedSender<JobResult>,
	rx: Mutex<mpsc::UnboundedReceiver<JobResult>>,
	/// `task_id -> job_id`, so a duplicate `submit` of an already-running
	/// task is a no-op that returns the existing job id.
	jobs: Mutex<HashMap<Ident, Ident>>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalScheduler {
	pub fn new(config: LocalSchedulerConfig) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			config,
			tx,
			rx: Mutex::new(rx),
			jobs: Mutex::new(HashMap::new()),
			handles: Mutex::new(Vec::new()),
		}
	}
}

#[async_trait]
impl JobScheduler for LocalScheduler {
	async fn start(&self) -> Result<(), SchedulerError> {
		tokio::fs::create_dir_all(&self.config.output_path)
			.await
			.map_err(|e| SchedulerError::Start(Box::new(e)))
	}

	async fn clean(&self) -> Result<(), SchedulerError> {
		if self.config.output_path.exists() {
			tokio::fs::remove_dir_all(&self.config.output_path)
				.await
				.map_err(|e| SchedulerError::Start(Box::new(e)))?;
		}
		self.start().await
	}

	async fn submit(&self, task: &TaskSubmission) -> Result<Ident, SchedulerError> {
		let mut jobs = self.jobs.lock().await;
		if let Some(existing) = jobs.get(&task.task_id) {
			return Ok(existing.clone());
		}
		let job_id = task.task_id.clone();
		jobs.insert(task.task_id.clone(), job_id.clone());
		drop(jobs);

		let output_path = self.config.output_path.join(format!("{}.txt", task.task_id));
		let worker_command = self.config.worker_command.clone();
		let record_path = task.task_record_path.clone();
		let task_id = task.task_id.clone();
		let tx = self.tx.clone();

		let handle = tokio::spawn(async move {
			let result = run_task(&worker_command, &record_path, &output_path, &task_id).await;
			if tx.send(result).is_err() {
				error!(message = "job result dropped, no receiver", task_id = %task_id);
			}
		});
		self.handles.lock().await.push(handle);

		Ok(job_id)
	}

	async fn wait(&self, timeout: Duration) -> Result<Vec<JobResult>, SchedulerError> {
		let mut rx = self.rx.lock().await;
		let mut results = Vec::new();
		match tokio::time::timeout(timeout, rx.recv()).await {
			Ok(Some(first)) => results.push(first),
			Ok(None) => {
				return Err(SchedulerError::Wait(Box::new(std::io::Error::new(
					std::io::ErrorKind::BrokenPipe,
					"job result channel closed, no submitters remain",
				))))
			}
			Err(_) => return Ok(results),
		}
		while let Ok(next) = rx.try_recv() {
			results.push(next);
		}
		Ok(results)
	}

	async fn stop(&self) -> Result<(), SchedulerError> {
		for handle in self.handles.lock().await.drain(..) {
			handle.abort();
		}
		Ok(())
	}

	async fn exit(&self) -> Result<(), SchedulerError> {
		self.stop().await
	}
}

/// Spawn `worker_command record_path`, capture its combined output, and wait
/// for it to exit. Never returns `Err`: spawn/io failures are folded into the
/// [`JobResult`] as an exception, matching the job-scheduler contract's "a
/// task failure is reported, never raised" shape.
async fn run_task(worker_command: &str, record_path: &Path, output_path: &Path, task_id: &Ident) -> JobResult {
	let child = Command::new(worker_command)
		.arg(record_path)
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn();

	let mut child = match child {
		Ok(child) => child,
		Err(source) => {
			error!(message = "failed to spawn task worker", task_id = %task_id, %source);
			return JobResult {
				task_id: task_id.clone(),
				reason: ExitReason::Unknown,
				message: format!("failed to spawn worker: {source}"),
				exception: Some(source.to_string()),
				output_path: output_path.to_path_buf(),
			};
		}
	};

	let mut combined = Vec::new();
	if let Some(mut out) = child.stdout.take() {
		let _ = out.read_to_end(&mut combined).await;
	}
	if let Some(mut err) = child.stderr.take() {
		let _ = err.read_to_end(&mut combined).await;
	}

	if let Err(source) = tokio::fs::write(output_path, &combined).await {
		warn!(message = "could not persist task output", task_id = %task_id, %source);
	}

	match child.wait().await {
		Ok(status) if status.success() => JobResult {
			task_id: task_id.clone(),
			reason: ExitReason::Success,
			message: String::new(),
			exception: None,
			output_path: output_path.to_path_buf(),
		},
		Ok(status) => JobResult {
			task_id: task_id.clone(),
			reason: ExitReason::from_code(status.code().unwrap_or(-1)),
			message: format!("exited with {status}"),
			exception: None,
			output_path: output_path.to_path_buf(),
		},
		Err(source) => JobResult {
			task_id: task_id.clone(),
			reason: ExitReason::ExceptionWaiting,
			message: format!("error waiting for task: {source}"),
			exception: Some(source.to_string()),
			output_path: output_path.to_path_buf(),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(dir: &Path) -> LocalSchedulerConfig {
		LocalSchedulerConfig {
			worker_command: "/usr/bin/true".to_string(),
			output_path: dir.to_path_buf(),
		}
	}

	fn submission(dir: &Path) -> TaskSubmission {
		TaskSubmission {
			task_id: Ident::from("m-0000"),
			module_id: Ident::from("m"),
			task_record_path: dir.join("tasks").join("m-0000.json"),
			priority: 0.0,
		}
	}

	#[tokio::test]
	async fn successful_task_reports_success() {
		let dir = std::env::temp_dir().join("flowmill-scheduler-local-test-success");
		let scheduler = LocalScheduler::new(config(&dir));
		scheduler.start().await.unwrap();

		let task = submission(&dir);
		scheduler.submit(&task).await.unwrap();
		let results = scheduler.wait(Duration::from_secs(5)).await.unwrap();

		assert_eq!(results.len(), 1);
		assert_eq!(results[0].task_id, task.task_id);
		assert_eq!(results[0].reason, ExitReason::Success);
		tokio::fs::remove_dir_all(&dir).await.ok();
	}

	#[tokio::test]
	async fn failing_task_reports_task_exception() {
		let dir = std::env::temp_dir().join("flowmill-scheduler-local-test-fail");
		let mut cfg = config(&dir);
		cfg.worker_command = "/usr/bin/false".to_string();
		let scheduler = LocalScheduler::new(cfg);
		scheduler.start().await.unwrap();

		let task = submission(&dir);
		scheduler.submit(&task).await.unwrap();
		let results = scheduler.wait(Duration::from_secs(5)).await.unwrap();

		assert_eq!(results.len(), 1);
		assert_eq!(results[0].reason, ExitReason::TaskException);
		tokio::fs::remove_dir_all(&dir).await.ok();
	}

	#[tokio::test]
	async fn duplicate_submit_returns_existing_job_id() {
		let dir = std::env::temp_dir().join("flowmill-scheduler-local-test-dup");
		let scheduler = LocalScheduler::new(config(&dir));
		scheduler.start().await.unwrap();

		let task = submission(&dir);
		let first = scheduler.submit(&task).await.unwrap();
		let second = scheduler.submit(&task).await.unwrap();
		assert_eq!(first, second);

		// Only one supervisor was ever spawned for this task id.
		let results = scheduler.wait(Duration::from_secs(5)).await.unwrap();
		assert_eq!(results.len(), 1);
		tokio::fs::remove_dir_all(&dir).await.ok();
	}
}
