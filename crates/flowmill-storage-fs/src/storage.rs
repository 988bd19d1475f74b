use std::{
	fs,
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

use flowmill_core::{PortDataHandle, PortNode, Storage, StorageError, TaskLogs, TaskRecord};

use crate::{logs::FsTaskLogs, port_data::FsPortData};

/// Filesystem layout rooted at `work_path`:
///
/// ```text
/// <root>/ports/<n>-<port-name>/   numbered partition files for a source port
/// <root>/tasks/<task-id>.json     a persisted TaskRecord
/// <root>/output/<task-id>.txt     a task's combined stdout/stderr log
/// ```
pub struct FsStorage {
	root: PathBuf,
	next_port: AtomicU64,
	logs: FsTaskLogs,
}

impl FsStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let output_path = root.join("output");
		Self {
			root,
			next_port: AtomicU64::new(0),
			logs: FsTaskLogs::new(output_path),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn ports_path(&self) -> PathBuf {
		self.root.join("ports")
	}

	pub fn tasks_path(&self) -> PathBuf {
		self.root.join("tasks")
	}

	pub fn output_path(&self) -> PathBuf {
		self.root.join("output")
	}

	/// Every port connected through `create_port_data`/`create_port_linked_data`
	/// shares the instance-wide port counter, so two ports named the same
	/// (e.g. "out" on two different leaves) never collide on disk even though
	/// a bare [`PortNode`] carries no owning-module context.
	fn fresh_port_dir(&self, port: &PortNode) -> PathBuf {
		let n = self.next_port.fetch_add(1, Ordering::SeqCst);
		self.ports_path().join(format!("{n:06}-{}", port.name))
	}

	pub fn prepare(&self) -> Result<(), StorageError> {
		for dir in [self.ports_path(), self.tasks_path(), self.output_path()] {
			fs::create_dir_all(&dir).map_err(|source| StorageError::Io { path: dir.display().to_string(), source })?;
		}
		Ok(())
	}

	pub fn clean(&self) -> Result<(), StorageError> {
		if self.root.exists() {
			fs::remove_dir_all(&self.root).map_err(|source| StorageError::Io { path: self.root.display().to_string(), source })?;
		}
		self.prepare()
	}
}

impl Storage for FsStorage {
	fn create_port_data(&self, port: &PortNode) -> PortDataHandle {
		std::sync::Arc::new(FsPortData::source(self.fresh_port_dir(port)))
	}

	fn create_port_linked_data(&self, _port: &PortNode, upstream: PortDataHandle) -> PortDataHandle {
		// A single link is a pass-through: this port reads exactly what its
		// upstream produced, so it shares the same handle.
		upstream
	}

	fn create_port_joined_data(&self, _port: &PortNode, upstreams: Vec<PortDataHandle>) -> PortDataHandle {
		std::sync::Arc::new(FsPortData::join(upstreams))
	}

	fn save_task_config(&self, task: &TaskRecord) -> Result<(), StorageError> {
		let path = self.tasks_path().join(format!("{}.json", task.id));
		let body = serde_json::to_vec_pretty(task).map_err(|source| StorageError::Serialize { task_id: task.id.clone(), source })?;
		fs::write(&path, body).map_err(|source| StorageError::Io { path: path.display().to_string(), source })
	}

	fn remove_task_config(&self, task_id: &str) -> Result<(), StorageError> {
		let path = self.tasks_path().join(format!("{task_id}.json"));
		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(StorageError::Io { path: path.display().to_string(), source }),
		}
	}

	fn logs(&self) -> &dyn TaskLogs {
		&self.logs
	}
}
