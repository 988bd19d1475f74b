use std::{
	fmt::Debug,
	hash::{Hash, Hasher},
	sync::Arc,
};

use serde::Serialize;
use thiserror::Error;

use crate::{
	ids::Ident,
	node::{PortMode, PortNode},
};

/// An error raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("i/o error at `{path}`")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("could not serialize task record for `{task_id}`")]
	Serialize {
		task_id: Ident,
		#[source]
		source: serde_json::Error,
	},

	#[error("task `{task_id}` has no logs yet")]
	NoLogs { task_id: Ident },
}

/// A handle to a logical byte/record stream living on shared storage.
///
/// Source ports own freshly allocated data; linked ports own a view (or, for
/// a join, a concatenation of views) over one or more upstreams. Storage
/// implementations decide how bytes actually move; the core only ever calls
/// these four operations.
pub trait PortData: Send + Sync + Debug {
	/// Records currently available for reading.
	fn size(&self) -> u64;

	/// Acquire a fresh, appendable partition. Tasks write their output here.
	fn get_partition(&self) -> PortDataHandle;

	/// Acquire a read-only view into a contiguous range `[start, start+size)`.
	fn get_slice(&self, start: u64, size: u64) -> PortDataHandle;

	/// The upstream handles this one is derived from. A source's `sources`
	/// is itself; a join's `sources` is every upstream it concatenates.
	fn sources(&self) -> Vec<PortDataHandle>;
}

pub type PortDataHandle = Arc<dyn PortData>;

/// A [`PortDataHandle`] wrapper with pointer identity, for use as a map/set
/// key in the dependency analyzer: two handles are the same key iff
/// they point at the same underlying allocation, regardless of what `size`
/// or `sources` report.
#[derive(Clone, Debug)]
pub struct PortDataKey(pub PortDataHandle);

impl PartialEq for PortDataKey {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for PortDataKey {}

impl Hash for PortDataKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		(Arc::as_ptr(&self.0) as *const ()).hash(state)
	}
}

/// The persisted form of a task, written to `tasks/<task-id>.json` by the
/// default filesystem storage.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
	pub id: Ident,
	pub module_id: Ident,
	pub flow_name: Ident,
	pub index: u32,
	pub conf: flowmill_model::ConfValue,
}

/// A line of a task's combined stdout/stderr log.
#[derive(Debug, Clone)]
pub struct TaskLogLine {
	pub timestamp: String,
	pub task_id: Ident,
	pub level: String,
	pub text: String,
}

pub trait TaskLogs: Send + Sync {
	fn exists(&self, instance_name: &str, module_id: &str, task_index: u32) -> bool;

	fn query(&self, instance_name: &str, module_id: &str, task_index: u32) -> Result<Vec<TaskLogLine>, StorageError>;

	/// The task's combined stdout/stderr, unparsed, for `task_output`.
	fn raw_output(&self, instance_name: &str, module_id: &str, task_index: u32) -> Result<String, StorageError>;
}

/// The storage contract: allocates [`PortData`] and persists task
/// records and logs. The default implementation is filesystem-backed
/// (`flowmill-storage-fs`); the core only ever calls through this trait.
pub trait Storage: Send + Sync {
	fn create_port_data(&self, port: &PortNode) -> PortDataHandle;

	fn create_port_linked_data(&self, port: &PortNode, upstream: PortDataHandle) -> PortDataHandle;

	fn create_port_joined_data(&self, port: &PortNode, upstreams: Vec<PortDataHandle>) -> PortDataHandle;

	fn save_task_config(&self, task: &TaskRecord) -> Result<(), StorageError>;

	/// Delete a task's persisted record, used when `auto_remove_task` is set.
	fn remove_task_config(&self, task_id: &str) -> Result<(), StorageError>;

	fn logs(&self) -> &dyn TaskLogs;
}

/// Allocate the right kind of storage handle for a port given its resolved
/// `link` targets (empty ⇒ source, one ⇒ view, many ⇒ join).
pub fn allocate(storage: &dyn Storage, port: &PortNode, upstreams: Vec<PortDataHandle>) -> PortDataHandle {
	debug_assert!(matches!(port.mode, PortMode::In | PortMode::Out));
	match upstreams.len() {
		0 => storage.create_port_data(port),
		1 => storage.create_port_linked_data(port, upstreams.into_iter().next().unwrap()),
		_ => storage.create_port_joined_data(port, upstreams),
	}
}
