use thiserror::Error;

use crate::ids::Ident;

/// An error encountered while building the node tree from a workflow model
/// (graph builder, port connector, dependency analyzer). Surfaced
/// synchronously from `Instance::initialize`; the instance is left
/// uninitialized.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error("module `{namespace}` declares port `{port}` more than once")]
	DuplicatePort { namespace: Ident, port: Ident },

	#[error("flow_ref `{uri}` referenced by `{module_id}` could not be loaded")]
	UnknownFlowRef {
		module_id: Ident,
		uri: String,
		#[source]
		source: flowmill_model::LoadError,
	},

	#[error("could not load the root flow")]
	LoadRoot(#[source] flowmill_model::LoadError),

	#[error("module `{module_id}` overrides outer port `{port}`, which the referenced flow does not declare")]
	UnknownOuterPort { module_id: Ident, port: Ident },

	#[error("port `{port}` links to `{target}`, which does not exist")]
	UnresolvedLink { port: Ident, target: Ident },

	#[error("port `{port}` links to `{target}`, which has not been connected yet")]
	LinkNotYetConnected { port: Ident, target: Ident },

	#[error("port `{port}` declares serializer `{expected}` but upstream `{upstream}` uses `{found}`")]
	SerializerMismatch {
		port: Ident,
		expected: Ident,
		upstream: Ident,
		found: Ident,
	},

	#[error("module `{module}` depends on `{target}`, which does not exist")]
	UnknownDependency { module: Ident, target: Ident },

	#[error("dependency graph has a cycle")]
	HasCycle,

	#[error("module id `{0}` is not known to this instance")]
	UnknownModule(Ident),
}

/// An error raised while the engine is running, or an invalid request made
/// of it.
#[derive(Debug, Error)]
pub enum RunError {
	#[error("invalid operation `{operation}` while instance is `{state}`")]
	InvalidOperation { operation: &'static str, state: &'static str },

	#[error("instance is already running")]
	AlreadyRunning,

	#[error(transparent)]
	Build(#[from] BuildError),

	#[error(transparent)]
	Scheduler(#[from] crate::scheduler::SchedulerError),

	#[error(transparent)]
	Storage(#[from] crate::storage::StorageError),

	#[error("task `{task_id}` raised an exception while the scheduler was waiting on it: {message}")]
	ExceptionWaiting { task_id: Ident, message: String },
}
