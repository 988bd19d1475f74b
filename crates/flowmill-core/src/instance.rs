use std::{
	path::{Path, PathBuf},
	sync::atomic::{AtomicBool, Ordering},
	time::Duration,
};

use flowmill_model::{ConfValue, FlowLoader};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
	build::{build_tree, Tree},
	config::InstanceConfig,
	depend::{assign_priorities, calculate_dependencies},
	errors::{BuildError, RunError},
	ids::Ident,
	node::{ModuleIdx, ModuleKind, TaskNode},
	partition,
	scheduler::{JobScheduler, TaskSubmission},
	state::State,
	storage::{Storage, StorageError, TaskRecord},
};

/// Engine-wide status, distinct from a module/task's [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
	Uninitialized,
	Ready,
	Running,
	Paused,
	Finished,
	Failed,
	/// An engine-internal error occurred (storage, scheduler bug); the
	/// instance must be re-`initialize`d before it can run again.
	Exception,
}

/// How long a single `run` iteration blocks on the job scheduler before
/// re-checking the stop flag. Not user-configurable: it only bounds
/// responsiveness to `stop()`, not task execution time.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

struct InstanceInner {
	tree: Option<Tree>,
	status: InstanceStatus,
}

/// The instance planner and runtime state machine.
///
/// Owns one workflow tree and drives it through the scheduler loop.
/// All mutable state lives behind a single [`Mutex`], acquired at iteration
/// boundaries and released around the blocking wait on the job scheduler,
/// so control accessors stay responsive while tasks run.
pub struct Instance {
	name: Ident,
	flow_name: Mutex<Ident>,
	config: InstanceConfig,
	loader: Box<dyn FlowLoader>,
	storage: Box<dyn Storage>,
	job_scheduler: Box<dyn JobScheduler>,
	inner: Mutex<InstanceInner>,
	stop_requested: AtomicBool,
	pause_requested: AtomicBool,
}

impl Instance {
	pub fn new(
		name: impl Into<Ident>,
		config: InstanceConfig,
		loader: Box<dyn FlowLoader>,
		storage: Box<dyn Storage>,
		job_scheduler: Box<dyn JobScheduler>,
	) -> Self {
		Self {
			name: name.into(),
			flow_name: Mutex::new(Ident::default()),
			config,
			loader,
			storage,
			job_scheduler,
			inner: Mutex::new(InstanceInner {
				tree: None,
				status: InstanceStatus::Uninitialized,
			}),
			stop_requested: AtomicBool::new(false),
			pause_requested: AtomicBool::new(false),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Build, connect, analyze and prioritize the tree, applying
	/// `start_module` if configured. Leaves the instance `Ready` to `run`.
	pub async fn initialize(&self, flow_file: &Path) -> Result<(), RunError> {
		let mut guard = self.inner.lock().await;
		if guard.status == InstanceStatus::Running {
			return Err(RunError::AlreadyRunning);
		}

		let root_model = self.loader.load_from_file(flow_file).map_err(BuildError::LoadRoot)?;
		*self.flow_name.lock().await = Ident::from(root_model.name.as_str());

		let mut tree = build_tree(self.loader.as_ref(), root_model, flow_file, &ConfValue::Null)?;
		crate::connect::connect_tree(&mut tree, self.storage.as_ref())?;
		calculate_dependencies(&mut tree)?;
		assign_priorities(&mut tree);

		if let Some(start) = &self.config.start_module {
			force_finished_before(&mut tree, start)?;
		}

		info!(message = "instance initialized", instance = %self.name, modules = tree.nodes.len());
		guard.tree = Some(tree);
		guard.status = InstanceStatus::Ready;
		Ok(())
	}

	/// Run the scheduler loop until no leaf remains `Waiting` and no
	/// further re-scheduling is required, or a `stop()` request lands, or a
	/// failure with `stop_on_errors` ends it early.
	pub async fn run(&self) -> Result<(), RunError> {
		{
			let mut guard = self.inner.lock().await;
			if guard.tree.is_none() {
				return Err(RunError::InvalidOperation {
					operation: "run",
					state: "uninitialized",
				});
			}
			if guard.status == InstanceStatus::Running {
				return Err(RunError::AlreadyRunning);
			}
			guard.status = InstanceStatus::Running;
		}
		self.stop_requested.store(false, Ordering::SeqCst);

		let result = self.run_loop().await;

		let mut guard = self.inner.lock().await;
		guard.status = match &result {
			Ok(()) => {
				let tree = guard.tree.as_ref().unwrap();
				if tree.get(tree.root).state == State::Failed {
					InstanceStatus::Failed
				} else {
					InstanceStatus::Finished
				}
			}
			Err(_) => InstanceStatus::Exception,
		};
		result
	}

	async fn run_loop(&self) -> Result<(), RunError> {
		loop {
			if self.stop_requested.load(Ordering::SeqCst) {
				warn!(message = "stop requested, ending scheduler loop", instance = %self.name);
				return Ok(());
			}

			if self.pause_requested.load(Ordering::SeqCst) {
				self.inner.lock().await.status = InstanceStatus::Paused;
				tokio::time::sleep(Duration::from_millis(100)).await;
				continue;
			}
			{
				let mut guard = self.inner.lock().await;
				if guard.status == InstanceStatus::Paused {
					guard.status = InstanceStatus::Running;
				}
			}

			let (submissions, require_rescheduling) = {
				let mut guard = self.inner.lock().await;
				let tree = guard.tree.as_mut().expect("initialized");
				let mut tasks = Vec::new();
				let require = plan(tree, &self.config, tree.root, &mut tasks);
				(tasks, require)
			};

			for sub in &submissions {
				self.submit_task(sub).await?;
			}

			let (any_waiting, any_failed) = {
				let guard = self.inner.lock().await;
				let tree = guard.tree.as_ref().expect("initialized");
				let any_waiting = tree.nodes.iter().any(|m| m.is_leaf() && m.state == State::Waiting);
				let any_failed = tree.get(tree.root).state == State::Failed;
				(any_waiting, any_failed)
			};

			if any_failed && self.config.stop_on_errors {
				warn!(message = "stopping: a task failed and stop_on_errors is set", instance = %self.name);
				return Ok(());
			}

			if !any_waiting && !require_rescheduling {
				return Ok(());
			}

			if !any_waiting {
				// Only newly-finished empty partitionings to account for;
				// no need to block on the job scheduler this iteration.
				continue;
			}

			let results = self.job_scheduler.wait(WAIT_TIMEOUT).await?;
			if results.is_empty() {
				continue;
			}

			let mut guard = self.inner.lock().await;
			let tree = guard.tree.as_mut().expect("initialized");
			for r in results {
				reap_task(tree, &r, self.config.auto_remove_task, self.storage.as_ref());
			}
		}
	}

	async fn submit_task(&self, sub: &TaskSubmission) -> Result<(), RunError> {
		let flow_name = self.flow_name.lock().await.clone();
		let record = {
			let guard = self.inner.lock().await;
			let tree = guard.tree.as_ref().expect("initialized");
			let (module_idx, task_index) = find_task(tree, &sub.task_id).ok_or_else(|| RunError::InvalidOperation {
				operation: "submit",
				state: "unknown task",
			})?;
			let module = tree.get(module_idx);
			TaskRecord {
				id: sub.task_id.clone(),
				module_id: module.id.clone(),
				flow_name,
				index: task_index as u32,
				conf: module.conf.clone(),
			}
		};
		self.storage.save_task_config(&record)?;

		let job_id = self.job_scheduler.submit(sub).await?;

		let mut guard = self.inner.lock().await;
		let tree = guard.tree.as_mut().expect("initialized");
		if let Some((module_idx, task_index)) = find_task(tree, &sub.task_id) {
			if let ModuleKind::Leaf { tasks } = &mut tree.get_mut(module_idx).kind {
				tasks[task_index].job_id = Some(job_id);
			}
		}
		Ok(())
	}

	/// Request the loop stop at the next iteration boundary. Does not
	/// cancel in-flight tasks.
	pub fn stop(&self) {
		self.stop_requested.store(true, Ordering::SeqCst);
	}

	/// Suspend planning/submission at the next iteration boundary. Tasks
	/// already submitted keep running; nothing new is submitted until
	/// [`Instance::cont`].
	pub fn pause(&self) {
		self.pause_requested.store(true, Ordering::SeqCst);
	}

	pub fn cont(&self) {
		self.pause_requested.store(false, Ordering::SeqCst);
	}

	pub async fn state(&self) -> Option<State> {
		let guard = self.inner.lock().await;
		guard.tree.as_ref().map(|t| t.get(t.root).state)
	}

	pub async fn status(&self) -> InstanceStatus {
		self.inner.lock().await.status
	}

	pub async fn module_state(&self, module_id: &str) -> Option<State> {
		let guard = self.inner.lock().await;
		let tree = guard.tree.as_ref()?;
		Some(tree.get(tree.resolve(module_id)?).state)
	}

	pub async fn module_conf(&self, module_id: &str) -> Option<ConfValue> {
		let guard = self.inner.lock().await;
		let tree = guard.tree.as_ref()?;
		Some(tree.get(tree.resolve(module_id)?).conf.clone())
	}

	pub async fn task_state(&self, module_id: &str, task_index: usize) -> Option<State> {
		let guard = self.inner.lock().await;
		let tree = guard.tree.as_ref()?;
		let module = tree.get(tree.resolve(module_id)?);
		module.tasks().get(task_index).map(|t| t.state)
	}

	/// A task's configuration: every task shares its owning module's fully
	/// merged `conf`, set once at `submit_task` and persisted into its
	/// [`TaskRecord`].
	pub async fn task_conf(&self, module_id: &str, task_index: usize) -> Option<ConfValue> {
		let guard = self.inner.lock().await;
		let tree = guard.tree.as_ref()?;
		let module = tree.get(tree.resolve(module_id)?);
		module.tasks().get(task_index)?;
		Some(module.conf.clone())
	}

	/// A task's combined stdout/stderr, unparsed, straight from storage.
	pub async fn task_output(&self, module_id: &str, task_index: u32) -> Result<String, StorageError> {
		self.storage.logs().raw_output(&self.name, module_id, task_index)
	}

	/// Every task output belonging to `module_id`, concatenated in task-index
	/// order under a header naming each task; tasks with no recorded output
	/// yet are skipped. Empty if the module doesn't exist.
	pub async fn module_output(&self, module_id: &str) -> String {
		let task_count = {
			let guard = self.inner.lock().await;
			let Some(tree) = guard.tree.as_ref() else {
				return String::new();
			};
			let Some(idx) = tree.resolve(module_id) else {
				return String::new();
			};
			tree.get(idx).tasks().len()
		};

		let mut out = String::new();
		for task_index in 0..task_count as u32 {
			let Ok(body) = self.storage.logs().raw_output(&self.name, module_id, task_index) else {
				continue;
			};
			let task_id = TaskNode::task_id(module_id, task_index);
			out.push_str(&format!("\n==[ {task_id} ]{}\n\n", "=".repeat(74usize.saturating_sub(task_id.len()))));
			out.push_str(&body);
		}
		out
	}
}

/// Compute a topological order over the `depends` graph via Kahn's
/// algorithm. Cycles are already rejected by [`calculate_dependencies`], so
/// this always produces a full ordering.
fn topo_order(tree: &Tree) -> Vec<ModuleIdx> {
	let n = tree.nodes.len();
	let mut indegree = vec![0usize; n];
	let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
	for (i, m) in tree.nodes.iter().enumerate() {
		for &dep in &m.depends {
			adjacency[dep.0].push(i);
			indegree[i] += 1;
		}
	}

	let mut queue: std::collections::VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
	let mut order = Vec::with_capacity(n);
	while let Some(i) = queue.pop_front() {
		order.push(ModuleIdx(i));
		for &j in &adjacency[i] {
			indegree[j] -= 1;
			if indegree[j] == 0 {
				queue.push_back(j);
			}
		}
	}
	order
}

/// Force every module preceding `start` in topological order to `Finished`,
/// then recompute every flow's state bottom-up.
fn force_finished_before(tree: &mut Tree, start: &str) -> Result<(), BuildError> {
	let start_idx = tree.resolve(start).ok_or_else(|| BuildError::UnknownModule(Ident::from(start)))?;
	let order = topo_order(tree);
	for idx in order {
		if idx == start_idx {
			break;
		}
		if tree.get(idx).is_leaf() {
			change_module_state(tree, idx, State::Finished);
		}
	}
	recompute_flow_states(tree, tree.root);
	Ok(())
}

fn recompute_flow_states(tree: &mut Tree, idx: ModuleIdx) {
	if tree.get(idx).is_leaf() {
		return;
	}
	let children = tree.get(idx).children().to_vec();
	for &child in &children {
		recompute_flow_states(tree, child);
	}
	let states: Vec<State> = children.iter().map(|&c| tree.get(c).state).collect();
	change_module_state(tree, idx, State::reduce(states.iter()));
}

/// Set `idx`'s state, and if it newly became `Finished`, clear it from every
/// dependent's `waiting` set.
fn change_module_state(tree: &mut Tree, idx: ModuleIdx, new_state: State) {
	let prev = tree.get(idx).state;
	if prev == new_state {
		return;
	}
	tree.get_mut(idx).state = new_state;
	if new_state == State::Finished {
		let notify = tree.get(idx).notify.clone();
		for n in notify {
			tree.get_mut(n).waiting.remove(&idx);
		}
	}
}

/// Recompute `idx`'s state from its current children and, if it changed,
/// keep walking up to the root.
fn propagate_up(tree: &mut Tree, idx: ModuleIdx) {
	let Some(parent) = tree.get(idx).parent else {
		return;
	};
	let states: Vec<State> = tree.get(parent).children().iter().map(|&c| tree.get(c).state).collect();
	let new_state = State::reduce(states.iter());
	if tree.get(parent).state == new_state {
		return;
	}
	change_module_state(tree, parent, new_state);
	propagate_up(tree, parent);
}

/// The planning pass (`_schedule_tasks`): partition every ready
/// leaf with no outstanding dependency, update flow states bottom-up, and
/// report whether another pass is warranted (an empty partitioning may have
/// unblocked siblings).
fn plan(tree: &mut Tree, config: &InstanceConfig, idx: ModuleIdx, out: &mut Vec<TaskSubmission>) -> bool {
	let mut require_rescheduling = false;

	if tree.get(idx).is_leaf() {
		let ready = tree.get(idx).state == State::Ready && tree.get(idx).waiting.is_empty();
		if ready {
			let tasks = partition::partition_leaf(tree, config, idx);
			let module = tree.get(idx);
			let module_id = module.id.clone();
			let priority = module.priority;

			if tasks.is_empty() {
				partition::install_tasks(tree, idx, tasks);
				change_module_state(tree, idx, State::Finished);
				require_rescheduling = true;
			} else {
				let work_path = config.work_path.clone();
				for task in &tasks {
					out.push(TaskSubmission {
						task_id: task.id.clone(),
						module_id: module_id.clone(),
						task_record_path: work_path.join("tasks").join(format!("{}.json", task.id)),
						priority,
					});
				}
				partition::install_tasks(tree, idx, tasks);
				change_module_state(tree, idx, State::Waiting);
			}
		}
	} else {
		let children = tree.get(idx).children().to_vec();
		for child in children {
			require_rescheduling |= plan(tree, config, child, out);
		}
		let states: Vec<State> = tree.get(idx).children().iter().map(|&c| tree.get(c).state).collect();
		change_module_state(tree, idx, State::reduce(states.iter()));
	}

	require_rescheduling
}

fn find_task(tree: &Tree, task_id: &str) -> Option<(ModuleIdx, usize)> {
	for (i, m) in tree.nodes.iter().enumerate() {
		if let ModuleKind::Leaf { tasks } = &m.kind {
			if let Some(ti) = tasks.iter().position(|t| t.id.as_str() == task_id) {
				return Some((ModuleIdx(i), ti));
			}
		}
	}
	None
}

/// Apply one job result to its task and leaf, then propagate the leaf's new
/// state (if any) to the root.
fn reap_task(tree: &mut Tree, result: &crate::scheduler::JobResult, auto_remove: bool, storage: &dyn Storage) {
	let Some((module_idx, task_index)) = find_task(tree, &result.task_id) else {
		error!(message = "job result for unknown task", task_id = %result.task_id);
		return;
	};

	let ok = result.reason.is_success();
	if !ok {
		error!(message = "task failed", task_id = %result.task_id, reason = ?result.reason, text = %result.message);
	}
	if let ModuleKind::Leaf { tasks } = &mut tree.get_mut(module_idx).kind {
		tasks[task_index].state = if ok { State::Finished } else { State::Failed };
	}

	let module = tree.get(module_idx);
	let any_failed = module.tasks().iter().any(|t| t.state == State::Failed);
	let all_finished = module.tasks().iter().all(|t| t.state == State::Finished);
	let new_state = if any_failed {
		State::Failed
	} else if all_finished {
		State::Finished
	} else {
		State::Waiting
	};

	if tree.get(module_idx).state != new_state {
		change_module_state(tree, module_idx, new_state);
		propagate_up(tree, module_idx);
	}

	if auto_remove && all_finished && !any_failed {
		if let Err(source) = storage.remove_task_config(&result.task_id) {
			warn!(message = "could not remove task record after reap", task_id = %result.task_id, %source);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::HashMap as StdHashMap, sync::Arc};

	use async_trait::async_trait;
	use flowmill_model::{FlowModel, LoadError, ModuleModel, PortModel};

	use super::*;
	use crate::{
		node::PortNode,
		scheduler::{ExitReason, JobResult, SchedulerError},
		storage::{PortData, PortDataHandle, TaskLogLine, TaskLogs},
	};

	#[derive(Debug)]
	struct MemData {
		size: u64,
	}

	impl PortData for MemData {
		fn size(&self) -> u64 {
			self.size
		}

		fn get_partition(&self) -> PortDataHandle {
			Arc::new(MemData { size: 0 })
		}

		fn get_slice(&self, _start: u64, size: u64) -> PortDataHandle {
			Arc::new(MemData { size })
		}

		fn sources(&self) -> Vec<PortDataHandle> {
			vec![]
		}
	}

	struct MemStorage;

	impl Storage for MemStorage {
		fn create_port_data(&self, port: &PortNode) -> PortDataHandle {
			Arc::new(MemData { size: port.wsize.unwrap_or(0) })
		}

		fn create_port_linked_data(&self, _port: &PortNode, upstream: PortDataHandle) -> PortDataHandle {
			upstream
		}

		fn create_port_joined_data(&self, _port: &PortNode, upstreams: Vec<PortDataHandle>) -> PortDataHandle {
			let size = upstreams.iter().map(|u| u.size()).sum();
			Arc::new(MemData { size })
		}

		fn save_task_config(&self, _task: &TaskRecord) -> Result<(), crate::storage::StorageError> {
			Ok(())
		}

		fn remove_task_config(&self, _task_id: &str) -> Result<(), crate::storage::StorageError> {
			Ok(())
		}

		fn logs(&self) -> &dyn TaskLogs {
			struct NoLogs;
			impl TaskLogs for NoLogs {
				fn exists(&self, _instance_name: &str, _module_id: &str, _task_index: u32) -> bool {
					false
				}

				fn query(&self, _instance_name: &str, _module_id: &str, _task_index: u32) -> Result<Vec<TaskLogLine>, crate::storage::StorageError> {
					Ok(vec![])
				}

				fn raw_output(&self, _instance_name: &str, _module_id: &str, _task_index: u32) -> Result<String, crate::storage::StorageError> {
					Err(crate::storage::StorageError::NoLogs { task_id: Ident::from("") })
				}
			}
			static NO_LOGS: NoLogs = NoLogs;
			&NO_LOGS
		}
	}

	/// A job scheduler that completes every submitted task successfully on
	/// its first `wait`.
	struct ImmediateScheduler {
		pending: Mutex<Vec<Ident>>,
	}

	impl ImmediateScheduler {
		fn new() -> Self {
			Self { pending: Mutex::new(Vec::new()) }
		}
	}

	#[async_trait]
	impl JobScheduler for ImmediateScheduler {
		async fn start(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn clean(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn submit(&self, task: &TaskSubmission) -> Result<Ident, SchedulerError> {
			self.pending.lock().await.push(task.task_id.clone());
			Ok(task.task_id.clone())
		}

		async fn wait(&self, _timeout: Duration) -> Result<Vec<JobResult>, SchedulerError> {
			let mut pending = self.pending.lock().await;
			let results = pending
				.drain(..)
				.map(|task_id| JobResult {
					task_id,
					reason: ExitReason::Success,
					message: String::new(),
					exception: None,
					output_path: PathBuf::new(),
				})
				.collect();
			Ok(results)
		}

		async fn stop(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn exit(&self) -> Result<(), SchedulerError> {
			Ok(())
		}
	}

	/// A job scheduler that fails every submitted task on its first `wait`.
	struct FailingScheduler {
		pending: Mutex<Vec<Ident>>,
	}

	impl FailingScheduler {
		fn new() -> Self {
			Self { pending: Mutex::new(Vec::new()) }
		}
	}

	#[async_trait]
	impl JobScheduler for FailingScheduler {
		async fn start(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn clean(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn submit(&self, task: &TaskSubmission) -> Result<Ident, SchedulerError> {
			self.pending.lock().await.push(task.task_id.clone());
			Ok(task.task_id.clone())
		}

		async fn wait(&self, _timeout: Duration) -> Result<Vec<JobResult>, SchedulerError> {
			let mut pending = self.pending.lock().await;
			let results = pending
				.drain(..)
				.map(|task_id| JobResult {
					task_id,
					reason: ExitReason::Unknown,
					message: "boom".to_string(),
					exception: None,
					output_path: PathBuf::new(),
				})
				.collect();
			Ok(results)
		}

		async fn stop(&self) -> Result<(), SchedulerError> {
			Ok(())
		}

		async fn exit(&self) -> Result<(), SchedulerError> {
			Ok(())
		}
	}

	struct StaticLoader(StdHashMap<String, FlowModel>);

	impl FlowLoader for StaticLoader {
		fn load_from_file(&self, path: &Path) -> Result<FlowModel, LoadError> {
			self.load_from_ref(path.to_str().unwrap(), Path::new(""))
		}

		fn load_from_ref(&self, uri: &str, _relative_to: &Path) -> Result<FlowModel, LoadError> {
			self.0.get(uri).cloned().ok_or_else(|| LoadError::Io {
				path: uri.into(),
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
			})
		}
	}

	fn port(name: &str, wsize: Option<u64>, link: &[&str]) -> PortModel {
		PortModel {
			name: name.into(),
			wsize,
			link: link.iter().map(|s| s.to_string()).collect(),
			..Default::default()
		}
	}

	fn test_config() -> InstanceConfig {
		InstanceConfig {
			work_path: "/tmp/flowmill-test".into(),
			clean: false,
			stop_on_errors: true,
			default_wsize: 1,
			default_maxpar: 0,
			start_module: None,
			scheduler: "local".into(),
			auto_remove_task: false,
		}
	}

	#[tokio::test]
	async fn linear_pipeline_runs_to_completion() {
		// `a` is a source of total size 100; `b` and `c` each consume it in
		// slices of 25, so every module partitions into 4 tasks.
		let model = FlowModel {
			name: "lin".into(),
			modules: vec![
				ModuleModel {
					name: "a".into(),
					out_ports: vec![port("out", Some(100), &[])],
					..Default::default()
				},
				ModuleModel {
					name: "b".into(),
					in_ports: vec![port("in", Some(25), &["a.out"])],
					out_ports: vec![port("out", Some(100), &[])],
					..Default::default()
				},
				ModuleModel {
					name: "c".into(),
					in_ports: vec![port("in", Some(25), &["b.out"])],
					..Default::default()
				},
			],
			..Default::default()
		};
		let mut flows = StdHashMap::new();
		flows.insert("lin".to_string(), model);
		let loader = StaticLoader(flows);

		let instance = Instance::new(
			"lin-run",
			test_config(),
			Box::new(loader),
			Box::new(MemStorage),
			Box::new(ImmediateScheduler::new()),
		);

		instance.initialize(Path::new("lin")).await.unwrap();
		instance.run().await.unwrap();

		assert_eq!(instance.status().await, InstanceStatus::Finished);
		assert_eq!(instance.module_state("lin.a").await, Some(State::Finished));
		assert_eq!(instance.module_state("lin.b").await, Some(State::Finished));
		assert_eq!(instance.module_state("lin.c").await, Some(State::Finished));
		assert_eq!(instance.state().await, Some(State::Finished));
	}

	#[tokio::test]
	async fn empty_source_finishes_without_submission() {
		// Single leaf, empty input: the partitioner should finish it without
		// ever submitting a task.
		let model = FlowModel {
			name: "empty".into(),
			modules: vec![ModuleModel {
				name: "only".into(),
				// No declared `wsize`: the port falls back to the instance
				// default (floored at 1), so with a size-0 input the
				// partitioner's case 4 (`ceil(0 / mwsize)`) yields zero
				// tasks rather than case 3's single-task escape hatch.
				in_ports: vec![port("in", None, &[])],
				..Default::default()
			}],
			..Default::default()
		};
		let mut flows = StdHashMap::new();
		flows.insert("empty".to_string(), model);
		let loader = StaticLoader(flows);
		let instance = Instance::new(
			"empty-run",
			test_config(),
			Box::new(loader),
			Box::new(MemStorage),
			Box::new(ImmediateScheduler::new()),
		);
		instance.initialize(Path::new("empty")).await.unwrap();

		instance.run().await.unwrap();

		assert_eq!(instance.module_state("empty.only").await, Some(State::Finished));
		// Zero tasks were ever partitioned, so there is no index 0 to find.
		assert_eq!(instance.task_state("empty.only", 0).await, None);
	}

	#[tokio::test]
	async fn failing_task_stops_the_run_when_stop_on_errors_is_set() {
		let model = FlowModel {
			name: "fail".into(),
			modules: vec![ModuleModel {
				name: "only".into(),
				in_ports: vec![port("in", Some(10), &[])],
				..Default::default()
			}],
			..Default::default()
		};
		let mut flows = StdHashMap::new();
		flows.insert("fail".to_string(), model);
		let loader = StaticLoader(flows);

		let instance = Instance::new(
			"fail-run",
			test_config(),
			Box::new(loader),
			Box::new(MemStorage),
			Box::new(FailingScheduler::new()),
		);
		instance.initialize(Path::new("fail")).await.unwrap();

		instance.run().await.unwrap();

		assert_eq!(instance.status().await, InstanceStatus::Failed);
		assert_eq!(instance.module_state("fail.only").await, Some(State::Failed));
		assert_eq!(instance.state().await, Some(State::Failed));
	}
}
