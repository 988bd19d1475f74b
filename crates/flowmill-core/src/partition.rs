use tracing::warn;

use crate::{
	build::Tree,
	config::InstanceConfig,
	node::{ModuleIdx, ModuleKind, TaskNode},
	state::State,
};

/// Partition a ready leaf into tasks. Returns the produced tasks;
/// an empty result means the leaf is done without ever submitting work.
pub(crate) fn partition_leaf(tree: &mut Tree, config: &InstanceConfig, idx: ModuleIdx) -> Vec<TaskNode> {
	let module = tree.get(idx);
	debug_assert!(module.is_leaf());

	let psizes: Vec<u64> = module.in_ports.iter().map(|p| p.data().size()).collect();
	let mwsize_floor = module
		.in_ports
		.iter()
		.map(|p| config.effective_wsize(p.wsize, module.wsize))
		.min();

	let module_id = module.id.clone();
	let maxpar = config.effective_maxpar(module.maxpar);

	if psizes.is_empty() {
		// Case 1: no input ports.
		let mut task = TaskNode {
			index: 0,
			id: TaskNode::task_id(&module_id, 0),
			state: State::Ready,
			in_port_data: Vec::new(),
			out_port_data: Vec::new(),
			job_id: None,
		};
		let module = tree.get(idx);
		for p in &module.out_ports {
			task.out_port_data.push(p.data().get_partition());
		}
		return vec![task];
	}

	let first = psizes[0];
	let unequal = psizes.iter().any(|&s| s != first);

	if unequal {
		// Case 2: unequal input sizes.
		warn!(message = "module has inputs of unequal size, emitting a single task", module = %module_id);
		return vec![bind_single_task(tree, idx, &module_id)];
	}

	let psize = first;
	let mwsize = mwsize_floor.unwrap_or(1);

	if mwsize == 0 {
		// Case 3: empty-size inputs with a zero effective wsize.
		warn!(message = "module has empty input and zero wsize, emitting a single task", module = %module_id);
		return vec![bind_single_task(tree, idx, &module_id)];
	}

	// Case 4: normal partitioning.
	let mut num_partitions = div_ceil(psize, mwsize);
	let mut mwsize = mwsize;
	if maxpar > 0 && num_partitions > maxpar {
		mwsize = div_ceil(psize, maxpar);
		num_partitions = div_ceil(psize, mwsize);
	}

	let mut tasks = Vec::with_capacity(num_partitions as usize);
	let mut start = 0u64;
	for i in 0..num_partitions {
		let end = (start + mwsize).min(psize);
		let size = end - start;

		let mut task = TaskNode {
			index: i as u32,
			id: TaskNode::task_id(&module_id, i as u32),
			state: State::Ready,
			in_port_data: Vec::new(),
			out_port_data: Vec::new(),
			job_id: None,
		};
		let module = tree.get(idx);
		for p in &module.in_ports {
			task.in_port_data.push(p.data().get_slice(start, size));
		}
		for p in &module.out_ports {
			task.out_port_data.push(p.data().get_partition());
		}
		tasks.push(task);

		start += mwsize;
	}
	tasks
}

fn bind_single_task(tree: &Tree, idx: ModuleIdx, module_id: &str) -> TaskNode {
	let module = tree.get(idx);
	let mut task = TaskNode {
		index: 0,
		id: TaskNode::task_id(module_id, 0),
		state: State::Ready,
		in_port_data: Vec::new(),
		out_port_data: Vec::new(),
		job_id: None,
	};
	for p in &module.in_ports {
		let size = p.data().size();
		task.in_port_data.push(p.data().get_slice(0, size));
	}
	for p in &module.out_ports {
		task.out_port_data.push(p.data().get_partition());
	}
	task
}

fn div_ceil(a: u64, b: u64) -> u64 {
	(a + b - 1) / b
}

/// Install `tasks` on the leaf and return whether it has any (an empty
/// partitioning finishes the leaf immediately).
pub(crate) fn install_tasks(tree: &mut Tree, idx: ModuleIdx, tasks: Vec<TaskNode>) -> bool {
	let has_tasks = !tasks.is_empty();
	if let ModuleKind::Leaf { tasks: slot } = &mut tree.get_mut(idx).kind {
		*slot = tasks;
	}
	has_tasks
}

#[cfg(test)]
mod tests {
	use std::{path::Path, sync::Arc};

	use flowmill_model::{FlowModel, ModuleModel, PortModel};

	use super::*;
	use crate::{
		build::build_tree,
		storage::{PortData, PortDataHandle},
	};

	#[derive(Debug)]
	struct FixedData {
		size: u64,
	}

	impl PortData for FixedData {
		fn size(&self) -> u64 {
			self.size
		}

		fn get_partition(&self) -> PortDataHandle {
			Arc::new(FixedData { size: 0 })
		}

		fn get_slice(&self, _start: u64, size: u64) -> PortDataHandle {
			Arc::new(FixedData { size })
		}

		fn sources(&self) -> Vec<PortDataHandle> {
			vec![]
		}
	}

	struct FixedStorage;

	impl crate::storage::Storage for FixedStorage {
		fn create_port_data(&self, port: &crate::node::PortNode) -> PortDataHandle {
			let size = port.wsize.unwrap_or(100);
			Arc::new(FixedData { size })
		}

		fn create_port_linked_data(&self, _port: &crate::node::PortNode, upstream: PortDataHandle) -> PortDataHandle {
			upstream
		}

		fn create_port_joined_data(&self, _port: &crate::node::PortNode, upstreams: Vec<PortDataHandle>) -> PortDataHandle {
			let size = upstreams.iter().map(|u| u.size()).sum();
			Arc::new(FixedData { size })
		}

		fn save_task_config(&self, _task: &crate::storage::TaskRecord) -> Result<(), crate::storage::StorageError> {
			Ok(())
		}

		fn remove_task_config(&self, _task_id: &str) -> Result<(), crate::storage::StorageError> {
			Ok(())
		}

		fn logs(&self) -> &dyn crate::storage::TaskLogs {
			struct NoLogs;
			impl crate::storage::TaskLogs for NoLogs {
				fn exists(&self, _instance_name: &str, _module_id: &str, _task_index: u32) -> bool {
					false
				}

				fn query(
					&self,
					_instance_name: &str,
					_module_id: &str,
					_task_index: u32,
				) -> Result<Vec<crate::storage::TaskLogLine>, crate::storage::StorageError> {
					Ok(vec![])
				}
			}
			static NO_LOGS: NoLogs = NoLogs;
			&NO_LOGS
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

	fn single_leaf_tree(in_wsize: Option<u64>, in_size: u64, maxpar: Option<u64>) -> (Tree, ModuleIdx) {
		let model = FlowModel {
			name: "f".into(),
			modules: vec![ModuleModel {
				name: "m".into(),
				maxpar,
				in_ports: vec![port("in", in_wsize, &[])],
				out_ports: vec![port("out", None, &[])],
				..Default::default()
			}],
			..Default::default()
		};
		struct NoLoader;
		impl flowmill_model::FlowLoader for NoLoader {
			fn load_from_file(&self, _path: &Path) -> Result<FlowModel, flowmill_model::LoadError> {
				unreachable!()
			}

			fn load_from_ref(&self, _uri: &str, _relative_to: &Path) -> Result<FlowModel, flowmill_model::LoadError> {
				unreachable!()
			}
		}
		let mut tree = build_tree(&NoLoader, model, Path::new("f.toml"), &flowmill_model::ConfValue::Null).unwrap();
		let leaf = tree.resolve("f.m").unwrap();
		// Fix the input port's data to a specific size rather than whatever
		// the storage default would allocate.
		tree.get_mut(leaf).in_ports[0].data = Some(Arc::new(FixedData { size: in_size }));
		tree.get_mut(leaf).out_ports[0].data = Some(Arc::new(FixedData { size: 0 }));
		(tree, leaf)
	}

	#[test]
	fn exact_division() {
		let (mut tree, leaf) = single_leaf_tree(Some(25), 100, None);
		let config = InstanceConfig {
			work_path: "/tmp".into(),
			clean: false,
			stop_on_errors: true,
			default_wsize: 1,
			default_maxpar: 0,
			start_module: None,
			scheduler: "local".into(),
			auto_remove_task: false,
		};
		let tasks = partition_leaf(&mut tree, &config, leaf);
		assert_eq!(tasks.len(), 4);
		assert_eq!(tasks[3].in_port_data[0].size(), 25);
	}

	#[test]
	fn maxpar_cap_recomputes_wsize() {
		let (mut tree, leaf) = single_leaf_tree(Some(10), 100, Some(3));
		let config = InstanceConfig {
			work_path: "/tmp".into(),
			clean: false,
			stop_on_errors: true,
			default_wsize: 1,
			default_maxpar: 0,
			start_module: None,
			scheduler: "local".into(),
			auto_remove_task: false,
		};
		let tasks = partition_leaf(&mut tree, &config, leaf);
		assert_eq!(tasks.len(), 3);
	}

	#[test]
	fn empty_input_emits_zero_tasks_capable_single_task() {
		let (mut tree, leaf) = single_leaf_tree(Some(0), 0, None);
		let config = InstanceConfig {
			work_path: "/tmp".into(),
			clean: false,
			stop_on_errors: true,
			default_wsize: 1,
			default_maxpar: 0,
			start_module: None,
			scheduler: "local".into(),
			auto_remove_task: false,
		};
		let tasks = partition_leaf(&mut tree, &config, leaf);
		assert_eq!(tasks.len(), 1);
		assert_eq!(tasks[0].in_port_data[0].size(), 0);
	}
}
