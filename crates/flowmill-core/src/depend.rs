use std::collections::{BTreeSet, HashMap, HashSet};

use flowmill_util::graph::{graph::Graph, GraphNodeIdx};

use crate::{
	build::Tree,
	errors::BuildError,
	ids::join,
	node::ModuleIdx,
	storage::PortDataKey,
};

/// Compute `depends`/`notify`/`waiting` for every module and reject
/// cyclic dependency graphs.
pub(crate) fn calculate_dependencies(tree: &mut Tree) -> Result<(), BuildError> {
	let mut mod_source_map: HashMap<ModuleIdx, HashSet<PortDataKey>> = HashMap::new();
	let mut source_map: HashMap<PortDataKey, HashSet<ModuleIdx>> = HashMap::new();

	prepare(tree, tree.root, &mut mod_source_map, &mut source_map);
	apply(tree, tree.root, &mod_source_map, &source_map)?;
	check_cycles(tree)?;
	Ok(())
}

fn prepare(
	tree: &Tree,
	idx: ModuleIdx,
	mod_source_map: &mut HashMap<ModuleIdx, HashSet<PortDataKey>>,
	source_map: &mut HashMap<PortDataKey, HashSet<ModuleIdx>>,
) {
	let m = tree.get(idx);
	let mut sources = HashSet::new();
	for port in &m.in_ports {
		let data = port.data();
		let upstreams = data.sources();
		if upstreams.is_empty() {
			sources.insert(PortDataKey(data.clone()));
		} else {
			sources.extend(upstreams.into_iter().map(PortDataKey));
		}
	}
	mod_source_map.entry(idx).or_default().extend(sources);

	for port in &m.out_ports {
		source_map.entry(PortDataKey(port.data().clone())).or_default().insert(idx);
	}

	for &child in m.children() {
		prepare(tree, child, mod_source_map, source_map);
	}
}

fn apply(
	tree: &mut Tree,
	idx: ModuleIdx,
	mod_source_map: &HashMap<ModuleIdx, HashSet<PortDataKey>>,
	source_map: &HashMap<PortDataKey, HashSet<ModuleIdx>>,
) -> Result<(), BuildError> {
	let (namespace, explicit, module_id) = {
		let m = tree.get(idx);
		(m.namespace.clone(), m.explicit_depends.clone(), m.id.clone())
	};

	let mut depends = BTreeSet::new();
	let mut notify_targets = Vec::new();

	for name in &explicit {
		let dep_id = join(&namespace, name);
		let dep_idx = tree.resolve(&dep_id).ok_or_else(|| BuildError::UnknownDependency {
			module: module_id.clone(),
			target: dep_id.clone(),
		})?;
		depends.insert(dep_idx);
		notify_targets.push(dep_idx);
	}

	if let Some(sources) = mod_source_map.get(&idx) {
		for source in sources {
			if let Some(producers) = source_map.get(source) {
				for &p in producers {
					depends.insert(p);
					notify_targets.push(p);
				}
			}
		}
	}

	let waiting = depends.clone();
	{
		let m = tree.get_mut(idx);
		m.depends = depends;
		m.waiting = waiting;
	}
	for dep_idx in notify_targets {
		tree.get_mut(dep_idx).notify.insert(idx);
	}

	let children = tree.get(idx).children().to_vec();
	for child in children {
		apply(tree, child, mod_source_map, source_map)?;
	}
	Ok(())
}

fn check_cycles(tree: &Tree) -> Result<(), BuildError> {
	let mut g: Graph<(), ()> = Graph::new();
	for _ in 0..tree.nodes.len() {
		g.add_node(());
	}
	for (i, m) in tree.nodes.iter().enumerate() {
		for &dep in &m.depends {
			g.add_edge(GraphNodeIdx::from(dep.0), GraphNodeIdx::from(i), ());
		}
	}
	if g.has_cycle() {
		return Err(BuildError::HasCycle);
	}
	Ok(())
}

/// Priority assignment: a depth-weighted pre-order walk from the
/// root. `factor` starts at 1 and is multiplied by 10 on each descent.
pub(crate) fn assign_priorities(tree: &mut Tree) {
	walk(tree, tree.root, 0.0, 1.0);
}

fn walk(tree: &mut Tree, idx: ModuleIdx, parent_priority: f64, factor: f64) {
	let model_priority = tree.get(idx).model_priority.unwrap_or(0.5);
	let priority = parent_priority + model_priority / factor;
	{
		let m = tree.get_mut(idx);
		m.priority = priority;
		m.priority_factor = factor;
	}
	let children = tree.get(idx).children().to_vec();
	for child in children {
		walk(tree, child, priority, factor * 10.0);
	}
}
