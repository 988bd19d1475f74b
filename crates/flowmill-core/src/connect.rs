use std::collections::HashMap;

use tracing::warn;

use crate::{
	build::Tree,
	errors::BuildError,
	ids::Ident,
	node::{ModuleIdx, PortNode},
	storage::{self, PortDataHandle, Storage},
};

/// A reference to one port somewhere in the tree: which module owns it,
/// which list it's in, and at what index.
#[derive(Clone, Copy)]
struct PortRef {
	owner: ModuleIdx,
	is_in: bool,
	index: usize,
}

impl PortRef {
	fn get<'t>(&self, tree: &'t Tree) -> &'t PortNode {
		let m = tree.get(self.owner);
		if self.is_in {
			&m.in_ports[self.index]
		} else {
			&m.out_ports[self.index]
		}
	}

	fn set_data(&self, tree: &mut Tree, data: PortDataHandle) {
		let m = tree.get_mut(self.owner);
		let port = if self.is_in {
			&mut m.in_ports[self.index]
		} else {
			&mut m.out_ports[self.index]
		};
		port.data = Some(data);
	}
}

/// Ports of `flow_idx` itself plus its direct children's ports, keyed by the
/// relative names `link` entries are written with: a bare port name for the
/// flow's own ports, `<child>.<port>` for a direct child's.
fn local_universe(tree: &Tree, flow_idx: ModuleIdx) -> Vec<(String, PortRef)> {
	let mut universe = Vec::new();
	let flow = tree.get(flow_idx);

	for (i, p) in flow.in_ports.iter().enumerate() {
		universe.push((
			p.name.to_string(),
			PortRef {
				owner: flow_idx,
				is_in: true,
				index: i,
			},
		));
	}
	for (i, p) in flow.out_ports.iter().enumerate() {
		universe.push((
			p.name.to_string(),
			PortRef {
				owner: flow_idx,
				is_in: false,
				index: i,
			},
		));
	}

	for &child in flow.children() {
		let c = tree.get(child);
		for (i, p) in c.in_ports.iter().enumerate() {
			universe.push((
				format!("{}.{}", c.name, p.name),
				PortRef {
					owner: child,
					is_in: true,
					index: i,
				},
			));
		}
		for (i, p) in c.out_ports.iter().enumerate() {
			universe.push((
				format!("{}.{}", c.name, p.name),
				PortRef {
					owner: child,
					is_in: false,
					index: i,
				},
			));
		}
	}

	universe
}

/// Errors from a single linked-pass resolution attempt. `NotYetConnected`
/// is the only one eligible for deferral past a composite child's descent;
/// everything else is a genuine, permanent build error.
enum ResolveOutcome {
	Connected(PortDataHandle),
	NotYetConnected { target: String },
	Hard(BuildError),
}

fn resolve_linked(
	tree: &Tree,
	storage: &dyn Storage,
	lookup: &HashMap<String, PortRef>,
	key: &str,
	r: PortRef,
) -> ResolveOutcome {
	let port = r.get(tree);
	let mut upstreams = Vec::with_capacity(port.link.len());
	for target in &port.link {
		let target_ref = match lookup.get(target.as_str()) {
			Some(t) => *t,
			None => {
				return ResolveOutcome::Hard(BuildError::UnresolvedLink {
					port: Ident::from(key),
					target: Ident::from(target.as_str()),
				})
			}
		};
		let target_port = target_ref.get(tree);
		let data = match &target_port.data {
			Some(d) => d.clone(),
			None => {
				return ResolveOutcome::NotYetConnected {
					target: target.to_string(),
				}
			}
		};
		if let (Some(expected), Some(found)) = (&port.serializer, &target_port.serializer) {
			if expected != found {
				return ResolveOutcome::Hard(BuildError::SerializerMismatch {
					port: Ident::from(key),
					expected: expected.clone(),
					upstream: Ident::from(target.as_str()),
					found: found.clone(),
				});
			}
		}
		upstreams.push(data);
	}
	ResolveOutcome::Connected(storage::allocate(storage, port, upstreams))
}

/// Connect every port under `flow_idx`, recursing into composite children.
///
/// This generalizes the reference algorithm's per-level two-pass to handle
/// genuine nested composition: a composite child's port that can't resolve
/// against this level's universe (because its upstream lives inside that
/// child, not here) is deferred until after we've descended into it, then
/// retried once. A leaf's ports, and this flow's own ports, never defer —
/// there's nowhere else for them to resolve.
pub(crate) fn connect_level(tree: &mut Tree, storage: &dyn Storage, flow_idx: ModuleIdx) -> Result<(), BuildError> {
	let universe = local_universe(tree, flow_idx);
	let lookup: HashMap<String, PortRef> = universe.iter().map(|(k, r)| (k.clone(), *r)).collect();

	for (_, r) in &universe {
		let port = r.get(tree);
		if port.data.is_none() && port.link.is_empty() {
			let data = storage.create_port_data(port);
			r.set_data(tree, data);
		}
	}

	let mut pending = Vec::new();
	for (key, r) in &universe {
		if r.get(tree).data.is_some() {
			continue;
		}
		match resolve_linked(tree, storage, &lookup, key, *r) {
			ResolveOutcome::Connected(data) => r.set_data(tree, data),
			ResolveOutcome::Hard(e) => return Err(e),
			ResolveOutcome::NotYetConnected { target } => {
				if r.owner != flow_idx && !tree.get(r.owner).is_leaf() {
					pending.push((key.clone(), *r));
				} else {
					return Err(BuildError::LinkNotYetConnected {
						port: Ident::from(key.as_str()),
						target: Ident::from(target.as_str()),
					});
				}
			}
		}
	}

	let children: Vec<ModuleIdx> = tree.get(flow_idx).children().to_vec();
	for child in children {
		if !tree.get(child).is_leaf() {
			connect_level(tree, storage, child)?;
		}
	}

	for (key, r) in pending {
		if r.get(tree).data.is_some() {
			continue;
		}
		match resolve_linked(tree, storage, &lookup, &key, r) {
			ResolveOutcome::Connected(data) => r.set_data(tree, data),
			ResolveOutcome::Hard(e) => return Err(e),
			ResolveOutcome::NotYetConnected { target } => {
				return Err(BuildError::LinkNotYetConnected {
					port: Ident::from(key.as_str()),
					target: Ident::from(target.as_str()),
				})
			}
		}
	}

	for (key, r) in &universe {
		if r.get(tree).data.is_none() {
			warn!(message = "port left unconnected", port = %key);
			return Err(BuildError::LinkNotYetConnected {
				port: Ident::from(key.as_str()),
				target: Ident::from(""),
			});
		}
	}

	Ok(())
}

pub(crate) fn connect_tree(tree: &mut Tree, storage: &dyn Storage) -> Result<(), BuildError> {
	connect_level(tree, storage, tree.root)
}
