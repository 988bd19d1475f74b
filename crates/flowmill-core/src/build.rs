use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use flowmill_model::{ConfValue, FlowLoader, FlowModel, ModuleModel, PortModel};
use tracing::trace;

use crate::{
	errors::BuildError,
	ids::{join, Ident},
	node::{ModuleIdx, ModuleKind, ModuleNode, PortMode, PortNode},
	state::State,
};

/// The arena produced by the graph builder: owned nodes plus a flat id
/// index, so dependency relations elsewhere in the crate can reference
/// nodes by id without the tree owning them twice.
pub(crate) struct Tree {
	pub nodes: Vec<ModuleNode>,
	pub index: HashMap<Ident, ModuleIdx>,
	pub root: ModuleIdx,
}

impl Tree {
	pub fn get(&self, idx: ModuleIdx) -> &ModuleNode {
		&self.nodes[idx.0]
	}

	pub fn get_mut(&mut self, idx: ModuleIdx) -> &mut ModuleNode {
		&mut self.nodes[idx.0]
	}

	pub fn resolve(&self, id: &str) -> Option<ModuleIdx> {
		self.index.get(id).copied()
	}
}

struct Builder<'a> {
	loader: &'a dyn FlowLoader,
	nodes: Vec<ModuleNode>,
	index: HashMap<Ident, ModuleIdx>,
}

/// Build the node tree from the root flow model.
pub(crate) fn build_tree(
	loader: &dyn FlowLoader,
	root_model: FlowModel,
	root_path: &Path,
	instance_defaults: &ConfValue,
) -> Result<Tree, BuildError> {
	let mut b = Builder {
		loader,
		nodes: Vec::new(),
		index: HashMap::new(),
	};
	let root = b.build_flow(&root_model, "", None, root_path, None, instance_defaults, None)?;
	Ok(Tree {
		nodes: b.nodes,
		index: b.index,
		root,
	})
}

/// Serializer propagates port > module > flow default; `default_serializer`
/// is whatever fell through from the enclosing module/flow.
fn ports_from(defs: &[PortModel], mode: PortMode, default_serializer: Option<&Ident>) -> Vec<PortNode> {
	defs.iter()
		.map(|p| PortNode {
			name: Ident::from(p.name.as_str()),
			mode,
			title: p.title.clone(),
			desc: p.desc.clone(),
			enabled: p.enabled,
			serializer: p
				.serializer
				.as_deref()
				.map(Ident::from)
				.or_else(|| default_serializer.cloned()),
			wsize: p.wsize,
			link: p.link.iter().map(|s| Ident::from(s.as_str())).collect(),
			data: None,
		})
		.collect()
}

fn check_unique_ports(namespace: &str, in_ports: &[PortNode], out_ports: &[PortNode]) -> Result<(), BuildError> {
	let mut seen = std::collections::HashSet::new();
	for p in in_ports.iter().chain(out_ports.iter()) {
		if !seen.insert(p.name.clone()) {
			return Err(BuildError::DuplicatePort {
				namespace: Ident::from(namespace),
				port: p.name.clone(),
			});
		}
	}
	Ok(())
}

impl<'a> Builder<'a> {
	fn push(&mut self, id: Ident, node: ModuleNode) -> ModuleIdx {
		let idx = ModuleIdx(self.nodes.len());
		self.index.insert(id, idx);
		self.nodes.push(node);
		idx
	}

	/// Build a flow at `namespace`. `module_def` is the including module's
	/// definition when this flow is reached through a `flow_ref` (carries
	/// the caller-overrides); `None` for the root flow.
	fn build_flow(
		&mut self,
		model: &FlowModel,
		namespace: &str,
		parent: Option<ModuleIdx>,
		current_file: &Path,
		module_def: Option<&ModuleModel>,
		ambient_conf: &ConfValue,
		ambient_serializer: Option<&Ident>,
	) -> Result<ModuleIdx, BuildError> {
		let id: Ident = if namespace.is_empty() {
			Ident::from(model.name.as_str())
		} else {
			Ident::from(namespace)
		};
		let name = module_def.map(|m| m.name.as_str()).unwrap_or(model.name.as_str());

		let own_serializer = module_def
			.and_then(|d| d.serializer.as_deref())
			.or(model.serializer.as_deref())
			.map(Ident::from)
			.or_else(|| ambient_serializer.cloned());

		let mut in_ports = ports_from(&model.in_ports, PortMode::In, own_serializer.as_ref());
		let mut out_ports = ports_from(&model.out_ports, PortMode::Out, own_serializer.as_ref());
		check_unique_ports(&id, &in_ports, &out_ports)?;

		// Port override: the including module's inline port definitions
		// overwrite the matching outer port by name.
		if let Some(def) = module_def {
			apply_port_overrides(&id, &def.in_ports, &mut in_ports)?;
			apply_port_overrides(&id, &def.out_ports, &mut out_ports)?;
		}

		let mut conf = ambient_conf.clone();
		if let Some(flow_conf) = &model.conf {
			conf.merge(flow_conf);
		}
		let (wsize, maxpar, priority, explicit_depends, conf_override, title, desc, enabled) = match module_def {
			Some(def) => (
				def.wsize,
				def.maxpar,
				def.priority,
				def.depends.iter().map(|s| Ident::from(s.as_str())).collect(),
				def.conf.clone(),
				def.title.clone(),
				def.desc.clone(),
				def.enabled,
			),
			None => (None, None, None, Vec::new(), None, None, None, None),
		};
		if let Some(over) = &conf_override {
			conf.merge(over);
		}

		let node = ModuleNode {
			id: id.clone(),
			name: Ident::from(name),
			namespace: Ident::from(namespace),
			title,
			desc,
			enabled,
			parent,
			state: State::Ready,
			priority: 0.0,
			priority_factor: 1.0,
			depends: Default::default(),
			notify: Default::default(),
			waiting: Default::default(),
			in_ports,
			out_ports,
			wsize,
			maxpar,
			conf,
			model_priority: priority,
			explicit_depends,
			kind: ModuleKind::Flow { children: Vec::new() },
		};
		let flow_idx = self.push(id.clone(), node);

		let mut children = Vec::with_capacity(model.modules.len());
		for module_def in &model.modules {
			let child_namespace = join(&id, &module_def.name);
			let child_idx = if let Some(uri) = &module_def.flow_ref {
				let sub_model = self
					.loader
					.load_from_ref(uri, current_file)
					.map_err(|source| BuildError::UnknownFlowRef {
						module_id: child_namespace.clone(),
						uri: uri.clone(),
						source,
					})?;
				let sub_file = current_file
					.parent()
					.map(|p| p.join(uri))
					.unwrap_or_else(|| PathBuf::from(uri));
				let ambient = self.get(flow_idx).conf.clone();
				self.build_flow(
					&sub_model,
					&child_namespace,
					Some(flow_idx),
					&sub_file,
					Some(module_def),
					&ambient,
					own_serializer.as_ref(),
				)?
			} else {
				self.build_leaf(module_def, &child_namespace, flow_idx, own_serializer.as_ref())?
			};
			children.push(child_idx);
		}

		trace!(message = "built flow", id = %id, children = children.len());
		if let ModuleKind::Flow { children: slot } = &mut self.get_mut(flow_idx).kind {
			*slot = children;
		}
		Ok(flow_idx)
	}

	fn build_leaf(
		&mut self,
		def: &ModuleModel,
		id: &str,
		parent: ModuleIdx,
		ambient_serializer: Option<&Ident>,
	) -> Result<ModuleIdx, BuildError> {
		let own_serializer = def.serializer.as_deref().map(Ident::from).or_else(|| ambient_serializer.cloned());
		let in_ports = ports_from(&def.in_ports, PortMode::In, own_serializer.as_ref());
		let out_ports = ports_from(&def.out_ports, PortMode::Out, own_serializer.as_ref());
		check_unique_ports(id, &in_ports, &out_ports)?;

		let parent_conf = self.get(parent).conf.clone();
		let mut conf = parent_conf;
		if let Some(over) = &def.conf {
			conf.merge(over);
		}

		let namespace = self.get(parent).id.clone();
		let node = ModuleNode {
			id: Ident::from(id),
			name: Ident::from(def.name.as_str()),
			namespace,
			title: def.title.clone(),
			desc: def.desc.clone(),
			enabled: def.enabled,
			parent: Some(parent),
			state: State::Ready,
			priority: 0.0,
			priority_factor: 1.0,
			depends: Default::default(),
			notify: Default::default(),
			waiting: Default::default(),
			in_ports,
			out_ports,
			wsize: def.wsize,
			maxpar: def.maxpar,
			conf,
			model_priority: def.priority,
			explicit_depends: def.depends.iter().map(|s| Ident::from(s.as_str())).collect(),
			kind: ModuleKind::Leaf { tasks: Vec::new() },
		};
		Ok(self.push(Ident::from(id), node))
	}

	fn get(&self, idx: ModuleIdx) -> &ModuleNode {
		&self.nodes[idx.0]
	}

	fn get_mut(&mut self, idx: ModuleIdx) -> &mut ModuleNode {
		&mut self.nodes[idx.0]
	}
}

fn apply_port_overrides(namespace: &str, overrides: &[PortModel], ports: &mut [PortNode]) -> Result<(), BuildError> {
	for over in overrides {
		let target = ports
			.iter_mut()
			.find(|p| p.name.as_str() == over.name)
			.ok_or_else(|| BuildError::UnknownOuterPort {
				module_id: Ident::from(namespace),
				port: Ident::from(over.name.as_str()),
			})?;
		if let Some(t) = &over.title {
			target.title = Some(t.clone());
		}
		if let Some(d) = &over.desc {
			target.desc = Some(d.clone());
		}
		if let Some(e) = over.enabled {
			target.enabled = Some(e);
		}
		if let Some(s) = &over.serializer {
			target.serializer = Some(Ident::from(s.as_str()));
		}
		if let Some(w) = over.wsize {
			target.wsize = Some(w);
		}
		if !over.link.is_empty() {
			target.link = over.link.iter().map(|s| Ident::from(s.as_str())).collect();
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::path::Path;

	use flowmill_model::{LoadError, ModuleModel, PortModel};

	use super::*;

	struct StaticLoader(std::collections::HashMap<String, FlowModel>);

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

	fn port(name: &str, link: &[&str]) -> PortModel {
		PortModel {
			name: name.into(),
			link: link.iter().map(|s| s.to_string()).collect(),
			..Default::default()
		}
	}

	#[test]
	fn builds_linear_flow() {
		let model = FlowModel {
			name: "lin".into(),
			modules: vec![
				ModuleModel {
					name: "a".into(),
					out_ports: vec![port("out", &[])],
					..Default::default()
				},
				ModuleModel {
					name: "b".into(),
					in_ports: vec![port("in", &["a.out"])],
					out_ports: vec![port("out", &[])],
					..Default::default()
				},
			],
			..Default::default()
		};
		let loader = StaticLoader(Default::default());
		let tree = build_tree(&loader, model, Path::new("root.toml"), &ConfValue::Null).unwrap();
		assert!(tree.resolve("lin").is_some());
		assert!(tree.resolve("lin.a").is_some());
		assert!(tree.resolve("lin.b").is_some());
		assert!(tree.get(tree.root).is_leaf() == false);
	}

	#[test]
	fn duplicate_port_name_rejected() {
		let model = FlowModel {
			name: "dup".into(),
			modules: vec![ModuleModel {
				name: "a".into(),
				out_ports: vec![port("x", &[]), port("x", &[])],
				..Default::default()
			}],
			..Default::default()
		};
		let loader = StaticLoader(Default::default());
		let err = build_tree(&loader, model, Path::new("root.toml"), &ConfValue::Null).unwrap_err();
		assert!(matches!(err, BuildError::DuplicatePort { .. }));
	}

	#[test]
	fn flow_ref_applies_caller_wsize_override() {
		let mut sub = std::collections::HashMap::new();
		sub.insert(
			"sub.toml".to_string(),
			FlowModel {
				name: "sub".into(),
				in_ports: vec![port("in", &[])],
				out_ports: vec![port("out", &["in"])],
				modules: vec![],
				..Default::default()
			},
		);
		let model = FlowModel {
			name: "outer".into(),
			modules: vec![ModuleModel {
				name: "included".into(),
				flow_ref: Some("sub.toml".into()),
				wsize: Some(42),
				..Default::default()
			}],
			..Default::default()
		};
		let loader = StaticLoader(sub);
		let tree = build_tree(&loader, model, Path::new("root.toml"), &ConfValue::Null).unwrap();
		let included = tree.get(tree.resolve("outer.included").unwrap());
		assert_eq!(included.wsize, Some(42));
	}

	#[test]
	fn flow_ref_applies_caller_title_desc_enabled_override() {
		let mut sub = std::collections::HashMap::new();
		sub.insert(
			"sub.toml".to_string(),
			FlowModel {
				name: "sub".into(),
				in_ports: vec![port("in", &[])],
				out_ports: vec![port("out", &["in"])],
				modules: vec![],
				..Default::default()
			},
		);
		let model = FlowModel {
			name: "outer".into(),
			modules: vec![ModuleModel {
				name: "included".into(),
				flow_ref: Some("sub.toml".into()),
				title: Some("Included step".into()),
				desc: Some("does the thing".into()),
				enabled: Some(false),
				..Default::default()
			}],
			..Default::default()
		};
		let loader = StaticLoader(sub);
		let tree = build_tree(&loader, model, Path::new("root.toml"), &ConfValue::Null).unwrap();
		let included = tree.get(tree.resolve("outer.included").unwrap());
		assert_eq!(included.title.as_deref(), Some("Included step"));
		assert_eq!(included.desc.as_deref(), Some("does the thing"));
		assert_eq!(included.enabled, Some(false));
	}

	#[test]
	fn port_override_applies_title_desc_enabled() {
		let mut sub = std::collections::HashMap::new();
		sub.insert(
			"sub.toml".to_string(),
			FlowModel {
				name: "sub".into(),
				out_ports: vec![port("out", &[])],
				modules: vec![],
				..Default::default()
			},
		);
		let model = FlowModel {
			name: "outer".into(),
			modules: vec![ModuleModel {
				name: "included".into(),
				flow_ref: Some("sub.toml".into()),
				out_ports: vec![PortModel {
					name: "out".into(),
					title: Some("Output".into()),
					desc: Some("produced records".into()),
					enabled: Some(true),
					..Default::default()
				}],
				..Default::default()
			}],
			..Default::default()
		};
		let loader = StaticLoader(sub);
		let tree = build_tree(&loader, model, Path::new("root.toml"), &ConfValue::Null).unwrap();
		let included = tree.get(tree.resolve("outer.included").unwrap());
		let out = &included.out_ports[0];
		assert_eq!(out.title.as_deref(), Some("Output"));
		assert_eq!(out.desc.as_deref(), Some("produced records"));
		assert_eq!(out.enabled, Some(true));
	}
}
