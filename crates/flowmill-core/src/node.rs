use std::collections::BTreeSet;

use flowmill_model::ConfValue;

use crate::{ids::Ident, state::State, storage::PortDataHandle};

/// Index of a module ([`ModuleNode`]) in an [`Instance`](crate::Instance)'s
/// arena. Stable for the lifetime of the instance; `depends`/`notify`/
/// `waiting` reference modules by this index rather than by owning them:
/// the tree owns nodes, and dependency relations are non-owning
/// references resolved through the instance's id index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
	In,
	Out,
}

/// A port, belonging to exactly one module (flow or leaf).
#[derive(Debug, Clone)]
pub struct PortNode {
	pub name: Ident,
	pub mode: PortMode,
	pub title: Option<String>,
	pub desc: Option<String>,
	pub enabled: Option<bool>,
	pub serializer: Option<Ident>,
	pub wsize: Option<u64>,
	/// Dotted identifiers of upstream ports, relative to the enclosing
	/// flow's namespace. Empty means this is a source port.
	pub link: Vec<Ident>,
	pub data: Option<PortDataHandle>,
}

impl PortNode {
	pub fn data(&self) -> &PortDataHandle {
		self.data.as_ref().expect("port connected before data access")
	}
}

/// One partition of a leaf module's work.
#[derive(Debug, Clone)]
pub struct TaskNode {
	pub index: u32,
	pub id: Ident,
	pub state: State,
	pub in_port_data: Vec<PortDataHandle>,
	pub out_port_data: Vec<PortDataHandle>,
	pub job_id: Option<Ident>,
}

impl TaskNode {
	pub fn task_id(module_id: &str, index: u32) -> Ident {
		Ident::from(format!("{module_id}-{index:04}"))
	}
}

/// What distinguishes a flow (composite) from a leaf (external program).
#[derive(Debug)]
pub enum ModuleKind {
	Flow { children: Vec<ModuleIdx> },
	Leaf { tasks: Vec<TaskNode> },
}

impl ModuleKind {
	pub fn is_leaf(&self) -> bool {
		matches!(self, ModuleKind::Leaf { .. })
	}

	pub fn children(&self) -> &[ModuleIdx] {
		match self {
			ModuleKind::Flow { children } => children,
			ModuleKind::Leaf { .. } => &[],
		}
	}
}

/// A module: either a [`ModuleKind::Flow`] (composite, children are other
/// modules) or a [`ModuleKind::Leaf`] (owns its partitioned [`TaskNode`]s).
///
/// Unlike the abstract `Node`/`FlowNode`/`LeafModuleNode` split in the
/// reference design, this is a single struct with a kind tag: the common
/// fields (state, priority, dependency sets, ports) are identical between
/// flows and leaves, and Rust's enums make the leaf-only `tasks` field
/// impossible to reach on a flow without the usual runtime cost of a
/// trait object.
#[derive(Debug)]
pub struct ModuleNode {
	pub id: Ident,
	pub name: Ident,
	pub namespace: Ident,
	pub title: Option<String>,
	pub desc: Option<String>,
	pub enabled: Option<bool>,
	pub parent: Option<ModuleIdx>,
	pub state: State,
	pub priority: f64,
	pub priority_factor: f64,
	pub depends: BTreeSet<ModuleIdx>,
	pub notify: BTreeSet<ModuleIdx>,
	pub waiting: BTreeSet<ModuleIdx>,
	pub in_ports: Vec<PortNode>,
	pub out_ports: Vec<PortNode>,
	pub wsize: Option<u64>,
	pub maxpar: Option<u64>,
	pub conf: ConfValue,
	/// Raw `model.priority` weight (default 0.5 when unset), consumed once by
	/// the priority-assignment pass; distinct from `priority`, the
	/// pass's computed output.
	pub model_priority: Option<f64>,
	/// Explicit `depends` names from the model, not yet resolved to
	/// [`ModuleIdx`] (resolution happens in the dependency analyzer, since
	/// forward references within a flow are legal).
	pub explicit_depends: Vec<Ident>,
	pub kind: ModuleKind,
}

impl ModuleNode {
	pub fn is_leaf(&self) -> bool {
		self.kind.is_leaf()
	}

	pub fn children(&self) -> &[ModuleIdx] {
		self.kind.children()
	}

	pub fn tasks(&self) -> &[TaskNode] {
		match &self.kind {
			ModuleKind::Leaf { tasks } => tasks,
			ModuleKind::Flow { .. } => &[],
		}
	}
}
