use petgraph::{algo::toposort, graphmap::GraphMap, Directed};
use std::fmt::Debug;

use super::util::{GraphEdgeIdx, GraphNodeIdx};

/// A directed graph with parallel edges.
/// Fast writes are not a goal (within reason).
///
/// [`Graph`]s are designed to be created once,
/// (possibly mutated, if creation requires multiple stages),
/// and only read afterwards.
#[derive(Debug, Clone)]
pub struct Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	pub(super) nodes: Vec<NodeType>,
	pub(super) edges: Vec<(GraphNodeIdx, GraphNodeIdx, EdgeType)>,
}

impl<NodeType, EdgeType> Default for Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<NodeType, EdgeType> Graph<NodeType, EdgeType>
where
	NodeType: Debug,
	EdgeType: Debug,
{
	/// Create an empty graph
	pub fn new() -> Self {
		Self {
			nodes: Vec::new(),
			edges: Vec::new(),
		}
	}

	/// Add a node to this graph.
	#[inline]
	pub fn add_node(&mut self, node: NodeType) -> GraphNodeIdx {
		let i = self.nodes.len();
		self.nodes.push(node);
		GraphNodeIdx::from(i)
	}

	#[inline]
	pub fn get_node(&self, node_idx: GraphNodeIdx) -> &NodeType {
		self.nodes.get(usize::from(node_idx)).unwrap()
	}

	#[inline]
	pub fn get_node_mut(&mut self, node_idx: GraphNodeIdx) -> &mut NodeType {
		self.nodes.get_mut(usize::from(node_idx)).unwrap()
	}

	#[inline]
	pub fn len_nodes(&self) -> usize {
		self.nodes.len()
	}

	#[inline]
	pub fn iter_nodes(&self) -> impl Iterator<Item = &NodeType> {
		self.nodes.iter()
	}

	#[inline]
	pub fn iter_nodes_idx(&self) -> impl Iterator<Item = (GraphNodeIdx, &NodeType)> {
		self.iter_nodes()
			.enumerate()
			.map(|(a, b)| (GraphNodeIdx::from(a), b))
	}

	/// Add an edge to this graph
	#[inline]
	pub fn add_edge(
		&mut self,
		from: GraphNodeIdx,
		to: GraphNodeIdx,
		edge_value: EdgeType,
	) -> GraphEdgeIdx {
		let i = self.edges.len();
		self.edges.push((from, to, edge_value));
		GraphEdgeIdx::from(i)
	}

	#[inline]
	pub fn get_edge(&self, edge_idx: GraphEdgeIdx) -> (GraphNodeIdx, GraphNodeIdx, &EdgeType) {
		self.edges
			.get(usize::from(edge_idx))
			.map(|(f, t, v)| (*f, *t, v))
			.unwrap()
	}

	#[inline]
	pub fn len_edges(&self) -> usize {
		self.edges.len()
	}

	#[inline]
	pub fn iter_edges(&self) -> impl Iterator<Item = (GraphNodeIdx, GraphNodeIdx, &EdgeType)> {
		self.edges.iter().map(|(f, t, v)| (*f, *t, v))
	}

	/// Returns `true` if this graph has a (directed) cycle.
	#[inline]
	pub fn has_cycle(&self) -> bool {
		let mut fake_graph = GraphMap::<usize, (), Directed>::new();
		for (from, to, _) in self.iter_edges() {
			fake_graph.add_edge(from.into(), to.into(), ());
		}
		toposort(&fake_graph, None).is_err()
	}
}
