//! A small directed graph used to detect dependency cycles and, in tests,
//! to walk producer/consumer relationships between port data handles.

pub mod graph;
mod util;

pub use util::{GraphEdgeIdx, GraphNodeIdx};
