//! Directed graph primitives.
//!
//! This module provides the graph infrastructure the control-flow layer is
//! built on: an arena-based [`DirectedGraph`] container with stable
//! [`NodeId`]/[`EdgeId`] identifiers, plus the analysis algorithms in
//! [`algorithms`].
//!
//! The container is deliberately domain-agnostic; basic blocks, flow edges,
//! statements, and the destructor's reduced graph all instantiate it with
//! their own payload types.

pub mod algorithms;

mod container;
mod edge;
mod node;

pub use container::DirectedGraph;
pub use edge::EdgeId;
pub use node::NodeId;
