//! The control-flow layer.
//!
//! A [`FlowGraph`] holds [`BasicBlock`]s connected by typed [`FlowEdge`]s,
//! with [`ExceptionRange`]s describing which blocks are protected by which
//! handlers. The lifter builds one per routine; every later pass transforms
//! it in place.

mod block;
mod edge;
mod graph;
mod range;

pub use block::{BasicBlock, BlockFlags};
pub use edge::FlowEdge;
pub use graph::FlowGraph;
pub use range::ExceptionRange;
