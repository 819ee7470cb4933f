//! Graph algorithms for program analysis.
//!
//! This module provides the graph algorithms the transformation passes are
//! built on: traversal orders, dominator analysis, and strongly connected
//! components. Every algorithm is iterative, so deeply nested flow graphs
//! cannot exhaust the call stack.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`dfs`] - Depth-first search traversal
//! - [`bfs`] - Breadth-first search traversal
//! - [`postorder`] - Postorder traversal
//! - [`reverse_postorder`] - Reverse postorder traversal (useful for data flow)
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Compute the dominator tree using Lengauer-Tarjan
//! - [`compute_dominance_frontiers`] - Compute dominance frontiers for phi placement
//! - [`DominatorTree`] - Result of dominator computation
//!
//! ## Strongly Connected Components
//!
//! - [`strongly_connected_components`] - Tarjan's SCC algorithm
//!
//! # Algorithm Selection
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | DFS/BFS | O(V + E) | General traversal |
//! | Dominators | O(V α(V)) | SSA construction, liveness queries |
//! | SCC | O(V + E) | Loop grouping during naturalization |

mod dominators;
mod scc;
mod traversal;

pub use dominators::{compute_dominance_frontiers, compute_dominators, DominatorTree};
pub use scc::strongly_connected_components;
pub use traversal::{bfs, dfs, postorder, reverse_postorder};
