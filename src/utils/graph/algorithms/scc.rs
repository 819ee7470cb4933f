//! Strongly Connected Components (SCC) using Tarjan's algorithm.
//!
//! This module provides Tarjan's algorithm for finding strongly connected
//! components in a directed graph. A strongly connected component is a maximal
//! set of vertices such that there is a path from every vertex to every other
//! vertex in the set.
//!
//! The flow-graph naturalizer uses SCCs to keep the blocks of each loop
//! adjacent in the canonical block ordering.

use crate::utils::graph::{DirectedGraph, NodeId};

/// Computes the strongly connected components of a directed graph.
///
/// Uses an iterative formulation of Tarjan's algorithm with a single DFS
/// pass. Each vertex gets a discovery index and a "lowlink" value; when a
/// vertex's lowlink equals its index, it is the root of an SCC.
///
/// # Returns
///
/// A vector of SCCs, where each SCC is a vector of `NodeId`s. The SCCs are
/// returned in **reverse topological order**: if there is an edge from SCC A
/// to SCC B, then A appears after B in the result.
///
/// # Complexity
///
/// O(V + E) time, O(V) space.
///
/// # Examples
///
/// ```rust,ignore
/// use classir::utils::graph::{DirectedGraph, algorithms::strongly_connected_components};
///
/// // Simple cycle: A -> B -> C -> A
/// let mut graph: DirectedGraph<char, ()> = DirectedGraph::new();
/// let a = graph.add_node('A');
/// let b = graph.add_node('B');
/// let c = graph.add_node('C');
/// graph.add_edge(a, b, ());
/// graph.add_edge(b, c, ());
/// graph.add_edge(c, a, ());
///
/// let sccs = strongly_connected_components(&graph);
/// assert_eq!(sccs.len(), 1);
/// assert_eq!(sccs[0].len(), 3);
/// ```
#[must_use]
pub fn strongly_connected_components<N, E>(graph: &DirectedGraph<N, E>) -> Vec<Vec<NodeId>> {
    let bound = graph.node_bound();
    if bound == 0 {
        return Vec::new();
    }

    let mut state = TarjanState::new(bound);

    for node in graph.node_ids() {
        if state.index[node.index()].is_none() {
            state.strongconnect(graph, node);
        }
    }

    state.sccs
}

/// Internal state for Tarjan's algorithm.
struct TarjanState {
    /// Discovery index for each node (None if not yet visited)
    index: Vec<Option<usize>>,
    /// Lowlink value for each node
    lowlink: Vec<usize>,
    /// Whether a node is currently on the component stack
    on_stack: Vec<bool>,
    /// The component stack
    stack: Vec<NodeId>,
    /// Current index counter
    current_index: usize,
    /// Collected SCCs
    sccs: Vec<Vec<NodeId>>,
}

/// One frame of the explicit DFS stack: the node and the index of the next
/// successor to examine.
struct Frame {
    node: NodeId,
    successors: Vec<NodeId>,
    next: usize,
}

impl TarjanState {
    fn new(n: usize) -> Self {
        Self {
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            current_index: 0,
            sccs: Vec::new(),
        }
    }

    fn discover<N, E>(&mut self, graph: &DirectedGraph<N, E>, v: NodeId) -> Frame {
        self.index[v.index()] = Some(self.current_index);
        self.lowlink[v.index()] = self.current_index;
        self.current_index += 1;
        self.stack.push(v);
        self.on_stack[v.index()] = true;

        Frame {
            node: v,
            successors: graph.successors(v).collect(),
            next: 0,
        }
    }

    fn strongconnect<N, E>(&mut self, graph: &DirectedGraph<N, E>, root: NodeId) {
        let mut frames = vec![self.discover(graph, root)];

        while let Some(frame) = frames.last_mut() {
            let v = frame.node;

            if frame.next < frame.successors.len() {
                let w = frame.successors[frame.next];
                frame.next += 1;

                if self.index[w.index()].is_none() {
                    let child = self.discover(graph, w);
                    frames.push(child);
                } else if self.on_stack[w.index()] {
                    // index[w] is set because w has been visited
                    let w_index = self.index[w.index()].unwrap_or(0);
                    self.lowlink[v.index()] = self.lowlink[v.index()].min(w_index);
                }
                continue;
            }

            // All successors examined; close the frame
            if self.lowlink[v.index()] == self.index[v.index()].unwrap_or(0) {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w.index()] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.node;
                self.lowlink[p.index()] = self.lowlink[p.index()].min(self.lowlink[v.index()]);
            }
        }
    }
}
