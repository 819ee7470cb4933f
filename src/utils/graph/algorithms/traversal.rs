//! Graph traversal algorithms.
//!
//! This module provides depth-first and breadth-first traversal over
//! [`DirectedGraph`]. All traversals are iterative with explicit stacks, so
//! pathologically deep flow graphs cannot overflow the call stack.
//!
//! # Algorithms
//!
//! - [`dfs`] - Iterative depth-first search (pre-order)
//! - [`bfs`] - Breadth-first search
//! - [`postorder`] - Depth-first search with post-order visitation
//! - [`reverse_postorder`] - Reverse post-order (useful for forward data flow)

use std::collections::VecDeque;

use crate::utils::graph::{DirectedGraph, NodeId};

/// Depth-first search iterator over graph nodes.
///
/// Visits each node reachable from the start exactly once, in pre-order
/// (a node before its descendants).
pub struct DfsIterator<'g, N, E> {
    graph: &'g DirectedGraph<N, E>,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, N, E> DfsIterator<'g, N, E> {
    fn new(graph: &'g DirectedGraph<N, E>, start: NodeId) -> Self {
        if !graph.contains_node(start) {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; graph.node_bound()];
        visited[start.index()] = true;

        DfsIterator {
            graph,
            stack: vec![start],
            visited,
        }
    }
}

impl<N, E> Iterator for DfsIterator<'_, N, E> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Push unvisited successors in reverse so they pop in original order.
        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Returns a depth-first search iterator starting from the given node.
///
/// Nodes not reachable from the start are not visited. If the start node does
/// not exist the iterator is empty.
///
/// # Complexity
///
/// O(V + E) time, O(V) space.
pub fn dfs<N, E>(graph: &DirectedGraph<N, E>, start: NodeId) -> DfsIterator<'_, N, E> {
    DfsIterator::new(graph, start)
}

/// Breadth-first search iterator over graph nodes.
///
/// Visits each reachable node exactly once, exploring all nodes at distance
/// `d` before any node at distance `d + 1`.
pub struct BfsIterator<'g, N, E> {
    graph: &'g DirectedGraph<N, E>,
    queue: VecDeque<NodeId>,
    visited: Vec<bool>,
}

impl<'g, N, E> BfsIterator<'g, N, E> {
    fn new(graph: &'g DirectedGraph<N, E>, start: NodeId) -> Self {
        if !graph.contains_node(start) {
            return BfsIterator {
                graph,
                queue: VecDeque::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; graph.node_bound()];
        visited[start.index()] = true;

        let mut queue = VecDeque::new();
        queue.push_back(start);

        BfsIterator {
            graph,
            queue,
            visited,
        }
    }
}

impl<N, E> Iterator for BfsIterator<'_, N, E> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;

        for succ in self.graph.successors(node) {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.queue.push_back(succ);
            }
        }

        Some(node)
    }
}

/// Returns a breadth-first search iterator starting from the given node.
///
/// # Complexity
///
/// O(V + E) time, O(V) space.
pub fn bfs<N, E>(graph: &DirectedGraph<N, E>, start: NodeId) -> BfsIterator<'_, N, E> {
    BfsIterator::new(graph, start)
}

/// Computes the postorder traversal of nodes reachable from the start.
///
/// In postorder, a node appears after all of its descendants. The traversal
/// uses an explicit enter/exit stack rather than recursion.
///
/// # Complexity
///
/// O(V + E) time, O(V) space.
#[allow(clippy::items_after_statements)]
pub fn postorder<N, E>(graph: &DirectedGraph<N, E>, start: NodeId) -> Vec<NodeId> {
    if !graph.contains_node(start) {
        return Vec::new();
    }

    let mut visited = vec![false; graph.node_bound()];
    let mut result = Vec::with_capacity(graph.node_count());

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;

                stack.push((node, State::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => {
                result.push(node);
            }
        }
    }

    result
}

/// Computes the reverse postorder traversal of nodes reachable from the start.
///
/// In reverse postorder a node appears before any of its successors (in a
/// DAG), which is the preferred iteration order for forward data flow.
pub fn reverse_postorder<N, E>(graph: &DirectedGraph<N, E>, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_linear_graph() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        graph.add_edge(a, b, ());
        graph.add_edge(b, c, ());
        graph
    }

    fn create_diamond_graph() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b, ());
        graph.add_edge(a, c, ());
        graph.add_edge(b, d, ());
        graph.add_edge(c, d, ());
        graph
    }

    fn create_cycle_graph() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        graph.add_edge(a, b, ());
        graph.add_edge(b, c, ());
        graph.add_edge(c, a, ());
        graph
    }

    #[test]
    fn test_dfs_linear() {
        let graph = create_linear_graph();
        let order: Vec<NodeId> = dfs(&graph, NodeId::new(0)).collect();
        assert_eq!(order, vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]);
    }

    #[test]
    fn test_dfs_cycle_terminates() {
        let graph = create_cycle_graph();
        let order: Vec<NodeId> = dfs(&graph, NodeId::new(0)).collect();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], NodeId::new(0));
    }

    #[test]
    fn test_dfs_disconnected() {
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let _c = graph.add_node("C");
        graph.add_edge(a, b, ());

        let order: Vec<NodeId> = dfs(&graph, a).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_bfs_diamond() {
        let graph = create_diamond_graph();
        let order: Vec<NodeId> = bfs(&graph, NodeId::new(0)).collect();

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[3], NodeId::new(3));
    }

    #[test]
    fn test_postorder_linear() {
        let graph = create_linear_graph();
        let order = postorder(&graph, NodeId::new(0));
        assert_eq!(order, vec![NodeId::new(2), NodeId::new(1), NodeId::new(0)]);
    }

    #[test]
    fn test_postorder_diamond() {
        let graph = create_diamond_graph();
        let order = postorder(&graph, NodeId::new(0));

        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), NodeId::new(0));

        // D comes before at least one of its predecessors
        let d_pos = order.iter().position(|&n| n == NodeId::new(3)).unwrap();
        let b_pos = order.iter().position(|&n| n == NodeId::new(1)).unwrap();
        let c_pos = order.iter().position(|&n| n == NodeId::new(2)).unwrap();
        assert!(d_pos < b_pos || d_pos < c_pos);
    }

    #[test]
    fn test_reverse_postorder_linear() {
        let graph = create_linear_graph();
        let order = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(order, vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]);
    }

    #[test]
    fn test_reverse_postorder_with_cycle() {
        let graph = create_cycle_graph();
        let order = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], NodeId::new(0));
    }

    #[test]
    fn test_self_loop() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        graph.add_edge(a, a, ());

        assert_eq!(dfs(&graph, a).collect::<Vec<_>>(), vec![a]);
        assert_eq!(bfs(&graph, a).collect::<Vec<_>>(), vec![a]);
        assert_eq!(postorder(&graph, a), vec![a]);
    }

    #[test]
    fn test_traversal_skips_removed_nodes() {
        let mut graph = create_linear_graph();
        graph.remove_node(NodeId::new(1));

        let order: Vec<NodeId> = dfs(&graph, NodeId::new(0)).collect();
        assert_eq!(order, vec![NodeId::new(0)]);
    }
}
