//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! This module provides efficient dominator tree computation for rooted directed
//! graphs. The dominator tree drives phi placement during SSA construction and
//! the strict-dominator filtering inside the SSA destructor's liveness queries.
//!
//! # Theory
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` (idom(n)) is the
//! unique node that strictly dominates `n` but does not strictly dominate any
//! other dominator of `n`.
//!
//! The dominator tree is formed by making each node's immediate dominator its
//! parent. The entry node is the root (it has no dominator).
//!
//! # Algorithm
//!
//! This implementation uses the Lengauer-Tarjan algorithm with path compression,
//! achieving O(V α(V)) time complexity where α is the inverse Ackermann function
//! (effectively constant for all practical inputs). All traversals are
//! iterative.

use std::collections::HashSet;

use crate::utils::graph::{DirectedGraph, NodeId};

const SENTINEL: NodeId = NodeId(usize::MAX);

/// Result of dominator tree computation.
///
/// Each node reachable from the entry (except the entry itself) has exactly
/// one immediate dominator. Nodes not reachable from the entry are absent from
/// the tree: [`immediate_dominator`](Self::immediate_dominator) returns `None`
/// for them and [`dominates`](Self::dominates) treats them as dominated by
/// nothing.
///
/// # Examples
///
/// ```rust,ignore
/// use classir::utils::graph::{DirectedGraph, algorithms::compute_dominators};
///
/// // Simple CFG: entry -> a -> b
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(entry, a, ());
/// graph.add_edge(a, b, ());
///
/// let dom_tree = compute_dominators(&graph, entry);
/// assert!(dom_tree.dominates(entry, b));
/// assert_eq!(dom_tree.immediate_dominator(b), Some(a));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) node of the dominator tree
    entry: NodeId,
    /// Immediate dominator for each node index; the entry maps to itself and
    /// unreachable nodes map to a sentinel
    idom: Vec<NodeId>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns `true` if the node is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        node == self.entry
            || self
                .idom
                .get(node.index())
                .is_some_and(|&idom| idom != SENTINEL)
    }

    /// Returns the immediate dominator of a node.
    ///
    /// Returns `None` for the entry node and for nodes not reachable from the
    /// entry.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            return None;
        }
        match self.idom.get(node.index()) {
            Some(&idom) if idom != SENTINEL => Some(idom),
            _ => None,
        }
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A node dominates itself. The entry node dominates all reachable nodes.
    ///
    /// # Complexity
    ///
    /// O(depth) where depth is the depth of `b` in the dominator tree.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return self.is_reachable(a);
        }

        let mut current = b;
        while current != self.entry {
            let Some(idom) = self.immediate_dominator(current) else {
                return false;
            };
            if idom == a {
                return true;
            }
            current = idom;
        }

        // Only the entry dominates the entry
        a == self.entry
    }

    /// Checks if node `a` strictly dominates node `b`.
    ///
    /// Strict dominance excludes self-dominance: `a` strictly dominates `b`
    /// iff `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns an iterator over all dominators of a node, from the node itself
    /// up to (and including) the entry node.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: if self.is_reachable(node) {
                Some(node)
            } else {
                None
            },
        }
    }

    /// Returns the depth of a node in the dominator tree.
    ///
    /// The entry node has depth 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(idom) = self.immediate_dominator(current) {
            current = idom;
            depth += 1;
        }
        depth
    }

    /// Returns all children of a node in the dominator tree.
    ///
    /// Children are nodes whose immediate dominator is the given node.
    ///
    /// # Complexity
    ///
    /// O(V) where V is the number of nodes.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for i in 0..self.idom.len() {
            let n = NodeId::new(i);
            if n != self.entry && self.idom[i] == node {
                result.push(n);
            }
        }
        result
    }
}

/// Iterator over dominators of a node, from the node up to the entry.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes the dominator tree for a graph rooted at `entry` using the
/// Lengauer-Tarjan algorithm.
///
/// # Complexity
///
/// - Time: O(V α(V)) where α is the inverse Ackermann function
/// - Space: O(V)
///
/// # Algorithm Overview
///
/// 1. **DFS numbering**: Assign DFS numbers to nodes and compute the DFS tree
/// 2. **Semidominators**: Compute semidominators using the Semidominator Theorem
/// 3. **Implicit idom**: Compute implicit immediate dominators
/// 4. **Explicit idom**: Convert implicit to explicit immediate dominators
#[must_use]
pub fn compute_dominators<N, E>(graph: &DirectedGraph<N, E>, entry: NodeId) -> DominatorTree {
    let bound = graph.node_bound();

    if bound == 0 {
        return DominatorTree {
            entry,
            idom: Vec::new(),
        };
    }

    let mut lt = LengauerTarjan::new(bound);
    lt.compute(graph, entry);

    DominatorTree {
        entry,
        idom: lt.idom,
    }
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number (inverse of dfnum)
    vertex: Vec<NodeId>,
    /// Parent in DFS tree
    parent: Vec<NodeId>,
    /// Semidominator (by DFS number, stored as node ID)
    semi: Vec<NodeId>,
    /// Immediate dominator (final result)
    idom: Vec<NodeId>,
    /// Ancestor in the forest for link-eval
    ancestor: Vec<NodeId>,
    /// Best node on path to ancestor (for path compression)
    best: Vec<NodeId>,
    /// Bucket for each node (nodes whose semidominator is this node)
    bucket: Vec<Vec<NodeId>>,
    /// Current DFS counter
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize) -> Self {
        Self {
            dfnum: vec![0; n],
            vertex: vec![SENTINEL; n],
            parent: vec![SENTINEL; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![SENTINEL; n],
            ancestor: vec![SENTINEL; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<N, E>(&mut self, graph: &DirectedGraph<N, E>, entry: NodeId) {
        // Phase 1: DFS numbering
        self.dfs(graph, entry);

        // Process nodes in reverse DFS order (excluding entry)
        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            // Phase 2: Compute semidominators
            // semi(w) = min { v : v -> w is a CFG edge and dfnum(v) < dfnum(w) } ∪
            //           { semi(u) : u -> w via tree edges where dfnum(u) > dfnum(w) }
            let preds: Vec<NodeId> = graph.predecessors(w).collect();
            for v in preds {
                if self.dfnum[v.index()] == 0 {
                    // v is unreachable from entry
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            // Add w to bucket of its semidominator
            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);

            // Link w into the forest
            self.ancestor[w.index()] = parent_w;

            // Phase 3: Implicitly compute immediate dominators
            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = parent_w;
                } else {
                    // idom(v) = idom(u), resolved in phase 4
                    self.idom[v.index()] = u;
                }
            }
        }

        // Phase 4: Explicitly compute immediate dominators
        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        // Entry node dominates itself
        if self.dfs_counter > 0 {
            self.idom[entry.index()] = entry;
        }
    }

    /// DFS traversal to assign DFS numbers and build the DFS tree.
    fn dfs<N, E>(&mut self, graph: &DirectedGraph<N, E>, start: NodeId) {
        if !graph.contains_node(start) {
            return;
        }

        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            let idx = node.index();

            if self.dfnum[idx] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[idx] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            for succ in graph.successors(node) {
                if self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = node;
                    stack.push(succ);
                }
            }
        }
    }

    /// Evaluate: find the node with minimum semidominator on the path to the
    /// forest root, compressing the path along the way.
    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == SENTINEL {
            return v;
        }

        self.compress(v);
        self.best[v.index()]
    }

    /// Iterative path compression for the link-eval forest.
    fn compress(&mut self, v: NodeId) {
        // Collect the path from v up to the node below the forest root, then
        // fold it back down in reverse order.
        let mut path = Vec::new();
        let mut current = v;
        while self.ancestor[self.ancestor[current.index()].index()] != SENTINEL {
            path.push(current);
            current = self.ancestor[current.index()];
        }

        for &node in path.iter().rev() {
            let ancestor_n = self.ancestor[node.index()];
            let best_ancestor = self.best[ancestor_n.index()];
            let best_n = self.best[node.index()];

            if self.dfnum[self.semi[best_ancestor.index()].index()]
                < self.dfnum[self.semi[best_n.index()].index()]
            {
                self.best[node.index()] = best_ancestor;
            }

            self.ancestor[node.index()] = self.ancestor[ancestor_n.index()];
        }
    }
}

/// Computes dominance frontiers for all nodes.
///
/// The dominance frontier of a node `n` is the set of all nodes `m` such that
/// `n` dominates a predecessor of `m` but does not strictly dominate `m`.
/// Dominance frontiers determine where φ-functions are placed during SSA
/// construction.
///
/// # Returns
///
/// A vector where `result[i]` contains the dominance frontier of node `i`,
/// sized by [`DirectedGraph::node_bound`].
///
/// # Complexity
///
/// O(V + E) time for typical flow graphs, O(V²) worst-case space.
#[must_use]
pub fn compute_dominance_frontiers<N, E>(
    graph: &DirectedGraph<N, E>,
    dom_tree: &DominatorTree,
) -> Vec<HashSet<NodeId>> {
    let mut frontiers: Vec<HashSet<NodeId>> = vec![HashSet::new(); graph.node_bound()];

    for node in graph.node_ids() {
        let preds: Vec<NodeId> = graph.predecessors(node).collect();
        if preds.len() < 2 {
            continue;
        }

        // Walk each predecessor up the dominator tree until reaching
        // idom(node); every node passed has `node` in its frontier.
        let idom_node = dom_tree.immediate_dominator(node);

        for pred in preds {
            if !dom_tree.is_reachable(pred) {
                continue;
            }
            let mut runner = pred;
            loop {
                if Some(runner) == idom_node {
                    break;
                }
                frontiers[runner.index()].insert(node);
                match dom_tree.immediate_dominator(runner) {
                    Some(idom) => runner = idom,
                    None => break,
                }
            }
        }
    }

    frontiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominator_empty_graph() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let dom_tree = compute_dominators(&graph, NodeId::new(0));
        assert!(!dom_tree.is_reachable(NodeId::new(0)));
    }

    #[test]
    fn test_dominator_single_node() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let entry = graph.add_node(());

        let dom_tree = compute_dominators(&graph, entry);

        assert_eq!(dom_tree.entry(), entry);
        assert_eq!(dom_tree.immediate_dominator(entry), None);
        assert!(dom_tree.dominates(entry, entry));
        assert_eq!(dom_tree.depth(entry), 0);
    }

    #[test]
    fn test_dominator_linear_chain() {
        // entry -> a -> b -> c
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.add_edge(entry, a, ());
        graph.add_edge(a, b, ());
        graph.add_edge(b, c, ());

        let dom_tree = compute_dominators(&graph, entry);

        assert_eq!(dom_tree.immediate_dominator(a), Some(entry));
        assert_eq!(dom_tree.immediate_dominator(b), Some(a));
        assert_eq!(dom_tree.immediate_dominator(c), Some(b));

        assert!(dom_tree.dominates(entry, c));
        assert!(dom_tree.dominates(a, c));
        assert!(!dom_tree.dominates(c, b));

        assert_eq!(dom_tree.depth(c), 3);
        assert_eq!(dom_tree.dominators(c).collect::<Vec<_>>(), vec![c, b, a, entry]);
    }

    #[test]
    fn test_dominator_diamond() {
        //      entry
        //      /   \
        //     a     b
        //      \   /
        //       exit
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let exit = graph.add_node("exit");

        graph.add_edge(entry, a, ());
        graph.add_edge(entry, b, ());
        graph.add_edge(a, exit, ());
        graph.add_edge(b, exit, ());

        let dom_tree = compute_dominators(&graph, entry);

        assert_eq!(dom_tree.immediate_dominator(a), Some(entry));
        assert_eq!(dom_tree.immediate_dominator(b), Some(entry));
        assert_eq!(dom_tree.immediate_dominator(exit), Some(entry));

        assert!(!dom_tree.strictly_dominates(a, exit));
        assert!(!dom_tree.strictly_dominates(b, exit));

        let mut children = dom_tree.children(entry);
        children.sort_by_key(|n| n.index());
        assert_eq!(children, vec![a, b, exit]);
    }

    #[test]
    fn test_dominator_loop() {
        // entry -> header <-> body -> exit
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let header = graph.add_node("header");
        let body = graph.add_node("body");
        let exit = graph.add_node("exit");

        graph.add_edge(entry, header, ());
        graph.add_edge(header, body, ());
        graph.add_edge(body, header, ()); // back edge
        graph.add_edge(body, exit, ());

        let dom_tree = compute_dominators(&graph, entry);

        assert!(dom_tree.dominates(header, body));
        assert!(!dom_tree.strictly_dominates(body, header));
    }

    #[test]
    fn test_dominator_unreachable_node() {
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let a = graph.add_node("a");
        let island = graph.add_node("island");
        graph.add_edge(entry, a, ());

        let dom_tree = compute_dominators(&graph, entry);

        assert!(!dom_tree.is_reachable(island));
        assert_eq!(dom_tree.immediate_dominator(island), None);
        assert!(!dom_tree.dominates(entry, island));
        assert!(!dom_tree.dominates(island, island));
    }

    #[test]
    fn test_dominator_complex_cfg() {
        //        entry
        //          |
        //          a
        //         / \
        //        b   c
        //        |   |
        //        d   e
        //         \ / \
        //          f   g
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        let d = graph.add_node("d");
        let e = graph.add_node("e");
        let f = graph.add_node("f");
        let g = graph.add_node("g");

        graph.add_edge(entry, a, ());
        graph.add_edge(a, b, ());
        graph.add_edge(a, c, ());
        graph.add_edge(b, d, ());
        graph.add_edge(c, e, ());
        graph.add_edge(d, f, ());
        graph.add_edge(e, f, ());
        graph.add_edge(e, g, ());

        let dom_tree = compute_dominators(&graph, entry);

        assert!(dom_tree.dominates(a, f));
        assert_eq!(dom_tree.immediate_dominator(f), Some(a));
        assert_eq!(dom_tree.immediate_dominator(g), Some(e));
    }

    #[test]
    fn test_dominance_frontier_diamond() {
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let left = graph.add_node("left");
        let right = graph.add_node("right");
        let join = graph.add_node("join");

        graph.add_edge(entry, left, ());
        graph.add_edge(entry, right, ());
        graph.add_edge(left, join, ());
        graph.add_edge(right, join, ());

        let dom_tree = compute_dominators(&graph, entry);
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        assert!(frontiers[entry.index()].is_empty());
        assert_eq!(frontiers[left.index()], [join].into_iter().collect());
        assert_eq!(frontiers[right.index()], [join].into_iter().collect());
        assert!(frontiers[join.index()].is_empty());
    }

    #[test]
    fn test_dominance_frontier_loop() {
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let header = graph.add_node("header");
        let body = graph.add_node("body");
        let exit = graph.add_node("exit");

        graph.add_edge(entry, header, ());
        graph.add_edge(header, body, ());
        graph.add_edge(body, header, ()); // back edge
        graph.add_edge(header, exit, ());

        let dom_tree = compute_dominators(&graph, entry);
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        // The loop body's frontier includes the header it branches back to,
        // and the header is in its own frontier.
        assert!(frontiers[body.index()].contains(&header));
        assert!(frontiers[header.index()].contains(&header));
    }

    #[test]
    fn test_dominance_frontier_nested_if() {
        //       entry
        //         |
        //        if1
        //       /   \
        //      a     b
        //     / \     \
        //    c   d     e
        //     \ /     /
        //     join1  /
        //       \   /
        //       join2
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        let entry = graph.add_node("entry");
        let if1 = graph.add_node("if1");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        let d = graph.add_node("d");
        let e = graph.add_node("e");
        let join1 = graph.add_node("join1");
        let join2 = graph.add_node("join2");

        graph.add_edge(entry, if1, ());
        graph.add_edge(if1, a, ());
        graph.add_edge(if1, b, ());
        graph.add_edge(a, c, ());
        graph.add_edge(a, d, ());
        graph.add_edge(b, e, ());
        graph.add_edge(c, join1, ());
        graph.add_edge(d, join1, ());
        graph.add_edge(e, join2, ());
        graph.add_edge(join1, join2, ());

        let dom_tree = compute_dominators(&graph, entry);
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        assert!(frontiers[c.index()].contains(&join1));
        assert!(frontiers[d.index()].contains(&join1));
        assert!(frontiers[join1.index()].contains(&join2));
        assert!(frontiers[e.index()].contains(&join2));
    }
}
