//! Arena-based directed graph container.
//!
//! This module provides [`DirectedGraph`], the storage primitive underneath the
//! control-flow graph. Nodes and edges live in arenas addressed by stable
//! [`NodeId`]/[`EdgeId`] identifiers, and every edge is recorded in both a
//! forward and a reverse adjacency list so predecessor and successor queries
//! are both O(1) per edge.
//!
//! Removal leaves a tombstone instead of shifting the arena, so identifiers
//! handed out earlier stay valid for the lifetime of the graph. This is what
//! allows blocks to reference their neighbours by id without ownership cycles.

use crate::utils::graph::{EdgeId, NodeId};

#[derive(Debug)]
struct NodeSlot<N> {
    data: N,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
}

#[derive(Debug)]
struct EdgeSlot<E> {
    src: NodeId,
    dst: NodeId,
    data: E,
}

/// A directed graph with arena-allocated nodes and edges.
///
/// `N` is the per-node payload, `E` the per-edge payload. Identifiers are
/// assigned sequentially and never reused; removing a node or edge leaves a
/// hole that all queries treat as absent.
///
/// # Examples
///
/// ```rust,ignore
/// use classir::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, u32> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b, 1);
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// assert_eq!(graph.predecessors(b).collect::<Vec<_>>(), vec![a]);
/// ```
#[derive(Debug)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<Option<NodeSlot<N>>>,
    edges: Vec<Option<EdgeSlot<E>>>,
    node_count: usize,
    edge_count: usize,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_count: 0,
            edge_count: 0,
        }
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.node_count
    }

    /// Returns the number of live edges.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns an exclusive upper bound on node indices ever issued.
    ///
    /// Per-node side tables should be sized by this bound, not by
    /// [`node_count`](Self::node_count), because removals leave holes.
    #[must_use]
    pub fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the node exists and has not been removed.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.get(node.index()).is_some_and(Option::is_some)
    }

    /// Adds a node with the given payload and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(NodeSlot {
            data,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        }));
        self.node_count += 1;
        id
    }

    /// Returns a reference to a node's payload, or `None` if removed.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes
            .get(node.index())
            .and_then(|slot| slot.as_ref().map(|s| &s.data))
    }

    /// Returns a mutable reference to a node's payload, or `None` if removed.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut N> {
        self.nodes
            .get_mut(node.index())
            .and_then(|slot| slot.as_mut().map(|s| &mut s.data))
    }

    /// Removes a node and all its incident edges, returning the payload.
    pub fn remove_node(&mut self, node: NodeId) -> Option<N> {
        let slot = self.nodes.get_mut(node.index())?.take()?;
        self.node_count -= 1;

        for edge in slot.out_edges.iter().chain(slot.in_edges.iter()) {
            if let Some(e) = self.edges.get_mut(edge.index()).and_then(Option::take) {
                self.edge_count -= 1;
                let other = if e.src == node { e.dst } else { e.src };
                if let Some(Some(o)) = self.nodes.get_mut(other.index()) {
                    o.out_edges.retain(|id| id != edge);
                    o.in_edges.retain(|id| id != edge);
                }
            }
        }
        Some(slot.data)
    }

    /// Adds a directed edge from `src` to `dst` and returns its identifier.
    ///
    /// Parallel edges between the same pair of nodes are permitted; each gets
    /// its own identifier.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint does not exist.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, data: E) -> EdgeId {
        assert!(self.contains_node(src), "source node does not exist");
        assert!(self.contains_node(dst), "target node does not exist");

        let id = EdgeId::new(self.edges.len());
        self.edges.push(Some(EdgeSlot { src, dst, data }));
        self.edge_count += 1;

        if let Some(Some(s)) = self.nodes.get_mut(src.index()) {
            s.out_edges.push(id);
        }
        if let Some(Some(d)) = self.nodes.get_mut(dst.index()) {
            d.in_edges.push(id);
        }
        id
    }

    /// Returns a reference to an edge's payload, or `None` if removed.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges
            .get(edge.index())
            .and_then(|slot| slot.as_ref().map(|s| &s.data))
    }

    /// Returns a mutable reference to an edge's payload, or `None` if removed.
    pub fn edge_mut(&mut self, edge: EdgeId) -> Option<&mut E> {
        self.edges
            .get_mut(edge.index())
            .and_then(|slot| slot.as_mut().map(|s| &mut s.data))
    }

    /// Returns the `(source, target)` pair of an edge, or `None` if removed.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges
            .get(edge.index())
            .and_then(|slot| slot.as_ref().map(|s| (s.src, s.dst)))
    }

    /// Removes an edge, returning its payload.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Option<E> {
        let slot = self.edges.get_mut(edge.index())?.take()?;
        self.edge_count -= 1;

        if let Some(Some(s)) = self.nodes.get_mut(slot.src.index()) {
            s.out_edges.retain(|id| *id != edge);
        }
        if let Some(Some(d)) = self.nodes.get_mut(slot.dst.index()) {
            d.in_edges.retain(|id| *id != edge);
        }
        Some(slot.data)
    }

    /// Returns an iterator over all live node identifiers, in index order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId::new(i))
    }

    /// Returns an iterator over all live edge identifiers, in index order.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| EdgeId::new(i))
    }

    /// Returns an iterator over the identifiers of edges leaving `node`.
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.adjacency(node, true)
    }

    /// Returns an iterator over the identifiers of edges entering `node`.
    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.adjacency(node, false)
    }

    /// Returns an iterator over the successor nodes of `node`.
    ///
    /// A successor appears once per connecting edge.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges(node)
            .filter_map(|e| self.edge_endpoints(e).map(|(_, dst)| dst))
    }

    /// Returns an iterator over the predecessor nodes of `node`.
    ///
    /// A predecessor appears once per connecting edge.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.in_edges(node)
            .filter_map(|e| self.edge_endpoints(e).map(|(src, _)| src))
    }

    /// Returns the number of edges leaving `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_edges(node).count()
    }

    /// Returns the number of edges entering `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_edges(node).count()
    }

    fn adjacency(&self, node: NodeId, outgoing: bool) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes
            .get(node.index())
            .and_then(Option::as_ref)
            .map(|slot| {
                if outgoing {
                    slot.out_edges.iter()
                } else {
                    slot.in_edges.iter()
                }
            })
            .into_iter()
            .flatten()
            .copied()
    }
}
