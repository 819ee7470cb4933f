//! The control-flow graph.

use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::flow::{BasicBlock, ExceptionRange, FlowEdge};
use crate::utils::graph::algorithms::{compute_dominators, DominatorTree};
use crate::utils::graph::{DirectedGraph, EdgeId, NodeId};
use crate::{Error, Result};

/// A routine's control-flow graph: basic blocks connected by typed flow
/// edges, plus the exception-range table.
///
/// The dominator tree is computed lazily and cached; every structural
/// mutation drops the cache. Read access never mutates, so a built graph can
/// be queried from multiple threads.
#[derive(Debug, Default)]
pub struct FlowGraph {
    graph: DirectedGraph<BasicBlock, FlowEdge>,
    entry: Option<NodeId>,
    ranges: Vec<ExceptionRange>,
    dominators: OnceLock<DominatorTree>,
}

impl FlowGraph {
    /// Creates an empty flow graph.
    #[must_use]
    pub fn new() -> Self {
        FlowGraph {
            graph: DirectedGraph::new(),
            entry: None,
            ranges: Vec::new(),
            dominators: OnceLock::new(),
        }
    }

    /// Returns the entry block, if set.
    #[must_use]
    pub const fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    /// Sets the entry block.
    pub fn set_entry(&mut self, entry: NodeId) {
        self.entry = Some(entry);
        self.dominators.take();
    }

    /// Returns the underlying graph container for analysis algorithms.
    #[must_use]
    pub const fn graph(&self) -> &DirectedGraph<BasicBlock, FlowEdge> {
        &self.graph
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns an exclusive upper bound on block indices, for dense side
    /// tables.
    #[must_use]
    pub fn block_bound(&self) -> usize {
        self.graph.node_bound()
    }

    /// Creates an empty block labeled with its creation index.
    pub fn create_block(&mut self) -> NodeId {
        self.dominators.take();
        let label = u32::try_from(self.graph.node_bound()).unwrap_or(u32::MAX);
        self.graph.add_node(BasicBlock::new(label))
    }

    /// Returns a block.
    #[must_use]
    pub fn block(&self, id: NodeId) -> Option<&BasicBlock> {
        self.graph.node(id)
    }

    /// Returns a block mutably.
    ///
    /// Statement edits do not invalidate the dominator cache; only edge and
    /// block mutations do.
    pub fn block_mut(&mut self, id: NodeId) -> Option<&mut BasicBlock> {
        self.graph.node_mut(id)
    }

    /// Removes a block, its incident edges, and its range memberships.
    pub fn remove_block(&mut self, id: NodeId) -> Option<BasicBlock> {
        self.dominators.take();
        for range in &mut self.ranges {
            range.remove_block(id);
        }
        self.graph.remove_node(id)
    }

    /// Returns an iterator over `(id, block)` pairs in index order.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> + '_ {
        self.graph
            .node_ids()
            .filter_map(|id| self.graph.node(id).map(|b| (id, b)))
    }

    /// Returns the block ids sorted by label.
    #[must_use]
    pub fn blocks_in_order(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.graph.node_ids().collect();
        ids.sort_by_key(|id| self.graph.node(*id).map_or(u32::MAX, |b| b.label));
        ids
    }

    /// Relabels blocks by their position in `order`.
    pub fn relabel(&mut self, order: &[NodeId]) {
        for (position, &id) in order.iter().enumerate() {
            if let Some(block) = self.graph.node_mut(id) {
                block.label = u32::try_from(position).unwrap_or(u32::MAX);
            }
        }
    }

    /// Adds a flow edge.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, edge: FlowEdge) -> EdgeId {
        self.dominators.take();
        self.graph.add_edge(src, dst, edge)
    }

    /// Removes a flow edge.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Option<FlowEdge> {
        self.dominators.take();
        self.graph.remove_edge(edge)
    }

    /// Returns the successors of a block.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(id)
    }

    /// Returns the predecessors of a block.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(id)
    }

    /// Returns the successors reached by non-exception edges.
    pub fn non_exception_successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.out_edges(id).filter_map(move |e| {
            let edge = self.graph.edge(e)?;
            if edge.is_exception() {
                None
            } else {
                self.graph.edge_endpoints(e).map(|(_, dst)| dst)
            }
        })
    }

    /// Returns the fallthrough successor, if any.
    #[must_use]
    pub fn immediate_successor(&self, id: NodeId) -> Option<NodeId> {
        self.graph.out_edges(id).find_map(|e| {
            if self.graph.edge(e)?.is_immediate() {
                self.graph.edge_endpoints(e).map(|(_, dst)| dst)
            } else {
                None
            }
        })
    }

    /// Returns the block that falls through into `id`, if any.
    #[must_use]
    pub fn immediate_predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.graph.in_edges(id).find_map(|e| {
            if self.graph.edge(e)?.is_immediate() {
                self.graph.edge_endpoints(e).map(|(src, _)| src)
            } else {
                None
            }
        })
    }

    /// Returns the exception ranges.
    #[must_use]
    pub fn ranges(&self) -> &[ExceptionRange] {
        &self.ranges
    }

    /// Returns the exception ranges mutably.
    pub fn ranges_mut(&mut self) -> &mut Vec<ExceptionRange> {
        &mut self.ranges
    }

    /// Returns the indices of ranges protecting `block`.
    #[must_use]
    pub fn protecting_ranges(&self, block: NodeId) -> Vec<usize> {
        self.ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| r.contains(block))
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns the dominator tree rooted at the entry block, computing and
    /// caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if no entry block is set.
    pub fn dominators(&self) -> Result<&DominatorTree> {
        let entry = self
            .entry
            .ok_or_else(|| Error::GraphError("dominator query on a graph without an entry block".to_string()))?;
        Ok(self
            .dominators
            .get_or_init(|| compute_dominators(&self.graph, entry)))
    }

    /// Renders the graph in DOT format for inspection.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph cfg {\n  node [shape=box, fontname=monospace];\n");
        for id in self.blocks_in_order() {
            let Some(block) = self.graph.node(id) else {
                continue;
            };
            let mut body = format!("L{}:\\l", block.label);
            for stmt in block.stmts() {
                let line = stmt.to_string().replace('"', "\\\"");
                let _ = write!(body, "{line}\\l");
            }
            let _ = writeln!(out, "  {id} [label=\"{body}\"];");
        }
        for edge in self.graph.edge_ids() {
            let (Some((src, dst)), Some(kind)) =
                (self.graph.edge_endpoints(edge), self.graph.edge(edge))
            else {
                continue;
            };
            let style = if kind.is_exception() {
                ", style=dashed, color=red"
            } else {
                ""
            };
            let _ = writeln!(out, "  {src} -> {dst} [label=\"{kind}\"{style}];");
        }
        out.push_str("}\n");
        out
    }
}
