//! Graph naturalization.
//!
//! Lifting splits the instruction stream aggressively: every label starts a
//! block and every conditional branch leaves a synthetic fallthrough block
//! behind. Naturalization repairs the shape afterwards in two steps:
//!
//! 1. **Immediate merging** folds a block into its fallthrough predecessor
//!    when the two are equivalent for control flow and exception handling,
//!    removing the artificial split.
//! 2. **Component ordering** relabels blocks so strongly connected components
//!    stay contiguous and follow a breadth-first walk from the entry, giving
//!    loops a stable, readable layout.
//!
//! The pass is idempotent: a naturalized graph passes through unchanged.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::flow::{BlockFlags, FlowGraph};
use crate::utils::graph::algorithms::strongly_connected_components;
use crate::utils::graph::NodeId;
use crate::Result;

/// Merges fallthrough chains and relabels blocks into component order.
///
/// # Errors
///
/// Returns [`Error::Internal`](crate::Error::Internal) if the graph loses a
/// block mid-merge, which indicates a bookkeeping bug rather than bad input.
pub fn naturalize(cfg: &mut FlowGraph) -> Result<()> {
    let mut total = 0;
    loop {
        let merges = merge_immediates(cfg)?;
        total += merges;
        if merges == 0 {
            break;
        }
    }
    reorder_components(cfg);

    debug!(merged = total, blocks = cfg.block_count(), "naturalized graph");
    Ok(())
}

/// One merging sweep. Returns how many blocks were folded away.
///
/// A block `b` is folded into `a` when `a` falls through into `b` and:
/// - the fallthrough is `a`'s only non-exception successor,
/// - that edge is `b`'s only incoming edge,
/// - both are protected by exactly the same exception ranges, and
/// - `b` is not flagged [`BlockFlags::NO_MERGE`].
fn merge_immediates(cfg: &mut FlowGraph) -> Result<usize> {
    let mut merges = 0;
    let candidates: Vec<NodeId> = cfg.graph().node_ids().collect();

    for b in candidates {
        if cfg.block(b).is_none() {
            // removed by an earlier merge this sweep
            continue;
        }
        if cfg
            .block(b)
            .is_some_and(|blk| blk.flags.contains(BlockFlags::NO_MERGE))
        {
            continue;
        }

        let in_edges: Vec<_> = cfg.graph().in_edges(b).collect();
        if in_edges.len() != 1 {
            continue;
        }
        let Some(edge) = cfg.graph().edge(in_edges[0]) else {
            continue;
        };
        if !edge.is_immediate() {
            continue;
        }
        let Some((a, _)) = cfg.graph().edge_endpoints(in_edges[0]) else {
            continue;
        };
        if a == b || cfg.non_exception_successors(a).count() != 1 {
            continue;
        }
        if cfg.protecting_ranges(a) != cfg.protecting_ranges(b) {
            continue;
        }

        // Move b's statements onto a.
        let stmts = {
            let block = cfg
                .block_mut(b)
                .ok_or_else(|| internal_error!("merge source {} disappeared", b))?;
            std::mem::take(block.stmts_mut())
        };
        cfg.block_mut(a)
            .ok_or_else(|| internal_error!("merge target {} disappeared", a))?
            .stmts_mut()
            .extend(stmts);

        // Re-point b's outgoing flow at a. Exception edges are dropped: a is
        // protected by the same ranges, so it already carries its own.
        let outgoing: Vec<_> = cfg
            .graph()
            .out_edges(b)
            .filter_map(|e| {
                let kind = cfg.graph().edge(e)?;
                if kind.is_exception() {
                    return None;
                }
                let (_, dst) = cfg.graph().edge_endpoints(e)?;
                Some((dst, kind.clone()))
            })
            .collect();

        cfg.remove_block(b);
        for (dst, kind) in outgoing {
            cfg.add_edge(a, dst, kind);
        }
        merges += 1;
    }
    Ok(merges)
}

/// Relabels blocks so each strongly connected component occupies a contiguous
/// label range, components follow topological order from the entry, and
/// blocks inside a component follow a breadth-first walk.
fn reorder_components(cfg: &mut FlowGraph) {
    let sccs = strongly_connected_components(cfg.graph());
    if sccs.is_empty() {
        return;
    }

    // Tarjan yields reverse topological order.
    let topo: Vec<&Vec<NodeId>> = sccs.iter().rev().collect();
    let mut component_of: HashMap<NodeId, usize> = HashMap::new();
    for (index, scc) in topo.iter().enumerate() {
        for &node in scc.iter() {
            component_of.insert(node, index);
        }
    }

    let mut order: Vec<NodeId> = Vec::with_capacity(cfg.block_count());
    let mut placed_components: HashSet<usize> = HashSet::new();

    // The entry's component leads, components reachable from it follow in
    // topological order, and unreachable components (range marks, dead code)
    // sort last.
    let mut component_order: Vec<usize> = Vec::with_capacity(topo.len());
    if let Some(entry) = cfg.entry() {
        if let Some(&index) = component_of.get(&entry) {
            component_order.push(index);
            placed_components.insert(index);
        }
    }
    for index in 0..topo.len() {
        if placed_components.contains(&index) {
            continue;
        }
        let reachable = topo[index].iter().any(|&m| {
            cfg.predecessors(m).any(|p| {
                component_of
                    .get(&p)
                    .is_some_and(|pc| placed_components.contains(pc))
            })
        });
        if reachable {
            component_order.push(index);
            placed_components.insert(index);
        }
    }
    for index in 0..topo.len() {
        if placed_components.insert(index) {
            component_order.push(index);
        }
    }

    let mut placed: HashSet<NodeId> = HashSet::new();
    for index in component_order {
        let members: HashSet<NodeId> = topo[index].iter().copied().collect();

        // Walk from the entry, or from the member a placed block branches
        // into, so loop headers come before their bodies.
        let start = cfg
            .entry()
            .filter(|e| members.contains(e))
            .or_else(|| {
                topo[index]
                    .iter()
                    .copied()
                    .find(|&m| cfg.predecessors(m).any(|p| placed.contains(&p)))
            })
            .or_else(|| min_by_label(cfg, topo[index]));
        let Some(start) = start else {
            continue;
        };

        let mut queue = VecDeque::from([start]);
        let mut seen: HashSet<NodeId> = HashSet::from([start]);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            placed.insert(node);

            let mut next: Vec<NodeId> = cfg
                .successors(node)
                .filter(|s| members.contains(s) && !seen.contains(s))
                .collect();
            next.sort_by_key(|&s| cfg.block(s).map_or(u32::MAX, |b| b.label));
            next.dedup();
            for s in next {
                seen.insert(s);
                queue.push_back(s);
            }
        }

        // Members unreached inside the component (only possible through
        // exception-edge asymmetries) keep their relative label order.
        let mut rest: Vec<NodeId> = topo[index]
            .iter()
            .copied()
            .filter(|m| !seen.contains(m))
            .collect();
        rest.sort_by_key(|&m| cfg.block(m).map_or(u32::MAX, |b| b.label));
        for m in rest {
            order.push(m);
            placed.insert(m);
        }
    }

    cfg.relabel(&order);
}

fn min_by_label(cfg: &FlowGraph, members: &[NodeId]) -> Option<NodeId> {
    members
        .iter()
        .copied()
        .min_by_key(|&m| cfg.block(m).map_or(u32::MAX, |b| b.label))
}
