//! Classic backward liveness at block granularity.
//!
//! The fixpoint here serves two callers: the SSA constructor prunes phi
//! placement by live-in sets computed before any versions exist, and the test
//! suite uses the same fixpoint on versioned graphs as an oracle against the
//! reduced-reachability queries of the destructor's
//! [`InterferenceResolver`](crate::ssa::InterferenceResolver).
//!
//! Phi statements follow the usual SSA conventions: the destination is a
//! definition at the head of its block, and each argument is a use on the
//! edge from the matching predecessor, so it is live-out of that predecessor
//! but not live-in of the phi's own block.

use std::collections::HashMap;

use crate::flow::FlowGraph;
use crate::ir::{Local, Stmt, VarExpr};
use crate::utils::graph::algorithms::postorder;
use crate::utils::graph::NodeId;
use crate::utils::BitSet;

/// A variable identity as liveness sees it: the local plus its SSA version,
/// when one has been assigned.
type VarKey = (Local, Option<u32>);

const fn key_of(var: &VarExpr) -> VarKey {
    (var.local, var.version)
}

/// Per-block live-in and live-out sets, computed by iterating the backward
/// dataflow equations to a fixpoint.
#[derive(Debug)]
pub struct Liveness {
    index: HashMap<VarKey, usize>,
    live_in: Vec<BitSet>,
    live_out: Vec<BitSet>,
}

impl Liveness {
    /// Computes liveness for every block of the graph.
    #[must_use]
    pub fn compute(cfg: &FlowGraph) -> Self {
        let bound = cfg.block_bound();

        // Number every variable the graph mentions.
        let mut index: HashMap<VarKey, usize> = HashMap::new();
        let mut intern = |var: &VarExpr, index: &mut HashMap<VarKey, usize>| {
            let next = index.len();
            index.entry(key_of(var)).or_insert(next);
        };
        for (_, block) in cfg.blocks() {
            for stmt in block.stmts() {
                for dest in stmt.defined_vars() {
                    intern(&dest, &mut index);
                }
                stmt.for_each_load(&mut |v| intern(v, &mut index));
                if let Stmt::Phi { args, .. } = stmt {
                    for arg in args.values() {
                        intern(arg, &mut index);
                    }
                }
            }
        }
        let width = index.len().max(1);

        // Per-block transfer functions: upward-exposed uses and kills, in
        // statement order. Parallel copies read all sources before writing,
        // which the load-before-def visit order below reproduces.
        let mut uegen = vec![BitSet::new(width); bound];
        let mut kill = vec![BitSet::new(width); bound];
        // Phi arguments, grouped by the predecessor whose edge they ride.
        let mut edge_uses: Vec<HashMap<NodeId, BitSet>> = vec![HashMap::new(); bound];

        for (id, block) in cfg.blocks() {
            let b = id.index();
            for stmt in block.stmts() {
                if let Stmt::Phi { args, .. } = stmt {
                    for (pred, arg) in args {
                        edge_uses[b]
                            .entry(*pred)
                            .or_insert_with(|| BitSet::new(width))
                            .insert(index[&key_of(arg)]);
                    }
                } else {
                    stmt.for_each_load(&mut |v| {
                        let i = index[&key_of(v)];
                        if !kill[b].contains(i) {
                            uegen[b].insert(i);
                        }
                    });
                }
                for dest in stmt.defined_vars() {
                    kill[b].insert(index[&key_of(&dest)]);
                }
            }
        }

        let mut live_in = vec![BitSet::new(width); bound];
        let mut live_out = vec![BitSet::new(width); bound];

        // Postorder visits successors before their predecessors, which is
        // the fast direction for a backward analysis. Blocks unreachable
        // from the entry still get a round so their sets are defined.
        let mut ids: Vec<NodeId> = match cfg.entry() {
            Some(entry) => postorder(cfg.graph(), entry),
            None => Vec::new(),
        };
        let mut seen = BitSet::new(bound.max(1));
        for &id in &ids {
            seen.insert(id.index());
        }
        for (id, _) in cfg.blocks() {
            if !seen.contains(id.index()) {
                ids.push(id);
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &id in ids.iter() {
                let b = id.index();

                let mut out = BitSet::new(width);
                for succ in cfg.successors(id) {
                    out.union_with(&live_in[succ.index()]);
                    if let Some(args) = edge_uses[succ.index()].get(&id) {
                        out.union_with(args);
                    }
                }

                let mut inn = out.clone();
                inn.difference_with(&kill[b]);
                inn.union_with(&uegen[b]);

                changed |= live_out[b].union_with(&out);
                changed |= live_in[b].union_with(&inn);
            }
        }

        Liveness {
            index,
            live_in,
            live_out,
        }
    }

    /// Returns `true` if the variable is live on entry to the block.
    #[must_use]
    pub fn is_live_in(&self, block: NodeId, local: Local, version: Option<u32>) -> bool {
        self.index
            .get(&(local, version))
            .is_some_and(|&i| self.live_in[block.index()].contains(i))
    }

    /// Returns `true` if the variable is live on exit from the block.
    #[must_use]
    pub fn is_live_out(&self, block: NodeId, local: Local, version: Option<u32>) -> bool {
        self.index
            .get(&(local, version))
            .is_some_and(|&i| self.live_out[block.index()].contains(i))
    }
}
