//! Pruned SSA construction.
//!
//! Phi placement walks iterated dominance frontiers per local, pruned by a
//! backward liveness fixpoint so only merges where the local is live-in get a
//! phi. Renaming is a pre-order walk of the graph from the entry with one
//! version counter and one version stack per local; phi arguments are fixed
//! up through each edge as the walk reaches it.
//!
//! Both traversals run on explicit work stacks. A phi whose incoming
//! arguments disagree on their computational type, or a use with no version
//! in scope, is an internal-consistency error: well-formed lifter output
//! cannot produce either.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::debug;

use crate::flow::FlowGraph;
use crate::ir::{Expr, Local, Stmt, ValueType, VarExpr, VersionedLocal, Walk};
use crate::ssa::Liveness;
use crate::utils::graph::algorithms::compute_dominance_frontiers;
use crate::utils::graph::NodeId;
use crate::Result;

/// Rewrites the graph into pruned SSA form.
///
/// After this pass every variable occurrence carries a version, every version
/// has exactly one definition, and multi-predecessor blocks hold a leading
/// phi for each live merged local.
///
/// # Errors
///
/// Returns [`Error::GraphError`](crate::Error::GraphError) if the graph has
/// no entry block, and [`Error::Internal`](crate::Error::Internal) on phi
/// type conflicts or uses without a reaching definition.
pub fn construct(cfg: &mut FlowGraph) -> Result<()> {
    let mut builder = SsaBuilder::new(cfg);
    builder.collect_assigns();
    builder.insert_phis()?;
    builder.rename()?;
    debug!(
        locals = builder.assigns.len(),
        phis = builder.inserted,
        "constructed SSA"
    );
    Ok(())
}

struct SsaBuilder<'a> {
    cfg: &'a mut FlowGraph,
    /// Blocks assigning each local, in deterministic order.
    assigns: BTreeMap<Local, BTreeSet<NodeId>>,
    /// The computational type each local was first assigned with.
    local_ty: HashMap<Local, ValueType>,
    /// Version counters and version stacks, per local.
    counters: HashMap<Local, u32>,
    stacks: HashMap<Local, Vec<u32>>,
    /// Type of each versioned definition, for phi argument resolution.
    def_ty: HashMap<VersionedLocal, ValueType>,
    inserted: usize,
}

impl<'a> SsaBuilder<'a> {
    fn new(cfg: &'a mut FlowGraph) -> Self {
        SsaBuilder {
            cfg,
            assigns: BTreeMap::new(),
            local_ty: HashMap::new(),
            counters: HashMap::new(),
            stacks: HashMap::new(),
            def_ty: HashMap::new(),
            inserted: 0,
        }
    }

    fn collect_assigns(&mut self) {
        for (id, block) in self.cfg.blocks() {
            for stmt in block.stmts() {
                for dest in stmt.defined_vars() {
                    self.assigns.entry(dest.local).or_default().insert(id);
                    self.local_ty.entry(dest.local).or_insert(dest.ty);
                }
            }
        }
    }

    /// Places phis on the iterated dominance frontier of each local's
    /// definition blocks, pruned by live-in.
    ///
    /// The generation counters avoid clearing the visited state between
    /// locals: a block was processed for the current local iff its counter
    /// equals the current generation.
    fn insert_phis(&mut self) -> Result<()> {
        let dom_tree = self.cfg.dominators()?.clone();
        let frontiers = compute_dominance_frontiers(self.cfg.graph(), &dom_tree);
        let liveness = Liveness::compute(self.cfg);

        let bound = self.cfg.block_bound();
        let mut insertion = vec![0u32; bound];
        let mut process = vec![0u32; bound];
        let mut generation = 0u32;

        let locals: Vec<Local> = self.assigns.keys().copied().collect();
        for local in locals {
            generation += 1;

            let mut queue: VecDeque<NodeId> = VecDeque::new();
            for &b in &self.assigns[&local] {
                process[b.index()] = generation;
                queue.push_back(b);
            }

            while let Some(b) = queue.pop_front() {
                let mut frontier: Vec<NodeId> =
                    frontiers[b.index()].iter().copied().collect();
                frontier.sort_by_key(|n| n.index());

                for x in frontier {
                    if insertion[x.index()] >= generation {
                        continue;
                    }
                    let preds: BTreeSet<NodeId> = self.cfg.predecessors(x).collect();
                    let nonempty = self.cfg.block(x).is_some_and(|blk| !blk.is_empty());
                    if nonempty && preds.len() > 1 && liveness.is_live_in(x, local, None) {
                        self.place_phi(x, local, &preds);
                    }
                    insertion[x.index()] = generation;
                    if process[x.index()] < generation {
                        process[x.index()] = generation;
                        queue.push_back(x);
                    }
                }
            }
        }
        Ok(())
    }

    fn place_phi(&mut self, block: NodeId, local: Local, preds: &BTreeSet<NodeId>) {
        let ty = self.local_ty.get(&local).copied().unwrap_or(ValueType::Int);
        let mut args = BTreeMap::new();
        for &pred in preds {
            args.insert(pred, VarExpr::new(local, ty));
        }
        let phi = Stmt::Phi {
            dest: VarExpr::new(local, ty),
            ty: None,
            args,
        };
        if let Some(blk) = self.cfg.block_mut(block) {
            blk.stmts_mut().insert(0, phi);
            self.inserted += 1;
        }
    }

    /// Renames every occurrence with version stacks over a pre-order walk of
    /// the graph from the entry.
    fn rename(&mut self) -> Result<()> {
        let Some(entry) = self.cfg.entry() else {
            return Err(crate::Error::GraphError(
                "SSA renaming on a graph without an entry block".to_string(),
            ));
        };

        enum Frame {
            Enter(NodeId),
            Exit(NodeId),
        }

        let mut visited = vec![false; self.cfg.block_bound()];
        let mut stack = vec![Frame::Enter(entry)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(b) => {
                    if visited[b.index()] {
                        continue;
                    }
                    visited[b.index()] = true;

                    self.rename_block(b)?;

                    let mut succs: Vec<NodeId> = self.cfg.successors(b).collect();
                    succs.sort_by_key(|s| {
                        self.cfg.block(*s).map_or(u32::MAX, |blk| blk.label)
                    });
                    succs.dedup();

                    for &succ in &succs {
                        self.fix_phi_args(b, succ)?;
                    }

                    stack.push(Frame::Exit(b));
                    for &succ in succs.iter().rev() {
                        if !visited[succ.index()] {
                            stack.push(Frame::Enter(succ));
                        }
                    }
                }
                Frame::Exit(b) => self.pop_block_versions(b),
            }
        }
        Ok(())
    }

    fn rename_block(&mut self, b: NodeId) -> Result<()> {
        let Some(block) = self.cfg.block_mut(b) else {
            return Ok(());
        };

        // Borrow the maps directly so the closure over statement expressions
        // can use them while the block is held mutably.
        let counters = &mut self.counters;
        let stacks = &mut self.stacks;
        let def_ty = &mut self.def_ty;

        let gen_name = |local: Local,
                        counters: &mut HashMap<Local, u32>,
                        stacks: &mut HashMap<Local, Vec<u32>>| {
            let counter = counters.entry(local).or_insert(0);
            let version = *counter;
            *counter += 1;
            stacks.entry(local).or_default().push(version);
            version
        };

        for stmt in block.stmts_mut() {
            match stmt {
                Stmt::Phi { dest, .. } => {
                    let version = gen_name(dest.local, counters, stacks);
                    dest.version = Some(version);
                    def_ty.insert(VersionedLocal::new(dest.local, version), dest.ty);
                }
                Stmt::Copy {
                    dest,
                    src,
                    synthetic,
                } if *synthetic && matches!(&*src, Expr::Load(v) if v.local == dest.local) => {
                    // Self-referential parameter defines: the right-hand side
                    // is the incoming value of the same slot, so it takes the
                    // version being created rather than a prior one.
                    let version = gen_name(dest.local, counters, stacks);
                    dest.version = Some(version);
                    if let Expr::Load(v) = src {
                        v.version = Some(version);
                    }
                    def_ty.insert(VersionedLocal::new(dest.local, version), dest.ty);
                }
                _ => {
                    let mut missing: Option<Local> = None;
                    for expr in stmt.exprs_mut() {
                        expr.visit_mut(&mut |e| {
                            if let Expr::Load(v) = e {
                                match stacks.get(&v.local).and_then(|s| s.last()) {
                                    Some(&version) => v.version = Some(version),
                                    None => missing = missing.or(Some(v.local)),
                                }
                            }
                            Walk::Continue
                        });
                    }
                    if let Some(local) = missing {
                        return Err(internal_error!(
                            "use of {} in block {} before any definition",
                            local,
                            b
                        ));
                    }
                    if let Stmt::Copy { dest, .. } = stmt {
                        let version = gen_name(dest.local, counters, stacks);
                        dest.version = Some(version);
                        def_ty.insert(VersionedLocal::new(dest.local, version), dest.ty);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves the phi arguments in `succ` that ride the edge from `b`.
    fn fix_phi_args(&mut self, b: NodeId, succ: NodeId) -> Result<()> {
        // Read the in-scope versions first; the block borrow below is
        // exclusive.
        let mut resolved: Vec<(Local, u32)> = Vec::new();
        if let Some(block) = self.cfg.block(succ) {
            for stmt in block.stmts() {
                let Stmt::Phi { args, .. } = stmt else {
                    break;
                };
                let Some(arg) = args.get(&b) else {
                    return Err(internal_error!(
                        "phi in block {} has no argument for predecessor {}",
                        succ,
                        b
                    ));
                };
                let Some(&version) = self.stacks.get(&arg.local).and_then(|s| s.last()) else {
                    return Err(internal_error!(
                        "no version of {} in scope for phi argument along {} -> {}",
                        arg.local,
                        b,
                        succ
                    ));
                };
                resolved.push((arg.local, version));
            }
        }

        let mut updates: Vec<(VersionedLocal, ValueType)> = Vec::new();
        if let Some(block) = self.cfg.block_mut(succ) {
            for (i, stmt) in block.stmts_mut().iter_mut().enumerate() {
                let Stmt::Phi { dest, ty, args } = stmt else {
                    break;
                };
                let (local, version) = resolved[i];
                let vl = VersionedLocal::new(local, version);
                let Some(&arg_ty) = self.def_ty.get(&vl) else {
                    return Err(internal_error!("phi argument {} has no definition", vl));
                };

                match *ty {
                    None => {
                        *ty = Some(arg_ty);
                        dest.ty = arg_ty;
                        if let Some(v) = dest.version {
                            updates.push((VersionedLocal::new(dest.local, v), arg_ty));
                        }
                    }
                    Some(merged) if merged != arg_ty => {
                        return Err(internal_error!(
                            "phi for {} merges {} with {}",
                            dest.local,
                            merged,
                            arg_ty
                        ));
                    }
                    Some(_) => {}
                }

                if let Some(arg) = args.get_mut(&b) {
                    arg.version = Some(version);
                    arg.ty = arg_ty;
                }
            }
        }
        for (vl, ty) in updates {
            self.def_ty.insert(vl, ty);
        }
        Ok(())
    }

    fn pop_block_versions(&mut self, b: NodeId) {
        let Some(block) = self.cfg.block(b) else {
            return;
        };
        let defs: Vec<Local> = block
            .stmts()
            .iter()
            .flat_map(Stmt::defined_vars)
            .map(|v| v.local)
            .collect();
        for local in defs {
            if let Some(stack) = self.stacks.get_mut(&local) {
                stack.pop();
            }
        }
    }
}
