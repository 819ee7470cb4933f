//! Value propagation over SSA form.
//!
//! Each local with exactly one definition is a candidate for folding into its
//! uses: constants and variable reads always move, and complex right-hand
//! sides move when no statement on any path from the definition to the use
//! can disturb the value. Effectful right-hand sides (invocations, fresh
//! allocations) are moved to at most one use and never duplicated.
//!
//! Path checks run over a statement-level flow graph rebuilt each pass:
//! statements chain sequentially within a block, a block's last statement
//! fans out to the first statement of each successor, and statements with no
//! successor lead to a synthetic exit. Dead definitions are swept at the end
//! of every pass; a dead effectful definition is demoted to a discard rather
//! than dropped.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::flow::FlowGraph;
use crate::ir::{ConstValue, Expr, Stmt, VarExpr, VersionedLocal, Walk};
use crate::utils::graph::NodeId;
use crate::utils::BitSet;

/// Folds definitions into uses until a fixpoint.
pub fn propagate(cfg: &mut FlowGraph) {
    let mut passes = 0u32;
    while run_pass(cfg) {
        passes += 1;
    }
    debug!(passes, "propagation reached a fixpoint");
}

struct PassState {
    stmts: Vec<Stmt>,
    removed: Vec<bool>,
    /// Statement-level successors; the last entry is the synthetic exit.
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    /// Defining statement of each version, copies only. Phi destinations are
    /// deliberately absent so nothing ever propagates a merge.
    defs: HashMap<VersionedLocal, usize>,
    uses: HashMap<VersionedLocal, u32>,
    /// `(block, start, len)` slices of the flat statement list.
    blocks: Vec<(NodeId, usize, usize)>,
}

fn build_state(cfg: &FlowGraph) -> PassState {
    let mut blocks = Vec::new();
    let mut stmts: Vec<Stmt> = Vec::new();
    let mut spans: HashMap<NodeId, (usize, usize)> = HashMap::new();

    for (id, block) in cfg.blocks() {
        let start = stmts.len();
        stmts.extend(block.stmts().iter().cloned());
        let len = stmts.len() - start;
        blocks.push((id, start, len));
        spans.insert(id, (start, len));
    }

    let n = stmts.len();
    let exit = n;
    let mut succs = vec![Vec::new(); n + 1];
    for &(id, start, len) in &blocks {
        if len == 0 {
            continue;
        }
        for i in start..start + len - 1 {
            succs[i].push(i + 1);
        }
        // The tail chains to the head of every successor, skipping through
        // empty blocks.
        let tail = start + len - 1;
        let mut heads = Vec::new();
        let mut queue: Vec<NodeId> = cfg.successors(id).collect();
        let mut seen: HashSet<NodeId> = queue.iter().copied().collect();
        while let Some(b) = queue.pop() {
            match spans.get(&b) {
                Some(&(s, l)) if l > 0 => heads.push(s),
                _ => {
                    for next in cfg.successors(b) {
                        if seen.insert(next) {
                            queue.push(next);
                        }
                    }
                }
            }
        }
        heads.sort_unstable();
        heads.dedup();
        if heads.is_empty() {
            succs[tail].push(exit);
        } else {
            succs[tail].extend(heads);
        }
    }

    let mut preds = vec![Vec::new(); n + 1];
    for (i, out) in succs.iter().enumerate() {
        for &s in out {
            preds[s].push(i);
        }
    }

    let mut defs = HashMap::new();
    let mut uses: HashMap<VersionedLocal, u32> = HashMap::new();
    for (i, stmt) in stmts.iter().enumerate() {
        if let Stmt::Copy { dest, .. } = stmt {
            if let Some(version) = dest.version {
                defs.insert(VersionedLocal::new(dest.local, version), i);
            }
        }
        if let Stmt::Phi { args, .. } = stmt {
            for arg in args.values() {
                if let Some(version) = arg.version {
                    *uses
                        .entry(VersionedLocal::new(arg.local, version))
                        .or_insert(0) += 1;
                }
            }
        } else {
            stmt.for_each_load(&mut |v| {
                if let Some(version) = v.version {
                    *uses
                        .entry(VersionedLocal::new(v.local, version))
                        .or_insert(0) += 1;
                }
            });
        }
    }

    PassState {
        stmts,
        removed: vec![false; n],
        succs,
        preds,
        defs,
        uses,
        blocks,
    }
}

fn run_pass(cfg: &mut FlowGraph) -> bool {
    let mut st = build_state(cfg);
    let mut changed = false;

    for s in 0..st.stmts.len() {
        if st.removed[s] {
            continue;
        }
        if attempt_pop(&mut st, s) {
            changed = true;
            continue;
        }
        if st.stmts[s].is_phi() {
            changed |= fold_phi_args(&mut st, s);
        } else {
            while let Some(plan) = plan_substitution(&st, s) {
                apply(&mut st, s, plan);
                changed = true;
            }
        }
    }

    changed |= clean_dead(&mut st);

    for &(id, start, len) in &st.blocks {
        let Some(block) = cfg.block_mut(id) else {
            continue;
        };
        let body: Vec<Stmt> = (start..start + len)
            .filter(|&i| !st.removed[i])
            .map(|i| st.stmts[i].clone())
            .collect();
        *block.stmts_mut() = body;
    }
    changed
}

fn unuse(st: &mut PassState, x: VersionedLocal) {
    if let Some(count) = st.uses.get_mut(&x) {
        *count = count.saturating_sub(1);
    }
}

fn use_count(st: &PassState, x: VersionedLocal) -> u32 {
    st.uses.get(&x).copied().unwrap_or(0)
}

/// Counts every versioned read inside `expr` as an extra use.
fn count_loads(st: &mut PassState, expr: &Expr) {
    expr.for_each_load(&mut |v| {
        if let Some(version) = v.version {
            *st.uses
                .entry(VersionedLocal::new(v.local, version))
                .or_insert(0) += 1;
        }
    });
}

/// Releases every versioned read inside `expr`.
fn release_loads(st: &mut PassState, expr: &Expr) {
    let mut released = Vec::new();
    expr.for_each_load(&mut |v| {
        if let Some(version) = v.version {
            released.push(VersionedLocal::new(v.local, version));
        }
    });
    for x in released {
        unuse(st, x);
    }
}

/// Discards of values that cost nothing to compute disappear outright.
fn attempt_pop(st: &mut PassState, s: usize) -> bool {
    let Stmt::Pop { value } = &st.stmts[s] else {
        return false;
    };
    match value {
        Expr::Load(v) => {
            let released = v.version.map(|ver| VersionedLocal::new(v.local, ver));
            st.removed[s] = true;
            if let Some(x) = released {
                unuse(st, x);
            }
            true
        }
        Expr::Const(_) => {
            st.removed[s] = true;
            true
        }
        _ => false,
    }
}

/// One planned rewrite of a single read in a statement, identified by its
/// pre-order occurrence index.
enum Plan {
    Const {
        occ: usize,
        x: VersionedLocal,
        value: ConstValue,
    },
    Var {
        occ: usize,
        x: VersionedLocal,
        y: VarExpr,
    },
    /// Move an effectful right-hand side to its only use.
    Move {
        occ: usize,
        x: VersionedLocal,
        def: usize,
    },
    /// Duplicate a pure right-hand side into a use.
    Copy {
        occ: usize,
        x: VersionedLocal,
        def: usize,
    },
}

fn collect_loads(stmt: &Stmt) -> Vec<VarExpr> {
    let mut out = Vec::new();
    for expr in stmt.exprs() {
        expr.for_each_load(&mut |v| out.push(*v));
    }
    out
}

fn plan_substitution(st: &PassState, s: usize) -> Option<Plan> {
    let loads = collect_loads(&st.stmts[s]);
    for (occ, v) in loads.iter().enumerate() {
        let Some(version) = v.version else {
            continue;
        };
        let x = VersionedLocal::new(v.local, version);
        let Some(&d) = st.defs.get(&x) else {
            continue;
        };
        if st.removed[d] {
            continue;
        }
        let Stmt::Copy { src, .. } = &st.stmts[d] else {
            continue;
        };
        match src {
            Expr::Const(value) => {
                return Some(Plan::Const {
                    occ,
                    x,
                    value: value.clone(),
                })
            }
            Expr::Load(y) => {
                if y.local == v.local && y.version == v.version {
                    continue;
                }
                return Some(Plan::Var { occ, x, y: *y });
            }
            // The in-flight exception exists only at the handler's entry.
            Expr::CaughtException { .. } => continue,
            rhs if rhs.is_uncopyable() => {
                if use_count(st, x) == 1 && can_transfer(st, d, s, rhs, *v) {
                    return Some(Plan::Move { occ, x, def: d });
                }
            }
            // An array read at the use site may observe a different element;
            // there is no sharing of the loaded value without numbering it.
            Expr::ArrayLoad { .. } => continue,
            rhs => {
                if can_transfer(st, d, s, rhs, *v) {
                    return Some(Plan::Copy { occ, x, def: d });
                }
            }
        }
    }
    None
}

fn apply(st: &mut PassState, s: usize, plan: Plan) {
    match plan {
        Plan::Const { occ, x, value } => {
            replace_load(&mut st.stmts[s], occ, Expr::Const(value));
            unuse(st, x);
        }
        Plan::Var { occ, x, y } => {
            replace_load(&mut st.stmts[s], occ, Expr::Load(y));
            if let Some(version) = y.version {
                *st.uses
                    .entry(VersionedLocal::new(y.local, version))
                    .or_insert(0) += 1;
            }
            unuse(st, x);
        }
        Plan::Move { occ, x, def } => {
            let Stmt::Copy { src, .. } = &mut st.stmts[def] else {
                return;
            };
            let rhs = std::mem::replace(src, Expr::Const(ConstValue::Null));
            st.removed[def] = true;
            st.defs.remove(&x);
            replace_load(&mut st.stmts[s], occ, rhs);
            unuse(st, x);
        }
        Plan::Copy { occ, x, def } => {
            let Stmt::Copy { src, .. } = &st.stmts[def] else {
                return;
            };
            let rhs = src.clone();
            count_loads(st, &rhs);
            replace_load(&mut st.stmts[s], occ, rhs);
            unuse(st, x);
            if use_count(st, x) == 0 {
                let Stmt::Copy { src, .. } = &st.stmts[def] else {
                    return;
                };
                let dead = src.clone();
                release_loads(st, &dead);
                st.removed[def] = true;
                st.defs.remove(&x);
            }
        }
    }
}

/// Replaces the `occ`-th read (in evaluation order) with `new`.
fn replace_load(stmt: &mut Stmt, occ: usize, new: Expr) {
    let mut seen = 0usize;
    let mut done = false;
    for expr in stmt.exprs_mut() {
        expr.visit_mut(&mut |e| {
            if done {
                return Walk::Skip;
            }
            if let Expr::Load(_) = e {
                if seen == occ {
                    *e = new.clone();
                    done = true;
                    return Walk::Skip;
                }
                seen += 1;
            }
            Walk::Continue
        });
        if done {
            return;
        }
    }
}

/// Phi arguments stay atomic, so only reads of plain variable copies fold.
fn fold_phi_args(st: &mut PassState, s: usize) -> bool {
    let mut changed = false;
    loop {
        let mut found: Option<(NodeId, VersionedLocal, VarExpr)> = None;
        if let Stmt::Phi { args, .. } = &st.stmts[s] {
            for (pred, arg) in args {
                let Some(version) = arg.version else {
                    continue;
                };
                let x = VersionedLocal::new(arg.local, version);
                let Some(&d) = st.defs.get(&x) else {
                    continue;
                };
                if st.removed[d] {
                    continue;
                }
                if let Stmt::Copy {
                    src: Expr::Load(y), ..
                } = &st.stmts[d]
                {
                    if y.local == arg.local && y.version == arg.version {
                        continue;
                    }
                    found = Some((*pred, x, *y));
                    break;
                }
            }
        }
        let Some((pred, x, y)) = found else {
            break;
        };
        if let Stmt::Phi { args, .. } = &mut st.stmts[s] {
            if let Some(arg) = args.get_mut(&pred) {
                *arg = y;
            }
        }
        if let Some(version) = y.version {
            *st.uses
                .entry(VersionedLocal::new(y.local, version))
                .or_insert(0) += 1;
        }
        unuse(st, x);
        changed = true;
    }
    changed
}

/// Decides whether the right-hand side at `d` still computes the same value
/// when evaluated at `s` instead.
///
/// Effects the value depends on are gathered from the right-hand side, then
/// every statement on a definition-to-use trail is checked against them. The
/// use statement itself only matters up to the replaced read, since nothing
/// evaluated after it can run first.
fn can_transfer(st: &PassState, d: usize, s: usize, rhs: &Expr, x: VarExpr) -> bool {
    let mut invoke = false;
    let mut array = false;
    let mut fields: HashSet<String> = HashSet::new();
    rhs.visit(&mut |e| {
        match e {
            Expr::Invoke { .. } | Expr::InvokeDynamic { .. } => invoke = true,
            Expr::ArrayLoad { .. } => array = true,
            Expr::FieldLoad { owner, name, .. } => {
                fields.insert(format!("{owner}.{name}"));
            }
            _ => {}
        }
        Walk::Continue
    });
    if !invoke && !array && fields.is_empty() {
        return true;
    }

    let fwd = reach(&st.succs, d);
    let bwd = reach(&st.preds, s);
    let mut path: Vec<usize> = (0..st.stmts.len())
        .filter(|&i| fwd.contains(i) && bwd.contains(i) && i != d && !st.removed[i])
        .collect();
    if !path.contains(&s) {
        path.push(s);
    }

    for p in path {
        let stmt = &st.stmts[p];
        if p != s {
            match stmt {
                Stmt::FieldStore { owner, name, .. } => {
                    if invoke || fields.contains(&format!("{owner}.{name}")) {
                        return false;
                    }
                }
                Stmt::ArrayStore { .. } => {
                    if invoke || array {
                        return false;
                    }
                }
                Stmt::Monitor { .. } => {
                    if invoke {
                        return false;
                    }
                }
                _ => {}
            }
        }
        // Any call on the trail can write what the value reads, and when the
        // value itself calls, reordering against other effects is unsound.
        let mut conflict = false;
        let mut stopped = false;
        for expr in stmt.exprs() {
            expr.visit(&mut |e| {
                if conflict || stopped {
                    return Walk::Skip;
                }
                match e {
                    Expr::Load(v)
                        if p == s && v.local == x.local && v.version == x.version =>
                    {
                        stopped = true;
                        return Walk::Skip;
                    }
                    Expr::Invoke { .. } | Expr::InvokeDynamic { .. } => {
                        conflict = true;
                        return Walk::Skip;
                    }
                    _ => {}
                }
                Walk::Continue
            });
            if conflict || stopped {
                break;
            }
        }
        if conflict {
            return false;
        }
    }
    true
}

fn reach(adj: &[Vec<usize>], from: usize) -> BitSet {
    let mut set = BitSet::new(adj.len());
    set.insert(from);
    let mut stack = vec![from];
    while let Some(i) = stack.pop() {
        for &next in &adj[i] {
            if !set.contains(next) {
                set.insert(next);
                stack.push(next);
            }
        }
    }
    set
}

enum Sweep {
    Demote,
    Drop(Expr),
    DropPhi(Vec<VersionedLocal>),
}

/// Sweeps definitions nothing reads, repeating until stable since each drop
/// can strand the definitions it read from.
fn clean_dead(st: &mut PassState) -> bool {
    let mut changed = false;
    loop {
        let mut swept = false;
        for s in 0..st.stmts.len() {
            if st.removed[s] {
                continue;
            }
            let action = match &st.stmts[s] {
                Stmt::Copy {
                    dest,
                    src,
                    synthetic,
                } => {
                    if *synthetic {
                        continue;
                    }
                    let Some(version) = dest.version else {
                        continue;
                    };
                    let x = VersionedLocal::new(dest.local, version);
                    if use_count(st, x) != 0 {
                        continue;
                    }
                    if src.is_uncopyable() {
                        Some((x, Sweep::Demote))
                    } else {
                        Some((x, Sweep::Drop(src.clone())))
                    }
                }
                Stmt::Phi { dest, args, .. } => {
                    let Some(version) = dest.version else {
                        continue;
                    };
                    let x = VersionedLocal::new(dest.local, version);
                    if use_count(st, x) != 0 {
                        continue;
                    }
                    let released = args
                        .values()
                        .filter_map(|a| a.version.map(|v| VersionedLocal::new(a.local, v)))
                        .collect();
                    Some((x, Sweep::DropPhi(released)))
                }
                _ => None,
            };
            let Some((x, action)) = action else {
                continue;
            };
            match action {
                // The effect survives as a discard.
                Sweep::Demote => {
                    let Stmt::Copy { src, .. } = &mut st.stmts[s] else {
                        continue;
                    };
                    let value = std::mem::replace(src, Expr::Const(ConstValue::Null));
                    st.stmts[s] = Stmt::Pop { value };
                    st.defs.remove(&x);
                }
                Sweep::Drop(rhs) => {
                    release_loads(st, &rhs);
                    st.removed[s] = true;
                    st.defs.remove(&x);
                }
                Sweep::DropPhi(released) => {
                    for arg in released {
                        unuse(st, arg);
                    }
                    st.removed[s] = true;
                }
            }
            swept = true;
        }
        changed |= swept;
        if !swept {
            break;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowEdge;
    use crate::ir::{BinaryOp, BranchKind, InvokeKind, Local, ValueType};

    fn iv(index: u16, version: u32) -> VarExpr {
        VarExpr::versioned(Local::slot(index), version, ValueType::Int)
    }

    fn copy(dest: VarExpr, src: Expr) -> Stmt {
        Stmt::Copy {
            dest,
            src,
            synthetic: false,
        }
    }

    fn call() -> Expr {
        Expr::Invoke {
            kind: InvokeKind::Static,
            owner: "C".into(),
            name: "get".into(),
            args: Vec::new(),
            ret: ValueType::Int,
        }
    }

    fn field(name: &str) -> Expr {
        Expr::FieldLoad {
            instance: None,
            owner: "C".into(),
            name: name.into(),
            ty: ValueType::Int,
        }
    }

    fn store(name: &str) -> Stmt {
        Stmt::FieldStore {
            instance: None,
            owner: "C".into(),
            name: name.into(),
            value: Expr::Const(ConstValue::Int(0)),
            ty: ValueType::Int,
        }
    }

    fn single_block(stmts: Vec<Stmt>) -> (FlowGraph, NodeId) {
        let mut cfg = FlowGraph::new();
        let a = cfg.create_block();
        cfg.set_entry(a);
        for stmt in stmts {
            cfg.block_mut(a).unwrap().push(stmt);
        }
        (cfg, a)
    }

    #[test]
    fn test_pops_of_cheap_values_vanish() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), Expr::Const(ConstValue::Int(5))),
            Stmt::Pop {
                value: Expr::load(iv(0, 0)),
            },
            Stmt::Pop {
                value: Expr::Const(ConstValue::Int(9)),
            },
            Stmt::Return { value: None },
        ]);
        propagate(&mut cfg);
        assert_eq!(cfg.block(a).unwrap().stmts(), &[Stmt::Return { value: None }]);
    }

    #[test]
    fn test_constant_folds_into_return() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), Expr::Const(ConstValue::Int(7))),
            Stmt::Return {
                value: Some(Expr::load(iv(0, 0))),
            },
        ]);
        propagate(&mut cfg);
        assert_eq!(
            cfg.block(a).unwrap().stmts(),
            &[Stmt::Return {
                value: Some(Expr::Const(ConstValue::Int(7))),
            }]
        );
    }

    #[test]
    fn test_copy_chain_collapses() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), Expr::Const(ConstValue::Int(1))),
            copy(iv(1, 0), Expr::load(iv(0, 0))),
            Stmt::Return {
                value: Some(Expr::load(iv(1, 0))),
            },
        ]);
        propagate(&mut cfg);
        assert_eq!(
            cfg.block(a).unwrap().stmts(),
            &[Stmt::Return {
                value: Some(Expr::Const(ConstValue::Int(1))),
            }]
        );
    }

    #[test]
    fn test_single_use_invocation_moves() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), call()),
            Stmt::Return {
                value: Some(Expr::load(iv(0, 0))),
            },
        ]);
        propagate(&mut cfg);
        assert_eq!(
            cfg.block(a).unwrap().stmts(),
            &[Stmt::Return { value: Some(call()) }]
        );
    }

    #[test]
    fn test_twice_used_invocation_stays() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), call()),
            copy(
                iv(1, 0),
                Expr::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(Expr::load(iv(0, 0))),
                    right: Box::new(Expr::load(iv(0, 0))),
                    ty: ValueType::Int,
                },
            ),
            Stmt::Return {
                value: Some(Expr::load(iv(1, 0))),
            },
        ]);
        propagate(&mut cfg);

        // The pure sum folds into the return; the call keeps its definition.
        let stmts = cfg.block(a).unwrap().stmts();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], Stmt::Copy { src, .. } if *src == call()));
        let Stmt::Return { value: Some(value) } = &stmts[1] else {
            panic!("return missing");
        };
        let mut loads = 0;
        value.for_each_load(&mut |v| {
            assert_eq!(*v, iv(0, 0));
            loads += 1;
        });
        assert_eq!(loads, 2);
    }

    #[test]
    fn test_field_load_blocked_by_matching_store() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), field("f")),
            store("f"),
            Stmt::Return {
                value: Some(Expr::load(iv(0, 0))),
            },
        ]);
        propagate(&mut cfg);
        let stmts = cfg.block(a).unwrap().stmts();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[2], Stmt::Return { value: Some(Expr::Load(v)) } if *v == iv(0, 0)));
    }

    #[test]
    fn test_field_load_moves_past_unrelated_store() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), field("f")),
            store("g"),
            Stmt::Return {
                value: Some(Expr::load(iv(0, 0))),
            },
        ]);
        propagate(&mut cfg);
        let stmts = cfg.block(a).unwrap().stmts();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], store("g"));
        assert_eq!(
            stmts[1],
            Stmt::Return {
                value: Some(field("f")),
            }
        );
    }

    #[test]
    fn test_invocation_blocked_by_any_store() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), call()),
            store("f"),
            Stmt::Return {
                value: Some(Expr::load(iv(0, 0))),
            },
        ]);
        propagate(&mut cfg);
        assert_eq!(cfg.block(a).unwrap().stmts().len(), 3);
    }

    #[test]
    fn test_dead_invocation_demoted_to_pop() {
        let (mut cfg, a) = single_block(vec![
            copy(iv(0, 0), call()),
            Stmt::Return { value: None },
        ]);
        propagate(&mut cfg);
        let stmts = cfg.block(a).unwrap().stmts();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], Stmt::Pop { value: call() });
    }

    #[test]
    fn test_synthetic_copy_survives_sweep() {
        let (mut cfg, a) = single_block(vec![
            Stmt::Copy {
                dest: iv(0, 0),
                src: Expr::load(iv(0, 0)),
                synthetic: true,
            },
            Stmt::Return { value: None },
        ]);
        propagate(&mut cfg);
        assert_eq!(cfg.block(a).unwrap().stmts().len(), 2);
    }

    #[test]
    fn test_phi_argument_copy_folds() {
        let mut cfg = FlowGraph::new();
        let entry = cfg.create_block();
        let a = cfg.create_block();
        let b = cfg.create_block();
        let join = cfg.create_block();
        cfg.set_entry(entry);
        cfg.add_edge(entry, a, FlowEdge::ConditionalJump(BranchKind::Ne));
        cfg.add_edge(entry, b, FlowEdge::Immediate);
        cfg.add_edge(a, join, FlowEdge::Jump);
        cfg.add_edge(b, join, FlowEdge::Immediate);

        let y = VarExpr::versioned(Local::slot(1), 0, ValueType::Reference);
        cfg.block_mut(entry)
            .unwrap()
            .push(copy(y, Expr::CaughtException { class: None }));
        cfg.block_mut(entry).unwrap().push(Stmt::Branch {
            left: Expr::load(y),
            right: Expr::Const(ConstValue::Null),
            kind: BranchKind::Ne,
            target: a,
        });
        let x = VarExpr::versioned(Local::slot(0), 1, ValueType::Reference);
        cfg.block_mut(a).unwrap().push(copy(x, Expr::load(y)));
        cfg.block_mut(a).unwrap().push(Stmt::Jump { target: join });
        let other = VarExpr::versioned(Local::slot(0), 2, ValueType::Reference);
        cfg.block_mut(b)
            .unwrap()
            .push(copy(other, Expr::Const(ConstValue::Null)));

        let mut args = std::collections::BTreeMap::new();
        args.insert(a, x);
        args.insert(b, other);
        let dest = VarExpr::versioned(Local::slot(0), 3, ValueType::Reference);
        cfg.block_mut(join).unwrap().push(Stmt::Phi {
            dest,
            ty: Some(ValueType::Reference),
            args,
        });
        cfg.block_mut(join).unwrap().push(Stmt::Return {
            value: Some(Expr::load(dest)),
        });

        propagate(&mut cfg);

        // The copy in `a` folded into the phi argument and was swept.
        assert_eq!(cfg.block(a).unwrap().stmts(), &[Stmt::Jump { target: join }]);
        let Stmt::Phi { args, .. } = &cfg.block(join).unwrap().stmts()[0] else {
            panic!("phi missing");
        };
        assert_eq!(args[&a], y);
    }
}
