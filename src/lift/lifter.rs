//! Lifting stack-machine instructions into the register IR.
//!
//! The lifter abstractly interprets the instruction stream with a symbolic
//! operand stack, carving the stream into basic blocks at labels and control
//! transfers. Blocks are discovered through a work queue: whenever a branch
//! target receives an input stack for the first time it is queued, and a
//! target that already has one is checked for stack coherency instead.
//!
//! The operand stack is *spilled* at every block boundary: each entry is
//! copied into the stack local named after its slot position, and the stack
//! is rebuilt as loads of those locals. Spilling is what makes input stacks
//! from different predecessors compatible, and it is also what lets the
//! dup/swap family be lowered into plain copies between stack locals.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::flow::{BlockFlags, ExceptionRange, FlowEdge, FlowGraph};
use crate::ir::{
    BranchKind, ConstValue, Expr, ExpressionStack, Local, Stmt, ValueType, VarExpr,
};
use crate::lift::{BranchOperands, Insn, LabelId, LiftVerifier, Routine};
use crate::utils::graph::NodeId;
use crate::Result;

// Expected top-down slot widths per dup/swap form.
const DUP_HEIGHTS: [u32; 1] = [1];
const DUP_X1_HEIGHTS: [u32; 2] = [1, 1];
const DUP_X2_64_HEIGHTS: [u32; 2] = [1, 2];
const DUP_X2_32_HEIGHTS: [u32; 3] = [1, 1, 1];
const DUP2_64_HEIGHTS: [u32; 1] = [2];
const DUP2_32_HEIGHTS: [u32; 2] = [1, 1];
const DUP2_X1_64_HEIGHTS: [u32; 2] = [2, 1];
const DUP2_X1_32_HEIGHTS: [u32; 3] = [1, 1, 1];
const DUP2_X2_64X64_HEIGHTS: [u32; 2] = [2, 2];
const DUP2_X2_64X32_HEIGHTS: [u32; 3] = [2, 1, 1];
const DUP2_X2_32X64_HEIGHTS: [u32; 3] = [1, 1, 2];
const DUP2_X2_32X32_HEIGHTS: [u32; 4] = [1, 1, 1, 1];
const SWAP_HEIGHTS: [u32; 2] = [1, 1];

/// Lifts a routine into a control-flow graph over the register IR.
///
/// # Errors
///
/// Returns [`Error::Malformed`](crate::Error::Malformed) for verifier-invariant
/// violations (stack underflow, incoherent merge stacks, dangling labels) and
/// [`Error::UnsupportedInstruction`](crate::Error::UnsupportedInstruction) for
/// subroutine instructions.
pub fn lift(routine: &Routine, verifier: &dyn LiftVerifier) -> Result<FlowGraph> {
    Lifter::new(routine, verifier)?.run()
}

/// Tracks the stack-local definitions of one dup/swap lowering.
///
/// Slot indices below the base height start out bound to the saved loads that
/// were popped; assignments rebind them and introduce temporaries above the
/// base height.
struct Slots {
    defs: HashMap<u32, VarExpr>,
}

impl Slots {
    fn new() -> Self {
        Slots {
            defs: HashMap::new(),
        }
    }

    fn note(&mut self, expr: &Expr) -> Result<()> {
        if let Expr::Load(v) = expr {
            if v.local.is_stack() {
                self.defs.insert(u32::from(v.local.index), *v);
                return Ok(());
            }
        }
        Err(internal_error!(
            "operand {} is not a saved stack entry",
            expr
        ))
    }

    fn load(&self, index: u32) -> Result<Expr> {
        self.defs
            .get(&index)
            .map(|v| Expr::Load(*v))
            .ok_or_else(|| internal_error!("stack slot {} has no definition", index))
    }
}

struct Lifter<'r> {
    routine: &'r Routine,
    verifier: &'r dyn LiftVerifier,
    cfg: FlowGraph,
    /// Working instruction list; synthetic fallthrough labels are inserted
    /// after conditional branches
    insns: Vec<Insn>,
    /// Label to instruction index
    label_index: HashMap<LabelId, usize>,
    /// Label to block
    blocks: HashMap<LabelId, NodeId>,
    /// Blocks that have received an input stack
    has_input: HashSet<NodeId>,
    /// Input stack per block
    input_stacks: HashMap<NodeId, ExpressionStack>,
    /// Caught-exception class per handler block
    handlers: HashMap<NodeId, Option<String>>,
    queue: VecDeque<LabelId>,
    visited: HashSet<LabelId>,
    /// The symbolic stack of the block currently being interpreted
    stack: ExpressionStack,
    /// Whether the current block's stack has been spilled yet
    saved: bool,
    next_label: u32,
}

impl<'r> Lifter<'r> {
    fn new(routine: &'r Routine, verifier: &'r dyn LiftVerifier) -> Result<Self> {
        if routine.insns.is_empty() {
            return Err(malformed_error!("routine {} has no instructions", routine.name));
        }

        // Validate labels on the original stream before any synthesis.
        routine.label_positions()?;

        let mut insns = routine.insns.clone();
        let mut next_label = routine
            .insns
            .iter()
            .filter_map(|i| match i {
                Insn::Label(l) => Some(l.0 + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        // The entry must be labeled so it can be a block like any other.
        if !matches!(insns.first(), Some(Insn::Label(_))) {
            insns.insert(0, Insn::Label(LabelId(next_label)));
            next_label += 1;
        }

        let mut lifter = Lifter {
            routine,
            verifier,
            cfg: FlowGraph::new(),
            insns,
            label_index: HashMap::new(),
            blocks: HashMap::new(),
            has_input: HashSet::new(),
            input_stacks: HashMap::new(),
            handlers: HashMap::new(),
            queue: VecDeque::new(),
            visited: HashSet::new(),
            stack: ExpressionStack::new(),
            saved: false,
            next_label,
        };
        lifter.reindex_labels();
        Ok(lifter)
    }

    fn run(mut self) -> Result<FlowGraph> {
        self.define_entry()?;
        self.define_handlers();

        while let Some(label) = self.queue.pop_front() {
            if self.visited.insert(label) {
                self.process(label)?;
            }
        }

        self.make_ranges()?;

        debug!(
            routine = %self.routine.name,
            blocks = self.cfg.block_count(),
            ranges = self.cfg.ranges().len(),
            "lifted routine"
        );
        Ok(self.cfg)
    }

    fn reindex_labels(&mut self) {
        self.label_index.clear();
        for (index, insn) in self.insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                self.label_index.insert(*label, index);
            }
        }
    }

    fn entry_label(&self) -> LabelId {
        match self.insns.first() {
            Some(Insn::Label(label)) => *label,
            // new() guarantees a leading label
            _ => LabelId(0),
        }
    }

    fn make_block(&mut self, label: LabelId) -> NodeId {
        if let Some(&block) = self.blocks.get(&label) {
            return block;
        }
        let block = self.cfg.create_block();
        self.blocks.insert(label, block);
        block
    }

    /// Creates the entry block: parameters are given self-referential
    /// synthetic copies so every variable the routine reads has a reaching
    /// definition.
    fn define_entry(&mut self) -> Result<()> {
        let label = self.entry_label();
        let entry = self.make_block(label);
        self.cfg.set_entry(entry);

        let block = self
            .cfg
            .block_mut(entry)
            .ok_or_else(|| internal_error!("entry block vanished"))?;
        block.flags |= BlockFlags::NO_MERGE;

        let mut slot: u16 = 0;
        if !self.routine.is_static {
            let var = VarExpr::new(Local::slot(slot), ValueType::Reference);
            block.push(Stmt::Copy {
                dest: var,
                src: Expr::Load(var),
                synthetic: true,
            });
            slot += 1;
        }
        for &ty in &self.routine.params {
            let var = VarExpr::new(Local::slot(slot), ty);
            block.push(Stmt::Copy {
                dest: var,
                src: Expr::Load(var),
                synthetic: true,
            });
            slot += u16::try_from(ty.width()).unwrap_or(1);
        }

        self.has_input.insert(entry);
        self.input_stacks.insert(entry, ExpressionStack::new());
        self.queue.push_back(label);
        Ok(())
    }

    /// Seeds each exception handler: the in-flight exception is materialized
    /// as stack local 0 and the handler's input stack is a single load of it.
    fn define_handlers(&mut self) {
        let routine = self.routine;
        for entry in &routine.exception_table {
            let handler = self.make_block(entry.handler);

            match self.handlers.get_mut(&handler) {
                Some(existing) => {
                    // Handlers shared between entries with different caught
                    // types observe the union, a catch-all.
                    if *existing != entry.catch_type {
                        *existing = None;
                        if let Some(block) = self.cfg.block_mut(handler) {
                            if let Some(Stmt::Copy { src, .. }) = block.stmts_mut().first_mut() {
                                *src = Expr::CaughtException { class: None };
                            }
                        }
                    }
                    continue;
                }
                None => {
                    self.handlers.insert(handler, entry.catch_type.clone());
                }
            }

            let caught = VarExpr::new(Local::stack(0), ValueType::Reference);
            if let Some(block) = self.cfg.block_mut(handler) {
                block.push(Stmt::Copy {
                    dest: caught,
                    src: Expr::CaughtException {
                        class: entry.catch_type.clone(),
                    },
                    synthetic: true,
                });
            }

            let mut input = ExpressionStack::new();
            input.push(Expr::Load(caught));
            self.input_stacks.insert(handler, input);
            self.has_input.insert(handler);
            self.queue.push_back(entry.handler);
        }
    }

    fn emit(&mut self, block: NodeId, stmt: Stmt) {
        if let Some(b) = self.cfg.block_mut(block) {
            b.push(stmt);
        }
    }

    /// Interprets the instructions of one block, starting just past its
    /// label.
    fn process(&mut self, label: LabelId) -> Result<()> {
        let b = self.make_block(label);
        self.stack = self
            .input_stacks
            .get(&b)
            .cloned()
            .unwrap_or_default();
        self.saved = false;

        let start = *self
            .label_index
            .get(&label)
            .ok_or_else(|| internal_error!("block label {} has no position", label))?;

        let mut index = start + 1;
        loop {
            let Some(insn) = self.insns.get(index).cloned() else {
                return Err(malformed_error!(
                    "control flow runs off the end of routine {}",
                    self.routine.name
                ));
            };

            match insn {
                Insn::Label(next) => {
                    self.update_target_stack(b, next, FlowEdge::Immediate)?;
                    return Ok(());
                }
                Insn::Goto { target } => {
                    let t = self.update_target_stack(b, target, FlowEdge::Jump)?;
                    self.emit(b, Stmt::Jump { target: t });
                    return Ok(());
                }
                Insn::Branch {
                    kind,
                    operands,
                    target,
                } => {
                    if !self.saved {
                        self.save_stack(b)?;
                        self.saved = true;
                    }
                    let (left, right) = self.branch_operands(operands)?;
                    let t =
                        self.update_target_stack(b, target, FlowEdge::ConditionalJump(kind))?;
                    self.emit(
                        b,
                        Stmt::Branch {
                            left,
                            right,
                            kind,
                            target: t,
                        },
                    );

                    // The fallthrough becomes its own labeled block.
                    let fallthrough = LabelId(self.next_label);
                    self.next_label += 1;
                    self.insns.insert(index + 1, Insn::Label(fallthrough));
                    self.reindex_labels();
                    self.update_target_stack(b, fallthrough, FlowEdge::Immediate)?;
                    return Ok(());
                }
                Insn::Switch { cases, default } => {
                    if !self.saved {
                        self.save_stack(b)?;
                        self.saved = true;
                    }
                    let value = self.stack.pop()?;
                    let mut resolved = Vec::with_capacity(cases.len());
                    for (key, target) in cases {
                        let t = self.update_target_stack(b, target, FlowEdge::Switch(key))?;
                        resolved.push((key, t));
                    }
                    let d = self.update_target_stack(b, default, FlowEdge::DefaultSwitch)?;
                    self.emit(
                        b,
                        Stmt::Switch {
                            value,
                            cases: resolved,
                            default: d,
                        },
                    );
                    return Ok(());
                }
                Insn::Return { ty } => {
                    let value = if ty == ValueType::Void {
                        None
                    } else {
                        self.save_stack(b)?;
                        self.verifier.assert_heights(&self.stack, &[ty.width()])?;
                        Some(self.stack.pop()?)
                    };
                    self.emit(b, Stmt::Return { value });
                    return Ok(());
                }
                Insn::Throw => {
                    self.save_stack(b)?;
                    self.verifier.assert_heights(&self.stack, &[1])?;
                    let value = self.stack.pop()?;
                    self.emit(b, Stmt::Throw { value });
                    return Ok(());
                }
                Insn::Jsr { .. } | Insn::Ret { .. } => {
                    return Err(crate::Error::UnsupportedInstruction(
                        insn.mnemonic().to_string(),
                    ));
                }
                other => self.interpret(b, other)?,
            }
            index += 1;
        }
    }

    /// Pops conditional-branch operands, right before left. Single-operand
    /// forms compare against a constant zero or null on the right.
    fn branch_operands(&mut self, operands: BranchOperands) -> Result<(Expr, Expr)> {
        match operands {
            BranchOperands::IntInt | BranchOperands::RefRef => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                Ok((left, right))
            }
            BranchOperands::IntZero => {
                let left = self.stack.pop()?;
                Ok((left, Expr::Const(ConstValue::Int(0))))
            }
            BranchOperands::RefNull => {
                let left = self.stack.pop()?;
                Ok((left, Expr::Const(ConstValue::Null)))
            }
        }
    }

    /// Propagates the current stack to a branch target.
    ///
    /// The current stack is spilled once per block, on the first outgoing
    /// edge. A target seen for the first time adopts a copy of the stack and
    /// is queued; a target that already has an input stack must agree with
    /// ours slot for slot.
    fn update_target_stack(
        &mut self,
        b: NodeId,
        target: LabelId,
        edge: FlowEdge,
    ) -> Result<NodeId> {
        if self.has_input.contains(&b) && !self.saved {
            self.save_stack(b)?;
            self.saved = true;
        }

        let t = self.make_block(target);
        if self.has_input.insert(t) {
            self.input_stacks.insert(t, self.stack.clone());
            self.queue.push_back(target);
        } else {
            let expected = self
                .input_stacks
                .get(&t)
                .ok_or_else(|| internal_error!("block for {} lost its input stack", target))?;
            if !can_succeed(expected, &self.stack) {
                return Err(malformed_error!(
                    "stack coherency mismatch at {}: have {}, expected {}",
                    target,
                    self.stack,
                    expected
                ));
            }
        }

        self.cfg.add_edge(b, t, edge);
        Ok(t)
    }

    /// Spills every stack entry to the stack local named after its slot and
    /// rebuilds the stack as loads of those locals.
    fn save_stack(&mut self, b: NodeId) -> Result<()> {
        let entries = self.stack.take_entries();
        let mut height: u32 = 0;
        for expr in entries {
            let width = expr.ty().width();
            let var = self.assign_stack(b, height, expr)?;
            self.stack.push(Expr::Load(var));
            height += width;
        }
        Ok(())
    }

    /// Copies `expr` into the stack local for `index` unless it already is a
    /// load of exactly that local.
    fn assign_stack(&mut self, b: NodeId, index: u32, expr: Expr) -> Result<VarExpr> {
        let index16 = u16::try_from(index)
            .map_err(|_| malformed_error!("operand stack deeper than {} slots", u16::MAX))?;
        if let Expr::Load(v) = &expr {
            if v.local == Local::stack(index16) {
                return Ok(*v);
            }
        }
        let dest = VarExpr::new(Local::stack(index16), expr.ty());
        self.emit(
            b,
            Stmt::Copy {
                dest,
                src: expr,
                synthetic: false,
            },
        );
        Ok(dest)
    }

    fn spill(&mut self, b: NodeId, index: u32, expr: Expr, slots: &mut Slots) -> Result<()> {
        let var = self.assign_stack(b, index, expr)?;
        slots.defs.insert(index, var);
        Ok(())
    }

    /// Computes an expression, spills it to the next free stack slot, and
    /// pushes a load of that slot.
    ///
    /// Used for results that must be evaluated exactly where they appear:
    /// invocations, allocations, field reads, and the like.
    fn push_spilled(&mut self, b: NodeId, expr: Expr) -> Result<()> {
        let index = self.stack.height();
        let var = self.assign_stack(b, index, expr)?;
        self.stack.push(Expr::Load(var));
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn interpret(&mut self, b: NodeId, insn: Insn) -> Result<()> {
        // Statement-emitting instructions spill the whole stack before
        // popping, so pending computations are linearized ahead of any side
        // effect. Pure pushes and the dup family (which spills itself) skip
        // this.
        match &insn {
            Insn::Const(_)
            | Insn::Load { .. }
            | Insn::Pop { .. }
            | Insn::NewArray { .. }
            | Insn::Dup
            | Insn::DupX1
            | Insn::DupX2
            | Insn::Dup2
            | Insn::Dup2X1
            | Insn::Dup2X2
            | Insn::Swap => {}
            _ => self.save_stack(b)?,
        }

        match insn {
            Insn::Const(value) => self.stack.push(Expr::Const(value)),
            Insn::Load { slot, ty } => {
                self.stack
                    .push(Expr::Load(VarExpr::new(Local::slot(slot), ty)));
            }
            Insn::Store { slot, ty } => {
                let src = self.stack.pop()?;
                self.emit(
                    b,
                    Stmt::Copy {
                        dest: VarExpr::new(Local::slot(slot), ty),
                        src,
                        synthetic: false,
                    },
                );
            }
            Insn::ArrayLoad { ty } => {
                let index = self.stack.pop()?;
                let array = self.stack.pop()?;
                self.stack.push(Expr::ArrayLoad {
                    array: Box::new(array),
                    index: Box::new(index),
                    ty,
                });
            }
            Insn::ArrayStore { ty } => {
                let value = self.stack.pop()?;
                let index = self.stack.pop()?;
                let array = self.stack.pop()?;
                self.emit(
                    b,
                    Stmt::ArrayStore {
                        array,
                        index,
                        value,
                        ty,
                    },
                );
            }
            Insn::Pop { wide } => {
                let top = self.stack.pop()?;
                if wide {
                    if top.ty().is_wide() {
                        self.emit(b, Stmt::Pop { value: top });
                    } else {
                        let second = self.stack.pop()?;
                        if second.ty().is_wide() {
                            return Err(malformed_error!(
                                "pop2 would split wide value {}",
                                second
                            ));
                        }
                        self.emit(b, Stmt::Pop { value: top });
                        self.emit(b, Stmt::Pop { value: second });
                    }
                } else {
                    if top.ty().is_wide() {
                        return Err(malformed_error!("pop would split wide value {}", top));
                    }
                    self.emit(b, Stmt::Pop { value: top });
                }
            }
            Insn::Dup => self.lower_dup(b)?,
            Insn::DupX1 => self.lower_dup_x1(b)?,
            Insn::DupX2 => self.lower_dup_x2(b)?,
            Insn::Dup2 => self.lower_dup2(b)?,
            Insn::Dup2X1 => self.lower_dup2_x1(b)?,
            Insn::Dup2X2 => self.lower_dup2_x2(b)?,
            Insn::Swap => self.lower_swap(b)?,
            Insn::Binary { op, ty } => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                let expr = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    ty,
                };
                self.push_spilled(b, expr)?;
            }
            Insn::Neg { ty } => {
                let value = self.stack.pop()?;
                self.stack.push(Expr::Neg {
                    value: Box::new(value),
                    ty,
                });
            }
            Insn::Inc { slot, amount } => {
                let var = VarExpr::new(Local::slot(slot), ValueType::Int);
                self.emit(
                    b,
                    Stmt::Copy {
                        dest: var,
                        src: Expr::Binary {
                            op: crate::ir::BinaryOp::Add,
                            left: Box::new(Expr::Const(ConstValue::Int(amount))),
                            right: Box::new(Expr::Load(var)),
                            ty: ValueType::Int,
                        },
                        synthetic: false,
                    },
                );
            }
            Insn::Cast { to } => {
                let value = self.stack.pop()?;
                let expr = Expr::Cast {
                    value: Box::new(value),
                    ty: to,
                };
                self.push_spilled(b, expr)?;
            }
            Insn::CheckCast { class } => {
                let value = self.stack.pop()?;
                let expr = Expr::CheckCast {
                    value: Box::new(value),
                    class,
                };
                self.push_spilled(b, expr)?;
            }
            Insn::InstanceOf { class } => {
                let value = self.stack.pop()?;
                let expr = Expr::InstanceOf {
                    value: Box::new(value),
                    class,
                };
                self.push_spilled(b, expr)?;
            }
            Insn::Compare { kind } => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                self.stack.push(Expr::Compare {
                    kind,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            Insn::New { class } => {
                let expr = Expr::New { class };
                self.push_spilled(b, expr)?;
            }
            Insn::NewArray { elem, dims } => {
                let mut lengths = Vec::with_capacity(usize::from(dims));
                for _ in 0..dims {
                    lengths.push(self.stack.pop()?);
                }
                lengths.reverse();
                let expr = Expr::NewArray { lengths, elem };
                self.push_spilled(b, expr)?;
            }
            Insn::ArrayLength => {
                let array = self.stack.pop()?;
                self.stack.push(Expr::ArrayLength {
                    array: Box::new(array),
                });
            }
            Insn::FieldLoad {
                is_static,
                owner,
                name,
                ty,
            } => {
                let instance = if is_static {
                    None
                } else {
                    Some(Box::new(self.stack.pop()?))
                };
                let expr = Expr::FieldLoad {
                    instance,
                    owner,
                    name,
                    ty,
                };
                self.push_spilled(b, expr)?;
            }
            Insn::FieldStore {
                is_static,
                owner,
                name,
                ty,
            } => {
                let value = self.stack.pop()?;
                let instance = if is_static {
                    None
                } else {
                    Some(self.stack.pop()?)
                };
                self.emit(
                    b,
                    Stmt::FieldStore {
                        instance,
                        owner,
                        name,
                        value,
                        ty,
                    },
                );
            }
            Insn::Invoke {
                kind,
                owner,
                name,
                params,
                ret,
            } => {
                let argc = params.len() + usize::from(kind != crate::ir::InvokeKind::Static);
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.stack.pop()?);
                }
                args.reverse();
                let expr = Expr::Invoke {
                    kind,
                    owner,
                    name,
                    args,
                    ret,
                };
                if ret == ValueType::Void {
                    self.emit(b, Stmt::Pop { value: expr });
                } else {
                    self.push_spilled(b, expr)?;
                }
            }
            Insn::InvokeDynamic {
                bootstrap,
                name,
                params,
                ret,
            } => {
                let mut args = Vec::with_capacity(params.len());
                for _ in 0..params.len() {
                    args.push(self.stack.pop()?);
                }
                args.reverse();
                let expr = Expr::InvokeDynamic {
                    bootstrap,
                    name,
                    args,
                    ret,
                };
                if ret == ValueType::Void {
                    self.emit(b, Stmt::Pop { value: expr });
                } else {
                    self.push_spilled(b, expr)?;
                }
            }
            Insn::Monitor { mode } => {
                let object = self.stack.pop()?;
                self.emit(b, Stmt::Monitor { object, mode });
            }
            Insn::Label(_)
            | Insn::Goto { .. }
            | Insn::Branch { .. }
            | Insn::Switch { .. }
            | Insn::Return { .. }
            | Insn::Throw
            | Insn::Jsr { .. }
            | Insn::Ret { .. } => {
                return Err(internal_error!(
                    "{} reached the straight-line interpreter",
                    insn.mnemonic()
                ));
            }
        }
        Ok(())
    }

    // The dup/swap family is lowered after a stack save, so every operand is
    // a load of the stack local at its slot. Each form then reduces to copies
    // between stack locals: values moving down overwrite the slot directly,
    // values moving up go through a temporary above the pre-op height so no
    // live slot is clobbered.

    fn lower_dup(&mut self, b: NodeId) -> Result<()> {
        self.verifier.assert_heights(&self.stack, &DUP_HEIGHTS)?;
        self.save_stack(b)?;
        let h = self.stack.height();
        let mut slots = Slots::new();

        let var0 = self.stack.pop()?;
        slots.note(&var0)?;

        self.spill(b, h, var0, &mut slots)?;
        self.stack.push(slots.load(h - 1)?);
        self.stack.push(slots.load(h)?);
        Ok(())
    }

    fn lower_dup_x1(&mut self, b: NodeId) -> Result<()> {
        self.verifier.assert_heights(&self.stack, &DUP_X1_HEIGHTS)?;
        self.save_stack(b)?;
        let h = self.stack.height();
        let mut slots = Slots::new();

        let var1 = self.stack.pop()?;
        let var0 = self.stack.pop()?;
        slots.note(&var1)?;
        slots.note(&var0)?;

        self.spill(b, h + 1, var0, &mut slots)?;
        self.spill(b, h - 2, var1.clone(), &mut slots)?;
        self.spill(b, h, var1, &mut slots)?;
        let tmp = slots.load(h + 1)?;
        self.spill(b, h - 1, tmp, &mut slots)?;

        self.stack.push(slots.load(h - 2)?);
        self.stack.push(slots.load(h - 1)?);
        self.stack.push(slots.load(h)?);
        Ok(())
    }

    fn lower_dup_x2(&mut self, b: NodeId) -> Result<()> {
        if self.stack.peek(1)?.ty().is_wide() {
            self.verifier
                .assert_heights(&self.stack, &DUP_X2_64_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var2 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var2)?;
            slots.note(&var0)?;

            self.spill(b, h + 1, var0, &mut slots)?;
            self.spill(b, h - 3, var2.clone(), &mut slots)?;
            self.spill(b, h, var2, &mut slots)?;
            let tmp = slots.load(h + 1)?;
            self.spill(b, h - 2, tmp, &mut slots)?;

            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h)?);
        } else {
            self.verifier
                .assert_heights(&self.stack, &DUP_X2_32_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var2 = self.stack.pop()?;
            let var1 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var2)?;
            slots.note(&var1)?;
            slots.note(&var0)?;

            self.spill(b, h + 1, var0, &mut slots)?;
            self.spill(b, h + 2, var1, &mut slots)?;
            self.spill(b, h - 3, var2.clone(), &mut slots)?;
            self.spill(b, h, var2, &mut slots)?;
            let tmp1 = slots.load(h + 1)?;
            self.spill(b, h - 2, tmp1, &mut slots)?;
            let tmp2 = slots.load(h + 2)?;
            self.spill(b, h - 1, tmp2, &mut slots)?;

            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h - 1)?);
            self.stack.push(slots.load(h)?);
        }
        Ok(())
    }

    fn lower_dup2(&mut self, b: NodeId) -> Result<()> {
        if self.stack.peek(0)?.ty().is_wide() {
            self.verifier
                .assert_heights(&self.stack, &DUP2_64_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var0 = self.stack.pop()?;
            slots.note(&var0)?;

            self.spill(b, h, var0, &mut slots)?;
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h)?);
        } else {
            self.verifier
                .assert_heights(&self.stack, &DUP2_32_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var1 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var1)?;
            slots.note(&var0)?;

            self.spill(b, h, var0, &mut slots)?;
            self.spill(b, h + 1, var1, &mut slots)?;

            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h - 1)?);
            self.stack.push(slots.load(h)?);
            self.stack.push(slots.load(h + 1)?);
        }
        Ok(())
    }

    fn lower_dup2_x1(&mut self, b: NodeId) -> Result<()> {
        if self.stack.peek(0)?.ty().is_wide() {
            self.verifier
                .assert_heights(&self.stack, &DUP2_X1_64_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var2 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var2)?;
            slots.note(&var0)?;

            self.spill(b, h + 1, var0, &mut slots)?;
            self.spill(b, h, var2.clone(), &mut slots)?;
            self.spill(b, h - 3, var2, &mut slots)?;
            let tmp = slots.load(h + 1)?;
            self.spill(b, h - 1, tmp, &mut slots)?;

            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 1)?);
            self.stack.push(slots.load(h)?);
        } else {
            self.verifier
                .assert_heights(&self.stack, &DUP2_X1_32_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var2 = self.stack.pop()?;
            let var1 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var2)?;
            slots.note(&var1)?;
            slots.note(&var0)?;

            // The value moving into slot h-2 is read by the copy into slot h,
            // so the up-copies run before the down-copy overwrites it.
            self.spill(b, h + 2, var0, &mut slots)?;
            self.spill(b, h - 3, var1.clone(), &mut slots)?;
            self.spill(b, h, var1, &mut slots)?;
            self.spill(b, h - 2, var2.clone(), &mut slots)?;
            self.spill(b, h + 1, var2, &mut slots)?;
            let tmp = slots.load(h + 2)?;
            self.spill(b, h - 1, tmp, &mut slots)?;

            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h - 1)?);
            self.stack.push(slots.load(h)?);
            self.stack.push(slots.load(h + 1)?);
        }
        Ok(())
    }

    fn lower_dup2_x2(&mut self, b: NodeId) -> Result<()> {
        let top_wide = self.stack.peek(0)?.ty().is_wide();
        if top_wide {
            if self.stack.peek(1)?.ty().is_wide() {
                self.verifier
                    .assert_heights(&self.stack, &DUP2_X2_64X64_HEIGHTS)?;
                self.save_stack(b)?;
                let h = self.stack.height();
                let mut slots = Slots::new();

                let var2 = self.stack.pop()?;
                let var0 = self.stack.pop()?;
                slots.note(&var2)?;
                slots.note(&var0)?;

                self.spill(b, h + 2, var0, &mut slots)?;
                self.spill(b, h - 4, var2.clone(), &mut slots)?;
                self.spill(b, h, var2, &mut slots)?;
                let tmp = slots.load(h + 2)?;
                self.spill(b, h - 2, tmp, &mut slots)?;

                self.stack.push(slots.load(h - 4)?);
                self.stack.push(slots.load(h - 2)?);
                self.stack.push(slots.load(h)?);
            } else {
                self.verifier
                    .assert_heights(&self.stack, &DUP2_X2_64X32_HEIGHTS)?;
                self.save_stack(b)?;
                let h = self.stack.height();
                let mut slots = Slots::new();

                let var2 = self.stack.pop()?;
                let var1 = self.stack.pop()?;
                let var0 = self.stack.pop()?;
                slots.note(&var2)?;
                slots.note(&var1)?;
                slots.note(&var0)?;

                self.spill(b, h + 2, var0, &mut slots)?;
                self.spill(b, h - 4, var2.clone(), &mut slots)?;
                self.spill(b, h - 1, var1, &mut slots)?;
                self.spill(b, h, var2, &mut slots)?;
                let tmp = slots.load(h + 2)?;
                self.spill(b, h - 2, tmp, &mut slots)?;

                self.stack.push(slots.load(h - 4)?);
                self.stack.push(slots.load(h - 2)?);
                self.stack.push(slots.load(h - 1)?);
                self.stack.push(slots.load(h)?);
            }
        } else if self.stack.peek(2)?.ty().is_wide() {
            self.verifier
                .assert_heights(&self.stack, &DUP2_X2_32X64_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var3 = self.stack.pop()?;
            let var2 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var3)?;
            slots.note(&var2)?;
            slots.note(&var0)?;

            self.spill(b, h + 2, var0, &mut slots)?;
            self.spill(b, h - 4, var2.clone(), &mut slots)?;
            self.spill(b, h - 3, var3.clone(), &mut slots)?;
            self.spill(b, h, var2, &mut slots)?;
            self.spill(b, h + 1, var3, &mut slots)?;
            let tmp = slots.load(h + 2)?;
            self.spill(b, h - 2, tmp, &mut slots)?;

            self.stack.push(slots.load(h - 4)?);
            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h)?);
            self.stack.push(slots.load(h + 1)?);
        } else {
            self.verifier
                .assert_heights(&self.stack, &DUP2_X2_32X32_HEIGHTS)?;
            self.save_stack(b)?;
            let h = self.stack.height();
            let mut slots = Slots::new();

            let var3 = self.stack.pop()?;
            let var2 = self.stack.pop()?;
            let var1 = self.stack.pop()?;
            let var0 = self.stack.pop()?;
            slots.note(&var3)?;
            slots.note(&var2)?;
            slots.note(&var1)?;
            slots.note(&var0)?;

            self.spill(b, h + 2, var0, &mut slots)?;
            self.spill(b, h + 3, var1, &mut slots)?;
            self.spill(b, h - 4, var2.clone(), &mut slots)?;
            self.spill(b, h - 3, var3.clone(), &mut slots)?;
            self.spill(b, h, var2, &mut slots)?;
            self.spill(b, h + 1, var3, &mut slots)?;
            let tmp2 = slots.load(h + 2)?;
            self.spill(b, h - 2, tmp2, &mut slots)?;
            let tmp3 = slots.load(h + 3)?;
            self.spill(b, h - 1, tmp3, &mut slots)?;

            self.stack.push(slots.load(h - 4)?);
            self.stack.push(slots.load(h - 3)?);
            self.stack.push(slots.load(h - 2)?);
            self.stack.push(slots.load(h - 1)?);
            self.stack.push(slots.load(h)?);
            self.stack.push(slots.load(h + 1)?);
        }
        Ok(())
    }

    fn lower_swap(&mut self, b: NodeId) -> Result<()> {
        self.verifier.assert_heights(&self.stack, &SWAP_HEIGHTS)?;
        self.save_stack(b)?;
        let h = self.stack.height();
        let mut slots = Slots::new();

        let var1 = self.stack.pop()?;
        let var0 = self.stack.pop()?;
        slots.note(&var1)?;
        slots.note(&var0)?;

        self.spill(b, h, var0, &mut slots)?;
        self.spill(b, h + 1, var1, &mut slots)?;
        let tmp1 = slots.load(h + 1)?;
        self.spill(b, h - 2, tmp1, &mut slots)?;
        let tmp0 = slots.load(h)?;
        self.spill(b, h - 1, tmp0, &mut slots)?;

        self.stack.push(slots.load(h - 2)?);
        self.stack.push(slots.load(h - 1)?);
        Ok(())
    }

    /// Builds the exception-range table and handler edges.
    ///
    /// Blocks are put into instruction order and relabeled; each table entry
    /// then protects the blocks between its start and end marks. Entries with
    /// the same span and handler are folded together with their caught types
    /// unioned.
    fn make_ranges(&mut self) -> Result<()> {
        let routine = self.routine;

        // Span marks need blocks even when unreachable.
        for entry in &routine.exception_table {
            self.make_block(entry.start);
            self.make_block(entry.end);
        }

        // Canonical order: by label position in the instruction stream.
        let mut order: Vec<(usize, NodeId)> = self
            .blocks
            .iter()
            .map(|(label, &block)| (self.label_index.get(label).copied().unwrap_or(usize::MAX), block))
            .collect();
        order.sort_unstable();
        let order: Vec<NodeId> = order.into_iter().map(|(_, block)| block).collect();
        self.cfg.relabel(&order);

        let position: HashMap<NodeId, usize> = order
            .iter()
            .enumerate()
            .map(|(position, &block)| (block, position))
            .collect();

        // Fold entries by protected span and handler.
        let mut ranges: Vec<ExceptionRange> = Vec::new();
        let mut keys: HashMap<(usize, usize, NodeId), usize> = HashMap::new();

        for entry in &routine.exception_table {
            let start = self.blocks[&entry.start];
            let end = self.blocks[&entry.end];
            let handler = self.blocks[&entry.handler];
            let (start_pos, end_pos) = (position[&start], position[&end]);

            if start_pos >= end_pos {
                return Err(malformed_error!(
                    "exception range {}..{} is empty or inverted",
                    entry.start,
                    entry.end
                ));
            }

            let key = (start_pos, end_pos, handler);
            let index = *keys.entry(key).or_insert_with(|| {
                let mut range = ExceptionRange::new(handler);
                for &block in &order[start_pos..end_pos] {
                    range.add_block(block);
                }
                ranges.push(range);
                ranges.len() - 1
            });
            ranges[index].add_type(entry.catch_type.clone());
        }

        for (index, range) in ranges.iter().enumerate() {
            let mut last: Option<usize> = None;
            for &block in range.blocks() {
                if let Some(previous) = last {
                    if position[&block] != previous + 1 {
                        warn!(
                            routine = %self.routine.name,
                            range = index,
                            "exception range protects non-contiguous blocks"
                        );
                    }
                }
                last = Some(position[&block]);
                self.cfg.add_edge(block, range.handler(), FlowEdge::Exception(index));
            }
        }

        *self.cfg.ranges_mut() = ranges;
        Ok(())
    }
}

/// Checks whether `current` can merge into a block whose input stack is
/// `expected`: same slot height, and every entry a load of the same stack
/// local with the same width.
fn can_succeed(expected: &ExpressionStack, current: &ExpressionStack) -> bool {
    if expected.height() != current.height() || expected.len() != current.len() {
        return false;
    }
    expected
        .entries()
        .iter()
        .zip(current.entries().iter())
        .all(|(e, c)| match (e, c) {
            (Expr::Load(ev), Expr::Load(cv)) => {
                ev.local.is_stack()
                    && cv.local.is_stack()
                    && ev.local.index == cv.local.index
                    && ev.ty.width() == cv.ty.width()
            }
            _ => false,
        })
}
