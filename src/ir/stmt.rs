//! Statements.
//!
//! A basic block's body is a sequence of statements. Everything with an
//! observable effect or a control transfer lives here; pure computation lives
//! in [`Expr`](crate::ir::Expr) trees hanging off statement operands.
//!
//! Flow-changing statements (jumps, branches, switches, returns, throws) only
//! ever appear as the last statement of a block; the parallel-copy insertion
//! in SSA destruction relies on this to splice copies in front of them.

use std::collections::BTreeMap;
use std::fmt;

use strum::Display;

use crate::ir::{Expr, ValueType, VarExpr};
use crate::utils::graph::NodeId;

/// Comparison performed by a conditional branch.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum BranchKind {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Greater than or equal
    Ge,
    /// Greater than
    Gt,
    /// Less than or equal
    Le,
}

/// Whether a monitor statement acquires or releases the lock.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum MonitorMode {
    /// Acquire the object's monitor
    Enter,
    /// Release the object's monitor
    Exit,
}

/// A statement in a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// An assignment to a variable.
    ///
    /// Synthetic copies are emitted by the lifter (parameter self-defines,
    /// exception-handler seeds) and are exempt from dead-code elimination of
    /// their destinations' zero versions.
    Copy {
        /// The assigned variable
        dest: VarExpr,
        /// The assigned value
        src: Expr,
        /// Whether the lifter fabricated this copy
        synthetic: bool,
    },
    /// An SSA phi: the destination takes the argument matching the
    /// predecessor control came from.
    Phi {
        /// The assigned variable
        dest: VarExpr,
        /// The merged type, `None` until the first argument is resolved
        ty: Option<ValueType>,
        /// One argument per predecessor block
        args: BTreeMap<NodeId, VarExpr>,
    },
    /// Simultaneous assignment of several variable-to-variable copies.
    ///
    /// All sources are read before any destination is written.
    ParallelCopy {
        /// `(dest, src)` pairs
        pairs: Vec<(VarExpr, VarExpr)>,
    },
    /// Field write, static when `instance` is `None`
    FieldStore {
        /// Receiver, absent for static fields
        instance: Option<Expr>,
        /// Declaring class name
        owner: String,
        /// Field name
        name: String,
        /// The stored value
        value: Expr,
        /// Field type
        ty: ValueType,
    },
    /// Array element write
    ArrayStore {
        /// The array reference
        array: Expr,
        /// The element index
        index: Expr,
        /// The stored value
        value: Expr,
        /// Element type
        ty: ValueType,
    },
    /// Evaluate an expression for its effect and discard the result
    Pop {
        /// The discarded expression
        value: Expr,
    },
    /// Monitor acquire or release
    Monitor {
        /// The locked object
        object: Expr,
        /// Acquire or release
        mode: MonitorMode,
    },
    /// Unconditional jump
    Jump {
        /// The jump target block
        target: NodeId,
    },
    /// Conditional branch; falls through to the block's immediate successor
    /// when the condition is false
    Branch {
        /// Left operand
        left: Expr,
        /// Right operand
        right: Expr,
        /// The comparison
        kind: BranchKind,
        /// Target when the comparison holds
        target: NodeId,
    },
    /// Multi-way dispatch on an integer key
    Switch {
        /// The scrutinee
        value: Expr,
        /// `(key, target)` pairs
        cases: Vec<(i32, NodeId)>,
        /// Target when no key matches
        default: NodeId,
    },
    /// Return from the routine
    Return {
        /// The returned value, absent for void routines
        value: Option<Expr>,
    },
    /// Throw an exception
    Throw {
        /// The thrown reference
        value: Expr,
    },
}

impl Stmt {
    /// Returns `true` if this statement is a phi.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Stmt::Phi { .. })
    }

    /// Returns `true` if this statement transfers control.
    ///
    /// Flow-changing statements appear only at the end of a block.
    #[must_use]
    pub const fn changes_flow(&self) -> bool {
        matches!(
            self,
            Stmt::Jump { .. }
                | Stmt::Branch { .. }
                | Stmt::Switch { .. }
                | Stmt::Return { .. }
                | Stmt::Throw { .. }
        )
    }

    /// Returns `true` if this statement ends the routine on its path.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Stmt::Return { .. } | Stmt::Throw { .. })
    }

    /// Returns the variables this statement defines.
    #[must_use]
    pub fn defined_vars(&self) -> Vec<VarExpr> {
        match self {
            Stmt::Copy { dest, .. } | Stmt::Phi { dest, .. } => vec![*dest],
            Stmt::ParallelCopy { pairs } => pairs.iter().map(|(dest, _)| *dest).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the top-level expression operands of this statement.
    ///
    /// Phi arguments and parallel-copy sources are variable occurrences, not
    /// expression trees, and are not included; passes that need them match on
    /// the variant directly.
    #[must_use]
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Copy { src, .. } => vec![src],
            Stmt::Phi { .. } | Stmt::ParallelCopy { .. } | Stmt::Jump { .. } => Vec::new(),
            Stmt::FieldStore {
                instance, value, ..
            } => {
                let mut out = Vec::new();
                if let Some(instance) = instance {
                    out.push(instance);
                }
                out.push(value);
                out
            }
            Stmt::ArrayStore {
                array,
                index,
                value,
                ..
            } => vec![array, index, value],
            Stmt::Pop { value }
            | Stmt::Monitor { object: value, .. }
            | Stmt::Switch { value, .. }
            | Stmt::Throw { value } => {
                vec![value]
            }
            Stmt::Branch { left, right, .. } => vec![left, right],
            Stmt::Return { value } => value.iter().collect(),
        }
    }

    /// Mutable variant of [`exprs`](Self::exprs).
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::Copy { src, .. } => vec![src],
            Stmt::Phi { .. } | Stmt::ParallelCopy { .. } | Stmt::Jump { .. } => Vec::new(),
            Stmt::FieldStore {
                instance, value, ..
            } => {
                let mut out = Vec::new();
                if let Some(instance) = instance {
                    out.push(instance);
                }
                out.push(value);
                out
            }
            Stmt::ArrayStore {
                array,
                index,
                value,
                ..
            } => vec![array, index, value],
            Stmt::Pop { value }
            | Stmt::Monitor { object: value, .. }
            | Stmt::Switch { value, .. }
            | Stmt::Throw { value } => {
                vec![value]
            }
            Stmt::Branch { left, right, .. } => vec![left, right],
            Stmt::Return { value } => value.iter_mut().collect(),
        }
    }

    /// Calls `f` for every variable read in this statement's expression
    /// operands.
    ///
    /// Phi arguments are excluded for the same reason as in
    /// [`exprs`](Self::exprs); parallel-copy sources are included since they
    /// are ordinary reads.
    pub fn for_each_load<'a, F: FnMut(&'a VarExpr)>(&'a self, f: &mut F) {
        if let Stmt::ParallelCopy { pairs } = self {
            for (_, src) in pairs {
                f(src);
            }
            return;
        }
        for expr in self.exprs() {
            expr.for_each_load(f);
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Copy {
                dest,
                src,
                synthetic,
            } => {
                if *synthetic {
                    write!(f, "{dest} := {src} (synthetic)")
                } else {
                    write!(f, "{dest} := {src}")
                }
            }
            Stmt::Phi { dest, args, .. } => {
                write!(f, "{dest} := phi(")?;
                for (i, (pred, arg)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{pred}: {arg}")?;
                }
                write!(f, ")")
            }
            Stmt::ParallelCopy { pairs } => {
                write!(f, "[")?;
                for (i, (dest, src)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{dest} := {src}")?;
                }
                write!(f, "]")
            }
            Stmt::FieldStore {
                instance,
                owner,
                name,
                value,
                ..
            } => match instance {
                Some(instance) => write!(f, "{instance}.{name} = {value}"),
                None => write!(f, "{owner}.{name} = {value}"),
            },
            Stmt::ArrayStore {
                array,
                index,
                value,
                ..
            } => write!(f, "{array}[{index}] = {value}"),
            Stmt::Pop { value } => write!(f, "pop {value}"),
            Stmt::Monitor { object, mode } => write!(f, "monitor-{mode} {object}"),
            Stmt::Jump { target } => write!(f, "goto {target}"),
            Stmt::Branch {
                left,
                right,
                kind,
                target,
            } => write!(f, "if {left} {kind} {right} goto {target}"),
            Stmt::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch {value} {{")?;
                for (key, target) in cases {
                    write!(f, "{key} -> {target}, ")?;
                }
                write!(f, "_ -> {default}}}")
            }
            Stmt::Return { value } => match value {
                Some(value) => write!(f, "return {value}"),
                None => write!(f, "return"),
            },
            Stmt::Throw { value } => write!(f, "throw {value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, Local};

    fn ivar(index: u16) -> VarExpr {
        VarExpr::new(Local::slot(index), ValueType::Int)
    }

    #[test]
    fn test_changes_flow() {
        assert!(Stmt::Jump {
            target: NodeId::new(1)
        }
        .changes_flow());
        assert!(Stmt::Return { value: None }.changes_flow());
        assert!(!Stmt::Pop {
            value: Expr::Const(ConstValue::Int(1))
        }
        .changes_flow());
    }

    #[test]
    fn test_defined_vars() {
        let copy = Stmt::Copy {
            dest: ivar(0),
            src: Expr::Const(ConstValue::Int(1)),
            synthetic: false,
        };
        assert_eq!(copy.defined_vars(), vec![ivar(0)]);

        let pcopy = Stmt::ParallelCopy {
            pairs: vec![(ivar(1), ivar(0)), (ivar(2), ivar(1))],
        };
        assert_eq!(pcopy.defined_vars(), vec![ivar(1), ivar(2)]);

        assert!(Stmt::Return { value: None }.defined_vars().is_empty());
    }

    #[test]
    fn test_for_each_load() {
        let branch = Stmt::Branch {
            left: Expr::load(ivar(0)),
            right: Expr::load(ivar(1)),
            kind: BranchKind::Lt,
            target: NodeId::new(2),
        };
        let mut loads = Vec::new();
        branch.for_each_load(&mut |v| loads.push(v.local));
        assert_eq!(loads, vec![Local::slot(0), Local::slot(1)]);
    }

    #[test]
    fn test_parallel_copy_loads_are_sources() {
        let pcopy = Stmt::ParallelCopy {
            pairs: vec![(ivar(1), ivar(0))],
        };
        let mut loads = Vec::new();
        pcopy.for_each_load(&mut |v| loads.push(v.local));
        assert_eq!(loads, vec![Local::slot(0)]);
    }

    #[test]
    fn test_display() {
        let copy = Stmt::Copy {
            dest: ivar(0),
            src: Expr::Const(ConstValue::Int(5)),
            synthetic: false,
        };
        assert_eq!(copy.to_string(), "lvar0 := 5");

        let branch = Stmt::Branch {
            left: Expr::load(ivar(0)),
            right: Expr::Const(ConstValue::Int(0)),
            kind: BranchKind::Ne,
            target: NodeId::new(4),
        };
        assert_eq!(branch.to_string(), "if lvar0 ne 0 goto n4");
    }
}
