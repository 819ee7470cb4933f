//! The register-based intermediate representation.
//!
//! Lifting turns stack-machine instructions into statements over named
//! variables. The vocabulary:
//!
//! - [`ValueType`] / [`ConstValue`] - computational types and constants
//! - [`Local`] / [`VersionedLocal`] - variable identities, with and without
//!   SSA versions
//! - [`Expr`] - pure expression trees ([`VarExpr`] is the variable-read leaf)
//! - [`Stmt`] - effects and control transfers
//! - [`ExpressionStack`] - the symbolic operand stack used during lifting

mod expr;
mod local;
mod stack;
mod stmt;
mod types;

pub use expr::{BinaryOp, CompareKind, Expr, InvokeKind, VarExpr, Walk};
pub use local::{Local, LocalKind, VersionedLocal};
pub use stack::ExpressionStack;
pub use stmt::{BranchKind, MonitorMode, Stmt};
pub use types::{ConstValue, ValueType};
