//! The lifting layer: from stack-machine instructions to a register CFG.
//!
//! [`lift`] abstractly interprets a [`Routine`] into a [`FlowGraph`](crate::flow::FlowGraph),
//! and [`naturalize`] cleans up the block structure the interpretation leaves
//! behind. Both run before SSA construction.

mod insn;
mod lifter;
mod naturalize;
mod verifier;

pub use insn::{BranchOperands, ExceptionTableEntry, Insn, LabelId, Routine, RoutineBuilder};
pub use lifter::lift;
pub use naturalize::naturalize;
pub use verifier::{LiftVerifier, NoVerifier, StrictVerifier};
