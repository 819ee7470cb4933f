//! SSA construction, propagation, and destruction.
//!
//! [`construct`] places pruned phis on iterated dominance frontiers and
//! renames every definition to a fresh version. [`propagate`] then folds
//! single-definition values into their uses where the paths allow it, and
//! [`destruct`] lowers the phis back to copies, coalescing versions through
//! the [`InterferenceResolver`] and erasing the version subscripts.

mod construct;
mod destruct;
mod liveness;
mod propagate;

pub use construct::construct;
pub use destruct::{destruct, InterferenceResolver};
pub use liveness::Liveness;
pub use propagate::propagate;
