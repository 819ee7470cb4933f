//! Pluggable stack-shape verification.
//!
//! The lifter asserts the operand-stack shape before every dup/swap lowering.
//! Callers that lift already-verified input can inject [`NoVerifier`] to skip
//! the checks; [`StrictVerifier`] is the default.

use std::fmt::Debug;

use crate::ir::ExpressionStack;
use crate::Result;

/// Hook consulted by the lifter before stack-manipulation lowering.
pub trait LiftVerifier: Debug + Send + Sync {
    /// Checks that the topmost stack entries have the given slot widths,
    /// listed top-down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) when the shape
    /// does not match and the implementation enforces shapes.
    fn assert_heights(&self, stack: &ExpressionStack, expected: &[u32]) -> Result<()>;
}

/// Enforces stack shapes; the default verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictVerifier;

impl LiftVerifier for StrictVerifier {
    fn assert_heights(&self, stack: &ExpressionStack, expected: &[u32]) -> Result<()> {
        stack.assert_heights(expected)
    }
}

/// Trusts the input and skips all shape checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVerifier;

impl LiftVerifier for NoVerifier {
    fn assert_heights(&self, _stack: &ExpressionStack, _expected: &[u32]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, Expr};

    #[test]
    fn test_strict_rejects_bad_shape() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Long(1)));

        assert!(StrictVerifier.assert_heights(&stack, &[2]).is_ok());
        assert!(StrictVerifier.assert_heights(&stack, &[1]).is_err());
    }

    #[test]
    fn test_no_verifier_accepts_everything() {
        let stack = ExpressionStack::new();
        assert!(NoVerifier.assert_heights(&stack, &[1, 1, 1]).is_ok());
    }
}
