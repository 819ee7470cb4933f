//! The symbolic operand stack.
//!
//! While lifting, the operand stack holds expression trees instead of runtime
//! values. Heights are measured in slots: a wide entry contributes 2, so the
//! slot height and the entry count diverge whenever `long` or `double` values
//! are on the stack. Spilling and the dup/swap lowering both work in slot
//! coordinates.

use crate::ir::Expr;
use crate::Result;

/// A stack of symbolic expressions, top entry last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionStack {
    entries: Vec<Expr>,
}

impl ExpressionStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        ExpressionStack {
            entries: Vec::new(),
        }
    }

    /// Returns the number of entries (not slots).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the stack holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the height in slots: wide entries count twice.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.entries.iter().map(|e| e.ty().width()).sum()
    }

    /// Pushes an expression.
    pub fn push(&mut self, expr: Expr) {
        self.entries.push(expr);
    }

    /// Pops the top expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) on underflow.
    pub fn pop(&mut self) -> Result<Expr> {
        self.entries
            .pop()
            .ok_or_else(|| malformed_error!("operand stack underflow"))
    }

    /// Returns the entry `depth` positions below the top (0 = top).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if fewer than
    /// `depth + 1` entries exist.
    pub fn peek(&self, depth: usize) -> Result<&Expr> {
        let len = self.entries.len();
        if depth >= len {
            return Err(malformed_error!(
                "operand stack peek at depth {} with {} entries",
                depth,
                len
            ));
        }
        Ok(&self.entries[len - 1 - depth])
    }

    /// Checks that the topmost entries have the given slot widths, listed
    /// top-down.
    ///
    /// The dup/swap lowering uses this to validate its operands before
    /// rewriting stack positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if an entry is
    /// missing or has the wrong width.
    pub fn assert_heights(&self, expected: &[u32]) -> Result<()> {
        for (depth, &width) in expected.iter().enumerate() {
            let entry = self.peek(depth)?;
            let actual = entry.ty().width();
            if actual != width {
                return Err(malformed_error!(
                    "expected width {} at stack depth {}, found {} ({})",
                    width,
                    depth,
                    actual,
                    entry
                ));
            }
        }
        Ok(())
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the entries bottom-to-top.
    #[must_use]
    pub fn entries(&self) -> &[Expr] {
        &self.entries
    }

    /// Removes and returns the entries bottom-to-top, leaving the stack
    /// empty.
    pub fn take_entries(&mut self) -> Vec<Expr> {
        std::mem::take(&mut self.entries)
    }
}

impl std::fmt::Display for ExpressionStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.entries.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{entry}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, Expr};

    #[test]
    fn test_push_pop() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Int(1)));
        stack.push(Expr::Const(ConstValue::Int(2)));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().unwrap(), Expr::Const(ConstValue::Int(2)));
        assert_eq!(stack.pop().unwrap(), Expr::Const(ConstValue::Int(1)));
        assert!(stack.pop().is_err());
    }

    #[test]
    fn test_height_counts_slots() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Int(1)));
        assert_eq!(stack.height(), 1);

        stack.push(Expr::Const(ConstValue::Long(2)));
        assert_eq!(stack.height(), 3);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_peek() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Int(1)));
        stack.push(Expr::Const(ConstValue::Int(2)));

        assert_eq!(stack.peek(0).unwrap(), &Expr::Const(ConstValue::Int(2)));
        assert_eq!(stack.peek(1).unwrap(), &Expr::Const(ConstValue::Int(1)));
        assert!(stack.peek(2).is_err());
    }

    #[test]
    fn test_assert_heights() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Long(1)));
        stack.push(Expr::Const(ConstValue::Int(2)));

        assert!(stack.assert_heights(&[1, 2]).is_ok());
        assert!(stack.assert_heights(&[1]).is_ok());
        assert!(stack.assert_heights(&[2, 1]).is_err());
        assert!(stack.assert_heights(&[1, 2, 1]).is_err());
    }

    #[test]
    fn test_display_top_first() {
        let mut stack = ExpressionStack::new();
        stack.push(Expr::Const(ConstValue::Int(1)));
        stack.push(Expr::Const(ConstValue::Int(2)));
        assert_eq!(stack.to_string(), "[2, 1]");
    }
}
