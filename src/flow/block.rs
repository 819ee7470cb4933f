//! Basic blocks.

use bitflags::bitflags;

use crate::ir::Stmt;

bitflags! {
    /// Per-block flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockFlags: u8 {
        /// The naturalizer must not merge this block into a predecessor.
        ///
        /// Set on the entry block so the parameter self-defines keep their
        /// own block.
        const NO_MERGE = 0b0000_0001;
    }
}

/// A basic block: a label, a statement sequence, and flags.
///
/// The label is the block's position in the canonical ordering and is
/// reassigned whenever the graph is relabeled; the stable identity of a block
/// is its [`NodeId`](crate::utils::graph::NodeId).
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    /// Position in the canonical block ordering
    pub label: u32,
    /// The statement sequence
    stmts: Vec<Stmt>,
    /// Block flags
    pub flags: BlockFlags,
}

impl BasicBlock {
    /// Creates an empty block with the given label.
    #[must_use]
    pub fn new(label: u32) -> Self {
        BasicBlock {
            label,
            stmts: Vec::new(),
            flags: BlockFlags::empty(),
        }
    }

    /// Returns the statements.
    #[must_use]
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    /// Returns the statements mutably.
    pub fn stmts_mut(&mut self) -> &mut Vec<Stmt> {
        &mut self.stmts
    }

    /// Appends a statement.
    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    /// Returns `true` if the block has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Returns the number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Returns the index of the first non-phi statement.
    ///
    /// Phis are always a prefix of the block; this is where they end.
    #[must_use]
    pub fn first_non_phi(&self) -> usize {
        self.stmts
            .iter()
            .position(|s| !s.is_phi())
            .unwrap_or(self.stmts.len())
    }

    /// Inserts a statement at the end of the block, in front of a trailing
    /// flow-changing statement if one exists.
    pub fn insert_end(&mut self, stmt: Stmt) {
        match self.stmts.last() {
            Some(last) if last.changes_flow() => {
                let at = self.stmts.len() - 1;
                self.stmts.insert(at, stmt);
            }
            _ => self.stmts.push(stmt),
        }
    }

    /// Appends all statements of `other`, leaving it empty.
    pub fn transfer_from(&mut self, other: &mut BasicBlock) {
        self.stmts.append(&mut other.stmts);
    }
}
