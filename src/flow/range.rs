//! Exception-handler ranges.

use std::collections::BTreeSet;

use crate::utils::graph::NodeId;

/// A protected region: the blocks it covers, the handler they transfer to,
/// and the exception types the handler catches.
///
/// Ranges are rebuilt from the block ordering after every structural change,
/// so the block list always reflects the current graph. Two table entries
/// with the same span and handler are folded into one range with the union of
/// their caught types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRange {
    /// The protected blocks, in canonical order
    blocks: Vec<NodeId>,
    /// The handler block
    handler: NodeId,
    /// The caught exception classes; `None` entries are catch-alls
    types: BTreeSet<Option<String>>,
}

impl ExceptionRange {
    /// Creates a range with no protected blocks yet.
    #[must_use]
    pub fn new(handler: NodeId) -> Self {
        ExceptionRange {
            blocks: Vec::new(),
            handler,
            types: BTreeSet::new(),
        }
    }

    /// Returns the handler block.
    #[must_use]
    pub const fn handler(&self) -> NodeId {
        self.handler
    }

    /// Returns the protected blocks in canonical order.
    #[must_use]
    pub fn blocks(&self) -> &[NodeId] {
        &self.blocks
    }

    /// Returns `true` if `block` is protected by this range.
    #[must_use]
    pub fn contains(&self, block: NodeId) -> bool {
        self.blocks.contains(&block)
    }

    /// Adds a protected block.
    pub fn add_block(&mut self, block: NodeId) {
        if !self.blocks.contains(&block) {
            self.blocks.push(block);
        }
    }

    /// Removes a block from the protected set.
    pub fn remove_block(&mut self, block: NodeId) {
        self.blocks.retain(|b| *b != block);
    }

    /// Adds a caught type (`None` for a catch-all).
    pub fn add_type(&mut self, ty: Option<String>) {
        self.types.insert(ty);
    }

    /// Returns the caught types.
    #[must_use]
    pub fn types(&self) -> &BTreeSet<Option<String>> {
        &self.types
    }

    /// Returns `true` if this range catches every exception type.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.types.contains(&None)
    }
}
