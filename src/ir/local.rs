//! Variable identities.
//!
//! Two kinds of variables flow through the representation: **slot locals**
//! mirroring the source frame's variable slots, and **stack locals**
//! materialized by the lifter when it spills symbolic operand-stack entries at
//! block boundaries. Both are identified by a small index; the pair of kind
//! and index is a [`Local`].
//!
//! After SSA construction each definition gets a version number, forming a
//! [`VersionedLocal`]. Versions are erased again when SSA is destructed.

use std::fmt;

/// Which namespace a variable index lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalKind {
    /// A frame variable slot (`lvar`)
    Slot,
    /// A spilled operand-stack position (`svar`)
    Stack,
}

/// A variable: a slot or stack index within its namespace.
///
/// Stack locals are indexed by the operand-stack height at which they were
/// spilled, so the same `svar` index always refers to the same stack position
/// across blocks. Wide values occupy two consecutive indices but are named by
/// their base index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Local {
    /// Which namespace the index refers to
    pub kind: LocalKind,
    /// The slot or stack index
    pub index: u16,
}

impl Local {
    /// Creates a frame-slot local.
    #[must_use]
    pub const fn slot(index: u16) -> Self {
        Local {
            kind: LocalKind::Slot,
            index,
        }
    }

    /// Creates a stack local for the given stack position.
    #[must_use]
    pub const fn stack(index: u16) -> Self {
        Local {
            kind: LocalKind::Stack,
            index,
        }
    }

    /// Returns `true` if this is a stack local.
    #[must_use]
    pub const fn is_stack(self) -> bool {
        matches!(self.kind, LocalKind::Stack)
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LocalKind::Slot => write!(f, "lvar{}", self.index),
            LocalKind::Stack => write!(f, "svar{}", self.index),
        }
    }
}

/// A variable together with its SSA version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionedLocal {
    /// The underlying variable
    pub local: Local,
    /// The SSA version number
    pub version: u32,
}

impl VersionedLocal {
    /// Creates a versioned local.
    #[must_use]
    pub const fn new(local: Local, version: u32) -> Self {
        VersionedLocal { local, version }
    }
}

impl fmt::Display for VersionedLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.local, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_display() {
        assert_eq!(Local::slot(0).to_string(), "lvar0");
        assert_eq!(Local::stack(3).to_string(), "svar3");
    }

    #[test]
    fn test_local_kinds() {
        assert!(Local::stack(1).is_stack());
        assert!(!Local::slot(1).is_stack());
        assert_ne!(Local::slot(2), Local::stack(2));
    }

    #[test]
    fn test_local_ordering() {
        let mut locals = vec![Local::stack(0), Local::slot(1), Local::slot(0)];
        locals.sort();
        assert_eq!(locals, vec![Local::slot(0), Local::slot(1), Local::stack(0)]);
    }

    #[test]
    fn test_versioned_display() {
        let v = VersionedLocal::new(Local::slot(2), 4);
        assert_eq!(v.to_string(), "lvar2_4");
    }
}
