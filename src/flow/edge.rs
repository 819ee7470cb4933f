//! Flow edge kinds.

use std::fmt;

use crate::ir::BranchKind;

/// The kind of a control-flow edge.
///
/// Edge kinds record *why* control can transfer, which the naturalizer and
/// the SSA passes depend on: immediate edges are merge candidates, exception
/// edges are excluded from successor counts during merging, and dummy edges
/// exist only to give exit blocks a path to the synthetic exit node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEdge {
    /// Fallthrough to the next block in order
    Immediate,
    /// Unconditional jump
    Jump,
    /// Conditional branch taken when the comparison holds
    ConditionalJump(BranchKind),
    /// Switch case for a specific key
    Switch(i32),
    /// Switch default
    DefaultSwitch,
    /// Transfer to an exception handler; the payload indexes the protecting
    /// range in the graph's range table
    Exception(usize),
    /// Synthetic edge to a temporary exit node
    Dummy,
}

impl FlowEdge {
    /// Returns `true` for fallthrough edges.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, FlowEdge::Immediate)
    }

    /// Returns `true` for exception-handler edges.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self, FlowEdge::Exception(_))
    }

    /// Returns `true` for synthetic exit edges.
    #[must_use]
    pub const fn is_dummy(&self) -> bool {
        matches!(self, FlowEdge::Dummy)
    }
}

impl fmt::Display for FlowEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowEdge::Immediate => write!(f, "immediate"),
            FlowEdge::Jump => write!(f, "jump"),
            FlowEdge::ConditionalJump(kind) => write!(f, "if-{kind}"),
            FlowEdge::Switch(key) => write!(f, "case {key}"),
            FlowEdge::DefaultSwitch => write!(f, "default"),
            FlowEdge::Exception(range) => write!(f, "catch #{range}"),
            FlowEdge::Dummy => write!(f, "dummy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(FlowEdge::Immediate.is_immediate());
        assert!(FlowEdge::Exception(0).is_exception());
        assert!(FlowEdge::Dummy.is_dummy());
        assert!(!FlowEdge::Jump.is_immediate());
        assert!(!FlowEdge::Jump.is_exception());
    }

    #[test]
    fn test_display() {
        assert_eq!(FlowEdge::ConditionalJump(BranchKind::Eq).to_string(), "if-eq");
        assert_eq!(FlowEdge::Switch(3).to_string(), "case 3");
        assert_eq!(FlowEdge::Exception(1).to_string(), "catch #1");
    }
}
