//! The stack-machine instruction model.
//!
//! This is the lifter's input: a flat instruction list with interleaved label
//! markers, plus an exception table whose entries reference labels. The shape
//! mirrors a verified class-file method body after parsing; how the bytes were
//! decoded is outside this crate's scope.

use std::collections::HashMap;
use std::fmt;

use crate::ir::{
    BinaryOp, BranchKind, CompareKind, ConstValue, InvokeKind, MonitorMode, ValueType,
};
use crate::Result;

/// A position marker in the instruction stream.
///
/// Labels are branch and exception-table targets. They carry no behavior of
/// their own; the lifter starts a new basic block at each one it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Operand shape of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOperands {
    /// Compare two integer stack operands
    IntInt,
    /// Compare one integer stack operand against zero
    IntZero,
    /// Compare two reference stack operands
    RefRef,
    /// Compare one reference stack operand against null
    RefNull,
}

/// A stack-machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Position marker; starts a new block when reached
    Label(LabelId),
    /// Push a constant
    Const(ConstValue),
    /// Push a frame variable
    Load {
        /// Frame slot index
        slot: u16,
        /// Value type
        ty: ValueType,
    },
    /// Pop into a frame variable
    Store {
        /// Frame slot index
        slot: u16,
        /// Value type
        ty: ValueType,
    },
    /// Pop index and array, push the element
    ArrayLoad {
        /// Element type
        ty: ValueType,
    },
    /// Pop value, index, and array, store the element
    ArrayStore {
        /// Element type
        ty: ValueType,
    },
    /// Discard the top slot (or two slots when `wide`)
    Pop {
        /// Discard two slots instead of one
        wide: bool,
    },
    /// Duplicate the top slot
    Dup,
    /// Duplicate the top slot below the next one
    DupX1,
    /// Duplicate the top slot below the next two slots
    DupX2,
    /// Duplicate the top two slots
    Dup2,
    /// Duplicate the top two slots below the next slot
    Dup2X1,
    /// Duplicate the top two slots below the next two slots
    Dup2X2,
    /// Exchange the top two slots
    Swap,
    /// Pop two operands, push the result
    Binary {
        /// The operator
        op: BinaryOp,
        /// Operand and result type
        ty: ValueType,
    },
    /// Pop one operand, push its negation
    Neg {
        /// Operand type
        ty: ValueType,
    },
    /// Add a constant to a frame variable in place
    Inc {
        /// Frame slot index
        slot: u16,
        /// Increment amount
        amount: i32,
    },
    /// Pop a value, push it converted to another primitive type
    Cast {
        /// Target type
        to: ValueType,
    },
    /// Pop a reference, push it narrowed to a class
    CheckCast {
        /// Target class name
        class: String,
    },
    /// Pop a reference, push 1 if it is an instance of a class
    InstanceOf {
        /// Class name tested against
        class: String,
    },
    /// Pop two wide or floating operands, push a three-way comparison
    Compare {
        /// NaN ordering flavor
        kind: CompareKind,
    },
    /// Push a new uninitialized object
    New {
        /// Class being instantiated
        class: String,
    },
    /// Pop one length per dimension, push a new array
    NewArray {
        /// Element type
        elem: ValueType,
        /// Number of dimensions
        dims: u8,
    },
    /// Pop an array, push its length
    ArrayLength,
    /// Push a field value
    FieldLoad {
        /// No receiver is popped when static
        is_static: bool,
        /// Declaring class name
        owner: String,
        /// Field name
        name: String,
        /// Field type
        ty: ValueType,
    },
    /// Pop a value (and receiver unless static), store into a field
    FieldStore {
        /// No receiver is popped when static
        is_static: bool,
        /// Declaring class name
        owner: String,
        /// Field name
        name: String,
        /// Field type
        ty: ValueType,
    },
    /// Pop arguments (and receiver unless static), push the result unless void
    Invoke {
        /// Dispatch mechanism
        kind: InvokeKind,
        /// Declaring class name
        owner: String,
        /// Method name
        name: String,
        /// Declared parameter types, receiver excluded
        params: Vec<ValueType>,
        /// Return type
        ret: ValueType,
    },
    /// Pop bound arguments, push the result unless void
    InvokeDynamic {
        /// Bootstrap method handle description
        bootstrap: String,
        /// Call site name
        name: String,
        /// Bound argument types
        params: Vec<ValueType>,
        /// Return type
        ret: ValueType,
    },
    /// Unconditional jump
    Goto {
        /// Target label
        target: LabelId,
    },
    /// Conditional branch
    Branch {
        /// The comparison
        kind: BranchKind,
        /// Operand shape
        operands: BranchOperands,
        /// Target when the comparison holds
        target: LabelId,
    },
    /// Multi-way dispatch on a popped integer
    Switch {
        /// `(key, target)` pairs
        cases: Vec<(i32, LabelId)>,
        /// Target when no key matches
        default: LabelId,
    },
    /// Return, popping a value unless the type is void
    Return {
        /// Returned type
        ty: ValueType,
    },
    /// Pop a reference and throw it
    Throw,
    /// Pop a reference and acquire or release its monitor
    Monitor {
        /// Acquire or release
        mode: MonitorMode,
    },
    /// Subroutine call (never lifted)
    Jsr {
        /// Subroutine label
        target: LabelId,
    },
    /// Subroutine return (never lifted)
    Ret {
        /// Slot holding the return address
        slot: u16,
    },
}

impl Insn {
    /// Returns a mnemonic for diagnostics.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Insn::Label(_) => "label",
            Insn::Const(_) => "const",
            Insn::Load { .. } => "load",
            Insn::Store { .. } => "store",
            Insn::ArrayLoad { .. } => "aload",
            Insn::ArrayStore { .. } => "astore",
            Insn::Pop { .. } => "pop",
            Insn::Dup => "dup",
            Insn::DupX1 => "dup_x1",
            Insn::DupX2 => "dup_x2",
            Insn::Dup2 => "dup2",
            Insn::Dup2X1 => "dup2_x1",
            Insn::Dup2X2 => "dup2_x2",
            Insn::Swap => "swap",
            Insn::Binary { .. } => "binary",
            Insn::Neg { .. } => "neg",
            Insn::Inc { .. } => "inc",
            Insn::Cast { .. } => "cast",
            Insn::CheckCast { .. } => "checkcast",
            Insn::InstanceOf { .. } => "instanceof",
            Insn::Compare { .. } => "cmp",
            Insn::New { .. } => "new",
            Insn::NewArray { .. } => "newarray",
            Insn::ArrayLength => "arraylength",
            Insn::FieldLoad { .. } => "getfield",
            Insn::FieldStore { .. } => "putfield",
            Insn::Invoke { .. } => "invoke",
            Insn::InvokeDynamic { .. } => "invokedynamic",
            Insn::Goto { .. } => "goto",
            Insn::Branch { .. } => "if",
            Insn::Switch { .. } => "switch",
            Insn::Return { .. } => "return",
            Insn::Throw => "throw",
            Insn::Monitor { .. } => "monitor",
            Insn::Jsr { .. } => "jsr",
            Insn::Ret { .. } => "ret",
        }
    }
}

/// One exception-table entry: the protected label span and its handler.
///
/// The span is half-open over instruction order: blocks from `start`
/// (inclusive) to `end` (exclusive) transfer to `handler` when an exception
/// of the caught type escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First protected label
    pub start: LabelId,
    /// First label past the protected span
    pub end: LabelId,
    /// Handler label
    pub handler: LabelId,
    /// Caught class, `None` for a catch-all
    pub catch_type: Option<String>,
}

/// A routine body ready for lifting.
#[derive(Debug, Clone)]
pub struct Routine {
    /// Routine name, used for diagnostics and result keying
    pub name: String,
    /// Whether the routine has no receiver
    pub is_static: bool,
    /// Declared parameter types, receiver excluded
    pub params: Vec<ValueType>,
    /// Return type
    pub ret: ValueType,
    /// The instruction stream
    pub insns: Vec<Insn>,
    /// Exception-handler table
    pub exception_table: Vec<ExceptionTableEntry>,
}

impl Routine {
    /// Starts building a routine with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RoutineBuilder {
        RoutineBuilder {
            routine: Routine {
                name: name.into(),
                is_static: true,
                params: Vec::new(),
                ret: ValueType::Void,
                insns: Vec::new(),
                exception_table: Vec::new(),
            },
        }
    }

    /// Maps each label to its index in the instruction stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if a label is
    /// defined twice or an exception-table entry references an undefined
    /// label.
    pub fn label_positions(&self) -> Result<HashMap<LabelId, usize>> {
        let mut positions = HashMap::new();
        for (index, insn) in self.insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if positions.insert(*label, index).is_some() {
                    return Err(malformed_error!("label {} defined twice", label));
                }
            }
        }
        for entry in &self.exception_table {
            for label in [entry.start, entry.end, entry.handler] {
                if !positions.contains_key(&label) {
                    return Err(malformed_error!(
                        "exception table references undefined label {}",
                        label
                    ));
                }
            }
        }
        Ok(positions)
    }

    /// Returns the number of frame slots the parameters occupy, receiver
    /// included.
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        let receiver = u16::from(!self.is_static);
        let params: u32 = self.params.iter().map(|t| t.width()).sum();
        receiver + u16::try_from(params).unwrap_or(u16::MAX)
    }
}

/// Fluent construction of [`Routine`] values, used heavily by tests.
#[derive(Debug)]
pub struct RoutineBuilder {
    routine: Routine,
}

impl RoutineBuilder {
    /// Marks the routine as an instance routine (adds a receiver slot).
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.routine.is_static = false;
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, ty: ValueType) -> Self {
        self.routine.params.push(ty);
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn ret(mut self, ty: ValueType) -> Self {
        self.routine.ret = ty;
        self
    }

    /// Appends an instruction.
    #[must_use]
    pub fn insn(mut self, insn: Insn) -> Self {
        self.routine.insns.push(insn);
        self
    }

    /// Appends a label marker.
    #[must_use]
    pub fn label(mut self, label: u32) -> Self {
        self.routine.insns.push(Insn::Label(LabelId(label)));
        self
    }

    /// Adds an exception-table entry.
    #[must_use]
    pub fn try_catch(
        mut self,
        start: u32,
        end: u32,
        handler: u32,
        catch_type: Option<&str>,
    ) -> Self {
        self.routine.exception_table.push(ExceptionTableEntry {
            start: LabelId(start),
            end: LabelId(end),
            handler: LabelId(handler),
            catch_type: catch_type.map(String::from),
        });
        self
    }

    /// Finishes the routine.
    #[must_use]
    pub fn build(self) -> Routine {
        self.routine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let routine = Routine::builder("f")
            .instance()
            .param(ValueType::Int)
            .param(ValueType::Long)
            .ret(ValueType::Int)
            .label(0)
            .insn(Insn::Load {
                slot: 1,
                ty: ValueType::Int,
            })
            .insn(Insn::Return { ty: ValueType::Int })
            .build();

        assert_eq!(routine.param_slots(), 4);
        assert_eq!(routine.insns.len(), 3);
        assert_eq!(routine.ret, ValueType::Int);
    }

    #[test]
    fn test_label_positions() {
        let routine = Routine::builder("f")
            .label(0)
            .insn(Insn::Return {
                ty: ValueType::Void,
            })
            .label(1)
            .build();

        let positions = routine.label_positions().unwrap();
        assert_eq!(positions[&LabelId(0)], 0);
        assert_eq!(positions[&LabelId(1)], 2);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let routine = Routine::builder("f").label(0).label(0).build();
        assert!(routine.label_positions().is_err());
    }

    #[test]
    fn test_dangling_handler_rejected() {
        let routine = Routine::builder("f")
            .label(0)
            .label(1)
            .try_catch(0, 1, 9, None)
            .build();
        assert!(routine.label_positions().is_err());
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Insn::Jsr { target: LabelId(0) }.mnemonic(), "jsr");
        assert_eq!(Insn::Dup2X2.mnemonic(), "dup2_x2");
    }
}
