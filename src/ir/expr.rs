//! Expression trees.
//!
//! Expressions are pure value computations; anything with an observable side
//! effect when *executed* (stores, invocations used for effect, control
//! transfers) is a statement. Invocations still appear here because they
//! produce values, and the propagation pass is what decides whether moving
//! one past other statements is sound.

use std::fmt;

use strum::Display;

use crate::ir::{ConstValue, Local, ValueType};

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Shift left
    Shl,
    /// Arithmetic shift right
    Shr,
    /// Logical shift right
    Ushr,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
}

/// Three-way comparison flavors for wide and floating-point operands.
///
/// The `L` and `G` variants differ only in how NaN is ordered: `CmpL` treats
/// NaN as less than everything, `CmpG` as greater.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum CompareKind {
    /// Integer-style comparison (`lcmp`)
    Cmp,
    /// Floating comparison, NaN compares low
    CmpL,
    /// Floating comparison, NaN compares high
    CmpG,
}

/// Dispatch mechanism of an invocation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// Static dispatch, no receiver
    Static,
    /// Virtual dispatch through the receiver's class
    Virtual,
    /// Non-virtual instance dispatch (constructors, private methods, super calls)
    Special,
    /// Interface dispatch
    Interface,
}

/// A variable occurrence: the variable, its SSA version (if versioned yet),
/// and its computational type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarExpr {
    /// The variable
    pub local: Local,
    /// The SSA version, `None` before renaming and after version erasure
    pub version: Option<u32>,
    /// The computational type of the value
    pub ty: ValueType,
}

impl VarExpr {
    /// Creates an unversioned variable occurrence.
    #[must_use]
    pub const fn new(local: Local, ty: ValueType) -> Self {
        VarExpr {
            local,
            version: None,
            ty,
        }
    }

    /// Creates a versioned variable occurrence.
    #[must_use]
    pub const fn versioned(local: Local, version: u32, ty: ValueType) -> Self {
        VarExpr {
            local,
            version: Some(version),
            ty,
        }
    }
}

impl fmt::Display for VarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}_{}", self.local, v),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Controls descent during expression tree visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Visit this node's children
    Continue,
    /// Do not descend into this node's children
    Skip,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant operand
    Const(ConstValue),
    /// A variable read
    Load(VarExpr),
    /// A binary operation
    Binary {
        /// The operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
        /// Result type
        ty: ValueType,
    },
    /// Arithmetic negation
    Neg {
        /// The operand
        value: Box<Expr>,
        /// Result type
        ty: ValueType,
    },
    /// Three-way comparison producing an `int` in {-1, 0, 1}
    Compare {
        /// NaN ordering flavor
        kind: CompareKind,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Primitive conversion
    Cast {
        /// The operand
        value: Box<Expr>,
        /// Target type
        ty: ValueType,
    },
    /// Reference downcast, trapping at runtime on mismatch
    CheckCast {
        /// The operand
        value: Box<Expr>,
        /// Target class name
        class: String,
    },
    /// Runtime type test producing an `int` in {0, 1}
    InstanceOf {
        /// The operand
        value: Box<Expr>,
        /// Class name tested against
        class: String,
    },
    /// Array element read
    ArrayLoad {
        /// The array reference
        array: Box<Expr>,
        /// The element index
        index: Box<Expr>,
        /// Element type
        ty: ValueType,
    },
    /// Array length read
    ArrayLength {
        /// The array reference
        array: Box<Expr>,
    },
    /// Field read, static when `instance` is `None`
    FieldLoad {
        /// Receiver, absent for static fields
        instance: Option<Box<Expr>>,
        /// Declaring class name
        owner: String,
        /// Field name
        name: String,
        /// Field type
        ty: ValueType,
    },
    /// A freshly allocated, not yet constructed object
    New {
        /// Class being instantiated
        class: String,
    },
    /// Array allocation, one length per dimension
    NewArray {
        /// Length expression for each dimension
        lengths: Vec<Expr>,
        /// Element type
        elem: ValueType,
    },
    /// Method invocation
    Invoke {
        /// Dispatch mechanism
        kind: InvokeKind,
        /// Declaring class name
        owner: String,
        /// Method name
        name: String,
        /// Arguments, receiver first for instance dispatch
        args: Vec<Expr>,
        /// Return type
        ret: ValueType,
    },
    /// Invocation through a bootstrap-resolved call site
    InvokeDynamic {
        /// Bootstrap method handle description
        bootstrap: String,
        /// Call site name
        name: String,
        /// Bound arguments
        args: Vec<Expr>,
        /// Return type
        ret: ValueType,
    },
    /// The in-flight exception at a handler's entry
    CaughtException {
        /// The narrowest caught class, or `None` for a catch-all
        class: Option<String>,
    },
}

impl Expr {
    /// Creates a variable read.
    #[must_use]
    pub const fn load(var: VarExpr) -> Self {
        Expr::Load(var)
    }

    /// Returns the computational type of the value this expression produces.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        match self {
            Expr::Const(c) => c.ty(),
            Expr::Load(v) => v.ty,
            Expr::Binary { ty, .. } | Expr::Neg { ty, .. } | Expr::Cast { ty, .. } => *ty,
            Expr::Compare { .. } | Expr::InstanceOf { .. } | Expr::ArrayLength { .. } => {
                ValueType::Int
            }
            Expr::ArrayLoad { ty, .. } | Expr::FieldLoad { ty, .. } => *ty,
            Expr::CheckCast { .. }
            | Expr::New { .. }
            | Expr::NewArray { .. }
            | Expr::CaughtException { .. } => ValueType::Reference,
            Expr::Invoke { ret, .. } | Expr::InvokeDynamic { ret, .. } => *ret,
        }
    }

    /// Returns `true` if duplicating this expression could duplicate an
    /// observable effect.
    ///
    /// Such expressions are propagated to at most one use and never copied.
    #[must_use]
    pub fn is_uncopyable(&self) -> bool {
        matches!(
            self,
            Expr::Invoke { .. } | Expr::InvokeDynamic { .. } | Expr::New { .. }
        )
    }

    /// Visits this expression and its subtree in pre-order.
    ///
    /// The callback returns [`Walk::Skip`] to prune descent below a node.
    pub fn visit<'a, F: FnMut(&'a Expr) -> Walk>(&'a self, f: &mut F) {
        if f(self) == Walk::Skip {
            return;
        }
        match self {
            Expr::Const(_) | Expr::Load(_) | Expr::New { .. } | Expr::CaughtException { .. } => {}
            Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Neg { value, .. }
            | Expr::Cast { value, .. }
            | Expr::CheckCast { value, .. }
            | Expr::InstanceOf { value, .. } => value.visit(f),
            Expr::ArrayLoad { array, index, .. } => {
                array.visit(f);
                index.visit(f);
            }
            Expr::ArrayLength { array } => array.visit(f),
            Expr::FieldLoad { instance, .. } => {
                if let Some(instance) = instance {
                    instance.visit(f);
                }
            }
            Expr::NewArray { lengths, .. } => {
                for length in lengths {
                    length.visit(f);
                }
            }
            Expr::Invoke { args, .. } | Expr::InvokeDynamic { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
        }
    }

    /// Visits this expression and its subtree in pre-order with mutable
    /// access.
    ///
    /// The callback returns [`Walk::Skip`] to prune descent below a node,
    /// which also allows replacing the node without revisiting its new
    /// children.
    pub fn visit_mut<F: FnMut(&mut Expr) -> Walk>(&mut self, f: &mut F) {
        if f(self) == Walk::Skip {
            return;
        }
        match self {
            Expr::Const(_) | Expr::Load(_) | Expr::New { .. } | Expr::CaughtException { .. } => {}
            Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.visit_mut(f);
                right.visit_mut(f);
            }
            Expr::Neg { value, .. }
            | Expr::Cast { value, .. }
            | Expr::CheckCast { value, .. }
            | Expr::InstanceOf { value, .. } => value.visit_mut(f),
            Expr::ArrayLoad { array, index, .. } => {
                array.visit_mut(f);
                index.visit_mut(f);
            }
            Expr::ArrayLength { array } => array.visit_mut(f),
            Expr::FieldLoad { instance, .. } => {
                if let Some(instance) = instance {
                    instance.visit_mut(f);
                }
            }
            Expr::NewArray { lengths, .. } => {
                for length in lengths {
                    length.visit_mut(f);
                }
            }
            Expr::Invoke { args, .. } | Expr::InvokeDynamic { args, .. } => {
                for arg in args {
                    arg.visit_mut(f);
                }
            }
        }
    }

    /// Calls `f` for every variable read in this subtree.
    pub fn for_each_load<'a, F: FnMut(&'a VarExpr)>(&'a self, f: &mut F) {
        self.visit(&mut |e| {
            if let Expr::Load(v) = e {
                f(v);
            }
            Walk::Continue
        });
    }

    /// Returns `true` if any node in this subtree satisfies the predicate.
    #[must_use]
    pub fn any<F: FnMut(&Expr) -> bool>(&self, mut pred: F) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if found {
                return Walk::Skip;
            }
            if pred(e) {
                found = true;
                return Walk::Skip;
            }
            Walk::Continue
        });
        found
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Load(v) => write!(f, "{v}"),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            Expr::Neg { value, .. } => write!(f, "-{value}"),
            Expr::Compare { kind, left, right } => write!(f, "{kind}({left}, {right})"),
            Expr::Cast { value, ty } => write!(f, "({ty}) {value}"),
            Expr::CheckCast { value, class } => write!(f, "({class}) {value}"),
            Expr::InstanceOf { value, class } => write!(f, "{value} instanceof {class}"),
            Expr::ArrayLoad { array, index, .. } => write!(f, "{array}[{index}]"),
            Expr::ArrayLength { array } => write!(f, "{array}.length"),
            Expr::FieldLoad {
                instance,
                owner,
                name,
                ..
            } => match instance {
                Some(instance) => write!(f, "{instance}.{name}"),
                None => write!(f, "{owner}.{name}"),
            },
            Expr::New { class } => write!(f, "new {class}"),
            Expr::NewArray { lengths, elem } => {
                write!(f, "new {elem}")?;
                for length in lengths {
                    write!(f, "[{length}]")?;
                }
                Ok(())
            }
            Expr::Invoke {
                owner, name, args, ..
            } => {
                write!(f, "{owner}.{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::InvokeDynamic { name, args, .. } => {
                write!(f, "dynamic {name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::CaughtException { class } => match class {
                Some(class) => write!(f, "catch({class})"),
                None => write!(f, "catch(*)"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvar(index: u16) -> Expr {
        Expr::load(VarExpr::new(Local::slot(index), ValueType::Int))
    }

    #[test]
    fn test_expr_types() {
        let add = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(lvar(0)),
            right: Box::new(Expr::Const(ConstValue::Int(1))),
            ty: ValueType::Int,
        };
        assert_eq!(add.ty(), ValueType::Int);
        assert_eq!(
            Expr::ArrayLength {
                array: Box::new(lvar(0))
            }
            .ty(),
            ValueType::Int
        );
        assert_eq!(
            Expr::CaughtException { class: None }.ty(),
            ValueType::Reference
        );
    }

    #[test]
    fn test_uncopyable() {
        let invoke = Expr::Invoke {
            kind: InvokeKind::Static,
            owner: "Math".into(),
            name: "abs".into(),
            args: vec![lvar(0)],
            ret: ValueType::Int,
        };
        assert!(invoke.is_uncopyable());
        assert!(Expr::New {
            class: "Object".into()
        }
        .is_uncopyable());
        assert!(!lvar(0).is_uncopyable());
    }

    #[test]
    fn test_visit_counts_nodes() {
        let expr = Expr::Binary {
            op: BinaryOp::Mul,
            left: Box::new(lvar(0)),
            right: Box::new(Expr::Neg {
                value: Box::new(lvar(1)),
                ty: ValueType::Int,
            }),
            ty: ValueType::Int,
        };

        let mut count = 0;
        expr.visit(&mut |_| {
            count += 1;
            Walk::Continue
        });
        assert_eq!(count, 4);
    }

    #[test]
    fn test_visit_skip_prunes() {
        let expr = Expr::Neg {
            value: Box::new(lvar(0)),
            ty: ValueType::Int,
        };

        let mut count = 0;
        expr.visit(&mut |_| {
            count += 1;
            Walk::Skip
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_for_each_load() {
        let expr = Expr::ArrayLoad {
            array: Box::new(lvar(0)),
            index: Box::new(lvar(1)),
            ty: ValueType::Int,
        };

        let mut loads = Vec::new();
        expr.for_each_load(&mut |v| loads.push(v.local));
        assert_eq!(loads, vec![Local::slot(0), Local::slot(1)]);
    }

    #[test]
    fn test_visit_mut_substitution() {
        let mut expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(lvar(0)),
            right: Box::new(lvar(1)),
            ty: ValueType::Int,
        };

        expr.visit_mut(&mut |e| {
            if matches!(e, Expr::Load(v) if v.local == Local::slot(1)) {
                *e = Expr::Const(ConstValue::Int(7));
                return Walk::Skip;
            }
            Walk::Continue
        });

        assert_eq!(expr.to_string(), "(lvar0 add 7)");
    }

    #[test]
    fn test_display() {
        assert_eq!(lvar(3).to_string(), "lvar3");
        let cmp = Expr::Compare {
            kind: CompareKind::CmpG,
            left: Box::new(lvar(0)),
            right: Box::new(lvar(1)),
        };
        assert_eq!(cmp.to_string(), "cmpg(lvar0, lvar1)");
    }
}
