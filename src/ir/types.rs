//! Value types and constants carried by the intermediate representation.
//!
//! Source-level types are collapsed to the handful of computational categories
//! the operand stack distinguishes. The only property most passes care about
//! is the slot width: `long` and `double` values occupy two slots, everything
//! else occupies one.

use strum::Display;

/// The computational type of a value on the operand stack or in a local slot.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    /// 32-bit integer (also booleans, bytes, chars, and shorts)
    Int,
    /// 64-bit integer, occupying two slots
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float, occupying two slots
    Double,
    /// Object or array reference
    Reference,
    /// Absence of a value (void method results)
    Void,
}

impl ValueType {
    /// Returns the number of stack slots a value of this type occupies.
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            ValueType::Long | ValueType::Double => 2,
            ValueType::Int | ValueType::Float | ValueType::Reference => 1,
            ValueType::Void => 0,
        }
    }

    /// Returns `true` if values of this type occupy two stack slots.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        self.width() == 2
    }

    /// Merges this type with another at a control-flow join.
    ///
    /// Matching types merge to themselves; anything else is a verifier
    /// violation the caller reports.
    #[must_use]
    pub fn merge(self, other: ValueType) -> Option<ValueType> {
        if self == other {
            Some(self)
        } else {
            None
        }
    }
}

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// Integer constant
    Int(i32),
    /// Long constant
    Long(i64),
    /// Float constant
    Float(f32),
    /// Double constant
    Double(f64),
    /// String literal
    String(String),
    /// Class literal
    Class(String),
    /// The null reference
    Null,
}

impl ConstValue {
    /// Returns the computational type of this constant.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        match self {
            ConstValue::Int(_) => ValueType::Int,
            ConstValue::Long(_) => ValueType::Long,
            ConstValue::Float(_) => ValueType::Float,
            ConstValue::Double(_) => ValueType::Double,
            ConstValue::String(_) | ConstValue::Class(_) | ConstValue::Null => ValueType::Reference,
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(v) => write!(f, "{v}f"),
            ConstValue::Double(v) => write!(f, "{v}d"),
            ConstValue::String(s) => write!(f, "{s:?}"),
            ConstValue::Class(c) => write!(f, "{c}.class"),
            ConstValue::Null => write!(f, "null"),
        }
    }
}
