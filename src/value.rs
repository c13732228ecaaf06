//! Runtime value representation for the virtual machine.

use std::fmt;

/// A value on a thread's operand stack or in a variable binding.
///
/// `Value` covers everything a program in this machine can compute with or
/// pass through a mailbox. The set is deliberately small: integers for
/// arithmetic and conditions, booleans for flags, and strings for resource
/// and thread names (creation opcodes push the new resource's name, and the
/// acquire/release opcodes pop it back off the stack).
///
/// # Type mapping
///
/// | Program concept | Variant |
/// |-----------------|---------|
/// | arithmetic operand, counter value, spawn index | [`Value::Int`] |
/// | flag / loop control | [`Value::Bool`] |
/// | resource name, thread name, message payload | [`Value::Str`] |
///
/// # Conditions
///
/// `JUMP_IF` treats its operand as an integer: an `Int` is taken as-is and a
/// `Bool` widens to `1`/`0`, so `true` (non-negative) takes the branch.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),

    /// Boolean flag.
    ///
    /// Widened to `1`/`0` wherever an integer is expected (conditions),
    /// mirroring how the operand stack treats flags.
    Bool(bool),

    /// String: resource names, thread names, and message payloads.
    Str(String),
}

impl Value {
    /// Returns a short name for the value's type, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
        }
    }

    /// Returns the integer view of this value, if it has one.
    ///
    /// `Int` yields itself; `Bool` widens to `1`/`0`. Strings have no
    /// integer view.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(_) => None,
        }
    }

    /// Returns the string view of this value, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_int() {
        assert_eq!(Value::Int(-3).as_int(), Some(-3));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Bool(false).as_int(), Some(0));
        assert_eq!(Value::from("x").as_int(), None);
    }

    #[test]
    fn test_as_str() {
        assert_eq!(Value::from("lock-0").as_str(), Some("lock-0"));
        assert_eq!(Value::Int(1).as_str(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::from("item-7").to_string(), "item-7");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(0).type_name(), "int");
        assert_eq!(Value::Bool(true).type_name(), "bool");
        assert_eq!(Value::from("").type_name(), "str");
    }
}
