//! Plug and Metadata Values
//!
//! [`Value`] is the payload carried by value plugs and by metadata entries.
//! Every value knows its [`ValueType`], can append itself to a hash, and can
//! estimate its memory footprint for the cache's budget.
//!
//! Numeric types (`Bool`, `Int`, `Float`) are mutually convertible, matching
//! the connection rules for numeric plugs.

use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::compute::PlugHasher;

/// The static type of a value plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    Color,
    IntVector,
    FloatVector,
    StringVector,
}

impl ValueType {
    /// `true` for the scalar numeric types, which convert into each other.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float)
    }

    /// Whether a plug of this type can take its value from a plug of `other`.
    pub fn accepts(self, other: ValueType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    /// The value a freshly created plug of this type holds.
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::Color => Value::Color([0.0; 3]),
            Self::IntVector => Value::IntVector(Vec::new()),
            Self::FloatVector => Value::FloatVector(Vec::new()),
            Self::StringVector => Value::StringVector(Vec::new()),
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Int => 1,
            Self::Float => 2,
            Self::String => 3,
            Self::Color => 4,
            Self::IntVector => 5,
            Self::FloatVector => 6,
            Self::StringVector => 7,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Color => "Color",
            Self::IntVector => "IntVector",
            Self::FloatVector => "FloatVector",
            Self::StringVector => "StringVector",
        };
        f.write_str(name)
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Color([f32; 3]),
    IntVector(Vec<i64>),
    FloatVector(Vec<f64>),
    StringVector(Vec<String>),
}

impl Value {
    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::Color(_) => ValueType::Color,
            Self::IntVector(_) => ValueType::IntVector,
            Self::FloatVector(_) => ValueType::FloatVector,
            Self::StringVector(_) => ValueType::StringVector,
        }
    }

    /// Convert to `target`, returning `None` when the types are incompatible.
    ///
    /// Values already of the target type are returned unchanged.
    pub fn convert(&self, target: ValueType) -> Option<Value> {
        if self.value_type() == target {
            return Some(self.clone());
        }
        let numeric = match self {
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
            _ => return None,
        };
        match target {
            ValueType::Bool => Some(Self::Bool(numeric != 0.0)),
            ValueType::Int => Some(Self::Int(numeric as i64)),
            ValueType::Float => Some(Self::Float(numeric)),
            _ => None,
        }
    }

    /// Append a digest of this value to `hasher`.
    ///
    /// The type is hashed along with the payload, so `Int(1)` and
    /// `Float(1.0)` never collide.
    pub fn hash_into(&self, hasher: &mut PlugHasher) {
        hasher.append_u8(self.value_type().tag());
        match self {
            Self::Bool(b) => hasher.append_u8(u8::from(*b)),
            Self::Int(i) => hasher.append_bytes(&i.to_le_bytes()),
            Self::Float(f) => hasher.append_bytes(&f.to_bits().to_le_bytes()),
            Self::String(s) => hasher.append_str(s),
            Self::Color(c) => {
                for channel in c {
                    hasher.append_bytes(&channel.to_bits().to_le_bytes());
                }
            }
            Self::IntVector(v) => {
                hasher.append_len(v.len());
                for i in v {
                    hasher.append_bytes(&i.to_le_bytes());
                }
            }
            Self::FloatVector(v) => {
                hasher.append_len(v.len());
                for f in v {
                    hasher.append_bytes(&f.to_bits().to_le_bytes());
                }
            }
            Self::StringVector(v) => {
                hasher.append_len(v.len());
                for s in v {
                    hasher.append_str(s);
                }
            }
        }
    }

    /// Approximate heap plus inline size, used for cache accounting.
    pub fn memory_usage(&self) -> usize {
        let heap = match self {
            Self::String(s) => s.capacity(),
            Self::IntVector(v) => v.capacity() * size_of::<i64>(),
            Self::FloatVector(v) => v.capacity() * size_of::<f64>(),
            Self::StringVector(v) => {
                v.capacity() * size_of::<String>() + v.iter().map(String::capacity).sum::<usize>()
            }
            _ => 0,
        };
        size_of::<Self>() + heap
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Color([r, g, b]) => write!(f, "Color({r}, {g}, {b})"),
            Self::IntVector(v) => write!(f, "{v:?}"),
            Self::FloatVector(v) => write!(f, "{v:?}"),
            Self::StringVector(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::IntVector(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::StringVector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_types_accept_each_other() {
        assert!(ValueType::Float.accepts(ValueType::Int));
        assert!(ValueType::Bool.accepts(ValueType::Float));
        assert!(!ValueType::String.accepts(ValueType::Int));
        assert!(!ValueType::IntVector.accepts(ValueType::FloatVector));
    }

    #[test]
    fn convert_between_numeric_types() {
        assert_eq!(Value::Int(5).convert(ValueType::Float), Some(Value::Float(5.0)));
        assert_eq!(Value::Float(2.7).convert(ValueType::Int), Some(Value::Int(2)));
        assert_eq!(Value::Int(0).convert(ValueType::Bool), Some(Value::Bool(false)));
        assert_eq!(Value::from("x").convert(ValueType::Int), None);
    }

    #[test]
    fn hash_distinguishes_types() {
        let mut a = PlugHasher::new();
        Value::Int(1).hash_into(&mut a);
        let mut b = PlugHasher::new();
        Value::Float(1.0).hash_into(&mut b);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn serde_round_trip_keeps_type() {
        let value = Value::StringVector(vec!["a".into(), "b".into()]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"string_vector","value":["a","b"]}"#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);
    }
}
