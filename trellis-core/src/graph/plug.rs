//! Plugs
//!
//! A plug is a named, typed slot on a node. Value plugs hold a [`Value`];
//! compound plugs hold no value of their own and group child plugs.
//!
//! Plugs are described by a [`PlugSpec`] (used by node types to declare their
//! static plugs, by callers to add dynamic plugs, and by scripts to recreate
//! dynamic plugs) and stored as [`PlugData`] inside the graph.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::ids::{NodeId, PlugId, ParentId};
use crate::value::{Value, ValueType};

/// Data flow direction of a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// Static type of a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlugType {
    /// A leaf plug holding a value of the given type.
    Value(ValueType),
    /// A valueless parent of child plugs.
    Compound,
}

impl fmt::Display for PlugType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(t) => write!(f, "{t}"),
            Self::Compound => f.write_str("Compound"),
        }
    }
}

/// Behavioural flags on a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlugFlags(u8);

impl PlugFlags {
    pub const NONE: Self = Self(0);
    /// Value and input cannot be changed.
    pub const READ_ONLY: Self = Self(1);
    /// Added after construction; scripts must recreate it.
    pub const DYNAMIC: Self = Self(1 << 1);
    /// Value and connections are written by serialisation.
    pub const SERIALISABLE: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl Default for PlugFlags {
    fn default() -> Self {
        Self::SERIALISABLE
    }
}

impl std::ops::BitOr for PlugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Declarative description of a plug and its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlugSpec {
    pub name: String,
    pub direction: Direction,
    pub plug_type: PlugType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub flags: PlugFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlugSpec>,
}

impl PlugSpec {
    /// A value plug. The default is the zero value of `value_type`.
    pub fn new(name: impl Into<String>, direction: Direction, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction,
            plug_type: PlugType::Value(value_type),
            default: Some(value_type.zero()),
            flags: PlugFlags::default(),
            children: Vec::new(),
        }
    }

    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::In, value_type)
    }

    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::Out, value_type)
    }

    /// A compound plug; add children with [`PlugSpec::child`].
    pub fn compound(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            plug_type: PlugType::Compound,
            default: None,
            flags: PlugFlags::default(),
            children: Vec::new(),
        }
    }

    /// Set the default value. Ignored for compound plugs.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        if matches!(self.plug_type, PlugType::Value(_)) {
            self.default = Some(value.into());
        }
        self
    }

    pub fn with_flags(mut self, flags: PlugFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn child(mut self, child: PlugSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A plug as stored in the graph.
#[derive(Debug, Clone)]
pub(crate) struct PlugData {
    pub name: String,
    pub node: NodeId,
    pub parent: ParentId,
    pub direction: Direction,
    pub plug_type: PlugType,
    pub flags: PlugFlags,
    pub default: Option<Value>,
    pub value: Option<Value>,
    pub children: IndexMap<String, PlugId>,
    /// The plug this one takes its value from.
    pub input: Option<PlugId>,
    /// Plugs that take their value from this one, in connection order.
    pub outputs: IndexSet<PlugId>,
}

impl PlugData {
    pub fn value_type(&self) -> Option<ValueType> {
        match self.plug_type {
            PlugType::Value(t) => Some(t),
            PlugType::Compound => None,
        }
    }

    /// Rebuild a spec from this plug and its (already resolved) children.
    pub fn to_spec(&self, children: Vec<PlugSpec>) -> PlugSpec {
        PlugSpec {
            name: self.name.clone(),
            direction: self.direction,
            plug_type: self.plug_type,
            default: self.default.clone(),
            flags: self.flags,
            children,
        }
    }
}
