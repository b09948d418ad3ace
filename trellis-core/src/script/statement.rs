//! Script statements and their encodings.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{PlugFlags, PlugSpec, TypeTag};
use crate::value::Value;

/// One replayable edit. Paths are relative to the root of the graph the
/// script is executed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    AddNode {
        parent: String,
        name: String,
        node_type: TypeTag,
    },
    /// Recreate a dynamic plug (and its children) under a node or compound.
    AddPlug { parent: String, plug: PlugSpec },
    SetValue { plug: String, value: Value },
    SetInput { plug: String, input: String },
    NodeMetadata { node: String, key: String, value: Value },
    PlugMetadata { plug: String, key: String, value: Value },
    /// Restore a dynamic plug's flags once its value and input are in place.
    SetFlags { plug: String, flags: PlugFlags },
}

/// An ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Human-readable form (pretty-printed JSON).
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Compact binary form (MessagePack with named fields).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
