//! Node Types
//!
//! Every node is an instance of a [`NodeType`]. The trait is the capability
//! interface node plugins implement: which plugs a node has, which outputs
//! each input affects, and how outputs are hashed and computed. Everything
//! else (connections, dirty propagation, caching, undo) is generic.
//!
//! Types are identified by a [`TypeTag`]. Each type may name a base type;
//! the [`crate::metadata::TypeHierarchy`] records these links so metadata
//! registered against a base type applies to its derived types.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::ids::PlugId;
use super::plug::PlugSpec;
use super::view::NodeView;
use crate::compute::{Context, PlugHasher};
use crate::error::{GraphError, Result};
use crate::value::Value;

/// Name of a node type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeTag(Arc<str>);

impl TypeTag {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The root of every type hierarchy.
    pub fn node() -> Self {
        Self::new("Node")
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeTag {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0.to_string()
    }
}

impl From<&TypeTag> for TypeTag {
    fn from(tag: &TypeTag) -> Self {
        tag.clone()
    }
}

/// Outputs affected by an input. Almost always a handful of plugs.
pub type AffectedPlugs = SmallVec<[PlugId; 4]>;

/// Behaviour shared by every node of one type.
pub trait NodeType: Send + Sync {
    /// The tag identifying this type.
    fn type_tag(&self) -> TypeTag;

    /// The type this one derives from, for metadata inheritance.
    fn base_type(&self) -> Option<TypeTag> {
        Some(TypeTag::node())
    }

    /// Plugs created on every new node of this type.
    fn plugs(&self) -> Vec<PlugSpec> {
        Vec::new()
    }

    /// Plugs on `node` whose value depends on `input`.
    fn affects(&self, _node: NodeView<'_>, _input: PlugId) -> AffectedPlugs {
        AffectedPlugs::new()
    }

    /// Whether `plug`'s value is produced by [`NodeType::compute`] rather
    /// than stored.
    fn is_computed(&self, _node: NodeView<'_>, _plug: PlugId) -> bool {
        false
    }

    /// Plugs read when computing `output`.
    ///
    /// The default inverts [`NodeType::affects`] over the node's plugs.
    fn dependencies(&self, node: NodeView<'_>, output: PlugId) -> Vec<PlugId> {
        node.descendant_plugs()
            .into_iter()
            .filter(|&plug| plug != output && self.affects(node, plug).contains(&output))
            .collect()
    }

    /// Append everything `output`'s value depends on to `hasher`.
    ///
    /// The engine has already appended the type tag, the plug path and the
    /// context; the default appends the hash of every dependency.
    fn hash(
        &self,
        node: NodeView<'_>,
        output: PlugId,
        context: &Context,
        hasher: &mut PlugHasher,
    ) -> Result<()> {
        for input in self.dependencies(node, output) {
            hasher.append_hash(&node.graph().hash(input, context)?);
        }
        Ok(())
    }

    /// Compute the value of `output`. Called by the value cache on a miss.
    fn compute(&self, node: NodeView<'_>, output: PlugId, _context: &Context) -> Result<Value> {
        Err(GraphError::Compute {
            plug: node.graph().plug_path(output),
            message: format!("{} does not compute this plug", self.type_tag()),
        })
    }
}

/// The node types a graph can construct by tag, used when executing scripts.
#[derive(Clone, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<TypeTag, Arc<dyn NodeType>>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in types from [`crate::nodes`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for node_type in crate::nodes::builtins() {
            registry.register(node_type);
        }
        registry
    }

    /// Register (or replace) a type under its own tag.
    pub fn register(&mut self, node_type: Arc<dyn NodeType>) {
        self.types.insert(node_type.type_tag(), node_type);
    }

    pub fn get(&self, tag: &TypeTag) -> Result<Arc<dyn NodeType>> {
        self.types
            .get(tag)
            .cloned()
            .ok_or_else(|| GraphError::UnknownNodeType(tag.to_string()))
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.types.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<TypeTag> {
        let mut tags: Vec<_> = self.types.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("types", &self.tags())
            .finish()
    }
}
