//! Graph Nodes
//!
//! A node is a named container of plugs and child nodes. Its behaviour comes
//! entirely from its [`NodeType`]; the node itself only stores structure.

use std::sync::Arc;

use indexmap::IndexMap;

use super::ids::{ChildId, NodeId};
use super::node_type::NodeType;

/// A node as stored in the graph.
#[derive(Clone)]
pub(crate) struct NodeData {
    pub name: String,
    pub parent: Option<NodeId>,
    pub node_type: Arc<dyn NodeType>,
    /// Plugs and child nodes, in insertion order.
    pub children: IndexMap<String, ChildId>,
}

impl NodeData {
    pub fn new(name: String, parent: Option<NodeId>, node_type: Arc<dyn NodeType>) -> Self {
        Self {
            name,
            parent,
            node_type,
            children: IndexMap::new(),
        }
    }
}

/// Return `name` if free among `children`, otherwise the first free name
/// formed by bumping a trailing number (`add` -> `add1`, `add1` -> `add2`).
/// A trailing number too large to bump is kept and a new suffix appended.
pub(crate) fn unique_name<V>(children: &IndexMap<String, V>, name: &str) -> String {
    if !children.contains_key(name) {
        return name.to_owned();
    }

    let mut stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let mut suffix: u64 = name[stem.len()..].parse().unwrap_or(0);
    loop {
        suffix = match suffix.checked_add(1) {
            Some(next) => next,
            None => {
                stem = name;
                1
            }
        };
        let candidate = format!("{stem}{suffix}");
        if !children.contains_key(&candidate) {
            return candidate;
        }
    }
}

impl std::fmt::Debug for NodeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeData")
            .field("name", &self.name)
            .field("type", &self.node_type.type_tag())
            .field("children", &self.children.len())
            .finish()
    }
}
