//! Graph Identifiers
//!
//! Nodes and plugs are stored in arenas and referenced by id. Ids come from
//! process-wide counters, so they stay unique across every graph in the
//! process. That lets instance metadata and cache bookkeeping key on an id
//! without also naming the graph.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugId(u64);

impl PlugId {
    /// Generate a new unique plug ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for PlugId {
    fn default() -> Self {
        Self::new()
    }
}

/// A child of a node: either a nested node or a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildId {
    Node(NodeId),
    Plug(PlugId),
}

impl From<NodeId> for ChildId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PlugId> for ChildId {
    fn from(id: PlugId) -> Self {
        Self::Plug(id)
    }
}

/// The owner of a graph element: a node for nodes and top-level plugs, a
/// plug for children of compound plugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentId {
    Node(NodeId),
    Plug(PlugId),
}

impl From<NodeId> for ParentId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PlugId> for ParentId {
    fn from(id: PlugId) -> Self {
        Self::Plug(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert_ne!(PlugId::new(), PlugId::new());
    }

    #[test]
    fn child_id_from_ids() {
        let node = NodeId::new();
        let plug = PlugId::new();
        assert_eq!(ChildId::from(node), ChildId::Node(node));
        assert_eq!(ChildId::from(plug), ChildId::Plug(plug));
    }
}
