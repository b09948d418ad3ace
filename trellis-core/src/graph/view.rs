//! Borrowed Views
//!
//! [`NodeView`] and [`PlugView`] pair an id with the graph that owns it, so
//! node types and metadata resolvers can navigate structure and read values
//! without holding the graph mutably.

use std::sync::Arc;

use super::ids::{ChildId, NodeId, PlugId};
use super::node_type::{NodeType, TypeTag};
use super::plug::{Direction, PlugFlags, PlugType};
use super::storage::Graph;
use crate::compute::Context;
use crate::error::{GraphError, Result};
use crate::value::Value;

/// A node together with its graph.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    graph: &'a Graph,
    id: NodeId,
}

impl<'a> NodeView<'a> {
    pub(crate) fn new(graph: &'a Graph, id: NodeId) -> Self {
        Self { graph, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn name(&self) -> &'a str {
        self.graph.node_data(self.id).map_or("", |n| n.name.as_str())
    }

    /// Path from the root, e.g. `"box.add1"`.
    pub fn full_path(&self) -> String {
        self.graph.node_path(self.id)
    }

    pub fn type_tag(&self) -> TypeTag {
        self.node_type().type_tag()
    }

    pub fn node_type(&self) -> Arc<dyn NodeType> {
        self.graph
            .node_data(self.id)
            .map(|n| n.node_type.clone())
            .unwrap_or_else(|| Arc::new(crate::nodes::BasicNode))
    }

    pub fn parent(&self) -> Option<NodeView<'a>> {
        let parent = self.graph.node_data(self.id)?.parent?;
        Some(NodeView::new(self.graph, parent))
    }

    /// Look up a plug by path relative to this node (`"op1"`, `"c.x"`).
    pub fn plug(&self, path: &str) -> Option<PlugId> {
        self.graph.plug_of(self.id, path)
    }

    /// Like [`NodeView::plug`], but a missing plug is an error.
    pub fn require_plug(&self, path: &str) -> Result<PlugId> {
        self.plug(path)
            .ok_or_else(|| GraphError::plug_not_found(format!("{}.{}", self.full_path(), path)))
    }

    /// Top-level plugs, in order.
    pub fn plugs(&self) -> Vec<PlugId> {
        self.graph
            .node_data(self.id)
            .map(|n| {
                n.children
                    .values()
                    .filter_map(|c| match c {
                        ChildId::Plug(p) => Some(*p),
                        ChildId::Node(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every plug on the node, depth first, parents before children.
    pub fn descendant_plugs(&self) -> Vec<PlugId> {
        let mut out = Vec::new();
        for plug in self.plugs() {
            self.graph.collect_plug_tree(plug, &mut out);
        }
        out
    }

    /// Child nodes, in order.
    pub fn child_nodes(&self) -> Vec<NodeId> {
        self.graph.child_nodes(self.id)
    }

    /// Value of the plug at `path`, computed in `context`.
    pub fn value(&self, path: &str, context: &Context) -> Result<Arc<Value>> {
        let plug = self.require_plug(path)?;
        self.graph.value(plug, context)
    }
}

impl std::fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeView")
            .field("id", &self.id)
            .field("path", &self.full_path())
            .finish()
    }
}

/// A plug together with its graph.
#[derive(Clone, Copy)]
pub struct PlugView<'a> {
    graph: &'a Graph,
    id: PlugId,
}

impl<'a> PlugView<'a> {
    pub(crate) fn new(graph: &'a Graph, id: PlugId) -> Self {
        Self { graph, id }
    }

    pub fn id(&self) -> PlugId {
        self.id
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn name(&self) -> &'a str {
        self.graph.plug_data(self.id).map_or("", |p| p.name.as_str())
    }

    /// Path relative to the owning node, e.g. `"c.x"`.
    pub fn relative_path(&self) -> String {
        self.graph.plug_relative_path(self.id)
    }

    /// Path from the root, e.g. `"add1.op1"`.
    pub fn full_path(&self) -> String {
        self.graph.plug_path(self.id)
    }

    pub fn node(&self) -> Option<NodeView<'a>> {
        let node = self.graph.plug_data(self.id)?.node;
        Some(NodeView::new(self.graph, node))
    }

    pub fn direction(&self) -> Option<Direction> {
        self.graph.plug_data(self.id).map(|p| p.direction)
    }

    pub fn plug_type(&self) -> Option<PlugType> {
        self.graph.plug_data(self.id).map(|p| p.plug_type)
    }

    pub fn flags(&self) -> PlugFlags {
        self.graph
            .plug_data(self.id)
            .map_or(PlugFlags::NONE, |p| p.flags)
    }

    pub fn input(&self) -> Option<PlugId> {
        self.graph.plug_data(self.id)?.input
    }

    pub fn value(&self, context: &Context) -> Result<Arc<Value>> {
        self.graph.value(self.id, context)
    }
}

impl std::fmt::Debug for PlugView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlugView")
            .field("id", &self.id)
            .field("path", &self.full_path())
            .finish()
    }
}
