//! Dirty Propagation
//!
//! When a plug's value or input changes, every plug whose value may depend on
//! it is "dirtied" and listeners are told about it.
//!
//! # Algorithm
//!
//! A breadth-first traversal over the static dependency structure, starting
//! at the changed plug(s):
//!
//! 1. Same-node edges: `NodeType::affects(input)` lists outputs on the node.
//! 2. Connection edges: every plug taking its input from a dirty plug.
//! 3. Parent edges: a dirty child dirties its parent compound plug.
//! 4. Child edges: the children of a *changed* compound plug (only for the
//!    roots of the pass, so a changed child does not dirty its siblings).
//!
//! A visited set guarantees each plug is reported once per pass no matter how
//! many paths reach it, so diamond-shaped graphs cost one visit per plug.
//!
//! After the traversal, listeners receive one `plug_dirtied` event per plug
//! in discovery order, then one `node_dirtied` event per node containing a
//! dirty plug (including ancestors), deepest nodes first. Memoised hashes of
//! dirty plugs are dropped; nothing is recomputed eagerly.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;

use super::ids::{NodeId, ParentId, PlugId};
use super::storage::Graph;

/// What triggered a propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyCause {
    /// A plug's stored value changed.
    ValueChanged,
    /// A plug's input connection changed.
    InputChanged,
}

/// A dirtied plug, as delivered to `plug_dirtied` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyEvent {
    pub plug: PlugId,
    pub path: String,
    pub cause: DirtyCause,
}

/// A node-level notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub node: NodeId,
    pub path: String,
}

/// A plug-level notification that is not a dirty event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlugEvent {
    pub plug: PlugId,
    pub path: String,
}

impl Graph {
    /// Every plug whose value depends on one of `roots`, roots included, in
    /// breadth-first discovery order.
    pub fn affected_plugs(&self, roots: &[PlugId]) -> Vec<PlugId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(PlugId, bool)> = roots.iter().map(|&p| (p, true)).collect();

        while let Some((plug_id, is_root)) = queue.pop_front() {
            if !visited.insert(plug_id) {
                continue;
            }
            let Some(plug) = self.plug_data(plug_id) else {
                continue;
            };
            order.push(plug_id);

            if is_root {
                for &child in plug.children.values() {
                    queue.push_back((child, true));
                }
            }

            if let ParentId::Plug(parent) = plug.parent {
                queue.push_back((parent, false));
            }

            if let Some(node) = self.node_data(plug.node) {
                let view = self.node_view_unchecked(plug.node);
                for affected in node.node_type.affects(view, plug_id) {
                    queue.push_back((affected, false));
                }
            }

            for &output in &plug.outputs {
                queue.push_back((output, false));
            }
        }

        order
    }

    /// Run a propagation pass from `roots` and notify listeners.
    ///
    /// Returns the dirtied plugs in the order they were reported.
    pub(crate) fn propagate_dirtiness(&self, roots: &[PlugId], cause: DirtyCause) -> Vec<PlugId> {
        let dirtied = self.affected_plugs(roots);
        if dirtied.is_empty() {
            return dirtied;
        }

        for plug in &dirtied {
            self.forget_hash(*plug);
        }

        let nodes = self.dirty_nodes(&dirtied);

        tracing::debug!(
            roots = roots.len(),
            plugs = dirtied.len(),
            nodes = nodes.len(),
            ?cause,
            "propagated dirtiness"
        );

        let signals = self.signals();
        for &plug in &dirtied {
            signals.plug_dirtied.emit(&DirtyEvent {
                plug,
                path: self.plug_path(plug),
                cause,
            });
        }
        for node in nodes {
            signals.node_dirtied.emit(&NodeEvent {
                node,
                path: self.node_path(node),
            });
        }

        dirtied
    }

    /// Owning nodes of `plugs` and all their ancestors, deepest first. Nodes
    /// at equal depth keep discovery order.
    fn dirty_nodes(&self, plugs: &[PlugId]) -> Vec<NodeId> {
        let mut nodes = IndexSet::new();
        for plug in plugs {
            let mut current = self.plug_data(*plug).map(|p| p.node);
            while let Some(node) = current {
                if !nodes.insert(node) {
                    break;
                }
                current = self.node_data(node).and_then(|n| n.parent);
            }
        }

        let mut by_depth: Vec<(usize, NodeId)> = nodes
            .into_iter()
            .map(|node| (self.node_depth(node), node))
            .collect();
        by_depth.sort_by(|a, b| b.0.cmp(&a.0));
        by_depth.into_iter().map(|(_, node)| node).collect()
    }

    fn node_depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.node_data(node).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.node_data(parent).and_then(|n| n.parent);
        }
        depth
    }
}
