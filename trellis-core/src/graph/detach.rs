//! Removing and Restoring Subtrees
//!
//! Removing a node or plug detaches the whole subtree below it: its nodes,
//! plugs, instance metadata and every connection crossing its boundary. The
//! detached state is kept in a [`DetachedSubtree`] so undo can put it back
//! exactly, with the same ids, at the same position among its siblings.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::dirty::{DirtyCause, PlugEvent};
use super::ids::{ChildId, NodeId, ParentId, PlugId};
use super::node::NodeData;
use super::plug::PlugData;
use super::storage::Graph;
use crate::error::{GraphError, Result};
use crate::metadata::{InstanceValue, Subject};
use crate::undo::Action;

/// A removed node or plug with everything below it.
#[derive(Debug, Clone)]
pub struct DetachedSubtree {
    root: ChildId,
    parent: ParentId,
    name: String,
    index: usize,
    nodes: Vec<(NodeId, NodeData)>,
    plugs: Vec<(PlugId, PlugData)>,
    /// `(downstream, source)` pairs where `downstream` lies outside the
    /// subtree and was fed by `source` inside it.
    downstream: Vec<(PlugId, PlugId)>,
    metadata: Vec<(Subject, IndexMap<String, InstanceValue>)>,
}

impl DetachedSubtree {
    pub fn root(&self) -> ChildId {
        self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Graph {
    /// Remove `node` and everything below it. The root cannot be removed.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.remove_child(node.into())
    }

    /// Remove `plug` and its children.
    pub fn remove_plug(&mut self, plug: PlugId) -> Result<()> {
        self.remove_child(plug.into())
    }

    fn remove_child(&mut self, child: ChildId) -> Result<()> {
        let subtree = self.detach(child)?;
        tracing::debug!(name = subtree.name(), "removed child");
        self.record(Action::RemoveChild {
            parent: subtree.parent,
            child,
            index: subtree.index,
            detached: Some(subtree),
        });
        Ok(())
    }

    /// Parent, name and index of `child`.
    fn locate(&self, child: ChildId) -> Result<(ParentId, String, usize)> {
        let (parent, name) = match child {
            ChildId::Node(node) => {
                let data = self.require_node_data(node)?;
                let parent = data.parent.ok_or_else(|| {
                    GraphError::Structure("the root node cannot be removed".into())
                })?;
                (ParentId::Node(parent), data.name.clone())
            }
            ChildId::Plug(plug) => {
                let data = self.require_plug_data(plug)?;
                (data.parent, data.name.clone())
            }
        };
        let index = self
            .child_index(parent, child)
            .ok_or_else(|| GraphError::Structure(format!("\"{name}\" is not a child of its parent")))?;
        Ok((parent, name, index))
    }

    /// Every node and plug in the subtree rooted at `child`.
    fn collect_subtree(&self, child: ChildId) -> (Vec<NodeId>, Vec<PlugId>) {
        let mut nodes = Vec::new();
        let mut plugs = Vec::new();
        let mut stack = vec![child];
        while let Some(current) = stack.pop() {
            match current {
                ChildId::Node(node) => {
                    nodes.push(node);
                    stack.extend(self.children(node).into_iter().rev());
                }
                ChildId::Plug(plug) => self.collect_plug_tree(plug, &mut plugs),
            }
        }
        (nodes, plugs)
    }

    /// Unlink `child` from the graph and return its state.
    pub(crate) fn detach(&mut self, child: ChildId) -> Result<DetachedSubtree> {
        let (parent, name, index) = self.locate(child)?;
        let (node_ids, plug_ids) = self.collect_subtree(child);
        let inside: HashSet<PlugId> = plug_ids.iter().copied().collect();

        let mut downstream = Vec::new();
        for &plug in &plug_ids {
            let Some(data) = self.plug_data(plug) else {
                continue;
            };
            for &output in &data.outputs {
                if !inside.contains(&output) {
                    downstream.push((output, plug));
                }
            }
        }

        // Downstream plugs lose their input before the source disappears.
        let downstream_paths: Vec<(PlugId, String)> = downstream
            .iter()
            .map(|&(out, _)| (out, self.plug_path(out)))
            .collect();
        for &(out, _) in &downstream {
            if let Some(data) = self.plug_data_mut(out) {
                data.input = None;
            }
        }

        for &plug in &plug_ids {
            let external = self.plug_data(plug).and_then(|p| p.input).filter(|i| !inside.contains(i));
            if let Some(source) = external.and_then(|s| self.plug_data_mut(s)) {
                source.outputs.shift_remove(&plug);
            }
        }

        match parent {
            ParentId::Node(node) => {
                if let Some(data) = self.node_data_mut(node) {
                    data.children.shift_remove(&name);
                }
            }
            ParentId::Plug(plug) => {
                if let Some(data) = self.plug_data_mut(plug) {
                    data.children.shift_remove(&name);
                }
            }
        }

        let mut metadata = Vec::new();
        for &node in &node_ids {
            if let Some(values) = self.metadata().take_instance_values(Subject::Node(node)) {
                metadata.push((Subject::Node(node), values));
            }
        }
        for &plug in &plug_ids {
            self.forget_hash(plug);
            if let Some(values) = self.metadata().take_instance_values(Subject::Plug(plug)) {
                metadata.push((Subject::Plug(plug), values));
            }
        }

        let nodes = node_ids
            .iter()
            .filter_map(|&id| self.take_node_data(id).map(|d| (id, d)))
            .collect();
        let plugs = plug_ids
            .iter()
            .filter_map(|&id| self.take_plug_data(id).map(|d| (id, d)))
            .collect();

        for (plug, path) in downstream_paths {
            self.signals().plug_input_changed.emit(&PlugEvent { plug, path });
        }
        let mut roots: Vec<PlugId> = downstream.iter().map(|&(out, _)| out).collect();
        if let ParentId::Plug(parent_plug) = parent {
            roots.push(parent_plug);
        }
        self.propagate_dirtiness(&roots, DirtyCause::InputChanged);

        Ok(DetachedSubtree {
            root: child,
            parent,
            name,
            index,
            nodes,
            plugs,
            downstream,
            metadata,
        })
    }

    /// Whether `subtree` can be reattached as it was.
    pub(crate) fn check_attach(&self, subtree: &DetachedSubtree) -> Result<()> {
        let taken = match subtree.parent {
            ParentId::Node(node) => self
                .node_data(node)
                .map(|d| d.children.contains_key(&subtree.name)),
            ParentId::Plug(plug) => self
                .plug_data(plug)
                .map(|d| d.children.contains_key(&subtree.name)),
        };
        match taken {
            None => {
                return Err(GraphError::Structure(format!(
                    "the parent of \"{}\" no longer exists",
                    subtree.name
                )))
            }
            Some(true) => {
                return Err(GraphError::Structure(format!(
                    "the name \"{}\" is already taken",
                    subtree.name
                )))
            }
            Some(false) => {}
        }

        let inside: HashSet<PlugId> = subtree.plugs.iter().map(|(id, _)| *id).collect();
        for (_, data) in &subtree.plugs {
            if let Some(input) = data.input.filter(|i| !inside.contains(i)) {
                if !self.contains_plug(input) {
                    return Err(GraphError::Structure(format!(
                        "the input of \"{}\" no longer exists",
                        data.name
                    )));
                }
            }
        }
        for &(out, _) in &subtree.downstream {
            match self.plug_data(out) {
                Some(data) if data.input.is_none() => {}
                Some(_) => {
                    return Err(GraphError::Structure(format!(
                        "\"{}\" has been connected elsewhere",
                        self.plug_path(out)
                    )))
                }
                None => {
                    return Err(GraphError::Structure(format!(
                        "a plug fed by \"{}\" no longer exists",
                        subtree.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Put a detached subtree back. Callers run [`Graph::check_attach`]
    /// first; any problem it would report is skipped here.
    pub(crate) fn attach(&mut self, subtree: DetachedSubtree) {
        let DetachedSubtree {
            root,
            parent,
            name,
            index,
            nodes,
            plugs,
            downstream,
            metadata,
        } = subtree;

        let inside: HashSet<PlugId> = plugs.iter().map(|(id, _)| *id).collect();
        let external_inputs: Vec<(PlugId, PlugId)> = plugs
            .iter()
            .filter_map(|(id, data)| data.input.filter(|i| !inside.contains(i)).map(|i| (*id, i)))
            .collect();

        for (id, data) in nodes {
            self.insert_node_data(id, data);
        }
        for (id, data) in plugs {
            self.insert_plug_data(id, data);
        }

        match (parent, root) {
            (ParentId::Node(node), child) => {
                if let Some(data) = self.node_data_mut(node) {
                    let index = index.min(data.children.len());
                    data.children.shift_insert(index, name, child);
                }
            }
            (ParentId::Plug(plug), ChildId::Plug(child)) => {
                if let Some(data) = self.plug_data_mut(plug) {
                    let index = index.min(data.children.len());
                    data.children.shift_insert(index, name, child);
                }
            }
            (ParentId::Plug(_), ChildId::Node(_)) => {}
        }

        for (plug, source) in external_inputs {
            if let Some(data) = self.plug_data_mut(source) {
                data.outputs.insert(plug);
            }
        }
        for &(out, source) in &downstream {
            self.rewire(out, Some(source));
        }

        for (subject, values) in metadata {
            self.metadata().restore_instance_values(subject, values);
        }

        for &(out, _) in &downstream {
            self.signals().plug_input_changed.emit(&PlugEvent {
                plug: out,
                path: self.plug_path(out),
            });
        }
        let mut roots: Vec<PlugId> = downstream.iter().map(|&(out, _)| out).collect();
        if let ChildId::Plug(plug) = root {
            roots.push(plug);
        }
        self.propagate_dirtiness(&roots, DirtyCause::InputChanged);
    }
}
