//! Graph Storage
//!
//! The [`Graph`] owns every node and plug in two arenas keyed by id. Parents
//! own their children through ordered name maps; inputs and outputs are
//! non-owning ids, so removing an element never leaves a dangling reference
//! as long as the connection bookkeeping is kept in step.
//!
//! Paths are `.`-joined names from (but excluding) the root node, so the
//! plug `op1` on the top-level node `add` has the path `"add.op1"`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

use super::dirty::{DirtyCause, DirtyEvent, NodeEvent, PlugEvent};
use super::ids::{ChildId, NodeId, ParentId, PlugId};
use super::node::{unique_name, NodeData};
use super::node_type::{NodeType, NodeTypeRegistry, TypeTag};
use super::plug::{Direction, PlugData, PlugFlags, PlugSpec, PlugType};
use super::view::{NodeView, PlugView};
use crate::compute::{PlugHash, ValueCache};
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::metadata::Metadata;
use crate::nodes::ScriptNode;
use crate::signal::Signal;
use crate::undo::{Action, UndoStack};
use crate::value::Value;

/// Memoised hashes for one plug, keyed by context hash.
pub(crate) type HashMemo = SmallVec<[(PlugHash, PlugHash); 2]>;

/// Listener lists owned by a graph.
#[derive(Debug)]
pub struct GraphSignals {
    /// One event per dirtied plug, in discovery order.
    pub plug_dirtied: Signal<DirtyEvent>,
    /// One event per node containing a dirtied plug, deepest first.
    pub node_dirtied: Signal<NodeEvent>,
    /// A plug's stored value was changed.
    pub plug_set: Signal<PlugEvent>,
    /// A plug's input connection was changed.
    pub plug_input_changed: Signal<PlugEvent>,
}

impl Default for GraphSignals {
    fn default() -> Self {
        Self {
            plug_dirtied: Signal::new("plug_dirtied"),
            node_dirtied: Signal::new("node_dirtied"),
            plug_set: Signal::new("plug_set"),
            plug_input_changed: Signal::new("plug_input_changed"),
        }
    }
}

/// A tree of nodes and their connected plugs.
pub struct Graph {
    config: EngineConfig,
    root: NodeId,
    nodes: HashMap<NodeId, NodeData>,
    plugs: HashMap<PlugId, PlugData>,
    node_types: NodeTypeRegistry,
    metadata: Arc<Metadata>,
    cache: Arc<ValueCache>,
    signals: GraphSignals,
    pub(crate) history: UndoStack,
    pub(crate) hash_memo: DashMap<PlugId, HashMemo>,
}

/// Builder for graphs that share a metadata registry or value cache.
#[derive(Default)]
pub struct GraphBuilder {
    config: EngineConfig,
    metadata: Option<Arc<Metadata>>,
    cache: Option<Arc<ValueCache>>,
    node_types: Vec<Arc<dyn NodeType>>,
}

impl GraphBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `metadata` instead of [`Metadata::global`].
    pub fn metadata(mut self, metadata: Arc<Metadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Share `cache` with other graphs instead of creating a private one.
    pub fn cache(mut self, cache: Arc<ValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Make `node_type` constructible by tag, in addition to the built-ins.
    pub fn node_type(mut self, node_type: Arc<dyn NodeType>) -> Self {
        self.node_types.push(node_type);
        self
    }

    pub fn build(self) -> Graph {
        let metadata = self.metadata.unwrap_or_else(Metadata::global);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ValueCache::new(self.config.cache_memory_limit)));

        let mut node_types = NodeTypeRegistry::with_builtins();
        for node_type in self.node_types {
            node_types.register(node_type);
        }
        for tag in node_types.tags() {
            if let Ok(node_type) = node_types.get(&tag) {
                metadata.types().declare(&tag, node_type.base_type());
            }
        }

        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(root, NodeData::new("root".into(), None, Arc::new(ScriptNode)));

        Graph {
            history: UndoStack::new(self.config.undo_depth),
            config: self.config,
            root,
            nodes,
            plugs: HashMap::new(),
            node_types,
            metadata,
            cache,
            signals: GraphSignals::default(),
            hash_memo: DashMap::new(),
        }
    }
}

impl Graph {
    /// An empty graph with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The root node. It has no name in paths and cannot be removed.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn cache(&self) -> &Arc<ValueCache> {
        &self.cache
    }

    pub fn signals(&self) -> &GraphSignals {
        &self.signals
    }

    pub fn node_types(&self) -> &NodeTypeRegistry {
        &self.node_types
    }

    /// Make `node_type` constructible by tag.
    pub fn register_node_type(&mut self, node_type: Arc<dyn NodeType>) {
        let tag = node_type.type_tag();
        self.metadata.types().declare(&tag, node_type.base_type());
        self.node_types.register(node_type);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn plug_count(&self) -> usize {
        self.plugs.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn contains_plug(&self, plug: PlugId) -> bool {
        self.plugs.contains_key(&plug)
    }

    // ----- views -----

    pub fn node_view(&self, node: NodeId) -> Result<NodeView<'_>> {
        if self.nodes.contains_key(&node) {
            Ok(NodeView::new(self, node))
        } else {
            Err(GraphError::node_not_found(format!("#{}", node.raw())))
        }
    }

    pub fn plug_view(&self, plug: PlugId) -> Result<PlugView<'_>> {
        if self.plugs.contains_key(&plug) {
            Ok(PlugView::new(self, plug))
        } else {
            Err(GraphError::plug_not_found(format!("#{}", plug.raw())))
        }
    }

    pub(crate) fn node_view_unchecked(&self, node: NodeId) -> NodeView<'_> {
        NodeView::new(self, node)
    }

    pub(crate) fn node_data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(&node)
    }

    pub(crate) fn plug_data(&self, plug: PlugId) -> Option<&PlugData> {
        self.plugs.get(&plug)
    }

    pub(crate) fn node_data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(&node)
    }

    pub(crate) fn plug_data_mut(&mut self, plug: PlugId) -> Option<&mut PlugData> {
        self.plugs.get_mut(&plug)
    }

    pub(crate) fn require_node_data(&self, node: NodeId) -> Result<&NodeData> {
        self.nodes
            .get(&node)
            .ok_or_else(|| GraphError::node_not_found(format!("#{}", node.raw())))
    }

    pub(crate) fn require_plug_data(&self, plug: PlugId) -> Result<&PlugData> {
        self.plugs
            .get(&plug)
            .ok_or_else(|| GraphError::plug_not_found(format!("#{}", plug.raw())))
    }

    pub(crate) fn insert_node_data(&mut self, node: NodeId, data: NodeData) {
        self.nodes.insert(node, data);
    }

    pub(crate) fn insert_plug_data(&mut self, plug: PlugId, data: PlugData) {
        self.plugs.insert(plug, data);
    }

    pub(crate) fn take_node_data(&mut self, node: NodeId) -> Option<NodeData> {
        self.nodes.remove(&node)
    }

    pub(crate) fn take_plug_data(&mut self, plug: PlugId) -> Option<PlugData> {
        self.plugs.remove(&plug)
    }

    // ----- names and paths -----

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    pub fn plug_name(&self, plug: PlugId) -> Option<&str> {
        self.plugs.get(&plug).map(|p| p.name.as_str())
    }

    /// Path of `node` from the root; empty for the root itself.
    pub fn node_path(&self, node: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(data) = self.nodes.get(&id) else {
                break;
            };
            if data.parent.is_none() {
                break;
            }
            names.push(data.name.as_str());
            current = data.parent;
        }
        names.reverse();
        names.join(".")
    }

    /// Path of `plug` relative to its node, e.g. `"c.x"`.
    pub fn plug_relative_path(&self, plug: PlugId) -> String {
        let mut names = Vec::new();
        let mut current = Some(plug);
        while let Some(id) = current {
            let Some(data) = self.plugs.get(&id) else {
                break;
            };
            names.push(data.name.as_str());
            current = match data.parent {
                ParentId::Plug(parent) => Some(parent),
                ParentId::Node(_) => None,
            };
        }
        names.reverse();
        names.join(".")
    }

    /// Full path of `plug` from the root, e.g. `"add1.op1"`.
    pub fn plug_path(&self, plug: PlugId) -> String {
        let relative = self.plug_relative_path(plug);
        let node_path = self
            .plugs
            .get(&plug)
            .map(|p| self.node_path(p.node))
            .unwrap_or_default();
        if node_path.is_empty() {
            relative
        } else {
            format!("{node_path}.{relative}")
        }
    }

    // ----- lookup -----

    /// Resolve a path from the root to a node or plug.
    pub fn descendant(&self, path: &str) -> Result<ChildId> {
        if path.is_empty() {
            return Ok(ChildId::Node(self.root));
        }

        let mut current = ChildId::Node(self.root);
        for name in path.split('.') {
            let next = match current {
                ChildId::Node(node) => self
                    .nodes
                    .get(&node)
                    .and_then(|n| n.children.get(name))
                    .copied(),
                ChildId::Plug(plug) => self
                    .plugs
                    .get(&plug)
                    .and_then(|p| p.children.get(name))
                    .map(|&p| ChildId::Plug(p)),
            };
            current = next.ok_or_else(|| GraphError::NotFound {
                kind: "descendant",
                path: path.to_owned(),
            })?;
        }
        Ok(current)
    }

    /// Resolve a node path. The empty path is the root.
    pub fn node(&self, path: &str) -> Result<NodeId> {
        match self.descendant(path) {
            Ok(ChildId::Node(node)) => Ok(node),
            _ => Err(GraphError::node_not_found(path)),
        }
    }

    /// Resolve a full plug path such as `"add1.op1"`.
    pub fn plug(&self, path: &str) -> Result<PlugId> {
        match self.descendant(path) {
            Ok(ChildId::Plug(plug)) => Ok(plug),
            _ => Err(GraphError::plug_not_found(path)),
        }
    }

    /// Resolve a plug path relative to `node`.
    pub fn plug_of(&self, node: NodeId, path: &str) -> Option<PlugId> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut plug = match self.nodes.get(&node)?.children.get(first)? {
            ChildId::Plug(plug) => *plug,
            ChildId::Node(_) => return None,
        };
        for name in segments {
            plug = *self.plugs.get(&plug)?.children.get(name)?;
        }
        Some(plug)
    }

    /// Direct children of `node`, plugs and nodes interleaved in order.
    pub fn children(&self, node: NodeId) -> Vec<ChildId> {
        self.nodes
            .get(&node)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter_map(|c| match c {
                ChildId::Node(n) => Some(n),
                ChildId::Plug(_) => None,
            })
            .collect()
    }

    /// Child plugs of a compound plug, in order.
    pub fn plug_children(&self, plug: PlugId) -> Vec<PlugId> {
        self.plugs
            .get(&plug)
            .map(|p| p.children.values().copied().collect())
            .unwrap_or_default()
    }

    /// Push `plug` and all its descendants onto `out`, parents first.
    pub(crate) fn collect_plug_tree(&self, plug: PlugId, out: &mut Vec<PlugId>) {
        out.push(plug);
        if let Some(data) = self.plugs.get(&plug) {
            for &child in data.children.values() {
                self.collect_plug_tree(child, out);
            }
        }
    }

    pub fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    /// The node that owns `plug`.
    pub fn plug_node(&self, plug: PlugId) -> Option<NodeId> {
        self.plugs.get(&plug).map(|p| p.node)
    }

    /// The plug `plug` takes its value from.
    pub fn input(&self, plug: PlugId) -> Option<PlugId> {
        self.plugs.get(&plug)?.input
    }

    /// Plugs taking their value from `plug`, in connection order.
    pub fn outputs(&self, plug: PlugId) -> Vec<PlugId> {
        self.plugs
            .get(&plug)
            .map(|p| p.outputs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The end of `plug`'s input chain.
    pub fn source(&self, plug: PlugId) -> PlugId {
        let mut current = plug;
        while let Some(input) = self.input(current) {
            current = input;
        }
        current
    }

    /// Whether `plug` or any parent plug carries [`PlugFlags::READ_ONLY`].
    pub fn is_locked(&self, plug: PlugId) -> bool {
        let mut current = Some(plug);
        while let Some(id) = current {
            let Some(data) = self.plugs.get(&id) else {
                return false;
            };
            if data.flags.contains(PlugFlags::READ_ONLY) {
                return true;
            }
            current = match data.parent {
                ParentId::Plug(parent) => Some(parent),
                ParentId::Node(_) => None,
            };
        }
        false
    }

    /// Whether `plug`'s value is produced by its node's compute step.
    pub fn is_computed(&self, plug: PlugId) -> bool {
        let Some(data) = self.plugs.get(&plug) else {
            return false;
        };
        if data.direction != Direction::Out || data.plug_type == PlugType::Compound {
            return false;
        }
        self.nodes
            .get(&data.node)
            .is_some_and(|n| n.node_type.is_computed(NodeView::new(self, data.node), plug))
    }

    /// The value an unconnected, uncomputed plug reports.
    pub(crate) fn stored_value(&self, plug: &PlugData) -> Value {
        plug.value
            .clone()
            .or_else(|| plug.default.clone())
            .or_else(|| plug.value_type().map(|t| t.zero()))
            .unwrap_or(Value::Bool(false))
    }

    pub(crate) fn record(&mut self, action: Action) {
        self.history.record(action);
    }

    // ----- construction -----

    /// Add a node of `node_type` under `parent`.
    ///
    /// A name already used by a sibling is made unique by bumping a trailing
    /// number; `.` is not allowed in names and is replaced by `_`.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: &str,
        node_type: Arc<dyn NodeType>,
    ) -> Result<NodeId> {
        let parent_data = self.require_node_data(parent)?;
        let tag = node_type.type_tag();
        let name = unique_name(&parent_data.children, &sanitise_name(name, tag.as_str()));

        let specs = node_type.plugs();
        for spec in &specs {
            self.validate_spec(spec)?;
        }

        if !self.node_types.contains(&tag) {
            self.register_node_type(node_type.clone());
        } else {
            self.metadata.types().declare(&tag, node_type.base_type());
        }

        let id = NodeId::new();
        self.nodes
            .insert(id, NodeData::new(name.clone(), Some(parent), node_type));
        let index = self.attach_child_name(ParentId::Node(parent), name.clone(), id.into());

        for spec in specs {
            self.build_plug(id, ParentId::Node(id), spec, PlugFlags::NONE);
        }

        tracing::debug!(node = %self.node_path(id), node_type = %tag, "added node");
        self.record(Action::AddChild {
            parent: ParentId::Node(parent),
            child: id.into(),
            index,
            detached: None,
        });
        Ok(id)
    }

    /// Add a node of a registered type, looked up by tag.
    pub fn create_node(&mut self, parent: NodeId, name: &str, tag: &TypeTag) -> Result<NodeId> {
        let node_type = self.node_types.get(tag)?;
        self.add_node(parent, name, node_type)
    }

    /// Add a dynamic plug under a node or compound plug.
    ///
    /// The plug and its children are flagged [`PlugFlags::DYNAMIC`] so that
    /// serialisation recreates them.
    pub fn add_plug(&mut self, parent: ParentId, spec: PlugSpec) -> Result<PlugId> {
        let (node, taken) = match parent {
            ParentId::Node(node) => {
                let data = self.require_node_data(node)?;
                (node, data.children.contains_key(&spec.name))
            }
            ParentId::Plug(plug) => {
                let data = self.require_plug_data(plug)?;
                if data.plug_type != PlugType::Compound {
                    return Err(GraphError::Structure(format!(
                        "\"{}\" is not a compound plug",
                        self.plug_path(plug)
                    )));
                }
                (data.node, data.children.contains_key(&spec.name))
            }
        };
        self.validate_spec(&spec)?;

        let mut spec = spec;
        if taken || spec.name.is_empty() || spec.name.contains('.') {
            let base = sanitise_name(&spec.name, "plug");
            spec.name = match parent {
                ParentId::Node(n) => self.nodes.get(&n).map(|d| unique_name(&d.children, &base)),
                ParentId::Plug(p) => self.plugs.get(&p).map(|d| unique_name(&d.children, &base)),
            }
            .unwrap_or(base);
        }

        let id = self.build_plug(node, parent, spec, PlugFlags::DYNAMIC);
        let index = self.child_index(parent, id.into()).unwrap_or(0);

        self.record(Action::AddChild {
            parent,
            child: id.into(),
            index,
            detached: None,
        });
        self.propagate_dirtiness(&[id], DirtyCause::ValueChanged);
        Ok(id)
    }

    /// Check that defaults match plug types, recursively.
    fn validate_spec(&self, spec: &PlugSpec) -> Result<()> {
        match spec.plug_type {
            PlugType::Value(value_type) => {
                if let Some(default) = &spec.default {
                    if !value_type.accepts(default.value_type()) {
                        return Err(GraphError::TypeMismatch {
                            plug: spec.name.clone(),
                            expected: value_type.to_string(),
                            found: default.value_type().to_string(),
                        });
                    }
                }
                if !spec.children.is_empty() {
                    return Err(GraphError::Structure(format!(
                        "value plug \"{}\" cannot have children",
                        spec.name
                    )));
                }
            }
            PlugType::Compound => {
                for child in &spec.children {
                    self.validate_spec(child)?;
                }
            }
        }
        Ok(())
    }

    /// Create a validated plug tree. Never fails once validated.
    fn build_plug(&mut self, node: NodeId, parent: ParentId, spec: PlugSpec, extra: PlugFlags) -> PlugId {
        let id = PlugId::new();
        let default = match (spec.plug_type, spec.default) {
            (PlugType::Value(t), Some(default)) => default.convert(t),
            (PlugType::Value(t), None) => Some(t.zero()),
            (PlugType::Compound, _) => None,
        };

        self.plugs.insert(
            id,
            PlugData {
                name: spec.name.clone(),
                node,
                parent,
                direction: spec.direction,
                plug_type: spec.plug_type,
                flags: spec.flags | extra,
                default,
                value: None,
                children: Default::default(),
                input: None,
                outputs: Default::default(),
            },
        );
        self.attach_child_name(parent, spec.name, id.into());

        for child in spec.children {
            self.build_plug(node, ParentId::Plug(id), child, extra);
        }
        id
    }

    /// Append `child` to `parent`'s child map, returning its index.
    fn attach_child_name(&mut self, parent: ParentId, name: String, child: ChildId) -> usize {
        match (parent, child) {
            (ParentId::Node(node), child) => self
                .nodes
                .get_mut(&node)
                .map(|n| n.children.insert_full(name, child).0)
                .unwrap_or(0),
            (ParentId::Plug(plug), ChildId::Plug(child)) => self
                .plugs
                .get_mut(&plug)
                .map(|p| p.children.insert_full(name, child).0)
                .unwrap_or(0),
            (ParentId::Plug(_), ChildId::Node(_)) => 0,
        }
    }

    /// Position of `child` within `parent`'s children.
    pub(crate) fn child_index(&self, parent: ParentId, child: ChildId) -> Option<usize> {
        match (parent, child) {
            (ParentId::Node(node), child) => {
                self.nodes.get(&node)?.children.values().position(|c| *c == child)
            }
            (ParentId::Plug(plug), ChildId::Plug(child)) => {
                self.plugs.get(&plug)?.children.values().position(|c| *c == child)
            }
            (ParentId::Plug(_), ChildId::Node(_)) => None,
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("plugs", &self.plugs.len())
            .field("history", &self.history)
            .finish()
    }
}

/// Replace characters that would break paths; fall back to `fallback` for
/// empty names.
fn sanitise_name(name: &str, fallback: &str) -> String {
    let name = if name.is_empty() { fallback } else { name };
    name.replace('.', "_")
}
