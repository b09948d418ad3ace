//! Metadata Registry
//!
//! Metadata are key/value pairs describing nodes and plugs: descriptions,
//! layout hints, presets. Values come from two places:
//!
//! - **Type level**: registered against a node type (and, for plugs, a match
//!   pattern over plug paths). A value is either a literal or a resolver
//!   called with the node or plug being queried.
//! - **Instance level**: registered against one node or plug, with a flag
//!   saying whether serialisation should keep it.
//!
//! # Lookup
//!
//! Instance values win. Otherwise the node's type lineage is walked from the
//! most derived type to `Node`; the first type with a value for the key
//! provides it. For plugs, a type's patterns are tried in registration order.
//!
//! # Locking
//!
//! Registration tables sit behind `parking_lot` locks. Locks are always
//! released before resolvers run and before signals are emitted, so both
//! may call back into the registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::pattern::MatchPattern;
use super::types::TypeHierarchy;
use crate::graph::{NodeId, NodeView, PlugId, PlugView, TypeTag};
use crate::signal::Signal;
use crate::value::Value;

/// Key used by the description conveniences.
pub const DESCRIPTION: &str = "description";

/// Computes a node value on demand.
pub type NodeResolver = Arc<dyn Fn(NodeView<'_>) -> Option<Value> + Send + Sync>;

/// Computes a plug value on demand.
pub type PlugResolver = Arc<dyn Fn(PlugView<'_>) -> Option<Value> + Send + Sync>;

/// A type-level registration.
#[derive(Clone)]
enum Entry<R> {
    Literal(Value),
    Resolver(R),
}

#[derive(Default)]
struct TypeEntry {
    node_values: IndexMap<String, Entry<NodeResolver>>,
    plug_values: Vec<(MatchPattern, IndexMap<String, Entry<PlugResolver>>)>,
}

/// The element an instance value is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Node(NodeId),
    Plug(PlugId),
}

impl From<NodeId> for Subject {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PlugId> for Subject {
    fn from(id: PlugId) -> Self {
        Self::Plug(id)
    }
}

/// An instance-level value.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceValue {
    pub value: Value,
    /// Kept by serialisation when `true`.
    pub persistent: bool,
}

/// Query options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Walk to base types when the node's own type has no value.
    pub inherit: bool,
    /// Ignore type-level registrations.
    pub instance_only: bool,
    /// When enumerating keys, list only persistent instance values.
    pub persistent_only: bool,
}

impl Default for Lookup {
    fn default() -> Self {
        Self {
            inherit: true,
            instance_only: false,
            persistent_only: false,
        }
    }
}

impl Lookup {
    pub fn instance_only() -> Self {
        Self {
            instance_only: true,
            ..Self::default()
        }
    }

    pub fn persistent_only() -> Self {
        Self {
            instance_only: true,
            persistent_only: true,
            ..Self::default()
        }
    }

    pub fn without_inheritance() -> Self {
        Self {
            inherit: false,
            ..Self::default()
        }
    }
}

/// Emitted when a node value changes. `node` is set for instance changes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeValueChanged {
    pub node_type: TypeTag,
    pub key: String,
    pub node: Option<NodeId>,
}

/// Emitted when a plug value changes. For type-level changes `plug_path` is
/// the registered pattern; for instance changes it is the plug's path
/// relative to its node and `plug` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlugValueChanged {
    pub node_type: TypeTag,
    pub plug_path: String,
    pub key: String,
    pub plug: Option<PlugId>,
}

/// Bulk registration for one node type, see [`Metadata::register_node`].
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    node_type: TypeTag,
    values: Vec<(String, Value)>,
    plugs: Vec<(String, String, Value)>,
}

impl NodeRegistration {
    pub fn new(node_type: impl Into<TypeTag>) -> Self {
        Self {
            node_type: node_type.into(),
            values: Vec::new(),
            plugs: Vec::new(),
        }
    }

    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.push((key.to_owned(), value.into()));
        self
    }

    pub fn description(self, text: &str) -> Self {
        self.value(DESCRIPTION, text)
    }

    pub fn plug_value(mut self, pattern: &str, key: &str, value: impl Into<Value>) -> Self {
        self.plugs
            .push((pattern.to_owned(), key.to_owned(), value.into()));
        self
    }

    pub fn plug_description(self, pattern: &str, text: &str) -> Self {
        self.plug_value(pattern, DESCRIPTION, text)
    }
}

/// The metadata registry.
pub struct Metadata {
    types: TypeHierarchy,
    entries: RwLock<HashMap<TypeTag, TypeEntry>>,
    instances: DashMap<Subject, IndexMap<String, InstanceValue>>,
    pub node_value_changed: Signal<NodeValueChanged>,
    pub plug_value_changed: Signal<PlugValueChanged>,
}

impl Metadata {
    pub fn new() -> Self {
        Self {
            types: TypeHierarchy::new(),
            entries: RwLock::new(HashMap::new()),
            instances: DashMap::new(),
            node_value_changed: Signal::new("node_value_changed"),
            plug_value_changed: Signal::new("plug_value_changed"),
        }
    }

    /// The process-wide registry used by graphs built without one.
    pub fn global() -> Arc<Metadata> {
        static GLOBAL: OnceLock<Arc<Metadata>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Metadata::new())).clone()
    }

    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    // ----- type-level node values -----

    /// Register a literal node value. Re-registering a key replaces the
    /// value in place, keeping its position in enumeration order.
    pub fn register_node_value(&self, node_type: impl Into<TypeTag>, key: &str, value: impl Into<Value>) {
        self.insert_node_entry(node_type.into(), key, Entry::Literal(value.into()));
    }

    /// Register a node value computed per query.
    pub fn register_node_resolver<F>(&self, node_type: impl Into<TypeTag>, key: &str, resolver: F)
    where
        F: Fn(NodeView<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.insert_node_entry(node_type.into(), key, Entry::Resolver(Arc::new(resolver)));
    }

    fn insert_node_entry(&self, node_type: TypeTag, key: &str, entry: Entry<NodeResolver>) {
        self.entries
            .write()
            .entry(node_type.clone())
            .or_default()
            .node_values
            .insert(key.to_owned(), entry);
        self.emit_node_changed(node_type, key, None);
    }

    /// Remove a type-level node value. Returns `false` if none was registered.
    pub fn deregister_node_value(&self, node_type: impl Into<TypeTag>, key: &str) -> bool {
        let node_type = node_type.into();
        let removed = self
            .entries
            .write()
            .get_mut(&node_type)
            .and_then(|e| e.node_values.shift_remove(key))
            .is_some();
        if removed {
            self.emit_node_changed(node_type, key, None);
        }
        removed
    }

    // ----- type-level plug values -----

    /// Register a literal value for every plug whose path matches `pattern`.
    pub fn register_plug_value(
        &self,
        node_type: impl Into<TypeTag>,
        pattern: &str,
        key: &str,
        value: impl Into<Value>,
    ) {
        self.insert_plug_entry(node_type.into(), pattern, key, Entry::Literal(value.into()));
    }

    pub fn register_plug_resolver<F>(&self, node_type: impl Into<TypeTag>, pattern: &str, key: &str, resolver: F)
    where
        F: Fn(PlugView<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.insert_plug_entry(node_type.into(), pattern, key, Entry::Resolver(Arc::new(resolver)));
    }

    fn insert_plug_entry(&self, node_type: TypeTag, pattern: &str, key: &str, entry: Entry<PlugResolver>) {
        {
            let mut entries = self.entries.write();
            let plug_values = &mut entries.entry(node_type.clone()).or_default().plug_values;
            match plug_values.iter_mut().find(|(p, _)| p.as_str() == pattern) {
                Some((_, values)) => {
                    values.insert(key.to_owned(), entry);
                }
                None => {
                    let mut values = IndexMap::new();
                    values.insert(key.to_owned(), entry);
                    plug_values.push((MatchPattern::new(pattern), values));
                }
            }
        }
        self.emit_plug_changed(node_type, pattern.to_owned(), key, None);
    }

    /// Remove a type-level plug value registered under exactly `pattern`.
    pub fn deregister_plug_value(&self, node_type: impl Into<TypeTag>, pattern: &str, key: &str) -> bool {
        let node_type = node_type.into();
        let removed = {
            let mut entries = self.entries.write();
            entries
                .get_mut(&node_type)
                .and_then(|e| e.plug_values.iter_mut().find(|(p, _)| p.as_str() == pattern))
                .and_then(|(_, values)| values.shift_remove(key))
                .is_some()
        };
        if removed {
            self.emit_plug_changed(node_type, pattern.to_owned(), key, None);
        }
        removed
    }

    // ----- conveniences -----

    pub fn register_node_description(&self, node_type: impl Into<TypeTag>, text: &str) {
        self.register_node_value(node_type, DESCRIPTION, text);
    }

    /// The node's description, or an empty string.
    pub fn node_description(&self, node: NodeView<'_>) -> String {
        self.node_value(node, DESCRIPTION)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    pub fn register_plug_description(&self, node_type: impl Into<TypeTag>, pattern: &str, text: &str) {
        self.register_plug_value(node_type, pattern, DESCRIPTION, text);
    }

    /// The plug's description, or an empty string.
    pub fn plug_description(&self, plug: PlugView<'_>) -> String {
        self.plug_value(plug, DESCRIPTION)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Register many values for one type at once. String values are cleaned
    /// like docstrings: common indentation and blank edge lines are removed.
    pub fn register_node(&self, registration: NodeRegistration) {
        let NodeRegistration {
            node_type,
            values,
            plugs,
        } = registration;
        for (key, value) in values {
            self.register_node_value(node_type.clone(), &key, clean_value(value));
        }
        for (pattern, key, value) in plugs {
            self.register_plug_value(node_type.clone(), &pattern, &key, clean_value(value));
        }
    }

    // ----- queries -----

    pub fn node_value(&self, node: NodeView<'_>, key: &str) -> Option<Value> {
        self.node_value_with(node, key, Lookup::default())
    }

    pub fn node_value_with(&self, node: NodeView<'_>, key: &str, lookup: Lookup) -> Option<Value> {
        if let Some(instance) = self.instance_value(Subject::Node(node.id()), key) {
            return Some(instance.value);
        }
        if lookup.instance_only {
            return None;
        }

        let entry = {
            let entries = self.entries.read();
            self.search_lineage(&node.type_tag(), lookup.inherit, |tag| {
                entries.get(tag).and_then(|e| e.node_values.get(key)).cloned()
            })
        };
        match entry? {
            Entry::Literal(value) => Some(value),
            Entry::Resolver(resolver) => resolver(node),
        }
    }

    /// A literal type-level node value, without a node to resolve against.
    /// Resolver registrations are skipped.
    pub fn type_node_value(&self, node_type: &TypeTag, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        self.search_lineage(node_type, true, |tag| {
            match entries.get(tag).and_then(|e| e.node_values.get(key)) {
                Some(Entry::Literal(value)) => Some(value.clone()),
                _ => None,
            }
        })
    }

    pub fn plug_value(&self, plug: PlugView<'_>, key: &str) -> Option<Value> {
        self.plug_value_with(plug, key, Lookup::default())
    }

    pub fn plug_value_with(&self, plug: PlugView<'_>, key: &str, lookup: Lookup) -> Option<Value> {
        if let Some(instance) = self.instance_value(Subject::Plug(plug.id()), key) {
            return Some(instance.value);
        }
        if lookup.instance_only {
            return None;
        }
        let node = plug.node()?;
        let path = plug.relative_path();

        let entry = {
            let entries = self.entries.read();
            self.search_lineage(&node.type_tag(), lookup.inherit, |tag| {
                entries.get(tag).and_then(|e| {
                    e.plug_values
                        .iter()
                        .filter(|(pattern, _)| pattern.matches(&path))
                        .find_map(|(_, values)| values.get(key).cloned())
                })
            })
        };
        match entry? {
            Entry::Literal(value) => Some(value),
            Entry::Resolver(resolver) => resolver(plug),
        }
    }

    fn search_lineage<T>(&self, tag: &TypeTag, inherit: bool, mut find: impl FnMut(&TypeTag) -> Option<T>) -> Option<T> {
        let lineage = if inherit {
            self.types.lineage(tag)
        } else {
            vec![tag.clone()]
        };
        lineage.iter().find_map(|t| find(t))
    }

    /// Keys with values for `node`: base-type keys first, then derived-type
    /// keys, then instance keys, each group in registration order. A key
    /// registered at several levels appears once per level.
    pub fn registered_node_values(&self, node: NodeView<'_>, lookup: Lookup) -> Vec<String> {
        let mut keys = Vec::new();
        if !lookup.instance_only {
            let entries = self.entries.read();
            for tag in self.lineage_base_first(&node.type_tag(), lookup.inherit) {
                if let Some(entry) = entries.get(&tag) {
                    keys.extend(entry.node_values.keys().cloned());
                }
            }
        }
        keys.extend(self.instance_keys(Subject::Node(node.id()), lookup.persistent_only));
        keys
    }

    /// Like [`Metadata::registered_node_values`], for a plug. Within a type,
    /// matching patterns contribute in registration order.
    pub fn registered_plug_values(&self, plug: PlugView<'_>, lookup: Lookup) -> Vec<String> {
        let mut keys = Vec::new();
        if !lookup.instance_only {
            if let Some(node) = plug.node() {
                let path = plug.relative_path();
                let entries = self.entries.read();
                for tag in self.lineage_base_first(&node.type_tag(), lookup.inherit) {
                    let Some(entry) = entries.get(&tag) else {
                        continue;
                    };
                    for (pattern, values) in &entry.plug_values {
                        if pattern.matches(&path) {
                            keys.extend(values.keys().cloned());
                        }
                    }
                }
            }
        }
        keys.extend(self.instance_keys(Subject::Plug(plug.id()), lookup.persistent_only));
        keys
    }

    fn lineage_base_first(&self, tag: &TypeTag, inherit: bool) -> Vec<TypeTag> {
        if inherit {
            let mut lineage = self.types.lineage(tag);
            lineage.reverse();
            lineage
        } else {
            vec![tag.clone()]
        }
    }

    // ----- instance values -----

    pub fn instance_value(&self, subject: Subject, key: &str) -> Option<InstanceValue> {
        self.instances.get(&subject)?.get(key).cloned()
    }

    /// Instance keys of `subject` in registration order.
    pub fn instance_keys(&self, subject: Subject, persistent_only: bool) -> Vec<String> {
        self.instances
            .get(&subject)
            .map(|values| {
                values
                    .iter()
                    .filter(|(_, v)| v.persistent || !persistent_only)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Store or (with `None`) remove an instance value. Signals are emitted
    /// by the graph, which knows the subject's type.
    pub(crate) fn set_instance_value(&self, subject: Subject, key: &str, value: Option<InstanceValue>) {
        match value {
            Some(value) => {
                self.instances
                    .entry(subject)
                    .or_default()
                    .insert(key.to_owned(), value);
            }
            None => {
                let now_empty = self.instances.get_mut(&subject).is_some_and(|mut values| {
                    values.shift_remove(key);
                    values.is_empty()
                });
                if now_empty {
                    self.instances.remove_if(&subject, |_, values| values.is_empty());
                }
            }
        }
    }

    /// Remove and return every instance value of `subject`.
    pub(crate) fn take_instance_values(&self, subject: Subject) -> Option<IndexMap<String, InstanceValue>> {
        self.instances.remove(&subject).map(|(_, values)| values)
    }

    pub(crate) fn restore_instance_values(&self, subject: Subject, values: IndexMap<String, InstanceValue>) {
        if !values.is_empty() {
            self.instances.insert(subject, values);
        }
    }

    /// Forget every instance value of `subject`.
    pub fn clear_instance_metadata(&self, subject: Subject) {
        self.instances.remove(&subject);
    }

    pub(crate) fn emit_node_changed(&self, node_type: TypeTag, key: &str, node: Option<NodeId>) {
        self.node_value_changed.emit(&NodeValueChanged {
            node_type,
            key: key.to_owned(),
            node,
        });
    }

    pub(crate) fn emit_plug_changed(&self, node_type: TypeTag, plug_path: String, key: &str, plug: Option<PlugId>) {
        self.plug_value_changed.emit(&PlugValueChanged {
            node_type,
            plug_path,
            key: key.to_owned(),
            plug,
        });
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("types", &self.entries.read().len())
            .field("instances", &self.instances.len())
            .finish()
    }
}

fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(cleandoc(&s)),
        other => other,
    }
}

/// Remove common leading indentation (ignoring the first line) and drop
/// blank lines at either end.
pub fn cleandoc(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.trim_start()
            } else {
                strip_indent(l, indent)
            }
        })
        .map(str::trim_end)
        .collect();

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

/// Drop at most `indent` leading whitespace characters.
fn strip_indent(line: &str, indent: usize) -> &str {
    let start = line
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .nth(indent)
        .map_or_else(|| line.len() - line.trim_start().len(), |(i, _)| i);
    &line[start..]
}
