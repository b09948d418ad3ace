//! Writing a graph out as a [`Script`] and replaying one.

use std::collections::HashMap;

use super::statement::{Script, Statement};
use crate::error::Result;
use crate::graph::{ChildId, Graph, NodeId, ParentId, PlugFlags, PlugId, PlugSpec};
use crate::metadata::Subject;

impl Graph {
    /// Describe everything below the root as a list of statements.
    ///
    /// Statements come in dependency order: nodes depth-first with their
    /// dynamic plugs, then values that differ from the default, then
    /// persistent instance metadata, then connections, then the flags of
    /// read-only dynamic plugs. Computed plugs and
    /// plugs without [`PlugFlags::SERIALISABLE`] are skipped.
    pub fn serialise(&self) -> Script {
        let mut nodes = Vec::new();
        self.collect_nodes(self.root(), &mut nodes);

        let mut plugs = Vec::new();
        for &node in &nodes {
            for child in self.children(node) {
                if let ChildId::Plug(plug) = child {
                    self.collect_plug_tree(plug, &mut plugs);
                }
            }
        }

        let mut script = Script::new();
        let mut locked = Vec::new();
        for &node in nodes.iter().filter(|&&n| n != self.root()) {
            let (Some(parent), Ok(view)) = (self.parent_node(node), self.node_view(node)) else {
                continue;
            };
            script.push(Statement::AddNode {
                parent: self.node_path(parent),
                name: view.name().to_owned(),
                node_type: view.type_tag(),
            });
            for child in self.children(node) {
                if let ChildId::Plug(plug) = child {
                    self.dynamic_plug_statements(plug, &mut script, &mut locked);
                }
            }
        }
        for child in self.children(self.root()) {
            if let ChildId::Plug(plug) = child {
                self.dynamic_plug_statements(plug, &mut script, &mut locked);
            }
        }

        for &plug in &plugs {
            let Some(data) = self.plug_data(plug) else {
                continue;
            };
            if !data.flags.contains(PlugFlags::SERIALISABLE) || data.input.is_some() || self.is_computed(plug) {
                continue;
            }
            if let Some(value) = data.value.as_ref().filter(|v| Some(*v) != data.default.as_ref()) {
                script.push(Statement::SetValue {
                    plug: self.plug_path(plug),
                    value: value.clone(),
                });
            }
        }

        let metadata = self.metadata();
        for &node in nodes.iter().filter(|&&n| n != self.root()) {
            for key in metadata.instance_keys(Subject::Node(node), true) {
                if let Some(instance) = metadata.instance_value(Subject::Node(node), &key) {
                    script.push(Statement::NodeMetadata {
                        node: self.node_path(node),
                        key,
                        value: instance.value,
                    });
                }
            }
        }
        for &plug in &plugs {
            for key in metadata.instance_keys(Subject::Plug(plug), true) {
                if let Some(instance) = metadata.instance_value(Subject::Plug(plug), &key) {
                    script.push(Statement::PlugMetadata {
                        plug: self.plug_path(plug),
                        key,
                        value: instance.value,
                    });
                }
            }
        }

        for &plug in &plugs {
            let Some(data) = self.plug_data(plug) else {
                continue;
            };
            let Some(input) = data.input else {
                continue;
            };
            if !data.flags.contains(PlugFlags::SERIALISABLE) || self.implied_by_parent(plug, input) {
                continue;
            }
            script.push(Statement::SetInput {
                plug: self.plug_path(plug),
                input: self.plug_path(input),
            });
        }

        for plug in locked {
            if let Some(data) = self.plug_data(plug) {
                script.push(Statement::SetFlags {
                    plug: self.plug_path(plug),
                    flags: data.flags,
                });
            }
        }

        tracing::debug!(statements = script.len(), "serialised graph");
        script
    }

    fn collect_nodes(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        for child in self.child_nodes(node) {
            self.collect_nodes(child, out);
        }
    }

    /// Emit `AddPlug` for the outermost dynamic plugs under `plug`. A dynamic
    /// plug's children travel inside its spec. Specs are written unlocked;
    /// read-only plugs are pushed onto `locked` and relocked after values
    /// and connections.
    fn dynamic_plug_statements(&self, plug: PlugId, script: &mut Script, locked: &mut Vec<PlugId>) {
        let Some(data) = self.plug_data(plug) else {
            return;
        };
        if data.flags.contains(PlugFlags::DYNAMIC) {
            let parent = match data.parent {
                ParentId::Node(node) => self.node_path(node),
                ParentId::Plug(parent) => self.plug_path(parent),
            };
            if let Some(spec) = self.plug_spec(plug, locked) {
                script.push(Statement::AddPlug { parent, plug: spec });
            }
            return;
        }
        for child in self.plug_children(plug) {
            self.dynamic_plug_statements(child, script, locked);
        }
    }

    fn plug_spec(&self, plug: PlugId, locked: &mut Vec<PlugId>) -> Option<PlugSpec> {
        let data = self.plug_data(plug)?;
        if data.flags.contains(PlugFlags::READ_ONLY) {
            locked.push(plug);
        }
        let children = self
            .plug_children(plug)
            .into_iter()
            .filter_map(|child| self.plug_spec(child, locked))
            .collect();
        let mut spec = data.to_spec(children);
        spec.flags.remove(PlugFlags::DYNAMIC);
        spec.flags.remove(PlugFlags::READ_ONLY);
        Some(spec)
    }

    /// Whether `plug`'s input comes from its parent being connected to the
    /// parent of `input`, with both at the same child position.
    fn implied_by_parent(&self, plug: PlugId, input: PlugId) -> bool {
        let parent_of = |p: PlugId| match self.plug_data(p).map(|d| d.parent) {
            Some(ParentId::Plug(parent)) => Some(parent),
            _ => None,
        };
        let (Some(parent), Some(input_parent)) = (parent_of(plug), parent_of(input)) else {
            return false;
        };
        if self.input(parent) != Some(input_parent) {
            return false;
        }
        let index = self.child_index(ParentId::Plug(parent), ChildId::Plug(plug));
        index.is_some() && index == self.child_index(ParentId::Plug(input_parent), ChildId::Plug(input))
    }

    /// Replay `script` against this graph, under the root.
    ///
    /// Node names that clash with existing nodes are made unique, and later
    /// statements follow the renames. Execution stops at the first failing
    /// statement; earlier statements stay applied.
    pub fn execute(&mut self, script: &Script) -> Result<()> {
        let mut renames: HashMap<String, String> = HashMap::new();

        for statement in &script.statements {
            match statement {
                Statement::AddNode { parent, name, node_type } => {
                    let parent_path = resolve(&renames, parent);
                    let parent_node = self.node(&parent_path)?;
                    let node = self.create_node(parent_node, name, node_type)?;
                    let requested = join(&parent_path, name);
                    let actual = self.node_path(node);
                    if actual != requested {
                        tracing::debug!(requested = %requested, actual = %actual, "renamed node");
                        renames.insert(join(parent, name), actual);
                    }
                }
                Statement::AddPlug { parent, plug } => {
                    let parent = match self.descendant(&resolve(&renames, parent))? {
                        ChildId::Node(node) => ParentId::Node(node),
                        ChildId::Plug(plug) => ParentId::Plug(plug),
                    };
                    self.add_plug(parent, plug.clone())?;
                }
                Statement::SetValue { plug, value } => {
                    let plug = self.plug(&resolve(&renames, plug))?;
                    self.set_value(plug, value.clone())?;
                }
                Statement::SetInput { plug, input } => {
                    let plug = self.plug(&resolve(&renames, plug))?;
                    let input = self.plug(&resolve(&renames, input))?;
                    self.set_input(plug, Some(input))?;
                }
                Statement::NodeMetadata { node, key, value } => {
                    let node = self.node(&resolve(&renames, node))?;
                    self.register_node_metadata(node, key, Some(value.clone()), true)?;
                }
                Statement::PlugMetadata { plug, key, value } => {
                    let plug = self.plug(&resolve(&renames, plug))?;
                    self.register_plug_metadata(plug, key, Some(value.clone()), true)?;
                }
                Statement::SetFlags { plug, flags } => {
                    let plug = self.plug(&resolve(&renames, plug))?;
                    self.set_flags(plug, *flags)?;
                }
            }
        }
        Ok(())
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

/// Rewrite the longest renamed prefix of `path`.
fn resolve(renames: &HashMap<String, String>, path: &str) -> String {
    if renames.is_empty() {
        return path.to_owned();
    }
    let segments: Vec<&str> = path.split('.').collect();
    for end in (1..=segments.len()).rev() {
        let prefix = segments[..end].join(".");
        if let Some(renamed) = renames.get(&prefix) {
            let mut resolved = renamed.clone();
            for segment in &segments[end..] {
                resolved.push('.');
                resolved.push_str(segment);
            }
            return resolved;
        }
    }
    path.to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::GraphError;
    use crate::graph::Direction;
    use crate::nodes::{AddNode, BasicNode};
    use crate::value::{Value, ValueType};

    fn sample() -> Graph {
        let mut graph = Graph::new();
        let root = graph.root();
        graph.add_node(root, "a", Arc::new(AddNode)).unwrap();
        graph.add_node(root, "b", Arc::new(AddNode)).unwrap();
        graph.set_value(graph.plug("a.op1").unwrap(), 3).unwrap();
        graph
            .set_input(graph.plug("b.op1").unwrap(), Some(graph.plug("a.sum").unwrap()))
            .unwrap();
        graph
    }

    #[test]
    fn statements_are_in_dependency_order() {
        let script = sample().serialise();
        let ops: Vec<&str> = script
            .statements
            .iter()
            .map(|s| match s {
                Statement::AddNode { .. } => "add_node",
                Statement::AddPlug { .. } => "add_plug",
                Statement::SetValue { .. } => "set_value",
                Statement::SetInput { .. } => "set_input",
                Statement::NodeMetadata { .. } => "node_metadata",
                Statement::PlugMetadata { .. } => "plug_metadata",
                Statement::SetFlags { .. } => "set_flags",
            })
            .collect();
        assert_eq!(ops, ["add_node", "add_node", "set_value", "set_input"]);
    }

    #[test]
    fn execute_into_populated_graph_follows_renames() {
        let script = sample().serialise();
        let mut target = sample();
        target.execute(&script).unwrap();

        let b1_op1 = target.plug("b1.op1").unwrap();
        assert_eq!(target.input(b1_op1), Some(target.plug("a1.sum").unwrap()));
        assert_eq!(*target.get_value(target.plug("b1.sum").unwrap()).unwrap(), Value::Int(3));
    }

    #[test]
    fn compound_children_connections_are_implied() {
        let mut graph = Graph::new();
        let root = graph.root();
        let n = graph.add_node(root, "n", Arc::new(BasicNode)).unwrap();
        let m = graph.add_node(root, "m", Arc::new(BasicNode)).unwrap();
        let compound = || {
            PlugSpec::compound("c", Direction::In)
                .child(PlugSpec::input("x", ValueType::Int))
                .child(PlugSpec::input("y", ValueType::Float))
        };
        let nc = graph.add_plug(n.into(), compound()).unwrap();
        let mc = graph.add_plug(m.into(), compound()).unwrap();
        graph.set_input(mc, Some(nc)).unwrap();

        let script = graph.serialise();
        let inputs: Vec<_> = script
            .statements
            .iter()
            .filter(|s| matches!(s, Statement::SetInput { .. }))
            .collect();
        assert_eq!(inputs.len(), 1);

        let mut copy = Graph::new();
        copy.execute(&script).unwrap();
        assert_eq!(copy.input(copy.plug("m.c.y").unwrap()), Some(copy.plug("n.c.y").unwrap()));
    }

    #[test]
    fn resolve_rewrites_longest_prefix() {
        let mut renames = HashMap::new();
        renames.insert("a".to_owned(), "a1".to_owned());
        renames.insert("a.b".to_owned(), "a1.b2".to_owned());
        assert_eq!(resolve(&renames, "a.b.op1"), "a1.b2.op1");
        assert_eq!(resolve(&renames, "a.c"), "a1.c");
        assert_eq!(resolve(&renames, "z"), "z");
    }

    #[test]
    fn failing_statement_reports_error() {
        let mut graph = Graph::new();
        let script = Script {
            statements: vec![Statement::SetValue {
                plug: "missing.op1".into(),
                value: Value::Int(1),
            }],
        };
        assert!(matches!(graph.execute(&script), Err(GraphError::NotFound { .. })));
    }
}
