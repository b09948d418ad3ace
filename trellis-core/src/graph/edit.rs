//! Plug Edits
//!
//! Value and connection changes. Every edit validates fully before touching
//! the graph, then applies, notifies, propagates dirtiness and records an
//! undo action. The `apply_*` halves are shared with undo and redo, which
//! replay the same notifications without recording.

use std::collections::HashSet;

use super::dirty::{DirtyCause, PlugEvent};
use super::ids::PlugId;
use super::plug::{PlugFlags, PlugType};
use super::storage::Graph;
use crate::error::{GraphError, ReadOnlyReason, Result};
use crate::undo::Action;
use crate::value::Value;

/// One plug's input before and after a connection edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    pub plug: PlugId,
    pub old: Option<PlugId>,
    pub new: Option<PlugId>,
}

impl Graph {
    /// Store `value` on an unconnected value plug.
    ///
    /// Numeric values are converted to the plug's type. Setting the value the
    /// plug already reports does nothing.
    pub fn set_value(&mut self, plug: PlugId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let converted = self.check_writable(plug, &value)?;

        let data = self.require_plug_data(plug)?;
        if self.stored_value(data) == converted {
            return Ok(());
        }
        let old = data.value.clone();

        self.apply_value(plug, Some(converted.clone()));
        self.record(Action::SetValue {
            plug,
            old,
            new: Some(converted),
        });
        Ok(())
    }

    /// Restore `plug` (and, for compounds, every descendant) to its default.
    pub fn reset_to_default(&mut self, plug: PlugId) -> Result<()> {
        let mut tree = Vec::new();
        self.require_plug_data(plug)?;
        self.collect_plug_tree(plug, &mut tree);

        let mut resets = Vec::new();
        for leaf in tree {
            let Some(data) = self.plug_data(leaf) else {
                continue;
            };
            if data.plug_type == PlugType::Compound {
                continue;
            }
            let default = data
                .default
                .clone()
                .or_else(|| data.value_type().map(|t| t.zero()))
                .unwrap_or(Value::Bool(false));
            self.check_writable(leaf, &default)?;
            resets.push((leaf, default));
        }

        for (leaf, default) in resets {
            self.set_value(leaf, default)?;
        }
        Ok(())
    }

    /// Validate a write and return the value converted to the plug's type.
    fn check_writable(&self, plug: PlugId, value: &Value) -> Result<Value> {
        let data = self.require_plug_data(plug)?;
        let Some(value_type) = data.value_type() else {
            return Err(GraphError::TypeMismatch {
                plug: self.plug_path(plug),
                expected: PlugType::Compound.to_string(),
                found: value.value_type().to_string(),
            });
        };

        let reason = if data.input.is_some() {
            Some(ReadOnlyReason::Connected)
        } else if self.is_locked(plug) {
            Some(ReadOnlyReason::Locked)
        } else if self.is_computed(plug) {
            Some(ReadOnlyReason::Computed)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(GraphError::ReadOnly {
                plug: self.plug_path(plug),
                reason,
            });
        }

        value.convert(value_type).ok_or_else(|| GraphError::TypeMismatch {
            plug: self.plug_path(plug),
            expected: value_type.to_string(),
            found: value.value_type().to_string(),
        })
    }

    /// Store a value without validation, then notify and propagate.
    pub(crate) fn apply_value(&mut self, plug: PlugId, value: Option<Value>) {
        let Some(data) = self.plug_data_mut(plug) else {
            return;
        };
        data.value = value;

        self.signals().plug_set.emit(&PlugEvent {
            plug,
            path: self.plug_path(plug),
        });
        self.propagate_dirtiness(&[plug], DirtyCause::ValueChanged);
    }

    /// Connect `plug` to take its value from `input`, or disconnect it with
    /// `None`. Connecting compound plugs connects their children pairwise.
    pub fn set_input(&mut self, plug: PlugId, input: Option<PlugId>) -> Result<()> {
        self.require_plug_data(plug)?;
        if self.is_locked(plug) {
            return Err(GraphError::ReadOnly {
                plug: self.plug_path(plug),
                reason: ReadOnlyReason::Locked,
            });
        }

        if let Some(source) = input {
            self.require_plug_data(source)?;
            self.check_compatible(plug, source)?;
            self.check_acyclic(plug, source)?;
        }

        let mut changes = Vec::new();
        self.input_changes(plug, input, &mut changes);
        if changes.iter().all(|c| c.old == c.new) {
            return Ok(());
        }

        self.apply_inputs(plug, changes.iter().map(|c| (c.plug, c.new)));
        self.record(Action::SetInputs { plug, changes });
        Ok(())
    }

    /// Types must match, numeric types are interchangeable, and compounds
    /// need pairwise compatible children.
    fn check_compatible(&self, plug: PlugId, source: PlugId) -> Result<()> {
        let dst = self.require_plug_data(plug)?;
        let src = self.require_plug_data(source)?;

        let mismatch = || GraphError::TypeMismatch {
            plug: self.plug_path(plug),
            expected: dst.plug_type.to_string(),
            found: format!("{} from \"{}\"", src.plug_type, self.plug_path(source)),
        };

        match (dst.plug_type, src.plug_type) {
            (PlugType::Value(d), PlugType::Value(s)) if d.accepts(s) => Ok(()),
            (PlugType::Compound, PlugType::Compound) if dst.children.len() == src.children.len() => {
                for (&d, &s) in dst.children.values().zip(src.children.values()) {
                    self.check_compatible(d, s)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    /// Connecting `source` into `plug` is cyclic when `source` (or one of its
    /// children) already depends on `plug`.
    fn check_acyclic(&self, plug: PlugId, source: PlugId) -> Result<()> {
        let affected: HashSet<PlugId> = self.affected_plugs(&[plug]).into_iter().collect();
        let mut source_tree = Vec::new();
        self.collect_plug_tree(source, &mut source_tree);

        if source_tree.iter().any(|p| affected.contains(p)) {
            return Err(GraphError::Cycle {
                plug: self.plug_path(plug),
                input: self.plug_path(source),
            });
        }
        Ok(())
    }

    /// The per-plug changes implied by connecting `plug` to `input`.
    fn input_changes(&self, plug: PlugId, input: Option<PlugId>, out: &mut Vec<InputChange>) {
        out.push(InputChange {
            plug,
            old: self.input(plug),
            new: input,
        });

        let children = self.plug_children(plug);
        let sources = input.map(|i| self.plug_children(i)).unwrap_or_default();
        for (index, child) in children.into_iter().enumerate() {
            self.input_changes(child, sources.get(index).copied(), out);
        }
    }

    /// Rewire connections without validation, then notify and propagate once
    /// from `root`.
    pub(crate) fn apply_inputs(
        &mut self,
        root: PlugId,
        changes: impl IntoIterator<Item = (PlugId, Option<PlugId>)>,
    ) {
        let mut changed = Vec::new();
        for (plug, input) in changes {
            if self.rewire(plug, input) {
                changed.push(plug);
            }
        }

        for plug in changed {
            self.signals().plug_input_changed.emit(&PlugEvent {
                plug,
                path: self.plug_path(plug),
            });
        }
        self.propagate_dirtiness(&[root], DirtyCause::InputChanged);
    }

    /// Point `plug` at `input`, keeping output lists in step. Returns whether
    /// anything changed.
    pub(crate) fn rewire(&mut self, plug: PlugId, input: Option<PlugId>) -> bool {
        let Some(data) = self.plug_data_mut(plug) else {
            return false;
        };
        let old = data.input;
        if old == input {
            return false;
        }
        data.input = input;

        if let Some(old) = old.and_then(|o| self.plug_data_mut(o)) {
            old.outputs.shift_remove(&plug);
        }
        if let Some(new) = input.and_then(|i| self.plug_data_mut(i)) {
            new.outputs.insert(plug);
        }
        true
    }

    /// Replace a plug's flags. Locking is undoable like any other edit.
    pub fn set_flags(&mut self, plug: PlugId, flags: PlugFlags) -> Result<()> {
        let data = self.require_plug_data(plug)?;
        let old = data.flags;
        if old == flags {
            return Ok(());
        }
        self.apply_flags(plug, flags);
        self.record(Action::SetFlags { plug, old, new: flags });
        Ok(())
    }

    pub(crate) fn apply_flags(&mut self, plug: PlugId, flags: PlugFlags) {
        if let Some(data) = self.plug_data_mut(plug) {
            data.flags = flags;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compute::Context;
    use crate::graph::{Direction, PlugSpec};
    use crate::nodes::{AddNode, BasicNode};
    use crate::value::ValueType;

    #[test]
    fn set_value_converts_numbers() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let op1 = graph.plug("add.op1").unwrap();

        graph.set_value(op1, 2.9).unwrap();
        assert_eq!(*graph.get_value(op1).unwrap(), Value::Int(2));
    }

    #[test]
    fn set_value_rejects_wrong_type() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let op1 = graph.plug("add.op1").unwrap();

        assert!(matches!(
            graph.set_value(op1, "two"),
            Err(GraphError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn computed_and_locked_plugs_are_read_only() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let sum = graph.plug("add.sum").unwrap();
        let op2 = graph.plug("add.op2").unwrap();

        assert!(matches!(
            graph.set_value(sum, 1),
            Err(GraphError::ReadOnly { reason: ReadOnlyReason::Computed, .. })
        ));

        graph.set_flags(op2, PlugFlags::default() | PlugFlags::READ_ONLY).unwrap();
        assert!(matches!(
            graph.set_value(op2, 1),
            Err(GraphError::ReadOnly { reason: ReadOnlyReason::Locked, .. })
        ));
    }

    #[test]
    fn identical_value_is_a_no_op() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let op1 = graph.plug("add.op1").unwrap();

        let count = Arc::new(parking_lot::Mutex::new(0));
        let c = count.clone();
        graph.signals().plug_set.observe(move |_| *c.lock() += 1);

        graph.set_value(op1, 0).unwrap();
        assert_eq!(*count.lock(), 0);
        graph.set_value(op1, 5).unwrap();
        graph.set_value(op1, 5).unwrap();
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn incompatible_connection_is_rejected() {
        let mut graph = Graph::new();
        let node = graph.add_node(graph.root(), "n", Arc::new(BasicNode)).unwrap();
        let s = graph
            .add_plug(node.into(), PlugSpec::output("s", ValueType::String))
            .unwrap();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let op1 = graph.plug("add.op1").unwrap();

        assert!(matches!(
            graph.set_input(op1, Some(s)),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert_eq!(graph.input(op1), None);
    }

    #[test]
    fn feedback_loop_is_a_cycle() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "a", Arc::new(AddNode)).unwrap();
        graph.add_node(graph.root(), "b", Arc::new(AddNode)).unwrap();
        let a_sum = graph.plug("a.sum").unwrap();
        let b_op1 = graph.plug("b.op1").unwrap();
        graph.set_input(b_op1, Some(a_sum)).unwrap();

        let a_op1 = graph.plug("a.op1").unwrap();
        let b_sum = graph.plug("b.sum").unwrap();
        assert!(matches!(
            graph.set_input(a_op1, Some(b_sum)),
            Err(GraphError::Cycle { .. })
        ));
        assert!(matches!(
            graph.set_input(a_op1, Some(a_sum)),
            Err(GraphError::Cycle { .. })
        ));
        assert_eq!(graph.input(a_op1), None);
    }

    #[test]
    fn compound_connection_connects_children() {
        let mut graph = Graph::new();
        let node = graph.add_node(graph.root(), "n", Arc::new(BasicNode)).unwrap();
        let make = |name: &str| {
            PlugSpec::compound(name, Direction::In)
                .child(PlugSpec::input("x", ValueType::Float))
                .child(PlugSpec::input("y", ValueType::Int))
        };
        let src = graph.add_plug(node.into(), make("src")).unwrap();
        let dst = graph.add_plug(node.into(), make("dst")).unwrap();

        graph.set_input(dst, Some(src)).unwrap();
        let dst_y = graph.plug("n.dst.y").unwrap();
        assert_eq!(graph.input(dst_y), Some(graph.plug("n.src.y").unwrap()));

        graph.set_value(graph.plug("n.src.y").unwrap(), 3).unwrap();
        assert_eq!(*graph.value(dst_y, &Context::default()).unwrap(), Value::Int(3));

        graph.set_input(dst, None).unwrap();
        assert_eq!(graph.input(dst_y), None);
        assert!(graph.outputs(src).is_empty());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut graph = Graph::new();
        let node = graph.add_node(graph.root(), "n", Arc::new(BasicNode)).unwrap();
        let plug = graph
            .add_plug(node.into(), PlugSpec::input("f", ValueType::Float).with_default(1.5))
            .unwrap();

        graph.set_value(plug, 4.0).unwrap();
        graph.reset_to_default(plug).unwrap();
        assert_eq!(*graph.get_value(plug).unwrap(), Value::Float(1.5));
    }
}
