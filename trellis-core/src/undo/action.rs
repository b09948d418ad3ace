//! Undoable Actions
//!
//! Each edit to a graph records one [`Action`] holding enough state to move
//! the graph in either direction. Replaying goes through the same `apply_*`
//! paths as the original edit, so listeners see the same notifications.

use crate::error::{GraphError, Result};
use crate::graph::{ChildId, DetachedSubtree, Graph, InputChange, ParentId, PlugFlags, PlugId};
use crate::metadata::{InstanceValue, Subject};
use crate::value::Value;

/// A reversible record of one edit.
#[derive(Debug, Clone)]
pub enum Action {
    SetValue {
        plug: PlugId,
        old: Option<Value>,
        new: Option<Value>,
    },
    SetInputs {
        plug: PlugId,
        changes: Vec<InputChange>,
    },
    SetFlags {
        plug: PlugId,
        old: PlugFlags,
        new: PlugFlags,
    },
    /// A node or plug was added. `detached` holds it while undone.
    AddChild {
        parent: ParentId,
        child: ChildId,
        index: usize,
        detached: Option<DetachedSubtree>,
    },
    /// A node or plug was removed. `detached` holds it while removed.
    RemoveChild {
        parent: ParentId,
        child: ChildId,
        index: usize,
        detached: Option<DetachedSubtree>,
    },
    InstanceMetadata {
        subject: Subject,
        key: String,
        old: Option<InstanceValue>,
        new: Option<InstanceValue>,
    },
}

impl Action {
    /// Short name for log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetValue { .. } => "set_value",
            Self::SetInputs { .. } => "set_inputs",
            Self::SetFlags { .. } => "set_flags",
            Self::AddChild { .. } => "add_child",
            Self::RemoveChild { .. } => "remove_child",
            Self::InstanceMetadata { .. } => "instance_metadata",
        }
    }

    pub(crate) fn undo(&mut self, graph: &mut Graph) -> Result<()> {
        match self {
            Self::SetValue { plug, old, .. } => {
                require_plug(graph, *plug)?;
                graph.apply_value(*plug, old.clone());
            }
            Self::SetInputs { plug, changes } => {
                require_connections(graph, changes, |c| c.old)?;
                graph.apply_inputs(*plug, changes.iter().rev().map(|c| (c.plug, c.old)));
            }
            Self::SetFlags { plug, old, .. } => {
                require_plug(graph, *plug)?;
                graph.apply_flags(*plug, *old);
            }
            Self::AddChild { child, detached, .. } => {
                *detached = Some(graph.detach(*child)?);
            }
            Self::RemoveChild { detached, .. } => reattach(graph, detached)?,
            Self::InstanceMetadata {
                subject, key, old, ..
            } => {
                graph.require_subject(*subject)?;
                graph.apply_instance_metadata(*subject, key, old.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn redo(&mut self, graph: &mut Graph) -> Result<()> {
        match self {
            Self::SetValue { plug, new, .. } => {
                require_plug(graph, *plug)?;
                graph.apply_value(*plug, new.clone());
            }
            Self::SetInputs { plug, changes } => {
                require_connections(graph, changes, |c| c.new)?;
                graph.apply_inputs(*plug, changes.iter().map(|c| (c.plug, c.new)));
            }
            Self::SetFlags { plug, new, .. } => {
                require_plug(graph, *plug)?;
                graph.apply_flags(*plug, *new);
            }
            Self::AddChild { detached, .. } => reattach(graph, detached)?,
            Self::RemoveChild { child, detached, .. } => {
                *detached = Some(graph.detach(*child)?);
            }
            Self::InstanceMetadata {
                subject, key, new, ..
            } => {
                graph.require_subject(*subject)?;
                graph.apply_instance_metadata(*subject, key, new.clone());
            }
        }
        Ok(())
    }
}

fn require_plug(graph: &Graph, plug: PlugId) -> Result<()> {
    if graph.contains_plug(plug) {
        Ok(())
    } else {
        Err(GraphError::plug_not_found(format!("#{}", plug.raw())))
    }
}

fn require_connections(
    graph: &Graph,
    changes: &[InputChange],
    side: impl Fn(&InputChange) -> Option<PlugId>,
) -> Result<()> {
    for change in changes {
        require_plug(graph, change.plug)?;
        if let Some(input) = side(change) {
            require_plug(graph, input)?;
        }
    }
    Ok(())
}

fn reattach(graph: &mut Graph, detached: &mut Option<DetachedSubtree>) -> Result<()> {
    let subtree = detached
        .as_ref()
        .ok_or_else(|| GraphError::Structure("nothing to reattach".into()))?;
    graph.check_attach(subtree)?;
    if let Some(subtree) = detached.take() {
        graph.attach(subtree);
    }
    Ok(())
}
