//! Instance Metadata
//!
//! Per-node and per-plug metadata goes through the graph so that it is
//! validated against live elements, recorded for undo, and announced with
//! the subject's type attached.

use super::ids::{NodeId, PlugId};
use super::storage::Graph;
use crate::error::Result;
use crate::metadata::{InstanceValue, Lookup, Subject};
use crate::undo::Action;
use crate::value::Value;

impl Graph {
    /// Set (or with `None`, remove) an instance value on `node`.
    ///
    /// Registering the value and persistence already stored is a no-op.
    pub fn register_node_metadata(
        &mut self,
        node: NodeId,
        key: &str,
        value: Option<Value>,
        persistent: bool,
    ) -> Result<()> {
        self.require_node_data(node)?;
        self.change_instance_metadata(Subject::Node(node), key, value, persistent);
        Ok(())
    }

    /// Set (or with `None`, remove) an instance value on `plug`.
    pub fn register_plug_metadata(
        &mut self,
        plug: PlugId,
        key: &str,
        value: Option<Value>,
        persistent: bool,
    ) -> Result<()> {
        self.require_plug_data(plug)?;
        self.change_instance_metadata(Subject::Plug(plug), key, value, persistent);
        Ok(())
    }

    fn change_instance_metadata(&mut self, subject: Subject, key: &str, value: Option<Value>, persistent: bool) {
        let new = value.map(|value| InstanceValue { value, persistent });
        let old = self.metadata().instance_value(subject, key);
        if old == new {
            return;
        }
        self.apply_instance_metadata(subject, key, new.clone());
        self.record(Action::InstanceMetadata {
            subject,
            key: key.to_owned(),
            old,
            new,
        });
    }

    /// Store without recording, then notify.
    pub(crate) fn apply_instance_metadata(&self, subject: Subject, key: &str, value: Option<InstanceValue>) {
        let metadata = self.metadata();
        metadata.set_instance_value(subject, key, value);

        match subject {
            Subject::Node(node) => {
                let node_type = self.node_view_unchecked(node).type_tag();
                metadata.emit_node_changed(node_type, key, Some(node));
            }
            Subject::Plug(plug) => {
                let Some(owner) = self.plug_node(plug) else {
                    return;
                };
                let node_type = self.node_view_unchecked(owner).type_tag();
                metadata.emit_plug_changed(node_type, self.plug_relative_path(plug), key, Some(plug));
            }
        }
    }

    pub(crate) fn require_subject(&self, subject: Subject) -> Result<()> {
        match subject {
            Subject::Node(node) => self.require_node_data(node).map(|_| ()),
            Subject::Plug(plug) => self.require_plug_data(plug).map(|_| ()),
        }
    }

    /// Metadata value for `node`: instance, then type lineage.
    pub fn node_metadata(&self, node: NodeId, key: &str) -> Result<Option<Value>> {
        let view = self.node_view(node)?;
        Ok(self.metadata().node_value(view, key))
    }

    /// Metadata value for `plug`: instance, then matching type patterns.
    pub fn plug_metadata(&self, plug: PlugId, key: &str) -> Result<Option<Value>> {
        let view = self.plug_view(plug)?;
        Ok(self.metadata().plug_value(view, key))
    }

    pub fn node_metadata_keys(&self, node: NodeId, lookup: Lookup) -> Result<Vec<String>> {
        let view = self.node_view(node)?;
        Ok(self.metadata().registered_node_values(view, lookup))
    }

    pub fn plug_metadata_keys(&self, plug: PlugId, lookup: Lookup) -> Result<Vec<String>> {
        let view = self.plug_view(plug)?;
        Ok(self.metadata().registered_plug_values(view, lookup))
    }

    /// Remove every instance value on `subject`, undoably.
    pub fn clear_instance_metadata(&mut self, subject: Subject) -> Result<()> {
        self.require_subject(subject)?;
        for key in self.metadata().instance_keys(subject, false) {
            self.change_instance_metadata(subject, &key, None, false);
        }
        Ok(())
    }
}
