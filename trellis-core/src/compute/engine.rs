//! Evaluation
//!
//! Pull-based evaluation over a shared `&Graph`. Reading a plug follows its
//! input chain; computed outputs are hashed and looked up in the value
//! cache, and only computed on a miss. Nothing here mutates the graph, so
//! any number of threads may evaluate at once.

use std::sync::Arc;

use super::context::{Context, Process, ProcessKind};
use super::hash::{PlugHash, PlugHasher};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeView, PlugId, PlugType};
use crate::value::Value;

/// Context hashes memoised per plug before the oldest is dropped.
const MEMO_CONTEXTS_PER_PLUG: usize = 16;

impl Graph {
    /// Content hash of `plug` in `context`.
    ///
    /// - A connected plug hashes as its input (plus the conversion, if the
    ///   types differ).
    /// - A compound plug hashes its children.
    /// - A computed output hashes its node type, its path on the node, the
    ///   context and whatever [`crate::graph::NodeType::hash`] appends.
    /// - Any other plug hashes its stored value.
    pub fn hash(&self, plug: PlugId, context: &Context) -> Result<PlugHash> {
        self.require_plug_data(plug)?;
        let context_hash = context.hash();

        if self.config().hash_memo {
            if let Some(memo) = self.hash_memo.get(&plug) {
                if let Some((_, hash)) = memo.iter().find(|(c, _)| *c == context_hash) {
                    return Ok(*hash);
                }
            }
        }

        let _process = Process::enter(ProcessKind::Hash, plug, context_hash)
            .ok_or_else(|| self.reentry_error(plug))?;
        let hash = self.compute_hash(plug, context, context_hash)?;

        if self.config().hash_memo {
            let mut memo = self.hash_memo.entry(plug).or_default();
            if memo.len() >= MEMO_CONTEXTS_PER_PLUG {
                memo.remove(0);
            }
            memo.push((context_hash, hash));
        }
        Ok(hash)
    }

    fn compute_hash(&self, plug: PlugId, context: &Context, context_hash: PlugHash) -> Result<PlugHash> {
        let data = self.require_plug_data(plug)?;
        let mut hasher = PlugHasher::new();

        if let Some(input) = data.input {
            let input_hash = self.hash(input, context)?;
            let input_type = self.require_plug_data(input)?.plug_type;
            if input_type == data.plug_type {
                return Ok(input_hash);
            }
            hasher.append_str("convert");
            hasher.append_str(&data.plug_type.to_string());
            hasher.append_hash(&input_hash);
            return Ok(hasher.finish());
        }

        if data.plug_type == PlugType::Compound {
            hasher.append_str("compound");
            hasher.append_len(data.children.len());
            for &child in data.children.values() {
                hasher.append_hash(&self.hash(child, context)?);
            }
            return Ok(hasher.finish());
        }

        if self.is_computed(plug) {
            let node = NodeView::new(self, data.node);
            hasher.append_str(node.type_tag().as_str());
            hasher.append_str(&self.plug_relative_path(plug));
            hasher.append_hash(&context_hash);
            node.node_type().hash(node, plug, context, &mut hasher)?;
            return Ok(hasher.finish());
        }

        self.stored_value(data).hash_into(&mut hasher);
        Ok(hasher.finish())
    }

    /// Value of `plug` in `context`.
    ///
    /// Connected plugs read through their input, converting numeric types.
    /// Computed outputs go through the value cache. Compound plugs have no
    /// value and fail with [`GraphError::TypeMismatch`].
    pub fn value(&self, plug: PlugId, context: &Context) -> Result<Arc<Value>> {
        let data = self.require_plug_data(plug)?;
        let Some(value_type) = data.value_type() else {
            return Err(GraphError::TypeMismatch {
                plug: self.plug_path(plug),
                expected: "a value plug".into(),
                found: PlugType::Compound.to_string(),
            });
        };

        if let Some(input) = data.input {
            let value = self.value(input, context)?;
            if value.value_type() == value_type {
                return Ok(value);
            }
            return value
                .convert(value_type)
                .map(Arc::new)
                .ok_or_else(|| GraphError::TypeMismatch {
                    plug: self.plug_path(plug),
                    expected: value_type.to_string(),
                    found: value.value_type().to_string(),
                });
        }

        if !self.is_computed(plug) {
            return Ok(Arc::new(self.stored_value(data)));
        }

        let _process = Process::enter(ProcessKind::Compute, plug, context.hash())
            .ok_or_else(|| self.reentry_error(plug))?;
        let hash = self.hash(plug, context)?;
        let node = data.node;

        let value = self.cache().get_or_compute(hash, || {
            let view = NodeView::new(self, node);
            tracing::trace!(plug = %self.plug_path(plug), %hash, "computing");
            view.node_type().compute(view, plug, context)
        })?;

        if value.value_type() == value_type {
            return Ok(value);
        }
        value
            .convert(value_type)
            .map(Arc::new)
            .ok_or_else(|| GraphError::Compute {
                plug: self.plug_path(plug),
                message: format!("produced {}, expected {}", value.value_type(), value_type),
            })
    }

    /// [`Graph::value`] in the default context.
    pub fn get_value(&self, plug: PlugId) -> Result<Arc<Value>> {
        self.value(plug, &Context::default())
    }

    /// Drop the memoised hashes of `plug`.
    pub(crate) fn forget_hash(&self, plug: PlugId) {
        self.hash_memo.remove(&plug);
    }

    fn reentry_error(&self, plug: PlugId) -> GraphError {
        let path = self.plug_path(plug);
        tracing::warn!(plug = %path, "plug depends on itself");
        GraphError::Cycle {
            plug: path.clone(),
            input: path,
        }
    }
}
