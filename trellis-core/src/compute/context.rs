//! Evaluation Context
//!
//! A [`Context`] carries the variables a computation may read, such as the
//! current frame. Its digest is part of every computed plug's hash, so the
//! same plug evaluated at two frames yields two cache entries.
//!
//! This module also tracks which plugs are being hashed or computed on the
//! current thread. A node type whose computation asks for its own output
//! would otherwise wait forever on its own in-flight cache entry; instead the
//! request is reported as a cycle.

use std::cell::RefCell;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::hash::{PlugHash, PlugHasher};
use crate::graph::PlugId;
use crate::value::Value;

/// Variables visible to a computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub frame: f64,
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            frame: 1.0,
            variables: IndexMap::new(),
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, frame: f64) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Digest of the frame and every variable. Variable order does not
    /// matter.
    pub fn hash(&self) -> PlugHash {
        let mut hasher = PlugHasher::new();
        hasher.append_bytes(&self.frame.to_bits().to_le_bytes());

        let mut names: Vec<&String> = self.variables.keys().collect();
        names.sort();
        hasher.append_len(names.len());
        for name in names {
            hasher.append_str(name);
            if let Some(value) = self.variables.get(name) {
                value.hash_into(&mut hasher);
            }
        }
        hasher.finish()
    }
}

/// What a thread is doing with a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessKind {
    Hash,
    Compute,
}

thread_local! {
    static PROCESS_STACK: RefCell<Vec<(ProcessKind, PlugId, PlugHash)>> = RefCell::new(Vec::new());
}

/// Guard marking a plug as in progress on this thread. Popped on drop, so
/// the stack stays balanced when a computation fails or panics.
pub(crate) struct Process {
    kind: ProcessKind,
    plug: PlugId,
}

impl Process {
    /// Enter `plug` in context `context`, or return `None` if the same plug
    /// in the same context is already in progress on this thread.
    pub fn enter(kind: ProcessKind, plug: PlugId, context: PlugHash) -> Option<Self> {
        PROCESS_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&(kind, plug, context)) {
                return None;
            }
            stack.push((kind, plug, context));
            Some(Self { kind, plug })
        })
    }

    /// Number of processes active on this thread.
    #[cfg(test)]
    pub(crate) fn depth() -> usize {
        PROCESS_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        PROCESS_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some((kind, plug, _)) = popped {
                debug_assert_eq!(
                    (kind, plug),
                    (self.kind, self.plug),
                    "Process mismatch: expected {:?}, got {:?}",
                    (self.kind, self.plug),
                    (kind, plug)
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_variable_order() {
        let a = Context::new().with_variable("x", 1).with_variable("y", "s");
        let b = Context::new().with_variable("y", "s").with_variable("x", 1);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), a.clone().with_frame(2.0).hash());
    }

    #[test]
    fn json_keeps_variable_order() {
        let ctx = Context::new().with_variable("y", "s").with_variable("x", 1);
        let text = serde_json::to_string(&ctx).unwrap();
        let back: Context = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.variables.keys().collect::<Vec<_>>(), ["y", "x"]);
    }

    #[test]
    fn reentry_is_refused() {
        let plug = PlugId::new();
        let ctx = Context::default().hash();

        let outer = Process::enter(ProcessKind::Compute, plug, ctx);
        assert!(outer.is_some());
        assert!(Process::enter(ProcessKind::Compute, plug, ctx).is_none());
        assert!(Process::enter(ProcessKind::Hash, plug, ctx).is_some());

        drop(outer);
        assert_eq!(Process::depth(), 0);
    }
}
