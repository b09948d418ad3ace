//! Undo Scopes
//!
//! An [`UndoScope`] opens a transaction on creation and closes it on drop.
//! It dereferences to the graph, so edits are made through the scope:
//!
//! ```rust,ignore
//! let mut scope = graph.undo_scope("Set op1");
//! scope.set_value(op1, 3)?;
//! drop(scope); // committed
//! graph.undo()?;
//! ```

use std::ops::{Deref, DerefMut};

use crate::graph::Graph;

/// Guard recording edits into a named transaction.
pub struct UndoScope<'a> {
    graph: &'a mut Graph,
}

impl<'a> UndoScope<'a> {
    pub(crate) fn new(graph: &'a mut Graph, name: &str) -> Self {
        graph.history.begin(name);
        Self { graph }
    }
}

impl Deref for UndoScope<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

impl DerefMut for UndoScope<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for UndoScope<'_> {
    fn drop(&mut self) {
        self.graph.history.end();
    }
}
