//! Undo and Redo
//!
//! Edits made while a transaction is open are recorded as [`Action`]s.
//! Closing the outermost scope commits the transaction to the undo stack.
//!
//! ```text
//! Idle --begin--> Recording --end (outermost)--> Idle
//! ```
//!
//! `undo()` replays the most recent transaction backwards and moves it to
//! the redo stack; `redo()` does the reverse. If any action fails to replay,
//! the actions already replayed are re-applied in the other direction, the
//! transaction stays where it was, and a [`GraphError::Undo`] is returned.

mod action;
mod history;
mod scope;

pub use action::Action;
pub use history::{HistoryStats, Transaction, UndoStack};
pub use scope::UndoScope;

use crate::error::{GraphError, Result};
use crate::graph::Graph;

#[derive(Clone, Copy)]
enum Replay {
    Undo,
    Redo,
}

impl Replay {
    fn name(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

impl Graph {
    /// Open a transaction that closes when the returned guard drops.
    pub fn undo_scope(&mut self, name: &str) -> UndoScope<'_> {
        UndoScope::new(self, name)
    }

    /// Open a transaction explicitly. Pair with [`Graph::end_transaction`].
    pub fn begin_transaction(&mut self, name: &str) {
        self.history.begin(name);
    }

    /// Close one level of transaction nesting. Returns the name of the
    /// committed transaction, if this closed the outermost level and it
    /// recorded anything.
    pub fn end_transaction(&mut self) -> Option<String> {
        self.history.end()
    }

    /// Revert the most recent transaction. Returns `false` if there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.replay(Replay::Undo)
    }

    /// Re-apply the most recently undone transaction. Returns `false` if
    /// there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.replay(Replay::Redo)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.history.undo_name()
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.history.redo_name()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history_stats(&self) -> HistoryStats {
        self.history.stats()
    }

    fn replay(&mut self, direction: Replay) -> Result<bool> {
        if let Some(open) = self.history.open_name() {
            return Err(GraphError::Undo {
                operation: direction.name(),
                transaction: open.to_owned(),
                message: "a transaction is still open".into(),
            });
        }

        let transaction = match direction {
            Replay::Undo => self.history.pop_undo(),
            Replay::Redo => self.history.pop_redo(),
        };
        let Some(mut transaction) = transaction else {
            return Ok(false);
        };

        tracing::debug!(
            transaction = %transaction.name,
            actions = transaction.actions.len(),
            "{}",
            direction.name()
        );

        let len = transaction.actions.len();
        let order: Vec<usize> = match direction {
            Replay::Undo => (0..len).rev().collect(),
            Replay::Redo => (0..len).collect(),
        };

        for (done, &index) in order.iter().enumerate() {
            let step = match direction {
                Replay::Undo => transaction.actions[index].undo(self),
                Replay::Redo => transaction.actions[index].redo(self),
            };
            if let Err(err) = step {
                self.roll_back(&mut transaction, direction, &order[..done]);
                tracing::warn!(
                    transaction = %transaction.name,
                    action = transaction.actions[index].kind(),
                    error = %err,
                    "{} failed and was rolled back",
                    direction.name()
                );
                let error = GraphError::Undo {
                    operation: direction.name(),
                    transaction: transaction.name.clone(),
                    message: err.to_string(),
                };
                match direction {
                    Replay::Undo => self.history.push_undo(transaction),
                    Replay::Redo => self.history.push_redo(transaction),
                }
                return Err(error);
            }
        }

        match direction {
            Replay::Undo => self.history.push_redo(transaction),
            Replay::Redo => self.history.push_undo(transaction),
        }
        Ok(true)
    }

    /// Reverse the `applied` actions, most recent first.
    fn roll_back(&mut self, transaction: &mut Transaction, direction: Replay, applied: &[usize]) {
        for &index in applied.iter().rev() {
            let action = &mut transaction.actions[index];
            let step = match direction {
                Replay::Undo => action.redo(self),
                Replay::Redo => action.undo(self),
            };
            if let Err(err) = step {
                tracing::error!(action = action.kind(), error = %err, "rollback step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::nodes::AddNode;
    use crate::value::Value;

    #[test]
    fn undo_and_redo_a_value() {
        let mut graph = Graph::new();
        graph.add_node(graph.root(), "add", Arc::new(AddNode)).unwrap();
        let op1 = graph.plug("add.op1").unwrap();

        {
            let mut scope = graph.undo_scope("Set op1");
            scope.set_value(op1, 3).unwrap();
        }
        assert_eq!(graph.undo_name(), Some("Set op1"));

        assert!(graph.undo().unwrap());
        assert_eq!(*graph.get_value(op1).unwrap(), Value::Int(0));
        assert!(!graph.undo().unwrap());

        assert!(graph.redo().unwrap());
        assert_eq!(*graph.get_value(op1).unwrap(), Value::Int(3));
        assert!(!graph.redo().unwrap());
    }

    #[test]
    fn undo_refused_while_recording() {
        let mut graph = Graph::new();
        graph.begin_transaction("open");
        assert!(matches!(graph.undo(), Err(GraphError::Undo { .. })));
        graph.end_transaction();
    }
}
