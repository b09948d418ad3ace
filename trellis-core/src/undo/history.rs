//! Undo History
//!
//! Transactions live on a bounded undo stack and an unbounded redo stack.
//! While a transaction is open, recorded actions accumulate in it; nested
//! begin/end pairs merge into the outermost transaction.

use std::collections::VecDeque;

use super::action::Action;

/// A named group of actions, undone and redone as one.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Counters describing the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStats {
    pub undo_count: usize,
    pub redo_count: usize,
    pub max_depth: usize,
    pub recording: bool,
}

/// Undo and redo stacks plus the transaction being recorded.
#[derive(Debug)]
pub struct UndoStack {
    undo_stack: VecDeque<Transaction>,
    redo_stack: Vec<Transaction>,
    open: Option<Transaction>,
    nesting: usize,
    max_depth: usize,
}

impl UndoStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            open: None,
            nesting: 0,
            max_depth,
        }
    }

    /// Open a transaction, or join the open one.
    pub fn begin(&mut self, name: &str) {
        self.nesting += 1;
        if self.open.is_none() {
            self.open = Some(Transaction::new(name));
        }
    }

    /// Close one level of nesting. Returns the committed transaction's name
    /// when the outermost level closes on a non-empty transaction.
    pub fn end(&mut self) -> Option<String> {
        if self.nesting == 0 {
            return None;
        }
        self.nesting -= 1;
        if self.nesting > 0 {
            return None;
        }

        let transaction = self.open.take()?;
        if transaction.is_empty() {
            tracing::debug!(transaction = %transaction.name, "discarded empty transaction");
            return None;
        }

        tracing::debug!(
            transaction = %transaction.name,
            actions = transaction.actions.len(),
            "committed transaction"
        );
        let name = transaction.name.clone();
        self.redo_stack.clear();
        self.undo_stack.push_back(transaction);
        while self.undo_stack.len() > self.max_depth {
            if let Some(dropped) = self.undo_stack.pop_front() {
                tracing::debug!(transaction = %dropped.name, "dropped oldest transaction");
            }
        }
        Some(name)
    }

    pub fn is_recording(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_name(&self) -> Option<&str> {
        self.open.as_ref().map(|t| t.name.as_str())
    }

    /// Append `action` to the open transaction. Outside a transaction,
    /// edits are not undoable and the action is dropped.
    pub fn record(&mut self, action: Action) {
        if let Some(open) = self.open.as_mut() {
            open.actions.push(action);
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Transaction> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn push_undo(&mut self, transaction: Transaction) {
        self.undo_stack.push_back(transaction);
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Transaction> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_redo(&mut self, transaction: Transaction) {
        self.redo_stack.push(transaction);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.undo_stack.back().map(|t| t.name.as_str())
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.redo_stack.last().map(|t| t.name.as_str())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            max_depth: self.max_depth,
            recording: self.is_recording(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PlugFlags, PlugId};

    fn action() -> Action {
        Action::SetFlags {
            plug: PlugId::new(),
            old: PlugFlags::NONE,
            new: PlugFlags::READ_ONLY,
        }
    }

    #[test]
    fn nested_scopes_merge() {
        let mut stack = UndoStack::new(10);
        stack.begin("outer");
        stack.record(action());
        stack.begin("inner");
        stack.record(action());
        assert_eq!(stack.end(), None);
        assert_eq!(stack.end().as_deref(), Some("outer"));

        let transaction = stack.pop_undo().unwrap();
        assert_eq!(transaction.actions.len(), 2);
    }

    #[test]
    fn empty_transactions_are_discarded() {
        let mut stack = UndoStack::new(10);
        stack.begin("nothing");
        assert_eq!(stack.end(), None);
        assert!(!stack.can_undo());
    }

    #[test]
    fn oldest_dropped_beyond_depth() {
        let mut stack = UndoStack::new(2);
        for name in ["a", "b", "c"] {
            stack.begin(name);
            stack.record(action());
            stack.end();
        }
        assert_eq!(stack.stats().undo_count, 2);
        assert_eq!(stack.undo_name(), Some("c"));
        stack.pop_undo();
        assert_eq!(stack.undo_name(), Some("b"));
    }

    #[test]
    fn commit_clears_redo() {
        let mut stack = UndoStack::new(10);
        stack.push_redo(Transaction::new("undone"));
        stack.begin("new");
        stack.record(action());
        stack.end();
        assert!(!stack.can_redo());
    }

    #[test]
    fn actions_outside_transactions_are_dropped() {
        let mut stack = UndoStack::new(10);
        stack.record(action());
        assert!(!stack.can_undo());
    }
}
