// UndoLog - Manages undo/redo stacks

use crate::scan::{ScanCommand, ScanModel};
use crate::undo::edit::{SequenceEdit, UndoableEdit};
use std::collections::VecDeque;

/// Default maximum number of edits to keep in history
pub const DEFAULT_MAX_HISTORY: usize = 100;

type HistoryListener = Box<dyn FnMut(Option<&str>, Option<&str>)>;

/// Linear undo/redo history of a scan document
///
/// The log maintains two stacks:
/// - Undo stack: edits that have been applied and can be undone
/// - Redo stack: edits that have been undone and can be redone
///
/// Recording a new edit clears the redo stack, so after undo followed by a
/// fresh edit the previously undone edits are gone for good.
///
/// # Memory Management
/// The undo stack is bounded; when the limit is reached the oldest edit is
/// dropped.
pub struct UndoLog {
    /// Most recent at the back
    undo_stack: VecDeque<Box<dyn UndoableEdit>>,

    /// Most recent at the back
    redo_stack: VecDeque<Box<dyn UndoableEdit>>,

    max_history: usize,

    /// Called with the next undo and redo descriptions after every change
    listeners: Vec<HistoryListener>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }

    pub fn with_capacity(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            undo_stack: VecDeque::with_capacity(max_history),
            redo_stack: VecDeque::new(),
            max_history,
            listeners: Vec::new(),
        }
    }

    /// Record a replacement of the whole sequence that already happened
    ///
    /// Replacing a sequence with an equal one is not an edit and is ignored.
    pub fn record(
        &mut self,
        old: Vec<ScanCommand>,
        new: Vec<ScanCommand>,
        description: impl Into<String>,
    ) {
        if old == new {
            return;
        }
        self.push(Box::new(SequenceEdit::new(old, new, description)));
    }

    fn push(&mut self, edit: Box<dyn UndoableEdit>) {
        self.undo_stack.push_back(edit);

        // New timeline
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
        self.notify();
    }

    /// Undo the last edit
    ///
    /// Returns the description of the undone edit, `None` (and no change)
    /// when there is nothing to undo.
    pub fn undo(&mut self, model: &mut ScanModel) -> Option<String> {
        let edit = self.undo_stack.pop_back()?;
        let description = edit.description();
        edit.undo(model);
        self.redo_stack.push_back(edit);
        self.notify();
        Some(description)
    }

    /// Redo the last undone edit, `None` when there is nothing to redo
    pub fn redo(&mut self, model: &mut ScanModel) -> Option<String> {
        let edit = self.redo_stack.pop_back()?;
        let description = edit.description();
        edit.redo(model);
        self.undo_stack.push_back(edit);
        self.notify();
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|edit| edit.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|edit| edit.description())
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.notify();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Subscribe to history changes
    ///
    /// The listener receives the descriptions of the edit that would be
    /// undone and redone next.
    pub fn add_listener(&mut self, listener: impl FnMut(Option<&str>, Option<&str>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let undo = self.undo_description();
        let redo = self.redo_description();
        for listener in self.listeners.iter_mut() {
            listener(undo.as_deref(), redo.as_deref());
        }
    }
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UndoLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoLog")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("max_history", &self.max_history)
            .finish()
    }
}
