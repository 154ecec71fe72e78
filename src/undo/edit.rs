// UndoableEdit trait definition and the whole-sequence edit

use crate::scan::{ScanCommand, ScanModel};

/// An edit that can be reverted and re-applied on a [`ScanModel`]
///
/// Both directions go through `ScanModel::set_commands`, so model listeners
/// observe undo and redo exactly like a direct edit.
///
/// # Example
/// ```
/// use scan_editor::scan::{ScanCommand, ScanModel};
/// use scan_editor::undo::{SequenceEdit, UndoableEdit};
///
/// let mut model = ScanModel::new();
/// let edit = SequenceEdit::new(Vec::new(), vec![ScanCommand::wait(1.0)], "Add wait");
///
/// edit.redo(&mut model);
/// assert_eq!(model.len(), 1);
/// edit.undo(&mut model);
/// assert!(model.is_empty());
/// ```
pub trait UndoableEdit: Send {
    /// Restore the model to its state before the edit
    fn undo(&self, model: &mut ScanModel);

    /// Apply the edit again
    fn redo(&self, model: &mut ScanModel);

    /// Human-readable description, e.g. "Undo: Delete 2 commands"
    fn description(&self) -> String;
}

/// Before/after snapshot of the complete command sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEdit {
    before: Vec<ScanCommand>,
    after: Vec<ScanCommand>,
    description: String,
}

impl SequenceEdit {
    pub fn new(
        before: Vec<ScanCommand>,
        after: Vec<ScanCommand>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            before,
            after,
            description: description.into(),
        }
    }

    pub fn before(&self) -> &[ScanCommand] {
        &self.before
    }

    pub fn after(&self) -> &[ScanCommand] {
        &self.after
    }
}

impl UndoableEdit for SequenceEdit {
    fn undo(&self, model: &mut ScanModel) {
        model.set_commands(self.before.clone());
    }

    fn redo(&self, model: &mut ScanModel) {
        model.set_commands(self.after.clone());
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
