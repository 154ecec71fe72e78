// Undo/redo for scan documents
//
// Every edit of a scan document replaces the complete command sequence, so a
// single edit type (SequenceEdit, a before/after snapshot) covers inserts,
// deletes, reorders and in-place changes alike.
//
// - UndoableEdit trait: undo(), redo(), description()
// - UndoLog: bounded undo/redo stacks with history listeners

pub mod edit;
pub mod log;

pub use edit::{SequenceEdit, UndoableEdit};
pub use log::{DEFAULT_MAX_HISTORY, UndoLog};
