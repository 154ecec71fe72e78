// ScanDocument - the state of one open scan document
//
// Owns the command model, its undo log and the snapshot the document was
// last loaded from or saved to. All edits, undo and redo go through here so
// dirty tracking never misses a change.

use crate::document::resource::ScanResource;
use crate::scan::{ListenerId, ScanCommand, ScanModel, SequenceChange};
use crate::undo::UndoLog;

/// Lifecycle of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// New document, nothing loaded
    Empty,
    Loading,
    Ready,
    /// Last load failed; the previous content is still there
    LoadFailed,
    Saving,
    /// Last save failed; the edits are still there
    SaveFailed,
    Submitting,
    /// Status of the bound remote scan is being queried
    Fetching,
    Closed,
}

impl DocumentState {
    /// A background operation is running
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            DocumentState::Loading
                | DocumentState::Saving
                | DocumentState::Submitting
                | DocumentState::Fetching
        )
    }
}

type DirtyListener = Box<dyn FnMut(bool)>;

pub struct ScanDocument {
    model: ScanModel,
    undo: UndoLog,
    /// Content as last loaded or saved
    clean: Vec<ScanCommand>,
    resource: Option<ScanResource>,
    state: DocumentState,
    dirty: bool,
    dirty_listeners: Vec<DirtyListener>,
}

impl ScanDocument {
    pub fn new(max_undo: usize) -> Self {
        Self {
            model: ScanModel::new(),
            undo: UndoLog::with_capacity(max_undo),
            clean: Vec::new(),
            resource: None,
            state: DocumentState::Empty,
            dirty: false,
            dirty_listeners: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[ScanCommand] {
        self.model.commands()
    }

    pub fn resource(&self) -> Option<&ScanResource> {
        self.resource.as_ref()
    }

    pub(crate) fn set_resource(&mut self, resource: Option<ScanResource>) {
        self.resource = resource;
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DocumentState) {
        self.state = state;
    }

    /// Unsaved edits relative to the last load or save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    /// Replace the whole sequence as one undoable edit
    pub fn edit(&mut self, commands: Vec<ScanCommand>, description: impl Into<String>) {
        let old = self.model.set_commands(commands);
        self.undo
            .record(old, self.model.commands().to_vec(), description);
        if self.state == DocumentState::Empty {
            self.state = DocumentState::Ready;
        }
        self.update_dirty();
    }

    pub fn undo(&mut self) -> Option<String> {
        let description = self.undo.undo(&mut self.model)?;
        self.update_dirty();
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        let description = self.undo.redo(&mut self.model)?;
        self.update_dirty();
        Some(description)
    }

    /// Install freshly loaded content: no history, not dirty
    pub(crate) fn load(&mut self, commands: Vec<ScanCommand>) {
        self.model.set_commands(commands);
        self.clean = self.model.commands().to_vec();
        self.undo.clear();
        self.update_dirty();
    }

    /// `saved` is now what the backing resource holds
    pub(crate) fn mark_saved(&mut self, saved: Vec<ScanCommand>) {
        self.clean = saved;
        self.undo.clear();
        self.update_dirty();
    }

    /// Subscribe to every replacement of the command sequence
    pub fn subscribe(&mut self, listener: impl FnMut(SequenceChange<'_>) + 'static) -> ListenerId {
        self.model.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.model.unsubscribe(id)
    }

    /// Called with the new flag whenever the dirty state flips
    pub fn on_dirty_changed(&mut self, listener: impl FnMut(bool) + 'static) {
        self.dirty_listeners.push(Box::new(listener));
    }

    /// Called with the next undo and redo descriptions after history changes
    pub fn on_history_changed(
        &mut self,
        listener: impl FnMut(Option<&str>, Option<&str>) + 'static,
    ) {
        self.undo.add_listener(listener);
    }

    fn update_dirty(&mut self) {
        let dirty = self.model.commands() != self.clean.as_slice();
        if dirty == self.dirty {
            return;
        }
        self.dirty = dirty;
        for listener in self.dirty_listeners.iter_mut() {
            listener(dirty);
        }
    }
}

impl std::fmt::Debug for ScanDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanDocument")
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("commands", &self.model.len())
            .field("undo", &self.undo)
            .finish()
    }
}
