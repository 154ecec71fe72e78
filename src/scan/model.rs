// ScanModel - the ordered command list of one document

use crate::scan::types::ScanCommand;

/// Old and new sequence of a whole-list replacement
#[derive(Debug, Clone, Copy)]
pub struct SequenceChange<'a> {
    pub old: &'a [ScanCommand],
    pub new: &'a [ScanCommand],
}

/// Identifies a subscribed listener so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type ChangeListener = Box<dyn FnMut(SequenceChange<'_>)>;

/// In-memory command list
///
/// There is no partial-list mutation API: every insert, delete, reorder or
/// in-place edit is expressed as a replacement of the whole sequence through
/// [`ScanModel::set_commands`]. That single choke point is what the undo log
/// and the dirty tracking observe.
///
/// Listeners run synchronously, in subscription order, on every replacement.
#[derive(Default)]
pub struct ScanModel {
    commands: Vec<ScanCommand>,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener: u64,
}

impl ScanModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commands(commands: Vec<ScanCommand>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    /// Read-only view of the current sequence
    pub fn commands(&self) -> &[ScanCommand] {
        &self.commands
    }

    /// Replace the entire sequence and notify listeners
    ///
    /// Returns the previous sequence.
    pub fn set_commands(&mut self, commands: Vec<ScanCommand>) -> Vec<ScanCommand> {
        let old = std::mem::replace(&mut self.commands, commands);
        let change = SequenceChange {
            old: &old,
            new: &self.commands,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(change);
        }
        old
    }

    pub fn subscribe(&mut self, listener: impl FnMut(SequenceChange<'_>) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener, returns false if it was not subscribed
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for ScanModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanModel")
            .field("commands", &self.commands)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_set_commands_returns_previous() {
        let mut model = ScanModel::with_commands(vec![ScanCommand::wait(1.0)]);
        let old = model.set_commands(vec![ScanCommand::move_to("x", 5.0)]);
        assert_eq!(old, vec![ScanCommand::wait(1.0)]);
        assert_eq!(model.commands(), &[ScanCommand::move_to("x", 5.0)]);
    }

    #[test]
    fn test_listeners_see_old_and_new_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut model = ScanModel::new();

        let first = seen.clone();
        model.subscribe(move |change| {
            first
                .borrow_mut()
                .push(("first", change.old.len(), change.new.len()));
        });
        let second = seen.clone();
        model.subscribe(move |change| {
            second
                .borrow_mut()
                .push(("second", change.old.len(), change.new.len()));
        });

        model.set_commands(vec![ScanCommand::wait(1.0), ScanCommand::wait(2.0)]);

        assert_eq!(*seen.borrow(), vec![("first", 0, 2), ("second", 0, 2)]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut model = ScanModel::new();
        let counter = count.clone();
        let id = model.subscribe(move |_| *counter.borrow_mut() += 1);

        model.set_commands(vec![ScanCommand::wait(1.0)]);
        assert!(model.unsubscribe(id));
        assert!(!model.unsubscribe(id));
        model.set_commands(Vec::new());

        assert_eq!(*count.borrow(), 1);
    }
}
