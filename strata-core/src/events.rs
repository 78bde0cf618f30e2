//! Change events and the observable plumbing shared by collections and views
//!
//! Listeners run synchronously, in registration order, within the turn that
//! raised the event. Dispatch iterates over a snapshot of the listener list,
//! so a listener may register or remove listeners, or mutate the emitter,
//! without corrupting the dispatch in progress.

use crate::proxy::Operation;
use crate::record::Record;
use crate::source::Source;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use strata_model::ListenerId;

/// What happened to a record in an `Update` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Edit,
    Commit,
    Reject,
}

/// Event raised by a collection or view
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Records became visible starting at `index`
    Add { records: Vec<Record>, index: usize },
    /// Records left the visible sequence; `index` is their pre-removal position
    Remove { records: Vec<Record>, index: usize },
    /// A visible record changed. `modified` is `None` for commit and reject.
    Update {
        record: Record,
        kind: UpdateKind,
        modified: Option<Vec<String>>,
    },
    Refresh,
    DataChanged,
    Clear,
    FilterChange,
    BeforeLoad { operation: Operation },
    Load {
        records: Vec<Record>,
        success: bool,
        operation: Operation,
    },
    LoadFailed { operation: Operation, error: String },
}

/// Discriminant of a [`StoreEvent`], handy for counting and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Remove,
    Update,
    Refresh,
    DataChanged,
    Clear,
    FilterChange,
    BeforeLoad,
    Load,
    LoadFailed,
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StoreEvent::Add { .. } => EventKind::Add,
            StoreEvent::Remove { .. } => EventKind::Remove,
            StoreEvent::Update { .. } => EventKind::Update,
            StoreEvent::Refresh => EventKind::Refresh,
            StoreEvent::DataChanged => EventKind::DataChanged,
            StoreEvent::Clear => EventKind::Clear,
            StoreEvent::FilterChange => EventKind::FilterChange,
            StoreEvent::BeforeLoad { .. } => EventKind::BeforeLoad,
            StoreEvent::Load { .. } => EventKind::Load,
            StoreEvent::LoadFailed { .. } => EventKind::LoadFailed,
        }
    }
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Update => "update",
            EventKind::Refresh => "refresh",
            EventKind::DataChanged => "datachanged",
            EventKind::Clear => "clear",
            EventKind::FilterChange => "filterchange",
            EventKind::BeforeLoad => "beforeload",
            EventKind::Load => "load",
            EventKind::LoadFailed => "loadfailed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Listener = Rc<dyn Fn(&Source, &StoreEvent)>;

/// Capability shared by collections and views: register for change events
/// and temporarily hold them back.
pub trait Observable {
    /// Register `listener` for every event this emitter raises
    fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Source, &StoreEvent) + 'static;

    /// Remove a listener. Returns false if it was not registered.
    fn un(&self, id: ListenerId) -> bool;

    /// Stop delivering events. With `queue`, held events are delivered in
    /// order on the matching resume; otherwise they are dropped.
    fn suspend_events(&self, queue: bool);

    fn resume_events(&self);

    fn has_listeners(&self) -> bool;
}

/// Listener registry owned by each collection and view
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    suspended: Cell<u32>,
    queue_while_suspended: Cell<bool>,
    queued: RefCell<Vec<StoreEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Source, &StoreEvent) + 'static,
    {
        let id = ListenerId::new();
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn un(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
        self.queued.borrow_mut().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get() > 0
    }

    pub fn fire(&self, emitter: &Source, event: StoreEvent) {
        if self.is_suspended() {
            if self.queue_while_suspended.get() {
                self.queued.borrow_mut().push(event);
            }
            return;
        }
        self.dispatch(emitter, &event);
    }

    pub fn suspend(&self, queue: bool) {
        self.suspended.set(self.suspended.get() + 1);
        if queue {
            self.queue_while_suspended.set(true);
        }
    }

    /// Undo one `suspend`; the outermost resume flushes queued events
    pub fn resume(&self, emitter: &Source) {
        let depth = self.suspended.get().saturating_sub(1);
        self.suspended.set(depth);
        if depth > 0 {
            return;
        }

        self.queue_while_suspended.set(false);
        let queued = std::mem::take(&mut *self.queued.borrow_mut());
        for event in queued {
            self.dispatch(emitter, &event);
        }
    }

    fn dispatch(&self, emitter: &Source, event: &StoreEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener(emitter, event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .field("suspended", &self.suspended.get())
            .field("queued", &self.queued.borrow().len())
            .finish()
    }
}

/// Group `(index, record)` pairs into runs of consecutive indices.
///
/// Input must be sorted by index. Each run becomes one add or remove event.
pub(crate) fn contiguous_runs(
    mut positioned: Vec<(usize, Record)>,
) -> Vec<(usize, Vec<Record>)> {
    positioned.sort_by_key(|(index, _)| *index);

    let mut runs: Vec<(usize, Vec<Record>)> = Vec::new();
    for (index, record) in positioned {
        match runs.last_mut() {
            Some((start, records)) if *start + records.len() == index => {
                records.push(record)
            }
            _ => runs.push((index, vec![record])),
        }
    }
    runs
}
