//! The source of a derived view, and the internal channel chained views
//! listen on.
//!
//! Public events describe a change to the emitter's own visible sequence.
//! Chained views need slightly different information (which records became
//! visible in the source, whether a clear was silent), so sources notify
//! them through [`SourceChange`] after their own listeners have run.

use crate::access::RecordAccess;
use crate::collection::{BackingCollection, RecordInput};
use crate::error::Result;
use crate::events::{Observable, StoreEvent, UpdateKind};
use crate::proxy::Operation;
use crate::query::{Filter, FiltersHandle, SortDirection, SortersHandle};
use crate::record::Record;
use crate::view::DerivedView;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use strata_model::{ListenerId, Model};

/// A backing collection or a derived view
#[derive(Debug, Clone)]
pub enum Source {
    Collection(BackingCollection),
    View(DerivedView),
}

impl Source {
    /// Whether both handles point at the same collection or view
    pub fn ptr_eq(&self, other: &Source) -> bool {
        match (self, other) {
            (Source::Collection(a), Source::Collection(b)) => a.ptr_eq(b),
            (Source::View(a), Source::View(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        match self {
            Source::Collection(c) => c.is_destroyed(),
            Source::View(v) => v.is_destroyed(),
        }
    }

    pub fn as_collection(&self) -> Option<&BackingCollection> {
        match self {
            Source::Collection(c) => Some(c),
            Source::View(_) => None,
        }
    }

    pub fn as_view(&self) -> Option<&DerivedView> {
        match self {
            Source::View(v) => Some(v),
            Source::Collection(_) => None,
        }
    }

    /// The backing collection at the end of the chain, if still attached
    pub fn root(&self) -> Option<BackingCollection> {
        match self {
            Source::Collection(c) => Some(c.clone()),
            Source::View(v) => v.get_source().and_then(|s| s.root()),
        }
    }

    pub fn add<I>(&self, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        match self {
            Source::Collection(c) => c.add(items),
            Source::View(v) => v.add(items),
        }
    }

    pub fn insert<I>(&self, index: usize, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        match self {
            Source::Collection(c) => c.insert(index, items),
            Source::View(v) => v.insert(index, items),
        }
    }

    pub fn remove(&self, records: &[Record]) -> Result<Vec<Record>> {
        match self {
            Source::Collection(c) => c.remove(records),
            Source::View(v) => v.remove(records),
        }
    }

    pub fn remove_at(&self, index: usize) -> Result<Vec<Record>> {
        match self {
            Source::Collection(c) => c.remove_at(index),
            Source::View(v) => v.remove_at(index),
        }
    }

    pub fn filter(&self, filter: Filter) -> Result<()> {
        self.get_filters().add(filter)
    }

    pub fn sort(&self, property: &str, direction: SortDirection) -> Result<()> {
        match self {
            Source::Collection(c) => c.sort(property, direction),
            Source::View(v) => v.sort(property, direction),
        }
    }

    pub fn get_filters(&self) -> FiltersHandle<'_> {
        match self {
            Source::Collection(c) => c.get_filters(),
            Source::View(v) => v.get_filters(),
        }
    }

    pub fn get_sorters(&self) -> SortersHandle<'_> {
        match self {
            Source::Collection(c) => c.get_sorters(),
            Source::View(v) => v.get_sorters(),
        }
    }

    pub(crate) fn attach_observer(&self, observer: Weak<dyn ChainObserver>) {
        match self {
            Source::Collection(c) => c.chained().attach(observer),
            Source::View(v) => v.chained().attach(observer),
        }
    }

    pub(crate) fn detach_observer(&self, observer: &Weak<dyn ChainObserver>) {
        match self {
            Source::Collection(c) => c.chained().detach(observer),
            Source::View(v) => v.chained().detach(observer),
        }
    }
}

impl From<BackingCollection> for Source {
    fn from(collection: BackingCollection) -> Self {
        Source::Collection(collection)
    }
}

impl From<&BackingCollection> for Source {
    fn from(collection: &BackingCollection) -> Self {
        Source::Collection(collection.clone())
    }
}

impl From<DerivedView> for Source {
    fn from(view: DerivedView) -> Self {
        Source::View(view)
    }
}

impl From<&DerivedView> for Source {
    fn from(view: &DerivedView) -> Self {
        Source::View(view.clone())
    }
}

impl RecordAccess for Source {
    fn get_range(&self) -> Vec<Record> {
        match self {
            Source::Collection(c) => c.get_range(),
            Source::View(v) => v.get_range(),
        }
    }

    fn get_at(&self, index: usize) -> Option<Record> {
        match self {
            Source::Collection(c) => c.get_at(index),
            Source::View(v) => v.get_at(index),
        }
    }

    fn get_count(&self) -> usize {
        match self {
            Source::Collection(c) => c.get_count(),
            Source::View(v) => v.get_count(),
        }
    }

    fn index_of(&self, record: &Record) -> isize {
        match self {
            Source::Collection(c) => c.index_of(record),
            Source::View(v) => v.index_of(record),
        }
    }

    fn get_model(&self) -> Arc<Model> {
        match self {
            Source::Collection(c) => c.get_model(),
            Source::View(v) => v.get_model(),
        }
    }
}

impl Observable for Source {
    fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Source, &StoreEvent) + 'static,
    {
        match self {
            Source::Collection(c) => c.on(listener),
            Source::View(v) => v.on(listener),
        }
    }

    fn un(&self, id: ListenerId) -> bool {
        match self {
            Source::Collection(c) => c.un(id),
            Source::View(v) => v.un(id),
        }
    }

    fn suspend_events(&self, queue: bool) {
        match self {
            Source::Collection(c) => c.suspend_events(queue),
            Source::View(v) => v.suspend_events(queue),
        }
    }

    fn resume_events(&self) {
        match self {
            Source::Collection(c) => c.resume_events(),
            Source::View(v) => v.resume_events(),
        }
    }

    fn has_listeners(&self) -> bool {
        match self {
            Source::Collection(c) => c.has_listeners(),
            Source::View(v) => v.has_listeners(),
        }
    }
}

/// Change notification delivered to chained views
#[derive(Debug, Clone)]
pub(crate) enum SourceChange {
    /// Records that became visible in the source, in source order
    Added(Vec<Record>),
    /// Records that left the source's visible sequence
    Removed(Vec<Record>),
    /// A record that is still visible in the source changed
    Updated {
        record: Record,
        kind: UpdateKind,
        modified: Option<Vec<String>>,
    },
    /// The source's visible sequence was recomputed wholesale
    Refreshed,
    /// The source reordered its visible sequence; membership is unchanged
    Resorted,
    Cleared { silent: bool },
    BeforeLoad(Operation),
    Loaded {
        records: Vec<Record>,
        operation: Operation,
    },
    LoadFailed {
        operation: Operation,
        error: String,
    },
    /// The source was destroyed or detached; chained views detach too
    Destroyed,
}

impl SourceChange {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            SourceChange::Added(_) => "added",
            SourceChange::Removed(_) => "removed",
            SourceChange::Updated { .. } => "updated",
            SourceChange::Refreshed => "refreshed",
            SourceChange::Resorted => "resorted",
            SourceChange::Cleared { .. } => "cleared",
            SourceChange::BeforeLoad(_) => "beforeload",
            SourceChange::Loaded { .. } => "loaded",
            SourceChange::LoadFailed { .. } => "loadfailed",
            SourceChange::Destroyed => "destroyed",
        }
    }
}

pub(crate) trait ChainObserver {
    fn source_changed(&self, change: &SourceChange);
}

/// Weak list of views chained to a collection or view
#[derive(Default)]
pub(crate) struct ChainObservers {
    observers: RefCell<Vec<Weak<dyn ChainObserver>>>,
}

impl ChainObservers {
    pub(crate) fn attach(&self, observer: Weak<dyn ChainObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    pub(crate) fn detach(&self, observer: &Weak<dyn ChainObserver>) {
        self.observers
            .borrow_mut()
            .retain(|existing| !std::ptr::addr_eq(existing.as_ptr(), observer.as_ptr()));
    }

    pub(crate) fn len(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    pub(crate) fn notify(&self, change: &SourceChange) {
        let live: Vec<Rc<dyn ChainObserver>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|observer| observer.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        for observer in live {
            observer.source_changed(change);
        }
    }

    /// Notify every observer once more, then forget them all
    pub(crate) fn release(&self, change: &SourceChange) {
        let live: Vec<Rc<dyn ChainObserver>> = self
            .observers
            .take()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for observer in live {
            observer.source_changed(change);
        }
    }
}

impl std::fmt::Debug for ChainObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainObservers")
            .field("live", &self.len())
            .finish()
    }
}
