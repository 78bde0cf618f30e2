//! DerivedView - a live, independently sorted and filtered projection
//!
//! A view reads through to its source (a collection or another view) and
//! keeps a cached visible sequence. Writes are relayed to the source; the
//! cache is only ever updated from the source's change notifications or from
//! the view's own filter and sort changes.

use crate::access::RecordAccess;
use crate::collection::{RecordInput, position_of};
use crate::error::{Result, StoreError};
use crate::events::{EventBus, Observable, StoreEvent, UpdateKind, contiguous_runs};
use crate::query::filtering::{FilterHost, FilterSet};
use crate::query::sorting::{SorterHost, SorterSet};
use crate::query::{Filter, FiltersHandle, SortDirection, Sorter, SortersHandle};
use crate::record::Record;
use crate::registry::StoreRegistry;
use crate::source::{ChainObserver, ChainObservers, Source, SourceChange};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use strata_model::{ListenerId, Model};
use tracing::{debug, trace, warn};

pub(crate) struct ViewInner {
    this: Weak<ViewInner>,
    observer: Weak<dyn ChainObserver>,
    source: RefCell<Option<Source>>,
    model: Arc<Model>,
    items: RefCell<Vec<Record>>,
    filters: RefCell<FilterSet>,
    sorters: RefCell<SorterSet>,
    bus: EventBus,
    chained: ChainObservers,
    /// Target position for records arriving from a write made through
    /// this view
    requested_index: Cell<Option<usize>>,
    destroyed: Cell<bool>,
}

impl ChainObserver for ViewInner {
    fn source_changed(&self, change: &SourceChange) {
        if let Some(inner) = self.this.upgrade() {
            DerivedView(inner).on_source_change(change);
        }
    }
}

/// A projection over a [`Source`] with its own filters and sorters
#[derive(Clone)]
pub struct DerivedView(pub(crate) Rc<ViewInner>);

impl DerivedView {
    /// Chain a new view off `source`.
    ///
    /// The view starts identical to the source and fires nothing.
    pub fn new(source: impl Into<Source>) -> Result<Self> {
        let source = source.into();
        if source.is_destroyed() {
            return Err(StoreError::InvalidSource(
                "source has been destroyed".to_string(),
            ));
        }
        if source.as_view().is_some_and(DerivedView::is_detached) {
            return Err(StoreError::InvalidSource(
                "source view is detached from its own source".to_string(),
            ));
        }

        let model = source.get_model();
        let items = source.get_range();
        let inner = Rc::new_cyclic(|this: &Weak<ViewInner>| {
            let observer: Weak<dyn ChainObserver> = this.clone();
            ViewInner {
                this: this.clone(),
                observer,
                source: RefCell::new(Some(source.clone())),
                model,
                items: RefCell::new(items),
                filters: RefCell::new(FilterSet::default()),
                sorters: RefCell::new(SorterSet::default()),
                bus: EventBus::new(),
                chained: ChainObservers::default(),
                requested_index: Cell::new(None),
                destroyed: Cell::new(false),
            }
        });
        source.attach_observer(inner.observer.clone());

        debug!(model = %inner.model.name, count = inner.items.borrow().len(), "view chained");
        Ok(DerivedView(inner))
    }

    /// Chain a new view off the source registered as `id`
    pub fn from_registry(registry: &StoreRegistry, id: &str) -> Result<Self> {
        let source = registry.lookup(id).ok_or_else(|| {
            warn!(id, "unresolvable view source");
            StoreError::InvalidSource(format!("no live store registered as '{id}'"))
        })?;
        Self::new(source)
    }

    /// The immediate source, `None` once detached or destroyed
    pub fn get_source(&self) -> Option<Source> {
        self.0.source.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Whether the view has lost its source
    pub fn is_detached(&self) -> bool {
        self.0.source.borrow().is_none()
    }

    pub fn is_filtered(&self) -> bool {
        self.0.filters.borrow().is_active()
    }

    pub fn is_sorted(&self) -> bool {
        self.0.sorters.borrow().is_active()
    }

    pub fn ptr_eq(&self, other: &DerivedView) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Add through the source; the records show up at the end of this view
    /// unless it is sorted
    pub fn add<I>(&self, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        let source = self.attached_source("add records through")?;
        self.relay_write(Some(self.get_count()), || source.add(items))
    }

    pub fn insert<I>(&self, index: usize, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        let source = self.attached_source("insert records through")?;
        self.relay_write(Some(index), || source.insert(index, items))
    }

    pub fn remove(&self, records: &[Record]) -> Result<Vec<Record>> {
        self.attached_source("remove records through")?
            .remove(records)
    }

    /// Remove the record at this view's `index`
    pub fn remove_at(&self, index: usize) -> Result<Vec<Record>> {
        let source = self.attached_source("remove records through")?;
        match self.get_at(index) {
            Some(record) => source.remove(&[record]),
            None => Ok(Vec::new()),
        }
    }

    pub fn filter(&self, filter: Filter) -> Result<()> {
        self.get_filters().add(filter)
    }

    pub fn filter_by<F>(&self, id: impl Into<String>, predicate: F) -> Result<()>
    where
        F: Fn(&Record) -> bool + 'static,
    {
        self.get_filters().add(Filter::by(id, predicate))
    }

    pub fn clear_filter(&self) -> Result<()> {
        self.get_filters().remove_all()
    }

    pub fn get_filters(&self) -> FiltersHandle<'_> {
        FiltersHandle::new(self)
    }

    pub fn sort(&self, property: &str, direction: SortDirection) -> Result<()> {
        self.get_sorters()
            .replace([Sorter::new(property, direction)])
    }

    pub fn sort_by<I>(&self, sorters: I) -> Result<()>
    where
        I: IntoIterator<Item = Sorter>,
    {
        self.get_sorters().replace(sorters)
    }

    pub fn get_sorters(&self) -> SortersHandle<'_> {
        SortersHandle::new(self)
    }

    /// Unhook from the source and drop every listener. The source and its
    /// records are untouched.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        if let Some(source) = self.0.source.take() {
            source.detach_observer(&self.0.observer);
        }
        self.0.items.borrow_mut().clear();
        self.0.bus.clear();

        debug!(model = %self.0.model.name, "view destroyed");
        self.0.chained.release(&SourceChange::Destroyed);
    }

    pub(crate) fn chained(&self) -> &ChainObservers {
        &self.0.chained
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Rc::downgrade(&self.0)
    }

    fn emitter(&self) -> Source {
        Source::View(self.clone())
    }

    fn fire(&self, event: StoreEvent) {
        trace!(model = %self.0.model.name, event = %event.kind(), "view firing");
        self.0.bus.fire(&self.emitter(), event);
    }

    fn ensure_live(&self, action: &str) -> Result<()> {
        if self.is_destroyed() {
            warn!(model = %self.0.model.name, "attempt to {action} a destroyed view");
            return Err(StoreError::InvalidOperation(format!(
                "cannot {action} a destroyed view"
            )));
        }
        Ok(())
    }

    fn attached_source(&self, action: &str) -> Result<Source> {
        self.ensure_live(action)?;
        self.get_source().ok_or_else(|| {
            warn!(model = %self.0.model.name, "attempt to {action} a detached view");
            StoreError::InvalidOperation(format!("cannot {action} a detached view"))
        })
    }

    fn relay_write<F>(&self, requested: Option<usize>, write: F) -> Result<Vec<Record>>
    where
        F: FnOnce() -> Result<Vec<Record>>,
    {
        let previous = self.0.requested_index.replace(requested);
        let result = write();
        self.0.requested_index.set(previous);
        result
    }

    /// Source range, narrowed by local filters, then stably sorted
    fn rebuild(&self) {
        let range = self
            .get_source()
            .map(|source| source.get_range())
            .unwrap_or_default();
        let filters = self.0.filters.borrow();
        let mut items: Vec<Record> = range
            .into_iter()
            .filter(|record| filters.matches(record))
            .collect();
        self.0.sorters.borrow().sort(&mut items);
        *self.0.items.borrow_mut() = items;
    }

    /// Position for a record arriving from the source while unsorted:
    /// right after the nearest preceding source record this view holds.
    fn find_insert_index(items: &[Record], source_range: &[Record], record: &Record) -> usize {
        let Some(at) = position_of(source_range, record) else {
            return items.len();
        };
        source_range[..at]
            .iter()
            .rev()
            .find_map(|previous| position_of(items, previous))
            .map_or(0, |index| index + 1)
    }

    fn on_source_change(&self, change: &SourceChange) {
        if self.is_destroyed() {
            return;
        }
        trace!(model = %self.0.model.name, change = change.name(), "source changed");

        match change {
            SourceChange::Added(records) => self.source_added(records),
            SourceChange::Removed(records) => self.source_removed(records),
            SourceChange::Updated {
                record,
                kind,
                modified,
            } => self.source_updated(record, *kind, modified.as_deref()),
            SourceChange::Refreshed => {
                self.rebuild();
                self.fire(StoreEvent::Refresh);
                self.fire(StoreEvent::DataChanged);
                self.0.chained.notify(&SourceChange::Refreshed);
            }
            // Membership is unchanged and the view keeps its own order
            SourceChange::Resorted => {
                self.fire(StoreEvent::Refresh);
                self.fire(StoreEvent::DataChanged);
                self.0.chained.notify(&SourceChange::Resorted);
            }
            SourceChange::Cleared { silent } => {
                self.0.items.borrow_mut().clear();
                if !silent {
                    self.fire(StoreEvent::Clear);
                    self.fire(StoreEvent::DataChanged);
                }
                self.0
                    .chained
                    .notify(&SourceChange::Cleared { silent: *silent });
            }
            SourceChange::BeforeLoad(operation) => {
                self.fire(StoreEvent::BeforeLoad {
                    operation: operation.clone(),
                });
                self.0.chained.notify(change);
            }
            SourceChange::Loaded { operation, .. } => {
                self.rebuild();
                let records = self.get_range();
                self.fire(StoreEvent::Load {
                    records: records.clone(),
                    success: true,
                    operation: operation.clone(),
                });
                self.fire(StoreEvent::Refresh);
                self.fire(StoreEvent::DataChanged);
                self.0.chained.notify(&SourceChange::Loaded {
                    records,
                    operation: operation.clone(),
                });
            }
            SourceChange::LoadFailed { operation, error } => {
                self.fire(StoreEvent::LoadFailed {
                    operation: operation.clone(),
                    error: error.clone(),
                });
                self.fire(StoreEvent::Load {
                    records: Vec::new(),
                    success: false,
                    operation: operation.clone(),
                });
                self.0.chained.notify(change);
            }
            SourceChange::Destroyed => self.detach(),
        }
    }

    fn source_added(&self, records: &[Record]) {
        let source_range = self
            .get_source()
            .map(|source| source.get_range())
            .unwrap_or_default();

        let placed: Vec<(usize, Record)> = {
            let mut items = self.0.items.borrow_mut();
            let filters = self.0.filters.borrow();
            let sorters = self.0.sorters.borrow();
            let requested = self.0.requested_index.get();

            let mut placed: Vec<Record> = Vec::new();
            for record in records {
                if position_of(&items, record).is_some()
                    || position_of(&source_range, record).is_none()
                    || !filters.matches(record)
                {
                    continue;
                }
                let at = if sorters.is_active() {
                    sorters.insertion_index(&items, record)
                } else if let Some(index) = requested {
                    (index + placed.len()).min(items.len())
                } else {
                    Self::find_insert_index(&items, &source_range, record)
                };
                items.insert(at, record.clone());
                placed.push(record.clone());
            }

            let mut positioned: Vec<(usize, Record)> = placed
                .into_iter()
                .filter_map(|r| position_of(&items, &r).map(|i| (i, r)))
                .collect();
            positioned.sort_by_key(|(index, _)| *index);
            positioned
        };

        for (index, run) in contiguous_runs(placed.clone()) {
            self.fire(StoreEvent::Add { records: run, index });
        }
        self.fire(StoreEvent::DataChanged);

        if !placed.is_empty() {
            self.0.chained.notify(&SourceChange::Added(
                placed.into_iter().map(|(_, r)| r).collect(),
            ));
        }
    }

    fn source_removed(&self, records: &[Record]) {
        let positioned: Vec<(usize, Record)> = {
            let mut items = self.0.items.borrow_mut();
            let positioned: Vec<(usize, Record)> = records
                .iter()
                .filter_map(|r| position_of(&items, r).map(|i| (i, r.clone())))
                .collect();
            items.retain(|item| !records.iter().any(|r| r.ptr_eq(item)));
            positioned
        };

        let mut runs = contiguous_runs(positioned.clone());
        runs.reverse();
        for (index, run) in runs {
            self.fire(StoreEvent::Remove { records: run, index });
        }
        self.fire(StoreEvent::DataChanged);

        if !positioned.is_empty() {
            let mut positioned = positioned;
            positioned.sort_by_key(|(index, _)| *index);
            self.0.chained.notify(&SourceChange::Removed(
                positioned.into_iter().map(|(_, r)| r).collect(),
            ));
        }
    }

    fn source_updated(&self, record: &Record, kind: UpdateKind, modified: Option<&[String]>) {
        let present = position_of(&self.0.items.borrow(), record);
        let passes = self.0.filters.borrow().matches(record);

        match (present, passes) {
            (Some(_), true) => {
                {
                    let sorters = self.0.sorters.borrow();
                    if sorters.is_active() {
                        sorters.reposition(&mut self.0.items.borrow_mut(), record);
                    } else {
                        self.follow_source_position(record);
                    }
                }
                let modified = modified.map(<[String]>::to_vec);
                self.fire(StoreEvent::Update {
                    record: record.clone(),
                    kind,
                    modified: modified.clone(),
                });
                self.0.chained.notify(&SourceChange::Updated {
                    record: record.clone(),
                    kind,
                    modified,
                });
            }
            (Some(index), false) => {
                self.0.items.borrow_mut().remove(index);
                self.fire(StoreEvent::Remove {
                    records: vec![record.clone()],
                    index,
                });
                self.fire(StoreEvent::DataChanged);
                self.0
                    .chained
                    .notify(&SourceChange::Removed(vec![record.clone()]));
            }
            (None, true) => self.source_added(std::slice::from_ref(record)),
            (None, false) => {}
        }
    }

    /// Move `record` back next to the source record it follows there, after
    /// an edit that may have moved it in a sorted source
    fn follow_source_position(&self, record: &Record) {
        let source_range = self
            .get_source()
            .map(|source| source.get_range())
            .unwrap_or_default();
        let mut items = self.0.items.borrow_mut();
        let Some(at) = position_of(&items, record) else {
            return;
        };
        let moved = items.remove(at);
        let to = Self::find_insert_index(&items, &source_range, &moved);
        items.insert(to, moved);
    }

    /// The source went away: empty out and pass the detach down the chain
    fn detach(&self) {
        if self.0.source.take().is_none() {
            return;
        }
        self.0.items.borrow_mut().clear();
        debug!(model = %self.0.model.name, "view detached from destroyed source");

        self.fire(StoreEvent::Clear);
        self.fire(StoreEvent::DataChanged);
        self.0.chained.release(&SourceChange::Destroyed);
    }
}

impl FilterHost for DerivedView {
    fn filter_set(&self) -> &RefCell<FilterSet> {
        &self.0.filters
    }

    fn update_filters(
        &self,
        change: &mut dyn FnMut(&mut FilterSet) -> bool,
    ) -> Result<()> {
        self.ensure_live("filter")?;
        if !change(&mut self.0.filters.borrow_mut()) {
            return Ok(());
        }

        self.rebuild();
        debug!(
            model = %self.0.model.name,
            filters = self.0.filters.borrow().len(),
            visible = self.get_count(),
            "view filters changed"
        );

        self.fire(StoreEvent::Refresh);
        self.fire(StoreEvent::DataChanged);
        self.fire(StoreEvent::FilterChange);
        self.0.chained.notify(&SourceChange::Refreshed);
        Ok(())
    }
}

impl SorterHost for DerivedView {
    fn sorter_set(&self) -> &RefCell<SorterSet> {
        &self.0.sorters
    }

    fn update_sorters(
        &self,
        change: &mut dyn FnMut(&mut SorterSet) -> bool,
    ) -> Result<()> {
        self.ensure_live("sort")?;
        if !change(&mut self.0.sorters.borrow_mut()) {
            return Ok(());
        }

        self.rebuild();
        debug!(
            model = %self.0.model.name,
            sorters = self.0.sorters.borrow().len(),
            "view sorters changed"
        );

        self.fire(StoreEvent::Refresh);
        self.fire(StoreEvent::DataChanged);
        self.0.chained.notify(&SourceChange::Resorted);
        Ok(())
    }
}

impl RecordAccess for DerivedView {
    fn get_range(&self) -> Vec<Record> {
        self.0.items.borrow().clone()
    }

    fn get_at(&self, index: usize) -> Option<Record> {
        self.0.items.borrow().get(index).cloned()
    }

    fn get_count(&self) -> usize {
        self.0.items.borrow().len()
    }

    fn index_of(&self, record: &Record) -> isize {
        position_of(&self.0.items.borrow(), record).map_or(-1, |index| index as isize)
    }

    fn get_model(&self) -> Arc<Model> {
        self.0.model.clone()
    }
}

impl Observable for DerivedView {
    fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Source, &StoreEvent) + 'static,
    {
        self.0.bus.on(listener)
    }

    fn un(&self, id: ListenerId) -> bool {
        self.0.bus.un(id)
    }

    fn suspend_events(&self, queue: bool) {
        self.0.bus.suspend(queue);
    }

    fn resume_events(&self) {
        self.0.bus.resume(&self.emitter());
    }

    fn has_listeners(&self) -> bool {
        self.0.bus.listener_count() > 0
    }
}

impl fmt::Debug for DerivedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedView")
            .field("model", &self.0.model.name)
            .field("count", &self.0.items.borrow().len())
            .field("filters", &self.0.filters.borrow().len())
            .field("sorters", &self.0.sorters.borrow().len())
            .field("detached", &self.is_detached())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::BackingCollection;
    use serde_json::json;
    use strata_model::FieldKind;

    fn collection() -> BackingCollection {
        let model = Model::new("Item")
            .with_field("id", FieldKind::Int)
            .with_field("label", FieldKind::String);
        let collection = BackingCollection::new(Arc::new(model));
        collection
            .add([
                json!({"id": 1, "label": "one"}),
                json!({"id": 2, "label": "two"}),
                json!({"id": 3, "label": "three"}),
            ])
            .unwrap();
        collection
    }

    #[test]
    fn construction_mirrors_source_without_events() {
        let source = collection();
        let view = DerivedView::new(&source).unwrap();
        assert_eq!(view.get_range(), source.get_range());
        assert!(!view.has_listeners());
        assert_eq!(source.chained().len(), 1);
    }

    #[test]
    fn destroyed_source_is_rejected() {
        let source = collection();
        source.destroy();
        assert!(matches!(
            DerivedView::new(&source),
            Err(StoreError::InvalidSource(_))
        ));
    }

    #[test]
    fn insert_index_follows_source_position() {
        let items = collection().get_range();
        let held = vec![items[0].clone(), items[2].clone()];
        assert_eq!(DerivedView::find_insert_index(&held, &items, &items[1]), 1);
        assert_eq!(DerivedView::find_insert_index(&[], &items, &items[1]), 0);
    }

    #[test]
    fn dropped_view_is_pruned_from_source() {
        let source = collection();
        {
            let _view = DerivedView::new(&source).unwrap();
            assert_eq!(source.chained().len(), 1);
        }
        assert_eq!(source.chained().len(), 0);
        source.add([json!({"id": 4, "label": "four"})]).unwrap();
        assert_eq!(source.get_count(), 4);
    }

    #[test]
    fn detached_view_rejects_writes() {
        let source = collection();
        let view = DerivedView::new(&source).unwrap();
        source.destroy();

        assert!(view.is_detached());
        assert_eq!(view.get_count(), 0);
        assert!(matches!(
            view.add([json!({"id": 9})]),
            Err(StoreError::InvalidOperation(_))
        ));
    }
}
