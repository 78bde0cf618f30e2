//! BackingCollection - the authoritative owner of records
//!
//! A collection keeps three sequences over the same membership:
//!
//! - `all`: canonical order, i.e. load and insert order
//! - `ordered`: every member in the current sort order (equal to `all` when
//!   no sorter is active)
//! - `visible`: `ordered` restricted to records passing the filters
//!
//! Read accessors work over `visible`. Views chained off the collection are
//! told about changes after the collection's own listeners have run.

use crate::access::RecordAccess;
use crate::config::{CollectionConfig, DuplicatePolicy};
use crate::error::{Result, StoreError};
use crate::events::{EventBus, Observable, StoreEvent, UpdateKind, contiguous_runs};
use crate::proxy::{Operation, Proxy, ProxyError};
use crate::query::filtering::{FilterHost, FilterSet};
use crate::query::sorting::{SorterHost, SorterSet};
use crate::query::{Filter, FiltersHandle, SortDirection, Sorter, SortersHandle};
use crate::record::{Record, RecordOwner};
use crate::source::{ChainObservers, Source, SourceChange};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use strata_model::{ListenerId, Model, RecordId, RecordKey};
use tracing::{debug, info, trace, warn};

/// Input accepted by `add`, `insert` and `load_data`
#[derive(Debug, Clone)]
pub enum RecordInput {
    /// An existing record handle
    Record(Record),
    /// Raw data converted through the collection's model
    Raw(Value),
}

impl From<Record> for RecordInput {
    fn from(record: Record) -> Self {
        RecordInput::Record(record)
    }
}

impl From<&Record> for RecordInput {
    fn from(record: &Record) -> Self {
        RecordInput::Record(record.clone())
    }
}

impl From<Value> for RecordInput {
    fn from(raw: Value) -> Self {
        RecordInput::Raw(raw)
    }
}

pub(crate) fn position_of(records: &[Record], record: &Record) -> Option<usize> {
    records.iter().position(|r| r.ptr_eq(record))
}

#[derive(Default)]
struct DataSet {
    all: Vec<Record>,
    ordered: Vec<Record>,
    visible: Vec<Record>,
    keys: HashMap<RecordKey, Record>,
}

impl DataSet {
    fn contains(&self, record: &Record) -> bool {
        self.keys
            .get(record.key())
            .is_some_and(|member| member.ptr_eq(record))
    }

    fn refilter(&mut self, filters: &FilterSet) {
        self.visible = self
            .ordered
            .iter()
            .filter(|record| filters.matches(record))
            .cloned()
            .collect();
    }
}

pub(crate) struct CollectionInner {
    this: Weak<CollectionInner>,
    owner: Weak<dyn RecordOwner>,
    model: Arc<Model>,
    config: CollectionConfig,
    data: RefCell<DataSet>,
    filters: RefCell<FilterSet>,
    sorters: RefCell<SorterSet>,
    bus: EventBus,
    chained: ChainObservers,
    proxy: RefCell<Option<Rc<dyn Proxy>>>,
    load_generation: Cell<u64>,
    loading: Cell<bool>,
    destroyed: Cell<bool>,
}

impl RecordOwner for CollectionInner {
    fn record_changed(
        &self,
        record: &Record,
        kind: UpdateKind,
        modified: Option<&[String]>,
    ) {
        if let Some(inner) = self.this.upgrade() {
            BackingCollection(inner).on_record_changed(record, kind, modified);
        }
    }
}

/// The authoritative collection of records
#[derive(Clone)]
pub struct BackingCollection(pub(crate) Rc<CollectionInner>);

impl BackingCollection {
    pub fn new(model: Arc<Model>) -> Self {
        Self::with_config(model, CollectionConfig::default())
    }

    pub fn with_config(model: Arc<Model>, config: CollectionConfig) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<CollectionInner>| {
            let owner: Weak<dyn RecordOwner> = this.clone();
            CollectionInner {
                this: this.clone(),
                owner,
                model,
                config,
                data: RefCell::new(DataSet::default()),
                filters: RefCell::new(FilterSet::default()),
                sorters: RefCell::new(SorterSet::default()),
                bus: EventBus::new(),
                chained: ChainObservers::default(),
                proxy: RefCell::new(None),
                load_generation: Cell::new(0),
                loading: Cell::new(false),
                destroyed: Cell::new(false),
            }
        });
        BackingCollection(inner)
    }

    /// Create a collection already holding the rows of `raw`
    pub fn from_raw(
        model: Arc<Model>,
        config: CollectionConfig,
        raw: Value,
    ) -> Result<Self> {
        let collection = Self::with_config(model, config);
        collection.load_raw_data(raw)?;
        Ok(collection)
    }

    pub fn with_proxy<P: Proxy + 'static>(self, proxy: P) -> Self {
        self.set_proxy(proxy);
        self
    }

    /// Attach the proxy `load` reads from
    pub fn set_proxy<P: Proxy + 'static>(&self, proxy: P) {
        *self.0.proxy.borrow_mut() = Some(Rc::new(proxy));
    }

    pub fn store_id(&self) -> Option<&str> {
        self.0.config.store_id.as_deref()
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.0.config
    }

    pub fn ptr_eq(&self, other: &BackingCollection) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn is_loading(&self) -> bool {
        self.0.loading.get()
    }

    pub fn is_filtered(&self) -> bool {
        self.0.filters.borrow().is_active()
    }

    pub fn is_sorted(&self) -> bool {
        self.0.sorters.borrow().is_active()
    }

    /// Every member in canonical order, ignoring filters and sorters
    pub fn canonical_range(&self) -> Vec<Record> {
        self.0.data.borrow().all.clone()
    }

    /// Member with identity `key`, whether or not it is filtered out
    pub fn get_by_id(&self, key: &RecordKey) -> Option<Record> {
        self.0.data.borrow().keys.get(key).cloned()
    }

    pub fn get_by_internal_id(&self, id: RecordId) -> Option<Record> {
        self.0
            .data
            .borrow()
            .all
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    /// Whether `record` is a member, visible or not
    pub fn contains(&self, record: &Record) -> bool {
        self.0.data.borrow().contains(record)
    }

    pub fn add<I>(&self, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        self.insert_records(None, items.into_iter().map(Into::into).collect())
    }

    /// Insert before the record currently visible at `index`, or append when
    /// `index` is past the end. With sorters active the sort decides the
    /// visible position.
    pub fn insert<I>(&self, index: usize, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        self.insert_records(
            Some(index),
            items.into_iter().map(Into::into).collect(),
        )
    }

    pub fn remove(&self, records: &[Record]) -> Result<Vec<Record>> {
        self.ensure_live("remove records from")?;

        let (removed, positioned) = {
            let mut guard = self.0.data.borrow_mut();
            let data = &mut *guard;

            let mut removed: Vec<Record> = Vec::new();
            for record in records {
                if data.contains(record) && position_of(&removed, record).is_none() {
                    removed.push(record.clone());
                }
            }
            if removed.is_empty() {
                return Ok(removed);
            }

            let positioned: Vec<(usize, Record)> = removed
                .iter()
                .filter_map(|r| position_of(&data.visible, r).map(|i| (i, r.clone())))
                .collect();

            let ids: HashSet<RecordId> = removed.iter().map(Record::id).collect();
            data.all.retain(|r| !ids.contains(&r.id()));
            data.ordered.retain(|r| !ids.contains(&r.id()));
            data.visible.retain(|r| !ids.contains(&r.id()));
            for record in &removed {
                data.keys.remove(record.key());
            }
            (removed, positioned)
        };

        for record in &removed {
            record.unjoin(&self.0.owner);
            record.mark_dropped();
        }

        debug!(
            store_id = self.label(),
            removed = removed.len(),
            visible = positioned.len(),
            "records removed"
        );

        // Highest index first so each event's index is valid when applied
        // in order.
        let mut runs = contiguous_runs(positioned.clone());
        runs.reverse();
        for (index, records) in runs {
            self.fire(StoreEvent::Remove { records, index });
        }
        self.fire(StoreEvent::DataChanged);

        if !positioned.is_empty() {
            let mut positioned = positioned;
            positioned.sort_by_key(|(index, _)| *index);
            self.0.chained.notify(&SourceChange::Removed(
                positioned.into_iter().map(|(_, r)| r).collect(),
            ));
        }

        Ok(removed)
    }

    /// Remove the record visible at `index`; nothing happens past the end
    pub fn remove_at(&self, index: usize) -> Result<Vec<Record>> {
        match self.get_at(index) {
            Some(record) => self.remove(&[record]),
            None => {
                self.ensure_live("remove records from")?;
                Ok(Vec::new())
            }
        }
    }

    /// Empty the collection. A silent clear raises no events here or in
    /// chained views.
    pub fn remove_all(&self, silent: bool) -> Result<Vec<Record>> {
        self.ensure_live("clear")?;

        let records = {
            let mut data = self.0.data.borrow_mut();
            data.keys.clear();
            data.ordered.clear();
            data.visible.clear();
            std::mem::take(&mut data.all)
        };

        for record in &records {
            record.unjoin(&self.0.owner);
            record.mark_dropped();
        }

        debug!(store_id = self.label(), removed = records.len(), silent, "collection cleared");

        if !silent {
            self.fire(StoreEvent::Clear);
            self.fire(StoreEvent::DataChanged);
        }
        self.0.chained.notify(&SourceChange::Cleared { silent });
        Ok(records)
    }

    /// Add or replace a filter
    pub fn filter(&self, filter: Filter) -> Result<()> {
        self.get_filters().add(filter)
    }

    pub fn filter_by<F>(&self, id: impl Into<String>, predicate: F) -> Result<()>
    where
        F: Fn(&Record) -> bool + 'static,
    {
        self.get_filters().add(Filter::by(id, predicate))
    }

    pub fn remove_filter(&self, id: &str) -> Result<()> {
        self.get_filters().remove(id)
    }

    /// Drop every filter. With `suppress_event` the collection raises no
    /// events of its own; chained views still refresh.
    pub fn clear_filter(&self, suppress_event: bool) -> Result<()> {
        if suppress_event {
            self.0.bus.suspend(false);
            let result = self.get_filters().remove_all();
            self.0.bus.resume(&self.emitter());
            result
        } else {
            self.get_filters().remove_all()
        }
    }

    pub fn get_filters(&self) -> FiltersHandle<'_> {
        FiltersHandle::new(self)
    }

    /// Sort by a single property, replacing the current sorters
    pub fn sort(&self, property: &str, direction: SortDirection) -> Result<()> {
        self.get_sorters()
            .replace([Sorter::new(property, direction)])
    }

    /// Replace the current sorters with `sorters`
    pub fn sort_by<I>(&self, sorters: I) -> Result<()>
    where
        I: IntoIterator<Item = Sorter>,
    {
        self.get_sorters().replace(sorters)
    }

    pub fn get_sorters(&self) -> SortersHandle<'_> {
        SortersHandle::new(self)
    }

    /// Replace the content with `items` without add or remove events
    pub fn load_data<I>(&self, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        self.ensure_live("load data into")?;
        let records = self.materialize(items.into_iter().map(Into::into).collect())?;
        unique_keys(&records)?;
        self.replace_and_refresh(records)
    }

    /// Replace the content with rows read from a raw response
    pub fn load_raw_data(&self, raw: Value) -> Result<Vec<Record>> {
        self.ensure_live("load data into")?;
        let records = self.read_records(raw, None)?;
        self.replace_and_refresh(records)
    }

    /// Load through the configured proxy.
    ///
    /// `beforeload` fires before this returns; the rest happens when the
    /// returned future completes. Calling `load` again while a load is
    /// pending supersedes it: the older future resolves to
    /// [`StoreError::LoadSuperseded`] and its response is discarded.
    pub fn load(&self) -> LocalBoxFuture<'static, Result<Vec<Record>>> {
        self.load_with(Map::new())
    }

    /// [`load`](Self::load) with request parameters attached to the operation
    pub fn load_with(
        &self,
        params: Map<String, Value>,
    ) -> LocalBoxFuture<'static, Result<Vec<Record>>> {
        let started = self.begin_load(params);
        let collection = Rc::downgrade(&self.0);

        async move {
            let (generation, operation, proxy) = started?;
            let response = proxy.read(&operation).await;
            match collection.upgrade() {
                Some(inner) => {
                    BackingCollection(inner).finish_load(generation, operation, response)
                }
                None => Err(StoreError::InvalidOperation(
                    "collection was dropped while loading".to_string(),
                )),
            }
        }
        .boxed_local()
    }

    /// Tear the collection down: records are unjoined, chained views
    /// detach and listeners are dropped. Further mutation fails.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }

        let records = {
            let mut data = self.0.data.borrow_mut();
            data.keys.clear();
            data.ordered.clear();
            data.visible.clear();
            std::mem::take(&mut data.all)
        };
        for record in &records {
            record.unjoin(&self.0.owner);
        }

        // Any pending load is now stale
        self.0.load_generation.set(self.0.load_generation.get() + 1);
        self.0.loading.set(false);

        debug!(store_id = self.label(), records = records.len(), "collection destroyed");
        self.0.chained.release(&SourceChange::Destroyed);
        self.0.bus.clear();
    }

    pub(crate) fn chained(&self) -> &ChainObservers {
        &self.0.chained
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Rc::downgrade(&self.0)
    }

    fn emitter(&self) -> Source {
        Source::Collection(self.clone())
    }

    fn fire(&self, event: StoreEvent) {
        trace!(store_id = self.label(), event = %event.kind(), "firing");
        self.0.bus.fire(&self.emitter(), event);
    }

    fn label(&self) -> &str {
        self.store_id().unwrap_or("<anonymous>")
    }

    fn ensure_live(&self, action: &str) -> Result<()> {
        if self.is_destroyed() {
            warn!(store_id = self.label(), "attempt to {action} a destroyed collection");
            return Err(StoreError::InvalidOperation(format!(
                "cannot {action} a destroyed collection"
            )));
        }
        Ok(())
    }

    fn materialize(&self, inputs: Vec<RecordInput>) -> Result<Vec<Record>> {
        inputs
            .into_iter()
            .map(|input| match input {
                RecordInput::Record(record) => Ok(record),
                RecordInput::Raw(raw) => Record::new(self.0.model.clone(), &raw),
            })
            .collect()
    }

    fn read_records(
        &self,
        raw: Value,
        operation: Option<&Operation>,
    ) -> Result<Vec<Record>> {
        let rows = self.0.config.reader.read(raw).map_err(|err| {
            StoreError::LoadFailed {
                operation_id: operation.map(|op| op.id),
                reason: err.to_string(),
            }
        })?;
        let records = rows
            .rows
            .iter()
            .map(|row| Record::new(self.0.model.clone(), row))
            .collect::<Result<Vec<_>>>()?;
        unique_keys(&records)?;
        Ok(records)
    }

    fn insert_records(
        &self,
        index: Option<usize>,
        inputs: Vec<RecordInput>,
    ) -> Result<Vec<Record>> {
        self.ensure_live("add records to")?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.materialize(inputs)?;
        let replaced = self.check_identities(&records)?;
        if !replaced.is_empty() {
            debug!(store_id = self.label(), replaced = replaced.len(), "replacing records by identity");
            self.remove(&replaced)?;
        }

        let positioned: Vec<(usize, Record)> = {
            let mut guard = self.0.data.borrow_mut();
            let data = &mut *guard;
            let sorters = self.0.sorters.borrow();

            let at = index
                .and_then(|i| data.visible.get(i))
                .and_then(|anchor| position_of(&data.all, anchor))
                .unwrap_or(data.all.len());
            let tail = data.all.split_off(at);
            data.all.extend(records.iter().cloned());
            data.all.extend(tail);

            if sorters.is_active() {
                for record in &records {
                    let to = sorters.insertion_index(&data.ordered, record);
                    data.ordered.insert(to, record.clone());
                }
            } else {
                data.ordered = data.all.clone();
            }

            for record in &records {
                data.keys.insert(record.key().clone(), record.clone());
            }
            data.refilter(&self.0.filters.borrow());

            let mut positioned: Vec<(usize, Record)> = records
                .iter()
                .filter_map(|r| position_of(&data.visible, r).map(|i| (i, r.clone())))
                .collect();
            positioned.sort_by_key(|(index, _)| *index);
            positioned
        };

        for record in &records {
            record.join(&self.0.owner);
            record.mark_joined();
        }

        debug!(
            store_id = self.label(),
            added = records.len(),
            visible = positioned.len(),
            "records added"
        );

        for (index, run) in contiguous_runs(positioned.clone()) {
            self.fire(StoreEvent::Add { records: run, index });
        }
        self.fire(StoreEvent::DataChanged);

        if !positioned.is_empty() {
            self.0.chained.notify(&SourceChange::Added(
                positioned.into_iter().map(|(_, r)| r).collect(),
            ));
        }

        Ok(records)
    }

    /// Validate incoming identities against the batch and the membership.
    ///
    /// Returns the members a `Replace` policy will evict.
    fn check_identities(&self, records: &[Record]) -> Result<Vec<Record>> {
        unique_keys(records)?;

        let data = self.0.data.borrow();
        let mut replaced = Vec::new();
        for record in records {
            if data.contains(record) {
                return Err(StoreError::InvalidOperation(format!(
                    "record {} already belongs to this collection",
                    record.key()
                )));
            }
            if let Some(existing) = data.keys.get(record.key()) {
                match self.0.config.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        warn!(store_id = self.label(), key = %record.key(), "duplicate identity rejected");
                        return Err(StoreError::DuplicateIdentity {
                            key: record.key().clone(),
                        });
                    }
                    DuplicatePolicy::Replace => replaced.push(existing.clone()),
                }
            }
        }
        Ok(replaced)
    }

    /// Swap the whole membership without granular events
    fn replace_data(&self, records: Vec<Record>) {
        let old = {
            let mut guard = self.0.data.borrow_mut();
            let data = &mut *guard;
            let old = std::mem::take(&mut data.all);

            data.keys = records
                .iter()
                .map(|r| (r.key().clone(), r.clone()))
                .collect();
            data.all = records.clone();
            data.ordered = records.clone();
            self.0.sorters.borrow().sort(&mut data.ordered);
            data.refilter(&self.0.filters.borrow());
            old
        };

        let kept: HashSet<RecordId> = records.iter().map(Record::id).collect();
        for record in old.iter().filter(|r| !kept.contains(&r.id())) {
            record.unjoin(&self.0.owner);
            record.mark_dropped();
        }
        for record in &records {
            record.join(&self.0.owner);
            record.mark_joined();
        }
    }

    fn replace_and_refresh(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        self.replace_data(records.clone());
        debug!(store_id = self.label(), count = records.len(), "data replaced");

        self.fire(StoreEvent::Refresh);
        self.fire(StoreEvent::DataChanged);
        self.0.chained.notify(&SourceChange::Refreshed);
        Ok(records)
    }

    fn begin_load(
        &self,
        params: Map<String, Value>,
    ) -> Result<(u64, Operation, Rc<dyn Proxy>)> {
        self.ensure_live("load")?;
        let proxy = self.0.proxy.borrow().clone().ok_or_else(|| {
            StoreError::InvalidOperation("no proxy configured for load".to_string())
        })?;

        if self.is_loading() {
            debug!(store_id = self.label(), "superseding pending load");
        }
        let generation = self.0.load_generation.get() + 1;
        self.0.load_generation.set(generation);
        self.0.loading.set(true);

        let operation = Operation::read(params);
        debug!(store_id = self.label(), operation_id = %operation.id, "load started");

        self.fire(StoreEvent::BeforeLoad {
            operation: operation.clone(),
        });
        self.0
            .chained
            .notify(&SourceChange::BeforeLoad(operation.clone()));

        Ok((generation, operation, proxy))
    }

    fn finish_load(
        &self,
        generation: u64,
        mut operation: Operation,
        response: std::result::Result<Value, ProxyError>,
    ) -> Result<Vec<Record>> {
        self.ensure_live("finish loading")?;
        if generation != self.0.load_generation.get() {
            debug!(
                store_id = self.label(),
                operation_id = %operation.id,
                "discarding superseded load response"
            );
            return Err(StoreError::LoadSuperseded);
        }
        self.0.loading.set(false);

        let outcome = response
            .map_err(|err| StoreError::LoadFailed {
                operation_id: Some(operation.id),
                reason: err.to_string(),
            })
            .and_then(|raw| self.read_records(raw, Some(&operation)));

        match outcome {
            Ok(records) => {
                operation.complete(Ok(()));
                self.replace_data(records.clone());
                info!(
                    store_id = self.label(),
                    operation_id = %operation.id,
                    count = records.len(),
                    "load complete"
                );

                self.fire(StoreEvent::Load {
                    records: records.clone(),
                    success: true,
                    operation: operation.clone(),
                });
                self.fire(StoreEvent::Refresh);
                self.fire(StoreEvent::DataChanged);
                self.0.chained.notify(&SourceChange::Loaded {
                    records: records.clone(),
                    operation,
                });
                Ok(records)
            }
            Err(err) => {
                let reason = match &err {
                    StoreError::LoadFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                operation.complete(Err(reason.clone()));
                warn!(
                    store_id = self.label(),
                    operation_id = %operation.id,
                    error = %reason,
                    "load failed; keeping existing data"
                );

                self.fire(StoreEvent::LoadFailed {
                    operation: operation.clone(),
                    error: reason.clone(),
                });
                self.fire(StoreEvent::Load {
                    records: Vec::new(),
                    success: false,
                    operation: operation.clone(),
                });
                self.0.chained.notify(&SourceChange::LoadFailed {
                    operation: operation.clone(),
                    error: reason.clone(),
                });
                Err(StoreError::LoadFailed {
                    operation_id: Some(operation.id),
                    reason,
                })
            }
        }
    }

    fn on_record_changed(
        &self,
        record: &Record,
        kind: UpdateKind,
        modified: Option<&[String]>,
    ) {
        if self.is_destroyed() || !self.contains(record) {
            return;
        }
        let modified = modified.map(<[String]>::to_vec);

        // Listeners see the update before any filter or sort side effect
        self.fire(StoreEvent::Update {
            record: record.clone(),
            kind,
            modified: modified.clone(),
        });

        let (before, after) = {
            let mut guard = self.0.data.borrow_mut();
            let data = &mut *guard;
            if !data.contains(record) {
                return;
            }
            let before = position_of(&data.visible, record);
            let sorters = self.0.sorters.borrow();
            if sorters.is_active() {
                sorters.reposition(&mut data.ordered, record);
            }
            data.refilter(&self.0.filters.borrow());
            (before, position_of(&data.visible, record))
        };

        match (before, after) {
            (Some(index), None) => {
                trace!(store_id = self.label(), key = %record.key(), "edited record filtered out");
                self.fire(StoreEvent::Remove {
                    records: vec![record.clone()],
                    index,
                });
                self.fire(StoreEvent::DataChanged);
                self.0
                    .chained
                    .notify(&SourceChange::Removed(vec![record.clone()]));
            }
            (None, Some(index)) => {
                trace!(store_id = self.label(), key = %record.key(), "edited record filtered in");
                self.fire(StoreEvent::Add {
                    records: vec![record.clone()],
                    index,
                });
                self.fire(StoreEvent::DataChanged);
                self.0
                    .chained
                    .notify(&SourceChange::Added(vec![record.clone()]));
            }
            (Some(_), Some(_)) => {
                self.0.chained.notify(&SourceChange::Updated {
                    record: record.clone(),
                    kind,
                    modified,
                });
            }
            (None, None) => {}
        }
    }
}

fn unique_keys(records: &[Record]) -> Result<()> {
    let mut seen: HashSet<&RecordKey> = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.key()) {
            return Err(StoreError::DuplicateIdentity {
                key: record.key().clone(),
            });
        }
    }
    Ok(())
}

impl FilterHost for BackingCollection {
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

        self.0
            .data
            .borrow_mut()
            .refilter(&self.0.filters.borrow());
        debug!(
            store_id = self.label(),
            filters = self.0.filters.borrow().len(),
            visible = self.get_count(),
            "filters changed"
        );

        self.fire(StoreEvent::Refresh);
        self.fire(StoreEvent::DataChanged);
        self.fire(StoreEvent::FilterChange);
        self.0.chained.notify(&SourceChange::Refreshed);
        Ok(())
    }
}

impl SorterHost for BackingCollection {
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

        {
            let mut guard = self.0.data.borrow_mut();
            let data = &mut *guard;
            let sorters = self.0.sorters.borrow();
            if sorters.is_active() {
                sorters.sort(&mut data.ordered);
            } else {
                data.ordered = data.all.clone();
            }
            data.refilter(&self.0.filters.borrow());
        }
        debug!(
            store_id = self.label(),
            sorters = self.0.sorters.borrow().len(),
            "sorters changed"
        );

        self.fire(StoreEvent::Refresh);
        self.fire(StoreEvent::DataChanged);
        self.0.chained.notify(&SourceChange::Resorted);
        Ok(())
    }
}

impl RecordAccess for BackingCollection {
    fn get_range(&self) -> Vec<Record> {
        self.0.data.borrow().visible.clone()
    }

    fn get_at(&self, index: usize) -> Option<Record> {
        self.0.data.borrow().visible.get(index).cloned()
    }

    fn get_count(&self) -> usize {
        self.0.data.borrow().visible.len()
    }

    fn index_of(&self, record: &Record) -> isize {
        position_of(&self.0.data.borrow().visible, record)
            .map_or(-1, |index| index as isize)
    }

    fn get_model(&self) -> Arc<Model> {
        self.0.model.clone()
    }
}

impl Observable for BackingCollection {
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

impl fmt::Debug for BackingCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.borrow();
        f.debug_struct("BackingCollection")
            .field("store_id", &self.0.config.store_id)
            .field("model", &self.0.model.name)
            .field("count", &data.all.len())
            .field("visible", &data.visible.len())
            .field("filters", &self.0.filters.borrow().len())
            .field("sorters", &self.0.sorters.borrow().len())
            .field("chained", &self.0.chained)
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}
