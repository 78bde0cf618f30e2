//! Records
//!
//! A [`Record`] is a cheap handle to one entity. Clones share state, and
//! equality is handle identity. Only backing collections join a record; the
//! views layered on top of them never do.

use crate::error::{Result, StoreError};
use crate::events::UpdateKind;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use strata_model::{FieldMap, FieldValue, Model, RecordId, RecordKey};

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Matches its last committed state
    Clean,
    /// Has uncommitted field edits
    Modified,
    /// Created without an identity; carries a generated key
    Phantom,
    /// Removed from its owning collection
    Dropped,
}

/// Back-reference target notified when a joined record changes
pub(crate) trait RecordOwner {
    fn record_changed(
        &self,
        record: &Record,
        kind: UpdateKind,
        modified: Option<&[String]>,
    );
}

struct RecordInner {
    id: RecordId,
    key: RecordKey,
    model: Arc<Model>,
    data: RefCell<FieldMap>,
    originals: RefCell<FieldMap>,
    status: Cell<RecordStatus>,
    joined: RefCell<Vec<Weak<dyn RecordOwner>>>,
}

/// Handle to a single record
#[derive(Clone)]
pub struct Record(Rc<RecordInner>);

impl Record {
    /// Build a record from raw JSON, converting through the model's fields
    pub fn new(model: Arc<Model>, raw: &Value) -> Result<Self> {
        let data = model.convert_row(raw)?;
        Ok(Self::from_data(model, data))
    }

    /// Build a record from already typed data.
    ///
    /// A record with no identity value gets a phantom key from the model.
    pub fn from_data(model: Arc<Model>, data: FieldMap) -> Self {
        let (key, status) = match model.identity_of(&data) {
            Some(key) => (key, RecordStatus::Clean),
            None => (model.next_phantom_key(), RecordStatus::Phantom),
        };

        Record(Rc::new(RecordInner {
            id: RecordId::new(),
            key,
            model,
            data: RefCell::new(data),
            originals: RefCell::new(FieldMap::new()),
            status: Cell::new(status),
            joined: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> RecordId {
        self.0.id
    }

    pub fn key(&self) -> &RecordKey {
        &self.0.key
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.0.model
    }

    pub fn status(&self) -> RecordStatus {
        self.0.status.get()
    }

    pub fn is_phantom(&self) -> bool {
        self.status() == RecordStatus::Phantom
    }

    pub fn is_dirty(&self) -> bool {
        !self.0.originals.borrow().is_empty()
    }

    pub fn is_modified(&self, field: &str) -> bool {
        self.0.originals.borrow().contains_key(field)
    }

    /// Value of `field`, or `Null` when absent
    pub fn get(&self, field: &str) -> FieldValue {
        self.0.data.borrow().get(field).cloned().unwrap_or_default()
    }

    pub fn data(&self) -> FieldMap {
        self.0.data.borrow().clone()
    }

    /// Snapshot of the record as a JSON object
    pub fn get_data(&self) -> Value {
        let data = self.0.data.borrow();
        Value::Object(
            data.iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Current values of every field edited since the last commit
    pub fn get_changes(&self) -> FieldMap {
        let originals = self.0.originals.borrow();
        let data = self.0.data.borrow();
        originals
            .keys()
            .map(|name| {
                (name.clone(), data.get(name).cloned().unwrap_or_default())
            })
            .collect()
    }

    /// Set one field. Returns whether the value changed.
    ///
    /// The identity field cannot be changed, not even on a phantom: its
    /// generated key is its identity for as long as the record lives.
    pub fn set(
        &self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<bool> {
        let modified = self.apply(vec![(field.into(), value.into())])?;
        Ok(!modified.is_empty())
    }

    /// Set several fields as a single edit.
    ///
    /// Every value is converted before any is applied, so a conversion
    /// failure leaves the record untouched. Returns the changed field names.
    pub fn set_values<I, K, V>(&self, values: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.apply(
            values
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }

    /// Accept all edits as the new clean state
    pub fn commit(&self) {
        self.0.originals.borrow_mut().clear();
        if self.status() != RecordStatus::Dropped {
            self.0.status.set(RecordStatus::Clean);
        }
        self.notify(UpdateKind::Commit, None);
    }

    /// Restore every edited field to its last committed value
    pub fn reject(&self) {
        {
            let mut originals = self.0.originals.borrow_mut();
            let mut data = self.0.data.borrow_mut();
            for (field, original) in std::mem::take(&mut *originals) {
                data.insert(field, original);
            }
        }
        if self.status() == RecordStatus::Modified {
            self.0.status.set(RecordStatus::Clean);
        }
        self.notify(UpdateKind::Reject, None);
    }

    /// Number of live collections this record is joined to
    pub fn joined_count(&self) -> usize {
        self.0
            .joined
            .borrow()
            .iter()
            .filter(|owner| owner.strong_count() > 0)
            .count()
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn join(&self, owner: &Weak<dyn RecordOwner>) {
        let mut joined = self.0.joined.borrow_mut();
        joined.retain(|existing| existing.strong_count() > 0);
        if !joined.iter().any(|existing| same_owner(existing, owner)) {
            joined.push(owner.clone());
        }
    }

    pub(crate) fn unjoin(&self, owner: &Weak<dyn RecordOwner>) {
        self.0
            .joined
            .borrow_mut()
            .retain(|existing| !same_owner(existing, owner));
    }

    pub(crate) fn mark_dropped(&self) {
        self.0.status.set(RecordStatus::Dropped);
    }

    /// Bring a dropped record back to a live status when it is re-added
    pub(crate) fn mark_joined(&self) {
        if self.status() != RecordStatus::Dropped {
            return;
        }
        let status = if self.0.model.identity_of(&self.0.data.borrow()).is_none() {
            RecordStatus::Phantom
        } else if self.is_dirty() {
            RecordStatus::Modified
        } else {
            RecordStatus::Clean
        };
        self.0.status.set(status);
    }

    fn apply(&self, values: Vec<(String, FieldValue)>) -> Result<Vec<String>> {
        let model = &self.0.model;
        let mut converted = Vec::with_capacity(values.len());
        for (field, value) in values {
            let value = model.convert_field(&field, &value)?;
            if field == model.id_property {
                if value != self.get(&field) {
                    return Err(StoreError::InvalidOperation(format!(
                        "identity field `{field}` of record {} is immutable",
                        self.0.key
                    )));
                }
                continue;
            }
            converted.push((field, value));
        }

        let mut modified: Vec<String> = Vec::new();
        {
            let mut data = self.0.data.borrow_mut();
            let mut originals = self.0.originals.borrow_mut();
            for (field, value) in converted {
                let current = data.get(&field).cloned().unwrap_or_default();
                if current == value {
                    continue;
                }
                match originals.get(&field) {
                    Some(original) if *original == value => {
                        originals.remove(&field);
                    }
                    Some(_) => {}
                    None => {
                        originals.insert(field.clone(), current);
                    }
                }
                data.insert(field.clone(), value);
                if !modified.contains(&field) {
                    modified.push(field);
                }
            }

            match self.status() {
                RecordStatus::Clean if !originals.is_empty() => {
                    self.0.status.set(RecordStatus::Modified)
                }
                RecordStatus::Modified if originals.is_empty() => {
                    self.0.status.set(RecordStatus::Clean)
                }
                _ => {}
            }
        }

        if !modified.is_empty() {
            self.notify(UpdateKind::Edit, Some(&modified));
        }
        Ok(modified)
    }

    fn notify(&self, kind: UpdateKind, modified: Option<&[String]>) {
        // No borrow of the joined list may be held while owners run; an owner
        // can drop the record mid-notification.
        let owners: Vec<Rc<dyn RecordOwner>> = self
            .0
            .joined
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for owner in owners {
            owner.record_changed(self, kind, modified);
        }
    }
}

fn same_owner(a: &Weak<dyn RecordOwner>, b: &Weak<dyn RecordOwner>) -> bool {
    std::ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.0.key)
            .field("status", &self.0.status.get())
            .field("data", &*self.0.data.borrow())
            .finish_non_exhaustive()
    }
}
