//! Explicit id → source lookup used to chain views by name

use crate::collection::{BackingCollection, CollectionInner};
use crate::source::Source;
use crate::view::{DerivedView, ViewInner};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Weak;
use tracing::{debug, warn};

enum WeakSource {
    Collection(Weak<CollectionInner>),
    View(Weak<ViewInner>),
}

impl WeakSource {
    fn downgrade(source: &Source) -> Self {
        match source {
            Source::Collection(c) => WeakSource::Collection(c.downgrade()),
            Source::View(v) => WeakSource::View(v.downgrade()),
        }
    }

    fn upgrade(&self) -> Option<Source> {
        let source = match self {
            WeakSource::Collection(weak) => {
                Source::Collection(BackingCollection(weak.upgrade()?))
            }
            WeakSource::View(weak) => Source::View(DerivedView(weak.upgrade()?)),
        };
        (!source.is_destroyed()).then_some(source)
    }
}

/// Registry of collections and views by string id.
///
/// Entries are weak: the registry never keeps a source alive, and a dropped
/// or destroyed source simply stops resolving.
#[derive(Default)]
pub struct StoreRegistry {
    entries: RefCell<BTreeMap<String, WeakSource>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under `id`, returning the live source it replaced
    pub fn register(&self, id: impl Into<String>, source: impl Into<Source>) -> Option<Source> {
        let id = id.into();
        let source = source.into();
        let previous = self
            .entries
            .borrow_mut()
            .insert(id.clone(), WeakSource::downgrade(&source))
            .and_then(|old| old.upgrade());

        if previous.is_some() {
            warn!(id, "replacing registered store");
        } else {
            debug!(id, "store registered");
        }
        previous
    }

    /// Resolve `id` to a live source
    pub fn lookup(&self, id: &str) -> Option<Source> {
        self.entries.borrow().get(id).and_then(WeakSource::upgrade)
    }

    pub fn unregister(&self, id: &str) -> Option<Source> {
        self.entries
            .borrow_mut()
            .remove(id)
            .and_then(|old| old.upgrade())
    }

    /// Ids of every live source, sorted
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.upgrade().is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
