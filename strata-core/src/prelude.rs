//! Curated surface for consumers.
//! Pulls the collection, view and query types plus the traits needed to call
//! their read and event methods.

pub use crate::access::{FindOptions, RecordAccess};
pub use crate::collection::{BackingCollection, RecordInput};
pub use crate::config::{CollectionConfig, DuplicatePolicy};
pub use crate::error::StoreError;
pub use crate::events::{EventKind, Observable, StoreEvent, UpdateKind};
pub use crate::proxy::{FileProxy, MemoryProxy, Proxy};
pub use crate::query::{Filter, FilterOperator, SortDirection, Sorter};
pub use crate::record::{Record, RecordStatus};
pub use crate::registry::StoreRegistry;
pub use crate::source::Source;
pub use crate::view::DerivedView;

pub use strata_model::{FieldKind, FieldValue, Model, RecordKey};
