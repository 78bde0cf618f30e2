//! # Strata Core
//!
//! Record collections with live, chained views.
//!
//! ## Overview
//!
//! - [`BackingCollection`] owns its records: canonical order, identity
//!   lookup, its own filters and sorters, and the asynchronous load pipeline.
//! - [`DerivedView`] is a projection over a collection or over another view.
//!   It filters and sorts independently, relays writes to its source and
//!   re-raises the source's changes as its own events.
//! - Both implement [`RecordAccess`] for reads and [`Observable`] for change
//!   events.
//!
//! Everything is single-threaded: handles are `Rc` based and listeners run
//! synchronously, in registration order, within the call that caused them.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata_core::prelude::*;
//!
//! # fn main() -> strata_core::Result<()> {
//! let model = Arc::new(Model::new("User").with_id_property("email"));
//! let users = BackingCollection::new(model);
//! users.add([
//!     json!({"email": "ed@sencha.com", "group": "code"}),
//!     json!({"email": "abe@sencha.com", "group": "admin"}),
//! ])?;
//!
//! let coders = DerivedView::new(&users)?;
//! coders.filter(Filter::new("group", "code"))?;
//!
//! assert_eq!(users.get_count(), 2);
//! assert_eq!(coders.get_count(), 1);
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

/// Read and query surface shared by collections and views
pub mod access;

/// The authoritative record collection
pub mod collection;

pub mod config;

/// Error types
pub mod error;

/// Change events and the listener bus
pub mod events;

pub mod prelude;

/// Data sources for asynchronous loads
pub mod proxy;

/// Filtering and sorting primitives
pub mod query;

/// Raw response parsing
pub mod reader;

pub mod record;

pub mod registry;

pub mod source;

/// Chained views
pub mod view;

pub use access::{FindOptions, RecordAccess};
pub use collection::{BackingCollection, RecordInput};
pub use config::{CollectionConfig, DuplicatePolicy};
pub use error::{Result, StoreError};
pub use events::{EventBus, EventKind, Observable, StoreEvent, UpdateKind};
pub use proxy::{FileProxy, MemoryProxy, Operation, OperationAction, Proxy, ProxyError};
pub use reader::{JsonReader, ResultSet};
pub use record::{Record, RecordStatus};
pub use registry::StoreRegistry;
pub use source::Source;
pub use view::DerivedView;
