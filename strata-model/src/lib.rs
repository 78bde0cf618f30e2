//! Core data model definitions shared across strata crates.
//!
//! A [`Model`] describes a record type: its identity field and the typed
//! fields raw input is converted through. Values are held as [`FieldValue`].
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod model;
pub mod value;

pub use error::{ModelError, Result};
pub use ids::{ListenerId, OperationId, RecordId};
pub use model::{FieldDef, FieldKind, FieldMap, Model, RecordKey};
pub use value::FieldValue;
