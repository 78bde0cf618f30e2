//! Declarative configuration for strata data layers.
//!
//! A [`DataLayerConfig`] names models, the stores holding their records and
//! the views chained off those stores. [`DataLayer::build`] validates the
//! references and produces the live collections and views, registered by id
//! in a [`strata_core::StoreRegistry`]. The `strata-inspect` binary is a thin
//! shell over the same pieces.

pub mod error;
pub mod layer;
pub mod models;

pub use error::ConfigError;
pub use layer::DataLayer;
pub use models::{
    DataLayerConfig, DataLayerConfigSource, FilterSpec, ProxySpec, SorterSpec, StoreSpec,
    ViewSpec,
};
