//! Filtering and sorting primitives shared by collections and views

pub mod filtering;
pub mod sorting;

pub use filtering::{Filter, FilterOperator, FiltersHandle};
pub use sorting::{SortDirection, Sorter, SortersHandle};
