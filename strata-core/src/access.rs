//! Read and query surface shared by collections and views
//!
//! Every method here works over the visible sequence: the records that
//! pass the active filters, in the active order.

use crate::query::filtering::{Filter, FilterOperator};
use crate::record::Record;
use std::sync::Arc;
use strata_model::{FieldValue, Model};

/// Matching options for [`RecordAccess::find`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOptions {
    /// Visible index to start searching from
    pub start: usize,
    /// Match anywhere in the value instead of only at its start
    pub any_match: bool,
    pub case_sensitive: bool,
    /// Require the whole value to match
    pub exact_match: bool,
}

impl FindOptions {
    pub fn exact() -> Self {
        Self {
            exact_match: true,
            case_sensitive: true,
            ..Self::default()
        }
    }

    pub fn starting_at(mut self, start: usize) -> Self {
        self.start = start;
        self
    }
}

pub trait RecordAccess {
    /// Snapshot of the visible sequence
    fn get_range(&self) -> Vec<Record>;

    fn get_at(&self, index: usize) -> Option<Record>;

    fn get_count(&self) -> usize;

    /// Visible position of `record`, or -1 when it is filtered out or absent
    fn index_of(&self, record: &Record) -> isize;

    /// Model of the collection at the root of the chain
    fn get_model(&self) -> Arc<Model>;

    fn first(&self) -> Option<Record> {
        self.get_at(0)
    }

    fn last(&self) -> Option<Record> {
        self.get_count().checked_sub(1).and_then(|i| self.get_at(i))
    }

    /// Visit records in order until `visit` returns false
    fn each<F>(&self, mut visit: F)
    where
        F: FnMut(&Record) -> bool,
    {
        for record in self.get_range() {
            if !visit(&record) {
                break;
            }
        }
    }

    /// Index of the first record whose `property` matches `value`.
    ///
    /// Strings match by prefix unless `any_match` or `exact_match` say
    /// otherwise; other values match by equality.
    fn find(
        &self,
        property: &str,
        value: impl Into<FieldValue>,
        options: FindOptions,
    ) -> Option<usize> {
        let value = value.into();
        let operator = match (&value, options.exact_match, options.any_match) {
            (FieldValue::Str(_), false, true) => FilterOperator::Like,
            (FieldValue::Str(_), false, false) => FilterOperator::StartsWith,
            _ => FilterOperator::Eq,
        };
        let filter = Filter::with_operator(property, operator, value)
            .case_sensitive(options.case_sensitive);
        self.find_by(|record| filter.matches(record), options.start)
    }

    /// Index of the first record whose `property` equals `value` exactly
    fn find_exact(
        &self,
        property: &str,
        value: impl Into<FieldValue>,
        start: usize,
    ) -> Option<usize> {
        let value = value.into();
        self.find_by(|record| record.get(property) == value, start)
    }

    fn find_by<F>(&self, mut predicate: F, start: usize) -> Option<usize>
    where
        F: FnMut(&Record) -> bool,
    {
        self.get_range()
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, record)| predicate(record))
            .map(|(index, _)| index)
    }

    fn find_record(
        &self,
        property: &str,
        value: impl Into<FieldValue>,
        options: FindOptions,
    ) -> Option<Record> {
        self.find(property, value, options)
            .and_then(|index| self.get_at(index))
    }

    fn query_by<F>(&self, mut predicate: F) -> Vec<Record>
    where
        F: FnMut(&Record) -> bool,
    {
        self.get_range()
            .into_iter()
            .filter(|record| predicate(record))
            .collect()
    }

    /// Distinct values of `property` in visible order
    fn collect(&self, property: &str, allow_null: bool) -> Vec<FieldValue> {
        let mut values: Vec<FieldValue> = Vec::new();
        for record in self.get_range() {
            let value = record.get(property);
            if (allow_null || !value.is_null()) && !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    fn count_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Record) -> bool,
    {
        self.get_range()
            .iter()
            .filter(|record| predicate(record))
            .count()
    }

    /// Sum of the numeric values of `property`; others are skipped
    fn sum(&self, property: &str) -> f64 {
        self.get_range()
            .iter()
            .filter_map(|record| record.get(property).as_f64())
            .sum()
    }

    fn min(&self, property: &str) -> Option<FieldValue> {
        self.get_range()
            .iter()
            .map(|record| record.get(property))
            .filter(|value| !value.is_null())
            .min()
    }

    fn max(&self, property: &str) -> Option<FieldValue> {
        self.get_range()
            .iter()
            .map(|record| record.get(property))
            .filter(|value| !value.is_null())
            .max()
    }

    /// Mean of the numeric values of `property`, `None` when there are none
    fn average(&self, property: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .get_range()
            .iter()
            .filter_map(|record| record.get(property).as_f64())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}
