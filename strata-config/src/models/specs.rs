//! Store, view, filter and sorter declarations

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use strata_core::{
    DuplicatePolicy, JsonReader,
    query::{Filter, FilterOperator, SortDirection, Sorter},
};
use strata_model::FieldValue;

/// Where a store's `load` reads from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxySpec {
    /// Inline rows, or a full response object
    Memory {
        #[serde(default = "empty_rows")]
        rows: Value,
    },
    /// JSON document on disk, re-read on every load
    File { path: PathBuf },
}

fn empty_rows() -> Value {
    Value::Array(Vec::new())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreSpec {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub proxy: Option<ProxySpec>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub reader: JsonReader,
    /// Load from the proxy right after the data layer is built
    #[serde(default)]
    pub autoload: bool,
    #[serde(default)]
    pub sorters: Vec<SorterSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewSpec {
    pub id: String,
    /// Id of a store or another view
    pub source: String,
    #[serde(default)]
    pub sorters: Vec<SorterSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SorterSpec {
    pub property: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "ASC".to_string()
}

impl SorterSpec {
    pub fn to_sorter(&self, owner: &str) -> Result<Sorter> {
        let direction = self
            .direction
            .parse::<SortDirection>()
            .map_err(|err| invalid(owner, err))?;
        Ok(Sorter::new(self.property.clone(), direction))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterSpec {
    pub property: String,
    pub value: Value,
    /// Operator text such as `=`, `>=`, `like` or `in`. Without one, strings
    /// match by case-insensitive prefix and other values by equality.
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl FilterSpec {
    pub fn to_filter(&self, owner: &str) -> Result<Filter> {
        let operator: Option<FilterOperator> = self
            .operator
            .as_deref()
            .map(str::parse::<FilterOperator>)
            .transpose()
            .map_err(|err| invalid(owner, err))?;

        let filter = match (operator, &self.value) {
            (Some(FilterOperator::In), Value::Array(items)) => {
                Filter::one_of(self.property.clone(), scalars(owner, items)?)
            }
            (Some(FilterOperator::NotIn), Value::Array(items)) => {
                Filter::none_of(self.property.clone(), scalars(owner, items)?)
            }
            (Some(op @ (FilterOperator::In | FilterOperator::NotIn)), other) => {
                return Err(invalid(
                    owner,
                    format!("operator {op:?} on `{}` needs a list, got {other}", self.property),
                ));
            }
            (Some(op), value) => {
                Filter::with_operator(self.property.clone(), op, scalar(owner, value)?)
                    .case_sensitive(self.case_sensitive)
            }
            (None, value) => Filter::new(self.property.clone(), scalar(owner, value)?)
                .case_sensitive(self.case_sensitive),
        };

        let filter = match &self.id {
            Some(id) => filter.with_id(id.clone()),
            None => filter,
        };
        Ok(filter.disabled(self.disabled))
    }
}

fn scalar(owner: &str, value: &Value) -> Result<FieldValue> {
    FieldValue::from_json(value)
        .ok_or_else(|| invalid(owner, format!("filter value must be a scalar, got {value}")))
}

fn scalars(owner: &str, items: &[Value]) -> Result<Vec<FieldValue>> {
    items.iter().map(|item| scalar(owner, item)).collect()
}

fn invalid(owner: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidQuery {
        owner: owner.to_string(),
        reason: reason.to_string(),
    }
}
