//! Filter predicates and the filter set owned by each collection and view

use crate::error::{Result, StoreError};
use crate::record::Record;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use strata_model::FieldValue;

/// Comparison applied by a property filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match on the text form of the value
    Like,
    StartsWith,
    In,
    NotIn,
}

impl FromStr for FilterOperator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(FilterOperator::Eq),
            "!=" | "<>" | "ne" => Ok(FilterOperator::Ne),
            "<" | "lt" => Ok(FilterOperator::Lt),
            "<=" | "le" => Ok(FilterOperator::Le),
            ">" | "gt" => Ok(FilterOperator::Gt),
            ">=" | "ge" => Ok(FilterOperator::Ge),
            "like" => Ok(FilterOperator::Like),
            "startswith" => Ok(FilterOperator::StartsWith),
            "in" => Ok(FilterOperator::In),
            "notin" => Ok(FilterOperator::NotIn),
            other => Err(StoreError::InvalidOperation(format!(
                "unknown filter operator `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Single(FieldValue),
    List(Vec<FieldValue>),
}

type Predicate = Rc<dyn Fn(&Record) -> bool>;

#[derive(Clone)]
enum FilterKind {
    Property {
        property: String,
        operator: FilterOperator,
        operand: Operand,
        case_sensitive: bool,
    },
    Custom(Predicate),
}

/// One filter predicate.
///
/// Filters are identified by id, which defaults to the property name; adding
/// a filter whose id is already present replaces the earlier one.
#[derive(Clone)]
pub struct Filter {
    id: String,
    kind: FilterKind,
    disabled: bool,
}

impl Filter {
    /// Filter on `property` with the default operator for `value`: a
    /// case-insensitive prefix match for strings, equality otherwise.
    pub fn new(property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        let operator = match value {
            FieldValue::Str(_) => FilterOperator::StartsWith,
            _ => FilterOperator::Eq,
        };
        Self::with_operator(property, operator, value)
    }

    pub fn with_operator(
        property: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FieldValue>,
    ) -> Self {
        let property = property.into();
        Self {
            id: property.clone(),
            kind: FilterKind::Property {
                property,
                operator,
                operand: Operand::Single(value.into()),
                case_sensitive: false,
            },
            disabled: false,
        }
    }

    /// Passes records whose `property` equals any of `values`
    pub fn one_of<I, V>(property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::list(property, FilterOperator::In, values)
    }

    pub fn none_of<I, V>(property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::list(property, FilterOperator::NotIn, values)
    }

    /// Arbitrary predicate filter
    pub fn by<F>(id: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + 'static,
    {
        Self {
            id: id.into(),
            kind: FilterKind::Custom(Rc::new(predicate)),
            disabled: false,
        }
    }

    fn list<I, V>(
        property: impl Into<String>,
        operator: FilterOperator,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let property = property.into();
        Self {
            id: property.clone(),
            kind: FilterKind::Property {
                property,
                operator,
                operand: Operand::List(values.into_iter().map(Into::into).collect()),
                case_sensitive: false,
            },
            disabled: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        if let FilterKind::Property {
            case_sensitive: ref mut flag,
            ..
        } = self.kind
        {
            *flag = case_sensitive;
        }
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn property(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Property { property, .. } => Some(property),
            FilterKind::Custom(_) => None,
        }
    }

    pub fn operator(&self) -> Option<FilterOperator> {
        match &self.kind {
            FilterKind::Property { operator, .. } => Some(*operator),
            FilterKind::Custom(_) => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn matches(&self, record: &Record) -> bool {
        match &self.kind {
            FilterKind::Custom(predicate) => predicate(record),
            FilterKind::Property {
                property,
                operator,
                operand,
                case_sensitive,
            } => {
                let actual = record.get(property);
                match (operator, operand) {
                    (FilterOperator::In, Operand::List(values)) => values
                        .iter()
                        .any(|v| values_equal(&actual, v, *case_sensitive)),
                    (FilterOperator::NotIn, Operand::List(values)) => !values
                        .iter()
                        .any(|v| values_equal(&actual, v, *case_sensitive)),
                    (op, Operand::Single(expected)) => {
                        compare(*op, &actual, expected, *case_sensitive)
                    }
                    (op, Operand::List(values)) => values
                        .iter()
                        .any(|v| compare(*op, &actual, v, *case_sensitive)),
                }
            }
        }
    }

    /// Structural equality; custom predicates never compare equal
    fn same_as(&self, other: &Filter) -> bool {
        if self.id != other.id || self.disabled != other.disabled {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                FilterKind::Property {
                    property: p1,
                    operator: o1,
                    operand: v1,
                    case_sensitive: c1,
                },
                FilterKind::Property {
                    property: p2,
                    operator: o2,
                    operand: v2,
                    case_sensitive: c2,
                },
            ) => p1 == p2 && o1 == o2 && v1 == v2 && c1 == c2,
            _ => false,
        }
    }
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn values_equal(actual: &FieldValue, expected: &FieldValue, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (FieldValue::Str(a), FieldValue::Str(b)) if !case_sensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        _ => actual == expected,
    }
}

fn compare(
    operator: FilterOperator,
    actual: &FieldValue,
    expected: &FieldValue,
    case_sensitive: bool,
) -> bool {
    match operator {
        FilterOperator::Eq => values_equal(actual, expected, case_sensitive),
        FilterOperator::Ne => !values_equal(actual, expected, case_sensitive),
        FilterOperator::Like => {
            !actual.is_null()
                && fold(&actual.as_text(), case_sensitive)
                    .contains(&fold(&expected.as_text(), case_sensitive))
        }
        FilterOperator::StartsWith => {
            !actual.is_null()
                && fold(&actual.as_text(), case_sensitive)
                    .starts_with(&fold(&expected.as_text(), case_sensitive))
        }
        FilterOperator::Lt
        | FilterOperator::Le
        | FilterOperator::Gt
        | FilterOperator::Ge => {
            if actual.is_null() {
                return false;
            }
            let ordering = match (actual, expected) {
                (FieldValue::Str(a), FieldValue::Str(b)) if !case_sensitive => {
                    a.to_lowercase().cmp(&b.to_lowercase())
                }
                _ => actual.cmp(expected),
            };
            match operator {
                FilterOperator::Lt => ordering.is_lt(),
                FilterOperator::Le => ordering.is_le(),
                FilterOperator::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
        FilterOperator::In => values_equal(actual, expected, case_sensitive),
        FilterOperator::NotIn => !values_equal(actual, expected, case_sensitive),
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Filter");
        out.field("id", &self.id);
        match &self.kind {
            FilterKind::Property {
                property,
                operator,
                operand,
                case_sensitive,
            } => {
                out.field("property", property)
                    .field("operator", operator)
                    .field("operand", operand)
                    .field("case_sensitive", case_sensitive);
            }
            FilterKind::Custom(_) => {
                out.field("predicate", &"<custom>");
            }
        }
        out.field("disabled", &self.disabled).finish()
    }
}

/// Ordered set of filters keyed by id
#[derive(Debug, Clone, Default)]
pub(crate) struct FilterSet {
    items: Vec<Filter>,
}

impl FilterSet {
    /// Add or replace by id. Returns whether the set changed.
    pub(crate) fn add(&mut self, filter: Filter) -> bool {
        match self.items.iter_mut().find(|f| f.id == filter.id) {
            Some(existing) if existing.same_as(&filter) => false,
            Some(existing) => {
                *existing = filter;
                true
            }
            None => {
                self.items.push(filter);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|f| f.id != id);
        self.items.len() != before
    }

    pub(crate) fn clear(&mut self) -> bool {
        let changed = !self.items.is_empty();
        self.items.clear();
        changed
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn items(&self) -> Vec<Filter> {
        self.items.clone()
    }

    /// True when at least one enabled filter is present
    pub(crate) fn is_active(&self) -> bool {
        self.items.iter().any(|f| !f.disabled)
    }

    pub(crate) fn matches(&self, record: &Record) -> bool {
        self.items
            .iter()
            .filter(|f| !f.disabled)
            .all(|f| f.matches(record))
    }
}

/// Owner of a filter set: a collection or view
pub(crate) trait FilterHost {
    fn filter_set(&self) -> &std::cell::RefCell<FilterSet>;

    /// Apply `change` and, when it reports a change, recompute and notify
    fn update_filters(
        &self,
        change: &mut dyn FnMut(&mut FilterSet) -> bool,
    ) -> Result<()>;
}

/// Borrowed view of a collection's or view's filters
pub struct FiltersHandle<'a> {
    host: &'a dyn FilterHost,
}

impl<'a> FiltersHandle<'a> {
    pub(crate) fn new(host: &'a dyn FilterHost) -> Self {
        Self { host }
    }

    /// Add a filter, replacing any existing filter with the same id
    pub fn add(&self, filter: Filter) -> Result<()> {
        let mut pending = Some(filter);
        self.host.update_filters(&mut |set| {
            pending.take().is_some_and(|filter| set.add(filter))
        })
    }

    pub fn add_all<I>(&self, filters: I) -> Result<()>
    where
        I: IntoIterator<Item = Filter>,
    {
        let mut pending: Vec<Filter> = filters.into_iter().collect();
        self.host.update_filters(&mut |set| {
            pending
                .drain(..)
                .fold(false, |changed, filter| set.add(filter) || changed)
        })
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.host.update_filters(&mut |set| set.remove(id))
    }

    pub fn remove_all(&self) -> Result<()> {
        self.host.update_filters(&mut |set| set.clear())
    }

    pub fn get_count(&self) -> usize {
        self.host.filter_set().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.get_count() == 0
    }

    pub fn get(&self, id: &str) -> Option<Filter> {
        self.host
            .filter_set()
            .borrow()
            .items
            .iter()
            .find(|f| f.id == id)
            .cloned()
    }

    pub fn items(&self) -> Vec<Filter> {
        self.host.filter_set().borrow().items()
    }
}

impl fmt::Debug for FiltersHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.host.filter_set().borrow().items.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use strata_model::{FieldKind, Model};

    fn tommy() -> Record {
        let model = Arc::new(
            Model::new("User")
                .with_id_property("email")
                .with_field("age", FieldKind::Int),
        );
        Record::new(
            model,
            &json!({"name": "Tommy Maintz", "email": "tommy@sencha.com", "age": 70, "group": "code"}),
        )
        .unwrap()
    }

    #[test]
    fn string_filters_default_to_case_insensitive_prefix() {
        let rec = tommy();
        assert!(Filter::new("name", "Tommy").matches(&rec));
        assert!(Filter::new("name", "tommy").matches(&rec));
        assert!(!Filter::new("name", "Maintz").matches(&rec));
        assert!(
            !Filter::new("name", "tommy")
                .case_sensitive(true)
                .matches(&rec)
        );
    }

    #[test]
    fn numeric_filters_default_to_equality() {
        let rec = tommy();
        assert!(Filter::new("age", 70).matches(&rec));
        assert!(!Filter::new("age", 7).matches(&rec));
    }

    #[test]
    fn comparison_operators() {
        let rec = tommy();
        let op = |s: &str| s.parse::<FilterOperator>().unwrap();
        assert!(Filter::with_operator("age", op(">="), 70).matches(&rec));
        assert!(Filter::with_operator("age", op("<"), 71).matches(&rec));
        assert!(!Filter::with_operator("age", op("gt"), 70).matches(&rec));
        assert!(Filter::with_operator("name", op("like"), "maintz").matches(&rec));
        assert!(Filter::with_operator("name", op("!="), "Ed").matches(&rec));
        assert!("between".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn null_fields_never_match_ordering_or_text_operators() {
        let rec = tommy();
        assert!(!Filter::with_operator("missing", FilterOperator::Lt, 5).matches(&rec));
        assert!(!Filter::new("missing", "").matches(&rec));
    }

    #[test]
    fn set_membership_filters() {
        let rec = tommy();
        assert!(Filter::one_of("group", ["admin", "CODE"]).matches(&rec));
        assert!(!Filter::none_of("group", ["code"]).matches(&rec));
    }

    #[test]
    fn filter_set_replaces_by_id_and_reports_changes() {
        let mut set = FilterSet::default();
        assert!(set.add(Filter::new("group", "code")));
        assert!(!set.add(Filter::new("group", "code")));
        assert!(set.add(Filter::new("group", "admin")));
        assert_eq!(set.len(), 1);

        assert!(set.add(Filter::by("old", |r| r.get("age").as_i64() > Some(60))));
        assert!(!set.matches(&tommy()));
        assert!(set.remove("group"));
        assert!(set.matches(&tommy()));
        assert!(!set.remove("group"));
    }

    #[test]
    fn disabled_filters_are_ignored() {
        let mut set = FilterSet::default();
        set.add(Filter::new("group", "admin").disabled(true));
        assert!(!set.is_active());
        assert!(set.matches(&tommy()));
    }
}
