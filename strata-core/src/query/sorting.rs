//! Sorters, sorter chains and the ordering helpers collections and views use
//!
//! Sorting is always stable: records that compare equal keep the order they
//! had before the sort. Missing values sort last in either direction.

use crate::error::{Result, StoreError};
use crate::record::Record;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn is_descending(self) -> bool {
        self == SortDirection::Desc
    }
}

impl FromStr for SortDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(StoreError::InvalidOperation(format!(
                "unknown sort direction `{s}`"
            )))
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

type Comparator = Rc<dyn Fn(&Record, &Record) -> Ordering>;

#[derive(Clone)]
enum SorterKind {
    Property(String),
    Custom(Comparator),
}

/// A single sort criterion
#[derive(Clone)]
pub struct Sorter {
    id: String,
    kind: SorterKind,
    direction: SortDirection,
}

impl Sorter {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        let property = property.into();
        Self {
            id: property.clone(),
            kind: SorterKind::Property(property),
            direction,
        }
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Asc)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Desc)
    }

    /// Sorter driven by a comparator; direction is applied on top of it
    pub fn by<F>(id: impl Into<String>, compare: F) -> Self
    where
        F: Fn(&Record, &Record) -> Ordering + 'static,
    {
        Self {
            id: id.into(),
            kind: SorterKind::Custom(Rc::new(compare)),
            direction: SortDirection::Asc,
        }
    }

    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn property(&self) -> Option<&str> {
        match &self.kind {
            SorterKind::Property(property) => Some(property),
            SorterKind::Custom(_) => None,
        }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match &self.kind {
            SorterKind::Property(property) => a
                .get(property)
                .compare_with_order(&b.get(property), self.direction.is_descending()),
            SorterKind::Custom(compare) => {
                let ordering = compare(a, b);
                if self.direction.is_descending() {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }

    fn same_as(&self, other: &Sorter) -> bool {
        match (&self.kind, &other.kind) {
            (SorterKind::Property(a), SorterKind::Property(b)) => {
                self.id == other.id && a == b && self.direction == other.direction
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Sorter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Sorter");
        out.field("id", &self.id);
        if let SorterKind::Property(property) = &self.kind {
            out.field("property", property);
        }
        out.field("direction", &self.direction).finish()
    }
}

/// Ordered sorter chain; later sorters break ties left by earlier ones
#[derive(Debug, Clone, Default)]
pub(crate) struct SorterSet {
    items: Vec<Sorter>,
}

impl SorterSet {
    /// Replace the whole chain. Returns whether it changed.
    pub(crate) fn replace(&mut self, sorters: Vec<Sorter>) -> bool {
        let unchanged = self.items.len() == sorters.len()
            && self.items.iter().zip(&sorters).all(|(a, b)| a.same_as(b));
        self.items = sorters;
        !unchanged
    }

    /// Append to the chain, or replace in place a sorter with the same id
    pub(crate) fn add(&mut self, sorter: Sorter) -> bool {
        match self.items.iter_mut().find(|s| s.id == sorter.id) {
            Some(existing) if existing.same_as(&sorter) => false,
            Some(existing) => {
                *existing = sorter;
                true
            }
            None => {
                self.items.push(sorter);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|s| s.id != id);
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

    pub(crate) fn items(&self) -> Vec<Sorter> {
        self.items.clone()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.items.is_empty()
    }

    pub(crate) fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.items
            .iter()
            .map(|sorter| sorter.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable sort of `records` by this chain
    pub(crate) fn sort(&self, records: &mut [Record]) {
        if !self.is_active() || is_sorted_by(records, |a, b| self.compare(a, b)) {
            return;
        }
        records.sort_by(|a, b| self.compare(a, b));
    }

    /// Position after every record that sorts at or before `record`.
    ///
    /// `records` must already be sorted by this chain; inserting there keeps
    /// it sorted and places the newcomer after its equals.
    pub(crate) fn insertion_index(&self, records: &[Record], record: &Record) -> usize {
        records.partition_point(|existing| self.compare(existing, record).is_le())
    }

    /// Move an edited record back into sorted position.
    ///
    /// A record that still sits between its neighbours is left alone, so an
    /// edit that does not touch the sort keys never reorders ties.
    pub(crate) fn reposition(&self, records: &mut Vec<Record>, record: &Record) {
        let Some(at) = records.iter().position(|r| r.ptr_eq(record)) else {
            return;
        };
        let after_prev = at == 0 || self.compare(&records[at - 1], record).is_le();
        let before_next = at + 1 >= records.len()
            || self.compare(record, &records[at + 1]).is_le();
        if after_prev && before_next {
            return;
        }

        let moved = records.remove(at);
        let to = self.insertion_index(records, &moved);
        records.insert(to, moved);
    }
}

/// Check if a slice is already sorted according to a comparison function
pub fn is_sorted_by<T, F>(items: &[T], mut compare: F) -> bool
where
    F: FnMut(&T, &T) -> Ordering,
{
    items.windows(2).all(|w| compare(&w[0], &w[1]).is_le())
}

/// Owner of a sorter chain: a collection or view
pub(crate) trait SorterHost {
    fn sorter_set(&self) -> &std::cell::RefCell<SorterSet>;

    fn update_sorters(
        &self,
        change: &mut dyn FnMut(&mut SorterSet) -> bool,
    ) -> Result<()>;
}

/// Borrowed view of a collection's or view's sorters
pub struct SortersHandle<'a> {
    host: &'a dyn SorterHost,
}

impl<'a> SortersHandle<'a> {
    pub(crate) fn new(host: &'a dyn SorterHost) -> Self {
        Self { host }
    }

    /// Append a sorter to the chain
    pub fn add(&self, sorter: Sorter) -> Result<()> {
        let mut pending = Some(sorter);
        self.host.update_sorters(&mut |set| {
            pending.take().is_some_and(|sorter| set.add(sorter))
        })
    }

    /// Replace the whole chain
    pub fn replace<I>(&self, sorters: I) -> Result<()>
    where
        I: IntoIterator<Item = Sorter>,
    {
        let mut pending = Some(sorters.into_iter().collect::<Vec<_>>());
        self.host.update_sorters(&mut |set| {
            pending.take().is_some_and(|sorters| set.replace(sorters))
        })
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.host.update_sorters(&mut |set| set.remove(id))
    }

    /// Drop every sorter, restoring the unsorted order
    pub fn remove_all(&self) -> Result<()> {
        self.host.update_sorters(&mut |set| set.clear())
    }

    pub fn get_count(&self) -> usize {
        self.host.sorter_set().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.get_count() == 0
    }

    pub fn items(&self) -> Vec<Sorter> {
        self.host.sorter_set().borrow().items()
    }
}

impl fmt::Debug for SortersHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.host.sorter_set().borrow().items.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use strata_model::{FieldKind, Model};

    fn people() -> Vec<Record> {
        let model = Arc::new(
            Model::new("User")
                .with_id_property("email")
                .with_field("age", FieldKind::Int),
        );
        [
            ("Ed Spencer", "ed", "code", 25),
            ("Abe Elias", "abe", "admin", 20),
            ("Aaron Conran", "aaron", "admin", 26),
            ("Tommy Maintz", "tommy", "code", 70),
        ]
        .into_iter()
        .map(|(name, email, group, age)| {
            Record::new(
                model.clone(),
                &json!({"name": name, "email": email, "group": group, "age": age}),
            )
            .unwrap()
        })
        .collect()
    }

    fn emails(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.get("email").to_string()).collect()
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("up".parse::<SortDirection>().is_err());
        assert_eq!(SortDirection::Asc.toggle(), SortDirection::Desc);
    }

    #[test]
    fn sort_is_stable_across_chained_sorts() {
        let mut records = people();
        let mut set = SorterSet::default();

        set.replace(vec![Sorter::asc("age")]);
        set.sort(&mut records);
        assert_eq!(emails(&records), ["abe", "ed", "aaron", "tommy"]);

        // Ties on group keep the age order established above
        set.replace(vec![Sorter::asc("group")]);
        set.sort(&mut records);
        assert_eq!(emails(&records), ["abe", "aaron", "ed", "tommy"]);
    }

    #[test]
    fn chain_breaks_ties_with_later_sorters() {
        let mut records = people();
        let mut set = SorterSet::default();
        set.add(Sorter::asc("group"));
        set.add(Sorter::desc("age"));
        set.sort(&mut records);
        assert_eq!(emails(&records), ["aaron", "abe", "tommy", "ed"]);
    }

    #[test]
    fn descending_name_sort() {
        let mut records = people();
        let mut set = SorterSet::default();
        set.add(Sorter::desc("name"));
        set.sort(&mut records);
        assert_eq!(emails(&records), ["tommy", "ed", "abe", "aaron"]);
    }

    #[test]
    fn insertion_index_lands_after_equals() {
        let mut records = people();
        let mut set = SorterSet::default();
        set.add(Sorter::asc("group"));
        set.sort(&mut records);

        let newcomer = people().remove(1);
        assert_eq!(set.insertion_index(&records, &newcomer), 2);
    }

    #[test]
    fn custom_sorter_respects_direction() {
        let mut records = people();
        let mut set = SorterSet::default();
        set.add(
            Sorter::by("name-length", |a, b| {
                a.get("name").as_text().len().cmp(&b.get("name").as_text().len())
            })
            .with_direction(SortDirection::Desc),
        );
        set.sort(&mut records);
        assert_eq!(emails(&records)[0], "aaron");
    }

    #[test]
    fn replace_reports_unchanged_chains() {
        let mut set = SorterSet::default();
        assert!(set.replace(vec![Sorter::asc("age")]));
        assert!(!set.replace(vec![Sorter::asc("age")]));
        assert!(set.replace(vec![Sorter::desc("age")]));
        assert!(set.clear());
        assert!(!set.clear());
    }

    #[test]
    fn reposition_moves_only_out_of_order_records() {
        let mut records = people();
        let mut set = SorterSet::default();
        set.add(Sorter::asc("age"));
        set.sort(&mut records);
        let before = emails(&records);

        // In-place edit keeps ties and neighbours untouched
        let ed = records[1].clone();
        set.reposition(&mut records, &ed);
        assert_eq!(emails(&records), before);

        let abe = records[0].clone();
        abe.set("age", 99).unwrap();
        set.reposition(&mut records, &abe);
        assert_eq!(emails(&records), ["ed", "aaron", "tommy", "abe"]);
    }

    #[test]
    fn is_sorted_by_detects_order() {
        assert!(is_sorted_by(&[1, 2, 2, 3], |a, b| a.cmp(b)));
        assert!(!is_sorted_by(&[3, 1], |a, b| a.cmp(b)));
    }
}
