mod common;

use common::{EventLog, handles, source_and_view, user, user_model, users};
use serde_json::json;
use strata_core::prelude::*;

#[test]
fn queued_suspension_replays_events_on_resume() {
    let (source, _view) = source_and_view();
    let log = EventLog::attach(&source);

    source.suspend_events(true);
    source.add([json!({"email": "queued@sencha.com"})]).unwrap();
    source.sort("age", SortDirection::Asc).unwrap();
    assert!(log.is_empty());

    source.resume_events();
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Add,
            EventKind::DataChanged,
            EventKind::Refresh,
            EventKind::DataChanged
        ]
    );
}

#[test]
fn suspending_the_source_does_not_silence_views() {
    let (source, view) = source_and_view();
    let view_log = EventLog::attach(&view);

    source.suspend_events(false);
    source.remove_at(0).unwrap();
    source.resume_events();

    assert_eq!(view.get_count(), 3);
    assert_eq!(view_log.count(EventKind::Remove), 1);
}

#[test]
fn sort_is_stable_and_clearing_it_restores_canonical_order() {
    let (source, _view) = source_and_view();

    source.sort("group", SortDirection::Asc).unwrap();
    assert_eq!(handles(&source.get_range()), ["abe", "aaron", "ed", "tommy"]);

    source
        .sort_by([Sorter::desc("evil"), Sorter::asc("age")])
        .unwrap();
    assert_eq!(handles(&source.get_range()), ["aaron", "tommy", "abe", "ed"]);

    source.get_sorters().remove_all().unwrap();
    assert_eq!(handles(&source.get_range()), ["ed", "abe", "aaron", "tommy"]);
}

#[test]
fn custom_filters_and_sorters_compose() {
    let (source, _view) = source_and_view();

    source
        .filter_by("adults", |record| {
            record.get("age").as_i64().is_some_and(|age| age > 21)
        })
        .unwrap();
    source
        .sort_by([Sorter::by("name-length", |a, b| {
            a.get("name")
                .as_text()
                .len()
                .cmp(&b.get("name").as_text().len())
        })])
        .unwrap();

    assert_eq!(handles(&source.get_range()), ["ed", "aaron", "tommy"]);
    source.remove_filter("adults").unwrap();
    assert_eq!(source.get_count(), 4);
}

#[test]
fn replace_policy_swaps_records_seen_by_views() {
    let source = BackingCollection::with_config(
        user_model(),
        CollectionConfig::default()
            .with_store_id("users")
            .with_duplicate_policy(DuplicatePolicy::Replace),
    );
    source.load_data(users()).unwrap();
    let view = DerivedView::new(&source).unwrap();
    let old_ed = user(&source, "ed");

    let added = source
        .add([json!({"name": "Edward", "email": "ed@sencha.com", "group": "code"})])
        .unwrap();

    assert_eq!(source.get_count(), 4);
    assert_eq!(old_ed.status(), RecordStatus::Dropped);
    assert_eq!(view.index_of(&old_ed), -1);
    assert_eq!(view.index_of(&added[0]), 3);
    assert_eq!(
        source.get_by_id(&RecordKey::from("ed@sencha.com")),
        Some(added[0].clone())
    );
}

#[test]
fn re_adding_a_member_is_invalid() {
    let (source, _view) = source_and_view();
    let ed = user(&source, "ed");
    assert!(matches!(
        source.add([ed.clone()]),
        Err(StoreError::InvalidOperation(_))
    ));

    source.remove(&[ed.clone()]).unwrap();
    assert_eq!(ed.status(), RecordStatus::Dropped);
    source.add([ed.clone()]).unwrap();
    assert_eq!(ed.status(), RecordStatus::Clean);
    assert_eq!(ed.joined_count(), 1);
}

#[test]
fn phantom_records_get_generated_keys() {
    let (source, _view) = source_and_view();
    let added = source
        .add([json!({"name": "No Email"}), json!({"name": "Also None"})])
        .unwrap();

    assert!(added.iter().all(Record::is_phantom));
    assert_ne!(added[0].key(), added[1].key());
    assert_eq!(source.get_count(), 6);
}

#[test]
fn identity_field_cannot_change() {
    let (source, _view) = source_and_view();
    let ed = user(&source, "ed");
    assert!(matches!(
        ed.set("email", "edward@sencha.com"),
        Err(StoreError::InvalidOperation(_))
    ));
    assert_eq!(source.get_by_id(&RecordKey::from("ed@sencha.com")), Some(ed));
}

#[test]
fn records_shared_by_two_collections_join_both() {
    let first = BackingCollection::new(user_model());
    let second = BackingCollection::new(user_model());
    let records = first.load_data(users()).unwrap();

    second.add(records.iter()).unwrap();
    assert!(records.iter().all(|r| r.joined_count() == 2));

    let first_log = EventLog::attach(&first);
    let second_log = EventLog::attach(&second);
    records[0].set("age", 40).unwrap();
    assert_eq!(first_log.count(EventKind::Update), 1);
    assert_eq!(second_log.count(EventKind::Update), 1);

    second.destroy();
    assert!(records.iter().all(|r| r.joined_count() == 1));
}

#[test]
fn listener_removal_during_dispatch_is_safe() {
    let (source, _view) = source_and_view();
    let log = EventLog::attach(&source);
    let handle = source.clone();
    let id = std::rc::Rc::new(std::cell::Cell::new(None));
    let slot = id.clone();
    let listener = source.on(move |_, event| {
        if event.kind() == EventKind::DataChanged
            && let Some(id) = slot.take()
        {
            handle.un(id);
        }
    });
    id.set(Some(listener));

    source.remove_at(0).unwrap();
    source.remove_at(0).unwrap();
    assert_eq!(log.count(EventKind::Remove), 2);
    assert!(source.has_listeners());
}
