#![allow(dead_code)]

use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use strata_core::prelude::*;

pub fn user_model() -> Arc<Model> {
    Arc::new(
        Model::new("User")
            .with_id_property("email")
            .with_field("name", FieldKind::String)
            .with_field("email", FieldKind::String)
            .with_field("group", FieldKind::String)
            .with_field("age", FieldKind::Int)
            .with_field("evil", FieldKind::Bool),
    )
}

pub fn users() -> Vec<Value> {
    vec![
        json!({"name": "Ed Spencer", "email": "ed@sencha.com", "evil": false, "group": "code", "age": 25}),
        json!({"name": "Abe Elias", "email": "abe@sencha.com", "evil": false, "group": "admin", "age": 20}),
        json!({"name": "Aaron Conran", "email": "aaron@sencha.com", "evil": true, "group": "admin", "age": 26}),
        json!({"name": "Tommy Maintz", "email": "tommy@sencha.com", "evil": true, "group": "code", "age": 70}),
    ]
}

/// Source collection holding the four users, plus a view chained to it
pub fn source_and_view() -> (BackingCollection, DerivedView) {
    let source = BackingCollection::new(user_model());
    source
        .load_data(users())
        .expect("fixture users load");
    let view = DerivedView::new(&source).expect("view over fixture source");
    (source, view)
}

pub fn user(source: &impl RecordAccess, name: &str) -> Record {
    source
        .find_record("email", format!("{name}@"), FindOptions::default())
        .unwrap_or_else(|| panic!("no user {name}"))
}

/// First-name handles, i.e. `ed` for `ed@sencha.com`
pub fn handles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            r.get("email")
                .to_string()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Records every event an observable raises
#[derive(Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<StoreEvent>>>,
}

impl EventLog {
    pub fn attach(target: &impl Observable) -> Self {
        let log = EventLog::default();
        let sink = log.events.clone();
        target.on(move |_, event| sink.borrow_mut().push(event.clone()));
        log
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(StoreEvent::kind).collect()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
