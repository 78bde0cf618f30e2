mod common;

use async_trait::async_trait;
use common::{EventLog, handles, source_and_view, user_model, users};
use futures::channel::oneshot;
use serde_json::{Map, Value, json};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;
use strata_core::prelude::*;
use strata_core::{Operation, ProxyError};

/// Proxy whose responses are supplied by the test, one per read
#[derive(Debug, Clone, Default)]
struct DeferredProxy {
    pending: Rc<RefCell<VecDeque<oneshot::Receiver<Value>>>>,
}

impl DeferredProxy {
    fn defer(&self) -> oneshot::Sender<Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push_back(rx);
        tx
    }
}

#[async_trait(?Send)]
impl Proxy for DeferredProxy {
    async fn read(&self, _operation: &Operation) -> Result<Value, ProxyError> {
        let response = self
            .pending
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ProxyError::Rejected("no response queued".to_string()))?;
        response
            .await
            .map_err(|_| ProxyError::Rejected("response dropped".to_string()))
    }
}

#[tokio::test]
async fn memory_load_fires_one_refresh_per_level_and_no_adds() -> anyhow::Result<()> {
    let (source, view) = source_and_view();
    source.set_proxy(MemoryProxy::new(json!({
        "data": [{"name": "Jamie", "email": "jamie@sencha.com", "group": "code"}],
        "total": 1
    })));
    let source_log = EventLog::attach(&source);
    let view_log = EventLog::attach(&view);

    let future = source.load();
    assert!(source.is_loading());
    assert_eq!(source_log.kinds(), vec![EventKind::BeforeLoad]);
    assert_eq!(view_log.kinds(), vec![EventKind::BeforeLoad]);

    let loaded = future.await?;
    assert_eq!(loaded.len(), 1);
    assert!(!source.is_loading());

    for log in [&source_log, &view_log] {
        assert_eq!(
            log.kinds(),
            vec![
                EventKind::BeforeLoad,
                EventKind::Load,
                EventKind::Refresh,
                EventKind::DataChanged
            ]
        );
        assert_eq!(log.count(EventKind::Add), 0);
        assert_eq!(log.count(EventKind::Remove), 0);
    }
    assert_eq!(handles(&view.get_range()), ["jamie"]);
    assert!(matches!(
        source_log.events().get(1),
        Some(StoreEvent::Load { success: true, operation, .. })
            if operation.success == Some(true) && operation.is_complete()
    ));
    Ok(())
}

#[tokio::test]
async fn file_load_reads_through_the_reader() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "{}", json!({"data": users(), "total": 4}))?;

    let source = BackingCollection::new(user_model()).with_proxy(FileProxy::new(file.path()));
    let records = source.load().await?;

    assert_eq!(records.len(), 4);
    assert_eq!(source.get_count(), 4);
    assert!(records.iter().all(|r| r.joined_count() == 1));
    Ok(())
}

#[tokio::test]
async fn load_params_are_carried_on_the_operation() -> anyhow::Result<()> {
    let source = BackingCollection::new(user_model()).with_proxy(MemoryProxy::new(json!([])));
    let log = EventLog::attach(&source);

    let mut params = Map::new();
    params.insert("page".to_string(), json!(2));
    source.load_with(params).await?;

    assert!(matches!(
        log.events().first(),
        Some(StoreEvent::BeforeLoad { operation }) if operation.params.get("page") == Some(&json!(2))
    ));
    Ok(())
}

#[tokio::test]
async fn failed_load_keeps_existing_data() {
    let (source, view) = source_and_view();
    source.set_proxy(MemoryProxy::new(json!({"success": false, "message": "backend down"})));
    let before = source.get_range();
    let source_log = EventLog::attach(&source);
    let view_log = EventLog::attach(&view);

    let err = source.load().await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::LoadFailed { operation_id: Some(_), ref reason } if reason.contains("backend down")
    ));
    assert_eq!(source.get_range(), before);
    assert_eq!(view.get_count(), 4);
    for log in [&source_log, &view_log] {
        assert_eq!(log.count(EventKind::LoadFailed), 1);
        assert_eq!(log.count(EventKind::Load), 1);
        assert_eq!(log.count(EventKind::Refresh), 0);
    }
    assert!(matches!(
        source_log.events().last(),
        Some(StoreEvent::Load { success: false, records, .. }) if records.is_empty()
    ));
}

#[tokio::test]
async fn bad_row_fails_the_whole_load() {
    let (source, _view) = source_and_view();
    source.set_proxy(MemoryProxy::new(json!([
        {"email": "ok@sencha.com", "age": 1},
        {"email": "bad@sencha.com", "age": "not a number"}
    ])));

    assert!(source.load().await.is_err());
    assert_eq!(source.get_count(), 4);
}

#[tokio::test]
async fn newer_load_supersedes_a_pending_one() -> anyhow::Result<()> {
    let source = BackingCollection::new(user_model());
    let proxy = DeferredProxy::default();
    source.set_proxy(proxy.clone());
    let log = EventLog::attach(&source);

    let first_tx = proxy.defer();
    let second_tx = proxy.defer();
    let mut first = source.load();
    let mut second = source.load();
    assert!(futures::poll!(&mut first).is_pending());
    assert!(futures::poll!(&mut second).is_pending());

    let _ = second_tx.send(json!([{"email": "second@sencha.com"}]));
    let loaded = second.await?;
    assert_eq!(handles(&loaded), ["second"]);

    let _ = first_tx.send(json!([{"email": "first@sencha.com"}]));
    assert_eq!(first.await.unwrap_err(), StoreError::LoadSuperseded);

    assert_eq!(handles(&source.get_range()), ["second"]);
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::BeforeLoad,
            EventKind::BeforeLoad,
            EventKind::Load,
            EventKind::Refresh,
            EventKind::DataChanged
        ]
    );
    Ok(())
}

#[tokio::test]
async fn load_without_proxy_is_invalid() {
    let source = BackingCollection::new(user_model());
    let log = EventLog::attach(&source);
    assert!(matches!(
        source.load().await,
        Err(StoreError::InvalidOperation(_))
    ));
    assert!(log.is_empty());
}

#[tokio::test]
async fn destroying_during_a_load_discards_the_response() {
    let source = BackingCollection::new(user_model());
    let proxy = DeferredProxy::default();
    source.set_proxy(proxy.clone());

    let tx = proxy.defer();
    let mut pending = source.load();
    assert!(futures::poll!(&mut pending).is_pending());

    source.destroy();
    let _ = tx.send(json!([{"email": "late@sencha.com"}]));
    assert!(matches!(
        pending.await,
        Err(StoreError::InvalidOperation(_))
    ));
    assert_eq!(source.get_count(), 0);
}

#[test]
fn synchronous_loads_fire_refresh_and_datachanged_once() {
    let (source, view) = source_and_view();
    let nested = DerivedView::new(&view).unwrap();
    let logs = [
        EventLog::attach(&source),
        EventLog::attach(&view),
        EventLog::attach(&nested),
    ];

    source.load_data(users()).unwrap();
    source
        .load_raw_data(json!({"data": users(), "total": 4}))
        .unwrap();

    for log in &logs {
        assert_eq!(
            log.kinds(),
            vec![
                EventKind::Refresh,
                EventKind::DataChanged,
                EventKind::Refresh,
                EventKind::DataChanged
            ]
        );
    }
    assert_eq!(nested.get_range(), source.get_range());
}

#[test]
fn load_data_rejects_duplicate_rows() {
    let (source, _view) = source_and_view();
    let err = source
        .load_data([json!({"email": "x@y.z"}), json!({"email": "x@y.z"})])
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIdentity { .. }));
    assert_eq!(source.get_count(), 4);
}
