//! Load operations and the proxies that fetch raw data for them
//!
//! A proxy only produces a raw JSON document; turning it into rows is the
//! job of the collection's [`JsonReader`](crate::reader::JsonReader).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use strata_model::OperationId;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Kind of data operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Read,
}

/// One load request and its outcome
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: OperationId,
    pub action: OperationAction,
    pub params: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `None` while the operation is pending
    pub success: Option<bool>,
    pub error: Option<String>,
}

impl Operation {
    pub fn read(params: Map<String, Value>) -> Self {
        Self {
            id: OperationId::new(),
            action: OperationAction::Read,
            params,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub(crate) fn complete(&mut self, outcome: std::result::Result<(), String>) {
        self.completed_at = Some(Utc::now());
        match outcome {
            Ok(()) => self.success = Some(true),
            Err(reason) => {
                self.success = Some(false);
                self.error = Some(reason);
            }
        }
    }
}

/// Source of raw data for [`BackingCollection::load`](crate::BackingCollection::load)
#[async_trait(?Send)]
pub trait Proxy: std::fmt::Debug {
    async fn read(&self, operation: &Operation) -> Result<Value, ProxyError>;
}

/// Serves a JSON document held in memory
#[derive(Debug, Default)]
pub struct MemoryProxy {
    data: RefCell<Value>,
}

impl MemoryProxy {
    pub fn new(data: Value) -> Self {
        Self {
            data: RefCell::new(data),
        }
    }

    /// Replace the document served by later reads
    pub fn set_data(&self, data: Value) {
        *self.data.borrow_mut() = data;
    }
}

#[async_trait(?Send)]
impl Proxy for MemoryProxy {
    async fn read(&self, operation: &Operation) -> Result<Value, ProxyError> {
        debug!(operation_id = %operation.id, "reading from memory proxy");
        Ok(self.data.borrow().clone())
    }
}

/// Reads a JSON document from disk on every load
#[derive(Debug, Clone)]
pub struct FileProxy {
    path: PathBuf,
}

impl FileProxy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait(?Send)]
impl Proxy for FileProxy {
    async fn read(&self, operation: &Operation) -> Result<Value, ProxyError> {
        debug!(
            operation_id = %operation.id,
            path = %self.path.display(),
            "reading from file proxy"
        );
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn memory_proxy_serves_latest_data() {
        let proxy = MemoryProxy::new(json!([{"id": 1}]));
        let op = Operation::read(Map::new());
        assert_eq!(proxy.read(&op).await.unwrap(), json!([{"id": 1}]));

        proxy.set_data(json!([]));
        assert_eq!(proxy.read(&op).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn file_proxy_reads_and_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"data": [{{"id": 7}}]}}"#).unwrap();

        let proxy = FileProxy::new(file.path());
        let value = proxy.read(&Operation::read(Map::new())).await.unwrap();
        assert_eq!(value["data"][0]["id"], json!(7));
    }

    #[tokio::test]
    async fn file_proxy_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = FileProxy::new(dir.path().join("absent.json"));
        let err = proxy.read(&Operation::read(Map::new())).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
    }

    #[test]
    fn operation_records_outcome() {
        let mut op = Operation::read(Map::new());
        assert!(!op.is_complete());
        op.complete(Err("boom".into()));
        assert_eq!(op.success, Some(false));
        assert_eq!(op.error.as_deref(), Some("boom"));
    }
}
