//! Extraction of record rows from raw JSON responses

use crate::proxy::ProxyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows and metadata pulled out of one response
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Value>,
    /// Server-reported total, when present
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Locates rows inside a JSON response.
///
/// A bare array is taken as the rows themselves. An object carries the rows
/// under `root_property`, a single object there being one row. An explicit
/// `false` under `success_property` turns the response into a failure
/// carrying the text under `message_property`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonReader {
    pub root_property: String,
    pub success_property: String,
    pub message_property: String,
    pub total_property: String,
}

impl Default for JsonReader {
    fn default() -> Self {
        Self {
            root_property: "data".to_string(),
            success_property: "success".to_string(),
            message_property: "message".to_string(),
            total_property: "total".to_string(),
        }
    }
}

impl JsonReader {
    pub fn with_root(mut self, root_property: impl Into<String>) -> Self {
        self.root_property = root_property.into();
        self
    }

    pub fn read(&self, raw: Value) -> Result<ResultSet, ProxyError> {
        let mut object = match raw {
            Value::Array(rows) => {
                return Ok(ResultSet {
                    rows,
                    total: None,
                    message: None,
                });
            }
            Value::Object(object) => object,
            other => {
                return Err(ProxyError::Rejected(format!(
                    "expected an array or object response, found {other}"
                )));
            }
        };

        let message = object
            .get(&self.message_property)
            .and_then(Value::as_str)
            .map(str::to_string);

        if object.get(&self.success_property) == Some(&Value::Bool(false)) {
            return Err(ProxyError::Rejected(
                message.unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }

        let total = object.get(&self.total_property).and_then(Value::as_u64);
        let rows = match object.remove(&self.root_property) {
            Some(Value::Array(rows)) => rows,
            Some(Value::Null) | None => Vec::new(),
            Some(row @ Value::Object(_)) => vec![row],
            Some(other) => {
                return Err(ProxyError::Rejected(format!(
                    "`{}` must hold an array of rows, found {other}",
                    self.root_property
                )));
            }
        };

        Ok(ResultSet {
            rows,
            total,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_the_row_set() {
        let set = JsonReader::default().read(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(set.rows.len(), 2);
        assert_eq!(set.total, None);
    }

    #[test]
    fn object_rows_come_from_root_property() {
        let reader = JsonReader::default().with_root("users");
        let set = reader
            .read(json!({"users": [{"id": 1}], "total": 40, "message": "ok"}))
            .unwrap();
        assert_eq!(set.rows, vec![json!({"id": 1})]);
        assert_eq!(set.total, Some(40));
        assert_eq!(set.message.as_deref(), Some("ok"));
    }

    #[test]
    fn explicit_failure_is_rejected_with_message() {
        let err = JsonReader::default()
            .read(json!({"success": false, "message": "denied"}))
            .unwrap_err();
        assert!(matches!(err, ProxyError::Rejected(ref msg) if msg == "denied"));
    }

    #[test]
    fn scalar_responses_are_rejected() {
        assert!(JsonReader::default().read(json!(42)).is_err());
        assert!(JsonReader::default().read(json!({"data": 3})).is_err());
    }
}
