use strata_model::{ModelError, OperationId, RecordKey};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Duplicate identity key: {key}")]
    DuplicateIdentity { key: RecordKey },

    #[error("Load failed: {reason}")]
    LoadFailed {
        operation_id: Option<OperationId>,
        reason: String,
    },

    #[error("Load superseded by a newer request")]
    LoadSuperseded,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
