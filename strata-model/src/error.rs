use thiserror::Error;

/// Errors produced by model descriptors and field conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("field `{field}` expected {expected}, found {found}")]
    InvalidValue {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("record data for model `{model}` must be an object, found {found}")]
    NotAnObject { model: String, found: String },

    #[error("model `{model}` has no usable identity in field `{field}`")]
    MissingIdentity { model: String, field: String },

    #[error("unknown field `{0}`")]
    UnknownField(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
