use strata_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Store `{store}` references unknown model `{model}`")]
    UnknownModel { store: String, model: String },

    #[error("View `{view}` references unknown source `{source_id}`")]
    UnknownSource { view: String, source_id: String },

    #[error("Views form a cycle: {}", .views.join(" -> "))]
    Cycle { views: Vec<String> },

    #[error("Invalid query on `{owner}`: {reason}")]
    InvalidQuery { owner: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
