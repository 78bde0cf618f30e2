use crate::reader::JsonReader;
use serde::{Deserialize, Serialize};

/// What `add`/`insert` do with a record whose identity key is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the whole call with `DuplicateIdentity`, changing nothing
    #[default]
    Reject,
    /// Remove the existing record, then add the new one
    Replace,
}

/// Settings of a backing collection.
///
/// Every field is optional in serialized form and falls back to the values
/// documented below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Identifier used when the collection is registered. Default: none.
    pub store_id: Option<String>,

    /// Duplicate identity handling. Default: `reject`.
    pub duplicate_policy: DuplicatePolicy,

    /// How rows are located in load responses. Default: rows under `data`.
    pub reader: JsonReader,
}

impl CollectionConfig {
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: CollectionConfig =
            serde_json::from_str(r#"{"duplicate_policy": "replace"}"#).unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(config.store_id, None);
        assert_eq!(config.reader.root_property, "data");
    }
}
