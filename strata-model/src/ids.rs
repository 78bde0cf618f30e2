use uuid::Uuid;

/// Internal identifier of a record, distinct from its identity key.
///
/// Stays stable for the lifetime of the record even when the record is a
/// phantom whose identity key was generated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RecordId(pub Uuid);

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordId {
    pub fn new() -> Self {
        RecordId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl AsRef<Uuid> for RecordId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned when registering an event listener
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub struct ListenerId(pub Uuid);

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerId {
    pub fn new() -> Self {
        ListenerId(Uuid::now_v7())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single load operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct OperationId(pub Uuid);

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationId {
    pub fn new() -> Self {
        OperationId(Uuid::now_v7())
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
