/// Recoverable failures raised by the conversation stores.
///
/// None of these leave a store half-mutated: an operation that returns an error
/// has not committed anything and has not notified subscribers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation `{id}` does not exist")]
    NotFound { id: String },
    #[error("message index {index} is out of range for conversation `{id}` ({len} messages)")]
    IndexOutOfRange { id: String, index: usize, len: usize },
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    #[error("invalid stream target: {0}")]
    InvalidTarget(String),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Whether the error came from the storage layer rather than from the caller.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}
