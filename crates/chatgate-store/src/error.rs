//! Error types for chatgate storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record, e.g. `payment`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The requested change is not representable. Nothing was written.
    #[error(transparent)]
    Invalid(#[from] chatgate_core::GateError),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Shorthand for a missing payment.
    #[must_use]
    pub fn payment_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: "payment",
            id: id.to_string(),
        }
    }
}
