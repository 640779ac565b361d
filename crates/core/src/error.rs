/// Domain-level error taxonomy shared by every AccelBench crate.
///
/// The API layer maps these onto HTTP statuses; inside a benchmark run the
/// orchestrator treats `Infrastructure` and `Data` errors as fatal-to-run.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    #[error("Entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input at an ingress boundary.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An operation conflicts with current state (e.g. cancelling a
    /// completed run).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled cooperatively (e.g. a run cancel).
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A cluster RPC failed or timed out.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// A payload could not be parsed, or a persisted write failed its
    /// read-back verification.
    #[error("Data error: {0}")]
    Data(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with a displayable id.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience alias for fallible domain operations.
pub type CoreResult<T> = Result<T, CoreError>;
