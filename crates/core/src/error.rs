//! Error taxonomy shared by every close operation.

/// Result alias for close operations.
pub type Result<T> = std::result::Result<T, CloseError>;

/// Errors surfaced to callers in the `{error, type}` envelope.
///
/// None of these are retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    /// Missing or malformed field, invalid enum value, malformed date.
    #[error("{0}")]
    Validation(String),

    /// The template or an instantiated graph contains a dependency cycle.
    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected {
        /// Task names along the cycle; the first name is repeated at the end
        path: Vec<String>,
    },

    /// Unknown period or task id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An optimistic status update lost a race, or the entity already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal template inconsistency.
    #[error("Template error: {0}")]
    Template(String),

    /// The store failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CloseError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        CloseError::Validation(message.into())
    }

    /// The `type` reported in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            CloseError::Validation(_) => "ValidationError",
            CloseError::CycleDetected { .. } => "CycleDetected",
            CloseError::NotFound(_) => "NotFoundError",
            CloseError::Conflict(_) => "ConflictError",
            CloseError::Template(_) => "TemplateError",
            CloseError::Storage(_) => "StorageError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_envelope_types() {
        assert_eq!(CloseError::validation("x").kind(), "ValidationError");
        assert_eq!(CloseError::NotFound("p".into()).kind(), "NotFoundError");
        assert_eq!(CloseError::Conflict("c".into()).kind(), "ConflictError");
        assert_eq!(CloseError::Template("t".into()).kind(), "TemplateError");
        assert_eq!(CloseError::Storage("s".into()).kind(), "StorageError");
        assert_eq!(
            CloseError::CycleDetected { path: vec![] }.kind(),
            "CycleDetected"
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = CloseError::CycleDetected {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: A -> B -> A");
    }
}
