//! Persistence error types.

use thiserror::Error;

/// Persistence errors shared by every repository implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Unique key already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data breaks a structural invariant (a trio without exactly
    /// three members, a run whose trio is gone). The enclosing
    /// transaction is rolled back.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Invalid connection configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Get a client-safe error message that doesn't leak SQL details
    pub fn client_message(&self) -> String {
        match self {
            StoreError::Database(_) | StoreError::Serialization(_) => {
                "Internal server error".to_string()
            }
            StoreError::Integrity(_) => "Internal data error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the error is a unique-constraint violation
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_internals() {
        let err = StoreError::Integrity("trio 4 has 2 members".to_string());
        assert_eq!(err.client_message(), "Internal data error");

        let err = StoreError::NotFound {
            entity: "Trio",
            id: 4,
        };
        assert_eq!(err.client_message(), "Trio not found: 4");
    }

    #[test]
    fn test_conflict_detection() {
        assert!(StoreError::Conflict("run 1".to_string()).is_conflict());
        assert!(!StoreError::Integrity("x".to_string()).is_conflict());
    }
}
