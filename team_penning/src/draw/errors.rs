//! Draw error types.

use thiserror::Error;

use crate::db::StoreError;
use crate::roster::{CategoryId, CompetitorId};
use crate::trio::EventId;

/// Draw errors
#[derive(Debug, Error)]
pub enum DrawError {
    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Category does not allow draws
    #[error("Draw is not allowed for category {0}")]
    DrawNotAllowed(String),

    /// Too few competitors to form the requested trios
    #[error("Insufficient competitors: {needed} needed, {available} available")]
    InsufficientCompetitors { needed: usize, available: usize },

    /// Draw policy breaks its invariant
    #[error("Invalid draw policy: {0}")]
    InvalidPolicy(String),

    /// Category not found
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    /// Competitor not found
    #[error("Competitor not found: {0}")]
    CompetitorNotFound(CompetitorId),

    /// Round-based draws need the run configuration
    #[error("No run configuration for event {event_id}, category {category_id}")]
    ConfigNotFound {
        event_id: EventId,
        category_id: CategoryId,
    },

    /// A formed trio broke the category rules
    #[error("Trio {members:?} is not eligible: {}", .reasons.join("; "))]
    IneligibleTrio {
        members: [CompetitorId; 3],
        reasons: Vec<String>,
    },
}

impl DrawError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            DrawError::Store(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for draw operations
pub type DrawResult<T> = Result<T, DrawError>;
