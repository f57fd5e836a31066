//! Trio error types.

use thiserror::Error;

use super::models::TrioId;
use crate::db::StoreError;
use crate::roster::{CategoryId, CompetitorId};

/// Trio errors
#[derive(Debug, Error)]
pub enum TrioError {
    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Member count other than three
    #[error("A trio must have exactly 3 members, got {0}")]
    InvalidSize(usize),

    /// Same competitor twice
    #[error("Competitor {0} appears more than once in the trio")]
    DuplicateMember(CompetitorId),

    /// Eligibility rules rejected the trio
    #[error("Trio is not eligible: {}", .0.join("; "))]
    Ineligible(Vec<String>),

    /// Competitor not found
    #[error("Competitor not found: {0}")]
    CompetitorNotFound(CompetitorId),

    /// Category not found
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    /// Trio not found
    #[error("Trio not found: {0}")]
    TrioNotFound(TrioId),

    /// Trio number already taken in the event and category
    #[error("Trio number {0} is already in use")]
    DuplicateNumber(u32),

    /// Trio already has recorded runs
    #[error("Trio {0} has recorded results and cannot be deleted")]
    HasResults(TrioId),

    /// Unknown status tag
    #[error("Invalid trio status: {0}")]
    InvalidStatus(String),
}

impl TrioError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            TrioError::Store(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for trio operations
pub type TrioResult<T> = Result<T, TrioError>;
