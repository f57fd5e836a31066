//! Roster error types.

use thiserror::Error;

/// Roster errors
#[derive(Debug, Error)]
pub enum RosterError {
    /// Handicap outside 0..=7
    #[error("Invalid handicap: {0} (must be between 0 and 7)")]
    InvalidHandicap(u8),

    /// Sex tag other than M/F
    #[error("Invalid sex: {0} (must be M or F)")]
    InvalidSex(String),

    /// Unknown category kind tag
    #[error("Unknown category kind: {0}")]
    UnknownCategoryKind(String),

    /// Unknown scoring scheme tag
    #[error("Unknown scoring scheme: {0}")]
    UnknownScoringScheme(String),

    /// Draw policy breaks its invariant
    #[error("Invalid draw policy: {0}")]
    InvalidDrawPolicy(String),
}

/// Result type for roster operations
pub type RosterResult<T> = Result<T, RosterError>;
