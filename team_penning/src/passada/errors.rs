//! Passada error types.

use rust_decimal::Decimal;
use thiserror::Error;

use super::models::{PassadaId, PassadaStatus};
use crate::db::StoreError;
use crate::roster::{CategoryId, CompetitorId};
use crate::trio::{EventId, TrioId};

/// Passada errors
#[derive(Debug, Error)]
pub enum PassadaError {
    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Passada not found
    #[error("Passada not found: {0}")]
    PassadaNotFound(PassadaId),

    /// Trio not found
    #[error("Trio not found: {0}")]
    TrioNotFound(TrioId),

    /// Run number already used by the trio
    #[error("Run number {run_number} already exists for trio {trio_id}")]
    DuplicateRunNumber { trio_id: TrioId, run_number: u32 },

    /// Run number above the configured limit
    #[error("Run number {run_number} exceeds the maximum of {max} runs per trio")]
    ExceedsMaxPassadas { run_number: u32, max: u32 },

    /// Requested batch is too large
    #[error("Cannot create {requested} runs, the maximum per trio is {max}")]
    BatchTooLarge { requested: u32, max: u32 },

    /// A trio member has used up their runs in this event and category
    #[error("Competitor {competitor_id} has reached the run limit and cannot compete")]
    ParticipantBlocked { competitor_id: CompetitorId },

    /// Time recording attempted on a voided run
    #[error("Cannot record time on SAT passada {0}")]
    SatLocked(PassadaId),

    /// Time outside 0..=2x limit
    #[error("Invalid time {time}: must be between 0 and {max}")]
    InvalidTime { time: Decimal, max: Decimal },

    /// Transition not allowed from the current status
    #[error("Cannot {action} a passada in status {from}")]
    InvalidTransition {
        from: PassadaStatus,
        action: &'static str,
    },

    /// Unknown status tag
    #[error("Invalid passada status: {0}")]
    InvalidStatus(String),

    /// Config already exists for the event and category
    #[error("Run configuration already exists for event {event_id}, category {category_id}")]
    DuplicateConfig {
        event_id: EventId,
        category_id: CategoryId,
    },

    /// Config required but missing
    #[error("No run configuration for event {event_id}, category {category_id}")]
    ConfigNotFound {
        event_id: EventId,
        category_id: CategoryId,
    },

    /// No animals configured
    #[error("No animal pool configured for event {event_id}, category {category_id}")]
    EmptyAnimalPool {
        event_id: EventId,
        category_id: CategoryId,
    },
}

impl PassadaError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            PassadaError::Store(e) => e.client_message(),
            _ => self.to_string(),
        }
    }

    /// Local failure the caller can fix and retry
    pub fn is_validation(&self) -> bool {
        !matches!(self, PassadaError::Store(_))
    }
}

/// Result type for passada operations
pub type PassadaResult<T> = Result<T, PassadaError>;
