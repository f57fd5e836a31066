//! Passada (run) data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::PassadaError;
use crate::roster::{CategoryId, CategoryKind, CompetitorId};
use crate::trio::{EventId, TrioId};

/// Passada ID type
pub type PassadaId = i64;

/// Participation cap used when no config says otherwise
pub const DEFAULT_MAX_RUNS_PER_COMPETITOR: u32 = 5;

/// Default time limit in seconds
pub fn default_time_limit() -> Decimal {
    Decimal::from(60)
}

/// Passada lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassadaStatus {
    #[default]
    Pending,
    Executed,
    NoTime,
    Disqualified,
    Sat,
}

impl std::fmt::Display for PassadaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassadaStatus::Pending => write!(f, "pending"),
            PassadaStatus::Executed => write!(f, "executed"),
            PassadaStatus::NoTime => write!(f, "no_time"),
            PassadaStatus::Disqualified => write!(f, "disqualified"),
            PassadaStatus::Sat => write!(f, "sat"),
        }
    }
}

impl std::str::FromStr for PassadaStatus {
    type Err = PassadaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PassadaStatus::Pending),
            "executed" => Ok(PassadaStatus::Executed),
            "no_time" => Ok(PassadaStatus::NoTime),
            "disqualified" => Ok(PassadaStatus::Disqualified),
            "sat" => Ok(PassadaStatus::Sat),
            other => Err(PassadaError::InvalidStatus(other.to_string())),
        }
    }
}

/// Administrative override details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatRecord {
    pub reason: String,
    pub applied_by: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// Runs sharing a comparison group are ranked against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComparisonKey {
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub run_number: u32,
}

/// One timed run of a trio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passada {
    pub id: PassadaId,
    pub trio_id: TrioId,
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub run_number: u32,
    pub animal_number: Option<u32>,
    pub time: Option<Decimal>,
    pub time_limit: Decimal,
    pub status: PassadaStatus,
    pub points: Decimal,
    pub placement: Option<u32>,
    pub sat: Option<SatRecord>,
    pub ran_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Passada {
    pub fn key(&self) -> ComparisonKey {
        ComparisonKey {
            event_id: self.event_id,
            category_id: self.category_id,
            run_number: self.run_number,
        }
    }

    pub fn is_sat(&self) -> bool {
        self.status == PassadaStatus::Sat
    }

    /// Executed, not voided, with a time. Only these take a placement.
    pub fn is_ranked(&self) -> bool {
        self.status == PassadaStatus::Executed && self.time.is_some()
    }

    /// The run has produced a result the trio cannot take back by deletion
    pub fn has_result(&self) -> bool {
        matches!(
            self.status,
            PassadaStatus::Executed | PassadaStatus::NoTime | PassadaStatus::Disqualified
        )
    }
}

/// A run ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPassada {
    pub trio_id: TrioId,
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub run_number: u32,
    pub animal_number: Option<u32>,
    pub time_limit: Decimal,
}

/// Per (event, category) run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassadaConfig {
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub max_passadas_per_trio: u32,
    pub max_runs_per_competitor: u32,
    pub default_time_limit: Decimal,
    pub min_interval_minutes: u32,
    pub allow_repeat_animal: bool,
    pub animal_pool: Vec<u32>,
    pub active: bool,
}

impl PassadaConfig {
    pub fn new(event_id: EventId, category_id: CategoryId) -> Self {
        Self {
            event_id,
            category_id,
            max_passadas_per_trio: 1,
            max_runs_per_competitor: DEFAULT_MAX_RUNS_PER_COMPETITOR,
            default_time_limit: default_time_limit(),
            min_interval_minutes: 0,
            allow_repeat_animal: true,
            animal_pool: Vec::new(),
            active: true,
        }
    }

    /// Trios each competitor should join to use up their runs.
    ///
    /// Integer division; zero means no further trios.
    pub fn participation_quota(&self) -> u32 {
        if self.max_passadas_per_trio == 0 {
            return 0;
        }
        self.max_runs_per_competitor / self.max_passadas_per_trio
    }
}

/// Runs created with a new trio when no config exists
pub fn kind_run_defaults(kind: CategoryKind) -> (u32, Decimal) {
    match kind {
        CategoryKind::Baby => (3, Decimal::from(90)),
        CategoryKind::Kids => (5, Decimal::from(75)),
        CategoryKind::Mirim | CategoryKind::Feminina => (8, Decimal::from(65)),
        CategoryKind::Aberta => (10, Decimal::from(50)),
        CategoryKind::Handicap => (10, Decimal::from(55)),
        CategoryKind::Soma => (1, default_time_limit()),
    }
}

/// Per (competitor, event, category) run counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationControl {
    pub competitor_id: CompetitorId,
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub total_executed: u32,
    pub max_allowed: u32,
    pub can_compete: bool,
    pub block_reason: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ParticipationControl {
    pub fn new(
        competitor_id: CompetitorId,
        event_id: EventId,
        category_id: CategoryId,
        max_allowed: u32,
    ) -> Self {
        Self {
            competitor_id,
            event_id,
            category_id,
            total_executed: 0,
            max_allowed,
            can_compete: true,
            block_reason: None,
            last_run_at: None,
        }
    }

    /// Count one run. Returns `true` if this run blocked the competitor.
    pub fn record_run(&mut self, at: DateTime<Utc>) -> bool {
        self.total_executed += 1;
        self.last_run_at = Some(at);

        if self.can_compete && self.total_executed >= self.max_allowed {
            self.can_compete = false;
            self.block_reason = Some(format!(
                "Reached the limit of {} runs",
                self.max_allowed
            ));
            return true;
        }
        false
    }

    pub fn remaining(&self) -> u32 {
        self.max_allowed.saturating_sub(self.total_executed)
    }

    pub fn is_available(&self) -> bool {
        self.can_compete && self.total_executed < self.max_allowed
    }
}
