//! Draw settings and outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

use crate::roster::{CompetitorId, TRIO_SIZE};
use crate::trio::Trio;

/// Trio member ids in choice order
pub type TrioIds = [CompetitorId; TRIO_SIZE];

/// Iteration caps for the randomized and greedy strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawSettings {
    /// Trio searches the age-bounded draw may run
    pub age_draw_attempts: usize,
    /// Candidate checks the open draw may run
    pub open_draw_iterations: usize,
    /// Hard cap on rounds in a quota draw
    pub max_draw_rounds: usize,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            age_draw_attempts: 1000,
            open_draw_iterations: 5000,
            max_draw_rounds: 100,
        }
    }
}

impl DrawSettings {
    /// Read caps from the environment, keeping defaults for unset or
    /// unparsable values:
    /// - `PENNING_AGE_DRAW_ATTEMPTS` (default: 1000)
    /// - `PENNING_OPEN_DRAW_ITERATIONS` (default: 5000)
    /// - `PENNING_MAX_DRAW_ROUNDS` (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Self {
            age_draw_attempts: read("PENNING_AGE_DRAW_ATTEMPTS", defaults.age_draw_attempts),
            open_draw_iterations: read(
                "PENNING_OPEN_DRAW_ITERATIONS",
                defaults.open_draw_iterations,
            ),
            max_draw_rounds: read("PENNING_MAX_DRAW_ROUNDS", defaults.max_draw_rounds),
        }
    }
}

/// Strategy used by a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    Full,
    Partial,
    AgeBounded,
    Open,
}

impl std::fmt::Display for DrawKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawKind::Full => write!(f, "full draw"),
            DrawKind::Partial => write!(f, "partial draw"),
            DrawKind::AgeBounded => write!(f, "age-bounded draw"),
            DrawKind::Open => write!(f, "open draw"),
        }
    }
}

/// Raw result of one strategy run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formation {
    pub trios: Vec<TrioIds>,
    pub leftover: Vec<CompetitorId>,
    pub iterations: usize,
    pub cap_reached: bool,
}

/// Competitor dropped before the draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCompetitor {
    pub competitor_id: CompetitorId,
    pub reasons: Vec<String>,
}

/// Result of one draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub kind: DrawKind,
    pub trios: Vec<TrioIds>,
    /// Eligible competitors left without a trio
    pub leftover: Vec<CompetitorId>,
    pub excluded: Vec<ExcludedCompetitor>,
    pub iterations: usize,
    /// The strategy stopped on its iteration cap rather than running out
    /// of candidates
    pub cap_reached: bool,
    pub message: String,
}

/// Persisted result of a single draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawReport {
    pub outcome: DrawOutcome,
    pub trios: Vec<Trio>,
}

/// Persisted result of a quota draw over several rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundsReport {
    pub quota: u32,
    pub rounds: usize,
    pub trios: Vec<Trio>,
    /// Trios each competitor of the pool belongs to after the draw
    pub participation: BTreeMap<CompetitorId, u32>,
    /// Competitors still below the quota
    pub below_quota: Vec<CompetitorId>,
    /// Placements made against placements possible, in percent
    pub efficiency: f64,
    pub message: String,
}

/// A prior champion entering the Copa dos Campeões
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionSeed {
    pub competitor_id: CompetitorId,
    pub handicap: u8,
}

/// Result of seeding champions into trios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedingOutcome {
    /// Members in assignment order; the first two are heads of bracket
    pub trios: Vec<TrioIds>,
    pub leftover: Vec<CompetitorId>,
    pub message: String,
}

/// Persisted result of a seeding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedingReport {
    pub outcome: SeedingOutcome,
    pub trios: Vec<Trio>,
}
