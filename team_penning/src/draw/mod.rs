//! Trio draws and champion seeding.
//!
//! The engine picks a strategy from the category (full, partial,
//! age-bounded or open), removes competitors who fail the individual
//! rules and partitions the rest into trios. The manager wraps the engine
//! with persistence, participation limits and multi-round quotas.
//!
//! ```
//! use chrono::NaiveDate;
//! use rand::{SeedableRng, rngs::StdRng};
//! use team_penning::draw::{DrawEngine, DrawKind, DrawSettings};
//! use team_penning::roster::{Category, CategoryKind, Competitor, EligibilityRules, Sex};
//!
//! let category = Category::preset(1, "Baby", CategoryKind::Baby);
//! let on = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
//! let born = NaiveDate::from_ymd_opt(2017, 3, 1).unwrap();
//! let pool: Vec<Competitor> = (1..=7)
//!     .map(|id| Competitor::new(id, format!("Rider {id}"), born, 0, Sex::Male).unwrap())
//!     .collect();
//!
//! let engine = DrawEngine::new(EligibilityRules::new(&category, on), DrawSettings::default());
//! let outcome = engine.run(&pool, &mut StdRng::seed_from_u64(42)).unwrap();
//!
//! assert_eq!(outcome.kind, DrawKind::Full);
//! assert_eq!(outcome.trios.len(), 2);
//! assert_eq!(outcome.leftover.len(), 1);
//! ```

pub mod engine;
pub mod errors;
pub mod manager;
pub mod models;
pub mod seeding;
pub mod strategy;

pub use engine::DrawEngine;
pub use errors::{DrawError, DrawResult};
pub use manager::DrawManager;
pub use models::{
    ChampionSeed, DrawKind, DrawOutcome, DrawReport, DrawSettings, ExcludedCompetitor, Formation,
    RoundsReport, SeedingOutcome, SeedingReport, TrioIds,
};
pub use seeding::{HEADS_PER_TRIO, MAX_SEEDED_TRIOS, SEED_TIER_ORDER, seed_champions};
pub use strategy::{
    AgeBoundedDraw, DEFAULT_MAX_TRIO_AGE, DrawMode, DrawStrategy, FullDraw, OpenDraw, PartialDraw,
};
