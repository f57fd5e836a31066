//! # Team Penning
//!
//! Trio draws, run scoring and rankings for team penning events.
//!
//! Competitors enter categories, get grouped into trios of three (by hand,
//! by random draw or by champion seeding) and each trio performs timed runs
//! ("passadas") against the clock. Every run is scored and placed against
//! the other runs with the same number in its category, and the event
//! standings are folded from those runs.
//!
//! ## Core Modules
//!
//! - [`roster`]: competitors, categories and eligibility rules
//! - [`trio`]: manual trio formation, deletion and renumbering
//! - [`draw`]: draw strategies, multi-round quota draws and seeding
//! - [`passada`]: run lifecycle, scoring, placement and validation
//! - [`ranking`]: standings, time analysis and CONTEP scoring
//! - [`db`]: repository traits with PostgreSQL and in-memory stores
//!
//! ## Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use team_penning::passada::points_for;
//! use team_penning::ranking::placement_points;
//!
//! // 45 seconds on a 60 second limit
//! assert_eq!(points_for(Decimal::from(45), Decimal::from(60)), Decimal::new(625, 1));
//! assert_eq!(placement_points(1), 10);
//! ```

/// Persistence layer: pooling, repositories and stores.
pub mod db;

/// Trio draws and champion seeding.
pub mod draw;
pub use draw::{DrawEngine, DrawError, DrawManager, DrawSettings};

/// Run lifecycle and scoring.
pub mod passada;
pub use passada::{Passada, PassadaError, PassadaManager, PassadaStatus};

/// Standings and reports.
pub mod ranking;
pub use ranking::{RankingAggregator, RankingManager};

/// Competitors, categories and eligibility.
pub mod roster;
pub use roster::{Category, CategoryKind, Competitor, EligibilityRules};

/// Trio formation and lifecycle.
pub mod trio;
pub use trio::{Trio, TrioError, TrioManager};
