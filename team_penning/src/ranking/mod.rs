//! Standings, time analysis and circuit scoring.
//!
//! Everything here is recomputed from runs on each call; nothing is
//! cached. Voided (SAT) runs never count toward a standing.

pub mod aggregator;
pub mod analysis;
pub mod contep;
pub mod manager;

pub use aggregator::{
    CompetitorStanding, Medals, RankingAggregator, RunStats, StandingStatus, TrioStanding,
    consistency,
};
pub use analysis::{SatSummary, TimeAnalysis, TimeDistribution};
pub use contep::{
    ContepScore, PrizeSplit, default_discount, placement_points, prize_points, score_standings,
};
pub use manager::RankingManager;
