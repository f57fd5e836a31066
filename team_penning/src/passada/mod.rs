//! Passada (run) lifecycle, scoring and placement.
//!
//! Points come from the realized time against the run's limit. Placement
//! ranks a run among every executed, non-voided run with the same event,
//! category and run number. Each transition re-ranks that whole group from
//! the latest stored state.
//!
//! ```
//! use rust_decimal::Decimal;
//! use team_penning::passada::points_for;
//!
//! let limit = Decimal::from(60);
//! assert_eq!(points_for(Decimal::from(45), limit), Decimal::new(625, 1));
//! assert_eq!(points_for(Decimal::from(61), limit), Decimal::new(2500, 2));
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod scoring;
pub mod state_machine;
pub mod validation;

pub use errors::{PassadaError, PassadaResult};
pub use manager::{BatchRequest, PassadaManager, PassadaRequest};
pub use models::{
    ComparisonKey, DEFAULT_MAX_RUNS_PER_COMPETITOR, NewPassada, ParticipationControl, Passada,
    PassadaConfig, PassadaId, PassadaStatus, SatRecord, default_time_limit, kind_run_defaults,
};
pub use scoring::{over_limit_points, placement_among, points_for, rerank, rerank_all};
pub use state_machine::{ComparisonGroup, GroupChange, TimeEntry, TransitionReport};
pub use validation::{BlockedCompetitor, RunCheck, RunCheckInput, check_run, pick_animal};
