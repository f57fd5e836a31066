//! Passada lifecycle transitions.
//!
//! ```text
//! pending ──record_time──▶ executed | no_time ──disqualify──▶ disqualified
//!    ▲                                   │
//!    └────────remove_sat──── sat ◀──apply_sat (from any status)
//! ```
//!
//! Every transition operates on a [`ComparisonGroup`]: the target run plus
//! every other run sharing its event, category and run number, loaded from
//! the latest committed state. Each transition finishes with a full re-rank
//! of the group.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    errors::{PassadaError, PassadaResult},
    models::{Passada, PassadaStatus, SatRecord},
    scoring::{placement_among, points_for, rerank},
};

/// A time to record on a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub time: Decimal,
    pub animal_number: Option<u32>,
    pub notes: Option<String>,
}

impl TimeEntry {
    pub fn new(time: Decimal) -> Self {
        Self {
            time,
            animal_number: None,
            notes: None,
        }
    }
}

/// What a transition did to the group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    /// The run left `pending` for the first time and counts toward
    /// every member's participation
    pub counts_run: bool,
    /// Placement the target got from its own comparison before the re-rank
    pub preliminary_placement: Option<u32>,
    /// Runs whose placement changed in the re-rank, target included
    pub placements_changed: usize,
}

/// Persisted result of a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReport {
    pub passada: Passada,
    pub peers: Vec<Passada>,
    pub change: GroupChange,
    /// Members whose participation limit was reached by this run
    pub newly_blocked: Vec<crate::roster::CompetitorId>,
}

/// A run and its comparison peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonGroup {
    pub target: Passada,
    /// Other runs with the same event, category and run number
    pub peers: Vec<Passada>,
}

impl ComparisonGroup {
    pub fn new(target: Passada, peers: Vec<Passada>) -> Self {
        let peers = peers.into_iter().filter(|p| p.id != target.id).collect();
        Self { target, peers }
    }

    /// Record a realized time.
    ///
    /// Sets `executed` when within the limit, `no_time` otherwise.
    pub fn record_time(
        &mut self,
        entry: TimeEntry,
        now: DateTime<Utc>,
    ) -> PassadaResult<GroupChange> {
        let target = &mut self.target;
        match target.status {
            PassadaStatus::Sat => return Err(PassadaError::SatLocked(target.id)),
            PassadaStatus::Disqualified => {
                return Err(PassadaError::InvalidTransition {
                    from: target.status,
                    action: "record time on",
                });
            }
            _ => {}
        }

        let max = target.time_limit * Decimal::TWO;
        if entry.time < Decimal::ZERO || entry.time > max {
            return Err(PassadaError::InvalidTime {
                time: entry.time,
                max,
            });
        }

        // `ran_at` survives SAT and its removal, so a run is counted once.
        let counts_run = target.status == PassadaStatus::Pending && target.ran_at.is_none();

        target.time = Some(entry.time);
        target.ran_at = Some(now);
        target.updated_at = now;
        if entry.animal_number.is_some() {
            target.animal_number = entry.animal_number;
        }
        if entry.notes.is_some() {
            target.notes = entry.notes;
        }
        target.status = if entry.time <= target.time_limit {
            PassadaStatus::Executed
        } else {
            PassadaStatus::NoTime
        };
        target.points = points_for(entry.time, target.time_limit);

        let preliminary_placement = placement_among(&self.target, &self.peers);
        self.target.placement = preliminary_placement;

        Ok(GroupChange {
            counts_run,
            preliminary_placement,
            placements_changed: self.rerank(now),
        })
    }

    /// Void the run. Allowed from any status.
    pub fn apply_sat(
        &mut self,
        reason: impl Into<String>,
        applied_by: Option<String>,
        now: DateTime<Utc>,
    ) -> PassadaResult<GroupChange> {
        let target = &mut self.target;
        target.status = PassadaStatus::Sat;
        target.sat = Some(SatRecord {
            reason: reason.into(),
            applied_by,
            applied_at: now,
        });
        target.time = None;
        target.points = Decimal::ZERO;
        target.placement = None;
        target.updated_at = now;

        Ok(GroupChange {
            placements_changed: self.rerank(now),
            ..GroupChange::default()
        })
    }

    /// Lift a SAT. The run returns to `pending`; the voided time is gone.
    /// `ran_at` is kept, so recording again does not count the run twice.
    pub fn remove_sat(&mut self, now: DateTime<Utc>) -> PassadaResult<GroupChange> {
        let target = &mut self.target;
        if target.status != PassadaStatus::Sat {
            return Err(PassadaError::InvalidTransition {
                from: target.status,
                action: "remove SAT from",
            });
        }

        target.status = PassadaStatus::Pending;
        target.sat = None;
        target.time = None;
        target.points = Decimal::ZERO;
        target.placement = None;
        target.updated_at = now;

        Ok(GroupChange {
            placements_changed: self.rerank(now),
            ..GroupChange::default()
        })
    }

    /// Disqualify an executed or timed-out run. Terminal.
    pub fn disqualify(
        &mut self,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PassadaResult<GroupChange> {
        let target = &mut self.target;
        if !matches!(
            target.status,
            PassadaStatus::Executed | PassadaStatus::NoTime
        ) {
            return Err(PassadaError::InvalidTransition {
                from: target.status,
                action: "disqualify",
            });
        }

        target.status = PassadaStatus::Disqualified;
        target.points = Decimal::ZERO;
        target.placement = None;
        target.updated_at = now;
        if notes.is_some() {
            target.notes = notes;
        }

        Ok(GroupChange {
            placements_changed: self.rerank(now),
            ..GroupChange::default()
        })
    }

    /// Full re-rank of target and peers, in id order.
    fn rerank(&mut self, now: DateTime<Utc>) -> usize {
        let mut all: Vec<Passada> = Vec::with_capacity(self.peers.len() + 1);
        all.push(self.target.clone());
        all.append(&mut self.peers);
        all.sort_by_key(|p| p.id);

        let before: Vec<Option<u32>> = all.iter().map(|p| p.placement).collect();
        let changed = rerank(&mut all);
        for (passada, old) in all.iter_mut().zip(before) {
            if passada.placement != old {
                passada.updated_at = now;
            }
        }

        let target_id = self.target.id;
        for passada in all {
            if passada.id == target_id {
                self.target = passada;
            } else {
                self.peers.push(passada);
            }
        }
        changed
    }

    /// Every run in the group, target first
    pub fn runs(&self) -> impl Iterator<Item = &Passada> {
        std::iter::once(&self.target).chain(self.peers.iter())
    }
}
