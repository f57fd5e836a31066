//! Standings per trio and per competitor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::passada::{Passada, PassadaStatus};
use crate::roster::{CategoryId, CompetitorId};
use crate::trio::{Trio, TrioId};

/// Consistency lost per unit of placement standard deviation
const CONSISTENCY_PENALTY: f64 = 20.0;

/// Where a trio or competitor stands in the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandingStatus {
    /// Runs still pending
    Ativo,
    /// No pending runs left
    Finalizado,
    /// More runs over the limit than within it
    Eliminado,
}

impl std::fmt::Display for StandingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StandingStatus::Ativo => write!(f, "ativo"),
            StandingStatus::Finalizado => write!(f, "finalizado"),
            StandingStatus::Eliminado => write!(f, "eliminado"),
        }
    }
}

/// First, second and third places
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medals {
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

/// Aggregated results over a set of runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_runs: u32,
    pub executed: u32,
    pub no_time: u32,
    pub pending: u32,
    pub disqualified: u32,
    pub best_time: Option<Decimal>,
    pub worst_time: Option<Decimal>,
    pub average_time: Option<Decimal>,
    pub median_time: Option<Decimal>,
    pub total_points: Decimal,
    pub placements: Vec<u32>,
    pub medals: Medals,
    /// 100 for identical placements, lower as they spread
    pub consistency: Option<f64>,
    /// Executed runs over all runs, in percent
    pub success_rate: f64,
    pub status: StandingStatus,
}

impl RunStats {
    /// Fold runs into stats. Callers filter out voided runs.
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a Passada>) -> Self {
        let mut stats = Self {
            total_runs: 0,
            executed: 0,
            no_time: 0,
            pending: 0,
            disqualified: 0,
            best_time: None,
            worst_time: None,
            average_time: None,
            median_time: None,
            total_points: Decimal::ZERO,
            placements: Vec::new(),
            medals: Medals::default(),
            consistency: None,
            success_rate: 0.0,
            status: StandingStatus::Ativo,
        };
        let mut times = Vec::new();

        for run in runs {
            stats.total_runs += 1;
            stats.total_points += run.points;
            match run.status {
                PassadaStatus::Executed => stats.executed += 1,
                PassadaStatus::NoTime => stats.no_time += 1,
                PassadaStatus::Pending => stats.pending += 1,
                PassadaStatus::Disqualified => stats.disqualified += 1,
                PassadaStatus::Sat => {}
            }
            if run.is_ranked()
                && let Some(time) = run.time
            {
                times.push(time);
            }
            if let Some(placement) = run.placement {
                stats.placements.push(placement);
                match placement {
                    1 => stats.medals.gold += 1,
                    2 => stats.medals.silver += 1,
                    3 => stats.medals.bronze += 1,
                    _ => {}
                }
            }
        }

        times.sort();
        if !times.is_empty() {
            let sum: Decimal = times.iter().sum();
            stats.best_time = times.first().copied();
            stats.worst_time = times.last().copied();
            stats.average_time = Some((sum / Decimal::from(times.len())).round_dp(2));
            stats.median_time = Some(times[times.len() / 2]);
        }

        stats.consistency = consistency(&stats.placements);
        if stats.total_runs > 0 {
            stats.success_rate = f64::from(stats.executed) / f64::from(stats.total_runs) * 100.0;
        }
        stats.status = if stats.no_time > stats.executed {
            StandingStatus::Eliminado
        } else if stats.pending == 0 && stats.total_runs > 0 {
            StandingStatus::Finalizado
        } else {
            StandingStatus::Ativo
        };
        stats
    }
}

/// `max(0, 100 - stdev * 20)` over placements, with the population stdev
pub fn consistency(placements: &[u32]) -> Option<f64> {
    if placements.is_empty() {
        return None;
    }
    let n = placements.len() as f64;
    let mean = placements.iter().map(|p| f64::from(*p)).sum::<f64>() / n;
    let variance = placements
        .iter()
        .map(|p| (f64::from(*p) - mean).powi(2))
        .sum::<f64>()
        / n;
    Some((100.0 - variance.sqrt() * CONSISTENCY_PENALTY).max(0.0))
}

/// A trio's place in the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrioStanding {
    pub position: u32,
    pub trio_id: TrioId,
    pub stats: RunStats,
}

/// A competitor's place in the event, over all of their trios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorStanding {
    pub position: u32,
    pub competitor_id: CompetitorId,
    pub trios: Vec<TrioId>,
    pub stats: RunStats,
}

/// Points descending, then best time ascending with no time last
fn by_standing(a: &RunStats, b: &RunStats) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| match (a.best_time, b.best_time) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Builds standings from an event's runs
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingAggregator {
    category_id: Option<CategoryId>,
}

impl RankingAggregator {
    /// Aggregate across every category
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate only one category
    pub fn for_category(category_id: CategoryId) -> Self {
        Self {
            category_id: Some(category_id),
        }
    }

    fn counts(&self, run: &Passada) -> bool {
        !run.is_sat() && self.category_id.is_none_or(|c| run.category_id == c)
    }

    /// Runs the aggregator looks at
    pub fn included<'a>(&self, runs: &'a [Passada]) -> impl Iterator<Item = &'a Passada> {
        let this = *self;
        runs.iter().filter(move |r| this.counts(r))
    }

    /// Standings of every trio with a counted run
    pub fn trios(&self, runs: &[Passada]) -> Vec<TrioStanding> {
        let mut by_trio: BTreeMap<TrioId, Vec<&Passada>> = BTreeMap::new();
        for run in self.included(runs) {
            by_trio.entry(run.trio_id).or_default().push(run);
        }

        let mut standings: Vec<TrioStanding> = by_trio
            .into_iter()
            .map(|(trio_id, runs)| TrioStanding {
                position: 0,
                trio_id,
                stats: RunStats::from_runs(runs),
            })
            .collect();

        standings.sort_by(|a, b| by_standing(&a.stats, &b.stats).then(a.trio_id.cmp(&b.trio_id)));
        for (i, standing) in standings.iter_mut().enumerate() {
            standing.position = i as u32 + 1;
        }
        standings
    }

    /// Standings of every member of the given trios
    pub fn competitors(&self, runs: &[Passada], trios: &[Trio]) -> Vec<CompetitorStanding> {
        let mut members: BTreeMap<CompetitorId, Vec<TrioId>> = BTreeMap::new();
        for trio in trios
            .iter()
            .filter(|t| self.category_id.is_none_or(|c| t.category_id == c))
        {
            for id in trio.member_ids() {
                members.entry(id).or_default().push(trio.id);
            }
        }

        let mut standings: Vec<CompetitorStanding> = members
            .into_iter()
            .map(|(competitor_id, trio_ids)| {
                let own = self
                    .included(runs)
                    .filter(|r| trio_ids.contains(&r.trio_id));
                let stats = RunStats::from_runs(own);
                CompetitorStanding {
                    position: 0,
                    competitor_id,
                    trios: trio_ids,
                    stats,
                }
            })
            .collect();

        standings.sort_by(|a, b| {
            by_standing(&a.stats, &b.stats).then(a.competitor_id.cmp(&b.competitor_id))
        });
        for (i, standing) in standings.iter_mut().enumerate() {
            standing.position = i as u32 + 1;
        }
        standings
    }
}
