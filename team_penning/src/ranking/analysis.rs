//! Time distribution and SAT reports for an event.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::passada::Passada;

/// Key used for SATs applied without a named official
pub const UNKNOWN_APPLIER: &str = "unknown";

/// Counts of realized times per band, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDistribution {
    /// Up to 45
    pub fast: u32,
    /// Above 45, up to 60
    pub regular: u32,
    /// Above 60, up to 75
    pub slow: u32,
    /// Above 75
    pub very_slow: u32,
}

impl TimeDistribution {
    fn add(&mut self, time: Decimal) {
        let bucket = if time <= Decimal::from(45) {
            &mut self.fast
        } else if time <= Decimal::from(60) {
            &mut self.regular
        } else if time <= Decimal::from(75) {
            &mut self.slow
        } else {
            &mut self.very_slow
        };
        *bucket += 1;
    }
}

/// Summary of executed times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAnalysis {
    pub count: usize,
    pub mean: Decimal,
    pub median: Decimal,
    pub best: Decimal,
    pub worst: Decimal,
    pub q1: Decimal,
    pub q3: Decimal,
    pub distribution: TimeDistribution,
}

impl TimeAnalysis {
    /// Analyse the executed, non-voided times among `runs`. `None` when
    /// there are none.
    pub fn of<'a>(runs: impl IntoIterator<Item = &'a Passada>) -> Option<Self> {
        let mut times: Vec<Decimal> = runs
            .into_iter()
            .filter(|r| r.is_ranked())
            .filter_map(|r| r.time)
            .collect();
        Self::of_times(&mut times)
    }

    /// Analyse raw times. Quartiles and median take the element at the
    /// quarter, half and three-quarter index of the sorted times.
    pub fn of_times(times: &mut [Decimal]) -> Option<Self> {
        if times.is_empty() {
            return None;
        }
        times.sort();

        let n = times.len();
        let sum: Decimal = times.iter().sum();
        let mut distribution = TimeDistribution::default();
        for time in times.iter() {
            distribution.add(*time);
        }

        Some(Self {
            count: n,
            mean: (sum / Decimal::from(n)).round_dp(2),
            median: times[n / 2],
            best: times[0],
            worst: times[n - 1],
            q1: times[n / 4],
            q3: times[3 * n / 4],
            distribution,
        })
    }
}

/// Voided runs grouped by reason and by official
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatSummary {
    pub total: u32,
    pub by_reason: BTreeMap<String, u32>,
    pub by_applier: BTreeMap<String, u32>,
}

impl SatSummary {
    pub fn of<'a>(runs: impl IntoIterator<Item = &'a Passada>) -> Self {
        let mut summary = Self::default();
        let records = runs
            .into_iter()
            .filter(|r| r.is_sat())
            .filter_map(|r| r.sat.as_ref());
        for record in records {
            summary.total += 1;
            *summary.by_reason.entry(record.reason.clone()).or_default() += 1;
            let applier = record.applied_by.as_deref().unwrap_or(UNKNOWN_APPLIER);
            *summary.by_applier.entry(applier.to_string()).or_default() += 1;
        }
        summary
    }
}
