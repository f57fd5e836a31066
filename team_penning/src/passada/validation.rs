//! Pre-run checks and animal assignment.

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::models::{ParticipationControl, Passada, PassadaConfig, PassadaStatus};
use crate::roster::CompetitorId;
use crate::trio::{Trio, TrioStatus};

/// A trio member who cannot run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCompetitor {
    pub competitor_id: CompetitorId,
    pub reason: String,
}

/// Structured answer to "may this trio run now?"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCheck {
    pub valid: bool,
    pub trio_can_compete: bool,
    pub blocked: Vec<BlockedCompetitor>,
    pub animal_available: bool,
    pub interval_respected: bool,
    /// Problems that prevent the run
    pub messages: Vec<String>,
    /// Soft constraints the caller should display
    pub restrictions: Vec<String>,
}

/// Inputs for [`check_run`]
#[derive(Debug, Clone, Copy)]
pub struct RunCheckInput<'a> {
    pub trio: &'a Trio,
    pub run_number: u32,
    pub animal_number: Option<u32>,
    /// Runs already created for the trio
    pub trio_runs: &'a [Passada],
    /// Runs of the whole event, for animal availability
    pub event_runs: &'a [Passada],
    /// Participation rows of the trio members
    pub controls: &'a [ParticipationControl],
    pub config: Option<&'a PassadaConfig>,
    pub now: DateTime<Utc>,
}

/// Check whether a trio may run with the given number and animal.
pub fn check_run(input: RunCheckInput<'_>) -> RunCheck {
    let mut check = RunCheck {
        trio_can_compete: true,
        animal_available: true,
        interval_respected: true,
        ..RunCheck::default()
    };

    if input.trio.status != TrioStatus::Active {
        check.trio_can_compete = false;
        check
            .messages
            .push(format!("Trio {} is not active ({})", input.trio.number, input.trio.status));
    }

    if input
        .trio_runs
        .iter()
        .any(|p| p.run_number == input.run_number)
    {
        check
            .messages
            .push(format!("Run number {} already exists for this trio", input.run_number));
    }

    if let Some(config) = input.config
        && input.run_number > config.max_passadas_per_trio
    {
        check.messages.push(format!(
            "Run number {} exceeds the maximum of {} runs per trio",
            input.run_number, config.max_passadas_per_trio
        ));
    }

    for member in input.trio.member_ids() {
        let Some(control) = input.controls.iter().find(|c| c.competitor_id == member) else {
            continue;
        };
        if !control.is_available() {
            let reason = control
                .block_reason
                .clone()
                .unwrap_or_else(|| format!("Reached the limit of {} runs", control.max_allowed));
            check.blocked.push(BlockedCompetitor {
                competitor_id: member,
                reason,
            });
        } else if control.remaining() == 1 {
            check
                .restrictions
                .push(format!("Competitor {member} has one run left"));
        }
    }
    if !check.blocked.is_empty() {
        check.trio_can_compete = false;
        check.messages.push(format!(
            "{} member(s) blocked from competing",
            check.blocked.len()
        ));
    }

    if let (Some(animal), Some(config)) = (input.animal_number, input.config) {
        if !config.animal_pool.is_empty() && !config.animal_pool.contains(&animal) {
            check
                .restrictions
                .push(format!("Animal {animal} is not in the configured pool"));
        }
        if !config.allow_repeat_animal && animal_used_in_event(input.event_runs, animal) {
            check.animal_available = false;
            check
                .messages
                .push(format!("Animal {animal} has already run in this event"));
        }
    }

    if let Some(config) = input.config
        && config.min_interval_minutes > 0
        && let Some(last) = input.trio_runs.iter().filter_map(|p| p.ran_at).max()
    {
        let elapsed = input.now.signed_duration_since(last);
        let required = Duration::minutes(i64::from(config.min_interval_minutes));
        if elapsed < required {
            check.interval_respected = false;
            check.messages.push(format!(
                "Minimum interval of {} minutes not met ({} minutes since last run)",
                config.min_interval_minutes,
                elapsed.num_minutes()
            ));
        }
    }

    check.valid = check.messages.is_empty();
    check
}

fn animal_used_in_event(event_runs: &[Passada], animal: u32) -> bool {
    event_runs.iter().any(|p| {
        p.animal_number == Some(animal) && p.status == PassadaStatus::Executed && !p.is_sat()
    })
}

/// Pick an animal for a trio.
///
/// Prefers animals the trio has not run with (ignoring voided runs) and
/// falls back to the whole pool once every animal has been used.
pub fn pick_animal(pool: &[u32], trio_runs: &[Passada], rng: &mut dyn RngCore) -> Option<u32> {
    let used: HashSet<u32> = trio_runs
        .iter()
        .filter(|p| !p.is_sat())
        .filter_map(|p| p.animal_number)
        .collect();
    let fresh: Vec<u32> = pool.iter().copied().filter(|a| !used.contains(a)).collect();

    if fresh.is_empty() {
        pool.choose(rng).copied()
    } else {
        fresh.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trio::member_links;
    use rand::{SeedableRng, rngs::StdRng};
    use rust_decimal::Decimal;

    fn trio() -> Trio {
        Trio {
            id: 1,
            event_id: 1,
            category_id: 1,
            number: 1,
            members: member_links(&[11, 12, 13]).unwrap(),
            handicap_total: 6,
            age_total: 90,
            status: TrioStatus::Active,
            manual: false,
            head_of_bracket: false,
            cup_type: None,
            created_at: Utc::now(),
        }
    }

    fn run(id: i64, number: u32, animal: Option<u32>, status: PassadaStatus) -> Passada {
        Passada {
            id,
            trio_id: 1,
            event_id: 1,
            category_id: 1,
            run_number: number,
            animal_number: animal,
            time: Some(Decimal::from(50)),
            time_limit: Decimal::from(60),
            status,
            points: Decimal::ZERO,
            placement: None,
            sat: None,
            ran_at: Some(Utc::now() - Duration::minutes(5)),
            notes: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_clean_run_is_valid() {
        let trio = trio();
        let config = PassadaConfig {
            max_passadas_per_trio: 3,
            ..PassadaConfig::new(1, 1)
        };
        let check = check_run(RunCheckInput {
            trio: &trio,
            run_number: 1,
            animal_number: Some(4),
            trio_runs: &[],
            event_runs: &[],
            controls: &[],
            config: Some(&config),
            now: Utc::now(),
        });
        assert!(check.valid, "{:?}", check.messages);
    }

    #[test]
    fn test_every_problem_is_reported() {
        let trio = trio();
        let config = PassadaConfig {
            max_passadas_per_trio: 3,
            min_interval_minutes: 30,
            allow_repeat_animal: false,
            ..PassadaConfig::new(1, 1)
        };
        let runs = vec![run(1, 1, Some(4), PassadaStatus::Executed)];
        let mut blocked = ParticipationControl::new(12, 1, 1, 1);
        blocked.record_run(Utc::now());

        let check = check_run(RunCheckInput {
            trio: &trio,
            run_number: 1,
            animal_number: Some(4),
            trio_runs: &runs,
            event_runs: &runs,
            controls: &[blocked],
            config: Some(&config),
            now: Utc::now(),
        });

        assert!(!check.valid);
        assert!(!check.trio_can_compete);
        assert!(!check.animal_available);
        assert!(!check.interval_respected);
        assert_eq!(check.blocked.len(), 1);
        assert_eq!(check.blocked[0].competitor_id, 12);
        assert_eq!(check.messages.len(), 4);
    }

    #[test]
    fn test_pick_animal_prefers_unused() {
        let mut rng = StdRng::seed_from_u64(7);
        let runs = vec![
            run(1, 1, Some(1), PassadaStatus::Executed),
            run(2, 2, Some(2), PassadaStatus::NoTime),
        ];
        for _ in 0..20 {
            assert_eq!(pick_animal(&[1, 2, 3], &runs, &mut rng), Some(3));
        }
    }

    #[test]
    fn test_pick_animal_falls_back_to_whole_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let runs = vec![run(1, 1, Some(1), PassadaStatus::Executed)];
        assert_eq!(pick_animal(&[1], &runs, &mut rng), Some(1));
        assert_eq!(pick_animal(&[], &runs, &mut rng), None);
    }
}
