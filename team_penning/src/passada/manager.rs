//! Passada manager: run creation, lifecycle transitions and placement upkeep.

use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::{
    errors::{PassadaError, PassadaResult},
    models::{
        NewPassada, Passada, PassadaConfig, PassadaId, default_time_limit, kind_run_defaults,
    },
    state_machine::{TimeEntry, TransitionReport},
    validation::{RunCheck, RunCheckInput, check_run, pick_animal},
};
use crate::db::{CompetitorRepository, PassadaRepository, StoreError, TrioRepository};
use crate::roster::CategoryId;
use crate::trio::{EventId, Trio, TrioId};

/// Request for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassadaRequest {
    pub trio_id: TrioId,
    pub run_number: u32,
    pub animal_number: Option<u32>,
    /// Falls back to the configured default, then 60 seconds
    pub time_limit: Option<Decimal>,
}

/// Request for several runs of one trio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub trio_id: TrioId,
    pub count: u32,
    /// Continue after the trio's highest run number instead of starting at 1
    pub auto_number: bool,
    pub time_limit: Option<Decimal>,
    /// Animals for the new runs, in order; missing entries stay unassigned
    pub animals: Vec<u32>,
}

/// Passada manager
pub struct PassadaManager<S> {
    store: Arc<S>,
    rng: Mutex<StdRng>,
}

impl<S> PassadaManager<S>
where
    S: CompetitorRepository + TrioRepository + PassadaRepository,
{
    /// Create a new passada manager
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a manager with reproducible animal picks
    pub fn with_seed(store: Arc<S>, seed: u64) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Store the run configuration of an event and category
    pub async fn create_config(&self, config: PassadaConfig) -> PassadaResult<PassadaConfig> {
        match self.store.insert_config(&config).await {
            Ok(()) => {
                log::info!(
                    "Run configuration stored for event {} category {}",
                    config.event_id,
                    config.category_id
                );
                Ok(config)
            }
            Err(e) if e.is_conflict() => Err(PassadaError::DuplicateConfig {
                event_id: config.event_id,
                category_id: config.category_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Run configuration of an event and category
    pub async fn config(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> PassadaResult<Option<PassadaConfig>> {
        Ok(self.store.find_config(event_id, category_id).await?)
    }

    async fn trio(&self, trio_id: TrioId) -> PassadaResult<Trio> {
        self.store
            .find_trio(trio_id)
            .await?
            .ok_or(PassadaError::TrioNotFound(trio_id))
    }

    /// Create one pending run for a trio.
    ///
    /// Rejects a run number the trio already uses, and one above the
    /// configured maximum per trio.
    pub async fn create_passada(&self, request: PassadaRequest) -> PassadaResult<Passada> {
        let trio = self.trio(request.trio_id).await?;
        let config = self.store.find_config(trio.event_id, trio.category_id).await?;
        let existing = self.store.passadas_for_trio(trio.id).await?;

        if existing.iter().any(|p| p.run_number == request.run_number) {
            return Err(PassadaError::DuplicateRunNumber {
                trio_id: trio.id,
                run_number: request.run_number,
            });
        }
        if let Some(config) = &config
            && request.run_number > config.max_passadas_per_trio
        {
            return Err(PassadaError::ExceedsMaxPassadas {
                run_number: request.run_number,
                max: config.max_passadas_per_trio,
            });
        }

        let run = NewPassada {
            trio_id: trio.id,
            event_id: trio.event_id,
            category_id: trio.category_id,
            run_number: request.run_number,
            animal_number: request.animal_number,
            time_limit: resolve_time_limit(request.time_limit, config.as_ref()),
        };
        let mut created = self.insert(trio.id, &[run]).await?;
        created.pop().ok_or_else(|| {
            StoreError::Integrity(format!("no run stored for trio {}", trio.id)).into()
        })
    }

    /// Create several pending runs for a trio in one unit
    pub async fn create_batch(&self, request: BatchRequest) -> PassadaResult<Vec<Passada>> {
        let trio = self.trio(request.trio_id).await?;
        let config = self.store.find_config(trio.event_id, trio.category_id).await?;
        let existing = self.store.passadas_for_trio(trio.id).await?;

        // Without a configuration the category kind bounds the batch.
        let max = match &config {
            Some(config) => config.max_passadas_per_trio,
            None => {
                let category = self
                    .store
                    .find_category(trio.category_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Integrity(format!(
                            "trio {} references missing category {}",
                            trio.id, trio.category_id
                        ))
                    })?;
                kind_run_defaults(category.kind).0
            }
        };
        if request.count > max {
            return Err(PassadaError::BatchTooLarge {
                requested: request.count,
                max,
            });
        }

        let last = if request.auto_number {
            existing.iter().map(|p| p.run_number).max().unwrap_or(0)
        } else {
            0
        };
        if last.checked_add(request.count).is_none() {
            return Err(PassadaError::BatchTooLarge {
                requested: request.count,
                max: u32::MAX - last,
            });
        }
        let time_limit = resolve_time_limit(request.time_limit, config.as_ref());

        let mut runs = Vec::new();
        for (offset, run_number) in (1..=request.count).map(|i| last + i).enumerate() {
            if existing.iter().any(|p| p.run_number == run_number) {
                return Err(PassadaError::DuplicateRunNumber {
                    trio_id: trio.id,
                    run_number,
                });
            }
            if let Some(config) = &config
                && run_number > config.max_passadas_per_trio
            {
                return Err(PassadaError::ExceedsMaxPassadas {
                    run_number,
                    max: config.max_passadas_per_trio,
                });
            }
            runs.push(NewPassada {
                trio_id: trio.id,
                event_id: trio.event_id,
                category_id: trio.category_id,
                run_number,
                animal_number: request.animals.get(offset).copied(),
                time_limit,
            });
        }

        let created = self.insert(trio.id, &runs).await?;
        log::info!("Created {} runs for trio {}", created.len(), trio.id);
        Ok(created)
    }

    async fn insert(&self, trio_id: TrioId, runs: &[NewPassada]) -> PassadaResult<Vec<Passada>> {
        match self.store.insert_passadas(runs).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_conflict() => Err(PassadaError::DuplicateRunNumber {
                trio_id,
                run_number: runs.first().map_or(0, |r| r.run_number),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a realized time, re-rank the comparison group and count the
    /// run for each trio member.
    pub async fn record_time(
        &self,
        passada_id: PassadaId,
        entry: TimeEntry,
    ) -> PassadaResult<TransitionReport> {
        let now = Utc::now();
        let report = self
            .store
            .transition(passada_id, move |group| group.record_time(entry, now))
            .await?;

        log::info!(
            "Passada {} recorded: {} ({} points, placement {:?})",
            passada_id,
            report.passada.status,
            report.passada.points,
            report.passada.placement
        );
        for competitor in &report.newly_blocked {
            log::warn!(
                "Competitor {} reached the run limit in event {}",
                competitor,
                report.passada.event_id
            );
        }
        Ok(report)
    }

    /// Void a run
    pub async fn apply_sat(
        &self,
        passada_id: PassadaId,
        reason: impl Into<String>,
        applied_by: Option<String>,
    ) -> PassadaResult<TransitionReport> {
        let reason = reason.into();
        let now = Utc::now();
        let logged = reason.clone();
        let report = self
            .store
            .transition(passada_id, move |group| {
                group.apply_sat(reason, applied_by, now)
            })
            .await?;

        log::info!("SAT applied to passada {passada_id}: {logged}");
        Ok(report)
    }

    /// Lift a SAT, returning the run to pending
    pub async fn remove_sat(&self, passada_id: PassadaId) -> PassadaResult<TransitionReport> {
        let now = Utc::now();
        let report = self
            .store
            .transition(passada_id, move |group| group.remove_sat(now))
            .await?;

        log::info!("SAT removed from passada {passada_id}");
        Ok(report)
    }

    /// Disqualify an executed or timed-out run
    pub async fn disqualify(
        &self,
        passada_id: PassadaId,
        notes: Option<String>,
    ) -> PassadaResult<TransitionReport> {
        let now = Utc::now();
        let report = self
            .store
            .transition(passada_id, move |group| group.disqualify(notes, now))
            .await?;

        log::info!("Passada {passada_id} disqualified");
        Ok(report)
    }

    /// Check whether a trio may run now with the given number and animal
    pub async fn validate_run(
        &self,
        trio_id: TrioId,
        run_number: u32,
        animal_number: Option<u32>,
    ) -> PassadaResult<RunCheck> {
        let trio = self.trio(trio_id).await?;
        let config = self.store.find_config(trio.event_id, trio.category_id).await?;
        let trio_runs = self.store.passadas_for_trio(trio.id).await?;
        let event_runs = self.store.passadas_for_event(trio.event_id, None).await?;
        let controls = self
            .store
            .participation(trio.event_id, trio.category_id, &trio.member_ids())
            .await?;

        let check = check_run(RunCheckInput {
            trio: &trio,
            run_number,
            animal_number,
            trio_runs: &trio_runs,
            event_runs: &event_runs,
            controls: &controls,
            config: config.as_ref(),
            now: Utc::now(),
        });
        if !check.valid {
            log::debug!("Run {run_number} of trio {trio_id} rejected: {:?}", check.messages);
        }
        Ok(check)
    }

    /// Pick an animal from the configured pool for a trio's next run
    pub async fn assign_animal(&self, trio_id: TrioId) -> PassadaResult<u32> {
        let trio = self.trio(trio_id).await?;
        let config = self.store.find_config(trio.event_id, trio.category_id).await?;
        let trio_runs = self.store.passadas_for_trio(trio.id).await?;

        let pool = config.map(|c| c.animal_pool).unwrap_or_default();
        let picked = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            pick_animal(&pool, &trio_runs, &mut *rng)
        };
        picked.ok_or(PassadaError::EmptyAnimalPool {
            event_id: trio.event_id,
            category_id: trio.category_id,
        })
    }

    /// Re-rank every comparison group of an event. Returns how many runs
    /// changed placement.
    pub async fn recalculate_placements(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> PassadaResult<usize> {
        let changed = self.store.rerank_event(event_id, category_id).await?;
        log::info!("Recalculated placements for event {event_id}: {changed} runs changed");
        Ok(changed)
    }

    /// Runs of an event, optionally restricted to one category
    pub async fn event_passadas(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> PassadaResult<Vec<Passada>> {
        Ok(self.store.passadas_for_event(event_id, category_id).await?)
    }
}

fn resolve_time_limit(requested: Option<Decimal>, config: Option<&PassadaConfig>) -> Decimal {
    requested
        .or_else(|| config.map(|c| c.default_time_limit))
        .unwrap_or_else(default_time_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_limit_resolution() {
        let mut config = PassadaConfig::new(1, 1);
        config.default_time_limit = Decimal::from(45);

        assert_eq!(
            resolve_time_limit(Some(Decimal::from(30)), Some(&config)),
            Decimal::from(30)
        );
        assert_eq!(resolve_time_limit(None, Some(&config)), Decimal::from(45));
        assert_eq!(resolve_time_limit(None, None), Decimal::from(60));
    }
}
