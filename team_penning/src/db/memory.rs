//! In-memory store.
//!
//! All state sits behind one `tokio::sync::Mutex`, so every repository call
//! is serialized and atomic.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::repository::{CompetitorRepository, PassadaRepository, TrioRepository};
use crate::passada::{
    ComparisonGroup, DEFAULT_MAX_RUNS_PER_COMPETITOR, GroupChange, NewPassada, ParticipationControl,
    Passada, PassadaConfig, PassadaError, PassadaId, PassadaResult, PassadaStatus,
    TransitionReport, rerank_all,
};
use crate::roster::{Category, CategoryId, Competitor, CompetitorId};
use crate::trio::{
    EventId, NewTrio, Renumbering, RunTemplate, Trio, TrioId, TrioRemoval, TrioStatus,
};

type ControlKey = (CompetitorId, EventId, CategoryId);

#[derive(Debug, Default)]
struct State {
    competitors: BTreeMap<CompetitorId, Competitor>,
    categories: BTreeMap<CategoryId, Category>,
    trios: BTreeMap<TrioId, Trio>,
    passadas: BTreeMap<PassadaId, Passada>,
    configs: HashMap<(EventId, CategoryId), PassadaConfig>,
    controls: HashMap<ControlKey, ParticipationControl>,
    next_trio_id: TrioId,
    next_passada_id: PassadaId,
}

impl State {
    fn next_number(&self, event_id: EventId, category_id: CategoryId) -> u32 {
        self.trios
            .values()
            .filter(|t| t.event_id == event_id && t.category_id == category_id)
            .map(|t| t.number)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn number_taken(&self, event_id: EventId, category_id: CategoryId, number: u32) -> bool {
        self.trios
            .values()
            .any(|t| t.event_id == event_id && t.category_id == category_id && t.number == number)
    }

    fn run_taken(&self, trio_id: TrioId, run_number: u32) -> bool {
        self.passadas
            .values()
            .any(|p| p.trio_id == trio_id && p.run_number == run_number)
    }

    fn push_passada(&mut self, new: &NewPassada) -> Passada {
        self.next_passada_id += 1;
        let passada = Passada {
            id: self.next_passada_id,
            trio_id: new.trio_id,
            event_id: new.event_id,
            category_id: new.category_id,
            run_number: new.run_number,
            animal_number: new.animal_number,
            time: None,
            time_limit: new.time_limit,
            status: PassadaStatus::Pending,
            points: Decimal::ZERO,
            placement: None,
            sat: None,
            ran_at: None,
            notes: None,
            updated_at: Utc::now(),
        };
        self.passadas.insert(passada.id, passada.clone());
        passada
    }
}

/// Store keeping every row in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a competitor
    pub async fn put_competitor(&self, competitor: Competitor) {
        let mut state = self.state.lock().await;
        state.competitors.insert(competitor.id, competitor);
    }

    /// Register or replace a category
    pub async fn put_category(&self, category: Category) {
        let mut state = self.state.lock().await;
        state.categories.insert(category.id, category);
    }

    /// Register or replace a participation row
    pub async fn put_participation(&self, control: ParticipationControl) {
        let mut state = self.state.lock().await;
        let key = (control.competitor_id, control.event_id, control.category_id);
        state.controls.insert(key, control);
    }

    /// Change a trio's status
    pub async fn set_trio_status(&self, trio_id: TrioId, status: TrioStatus) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let trio = state
            .trios
            .get_mut(&trio_id)
            .ok_or(StoreError::NotFound {
                entity: "Trio",
                id: trio_id,
            })?;
        trio.status = status;
        Ok(())
    }
}

#[async_trait]
impl CompetitorRepository for InMemoryStore {
    async fn find_competitors(&self, ids: &[CompetitorId]) -> StoreResult<Vec<Competitor>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.competitors.get(id).cloned())
            .collect())
    }

    async fn find_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let state = self.state.lock().await;
        Ok(state.categories.get(&id).cloned())
    }
}

#[async_trait]
impl TrioRepository for InMemoryStore {
    async fn insert_trios(
        &self,
        trios: &[NewTrio],
        runs: Option<RunTemplate>,
    ) -> StoreResult<Vec<Trio>> {
        let mut state = self.state.lock().await;

        // Validate the whole batch before touching state.
        let mut planned: Vec<u32> = Vec::with_capacity(trios.len());
        let mut taken: HashMap<(EventId, CategoryId), Vec<u32>> = HashMap::new();
        for new in trios {
            let key = (new.event_id, new.category_id);
            let batch = taken.entry(key).or_default();
            let number = match new.number {
                Some(n) => n,
                None => state
                    .next_number(new.event_id, new.category_id)
                    .max(batch.iter().max().map_or(0, |m| m + 1)),
            };
            if state.number_taken(new.event_id, new.category_id, number) || batch.contains(&number)
            {
                return Err(StoreError::Conflict(format!(
                    "trio number {number} already exists in event {} category {}",
                    new.event_id, new.category_id
                )));
            }
            batch.push(number);
            planned.push(number);
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(trios.len());
        for (new, number) in trios.iter().zip(planned) {
            state.next_trio_id += 1;
            let trio = Trio {
                id: state.next_trio_id,
                event_id: new.event_id,
                category_id: new.category_id,
                number,
                members: new.members,
                handicap_total: new.handicap_total,
                age_total: new.age_total,
                status: TrioStatus::Active,
                manual: new.manual,
                head_of_bracket: new.head_of_bracket,
                cup_type: new.cup_type,
                created_at: now,
            };
            state.trios.insert(trio.id, trio.clone());

            if let Some(template) = runs {
                for run_number in 1..=template.count {
                    state.push_passada(&NewPassada {
                        trio_id: trio.id,
                        event_id: trio.event_id,
                        category_id: trio.category_id,
                        run_number,
                        animal_number: None,
                        time_limit: template.time_limit,
                    });
                }
            }
            created.push(trio);
        }

        Ok(created)
    }

    async fn find_trio(&self, id: TrioId) -> StoreResult<Option<Trio>> {
        let state = self.state.lock().await;
        Ok(state.trios.get(&id).cloned())
    }

    async fn trios_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Trio>> {
        let state = self.state.lock().await;
        let mut trios: Vec<Trio> = state
            .trios
            .values()
            .filter(|t| t.event_id == event_id)
            .filter(|t| category_id.is_none_or(|c| t.category_id == c))
            .cloned()
            .collect();
        trios.sort_by_key(|t| (t.category_id, t.number, t.id));
        Ok(trios)
    }

    async fn delete_trio(&self, id: TrioId) -> StoreResult<TrioRemoval> {
        let mut state = self.state.lock().await;
        if !state.trios.contains_key(&id) {
            return Err(StoreError::NotFound {
                entity: "Trio",
                id,
            });
        }
        if state
            .passadas
            .values()
            .any(|p| p.trio_id == id && p.has_result())
        {
            return Ok(TrioRemoval::HasResults);
        }

        state.trios.remove(&id);
        state.passadas.retain(|_, p| p.trio_id != id);
        Ok(TrioRemoval::Deleted)
    }

    async fn renumber_trios(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Renumbering> {
        let mut state = self.state.lock().await;
        let mut ordered: Vec<(u32, TrioId)> = state
            .trios
            .values()
            .filter(|t| t.event_id == event_id && t.category_id == category_id)
            .map(|t| (t.number, t.id))
            .collect();
        ordered.sort();

        let mut changes = Vec::new();
        for (index, (old, id)) in ordered.into_iter().enumerate() {
            let new = index as u32 + 1;
            if old != new
                && let Some(trio) = state.trios.get_mut(&id)
            {
                trio.number = new;
                changes.push((id, old, new));
            }
        }
        Ok(Renumbering { changes })
    }
}

#[async_trait]
impl PassadaRepository for InMemoryStore {
    async fn insert_passadas(&self, runs: &[NewPassada]) -> StoreResult<Vec<Passada>> {
        let mut state = self.state.lock().await;

        for (i, run) in runs.iter().enumerate() {
            if !state.trios.contains_key(&run.trio_id) {
                return Err(StoreError::NotFound {
                    entity: "Trio",
                    id: run.trio_id,
                });
            }
            let repeated_in_batch = runs[..i]
                .iter()
                .any(|r| r.trio_id == run.trio_id && r.run_number == run.run_number);
            if repeated_in_batch || state.run_taken(run.trio_id, run.run_number) {
                return Err(StoreError::Conflict(format!(
                    "run number {} already exists for trio {}",
                    run.run_number, run.trio_id
                )));
            }
        }

        Ok(runs.iter().map(|run| state.push_passada(run)).collect())
    }

    async fn find_passada(&self, id: PassadaId) -> StoreResult<Option<Passada>> {
        let state = self.state.lock().await;
        Ok(state.passadas.get(&id).cloned())
    }

    async fn passadas_for_trio(&self, trio_id: TrioId) -> StoreResult<Vec<Passada>> {
        let state = self.state.lock().await;
        let mut runs: Vec<Passada> = state
            .passadas
            .values()
            .filter(|p| p.trio_id == trio_id)
            .cloned()
            .collect();
        runs.sort_by_key(|p| p.run_number);
        Ok(runs)
    }

    async fn passadas_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Passada>> {
        let state = self.state.lock().await;
        Ok(state
            .passadas
            .values()
            .filter(|p| p.event_id == event_id)
            .filter(|p| category_id.is_none_or(|c| p.category_id == c))
            .cloned()
            .collect())
    }

    async fn transition<F>(&self, passada_id: PassadaId, apply: F) -> PassadaResult<TransitionReport>
    where
        F: FnOnce(&mut ComparisonGroup) -> PassadaResult<GroupChange> + Send,
    {
        let mut state = self.state.lock().await;

        let target = state
            .passadas
            .get(&passada_id)
            .cloned()
            .ok_or(PassadaError::PassadaNotFound(passada_id))?;
        let trio = state.trios.get(&target.trio_id).cloned().ok_or_else(|| {
            StoreError::Integrity(format!(
                "passada {} references missing trio {}",
                target.id, target.trio_id
            ))
        })?;
        let key = target.key();
        let peers: Vec<Passada> = state
            .passadas
            .values()
            .filter(|p| p.key() == key && p.id != passada_id)
            .cloned()
            .collect();

        let mut group = ComparisonGroup::new(target, peers);
        let change = apply(&mut group)?;

        // Nothing is written until every member still has a run left.
        if change.counts_run
            && let Some(blocked) = trio.member_ids().into_iter().find(|member| {
                state
                    .controls
                    .get(&(*member, trio.event_id, trio.category_id))
                    .is_some_and(|c| !c.is_available())
            })
        {
            return Err(PassadaError::ParticipantBlocked {
                competitor_id: blocked,
            });
        }

        for run in group.runs() {
            state.passadas.insert(run.id, run.clone());
        }

        let mut newly_blocked = Vec::new();
        if change.counts_run {
            let max = state
                .configs
                .get(&(trio.event_id, trio.category_id))
                .map_or(DEFAULT_MAX_RUNS_PER_COMPETITOR, |c| c.max_runs_per_competitor);
            let now = group.target.ran_at.unwrap_or_else(Utc::now);
            for member in trio.member_ids() {
                let control = state
                    .controls
                    .entry((member, trio.event_id, trio.category_id))
                    .or_insert_with(|| {
                        ParticipationControl::new(member, trio.event_id, trio.category_id, max)
                    });
                if control.record_run(now) {
                    newly_blocked.push(member);
                }
            }
        }

        Ok(TransitionReport {
            passada: group.target,
            peers: group.peers,
            change,
            newly_blocked,
        })
    }

    async fn rerank_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        let mut runs: Vec<Passada> = state
            .passadas
            .values()
            .filter(|p| p.event_id == event_id)
            .filter(|p| category_id.is_none_or(|c| p.category_id == c))
            .cloned()
            .collect();

        let changed = rerank_all(&mut runs);
        let now = Utc::now();
        for mut run in runs.into_iter().filter(|p| changed.contains(&p.id)) {
            run.updated_at = now;
            state.passadas.insert(run.id, run);
        }
        Ok(changed.len())
    }

    async fn find_config(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Option<PassadaConfig>> {
        let state = self.state.lock().await;
        Ok(state.configs.get(&(event_id, category_id)).cloned())
    }

    async fn insert_config(&self, config: &PassadaConfig) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let key = (config.event_id, config.category_id);
        if state.configs.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "run configuration for event {} category {}",
                config.event_id, config.category_id
            )));
        }
        state.configs.insert(key, config.clone());
        Ok(())
    }

    async fn participation(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
    ) -> StoreResult<Vec<ParticipationControl>> {
        let state = self.state.lock().await;
        Ok(competitor_ids
            .iter()
            .filter_map(|id| state.controls.get(&(*id, event_id, category_id)).cloned())
            .collect())
    }
}
