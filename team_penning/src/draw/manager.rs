//! Draw manager: runs draws and seedings against stored rosters and
//! persists the resulting trios in one unit.

use chrono::NaiveDate;
use rand::{SeedableRng, rngs::StdRng};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{
    engine::DrawEngine,
    errors::{DrawError, DrawResult},
    models::{
        ChampionSeed, DrawOutcome, DrawReport, DrawSettings, ExcludedCompetitor, RoundsReport,
        SeedingReport, TrioIds,
    },
    seeding::{HEADS_PER_TRIO, seed_champions},
};
use crate::db::PenningStore;
use crate::roster::{Category, CategoryId, Competitor, CompetitorId, EligibilityRules, TRIO_SIZE};
use crate::trio::{CupType, EventId, NewTrio, Trio, manager::run_template};

/// Draw manager
pub struct DrawManager<S> {
    store: Arc<S>,
    settings: DrawSettings,
    rng: Mutex<StdRng>,
}

impl<S: PenningStore> DrawManager<S> {
    /// Create a new draw manager with settings from the environment
    pub fn new(store: Arc<S>) -> Self {
        Self::with_settings(store, DrawSettings::from_env())
    }

    pub fn with_settings(store: Arc<S>, settings: DrawSettings) -> Self {
        Self {
            store,
            settings,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a manager whose draws are reproducible
    pub fn with_seed(store: Arc<S>, settings: DrawSettings, seed: u64) -> Self {
        Self {
            store,
            settings,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn settings(&self) -> &DrawSettings {
        &self.settings
    }

    async fn category(&self, category_id: CategoryId) -> DrawResult<Category> {
        self.store
            .find_category(category_id)
            .await?
            .ok_or(DrawError::CategoryNotFound(category_id))
    }

    /// Load competitors once each, in first-seen order
    async fn competitors(&self, ids: &[CompetitorId]) -> DrawResult<Vec<Competitor>> {
        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<CompetitorId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        let found = self.store.find_competitors(&ids).await?;

        ids.iter()
            .map(|id| {
                found
                    .iter()
                    .find(|c| c.id == *id)
                    .cloned()
                    .ok_or(DrawError::CompetitorNotFound(*id))
            })
            .collect()
    }

    /// Split out competitors whose participation control blocks them
    async fn without_blocked(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitors: Vec<Competitor>,
    ) -> DrawResult<(Vec<Competitor>, Vec<ExcludedCompetitor>)> {
        let ids: Vec<CompetitorId> = competitors.iter().map(|c| c.id).collect();
        let controls = self
            .store
            .participation(event_id, category_id, &ids)
            .await?;

        let mut blocked = Vec::new();
        let mut available = Vec::with_capacity(competitors.len());
        for competitor in competitors {
            match controls
                .iter()
                .find(|c| c.competitor_id == competitor.id && !c.is_available())
            {
                Some(control) => blocked.push(ExcludedCompetitor {
                    competitor_id: competitor.id,
                    reasons: vec![control.block_reason.clone().unwrap_or_else(|| {
                        format!("Reached the limit of {} runs", control.max_allowed)
                    })],
                }),
                None => available.push(competitor),
            }
        }
        Ok((available, blocked))
    }

    fn run_engine(&self, engine: &DrawEngine<'_>, pool: &[Competitor]) -> DrawResult<DrawOutcome> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        engine.run(pool, &mut *rng)
    }

    /// Build unsaved trios from drawn member ids, looking members up in `pool`
    fn new_trios(
        event_id: EventId,
        category_id: CategoryId,
        drawn: &[TrioIds],
        pool: &[Competitor],
        on: NaiveDate,
    ) -> DrawResult<Vec<NewTrio>> {
        drawn
            .iter()
            .map(|ids| {
                let members: Vec<&Competitor> = ids
                    .iter()
                    .filter_map(|id| pool.iter().find(|c| c.id == *id))
                    .collect();
                NewTrio::from_members(event_id, category_id, &members, on).map_err(|e| {
                    DrawError::IneligibleTrio {
                        members: *ids,
                        reasons: vec![e.to_string()],
                    }
                })
            })
            .collect()
    }

    async fn persist(
        &self,
        event_id: EventId,
        category: &Category,
        trios: &[NewTrio],
    ) -> DrawResult<Vec<Trio>> {
        if trios.is_empty() {
            return Ok(Vec::new());
        }
        let template = run_template(self.store.as_ref(), event_id, category).await?;
        Ok(self.store.insert_trios(trios, Some(template)).await?)
    }

    /// Draw trios for a category from the given competitors and store them.
    ///
    /// Competitors blocked by their run limit are excluded along with those
    /// failing the category rules. Trios are stored all at once with their
    /// pending runs.
    pub async fn draw(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
        on: NaiveDate,
    ) -> DrawResult<DrawReport> {
        let category = self.category(category_id).await?;
        let competitors = self.competitors(competitor_ids).await?;
        let (pool, blocked) = self
            .without_blocked(event_id, category_id, competitors)
            .await?;

        let engine = DrawEngine::new(EligibilityRules::new(&category, on), self.settings);
        let mut outcome = self.run_engine(&engine, &pool)?;
        outcome.excluded.extend(blocked);

        let new_trios = Self::new_trios(event_id, category_id, &outcome.trios, &pool, on)?;
        let trios = self.persist(event_id, &category, &new_trios).await?;

        log::info!(
            "Draw for event {} category {}: {}",
            event_id,
            category.name,
            outcome.message
        );
        Ok(DrawReport { outcome, trios })
    }

    /// Draw repeated rounds until every competitor reaches the quota of
    /// trios set by the run configuration, or no more trios form.
    ///
    /// Trios the competitors already belong to count toward the quota.
    /// Only a failure of the first round is an error; later rounds simply
    /// stop. Everything formed is stored in one unit.
    pub async fn draw_rounds(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
        on: NaiveDate,
    ) -> DrawResult<RoundsReport> {
        let category = self.category(category_id).await?;
        let config = self
            .store
            .find_config(event_id, category_id)
            .await?
            .ok_or(DrawError::ConfigNotFound {
                event_id,
                category_id,
            })?;
        let quota = config.participation_quota();

        let competitors = self.competitors(competitor_ids).await?;
        let (available, _) = self
            .without_blocked(event_id, category_id, competitors)
            .await?;
        let rules = EligibilityRules::new(&category, on);
        let pool: Vec<Competitor> = available
            .into_iter()
            .filter(|c| rules.competitor_eligible(c).is_valid())
            .collect();

        let mut participation: BTreeMap<CompetitorId, u32> =
            pool.iter().map(|c| (c.id, 0)).collect();
        for trio in self
            .store
            .trios_for_event(event_id, Some(category_id))
            .await?
        {
            for id in trio.member_ids() {
                if let Some(count) = participation.get_mut(&id) {
                    *count += 1;
                }
            }
        }

        let round_cap = (quota as usize * pool.len() / TRIO_SIZE * 2)
            .max(1)
            .min(self.settings.max_draw_rounds);
        let engine = DrawEngine::new(rules, self.settings);
        let mut drawn: Vec<TrioIds> = Vec::new();
        let mut rounds = 0;

        while quota > 0 && rounds < round_cap {
            let candidates: Vec<Competitor> = pool
                .iter()
                .filter(|c| participation.get(&c.id).is_some_and(|n| *n < quota))
                .cloned()
                .collect();
            if candidates.len() < TRIO_SIZE {
                break;
            }

            let outcome = match self.run_engine(&engine, &candidates) {
                Ok(outcome) => outcome,
                Err(e) if rounds == 0 => return Err(e),
                Err(e) => {
                    log::debug!("Round {} stopped: {}", rounds + 1, e);
                    break;
                }
            };
            if outcome.trios.is_empty() {
                break;
            }

            rounds += 1;
            for ids in &outcome.trios {
                for id in ids {
                    if let Some(count) = participation.get_mut(id) {
                        *count += 1;
                    }
                }
            }
            drawn.extend(outcome.trios);
        }

        let new_trios = Self::new_trios(event_id, category_id, &drawn, &pool, on)?;
        let trios = self.persist(event_id, &category, &new_trios).await?;

        let below_quota: Vec<CompetitorId> = participation
            .iter()
            .filter(|(_, n)| **n < quota)
            .map(|(id, _)| *id)
            .collect();
        let possible = pool.len() as f64 * f64::from(quota);
        let placed: u32 = participation.values().map(|n| (*n).min(quota)).sum();
        let efficiency = if possible > 0.0 {
            f64::from(placed) / possible * 100.0
        } else {
            0.0
        };

        let message = format!(
            "{} trios formed in {} rounds, quota {}, {} competitors below quota, {:.1}% efficiency",
            trios.len(),
            rounds,
            quota,
            below_quota.len(),
            efficiency
        );
        log::info!(
            "Round draw for event {} category {}: {}",
            event_id,
            category.name,
            message
        );

        Ok(RoundsReport {
            quota,
            rounds,
            trios,
            participation,
            below_quota,
            efficiency,
            message,
        })
    }

    /// Seed prior champions into Copa dos Campeões trios and store them.
    ///
    /// Each seeded trio must still satisfy the category rules. The first two
    /// members of every trio are heads of bracket.
    pub async fn seed_champions_cup(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        seeds: &[ChampionSeed],
        on: NaiveDate,
    ) -> DrawResult<SeedingReport> {
        let category = self.category(category_id).await?;
        let ids: Vec<CompetitorId> = seeds.iter().map(|s| s.competitor_id).collect();
        let competitors = self.competitors(&ids).await?;
        let outcome = seed_champions(seeds)?;
        let rules = EligibilityRules::new(&category, on);

        let mut new_trios = Vec::with_capacity(outcome.trios.len());
        for ids in &outcome.trios {
            let members: Vec<&Competitor> = ids
                .iter()
                .filter_map(|id| competitors.iter().find(|c| c.id == *id))
                .collect();
            let eligibility = rules.trio_fully_eligible(&members);
            if !eligibility.is_valid() {
                return Err(DrawError::IneligibleTrio {
                    members: *ids,
                    reasons: eligibility.reasons(),
                });
            }

            let mut trio = Self::new_trios(event_id, category_id, &[*ids], &competitors, on)?
                .remove(0)
                .manual();
            trio.head_of_bracket = true;
            trio.cup_type = Some(CupType::CopaCampeoes);
            for member in trio.members.iter_mut().take(HEADS_PER_TRIO) {
                member.head_of_bracket = true;
            }
            new_trios.push(trio);
        }

        let trios = self.persist(event_id, &category, &new_trios).await?;
        log::info!(
            "Copa dos Campeões seeding for event {}: {}",
            event_id,
            outcome.message
        );
        Ok(SeedingReport { outcome, trios })
    }
}
