//! Trio manager: manual formation, deletion and renumbering.

use chrono::NaiveDate;
use std::sync::Arc;

use super::{
    errors::{TrioError, TrioResult},
    models::{EventId, NewTrio, Renumbering, RunTemplate, Trio, TrioId, TrioRemoval, member_links},
};
use crate::db::{
    CompetitorRepository, PassadaRepository, StoreError, StoreResult, TrioRepository,
};
use crate::passada::kind_run_defaults;
use crate::roster::{Category, CategoryId, Competitor, CompetitorId, EligibilityRules};

/// Pending runs to create with each new trio of a category: the configured
/// count and limit, or the defaults of the category kind.
pub(crate) async fn run_template<S>(
    store: &S,
    event_id: EventId,
    category: &Category,
) -> StoreResult<RunTemplate>
where
    S: PassadaRepository + ?Sized,
{
    let template = match store.find_config(event_id, category.id).await? {
        Some(config) => RunTemplate {
            count: config.max_passadas_per_trio,
            time_limit: config.default_time_limit,
        },
        None => {
            let (count, time_limit) = kind_run_defaults(category.kind);
            RunTemplate { count, time_limit }
        }
    };
    Ok(template)
}

/// Load competitors in the order of `ids`, failing on the first unknown id.
pub(crate) async fn load_competitors<S>(
    store: &S,
    ids: &[CompetitorId],
) -> TrioResult<Vec<Competitor>>
where
    S: CompetitorRepository + ?Sized,
{
    let found = store.find_competitors(ids).await?;
    ids.iter()
        .map(|id| {
            found
                .iter()
                .find(|c| c.id == *id)
                .cloned()
                .ok_or(TrioError::CompetitorNotFound(*id))
        })
        .collect()
}

/// Trio manager
pub struct TrioManager<S> {
    store: Arc<S>,
}

impl<S> TrioManager<S>
where
    S: CompetitorRepository + TrioRepository + PassadaRepository,
{
    /// Create a new trio manager
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Form a trio by hand with the next free number.
    ///
    /// Members keep the given order. Every member must be eligible for the
    /// category and the trio must respect its bounds; all broken rules are
    /// reported together.
    pub async fn create_trio(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
        on: NaiveDate,
    ) -> TrioResult<Trio> {
        self.create(event_id, category_id, competitor_ids, on, None)
            .await
    }

    /// Form a trio by hand with an explicit number
    pub async fn create_numbered_trio(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
        number: u32,
        on: NaiveDate,
    ) -> TrioResult<Trio> {
        self.create(event_id, category_id, competitor_ids, on, Some(number))
            .await
    }

    async fn create(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
        on: NaiveDate,
        number: Option<u32>,
    ) -> TrioResult<Trio> {
        member_links(competitor_ids)?;

        let category = self
            .store
            .find_category(category_id)
            .await?
            .ok_or(TrioError::CategoryNotFound(category_id))?;
        let competitors = load_competitors(self.store.as_ref(), competitor_ids).await?;
        let members: Vec<&Competitor> = competitors.iter().collect();

        let eligibility = EligibilityRules::new(&category, on).trio_fully_eligible(&members);
        if !eligibility.is_valid() {
            return Err(TrioError::Ineligible(eligibility.reasons()));
        }

        let mut new_trio = NewTrio::from_members(event_id, category_id, &members, on)?.manual();
        new_trio.number = number;
        let template = run_template(self.store.as_ref(), event_id, &category).await?;

        let trio = match self.store.insert_trios(&[new_trio], Some(template)).await {
            Ok(mut created) => created.pop().ok_or_else(|| {
                StoreError::Integrity(format!("no trio stored for event {event_id}"))
            })?,
            Err(e) if e.is_conflict() => {
                return Err(TrioError::DuplicateNumber(number.unwrap_or_default()));
            }
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "Trio {} formed in event {} category {} with {:?}",
            trio.number,
            event_id,
            category_id,
            trio.member_ids()
        );
        Ok(trio)
    }

    /// Find trio by ID
    pub async fn trio(&self, trio_id: TrioId) -> TrioResult<Trio> {
        self.store
            .find_trio(trio_id)
            .await?
            .ok_or(TrioError::TrioNotFound(trio_id))
    }

    /// Trios of an event, optionally restricted to one category
    pub async fn trios(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> TrioResult<Vec<Trio>> {
        Ok(self.store.trios_for_event(event_id, category_id).await?)
    }

    /// Delete a trio that has no recorded runs
    pub async fn delete_trio(&self, trio_id: TrioId) -> TrioResult<()> {
        match self.store.delete_trio(trio_id).await {
            Ok(TrioRemoval::Deleted) => {
                log::info!("Trio {trio_id} deleted");
                Ok(())
            }
            Ok(TrioRemoval::HasResults) => Err(TrioError::HasResults(trio_id)),
            Err(StoreError::NotFound { .. }) => Err(TrioError::TrioNotFound(trio_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Renumber the trios of an event and category as 1..n
    pub async fn renumber(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> TrioResult<Renumbering> {
        let renumbering = self.store.renumber_trios(event_id, category_id).await?;
        log::info!(
            "Renumbered {} trios in event {} category {}",
            renumbering.changes.len(),
            event_id,
            category_id
        );
        Ok(renumbering)
    }
}
