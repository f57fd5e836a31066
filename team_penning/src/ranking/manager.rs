//! Ranking manager: standings and reports straight from the store.

use std::sync::Arc;

use super::{
    aggregator::{CompetitorStanding, RankingAggregator, TrioStanding},
    analysis::{SatSummary, TimeAnalysis},
};
use crate::db::{PassadaRepository, StoreResult, TrioRepository};
use crate::roster::CategoryId;
use crate::trio::EventId;

/// Ranking manager
pub struct RankingManager<S> {
    store: Arc<S>,
}

impl<S> RankingManager<S>
where
    S: TrioRepository + PassadaRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn aggregator(category_id: Option<CategoryId>) -> RankingAggregator {
        category_id.map_or_else(RankingAggregator::new, RankingAggregator::for_category)
    }

    /// Trio standings of an event, optionally for one category
    pub async fn trio_standings(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<TrioStanding>> {
        let runs = self.store.passadas_for_event(event_id, category_id).await?;
        Ok(Self::aggregator(category_id).trios(&runs))
    }

    /// Competitor standings of an event, optionally for one category
    pub async fn competitor_standings(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<CompetitorStanding>> {
        let runs = self.store.passadas_for_event(event_id, category_id).await?;
        let trios = self.store.trios_for_event(event_id, category_id).await?;
        Ok(Self::aggregator(category_id).competitors(&runs, &trios))
    }

    pub async fn time_analysis(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Option<TimeAnalysis>> {
        let runs = self.store.passadas_for_event(event_id, category_id).await?;
        Ok(TimeAnalysis::of(&runs))
    }

    pub async fn sat_summary(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<SatSummary> {
        let runs = self.store.passadas_for_event(event_id, category_id).await?;
        Ok(SatSummary::of(&runs))
    }
}
