//! Repository trait definitions for testability and dependency injection.
//!
//! Managers are generic over these traits. [`PgStore`](super::PgStore)
//! implements them on PostgreSQL and [`InMemoryStore`](super::InMemoryStore)
//! keeps everything behind a single async mutex.

use async_trait::async_trait;

use super::errors::StoreResult;
use crate::passada::{
    ComparisonGroup, GroupChange, NewPassada, ParticipationControl, Passada, PassadaConfig,
    PassadaId, PassadaResult, TransitionReport,
};
use crate::roster::{Category, CategoryId, Competitor, CompetitorId};
use crate::trio::{EventId, NewTrio, Renumbering, RunTemplate, Trio, TrioId, TrioRemoval};

/// Trait for competitor and category lookups
#[async_trait]
pub trait CompetitorRepository: Send + Sync {
    /// Load competitors by id. Unknown ids are skipped.
    async fn find_competitors(&self, ids: &[CompetitorId]) -> StoreResult<Vec<Competitor>>;

    /// Load a category by id
    async fn find_category(&self, id: CategoryId) -> StoreResult<Option<Category>>;
}

/// Trait for trio persistence
#[async_trait]
pub trait TrioRepository: Send + Sync {
    /// Insert trios with their membership links, and `runs` pending runs
    /// per trio when given. All trios are stored or none is.
    ///
    /// Trios without an explicit number take the next free number of their
    /// event and category. A taken number is a conflict.
    async fn insert_trios(
        &self,
        trios: &[NewTrio],
        runs: Option<RunTemplate>,
    ) -> StoreResult<Vec<Trio>>;

    /// Find trio by ID
    async fn find_trio(&self, id: TrioId) -> StoreResult<Option<Trio>>;

    /// Trios of an event, optionally restricted to one category, by number
    async fn trios_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Trio>>;

    /// Delete a trio unless one of its runs has a result
    async fn delete_trio(&self, id: TrioId) -> StoreResult<TrioRemoval>;

    /// Renumber trios of an event and category as 1..n, keeping their order
    async fn renumber_trios(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Renumbering>;
}

/// Trait for passada, run configuration and participation persistence
#[async_trait]
pub trait PassadaRepository: Send + Sync {
    /// Insert runs, all or nothing. A run number already used by the trio
    /// is a conflict.
    async fn insert_passadas(&self, runs: &[NewPassada]) -> StoreResult<Vec<Passada>>;

    /// Find passada by ID
    async fn find_passada(&self, id: PassadaId) -> StoreResult<Option<Passada>>;

    /// Runs of a trio, by run number
    async fn passadas_for_trio(&self, trio_id: TrioId) -> StoreResult<Vec<Passada>>;

    /// Runs of an event, optionally restricted to one category, by id
    async fn passadas_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Passada>>;

    /// Apply a transition to a run and its comparison group as one unit.
    ///
    /// The group is locked and read from the latest committed state, `apply`
    /// runs against it and every changed run is written back. When the
    /// change counts as a run, each trio member's participation counter is
    /// incremented in the same unit. An error from `apply` leaves nothing
    /// written.
    async fn transition<F>(&self, passada_id: PassadaId, apply: F) -> PassadaResult<TransitionReport>
    where
        F: FnOnce(&mut ComparisonGroup) -> PassadaResult<GroupChange> + Send;

    /// Re-rank every comparison group of an event. Returns the number of
    /// runs whose placement changed.
    async fn rerank_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<usize>;

    /// Run configuration of an event and category
    async fn find_config(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Option<PassadaConfig>>;

    /// Store a new run configuration. One per event and category.
    async fn insert_config(&self, config: &PassadaConfig) -> StoreResult<()>;

    /// Participation rows of the given competitors in an event and category
    async fn participation(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
    ) -> StoreResult<Vec<ParticipationControl>>;
}

/// Everything the managers need from persistence
pub trait PenningStore: CompetitorRepository + TrioRepository + PassadaRepository {}

impl<T> PenningStore for T where T: CompetitorRepository + TrioRepository + PassadaRepository {}
