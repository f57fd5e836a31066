//! PostgreSQL implementation of the repositories.
//!
//! Table layout lives in `schema.sql` at the crate root.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::collections::HashMap;

use super::errors::{StoreError, StoreResult};
use super::repository::{CompetitorRepository, PassadaRepository, TrioRepository};
use crate::passada::{
    ComparisonGroup, DEFAULT_MAX_RUNS_PER_COMPETITOR, GroupChange, NewPassada, ParticipationControl,
    Passada, PassadaConfig, PassadaError, PassadaId, PassadaResult, SatRecord, TransitionReport,
    rerank_all,
};
use crate::roster::{
    Category, CategoryId, Competitor, CompetitorId, DrawPolicy, RosterError, TRIO_SIZE, TrioBounds,
};
use crate::trio::{
    EventId, NewTrio, Renumbering, RunTemplate, Trio, TrioError, TrioId, TrioMember, TrioRemoval,
};

const PASSADA_COLUMNS: &str = "id, trio_id, event_id, category_id, run_number, animal_number, \
     time, time_limit, status, points, placement, sat_reason, sat_applied_by, sat_applied_at, \
     ran_at, notes, updated_at";

const TRIO_COLUMNS: &str = "id, event_id, category_id, number, handicap_total, age_total, \
     status, manual, head_of_bracket, cup_type, created_at";

/// Repositories backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn integrity(msg: impl Into<String>) -> StoreError {
    StoreError::Integrity(msg.into())
}

fn to_u32(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| integrity(format!("negative value {value} in {column}")))
}

fn opt_u32(value: Option<i32>, column: &str) -> StoreResult<Option<u32>> {
    value.map(|v| to_u32(v, column)).transpose()
}

fn to_i32(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| integrity(format!("value {value} out of range")))
}

fn conflict_or(err: sqlx::Error, msg: impl Into<String>) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(msg.into()),
        _ => StoreError::Database(err),
    }
}

fn competitor_from_row(row: &PgRow) -> StoreResult<Competitor> {
    let handicap: i16 = row.try_get("handicap")?;
    let sex: String = row.try_get("sex")?;
    Ok(Competitor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        birth_date: row.try_get("birth_date")?,
        handicap: u8::try_from(handicap)
            .map_err(|_| integrity(format!("handicap {handicap} out of range")))?,
        sex: sex
            .parse()
            .map_err(|e: RosterError| integrity(e.to_string()))?,
        active: row.try_get("active")?,
        primary_category: row.try_get("primary_category_id")?,
    })
}

fn category_from_row(row: &PgRow) -> StoreResult<Category> {
    let kind: String = row.try_get("kind")?;
    let scoring: String = row.try_get("scoring")?;
    let min_draw: i32 = row.try_get("min_draw_size")?;
    let max_draw: i32 = row.try_get("max_draw_size")?;
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: kind.parse().map_err(|e: RosterError| integrity(e.to_string()))?,
        bounds: TrioBounds {
            max_trio_handicap: opt_u32(row.try_get("max_trio_handicap")?, "max_trio_handicap")?,
            max_trio_age: opt_u32(row.try_get("max_trio_age")?, "max_trio_age")?,
            min_age: opt_u32(row.try_get("min_age")?, "min_age")?,
            max_age: opt_u32(row.try_get("max_age")?, "max_age")?,
        },
        draw: DrawPolicy {
            allowed: row.try_get("draw_allowed")?,
            min_draw_size: to_u32(min_draw, "min_draw_size")? as usize,
            max_draw_size: to_u32(max_draw, "max_draw_size")? as usize,
            full_draw: row.try_get("full_draw")?,
        },
        scoring: scoring
            .parse()
            .map_err(|e: RosterError| integrity(e.to_string()))?,
    })
}

fn passada_from_row(row: &PgRow) -> StoreResult<Passada> {
    let status: String = row.try_get("status")?;
    let sat_reason: Option<String> = row.try_get("sat_reason")?;
    let sat_applied_at: Option<DateTime<Utc>> = row.try_get("sat_applied_at")?;
    let sat = match (sat_reason, sat_applied_at) {
        (Some(reason), Some(applied_at)) => Some(SatRecord {
            reason,
            applied_by: row.try_get("sat_applied_by")?,
            applied_at,
        }),
        _ => None,
    };

    Ok(Passada {
        id: row.try_get("id")?,
        trio_id: row.try_get("trio_id")?,
        event_id: row.try_get("event_id")?,
        category_id: row.try_get("category_id")?,
        run_number: to_u32(row.try_get("run_number")?, "run_number")?,
        animal_number: opt_u32(row.try_get("animal_number")?, "animal_number")?,
        time: row.try_get("time")?,
        time_limit: row.try_get("time_limit")?,
        status: status
            .parse()
            .map_err(|e: PassadaError| integrity(e.to_string()))?,
        points: row.try_get("points")?,
        placement: opt_u32(row.try_get("placement")?, "placement")?,
        sat,
        ran_at: row.try_get("ran_at")?,
        notes: row.try_get("notes")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn control_from_row(row: &PgRow) -> StoreResult<ParticipationControl> {
    Ok(ParticipationControl {
        competitor_id: row.try_get("competitor_id")?,
        event_id: row.try_get("event_id")?,
        category_id: row.try_get("category_id")?,
        total_executed: to_u32(row.try_get("total_executed")?, "total_executed")?,
        max_allowed: to_u32(row.try_get("max_allowed")?, "max_allowed")?,
        can_compete: row.try_get("can_compete")?,
        block_reason: row.try_get("block_reason")?,
        last_run_at: row.try_get("last_run_at")?,
    })
}

/// Build a trio from its row and its membership rows.
fn trio_from_rows(row: &PgRow, member_rows: &[PgRow]) -> StoreResult<Trio> {
    let id: TrioId = row.try_get("id")?;
    if member_rows.len() != TRIO_SIZE {
        return Err(integrity(format!(
            "trio {id} has {} members",
            member_rows.len()
        )));
    }

    let mut members = Vec::with_capacity(TRIO_SIZE);
    for m in member_rows {
        let order: i16 = m.try_get("choice_order")?;
        members.push(TrioMember {
            competitor_id: m.try_get("competitor_id")?,
            choice_order: u8::try_from(order)
                .map_err(|_| integrity(format!("choice order {order} out of range")))?,
            head_of_bracket: m.try_get("head_of_bracket")?,
        });
    }
    let members: [TrioMember; TRIO_SIZE] = members
        .try_into()
        .map_err(|_| integrity(format!("trio {id} membership is malformed")))?;

    let status: String = row.try_get("status")?;
    let cup_type: Option<String> = row.try_get("cup_type")?;
    Ok(Trio {
        id,
        event_id: row.try_get("event_id")?,
        category_id: row.try_get("category_id")?,
        number: to_u32(row.try_get("number")?, "number")?,
        members,
        handicap_total: to_u32(row.try_get("handicap_total")?, "handicap_total")?,
        age_total: to_u32(row.try_get("age_total")?, "age_total")?,
        status: status
            .parse()
            .map_err(|e: TrioError| integrity(e.to_string()))?,
        manual: row.try_get("manual")?,
        head_of_bracket: row.try_get("head_of_bracket")?,
        cup_type: cup_type
            .map(|c| c.parse())
            .transpose()
            .map_err(|e: TrioError| integrity(e.to_string()))?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    async fn load_trios(&self, rows: Vec<PgRow>) -> StoreResult<Vec<Trio>> {
        let ids: Vec<TrioId> = rows
            .iter()
            .map(|r| r.try_get::<TrioId, _>("id"))
            .collect::<Result<_, _>>()?;

        let member_rows = sqlx::query(
            r#"
            SELECT trio_id, competitor_id, choice_order, head_of_bracket
            FROM trio_members
            WHERE trio_id = ANY($1)
            ORDER BY trio_id, choice_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_trio: HashMap<TrioId, Vec<PgRow>> = HashMap::new();
        for m in member_rows {
            by_trio.entry(m.try_get("trio_id")?).or_default().push(m);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                let members = by_trio.get(&id).map(Vec::as_slice).unwrap_or_default();
                trio_from_rows(row, members)
            })
            .collect()
    }

    async fn insert_passada_tx(
        tx: &mut Transaction<'_, Postgres>,
        run: &NewPassada,
    ) -> StoreResult<Passada> {
        let sql = format!(
            r#"
            INSERT INTO passadas (trio_id, event_id, category_id, run_number, animal_number,
                                  time_limit, status, points, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, NOW())
            RETURNING {PASSADA_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(run.trio_id)
            .bind(run.event_id)
            .bind(run.category_id)
            .bind(to_i32(run.run_number)?)
            .bind(run.animal_number.map(to_i32).transpose()?)
            .bind(run.time_limit)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                conflict_or(
                    e,
                    format!(
                        "run number {} already exists for trio {}",
                        run.run_number, run.trio_id
                    ),
                )
            })?;
        passada_from_row(&row)
    }

    async fn update_passada_tx(
        tx: &mut Transaction<'_, Postgres>,
        run: &Passada,
    ) -> StoreResult<()> {
        let sat = run.sat.as_ref();
        sqlx::query(
            r#"
            UPDATE passadas
            SET animal_number = $2, time = $3, time_limit = $4, status = $5, points = $6,
                placement = $7, sat_reason = $8, sat_applied_by = $9, sat_applied_at = $10,
                ran_at = $11, notes = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.animal_number.map(to_i32).transpose()?)
        .bind(run.time)
        .bind(run.time_limit)
        .bind(run.status.to_string())
        .bind(run.points)
        .bind(run.placement.map(to_i32).transpose()?)
        .bind(sat.map(|s| s.reason.clone()))
        .bind(sat.and_then(|s| s.applied_by.clone()))
        .bind(sat.map(|s| s.applied_at))
        .bind(run.ran_at)
        .bind(run.notes.clone())
        .bind(run.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Lock the members' participation rows. Members without a row yet get
    /// a fresh control at the configured limit.
    async fn lock_controls_tx(
        tx: &mut Transaction<'_, Postgres>,
        trio_id: TrioId,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Vec<ParticipationControl>> {
        let members: Vec<CompetitorId> = sqlx::query(
            "SELECT competitor_id FROM trio_members WHERE trio_id = $1 ORDER BY choice_order",
        )
        .bind(trio_id)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(|r| r.try_get("competitor_id"))
        .collect::<Result<_, _>>()?;
        if members.len() != TRIO_SIZE {
            return Err(integrity(format!(
                "trio {trio_id} has {} members",
                members.len()
            )));
        }

        let max: u32 = sqlx::query(
            "SELECT max_runs_per_competitor FROM passada_configs WHERE event_id = $1 AND category_id = $2",
        )
        .bind(event_id)
        .bind(category_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|r| r.try_get::<i32, _>("max_runs_per_competitor"))
        .transpose()?
        .map(|v| to_u32(v, "max_runs_per_competitor"))
        .transpose()?
        .unwrap_or(DEFAULT_MAX_RUNS_PER_COMPETITOR);

        let mut controls = Vec::with_capacity(TRIO_SIZE);
        for member in members {
            let existing = sqlx::query(
                r#"
                SELECT competitor_id, event_id, category_id, total_executed, max_allowed,
                       can_compete, block_reason, last_run_at
                FROM participation_controls
                WHERE competitor_id = $1 AND event_id = $2 AND category_id = $3
                FOR UPDATE
                "#,
            )
            .bind(member)
            .bind(event_id)
            .bind(category_id)
            .fetch_optional(&mut **tx)
            .await?;

            controls.push(match existing {
                Some(row) => control_from_row(&row)?,
                None => ParticipationControl::new(member, event_id, category_id, max),
            });
        }
        Ok(controls)
    }

    async fn upsert_control_tx(
        tx: &mut Transaction<'_, Postgres>,
        control: &ParticipationControl,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participation_controls
                (competitor_id, event_id, category_id, total_executed, max_allowed,
                 can_compete, block_reason, last_run_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (competitor_id, event_id, category_id) DO UPDATE
            SET total_executed = EXCLUDED.total_executed,
                can_compete = EXCLUDED.can_compete,
                block_reason = EXCLUDED.block_reason,
                last_run_at = EXCLUDED.last_run_at
            "#,
        )
        .bind(control.competitor_id)
        .bind(control.event_id)
        .bind(control.category_id)
        .bind(to_i32(control.total_executed)?)
        .bind(to_i32(control.max_allowed)?)
        .bind(control.can_compete)
        .bind(control.block_reason.clone())
        .bind(control.last_run_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CompetitorRepository for PgStore {
    async fn find_competitors(&self, ids: &[CompetitorId]) -> StoreResult<Vec<Competitor>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, birth_date, handicap, sex, active, primary_category_id
            FROM competitors
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<CompetitorId, Competitor> = rows
            .iter()
            .map(|r| competitor_from_row(r).map(|c| (c.id, c)))
            .collect::<StoreResult<_>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn find_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, kind, max_trio_handicap, max_trio_age, min_age, max_age,
                   draw_allowed, min_draw_size, max_draw_size, full_draw, scoring
            FROM categories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(category_from_row).transpose()
    }
}

#[async_trait]
impl TrioRepository for PgStore {
    async fn insert_trios(
        &self,
        trios: &[NewTrio],
        runs: Option<RunTemplate>,
    ) -> StoreResult<Vec<Trio>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(trios.len());

        for new in trios {
            let number = match new.number {
                Some(n) => n,
                None => {
                    let max: Option<i32> = sqlx::query_scalar(
                        "SELECT MAX(number) FROM trios WHERE event_id = $1 AND category_id = $2",
                    )
                    .bind(new.event_id)
                    .bind(new.category_id)
                    .fetch_one(&mut *tx)
                    .await?;
                    to_u32(max.unwrap_or(0), "number")? + 1
                }
            };

            let id: TrioId = sqlx::query_scalar(
                r#"
                INSERT INTO trios (event_id, category_id, number, handicap_total, age_total,
                                   status, manual, head_of_bracket, cup_type, created_at)
                VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, NOW())
                RETURNING id
                "#,
            )
            .bind(new.event_id)
            .bind(new.category_id)
            .bind(to_i32(number)?)
            .bind(to_i32(new.handicap_total)?)
            .bind(to_i32(new.age_total)?)
            .bind(new.manual)
            .bind(new.head_of_bracket)
            .bind(new.cup_type.map(|c| c.to_string()))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                conflict_or(
                    e,
                    format!(
                        "trio number {number} already exists in event {} category {}",
                        new.event_id, new.category_id
                    ),
                )
            })?;

            for member in &new.members {
                sqlx::query(
                    r#"
                    INSERT INTO trio_members (trio_id, competitor_id, choice_order, head_of_bracket)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(id)
                .bind(member.competitor_id)
                .bind(i16::from(member.choice_order))
                .bind(member.head_of_bracket)
                .execute(&mut *tx)
                .await?;
            }

            if let Some(template) = runs {
                for run_number in 1..=template.count {
                    let run = NewPassada {
                        trio_id: id,
                        event_id: new.event_id,
                        category_id: new.category_id,
                        run_number,
                        animal_number: None,
                        time_limit: template.time_limit,
                    };
                    Self::insert_passada_tx(&mut tx, &run).await?;
                }
            }

            ids.push(id);
        }

        tx.commit().await?;

        let sql = format!("SELECT {TRIO_COLUMNS} FROM trios WHERE id = ANY($1) ORDER BY id");
        let rows = sqlx::query(&sql).bind(&ids).fetch_all(&self.pool).await?;
        self.load_trios(rows).await
    }

    async fn find_trio(&self, id: TrioId) -> StoreResult<Option<Trio>> {
        let sql = format!("SELECT {TRIO_COLUMNS} FROM trios WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.load_trios(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn trios_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Trio>> {
        let sql = format!(
            r#"
            SELECT {TRIO_COLUMNS} FROM trios
            WHERE event_id = $1 AND ($2::BIGINT IS NULL OR category_id = $2)
            ORDER BY category_id, number, id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(event_id)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        self.load_trios(rows).await
    }

    async fn delete_trio(&self, id: TrioId) -> StoreResult<TrioRemoval> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM trios WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "Trio",
                id,
            })?;

        let has_results: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM passadas
                WHERE trio_id = $1 AND status IN ('executed', 'no_time', 'disqualified')
            )
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if has_results {
            return Ok(TrioRemoval::HasResults);
        }

        // Members and runs cascade.
        sqlx::query("DELETE FROM trios WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(TrioRemoval::Deleted)
    }

    async fn renumber_trios(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Renumbering> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, number FROM trios
            WHERE event_id = $1 AND category_id = $2
            ORDER BY number, id
            FOR UPDATE
            "#,
        )
        .bind(event_id)
        .bind(category_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut changes = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let id: TrioId = row.try_get("id")?;
            let old = to_u32(row.try_get("number")?, "number")?;
            let new = index as u32 + 1;
            if old != new {
                changes.push((id, old, new));
            }
        }

        // Park changed rows on negative numbers first so the unique key
        // never sees two trios with the same number.
        for (id, _, new) in &changes {
            sqlx::query("UPDATE trios SET number = $2 WHERE id = $1")
                .bind(id)
                .bind(-to_i32(*new)?)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "UPDATE trios SET number = -number WHERE event_id = $1 AND category_id = $2 AND number < 0",
        )
        .bind(event_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Renumbering { changes })
    }
}

#[async_trait]
impl PassadaRepository for PgStore {
    async fn insert_passadas(&self, runs: &[NewPassada]) -> StoreResult<Vec<Passada>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(runs.len());
        for run in runs {
            created.push(Self::insert_passada_tx(&mut tx, run).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find_passada(&self, id: PassadaId) -> StoreResult<Option<Passada>> {
        let sql = format!("SELECT {PASSADA_COLUMNS} FROM passadas WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(passada_from_row).transpose()
    }

    async fn passadas_for_trio(&self, trio_id: TrioId) -> StoreResult<Vec<Passada>> {
        let sql =
            format!("SELECT {PASSADA_COLUMNS} FROM passadas WHERE trio_id = $1 ORDER BY run_number");
        let rows = sqlx::query(&sql).bind(trio_id).fetch_all(&self.pool).await?;
        rows.iter().map(passada_from_row).collect()
    }

    async fn passadas_for_event(
        &self,
        event_id: EventId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Passada>> {
        let sql = format!(
            r#"
            SELECT {PASSADA_COLUMNS} FROM passadas
            WHERE event_id = $1 AND ($2::BIGINT IS NULL OR category_id = $2)
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(event_id)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(passada_from_row).collect()
    }

    async fn transition<F>(&self, passada_id: PassadaId, apply: F) -> PassadaResult<TransitionReport>
    where
        F: FnOnce(&mut ComparisonGroup) -> PassadaResult<GroupChange> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let key_row = sqlx::query(
            "SELECT trio_id, event_id, category_id, run_number FROM passadas WHERE id = $1",
        )
        .bind(passada_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from)?
        .ok_or(PassadaError::PassadaNotFound(passada_id))?;
        let trio_id: TrioId = key_row.try_get("trio_id").map_err(StoreError::from)?;
        let event_id: EventId = key_row.try_get("event_id").map_err(StoreError::from)?;
        let category_id: CategoryId = key_row.try_get("category_id").map_err(StoreError::from)?;
        let run_number: i32 = key_row.try_get("run_number").map_err(StoreError::from)?;

        let trio_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM trios WHERE id = $1)")
                .bind(trio_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(StoreError::from)?;
        if !trio_exists {
            return Err(integrity(format!(
                "passada {passada_id} references missing trio {trio_id}"
            ))
            .into());
        }

        // Lock the whole comparison group in id order.
        let sql = format!(
            r#"
            SELECT {PASSADA_COLUMNS} FROM passadas
            WHERE event_id = $1 AND category_id = $2 AND run_number = $3
            ORDER BY id
            FOR UPDATE
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(event_id)
            .bind(category_id)
            .bind(run_number)
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let mut runs = rows
            .iter()
            .map(passada_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let position = runs
            .iter()
            .position(|p| p.id == passada_id)
            .ok_or(PassadaError::PassadaNotFound(passada_id))?;
        let target = runs.remove(position);
        let before: HashMap<PassadaId, Passada> =
            std::iter::once(target.clone()).chain(runs.iter().cloned()).map(|p| (p.id, p)).collect();

        let mut group = ComparisonGroup::new(target, runs);
        let change = apply(&mut group)?;

        // Dropping the transaction on a blocked member rolls everything back.
        let mut controls = if change.counts_run {
            let controls = Self::lock_controls_tx(&mut tx, trio_id, event_id, category_id).await?;
            if let Some(blocked) = controls.iter().find(|c| !c.is_available()) {
                return Err(PassadaError::ParticipantBlocked {
                    competitor_id: blocked.competitor_id,
                });
            }
            controls
        } else {
            Vec::new()
        };

        for run in group.runs() {
            if before.get(&run.id) != Some(run) {
                Self::update_passada_tx(&mut tx, run).await?;
            }
        }

        let at = group.target.ran_at.unwrap_or_else(Utc::now);
        let mut newly_blocked = Vec::new();
        for control in &mut controls {
            if control.record_run(at) {
                newly_blocked.push(control.competitor_id);
            }
            Self::upsert_control_tx(&mut tx, control).await?;
        }

        tx.commit().await.map_err(StoreError::from)?;

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
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {PASSADA_COLUMNS} FROM passadas
            WHERE event_id = $1 AND ($2::BIGINT IS NULL OR category_id = $2)
            ORDER BY id
            FOR UPDATE
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(event_id)
            .bind(category_id)
            .fetch_all(&mut *tx)
            .await?;
        let mut runs = rows
            .iter()
            .map(passada_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let changed = rerank_all(&mut runs);
        let now = Utc::now();
        for run in runs.iter_mut().filter(|p| changed.contains(&p.id)) {
            run.updated_at = now;
            Self::update_passada_tx(&mut tx, run).await?;
        }

        tx.commit().await?;
        Ok(changed.len())
    }

    async fn find_config(
        &self,
        event_id: EventId,
        category_id: CategoryId,
    ) -> StoreResult<Option<PassadaConfig>> {
        let row = sqlx::query(
            r#"
            SELECT event_id, category_id, max_passadas_per_trio, max_runs_per_competitor,
                   default_time_limit, min_interval_minutes, allow_repeat_animal,
                   animal_pool, active
            FROM passada_configs
            WHERE event_id = $1 AND category_id = $2
            "#,
        )
        .bind(event_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let pool: serde_json::Value = row.try_get("animal_pool")?;
        Ok(Some(PassadaConfig {
            event_id: row.try_get("event_id")?,
            category_id: row.try_get("category_id")?,
            max_passadas_per_trio: to_u32(
                row.try_get("max_passadas_per_trio")?,
                "max_passadas_per_trio",
            )?,
            max_runs_per_competitor: to_u32(
                row.try_get("max_runs_per_competitor")?,
                "max_runs_per_competitor",
            )?,
            default_time_limit: row.try_get::<Decimal, _>("default_time_limit")?,
            min_interval_minutes: to_u32(
                row.try_get("min_interval_minutes")?,
                "min_interval_minutes",
            )?,
            allow_repeat_animal: row.try_get("allow_repeat_animal")?,
            animal_pool: serde_json::from_value(pool)?,
            active: row.try_get("active")?,
        }))
    }

    async fn insert_config(&self, config: &PassadaConfig) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO passada_configs
                (event_id, category_id, max_passadas_per_trio, max_runs_per_competitor,
                 default_time_limit, min_interval_minutes, allow_repeat_animal, animal_pool, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(config.event_id)
        .bind(config.category_id)
        .bind(to_i32(config.max_passadas_per_trio)?)
        .bind(to_i32(config.max_runs_per_competitor)?)
        .bind(config.default_time_limit)
        .bind(to_i32(config.min_interval_minutes)?)
        .bind(config.allow_repeat_animal)
        .bind(serde_json::to_value(&config.animal_pool)?)
        .bind(config.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or(
                e,
                format!(
                    "run configuration for event {} category {}",
                    config.event_id, config.category_id
                ),
            )
        })?;
        Ok(())
    }

    async fn participation(
        &self,
        event_id: EventId,
        category_id: CategoryId,
        competitor_ids: &[CompetitorId],
    ) -> StoreResult<Vec<ParticipationControl>> {
        let rows = sqlx::query(
            r#"
            SELECT competitor_id, event_id, category_id, total_executed, max_allowed,
                   can_compete, block_reason, last_run_at
            FROM participation_controls
            WHERE event_id = $1 AND category_id = $2 AND competitor_id = ANY($3)
            "#,
        )
        .bind(event_id)
        .bind(category_id)
        .bind(competitor_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(control_from_row).collect()
    }
}
