//! Trio data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::errors::{TrioError, TrioResult};
use crate::roster::{CategoryId, Competitor, CompetitorId, TRIO_SIZE, TrioTotals};

/// Trio ID type
pub type TrioId = i64;

/// Event ID type
pub type EventId = i64;

/// Trio status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrioStatus {
    #[default]
    Active,
    NoTime,
    Disqualified,
}

impl std::fmt::Display for TrioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrioStatus::Active => write!(f, "active"),
            TrioStatus::NoTime => write!(f, "no_time"),
            TrioStatus::Disqualified => write!(f, "disqualified"),
        }
    }
}

impl std::str::FromStr for TrioStatus {
    type Err = TrioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TrioStatus::Active),
            "no_time" => Ok(TrioStatus::NoTime),
            "disqualified" => Ok(TrioStatus::Disqualified),
            other => Err(TrioError::InvalidStatus(other.to_string())),
        }
    }
}

/// Cup a trio was formed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CupType {
    Regional,
    CopaCampeoes,
    TorneioEspecial,
}

impl std::fmt::Display for CupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CupType::Regional => write!(f, "regional"),
            CupType::CopaCampeoes => write!(f, "copa_campeoes"),
            CupType::TorneioEspecial => write!(f, "torneio_especial"),
        }
    }
}

impl std::str::FromStr for CupType {
    type Err = TrioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regional" => Ok(CupType::Regional),
            "copa_campeoes" => Ok(CupType::CopaCampeoes),
            "torneio_especial" => Ok(CupType::TorneioEspecial),
            other => Err(TrioError::InvalidStatus(other.to_string())),
        }
    }
}

/// Membership link between a trio and a competitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrioMember {
    pub competitor_id: CompetitorId,
    /// 1-based position in the trio
    pub choice_order: u8,
    pub head_of_bracket: bool,
}

/// A persisted trio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trio {
    pub id: TrioId,
    pub event_id: EventId,
    pub category_id: CategoryId,
    pub number: u32,
    pub members: [TrioMember; TRIO_SIZE],
    pub handicap_total: u32,
    pub age_total: u32,
    pub status: TrioStatus,
    pub manual: bool,
    pub head_of_bracket: bool,
    pub cup_type: Option<CupType>,
    pub created_at: DateTime<Utc>,
}

impl Trio {
    pub fn member_ids(&self) -> [CompetitorId; TRIO_SIZE] {
        self.members.map(|m| m.competitor_id)
    }

    pub fn has_member(&self, competitor_id: CompetitorId) -> bool {
        self.members.iter().any(|m| m.competitor_id == competitor_id)
    }
}

/// A trio ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrio {
    pub event_id: EventId,
    pub category_id: CategoryId,
    /// Explicit number, or `None` for the next free one
    pub number: Option<u32>,
    pub members: [TrioMember; TRIO_SIZE],
    pub handicap_total: u32,
    pub age_total: u32,
    pub manual: bool,
    pub head_of_bracket: bool,
    pub cup_type: Option<CupType>,
}

impl NewTrio {
    /// Build a trio from its members in choice order, computing totals.
    ///
    /// Rejects anything other than exactly three distinct competitors.
    pub fn from_members(
        event_id: EventId,
        category_id: CategoryId,
        members: &[&Competitor],
        on: NaiveDate,
    ) -> TrioResult<Self> {
        let ids: Vec<CompetitorId> = members.iter().map(|c| c.id).collect();
        let links = member_links(&ids)?;
        let totals = TrioTotals::of(members, on);

        Ok(Self {
            event_id,
            category_id,
            number: None,
            members: links,
            handicap_total: totals.handicap_total,
            age_total: totals.age_total,
            manual: false,
            head_of_bracket: false,
            cup_type: None,
        })
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn member_ids(&self) -> [CompetitorId; TRIO_SIZE] {
        self.members.map(|m| m.competitor_id)
    }
}

/// Turn member ids into ordered membership links.
pub fn member_links(ids: &[CompetitorId]) -> TrioResult<[TrioMember; TRIO_SIZE]> {
    let ids: [CompetitorId; TRIO_SIZE] = ids
        .try_into()
        .map_err(|_| TrioError::InvalidSize(ids.len()))?;

    let mut seen = HashSet::with_capacity(TRIO_SIZE);
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(TrioError::DuplicateMember(*dup));
    }

    let mut order = 0u8;
    Ok(ids.map(|competitor_id| {
        order += 1;
        TrioMember {
            competitor_id,
            choice_order: order,
            head_of_bracket: false,
        }
    }))
}

/// Default pending runs created alongside a trio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTemplate {
    pub count: u32,
    pub time_limit: rust_decimal::Decimal,
}

/// Outcome of a guarded trio deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrioRemoval {
    Deleted,
    /// The trio has recorded runs and was kept
    HasResults,
}

/// Result of renumbering trios of a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renumbering {
    /// (trio id, old number, new number) for every trio whose number changed
    pub changes: Vec<(TrioId, u32, u32)>,
}
