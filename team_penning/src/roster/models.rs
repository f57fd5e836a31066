//! Competitor and category models.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::errors::{RosterError, RosterResult};

/// Competitor ID type
pub type CompetitorId = i64;

/// Category ID type
pub type CategoryId = i64;

/// Lowest handicap a competitor may carry
pub const MIN_HANDICAP: u8 = 0;

/// Highest handicap a competitor may carry
pub const MAX_HANDICAP: u8 = 7;

/// Smallest pool a draw may be configured for
pub const MIN_DRAW_SIZE: usize = 3;

/// Competitor sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Male => write!(f, "M"),
            Sex::Female => write!(f, "F"),
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" | "m" => Ok(Sex::Male),
            "F" | "f" => Ok(Sex::Female),
            other => Err(RosterError::InvalidSex(other.to_string())),
        }
    }
}

/// A registered competitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: CompetitorId,
    pub name: String,
    pub birth_date: NaiveDate,
    pub handicap: u8,
    pub sex: Sex,
    pub active: bool,
    pub primary_category: Option<CategoryId>,
}

impl Competitor {
    /// Create an active competitor, rejecting a handicap outside 0..=7.
    pub fn new(
        id: CompetitorId,
        name: impl Into<String>,
        birth_date: NaiveDate,
        handicap: u8,
        sex: Sex,
    ) -> RosterResult<Self> {
        if handicap > MAX_HANDICAP {
            return Err(RosterError::InvalidHandicap(handicap));
        }

        Ok(Self {
            id,
            name: name.into(),
            birth_date,
            handicap,
            sex,
            active: true,
            primary_category: None,
        })
    }

    /// Age in whole years on the given date.
    ///
    /// A birthday later in the year than `on` has not been reached yet.
    pub fn age_on(&self, on: NaiveDate) -> u32 {
        let mut years = on.year() - self.birth_date.year();
        if (on.month(), on.day()) < (self.birth_date.month(), self.birth_date.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }
}

/// Closed set of category kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Baby,
    Kids,
    Mirim,
    Feminina,
    Aberta,
    Handicap,
    Soma,
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            CategoryKind::Baby => "baby",
            CategoryKind::Kids => "kids",
            CategoryKind::Mirim => "mirim",
            CategoryKind::Feminina => "feminina",
            CategoryKind::Aberta => "aberta",
            CategoryKind::Handicap => "handicap",
            CategoryKind::Soma => "soma",
        };
        write!(f, "{tag}")
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baby" => Ok(CategoryKind::Baby),
            "kids" => Ok(CategoryKind::Kids),
            "mirim" => Ok(CategoryKind::Mirim),
            "feminina" => Ok(CategoryKind::Feminina),
            "aberta" => Ok(CategoryKind::Aberta),
            "handicap" => Ok(CategoryKind::Handicap),
            other if other.starts_with("soma") => Ok(CategoryKind::Soma),
            other => Err(RosterError::UnknownCategoryKind(other.to_string())),
        }
    }
}

/// Trio composition bounds. `None` skips the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrioBounds {
    pub max_trio_handicap: Option<u32>,
    pub max_trio_age: Option<u32>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

/// How a category may be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawPolicy {
    pub allowed: bool,
    pub min_draw_size: usize,
    pub max_draw_size: usize,
    pub full_draw: bool,
}

impl Default for DrawPolicy {
    fn default() -> Self {
        Self {
            allowed: true,
            min_draw_size: 3,
            max_draw_size: 9,
            full_draw: false,
        }
    }
}

/// Scoring scheme tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringScheme {
    #[default]
    Contep,
    Premiacao,
    Misto,
}

impl std::fmt::Display for ScoringScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringScheme::Contep => write!(f, "contep"),
            ScoringScheme::Premiacao => write!(f, "premiacao"),
            ScoringScheme::Misto => write!(f, "misto"),
        }
    }
}

impl std::str::FromStr for ScoringScheme {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contep" => Ok(ScoringScheme::Contep),
            "premiacao" => Ok(ScoringScheme::Premiacao),
            "misto" => Ok(ScoringScheme::Misto),
            other => Err(RosterError::UnknownScoringScheme(other.to_string())),
        }
    }
}

/// Competition category with its eligibility and draw rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub kind: CategoryKind,
    pub bounds: TrioBounds,
    pub draw: DrawPolicy,
    pub scoring: ScoringScheme,
}

impl Category {
    /// Build a category with the standard rules for its kind.
    pub fn preset(id: CategoryId, name: impl Into<String>, kind: CategoryKind) -> Self {
        let (bounds, draw) = match kind {
            CategoryKind::Baby => (
                TrioBounds {
                    max_age: Some(12),
                    ..TrioBounds::default()
                },
                DrawPolicy {
                    full_draw: true,
                    ..DrawPolicy::default()
                },
            ),
            CategoryKind::Kids => (
                TrioBounds {
                    min_age: Some(13),
                    max_age: Some(17),
                    ..TrioBounds::default()
                },
                DrawPolicy::default(),
            ),
            CategoryKind::Mirim => (
                TrioBounds {
                    max_trio_age: Some(36),
                    ..TrioBounds::default()
                },
                DrawPolicy::default(),
            ),
            CategoryKind::Feminina | CategoryKind::Aberta => {
                (TrioBounds::default(), DrawPolicy::default())
            }
            CategoryKind::Handicap | CategoryKind::Soma => (
                TrioBounds {
                    max_trio_handicap: Some(11),
                    ..TrioBounds::default()
                },
                DrawPolicy::default(),
            ),
        };

        Self {
            id,
            name: name.into(),
            kind,
            bounds,
            draw,
            scoring: ScoringScheme::default(),
        }
    }

    /// Check the draw policy invariant.
    pub fn validate(&self) -> RosterResult<()> {
        if !self.draw.allowed {
            return Ok(());
        }
        if self.draw.min_draw_size < MIN_DRAW_SIZE {
            return Err(RosterError::InvalidDrawPolicy(format!(
                "min draw size {} is below {}",
                self.draw.min_draw_size, MIN_DRAW_SIZE
            )));
        }
        if self.draw.min_draw_size > self.draw.max_draw_size {
            return Err(RosterError::InvalidDrawPolicy(format!(
                "min draw size {} exceeds max draw size {}",
                self.draw.min_draw_size, self.draw.max_draw_size
            )));
        }
        Ok(())
    }

    pub fn is_female_only(&self) -> bool {
        self.kind == CategoryKind::Feminina
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let c = Competitor::new(1, "Ana", date(2010, 6, 15), 2, Sex::Female).unwrap();
        assert_eq!(c.age_on(date(2024, 6, 14)), 13);
        assert_eq!(c.age_on(date(2024, 6, 15)), 14);
        assert_eq!(c.age_on(date(2024, 12, 31)), 14);
    }

    #[test]
    fn test_handicap_out_of_range_rejected() {
        let result = Competitor::new(1, "Bruno", date(1990, 1, 1), 8, Sex::Male);
        assert!(matches!(result, Err(RosterError::InvalidHandicap(8))));
    }

    #[test]
    fn test_category_kind_parsing() {
        assert_eq!("mirim".parse::<CategoryKind>().unwrap(), CategoryKind::Mirim);
        assert_eq!("soma11".parse::<CategoryKind>().unwrap(), CategoryKind::Soma);
        assert!("rodeio".parse::<CategoryKind>().is_err());
    }

    #[test]
    fn test_presets_follow_kind_rules() {
        let baby = Category::preset(1, "Baby", CategoryKind::Baby);
        assert!(baby.draw.full_draw);
        assert_eq!(baby.bounds.max_age, Some(12));

        let mirim = Category::preset(2, "Mirim", CategoryKind::Mirim);
        assert_eq!(mirim.bounds.max_trio_age, Some(36));

        let handicap = Category::preset(3, "Handicap", CategoryKind::Handicap);
        assert_eq!(handicap.bounds.max_trio_handicap, Some(11));
        assert!(handicap.validate().is_ok());
    }

    #[test]
    fn test_draw_policy_invariant() {
        let mut category = Category::preset(1, "Kids", CategoryKind::Kids);
        category.draw.min_draw_size = 12;
        assert!(category.validate().is_err());

        category.draw.min_draw_size = 2;
        category.draw.max_draw_size = 9;
        assert!(category.validate().is_err());

        category.draw.allowed = false;
        assert!(category.validate().is_ok());
    }
}
