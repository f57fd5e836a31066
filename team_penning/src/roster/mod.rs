//! Competitors, categories and eligibility rules.
//!
//! A [`Category`] carries its bounds and draw policy as plain data. The
//! [`EligibilityRules`] view evaluates those bounds for a reference date.
//!
//! ```
//! use chrono::NaiveDate;
//! use team_penning::roster::{Category, CategoryKind, Competitor, EligibilityRules, Sex};
//!
//! let category = Category::preset(1, "Mirim", CategoryKind::Mirim);
//! let on = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
//! let rules = EligibilityRules::new(&category, on);
//!
//! let born = |y| NaiveDate::from_ymd_opt(y, 1, 1).unwrap();
//! let a = Competitor::new(1, "Ana", born(2014), 1, Sex::Female).unwrap();
//! let b = Competitor::new(2, "Bia", born(2012), 2, Sex::Female).unwrap();
//! let c = Competitor::new(3, "Caio", born(2010), 3, Sex::Male).unwrap();
//!
//! assert!(rules.trio_valid(&[&a, &b, &c]).is_valid());
//! ```

pub mod eligibility;
pub mod errors;
pub mod models;

pub use eligibility::{Eligibility, EligibilityRules, TRIO_SIZE, TrioTotals, Violation};
pub use errors::{RosterError, RosterResult};
pub use models::{
    Category, CategoryId, CategoryKind, Competitor, CompetitorId, DrawPolicy, MAX_HANDICAP,
    MIN_DRAW_SIZE, MIN_HANDICAP, ScoringScheme, Sex, TrioBounds,
};
