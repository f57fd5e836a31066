//! Eligibility predicates for competitors and trios.
//!
//! Both checks are pure and collect every violated rule, so callers can
//! show all reasons at once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::models::{Category, Competitor, CompetitorId, Sex};

/// Number of competitors in a trio
pub const TRIO_SIZE: usize = 3;

/// A single broken eligibility rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    Inactive {
        competitor: CompetitorId,
    },
    BelowMinimumAge {
        competitor: CompetitorId,
        age: u32,
        min: u32,
    },
    AboveMaximumAge {
        competitor: CompetitorId,
        age: u32,
        max: u32,
    },
    FemaleOnly {
        competitor: CompetitorId,
    },
    TrioSize {
        found: usize,
    },
    DuplicateMember {
        competitor: CompetitorId,
    },
    HandicapSumExceeded {
        total: u32,
        max: u32,
    },
    AgeSumExceeded {
        total: u32,
        max: u32,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Inactive { competitor } => {
                write!(f, "Competitor {competitor} is inactive")
            }
            Violation::BelowMinimumAge {
                competitor,
                age,
                min,
            } => write!(
                f,
                "Competitor {competitor} is {age} years old, below the minimum age of {min}"
            ),
            Violation::AboveMaximumAge {
                competitor,
                age,
                max,
            } => write!(
                f,
                "Competitor {competitor} is {age} years old, above the maximum age of {max}"
            ),
            Violation::FemaleOnly { competitor } => write!(
                f,
                "Competitor {competitor} cannot join a female-only category"
            ),
            Violation::TrioSize { found } => {
                write!(f, "A trio must have exactly {TRIO_SIZE} members, found {found}")
            }
            Violation::DuplicateMember { competitor } => {
                write!(f, "Competitor {competitor} appears more than once in the trio")
            }
            Violation::HandicapSumExceeded { total, max } => write!(
                f,
                "Handicap total ({total}) exceeds the maximum allowed ({max})"
            ),
            Violation::AgeSumExceeded { total, max } => {
                write!(f, "Age total ({total}) exceeds the maximum allowed ({max})")
            }
        }
    }
}

/// Outcome of an eligibility check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub violations: Vec<Violation>,
}

impl Eligibility {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable reasons, one per violation
    pub fn reasons(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Handicap and age sums over trio members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrioTotals {
    pub handicap_total: u32,
    pub age_total: u32,
}

impl TrioTotals {
    pub fn of(members: &[&Competitor], on: NaiveDate) -> Self {
        members.iter().fold(Self::default(), |acc, c| Self {
            handicap_total: acc.handicap_total + u32::from(c.handicap),
            age_total: acc.age_total + c.age_on(on),
        })
    }
}

/// Eligibility rules of one category, evaluated on a reference date
#[derive(Debug, Clone, Copy)]
pub struct EligibilityRules<'a> {
    category: &'a Category,
    on: NaiveDate,
}

impl<'a> EligibilityRules<'a> {
    pub fn new(category: &'a Category, on: NaiveDate) -> Self {
        Self { category, on }
    }

    pub fn category(&self) -> &'a Category {
        self.category
    }

    /// Date ages are computed on
    pub fn reference_date(&self) -> NaiveDate {
        self.on
    }

    /// Can this competitor join the category?
    pub fn competitor_eligible(&self, competitor: &Competitor) -> Eligibility {
        let mut violations = Vec::new();
        let bounds = &self.category.bounds;
        let age = competitor.age_on(self.on);

        if !competitor.active {
            violations.push(Violation::Inactive {
                competitor: competitor.id,
            });
        }
        if let Some(min) = bounds.min_age
            && age < min
        {
            violations.push(Violation::BelowMinimumAge {
                competitor: competitor.id,
                age,
                min,
            });
        }
        if let Some(max) = bounds.max_age
            && age > max
        {
            violations.push(Violation::AboveMaximumAge {
                competitor: competitor.id,
                age,
                max,
            });
        }
        if self.category.is_female_only() && competitor.sex != Sex::Female {
            violations.push(Violation::FemaleOnly {
                competitor: competitor.id,
            });
        }

        Eligibility { violations }
    }

    /// Is this set of competitors a valid trio for the category?
    ///
    /// Checks size and distinctness, the trio sums and the female-only rule.
    /// Individual age bounds are left to [`Self::competitor_eligible`].
    pub fn trio_valid(&self, members: &[&Competitor]) -> Eligibility {
        let mut violations = Vec::new();

        if members.len() != TRIO_SIZE {
            violations.push(Violation::TrioSize {
                found: members.len(),
            });
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in members {
            if !seen.insert(member.id) {
                violations.push(Violation::DuplicateMember {
                    competitor: member.id,
                });
            }
        }

        let totals = TrioTotals::of(members, self.on);
        let bounds = &self.category.bounds;
        if let Some(max) = bounds.max_trio_handicap
            && totals.handicap_total > max
        {
            violations.push(Violation::HandicapSumExceeded {
                total: totals.handicap_total,
                max,
            });
        }
        if let Some(max) = bounds.max_trio_age
            && totals.age_total > max
        {
            violations.push(Violation::AgeSumExceeded {
                total: totals.age_total,
                max,
            });
        }
        if self.category.is_female_only() {
            for member in members.iter().filter(|m| m.sex != Sex::Female) {
                violations.push(Violation::FemaleOnly {
                    competitor: member.id,
                });
            }
        }

        Eligibility { violations }
    }

    /// Individual checks for every member plus the trio checks
    pub fn trio_fully_eligible(&self, members: &[&Competitor]) -> Eligibility {
        let mut violations: Vec<Violation> = members
            .iter()
            .flat_map(|m| self.competitor_eligible(m).violations)
            .filter(|v| !matches!(v, Violation::FemaleOnly { .. }))
            .collect();
        violations.extend(self.trio_valid(members).violations);
        Eligibility { violations }
    }
}
