//! Draw engine: filters the pool, runs the category's strategy and checks
//! what comes back.

use rand::RngCore;
use std::collections::HashSet;

use super::{
    errors::{DrawError, DrawResult},
    models::{DrawOutcome, DrawSettings, ExcludedCompetitor},
    strategy::{DrawMode, DrawStrategy},
};
use crate::roster::{Competitor, EligibilityRules, TRIO_SIZE};

/// Runs one draw for a category on a reference date
pub struct DrawEngine<'a> {
    rules: EligibilityRules<'a>,
    settings: DrawSettings,
}

impl<'a> DrawEngine<'a> {
    pub fn new(rules: EligibilityRules<'a>, settings: DrawSettings) -> Self {
        Self { rules, settings }
    }

    pub fn rules(&self) -> &EligibilityRules<'a> {
        &self.rules
    }

    /// Draw trios from `pool`.
    ///
    /// Duplicate ids count once. Competitors failing the category's
    /// individual rules are reported as excluded. Every returned trio
    /// satisfies the category's trio rules; a drawn trio that does not is
    /// broken up and its members are left over.
    pub fn run(&self, pool: &[Competitor], rng: &mut dyn RngCore) -> DrawResult<DrawOutcome> {
        let category = self.rules.category();
        let mode = DrawMode::for_category(category, &self.settings)?;

        let mut seen = HashSet::with_capacity(pool.len());
        let mut eligible = Vec::with_capacity(pool.len());
        let mut excluded = Vec::new();
        for competitor in pool.iter().filter(|c| seen.insert(c.id)) {
            let eligibility = self.rules.competitor_eligible(competitor);
            if eligibility.is_valid() {
                eligible.push(competitor);
            } else {
                excluded.push(ExcludedCompetitor {
                    competitor_id: competitor.id,
                    reasons: eligibility.reasons(),
                });
            }
        }

        if eligible.len() < TRIO_SIZE {
            return Err(DrawError::InsufficientCompetitors {
                needed: TRIO_SIZE,
                available: eligible.len(),
            });
        }

        let mut formation = mode.form_trios(&eligible, &self.rules, rng)?;

        // Strategies that ignore trio bounds can form a trio that breaks
        // them; its members go back to the leftover list.
        let mut rejected = Vec::new();
        formation.trios.retain(|trio| {
            let members: Vec<&Competitor> = trio
                .iter()
                .filter_map(|id| eligible.iter().find(|c| c.id == *id).copied())
                .collect();
            let eligibility = self.rules.trio_valid(&members);
            if eligibility.is_valid() {
                return true;
            }
            log::warn!(
                "Category {}: dropping drawn trio {:?}: {}",
                category.name,
                trio,
                eligibility.reasons().join("; ")
            );
            rejected.extend_from_slice(trio);
            false
        });
        formation.leftover.extend(rejected);

        let message = format!(
            "{}: {} trios formed from {} competitors, {} left over, {} excluded{}",
            mode.kind(),
            formation.trios.len(),
            eligible.len(),
            formation.leftover.len(),
            excluded.len(),
            if formation.cap_reached {
                " (iteration cap reached)"
            } else {
                ""
            }
        );
        log::debug!("Category {}: {}", category.name, message);

        Ok(DrawOutcome {
            kind: mode.kind(),
            trios: formation.trios,
            leftover: formation.leftover,
            excluded,
            iterations: formation.iterations,
            cap_reached: formation.cap_reached,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::DrawKind;
    use crate::roster::{Category, CategoryKind, Sex};
    use chrono::NaiveDate;
    use rand::{SeedableRng, rngs::StdRng};

    fn on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn competitor(id: i64, age: i32, sex: Sex) -> Competitor {
        let birth = NaiveDate::from_ymd_opt(2024 - age, 1, 1).unwrap();
        Competitor::new(id, format!("C{id}"), birth, 1, sex).unwrap()
    }

    #[test]
    fn test_excludes_ineligible_before_drawing() {
        let category = Category::preset(1, "Feminina", CategoryKind::Feminina);
        let rules = EligibilityRules::new(&category, on());
        let engine = DrawEngine::new(rules, DrawSettings::default());

        let mut pool: Vec<Competitor> = (1..=6).map(|i| competitor(i, 25, Sex::Female)).collect();
        pool.push(competitor(7, 25, Sex::Male));
        pool.push(competitor(3, 25, Sex::Female));

        let outcome = engine.run(&pool, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(outcome.kind, DrawKind::Partial);
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].competitor_id, 7);
        assert_eq!(outcome.trios.len(), 2);
        assert!(outcome.trios.iter().flatten().all(|id| *id != 7));
    }

    #[test]
    fn test_too_few_eligible() {
        let category = Category::preset(1, "Kids", CategoryKind::Kids);
        let engine = DrawEngine::new(EligibilityRules::new(&category, on()), DrawSettings::default());
        let pool = vec![
            competitor(1, 15, Sex::Male),
            competitor(2, 15, Sex::Male),
            competitor(3, 30, Sex::Male),
        ];

        let result = engine.run(&pool, &mut StdRng::seed_from_u64(5));
        assert!(matches!(
            result,
            Err(DrawError::InsufficientCompetitors {
                needed: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_full_draw_leaves_over_trios_breaking_bounds() {
        let mut category = Category::preset(1, "Baby", CategoryKind::Baby);
        category.bounds.max_trio_handicap = Some(2);
        let engine = DrawEngine::new(EligibilityRules::new(&category, on()), DrawSettings::default());
        let pool: Vec<Competitor> = (1..=7).map(|i| competitor(i, 8, Sex::Female)).collect();

        let outcome = engine.run(&pool, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(outcome.kind, DrawKind::Full);
        assert!(outcome.trios.is_empty());
        let mut leftover = outcome.leftover.clone();
        leftover.sort();
        assert_eq!(leftover, (1..=7).collect::<Vec<i64>>());
    }

    #[test]
    fn test_message_names_the_strategy() {
        let category = Category::preset(1, "Aberta", CategoryKind::Aberta);
        let engine = DrawEngine::new(EligibilityRules::new(&category, on()), DrawSettings::default());
        let pool: Vec<Competitor> = (1..=7).map(|i| competitor(i, 30, Sex::Male)).collect();

        let outcome = engine.run(&pool, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(outcome.trios.len(), 2);
        assert_eq!(outcome.leftover.len(), 1);
        assert!(outcome.message.starts_with("open draw: 2 trios"));
    }
}
