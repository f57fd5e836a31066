//! Trio formation strategies.
//!
//! Each category draws with one strategy, chosen from its draw policy and
//! kind. Strategies only partition the pool they are given; eligibility
//! pre-filtering happens in the engine.

use enum_dispatch::enum_dispatch;
use rand::{
    RngCore,
    seq::{IndexedRandom, SliceRandom},
};

use super::{
    errors::{DrawError, DrawResult},
    models::{DrawKind, DrawSettings, Formation, TrioIds},
};
use crate::roster::{Category, CategoryKind, Competitor, CompetitorId, EligibilityRules, TRIO_SIZE};

/// Trio age sum used by age-bounded draws of categories without one
pub const DEFAULT_MAX_TRIO_AGE: u32 = 36;

/// Trait for trio formation strategies
#[enum_dispatch]
pub trait DrawStrategy {
    /// Which strategy this is
    fn kind(&self) -> DrawKind;

    /// Partition `pool` into trios
    fn form_trios(
        &self,
        pool: &[&Competitor],
        rules: &EligibilityRules<'_>,
        rng: &mut dyn RngCore,
    ) -> DrawResult<Formation>;
}

/// Shuffle once and slice into consecutive groups of three
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullDraw;

/// Sample a bounded number of competitors, then slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDraw {
    pub min_draw_size: usize,
    pub max_draw_size: usize,
}

/// Greedy first-fit packing of age-sorted competitors under an age sum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBoundedDraw {
    pub max_age_sum: u32,
    pub attempt_cap: usize,
}

/// Shuffle and scan, reshuffling the tail whenever a triple breaks the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDraw {
    pub iteration_cap: usize,
}

/// Strategy of a category
#[enum_dispatch(DrawStrategy)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    FullDraw,
    PartialDraw,
    AgeBoundedDraw,
    OpenDraw,
}

impl DrawMode {
    /// Pick the strategy for a category.
    ///
    /// The full-draw flag wins; otherwise kids and feminina sample, mirim
    /// packs by age and everything else uses the open draw.
    pub fn for_category(category: &Category, settings: &DrawSettings) -> DrawResult<Self> {
        if !category.draw.allowed {
            return Err(DrawError::DrawNotAllowed(category.name.clone()));
        }
        if category.draw.full_draw {
            return Ok(FullDraw.into());
        }

        let mode: DrawMode = match category.kind {
            CategoryKind::Kids | CategoryKind::Feminina => {
                category
                    .validate()
                    .map_err(|e| DrawError::InvalidPolicy(e.to_string()))?;
                PartialDraw {
                    min_draw_size: category.draw.min_draw_size,
                    max_draw_size: category.draw.max_draw_size,
                }
                .into()
            }
            CategoryKind::Mirim => AgeBoundedDraw {
                max_age_sum: category.bounds.max_trio_age.unwrap_or(DEFAULT_MAX_TRIO_AGE),
                attempt_cap: settings.age_draw_attempts,
            }
            .into(),
            CategoryKind::Baby
            | CategoryKind::Aberta
            | CategoryKind::Handicap
            | CategoryKind::Soma => OpenDraw {
                iteration_cap: settings.open_draw_iterations,
            }
            .into(),
        };
        Ok(mode)
    }
}

fn slice_into_trios(ids: &[CompetitorId]) -> (Vec<TrioIds>, Vec<CompetitorId>) {
    let chunks = ids.chunks_exact(TRIO_SIZE);
    let leftover = chunks.remainder().to_vec();
    let trios = chunks.map(|c| [c[0], c[1], c[2]]).collect();
    (trios, leftover)
}

impl DrawStrategy for FullDraw {
    fn kind(&self) -> DrawKind {
        DrawKind::Full
    }

    fn form_trios(
        &self,
        pool: &[&Competitor],
        _rules: &EligibilityRules<'_>,
        rng: &mut dyn RngCore,
    ) -> DrawResult<Formation> {
        let mut ids: Vec<CompetitorId> = pool.iter().map(|c| c.id).collect();
        ids.shuffle(rng);
        let (trios, leftover) = slice_into_trios(&ids);

        Ok(Formation {
            trios,
            leftover,
            iterations: 1,
            cap_reached: false,
        })
    }
}

impl PartialDraw {
    /// Competitors to draw from a pool of `available`: the pool size
    /// clamped to the policy bounds, rounded down to a multiple of three.
    pub fn draw_size(&self, available: usize) -> usize {
        let clamped = available.max(self.min_draw_size).min(self.max_draw_size);
        clamped / TRIO_SIZE * TRIO_SIZE
    }
}

impl DrawStrategy for PartialDraw {
    fn kind(&self) -> DrawKind {
        DrawKind::Partial
    }

    fn form_trios(
        &self,
        pool: &[&Competitor],
        _rules: &EligibilityRules<'_>,
        rng: &mut dyn RngCore,
    ) -> DrawResult<Formation> {
        let size = self.draw_size(pool.len());
        if size == 0 || size > pool.len() {
            return Err(DrawError::InsufficientCompetitors {
                needed: size.max(TRIO_SIZE),
                available: pool.len(),
            });
        }

        let ids: Vec<CompetitorId> = pool.iter().map(|c| c.id).collect();
        let mut drawn: Vec<CompetitorId> = ids.choose_multiple(rng, size).copied().collect();
        drawn.shuffle(rng);

        let (trios, _) = slice_into_trios(&drawn);
        let leftover = ids.into_iter().filter(|id| !drawn.contains(id)).collect();

        Ok(Formation {
            trios,
            leftover,
            iterations: 1,
            cap_reached: false,
        })
    }
}

impl DrawStrategy for AgeBoundedDraw {
    fn kind(&self) -> DrawKind {
        DrawKind::AgeBounded
    }

    fn form_trios(
        &self,
        pool: &[&Competitor],
        rules: &EligibilityRules<'_>,
        _rng: &mut dyn RngCore,
    ) -> DrawResult<Formation> {
        let on = rules.reference_date();
        let mut sorted: Vec<(&Competitor, u32)> = pool.iter().map(|c| (*c, c.age_on(on))).collect();
        sorted.sort_by_key(|(c, age)| (*age, c.id));

        let mut used = vec![false; sorted.len()];
        let mut formation = Formation::default();

        loop {
            if formation.iterations >= self.attempt_cap {
                formation.cap_reached = true;
                break;
            }
            formation.iterations += 1;

            let Some((i, j, k)) = self.first_fit(&sorted, &used, rules) else {
                break;
            };
            used[i] = true;
            used[j] = true;
            used[k] = true;
            formation
                .trios
                .push([sorted[i].0.id, sorted[j].0.id, sorted[k].0.id]);
        }

        formation.leftover = sorted
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|((c, _), _)| c.id)
            .collect();
        Ok(formation)
    }
}

impl AgeBoundedDraw {
    /// First unused triple i < j < k in age order within the age sum.
    ///
    /// Ages are ascending, so once a sum overflows no later k can fit.
    fn first_fit(
        &self,
        sorted: &[(&Competitor, u32)],
        used: &[bool],
        rules: &EligibilityRules<'_>,
    ) -> Option<(usize, usize, usize)> {
        let free: Vec<usize> = (0..sorted.len()).filter(|i| !used[*i]).collect();

        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate().skip(a + 1) {
                for &k in free.iter().skip(b + 1) {
                    let sum = sorted[i].1 + sorted[j].1 + sorted[k].1;
                    if sum > self.max_age_sum {
                        break;
                    }
                    if rules
                        .trio_valid(&[sorted[i].0, sorted[j].0, sorted[k].0])
                        .is_valid()
                    {
                        return Some((i, j, k));
                    }
                }
            }
        }
        None
    }
}

impl DrawStrategy for OpenDraw {
    fn kind(&self) -> DrawKind {
        DrawKind::Open
    }

    fn form_trios(
        &self,
        pool: &[&Competitor],
        rules: &EligibilityRules<'_>,
        rng: &mut dyn RngCore,
    ) -> DrawResult<Formation> {
        let mut order: Vec<&Competitor> = pool.to_vec();
        order.shuffle(rng);

        let mut formation = Formation::default();
        let mut position = 0;
        let mut retries = 0;

        while position + TRIO_SIZE <= order.len() {
            if formation.iterations >= self.iteration_cap {
                formation.cap_reached = true;
                break;
            }
            formation.iterations += 1;

            let candidate = &order[position..position + TRIO_SIZE];
            if rules.trio_valid(candidate).is_valid() {
                formation
                    .trios
                    .push([candidate[0].id, candidate[1].id, candidate[2].id]);
                position += TRIO_SIZE;
                retries = 0;
                continue;
            }

            retries += 1;
            if retries >= order.len() - position {
                // No luck with this competitor in front; leave them out.
                formation.leftover.push(order[position].id);
                position += 1;
                retries = 0;
            } else {
                order[position..].shuffle(rng);
            }
        }

        formation
            .leftover
            .extend(order[position..].iter().map(|c| c.id));
        Ok(formation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{Sex, TrioBounds};
    use chrono::NaiveDate;
    use rand::{SeedableRng, rngs::StdRng};
    use std::collections::HashSet;

    fn on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn competitor(id: i64, age: i32, handicap: u8) -> Competitor {
        let birth = NaiveDate::from_ymd_opt(2024 - age, 1, 1).unwrap();
        Competitor::new(id, format!("C{id}"), birth, handicap, Sex::Male).unwrap()
    }

    fn ids(formation: &Formation) -> Vec<CompetitorId> {
        let mut all: Vec<_> = formation.trios.iter().flatten().copied().collect();
        all.extend(&formation.leftover);
        all.sort();
        all
    }

    #[test]
    fn test_mode_selection() {
        let settings = DrawSettings::default();
        let mode = |kind| {
            DrawMode::for_category(&Category::preset(1, "x", kind), &settings)
                .unwrap()
                .kind()
        };
        assert_eq!(mode(CategoryKind::Baby), DrawKind::Full);
        assert_eq!(mode(CategoryKind::Kids), DrawKind::Partial);
        assert_eq!(mode(CategoryKind::Feminina), DrawKind::Partial);
        assert_eq!(mode(CategoryKind::Mirim), DrawKind::AgeBounded);
        assert_eq!(mode(CategoryKind::Aberta), DrawKind::Open);
        assert_eq!(mode(CategoryKind::Handicap), DrawKind::Open);

        let mut closed = Category::preset(1, "Closed", CategoryKind::Aberta);
        closed.draw.allowed = false;
        assert!(matches!(
            DrawMode::for_category(&closed, &settings),
            Err(DrawError::DrawNotAllowed(_))
        ));
    }

    #[test]
    fn test_full_draw_slices_everyone() {
        let category = Category::preset(1, "Baby", CategoryKind::Baby);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = (1..=7).map(|i| competitor(i, 8, 0)).collect();
        let refs: Vec<&Competitor> = pool.iter().collect();

        let formation = FullDraw
            .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(formation.trios.len(), 2);
        assert_eq!(formation.leftover.len(), 1);
        assert_eq!(ids(&formation), (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_partial_draw_size() {
        let draw = PartialDraw {
            min_draw_size: 3,
            max_draw_size: 9,
        };
        assert_eq!(draw.draw_size(2), 3);
        assert_eq!(draw.draw_size(5), 3);
        assert_eq!(draw.draw_size(7), 6);
        assert_eq!(draw.draw_size(20), 9);
    }

    #[test]
    fn test_partial_draw_caps_the_pool() {
        let category = Category::preset(1, "Kids", CategoryKind::Kids);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = (1..=14).map(|i| competitor(i, 15, 1)).collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = PartialDraw {
            min_draw_size: 3,
            max_draw_size: 9,
        };

        let formation = draw
            .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(formation.trios.len(), 3);
        assert_eq!(formation.leftover.len(), 5);
        assert_eq!(ids(&formation), (1..=14).collect::<Vec<_>>());
    }

    #[test]
    fn test_partial_draw_too_small() {
        let category = Category::preset(1, "Kids", CategoryKind::Kids);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = (1..=4).map(|i| competitor(i, 15, 1)).collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = PartialDraw {
            min_draw_size: 6,
            max_draw_size: 9,
        };

        let result = draw.form_trios(&refs, &rules, &mut StdRng::seed_from_u64(3));
        assert!(matches!(
            result,
            Err(DrawError::InsufficientCompetitors {
                needed: 6,
                available: 4
            })
        ));
    }

    #[test]
    fn test_age_bounded_first_fit() {
        let category = Category::preset(1, "Mirim", CategoryKind::Mirim);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = [10, 12, 14, 16, 20, 30]
            .iter()
            .enumerate()
            .map(|(i, age)| competitor(i as i64 + 1, *age, 1))
            .collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = AgeBoundedDraw {
            max_age_sum: 36,
            attempt_cap: 1000,
        };

        let formation = draw
            .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(formation.trios, vec![[1, 2, 3]]);
        assert_eq!(formation.leftover, vec![4, 5, 6]);
        assert!(!formation.cap_reached);
    }

    #[test]
    fn test_age_bounded_stops_at_cap() {
        let category = Category::preset(1, "Mirim", CategoryKind::Mirim);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = (1..=9).map(|i| competitor(i, 10, 1)).collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = AgeBoundedDraw {
            max_age_sum: 36,
            attempt_cap: 2,
        };

        let formation = draw
            .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(formation.trios.len(), 2);
        assert!(formation.cap_reached);
        assert_eq!(formation.leftover.len(), 3);
    }

    #[test]
    fn test_open_draw_respects_handicap_sum() {
        let category = Category {
            bounds: TrioBounds {
                max_trio_handicap: Some(11),
                ..TrioBounds::default()
            },
            ..Category::preset(1, "Handicap", CategoryKind::Handicap)
        };
        let rules = EligibilityRules::new(&category, on());
        let handicaps = [7, 7, 7, 1, 1, 1, 2, 2, 2, 3, 3, 3];
        let pool: Vec<Competitor> = handicaps
            .iter()
            .enumerate()
            .map(|(i, h)| competitor(i as i64 + 1, 30, *h))
            .collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = OpenDraw {
            iteration_cap: 5000,
        };

        for seed in 0..20 {
            let formation = draw
                .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            for trio in &formation.trios {
                let sum: u32 = trio
                    .iter()
                    .map(|id| u32::from(pool[*id as usize - 1].handicap))
                    .sum();
                assert!(sum <= 11, "seed {seed}: trio {trio:?} sums {sum}");
            }
            assert_eq!(ids(&formation), (1..=12).collect::<Vec<_>>());
            let members: HashSet<_> = formation.trios.iter().flatten().collect();
            assert_eq!(members.len(), formation.trios.len() * 3);
        }
    }

    #[test]
    fn test_open_draw_gives_up_on_impossible_pool() {
        let category = Category::preset(1, "Handicap", CategoryKind::Handicap);
        let rules = EligibilityRules::new(&category, on());
        let pool: Vec<Competitor> = (1..=6).map(|i| competitor(i, 30, 7)).collect();
        let refs: Vec<&Competitor> = pool.iter().collect();
        let draw = OpenDraw {
            iteration_cap: 5000,
        };

        let formation = draw
            .form_trios(&refs, &rules, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert!(formation.trios.is_empty());
        assert_eq!(formation.leftover.len(), 6);
        assert!(!formation.cap_reached);
    }
}
