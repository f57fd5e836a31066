//! Copa dos Campeões seeding.
//!
//! Champions are spread across trios by handicap tier so that no trio
//! collects all the strong riders. Each trio takes the first unused
//! champion of tier 0, then tier 1 and so on until it has three members;
//! input order breaks ties within a tier.

use std::collections::HashSet;

use super::{
    errors::{DrawError, DrawResult},
    models::{ChampionSeed, SeedingOutcome, TrioIds},
};
use crate::roster::{CompetitorId, TRIO_SIZE};

/// Handicap tiers visited for every trio, in order
pub const SEED_TIER_ORDER: [u8; 7] = [0, 1, 2, 3, 4, 5, 7];

/// Most trios a seeding forms
pub const MAX_SEEDED_TRIOS: usize = 10;

/// Members of a seeded trio marked head of bracket
pub const HEADS_PER_TRIO: usize = 2;

/// Distribute champions into trios by handicap tier
pub fn seed_champions(seeds: &[ChampionSeed]) -> DrawResult<SeedingOutcome> {
    let mut seen = HashSet::with_capacity(seeds.len());
    let seeds: Vec<ChampionSeed> = seeds
        .iter()
        .filter(|s| seen.insert(s.competitor_id))
        .copied()
        .collect();

    if seeds.len() < TRIO_SIZE {
        return Err(DrawError::InsufficientCompetitors {
            needed: TRIO_SIZE,
            available: seeds.len(),
        });
    }

    let count = (seeds.len() / TRIO_SIZE).min(MAX_SEEDED_TRIOS);
    let mut used = vec![false; seeds.len()];
    let mut trios = Vec::with_capacity(count);

    for _ in 0..count {
        let mut members: Vec<CompetitorId> = Vec::with_capacity(TRIO_SIZE);

        for tier in SEED_TIER_ORDER {
            if members.len() == TRIO_SIZE {
                break;
            }
            if let Some(pos) = (0..seeds.len()).find(|&i| !used[i] && seeds[i].handicap == tier) {
                used[pos] = true;
                members.push(seeds[pos].competitor_id);
            }
        }

        while members.len() < TRIO_SIZE {
            let Some(pos) = used.iter().position(|u| !u) else {
                break;
            };
            used[pos] = true;
            members.push(seeds[pos].competitor_id);
        }

        let trio: TrioIds = [members[0], members[1], members[2]];
        trios.push(trio);
    }

    let leftover: Vec<CompetitorId> = seeds
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(s, _)| s.competitor_id)
        .collect();

    let message = format!(
        "{} seeded trios formed from {} champions, {} left over",
        trios.len(),
        seeds.len(),
        leftover.len()
    );

    Ok(SeedingOutcome {
        trios,
        leftover,
        message,
    })
}
