//! CONTEP circuit points and prize splits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregator::TrioStanding;
use crate::roster::{ScoringScheme, TRIO_SIZE};
use crate::trio::TrioId;

/// Last placement that earns circuit points
pub const SCORED_PLACEMENTS: u32 = 10;

/// Organizer discount applied to prizes, in percent
pub fn default_discount() -> Decimal {
    Decimal::from(5)
}

/// Circuit points for a final placement: 10 for first down to 1 for tenth
pub fn placement_points(placement: u32) -> u32 {
    match placement {
        1..=SCORED_PLACEMENTS => SCORED_PLACEMENTS + 1 - placement,
        _ => 0,
    }
}

/// One point per hundred of prize money
pub fn prize_points(prize: Decimal) -> Decimal {
    (prize / Decimal::ONE_HUNDRED).round_dp(2)
}

/// A prize after the organizer discount, split among the trio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSplit {
    pub gross: Decimal,
    pub discount_percent: Decimal,
    pub net: Decimal,
    pub per_member: Decimal,
}

impl PrizeSplit {
    pub fn new(gross: Decimal, discount_percent: Decimal) -> Self {
        let net = (gross * (Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED)).round_dp(2);
        Self {
            gross,
            discount_percent,
            net,
            per_member: (net / Decimal::from(TRIO_SIZE)).round_dp(2),
        }
    }

    pub fn with_default_discount(gross: Decimal) -> Self {
        Self::new(gross, default_discount())
    }
}

/// Circuit score of one trio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContepScore {
    pub trio_id: TrioId,
    pub placement: u32,
    pub placement_points: u32,
    pub prize_points: Decimal,
    /// What the scheme counts
    pub total: Decimal,
}

impl ContepScore {
    pub fn new(trio_id: TrioId, scheme: ScoringScheme, placement: u32, prize: Decimal) -> Self {
        let by_placement = placement_points(placement);
        let by_prize = prize_points(prize);
        let total = match scheme {
            ScoringScheme::Contep => Decimal::from(by_placement),
            ScoringScheme::Premiacao => by_prize,
            ScoringScheme::Misto => Decimal::from(by_placement) + by_prize,
        };

        Self {
            trio_id,
            placement,
            placement_points: by_placement,
            prize_points: by_prize,
            total,
        }
    }
}

/// Score every standing by its position. `prize_of` gives the gross prize
/// a trio won, if any.
pub fn score_standings(
    standings: &[TrioStanding],
    scheme: ScoringScheme,
    prize_of: impl Fn(TrioId) -> Option<Decimal>,
) -> Vec<ContepScore> {
    standings
        .iter()
        .map(|s| {
            let prize = prize_of(s.trio_id).unwrap_or(Decimal::ZERO);
            ContepScore::new(s.trio_id, scheme, s.position, prize)
        })
        .collect()
}
