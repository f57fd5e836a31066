//! Points and placement computation.

use rust_decimal::Decimal;

use super::models::{Passada, PassadaId};

/// Points for a run over the limit
pub fn over_limit_points() -> Decimal {
    Decimal::new(2500, 2)
}

/// Points for a realized time against a limit.
///
/// Within the limit: `100 - (time / limit) * 50`, rounded to 2 decimals.
/// Over the limit: a flat 25.00.
pub fn points_for(time: Decimal, limit: Decimal) -> Decimal {
    if limit <= Decimal::ZERO || time > limit {
        return over_limit_points();
    }
    (Decimal::ONE_HUNDRED - time / limit * Decimal::from(50)).round_dp(2)
}

/// Placement of `target` among `peers`: one plus the number of ranked peers
/// with a strictly lower time. `None` when the target itself is not ranked.
///
/// A recorded time of zero is a real result worth 100 points and is
/// placed like any other time.
pub fn placement_among(target: &Passada, peers: &[Passada]) -> Option<u32> {
    let time = target.time.filter(|_| target.is_ranked())?;
    let faster = peers
        .iter()
        .filter(|p| p.id != target.id && p.is_ranked())
        .filter(|p| p.time.is_some_and(|t| t < time))
        .count();
    Some(faster as u32 + 1)
}

/// Re-rank a comparison group in place.
///
/// Ranked runs are ordered by time and numbered 1..n; equal times keep
/// their current slice order. Every other run loses its placement.
/// Returns how many runs changed placement.
pub fn rerank(group: &mut [Passada]) -> usize {
    let mut ranked: Vec<(usize, Decimal)> = group
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_ranked())
        .filter_map(|(i, p)| p.time.map(|t| (i, t)))
        .collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1));

    let mut placements = vec![None; group.len()];
    for (position, (index, _)) in ranked.iter().enumerate() {
        placements[*index] = Some(position as u32 + 1);
    }

    let mut changed = 0;
    for (passada, placement) in group.iter_mut().zip(placements) {
        if passada.placement != placement {
            passada.placement = placement;
            changed += 1;
        }
    }
    changed
}

/// Re-rank every comparison group found in `runs`.
///
/// Groups are ranked in id order. Returns the ids of runs whose placement
/// changed.
pub fn rerank_all(runs: &mut [Passada]) -> Vec<PassadaId> {
    runs.sort_by_key(|p| (p.key(), p.id));

    let mut changed = Vec::new();
    for group in runs.chunk_by_mut(|a, b| a.key() == b.key()) {
        let before: Vec<Option<u32>> = group.iter().map(|p| p.placement).collect();
        rerank(group);
        changed.extend(
            group
                .iter()
                .zip(before)
                .filter(|(p, old)| p.placement != *old)
                .map(|(p, _)| p.id),
        );
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passada::models::PassadaStatus;
    use chrono::Utc;

    fn executed(id: i64, time: i64) -> Passada {
        Passada {
            id,
            trio_id: id,
            event_id: 1,
            category_id: 1,
            run_number: 1,
            animal_number: None,
            time: Some(Decimal::from(time)),
            time_limit: Decimal::from(60),
            status: PassadaStatus::Executed,
            points: points_for(Decimal::from(time), Decimal::from(60)),
            placement: None,
            sat: None,
            ran_at: None,
            notes: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_points_boundaries() {
        let limit = Decimal::from(60);
        assert_eq!(points_for(Decimal::ZERO, limit), Decimal::new(10000, 2));
        assert_eq!(points_for(limit, limit), Decimal::new(5000, 2));
        assert_eq!(points_for(Decimal::new(45, 0), limit), Decimal::new(625, 1));
        assert_eq!(
            points_for(limit * Decimal::new(10001, 4), limit),
            Decimal::new(2500, 2)
        );
    }

    #[test]
    fn test_points_round_to_two_places() {
        let points = points_for(Decimal::from(40), Decimal::from(60));
        assert_eq!(points, Decimal::new(6667, 2));
        assert_eq!(points.scale(), 2);
    }

    #[test]
    fn test_placement_counts_strictly_faster() {
        let target = executed(1, 50);
        let peers = vec![executed(2, 40), executed(3, 50), executed(4, 55)];
        assert_eq!(placement_among(&target, &peers), Some(2));

        let mut pending = executed(5, 30);
        pending.status = PassadaStatus::NoTime;
        assert_eq!(placement_among(&pending, &peers), None);
    }

    #[test]
    fn test_zero_time_is_placed() {
        let target = executed(1, 0);
        let peers = vec![executed(2, 40), executed(3, 0)];
        assert_eq!(placement_among(&target, &peers), Some(1));

        let mut group = vec![executed(2, 40), target];
        rerank(&mut group);
        assert_eq!(group[1].placement, Some(1));
        assert_eq!(group[1].points, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_rerank_skips_unranked_runs() {
        let mut sat = executed(3, 10);
        sat.status = PassadaStatus::Sat;
        sat.time = None;
        sat.placement = Some(1);

        let mut group = vec![executed(1, 50), executed(2, 45), sat, executed(4, 58)];
        let changed = rerank(&mut group);

        let placements: Vec<_> = group.iter().map(|p| p.placement).collect();
        assert_eq!(placements, vec![Some(2), Some(1), None, Some(3)]);
        assert_eq!(changed, 4);
        assert_eq!(rerank(&mut group), 0);
    }

    #[test]
    fn test_rerank_all_keeps_groups_apart() {
        let mut second_round = executed(5, 30);
        second_round.run_number = 2;
        let mut other_category = executed(6, 20);
        other_category.category_id = 9;
        let mut stale_sat = executed(7, 10);
        stale_sat.status = PassadaStatus::Sat;
        stale_sat.placement = Some(1);

        let mut runs = vec![
            executed(1, 50),
            second_round,
            executed(2, 40),
            other_category,
            stale_sat,
        ];
        let mut changed = rerank_all(&mut runs);
        changed.sort();
        assert_eq!(changed, vec![1, 2, 5, 6, 7]);

        let placement = |id| runs.iter().find(|p| p.id == id).unwrap().placement;
        assert_eq!(placement(1), Some(2));
        assert_eq!(placement(2), Some(1));
        assert_eq!(placement(5), Some(1));
        assert_eq!(placement(6), Some(1));
        assert_eq!(placement(7), None);
    }

    #[test]
    fn test_rerank_ties_follow_slice_order() {
        let mut group = vec![executed(7, 50), executed(3, 50)];
        rerank(&mut group);
        assert_eq!(group[0].placement, Some(1));
        assert_eq!(group[1].placement, Some(2));
    }
}
