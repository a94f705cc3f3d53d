/// Points and ranks from replayed round robins.
///
/// A pairing awards 3/0 to the side with the larger count, 1/1 on a level
/// count. Totals sum every off-diagonal pairing in both roles; ranks use
/// competition ranking (1 + number of entities with strictly more points),
/// so tied entities share a rank and the next rank is skipped.
use rayon::prelude::*;

use crate::constants::{POINTS_DRAW, POINTS_LOSS, POINTS_WIN};
use crate::posterior::{hpd_interval, mean};
use crate::replay::ReplayTable;
use crate::types::Interval;

/// (home points, away points) for a signed home-minus-away differential.
pub fn award_points(differential: i64) -> (u32, u32) {
    match differential.signum() {
        1 => (POINTS_WIN, POINTS_LOSS),
        0 => (POINTS_DRAW, POINTS_DRAW),
        _ => (POINTS_LOSS, POINTS_WIN),
    }
}

/// Total points per entity. The diagonal is never read.
pub fn points_from_table(table: &ReplayTable) -> Vec<u32> {
    let mut points = vec![0u32; table.n_entities()];
    for (home, away) in table.pairings() {
        if let Some(diff) = table.differential(home, away) {
            let (h, a) = award_points(diff);
            points[home] += h;
            points[away] += a;
        }
    }
    points
}

/// Competition ranks, 1 = best.
pub fn ranks(points: &[u32]) -> Vec<usize> {
    points
        .iter()
        .map(|&p| 1 + points.iter().filter(|&&q| q > p).count())
        .collect()
}

/// Across-draw distributions of points and ranks, one vector per entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StandingsDistribution {
    n_entities: usize,
    /// points[entity][draw]
    points: Vec<Vec<u32>>,
    /// ranks[entity][draw]
    ranks: Vec<Vec<usize>>,
}

impl StandingsDistribution {
    pub fn from_tables(tables: &[ReplayTable]) -> Self {
        let n_entities = tables.first().map_or(0, |t| t.n_entities());
        let per_draw: Vec<(Vec<u32>, Vec<usize>)> = tables
            .par_iter()
            .map(|t| {
                let p = points_from_table(t);
                let r = ranks(&p);
                (p, r)
            })
            .collect();

        let mut points = vec![Vec::with_capacity(tables.len()); n_entities];
        let mut rank_draws = vec![Vec::with_capacity(tables.len()); n_entities];
        for (p, r) in per_draw {
            for e in 0..n_entities {
                points[e].push(p[e]);
                rank_draws[e].push(r[e]);
            }
        }
        StandingsDistribution { n_entities, points, ranks: rank_draws }
    }

    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    pub fn n_draws(&self) -> usize {
        self.points.first().map_or(0, |p| p.len())
    }

    pub fn points(&self, entity: usize) -> &[u32] {
        &self.points[entity]
    }

    pub fn ranks(&self, entity: usize) -> &[usize] {
        &self.ranks[entity]
    }

    pub fn mean_points(&self, entity: usize) -> f64 {
        mean(&points_f64(&self.points[entity]))
    }

    pub fn points_hpd(&self, entity: usize, mass: f64) -> Interval {
        hpd_interval(&points_f64(&self.points[entity]), mass)
    }

    pub fn mean_rank(&self, entity: usize) -> f64 {
        mean(&ranks_f64(&self.ranks[entity]))
    }

    pub fn rank_hpd(&self, entity: usize, mass: f64) -> Interval {
        hpd_interval(&ranks_f64(&self.ranks[entity]), mass)
    }

    /// P(rank = r) for r = 1..=K, indexed from 0.
    pub fn rank_probabilities(&self, entity: usize) -> Vec<f64> {
        let mut counts = vec![0usize; self.n_entities];
        for &r in &self.ranks[entity] {
            counts[r - 1] += 1;
        }
        let n = self.ranks[entity].len().max(1) as f64;
        counts.into_iter().map(|c| c as f64 / n).collect()
    }
}

fn points_f64(values: &[u32]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

fn ranks_f64(values: &[usize]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreModel;
    use crate::poisson::PoissonModel;
    use crate::replay::{replay_rng, simulate_round_robin};
    use proptest::prelude::*;

    #[test]
    fn test_level_count_awards_one_point_each() {
        assert_eq!(award_points(0), (1, 1));
        assert_eq!(award_points(2), (3, 0));
        assert_eq!(award_points(-1), (0, 3));
    }

    #[test]
    fn test_competition_ranking_with_ties() {
        assert_eq!(ranks(&[9, 12, 9, 3]), vec![2, 1, 2, 4]);
        assert_eq!(ranks(&[4, 4, 4]), vec![1, 1, 1]);
    }

    fn replayed(seed: u64, draws: usize) -> Vec<ReplayTable> {
        let model = PoissonModel::new(4).unwrap();
        let mut free = vec![0.0; model.layout().n_free()];
        free[0] = 0.3;
        let full = model.layout().expand(&free);
        (0..draws)
            .map(|i| simulate_round_robin(&model, &full, &mut replay_rng(seed, i)).unwrap())
            .collect()
    }

    #[test]
    fn test_diagonal_never_contributes() {
        for table in replayed(3, 20) {
            let points = points_from_table(&table);
            // 12 pairings, each worth 2 or 3 points in total.
            let total: u32 = points.iter().sum();
            assert!((24..=36).contains(&total), "total {total}");

            let mut expected = vec![0u32; 4];
            for h in 0..4 {
                for a in 0..4 {
                    if h == a {
                        continue;
                    }
                    let diff = table.home_count(h, a) as i64 - table.away_count(h, a) as i64;
                    let (ph, pa) = award_points(diff);
                    expected[h] += ph;
                    expected[a] += pa;
                }
            }
            assert_eq!(points, expected);
        }
    }

    #[test]
    fn test_distribution_summaries() {
        let tables = replayed(8, 200);
        let dist = StandingsDistribution::from_tables(&tables);
        assert_eq!(dist.n_entities(), 4);
        assert_eq!(dist.n_draws(), 200);

        for e in 0..4 {
            let probs = dist.rank_probabilities(e);
            assert_eq!(probs.len(), 4);
            assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            let hpd = dist.points_hpd(e, 0.9);
            assert!(hpd.lower <= dist.mean_points(e) && dist.mean_points(e) <= hpd.upper);
            assert!(dist.mean_rank(e) >= 1.0 && dist.mean_rank(e) <= 4.0);
        }
    }

    proptest! {
        #[test]
        fn test_points_are_exhaustive_and_sum_to_two_or_three(diff in -50i64..50) {
            let (h, a) = award_points(diff);
            prop_assert!(h + a == 2 || h + a == 3);
            prop_assert_eq!(award_points(diff), (h, a));
            prop_assert_eq!(award_points(-diff), (a, h));
        }

        #[test]
        fn test_rank_monotone_in_points(points in prop::collection::vec(0u32..40, 2..12)) {
            let r = ranks(&points);
            for i in 0..points.len() {
                prop_assert!(r[i] >= 1 && r[i] <= points.len());
                for j in 0..points.len() {
                    if points[i] > points[j] {
                        prop_assert!(r[i] < r[j]);
                    }
                    if points[i] == points[j] {
                        prop_assert_eq!(r[i], r[j]);
                    }
                }
            }
        }
    }
}
