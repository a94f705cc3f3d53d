/// Posterior-predictive replay of a full round robin.
///
/// Every ordered pair (i, j) is simulated from one draw, i hosting j,
/// including i == j. The diagonal comes out of the full Cartesian product and
/// has no meaning; `ReplayTable::differential` refuses to report it and the
/// standings never read it.
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::constants::REPLAY_STREAM_TAG;
use crate::error::{Result, ScorelineError};
use crate::model::ScoreModel;
use crate::posterior::PosteriorSampleSet;

/// Simulated counts of one replayed round robin, row = home entity,
/// column = away entity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplayTable {
    n_entities: usize,
    home_counts: Vec<u32>,
    away_counts: Vec<u32>,
}

impl ReplayTable {
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Home-role count when `home` hosts `away`. Diagonal included.
    pub fn home_count(&self, home: usize, away: usize) -> u32 {
        self.home_counts[home * self.n_entities + away]
    }

    /// Away-role count when `home` hosts `away`. Diagonal included.
    pub fn away_count(&self, home: usize, away: usize) -> u32 {
        self.away_counts[home * self.n_entities + away]
    }

    /// Signed home-minus-away count, `None` on the diagonal.
    pub fn differential(&self, home: usize, away: usize) -> Option<i64> {
        if home == away {
            return None;
        }
        Some(self.home_count(home, away) as i64 - self.away_count(home, away) as i64)
    }

    /// Off-diagonal pairings, (home, away) in row-major order.
    pub fn pairings(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let k = self.n_entities;
        (0..k).flat_map(move |h| (0..k).filter(move |&a| a != h).map(move |a| (h, a)))
    }
}

/// Simulate every ordered pairing of `model`'s entities from one full
/// parameter vector.
pub fn simulate_round_robin(model: &dyn ScoreModel, draw: &[f64], rng: &mut dyn RngCore) -> Result<ReplayTable> {
    let k = model.n_entities();
    let mut home_counts = Vec::with_capacity(k * k);
    let mut away_counts = Vec::with_capacity(k * k);
    for home in 0..k {
        for away in 0..k {
            let (h, a) = model.simulate_match(draw, home, away, rng)?;
            home_counts.push(h);
            away_counts.push(a);
        }
    }
    Ok(ReplayTable { n_entities: k, home_counts, away_counts })
}

/// Random stream for replaying draw `draw_index`. Tagged apart from the MCMC
/// chain streams, so equal seeds never replay a chain's own random numbers.
pub fn replay_rng(replay_seed: u64, draw_index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(replay_seed);
    rng.set_stream(REPLAY_STREAM_TAG | draw_index as u64);
    rng
}

/// Replay the round robin once per retained draw, in pooled draw order.
pub fn replay_all(model: &dyn ScoreModel, set: &PosteriorSampleSet, replay_seed: u64) -> Result<Vec<ReplayTable>> {
    let draws: Vec<&[f64]> = set.draws().collect();
    debug!(draws = draws.len(), entities = model.n_entities(), "replaying round robin");
    draws
        .par_iter()
        .enumerate()
        .map(|(i, draw)| {
            let mut rng = replay_rng(replay_seed, i);
            simulate_round_robin(model, draw, &mut rng)
        })
        .collect()
}

/// Outcome probabilities of one fixture under the posterior predictive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixturePrediction {
    pub home: usize,
    pub away: usize,
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub mean_home_count: f64,
    pub mean_away_count: f64,
}

/// Simulate `home` hosting `away` once per retained draw.
pub fn predict_fixture(
    model: &dyn ScoreModel,
    set: &PosteriorSampleSet,
    home: usize,
    away: usize,
    replay_seed: u64,
) -> Result<FixturePrediction> {
    let k = model.n_entities();
    if home >= k || away >= k {
        return Err(ScorelineError::InvalidRecord(format!(
            "fixture ({home}, {away}) out of range for {k} entities"
        )));
    }
    if home == away {
        return Err(ScorelineError::InvalidRecord(format!("entity {home} cannot host itself")));
    }
    let n = set.total_draws();
    if n == 0 {
        return Err(ScorelineError::InsufficientData { required: 1, available: 0 });
    }

    let draws: Vec<&[f64]> = set.draws().collect();
    let outcomes: Vec<(u32, u32)> = draws
        .par_iter()
        .enumerate()
        .map(|(i, draw)| {
            let mut rng = replay_rng(replay_seed, i);
            model.simulate_match(draw, home, away, &mut rng)
        })
        .collect::<Result<_>>()?;

    let (mut wins, mut draws_count, mut losses) = (0usize, 0usize, 0usize);
    let (mut home_total, mut away_total) = (0u64, 0u64);
    for &(h, a) in &outcomes {
        match h.cmp(&a) {
            std::cmp::Ordering::Greater => wins += 1,
            std::cmp::Ordering::Equal => draws_count += 1,
            std::cmp::Ordering::Less => losses += 1,
        }
        home_total += h as u64;
        away_total += a as u64;
    }
    let n = n as f64;
    Ok(FixturePrediction {
        home,
        away,
        home_win: wins as f64 / n,
        draw: draws_count as f64 / n,
        away_win: losses as f64 / n,
        mean_home_count: home_total as f64 / n,
        mean_away_count: away_total as f64 / n,
    })
}
