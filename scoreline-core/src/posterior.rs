/// Posterior sample set: retained draws of every completed chain.
///
/// Draws are full parameter vectors (derived coordinates included), so any
/// consumer can index them by parameter name without knowing the layout.
use crate::error::{Result, ScorelineError};
use crate::model::ModelVariant;
use crate::types::Interval;

/// Retained draws and run statistics of one completed chain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainDraws {
    pub chain: usize,
    /// Random stream the chain drew from (the chain index under the run seed).
    pub stream: u64,
    /// Retained full parameter vectors, in iteration order.
    pub draws: Vec<Vec<f64>>,
    /// Iterations (0-based, burn-in included) where every proposal had a
    /// non-finite log density.
    pub stalled_iterations: Vec<usize>,
    /// Acceptance rate per parameter over all iterations. `None` for derived
    /// coordinates, which are never proposed.
    pub acceptance_rates: Vec<Option<f64>>,
    /// Iterations run, burn-in included.
    pub iterations: usize,
}

impl ChainDraws {
    pub fn stalled_fraction(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.stalled_iterations.len() as f64 / self.iterations as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosteriorSampleSet {
    variant: ModelVariant,
    param_names: Vec<String>,
    chains: Vec<ChainDraws>,
}

impl PosteriorSampleSet {
    pub fn new(variant: ModelVariant, param_names: Vec<String>, chains: Vec<ChainDraws>) -> Result<Self> {
        for c in &chains {
            if let Some(bad) = c.draws.iter().find(|d| d.len() != param_names.len()) {
                return Err(ScorelineError::InvalidConfig(format!(
                    "chain {}: draw has {} coordinates, expected {}",
                    c.chain,
                    bad.len(),
                    param_names.len()
                )));
            }
        }
        Ok(PosteriorSampleSet { variant, param_names, chains })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    pub fn chains(&self) -> &[ChainDraws] {
        &self.chains
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Retained draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|c| c.draws.len()).sum()
    }

    /// Every draw, chain 0 first.
    pub fn draws(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.chains.iter().flat_map(|c| c.draws.iter().map(|d| d.as_slice()))
    }

    /// Draw by pooled index (chain-major).
    pub fn draw(&self, mut index: usize) -> Option<&[f64]> {
        for c in &self.chains {
            if index < c.draws.len() {
                return Some(&c.draws[index]);
            }
            index -= c.draws.len();
        }
        None
    }

    /// Trace of one parameter in one chain.
    pub fn chain_trace(&self, name: &str, chain: usize) -> Option<Vec<f64>> {
        let idx = self.index_of(name)?;
        let c = self.chains.get(chain)?;
        Some(c.draws.iter().map(|d| d[idx]).collect())
    }

    /// Per-chain traces of one parameter.
    pub fn traces(&self, name: &str) -> Option<Vec<Vec<f64>>> {
        let idx = self.index_of(name)?;
        Some(self.traces_at(idx))
    }

    pub(crate) fn traces_at(&self, idx: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.draws.iter().map(|d| d[idx]).collect())
            .collect()
    }

    /// Chains concatenated in order.
    pub fn pooled(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.index_of(name)?;
        Some(self.draws().map(|d| d[idx]).collect())
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        self.pooled(name).map(|v| mean(&v))
    }

    pub fn hpd(&self, name: &str, mass: f64) -> Option<Interval> {
        self.pooled(name).map(|v| hpd_interval(&v, mass))
    }

    /// Componentwise posterior mean of the full vector.
    pub fn mean_vector(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.param_names.len()];
        let mut n = 0usize;
        for d in self.draws() {
            for (s, v) in sums.iter_mut().zip(d) {
                *s += v;
            }
            n += 1;
        }
        if n > 0 {
            for s in &mut sums {
                *s /= n as f64;
            }
        }
        sums
    }

    pub fn stalled_iterations(&self) -> usize {
        self.chains.iter().map(|c| c.stalled_iterations.len()).sum()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance; zero for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64
}

/// Shortest interval holding `mass` of the sample.
pub fn hpd_interval(values: &[f64], mass: f64) -> Interval {
    if values.is_empty() {
        return Interval { lower: f64::NAN, upper: f64::NAN };
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let keep = ((mass.clamp(0.0, 1.0) * n as f64).ceil() as usize).clamp(1, n);

    let mut best = (sorted[0], sorted[keep - 1]);
    for start in 1..=(n - keep) {
        let lo = sorted[start];
        let hi = sorted[start + keep - 1];
        if hi - lo < best.1 - best.0 {
            best = (lo, hi);
        }
    }
    Interval { lower: best.0, upper: best.1 }
}
