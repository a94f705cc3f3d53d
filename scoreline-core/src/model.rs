/// Score models: the shared capability set of the two likelihood variants.
///
/// Both variants are log-linear in two rates per match (home role, away
/// role). They differ in which effects enter the rates and in the count
/// distribution. The sampler, the replay and DIC only talk to `ScoreModel`.
use rand::RngCore;
use rand_distr::{Distribution, Gamma, Poisson};
use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

use crate::error::{Result, ScorelineError};
use crate::layout::ParameterLayout;
use crate::negbin::NegBinModel;
use crate::poisson::PoissonModel;
use crate::schedule::Schedule;
use crate::types::MatchRecord;

/// Which likelihood to fit. Chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModelVariant {
    /// Attack/defense effects, Poisson counts.
    Poisson,
    /// Single strength per entity, negative-binomial counts.
    NegativeBinomial,
}

impl ModelVariant {
    pub fn build(self, n_entities: usize) -> Result<Box<dyn ScoreModel>> {
        Ok(match self {
            ModelVariant::Poisson => Box::new(PoissonModel::new(n_entities)?),
            ModelVariant::NegativeBinomial => Box::new(NegBinModel::new(n_entities)?),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelVariant::Poisson => "poisson",
            ModelVariant::NegativeBinomial => "negbin",
        }
    }
}

pub trait ScoreModel: Send + Sync {
    fn variant(&self) -> ModelVariant;

    fn n_entities(&self) -> usize;

    fn layout(&self) -> &ParameterLayout;

    /// Positions in the free vector, in the order the sampler visits them.
    fn update_order(&self) -> &[usize];

    /// (home-role rate, away-role rate) for `home` hosting `away`.
    fn rates(&self, params: &[f64], home: usize, away: usize) -> (f64, f64);

    fn match_log_likelihood(&self, params: &[f64], record: &MatchRecord) -> f64;

    /// Draw (home_count, away_count) from the same distribution the
    /// likelihood uses.
    fn simulate_match(
        &self,
        params: &[f64],
        home: usize,
        away: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(u32, u32)>;

    fn name(&self) -> &'static str {
        self.variant().name()
    }

    fn log_prior(&self, params: &[f64]) -> f64 {
        self.layout().log_prior(params)
    }

    fn log_likelihood(&self, params: &[f64], schedule: &Schedule) -> f64 {
        schedule
            .records()
            .iter()
            .map(|r| self.match_log_likelihood(params, r))
            .sum()
    }

    /// Unnormalised log posterior. Short-circuits when the prior rules the
    /// point out so callers never see NaN from an invalid dispersion.
    fn log_density(&self, params: &[f64], schedule: &Schedule) -> f64 {
        let prior = self.log_prior(params);
        if !prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        prior + self.log_likelihood(params, schedule)
    }

    fn deviance(&self, params: &[f64], schedule: &Schedule) -> f64 {
        -2.0 * self.log_likelihood(params, schedule)
    }

    /// Dispersed starting point (free coordinates only).
    fn initial_free(&self, rng: &mut dyn RngCore) -> Vec<f64> {
        self.layout().initial_free(rng)
    }
}

pub(crate) fn poisson_log_pmf(k: u32, lambda: f64) -> f64 {
    // A rate that underflowed to zero still puts all its mass on k = 0.
    if lambda == 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    if !(lambda.is_finite() && lambda > 0.0) {
        return f64::NEG_INFINITY;
    }
    if k == 0 {
        return -lambda;
    }
    k as f64 * lambda.ln() - lambda - ln_factorial(k as u64)
}

/// NB(r, p = r / (r + lambda)) counting failures: mean lambda, variance
/// lambda + lambda^2 / r.
pub(crate) fn negbin_log_pmf(k: u32, r: f64, lambda: f64) -> f64 {
    if lambda == 0.0 && r.is_finite() && r > 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    if !(r.is_finite() && r > 0.0 && lambda.is_finite() && lambda > 0.0) {
        return f64::NEG_INFINITY;
    }
    let k_f = k as f64;
    let log_p = (r / (r + lambda)).ln();
    let log_q = (lambda / (r + lambda)).ln();
    ln_gamma(k_f + r) - ln_gamma(r) - ln_factorial(k as u64) + r * log_p + k_f * log_q
}

pub(crate) fn sample_poisson(lambda: f64, rng: &mut dyn RngCore) -> Result<u32> {
    if lambda == 0.0 {
        return Ok(0);
    }
    let dist = Poisson::new(lambda)
        .map_err(|e| ScorelineError::Distribution(format!("Poisson({lambda}): {e}")))?;
    let draw: f64 = dist.sample(rng);
    Ok(draw as u32)
}

/// Gamma-Poisson mixture: rate ~ Gamma(shape r, scale lambda / r).
pub(crate) fn sample_negbin(r: f64, lambda: f64, rng: &mut dyn RngCore) -> Result<u32> {
    let gamma = Gamma::new(r, lambda / r)
        .map_err(|e| ScorelineError::Distribution(format!("Gamma({r}, {}): {e}", lambda / r)))?;
    let rate: f64 = gamma.sample(rng);
    if rate <= 0.0 {
        return Ok(0);
    }
    sample_poisson(rate, rng)
}
