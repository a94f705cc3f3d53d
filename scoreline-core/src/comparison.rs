/// Model comparison: deviance information criterion and a sign test on a
/// scalar parameter via Bayes factor.
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::constants::EFFECT_PRIOR_VARIANCE;
use crate::error::{Result, ScorelineError};
use crate::model::ScoreModel;
use crate::posterior::{mean, PosteriorSampleSet};
use crate::schedule::Schedule;

/// DIC and its two components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InformationCriterion {
    /// Posterior mean of the deviance.
    pub mean_deviance: f64,
    /// Deviance at the posterior mean parameter vector.
    pub deviance_at_mean: f64,
    /// pD = mean_deviance - deviance_at_mean.
    pub effective_parameters: f64,
    /// mean_deviance + effective_parameters. Lower is preferred.
    pub dic: f64,
}

impl InformationCriterion {
    pub fn from_components(mean_deviance: f64, deviance_at_mean: f64) -> Self {
        let effective_parameters = mean_deviance - deviance_at_mean;
        InformationCriterion {
            mean_deviance,
            deviance_at_mean,
            effective_parameters,
            dic: mean_deviance + effective_parameters,
        }
    }

    /// Deviances of every retained draw, plus the deviance at the
    /// componentwise posterior mean.
    pub fn dic(model: &dyn ScoreModel, set: &PosteriorSampleSet, schedule: &Schedule) -> Result<Self> {
        if set.total_draws() == 0 {
            return Err(ScorelineError::InsufficientData { required: 1, available: 0 });
        }
        let draws: Vec<&[f64]> = set.draws().collect();
        let deviances: Vec<f64> = draws.par_iter().map(|d| model.deviance(d, schedule)).collect();
        let mean_deviance = mean(&deviances);
        let deviance_at_mean = model.deviance(&set.mean_vector(), schedule);
        if !(mean_deviance.is_finite() && deviance_at_mean.is_finite()) {
            return Err(ScorelineError::Distribution(format!(
                "{} deviance is not finite (mean {mean_deviance}, at mean {deviance_at_mean})",
                model.name()
            )));
        }
        let ic = Self::from_components(mean_deviance, deviance_at_mean);
        debug!(model = model.name(), dic = ic.dic, p_d = ic.effective_parameters, "computed DIC");
        Ok(ic)
    }
}

/// One candidate in a DIC comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonRow {
    pub model: String,
    pub criterion: InformationCriterion,
    /// DIC minus the best DIC; zero for the preferred model.
    pub delta: f64,
}

/// Order candidates by DIC, best first.
pub fn compare<S: AsRef<str>>(candidates: &[(S, InformationCriterion)]) -> Vec<ComparisonRow> {
    let best = candidates
        .iter()
        .map(|(_, ic)| ic.dic)
        .fold(f64::INFINITY, f64::min);
    let mut rows: Vec<ComparisonRow> = candidates
        .iter()
        .map(|(name, ic)| ComparisonRow {
            model: name.as_ref().to_string(),
            criterion: *ic,
            delta: ic.dic - best,
        })
        .collect();
    rows.sort_by(|a, b| a.criterion.dic.total_cmp(&b.criterion.dic));
    rows
}

/// Marginal distribution of the tested parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marginal<'a> {
    Normal { mean: f64, variance: f64 },
    /// Draws from a marginal of unknown form.
    Draws(&'a [f64]),
}

impl Marginal<'_> {
    /// Odds of {x >= 0} against {x < 0}.
    fn nonnegative_odds(&self) -> Result<f64> {
        match *self {
            Marginal::Normal { mean, variance } => {
                if !(variance.is_finite() && variance > 0.0) {
                    return Err(ScorelineError::Distribution(format!(
                        "normal marginal needs a positive variance, got {variance}"
                    )));
                }
                let normal = Normal::new(mean, variance.sqrt())
                    .map_err(|e| ScorelineError::Distribution(format!("Normal({mean}, {variance}): {e}")))?;
                let below = normal.cdf(0.0);
                Ok((1.0 - below) / below)
            }
            Marginal::Draws(draws) => {
                if draws.is_empty() {
                    return Err(ScorelineError::InsufficientData { required: 1, available: 0 });
                }
                let nonnegative = draws.iter().filter(|&&x| x >= 0.0).count();
                let negative = draws.len() - nonnegative;
                // +0.5 keeps the odds finite when every draw falls on one side.
                Ok((nonnegative as f64 + 0.5) / (negative as f64 + 0.5))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BayesFactorMethod {
    /// Normal tail probabilities for both prior and posterior.
    ClosedForm,
    /// Posterior odds counted from draws.
    Empirical,
}

/// Evidence for {x >= 0} over {x < 0}.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BayesFactor {
    pub prior_odds: f64,
    pub posterior_odds: f64,
    /// posterior_odds / prior_odds. Above 1 favours a nonnegative value.
    pub factor: f64,
    pub method: BayesFactorMethod,
}

impl BayesFactor {
    pub fn sign_test(prior: Marginal<'_>, posterior: Marginal<'_>) -> Result<Self> {
        let prior_odds = prior.nonnegative_odds()?;
        let posterior_odds = posterior.nonnegative_odds()?;
        let method = match (prior, posterior) {
            (Marginal::Normal { .. }, Marginal::Normal { .. }) => BayesFactorMethod::ClosedForm,
            _ => BayesFactorMethod::Empirical,
        };
        Ok(BayesFactor {
            prior_odds,
            posterior_odds,
            factor: posterior_odds / prior_odds,
            method,
        })
    }

    /// Sign test on the home advantage against its Normal prior. The
    /// posterior marginal is taken from the draws, not assumed Normal.
    pub fn home_advantage(set: &PosteriorSampleSet) -> Result<Self> {
        let draws = set
            .pooled("home")
            .ok_or_else(|| ScorelineError::InvalidConfig("model has no home parameter".to_string()))?;
        Self::sign_test(
            Marginal::Normal { mean: 0.0, variance: EFFECT_PRIOR_VARIANCE },
            Marginal::Draws(&draws),
        )
    }

    pub fn favours_nonnegative(&self) -> bool {
        self.factor > 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelVariant;
    use crate::poisson::PoissonModel;
    use crate::posterior::ChainDraws;
    use crate::types::MatchRecord;

    #[test]
    fn test_bayes_factor_closed_form() {
        let bf = BayesFactor::sign_test(
            Marginal::Normal { mean: 0.0, variance: 1.0e4 },
            Marginal::Normal { mean: 0.3, variance: 0.05 },
        )
        .unwrap();

        let p = Normal::new(0.0, 1.0).unwrap().cdf(0.3 / 0.05_f64.sqrt());
        let expected = p / (1.0 - p);
        assert_eq!(bf.method, BayesFactorMethod::ClosedForm);
        assert!((bf.prior_odds - 1.0).abs() < 1e-12);
        assert!((bf.factor - expected).abs() < 1e-9);
        assert!(bf.factor > 1.0);
        assert!(bf.favours_nonnegative());
    }

    #[test]
    fn test_bayes_factor_from_draws() {
        let draws: Vec<f64> = (0..100).map(|i| i as f64 / 100.0 - 0.1).collect();
        let bf = BayesFactor::sign_test(
            Marginal::Normal { mean: 0.0, variance: 1.0e4 },
            Marginal::Draws(&draws),
        )
        .unwrap();
        assert_eq!(bf.method, BayesFactorMethod::Empirical);
        assert!((bf.posterior_odds - 90.5 / 10.5).abs() < 1e-12);

        let all_positive = vec![0.2; 40];
        let bf = BayesFactor::sign_test(
            Marginal::Normal { mean: 0.0, variance: 1.0 },
            Marginal::Draws(&all_positive),
        )
        .unwrap();
        assert!(bf.factor.is_finite());
        assert!((bf.factor - 81.0).abs() < 1e-9);
    }

    #[test]
    fn test_bayes_factor_rejects_degenerate_inputs() {
        assert!(matches!(
            BayesFactor::sign_test(Marginal::Normal { mean: 0.0, variance: 0.0 }, Marginal::Draws(&[1.0])),
            Err(ScorelineError::Distribution(_))
        ));
        assert!(matches!(
            BayesFactor::sign_test(Marginal::Normal { mean: 0.0, variance: 1.0 }, Marginal::Draws(&[])),
            Err(ScorelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_dic_penalty_can_flip_ranking() {
        // A fits better but spends more parameters.
        let a = InformationCriterion::from_components(200.0, 180.0);
        let b = InformationCriterion::from_components(205.0, 202.0);
        assert_eq!(a.effective_parameters, 20.0);
        assert_eq!(b.effective_parameters, 3.0);
        assert_eq!(a.dic, 220.0);
        assert_eq!(b.dic, 208.0);
        assert!(a.mean_deviance < b.mean_deviance);

        let rows = compare(&[("poisson", a), ("negbin", b)]);
        assert_eq!(rows[0].model, "negbin");
        assert_eq!(rows[0].delta, 0.0);
        assert_eq!(rows[1].model, "poisson");
        assert_eq!(rows[1].delta, 12.0);
    }

    #[test]
    fn test_dic_of_point_mass_has_no_penalty() {
        let records = vec![
            MatchRecord { home: 0, away: 1, home_count: 2, away_count: 1 },
            MatchRecord { home: 1, away: 0, home_count: 0, away_count: 0 },
        ];
        let schedule = Schedule::new(2, records).unwrap();
        let model = PoissonModel::new(2).unwrap();
        let mut free = vec![0.0; model.layout().n_free()];
        free[0] = 0.2;
        let full = model.layout().expand(&free);
        let set = PosteriorSampleSet::new(
            ModelVariant::Poisson,
            model.layout().names().to_vec(),
            vec![ChainDraws {
                chain: 0,
                stream: 0,
                draws: vec![full.clone(); 5],
                stalled_iterations: vec![],
                acceptance_rates: vec![],
                iterations: 5,
            }],
        )
        .unwrap();

        let ic = InformationCriterion::dic(&model, &set, &schedule).unwrap();
        let expected = model.deviance(&full, &schedule);
        assert!((ic.mean_deviance - expected).abs() < 1e-9);
        assert!(ic.effective_parameters.abs() < 1e-9);
        assert!((ic.dic - expected).abs() < 1e-9);
    }
}
