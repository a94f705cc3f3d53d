/// Overdispersed variant: one strength per entity, negative-binomial counts.
///
/// log λ_home = mu + home + strength[home] - strength[away]
/// log λ_away = mu + strength[away] - strength[home]
///
/// Home-role and away-role counts each get their own dispersion.
use rand::RngCore;

use crate::constants::{DISPERSION_PRIOR_UPPER, EFFECT_PRIOR_VARIANCE};
use crate::error::{Result, ScorelineError};
use crate::layout::{GroupSpec, ParameterLayout, Prior};
use crate::model::{negbin_log_pmf, sample_negbin, ModelVariant, ScoreModel};
use crate::types::MatchRecord;

const MU: usize = 0;
const HOME: usize = 1;
const STRENGTH_START: usize = 2;

#[derive(Debug, Clone)]
pub struct NegBinModel {
    n_entities: usize,
    layout: ParameterLayout,
    update_order: Vec<usize>,
}

impl NegBinModel {
    pub fn new(n_entities: usize) -> Result<Self> {
        if n_entities < 2 {
            return Err(ScorelineError::InvalidConfig(format!(
                "need at least 2 entities, got {n_entities}"
            )));
        }
        let effect = Prior::Normal { mean: 0.0, variance: EFFECT_PRIOR_VARIANCE };
        let dispersion = Prior::Uniform { lower: 0.0, upper: DISPERSION_PRIOR_UPPER };
        let layout = ParameterLayout::new(&[
            GroupSpec::scalar("mu", effect),
            GroupSpec::scalar("home", effect),
            GroupSpec::entity_effect("strength", n_entities, effect),
            GroupSpec::scalar("r_home", dispersion),
            GroupSpec::scalar("r_away", dispersion),
        ])?;
        let update_order = layout.default_update_order();
        Ok(NegBinModel { n_entities, layout, update_order })
    }

    /// Replace the coordinate visiting order. Naming a derived coordinate is
    /// an identifiability violation.
    pub fn with_update_order<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        self.update_order = self.layout.resolve_update_order(names)?;
        Ok(self)
    }

    fn strength(&self, params: &[f64], entity: usize) -> f64 {
        params[STRENGTH_START + entity]
    }

    fn dispersions(&self, params: &[f64]) -> (f64, f64) {
        let r_home = params[STRENGTH_START + self.n_entities];
        (r_home, params[STRENGTH_START + self.n_entities + 1])
    }
}

impl ScoreModel for NegBinModel {
    fn variant(&self) -> ModelVariant {
        ModelVariant::NegativeBinomial
    }

    fn n_entities(&self) -> usize {
        self.n_entities
    }

    fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    fn update_order(&self) -> &[usize] {
        &self.update_order
    }

    fn rates(&self, params: &[f64], home: usize, away: usize) -> (f64, f64) {
        let diff = self.strength(params, home) - self.strength(params, away);
        let log_home = params[MU] + params[HOME] + diff;
        let log_away = params[MU] - diff;
        (log_home.exp(), log_away.exp())
    }

    fn match_log_likelihood(&self, params: &[f64], record: &MatchRecord) -> f64 {
        let (lambda_home, lambda_away) = self.rates(params, record.home, record.away);
        let (r_home, r_away) = self.dispersions(params);
        negbin_log_pmf(record.home_count, r_home, lambda_home)
            + negbin_log_pmf(record.away_count, r_away, lambda_away)
    }

    fn simulate_match(
        &self,
        params: &[f64],
        home: usize,
        away: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(u32, u32)> {
        let (lambda_home, lambda_away) = self.rates(params, home, away);
        let (r_home, r_away) = self.dispersions(params);
        Ok((
            sample_negbin(r_home, lambda_home, rng)?,
            sample_negbin(r_away, lambda_away, rng)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;

    #[test]
    fn test_layout_names() {
        let model = NegBinModel::new(3).unwrap();
        assert_eq!(
            model.layout().names(),
            &["mu", "home", "strength[0]", "strength[1]", "strength[2]", "r_home", "r_away"]
        );
        assert!(model.layout().is_derived(4));
        assert_eq!(model.layout().n_free(), 6);
    }

    #[test]
    fn test_rates_are_mirrored() {
        let model = NegBinModel::new(2).unwrap();
        // mu, home, strength[0], r_home, r_away
        let params = model.layout().expand(&[0.1, 0.25, 0.4, 10.0, 10.0]);
        let (lh, la) = model.rates(&params, 0, 1);
        // strength[1] = -0.4, so the difference is 0.8
        assert!((lh.ln() - (0.1 + 0.25 + 0.8)).abs() < 1e-12);
        assert!((la.ln() - (0.1 - 0.8)).abs() < 1e-12);
    }

    #[test]
    fn test_dispersion_outside_prior_support_has_zero_density() {
        let model = NegBinModel::new(2).unwrap();
        let records = vec![MatchRecord { home: 0, away: 1, home_count: 1, away_count: 0 }];
        let schedule = Schedule::new(2, records).unwrap();
        let params = model.layout().expand(&[0.0, 0.0, 0.0, 60.0, 5.0]);
        assert_eq!(model.log_density(&params, &schedule), f64::NEG_INFINITY);
        let params = model.layout().expand(&[0.0, 0.0, 0.0, -1.0, 5.0]);
        assert_eq!(model.log_density(&params, &schedule), f64::NEG_INFINITY);
    }

    #[test]
    fn test_strength_sum_rejected_in_update_order() {
        let err = NegBinModel::new(2)
            .unwrap()
            .with_update_order(&["mu", "home", "strength[1]", "r_home", "r_away"])
            .unwrap_err();
        assert!(matches!(err, ScorelineError::Identifiability(_)));
    }
}
