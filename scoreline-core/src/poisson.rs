/// Equidispersed variant: attack and defense effects, Poisson counts.
///
/// log λ_home = mu + home + attack[home] + defense[away]
/// log λ_away = mu + attack[away] + defense[home]
use rand::RngCore;

use crate::constants::EFFECT_PRIOR_VARIANCE;
use crate::error::{Result, ScorelineError};
use crate::layout::{GroupSpec, ParameterLayout, Prior};
use crate::model::{poisson_log_pmf, sample_poisson, ModelVariant, ScoreModel};
use crate::types::MatchRecord;

const MU: usize = 0;
const HOME: usize = 1;
const ATTACK_START: usize = 2;

#[derive(Debug, Clone)]
pub struct PoissonModel {
    n_entities: usize,
    layout: ParameterLayout,
    update_order: Vec<usize>,
}

impl PoissonModel {
    pub fn new(n_entities: usize) -> Result<Self> {
        if n_entities < 2 {
            return Err(ScorelineError::InvalidConfig(format!(
                "need at least 2 entities, got {n_entities}"
            )));
        }
        let effect = Prior::Normal { mean: 0.0, variance: EFFECT_PRIOR_VARIANCE };
        let layout = ParameterLayout::new(&[
            GroupSpec::scalar("mu", effect),
            GroupSpec::scalar("home", effect),
            GroupSpec::entity_effect("attack", n_entities, effect),
            GroupSpec::entity_effect("defense", n_entities, effect),
        ])?;
        let update_order = layout.default_update_order();
        Ok(PoissonModel { n_entities, layout, update_order })
    }

    /// Replace the coordinate visiting order. Naming a derived coordinate is
    /// an identifiability violation.
    pub fn with_update_order<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        self.update_order = self.layout.resolve_update_order(names)?;
        Ok(self)
    }

    fn attack(&self, params: &[f64], entity: usize) -> f64 {
        params[ATTACK_START + entity]
    }

    fn defense(&self, params: &[f64], entity: usize) -> f64 {
        params[ATTACK_START + self.n_entities + entity]
    }
}

impl ScoreModel for PoissonModel {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Poisson
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
        let log_home = params[MU] + params[HOME] + self.attack(params, home) + self.defense(params, away);
        let log_away = params[MU] + self.attack(params, away) + self.defense(params, home);
        (log_home.exp(), log_away.exp())
    }

    fn match_log_likelihood(&self, params: &[f64], record: &MatchRecord) -> f64 {
        let (lambda_home, lambda_away) = self.rates(params, record.home, record.away);
        poisson_log_pmf(record.home_count, lambda_home) + poisson_log_pmf(record.away_count, lambda_away)
    }

    fn simulate_match(
        &self,
        params: &[f64],
        home: usize,
        away: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(u32, u32)> {
        let (lambda_home, lambda_away) = self.rates(params, home, away);
        Ok((sample_poisson(lambda_home, rng)?, sample_poisson(lambda_away, rng)?))
    }
}
