/// Multi-chain Metropolis-within-Gibbs sampler.
///
/// Every free coordinate gets one symmetric random-walk proposal per
/// iteration. No coordinate is assumed to have a closed-form conditional:
/// the log link and the negative-binomial likelihood rule that out.
///
/// Chains only share the immutable model and schedule. Each owns its free
/// coordinates, its proposal scales and a ChaCha8 stream selected by chain
/// index, so a run is reproducible from the top-level seed whether chains
/// execute in parallel or not.
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::constants::{
    ACCEPTANCE_BAND_HIGH, ACCEPTANCE_BAND_LOW, ADAPTATION_INTERVAL, DEFAULT_MAX_STALL_FRACTION,
    INITIAL_DISPERSION_PROPOSAL_SCALE, INITIAL_PROPOSAL_SCALE, MAX_INIT_ATTEMPTS,
    MAX_PROPOSAL_SCALE, MIN_PROPOSAL_SCALE, SCALE_DECREASE_FACTOR, SCALE_INCREASE_FACTOR,
};
use crate::error::{Result, ScorelineError};
use crate::layout::{Prior, Scope};
use crate::model::ScoreModel;
use crate::posterior::{ChainDraws, PosteriorSampleSet};
use crate::schedule::Schedule;

/// Sampler configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McmcConfig {
    pub n_chains: usize,
    /// Iterations per chain, burn-in included.
    pub n_iter: usize,
    pub n_burnin: usize,
    /// Keep every `thin`-th post-burn-in draw.
    pub thin: usize,
    pub seed: u64,
    /// Fraction of stalled iterations (all chains) above which the run fails.
    pub max_stall_fraction: f64,
    /// Retune proposal scales during burn-in.
    pub adapt_during_burn_in: bool,
}

impl Default for McmcConfig {
    fn default() -> Self {
        McmcConfig {
            n_chains: 3,
            n_iter: 6000,
            n_burnin: 1000,
            thin: 5,
            seed: 42,
            max_stall_fraction: DEFAULT_MAX_STALL_FRACTION,
            adapt_during_burn_in: true,
        }
    }
}

impl McmcConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_chains == 0 {
            return Err(ScorelineError::InvalidConfig("n_chains must be positive".to_string()));
        }
        if self.n_iter == 0 {
            return Err(ScorelineError::InvalidConfig("n_iter must be positive".to_string()));
        }
        if self.thin == 0 {
            return Err(ScorelineError::InvalidConfig("thin must be positive".to_string()));
        }
        if self.n_burnin >= self.n_iter {
            return Err(ScorelineError::InvalidConfig(format!(
                "n_burnin ({}) must be smaller than n_iter ({})",
                self.n_burnin, self.n_iter
            )));
        }
        if !(0.0..=1.0).contains(&self.max_stall_fraction) {
            return Err(ScorelineError::InvalidConfig(format!(
                "max_stall_fraction must be within [0, 1], got {}",
                self.max_stall_fraction
            )));
        }
        if self.retained_per_chain() == 0 {
            return Err(ScorelineError::InvalidConfig(format!(
                "thin ({}) leaves no draws after burn-in ({} iterations)",
                self.thin,
                self.n_iter - self.n_burnin
            )));
        }
        Ok(())
    }

    /// floor((n_iter - n_burnin) / thin)
    pub fn retained_per_chain(&self) -> usize {
        self.n_iter.saturating_sub(self.n_burnin) / self.thin.max(1)
    }
}

/// Run every chain to completion and collect the retained draws.
pub fn run(model: &dyn ScoreModel, schedule: &Schedule, config: &McmcConfig) -> Result<PosteriorSampleSet> {
    let never = AtomicBool::new(false);
    run_with_cancel(model, schedule, config, &never)
}

/// As `run`, but aborts when `cancel` is set. Chains that did not finish are
/// dropped; a cancelled run never yields a sample set.
pub fn run_with_cancel(
    model: &dyn ScoreModel,
    schedule: &Schedule,
    config: &McmcConfig,
    cancel: &AtomicBool,
) -> Result<PosteriorSampleSet> {
    config.validate()?;
    if model.n_entities() != schedule.n_entities() {
        return Err(ScorelineError::InvalidConfig(format!(
            "model has {} entities, schedule has {}",
            model.n_entities(),
            schedule.n_entities()
        )));
    }

    debug!(
        model = model.name(),
        chains = config.n_chains,
        iterations = config.n_iter,
        burn_in = config.n_burnin,
        thin = config.thin,
        "starting MCMC run"
    );

    let chains: Vec<ChainDraws> = (0..config.n_chains)
        .into_par_iter()
        .map(|chain| ChainSampler::new(model, schedule, config, chain)?.run(cancel))
        .collect::<Result<Vec<_>>>()?;

    let total: usize = chains.iter().map(|c| c.iterations).sum();
    let stalled: usize = chains.iter().map(|c| c.stalled_iterations.len()).sum();
    let fraction = stalled as f64 / total as f64;
    if fraction > config.max_stall_fraction {
        warn!(stalled, total, "stall rate above threshold");
        return Err(ScorelineError::ConvergenceFailure {
            stalled,
            total,
            threshold: config.max_stall_fraction,
        });
    }
    if stalled > 0 {
        warn!(stalled, total, "some iterations stalled");
    }

    PosteriorSampleSet::new(model.variant(), model.layout().names().to_vec(), chains)
}

/// Which observed matches a free coordinate's likelihood depends on.
enum Touched {
    All,
    Matches(Vec<usize>),
}

enum MoveOutcome {
    Accepted,
    Rejected,
    /// Proposal had a non-finite log density.
    Invalid,
}

struct ChainSampler<'a> {
    model: &'a dyn ScoreModel,
    schedule: &'a Schedule,
    config: &'a McmcConfig,
    chain: usize,
    rng: ChaCha8Rng,
    /// Current free coordinates. The only mutable parameter state.
    free: Vec<f64>,
    /// Full vector rebuilt from `free` before every evaluation.
    full: Vec<f64>,
    proposal_scales: Vec<f64>,
    touched: Vec<Touched>,
    accepted: Vec<usize>,
    proposed: Vec<usize>,
    window_accepted: Vec<usize>,
    window_proposed: Vec<usize>,
}

impl<'a> ChainSampler<'a> {
    fn new(
        model: &'a dyn ScoreModel,
        schedule: &'a Schedule,
        config: &'a McmcConfig,
        chain: usize,
    ) -> Result<Self> {
        let layout = model.layout();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        rng.set_stream(chain as u64);

        let mut full = vec![0.0; layout.len()];
        let mut free = None;
        for _ in 0..MAX_INIT_ATTEMPTS {
            let candidate = model.initial_free(&mut rng);
            layout.expand_into(&candidate, &mut full);
            if model.log_density(&full, schedule).is_finite() {
                free = Some(candidate);
                break;
            }
        }
        let free = free.ok_or(ScorelineError::InvalidStart { chain })?;
        layout.expand_into(&free, &mut full);

        let mut proposal_scales = Vec::with_capacity(free.len());
        let mut touched = Vec::with_capacity(free.len());
        for &full_idx in layout.free_indices() {
            let group = layout.group_of(full_idx);
            proposal_scales.push(match group.prior {
                Prior::Uniform { .. } => INITIAL_DISPERSION_PROPOSAL_SCALE,
                Prior::Normal { .. } => INITIAL_PROPOSAL_SCALE,
            });
            touched.push(match (group.scope, layout.entity_of(full_idx)) {
                (Scope::Entity, Some(entity)) => {
                    let mut matches = schedule.matches_of(entity).to_vec();
                    // Moving a free coordinate also moves the derived one.
                    if group.sum_to_zero {
                        matches.extend_from_slice(schedule.matches_of(group.len - 1));
                        matches.sort_unstable();
                        matches.dedup();
                    }
                    Touched::Matches(matches)
                }
                _ => Touched::All,
            });
        }

        let n_free = free.len();
        Ok(ChainSampler {
            model,
            schedule,
            config,
            chain,
            rng,
            free,
            full,
            proposal_scales,
            touched,
            accepted: vec![0; n_free],
            proposed: vec![0; n_free],
            window_accepted: vec![0; n_free],
            window_proposed: vec![0; n_free],
        })
    }

    /// Log density restricted to the terms that move with free coordinate
    /// `pos`: the full prior plus the likelihood of the touched matches.
    fn local_log_density(&self, pos: usize) -> f64 {
        let prior = self.model.log_prior(&self.full);
        if !prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        let records = self.schedule.records();
        let likelihood: f64 = match &self.touched[pos] {
            Touched::All => records
                .iter()
                .map(|r| self.model.match_log_likelihood(&self.full, r))
                .sum(),
            Touched::Matches(indices) => indices
                .iter()
                .map(|&i| self.model.match_log_likelihood(&self.full, &records[i]))
                .sum(),
        };
        prior + likelihood
    }

    fn set_free(&mut self, pos: usize, value: f64) {
        self.free[pos] = value;
        // Re-derive constrained coordinates before anything reads `full`.
        self.model.layout().expand_into(&self.free, &mut self.full);
    }

    fn update_coordinate(&mut self, pos: usize) -> MoveOutcome {
        let current = self.free[pos];
        let log_density_current = self.local_log_density(pos);

        let proposed = current + (self.rng.random::<f64>() - 0.5) * 2.0 * self.proposal_scales[pos];
        self.set_free(pos, proposed);
        let log_density_proposed = self.local_log_density(pos);

        self.proposed[pos] += 1;
        self.window_proposed[pos] += 1;

        if !log_density_proposed.is_finite() {
            self.set_free(pos, current);
            return MoveOutcome::Invalid;
        }

        if self.rng.random::<f64>().ln() < (log_density_proposed - log_density_current) {
            self.accepted[pos] += 1;
            self.window_accepted[pos] += 1;
            MoveOutcome::Accepted
        } else {
            self.set_free(pos, current);
            MoveOutcome::Rejected
        }
    }

    /// One sweep over the free coordinates. Returns true when every move in
    /// the sweep was numerically invalid.
    fn gibbs_iteration(&mut self) -> bool {
        let model = self.model;
        let order = model.update_order();
        let mut invalid = 0usize;
        for &pos in order {
            if let MoveOutcome::Invalid = self.update_coordinate(pos) {
                invalid += 1;
            }
        }
        !order.is_empty() && invalid == order.len()
    }

    fn adapt_proposal_scales(&mut self) {
        for pos in 0..self.proposal_scales.len() {
            if self.window_proposed[pos] == 0 {
                continue;
            }
            let rate = self.window_accepted[pos] as f64 / self.window_proposed[pos] as f64;
            let factor = if rate < ACCEPTANCE_BAND_LOW {
                SCALE_DECREASE_FACTOR
            } else if rate > ACCEPTANCE_BAND_HIGH {
                SCALE_INCREASE_FACTOR
            } else {
                1.0
            };
            self.proposal_scales[pos] =
                (self.proposal_scales[pos] * factor).clamp(MIN_PROPOSAL_SCALE, MAX_PROPOSAL_SCALE);
            self.window_accepted[pos] = 0;
            self.window_proposed[pos] = 0;
        }
    }

    fn run(mut self, cancel: &AtomicBool) -> Result<ChainDraws> {
        let config = self.config;
        let mut draws = Vec::with_capacity(config.retained_per_chain());
        let mut stalled_iterations = Vec::new();

        for iter in 0..config.n_iter {
            if cancel.load(Ordering::Relaxed) {
                debug!(chain = self.chain, iteration = iter, "chain cancelled");
                return Err(ScorelineError::Cancelled);
            }

            if self.gibbs_iteration() {
                stalled_iterations.push(iter);
            }

            if config.adapt_during_burn_in
                && iter < config.n_burnin
                && (iter + 1) % ADAPTATION_INTERVAL == 0
            {
                self.adapt_proposal_scales();
            }

            if iter >= config.n_burnin && (iter - config.n_burnin + 1) % config.thin == 0 {
                draws.push(self.full.clone());
            }
        }

        let layout = self.model.layout();
        let mut acceptance_rates = vec![None; layout.len()];
        for (pos, &full_idx) in layout.free_indices().iter().enumerate() {
            if self.proposed[pos] > 0 {
                acceptance_rates[full_idx] = Some(self.accepted[pos] as f64 / self.proposed[pos] as f64);
            }
        }

        debug!(
            chain = self.chain,
            retained = draws.len(),
            stalled = stalled_iterations.len(),
            "chain finished"
        );

        Ok(ChainDraws {
            chain: self.chain,
            stream: self.chain as u64,
            draws,
            stalled_iterations,
            acceptance_rates,
            iterations: config.n_iter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ParameterLayout;
    use crate::model::{ModelVariant, ScoreModel};
    use crate::negbin::NegBinModel;
    use crate::poisson::PoissonModel;
    use crate::types::MatchRecord;
    use rand::RngCore;

    fn round_robin_k3() -> Schedule {
        let scores = [
            (0, 1, 2, 0),
            (0, 2, 3, 1),
            (1, 0, 1, 1),
            (1, 2, 2, 1),
            (2, 0, 0, 2),
            (2, 1, 1, 1),
        ];
        let records = scores
            .iter()
            .map(|&(home, away, home_count, away_count)| MatchRecord { home, away, home_count, away_count })
            .collect();
        Schedule::new(3, records).unwrap()
    }

    fn config(n_chains: usize, n_iter: usize, n_burnin: usize, thin: usize) -> McmcConfig {
        McmcConfig {
            n_chains,
            n_iter,
            n_burnin,
            thin,
            seed: 2024,
            ..McmcConfig::default()
        }
    }

    #[test]
    fn test_three_team_scenario_yields_fifty_draws() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let set = run(&model, &schedule, &config(1, 100, 50, 1)).unwrap();

        assert_eq!(set.n_chains(), 1);
        assert_eq!(set.total_draws(), 50);
        for draw in set.draws() {
            assert!(model.layout().max_constraint_violation(draw) < 1e-9);
        }
    }

    #[test]
    fn test_sum_to_zero_holds_for_negbin_draws() {
        let schedule = round_robin_k3();
        let model = NegBinModel::new(3).unwrap();
        let set = run(&model, &schedule, &config(2, 300, 100, 2)).unwrap();

        assert_eq!(set.total_draws(), 2 * 100);
        let strength: Vec<usize> = (0..3)
            .map(|i| set.index_of(&format!("strength[{i}]")).unwrap())
            .collect();
        for draw in set.draws() {
            let sum: f64 = strength.iter().map(|&i| draw[i]).sum();
            assert!(sum.abs() < 1e-9, "strength sum {sum}");
            let r_home = draw[set.index_of("r_home").unwrap()];
            assert!(r_home > 0.0 && r_home < 50.0);
        }
    }

    #[test]
    fn test_thinning_count() {
        let cfg = config(3, 107, 7, 3);
        assert_eq!(cfg.retained_per_chain(), 33);

        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let set = run(&model, &schedule, &cfg).unwrap();
        assert_eq!(set.total_draws(), 3 * 33);
        assert!(set.chains().iter().all(|c| c.draws.len() == 33));
    }

    #[test]
    fn test_same_seed_reproduces_bit_identical_draws() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let a = run(&model, &schedule, &config(3, 200, 50, 1)).unwrap();
        let b = run(&model, &schedule, &config(3, 200, 50, 1)).unwrap();
        assert_eq!(a, b);

        let mut other = config(3, 200, 50, 1);
        other.seed = 7;
        let c = run(&model, &schedule, &other).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_chains_use_independent_streams() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let set = run(&model, &schedule, &config(2, 60, 10, 1)).unwrap();
        assert_ne!(set.chains()[0].draws, set.chains()[1].draws);
    }

    #[test]
    fn test_invalid_configs_rejected_before_sampling() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        for cfg in [
            config(0, 100, 10, 1),
            config(1, 0, 0, 1),
            config(1, 100, 100, 1),
            config(1, 100, 120, 1),
            config(1, 100, 10, 0),
            config(1, 100, 90, 20),
        ] {
            let err = run(&model, &schedule, &cfg).unwrap_err();
            assert!(matches!(err, ScorelineError::InvalidConfig(_)), "{cfg:?}");
        }
    }

    #[test]
    fn test_model_schedule_size_mismatch_rejected() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(4).unwrap();
        assert!(matches!(
            run(&model, &schedule, &config(1, 100, 10, 1)),
            Err(ScorelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cancelled_run_returns_no_samples() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let cancel = AtomicBool::new(true);
        let err = run_with_cancel(&model, &schedule, &config(2, 100, 10, 1), &cancel).unwrap_err();
        assert_eq!(err, ScorelineError::Cancelled);
    }

    #[test]
    fn test_cancel_during_sampling_stops_chains() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let cfg = config(2, 5_000_000, 10, 1000);
        let cancel = AtomicBool::new(false);

        let result = std::thread::scope(|scope| {
            let handle = scope.spawn(|| run_with_cancel(&model, &schedule, &cfg, &cancel));
            std::thread::sleep(std::time::Duration::from_millis(200));
            cancel.store(true, Ordering::Relaxed);
            handle.join().unwrap()
        });
        assert_eq!(result.unwrap_err(), ScorelineError::Cancelled);
    }

    #[test]
    fn test_acceptance_rates_skip_derived_coordinates() {
        let schedule = round_robin_k3();
        let model = PoissonModel::new(3).unwrap();
        let set = run(&model, &schedule, &config(1, 200, 100, 1)).unwrap();
        let rates = &set.chains()[0].acceptance_rates;
        let derived = set.index_of("attack[2]").unwrap();
        assert!(rates[derived].is_none());
        let mu = set.index_of("mu").unwrap();
        let rate = rates[mu].unwrap();
        assert!(rate > 0.0 && rate < 1.0);
    }

    #[test]
    fn test_posterior_recovers_home_advantage() {
        // Home side always scores 3, away side always 1.
        let mut records = Vec::new();
        for _ in 0..5 {
            for h in 0..4 {
                for a in 0..4 {
                    if h != a {
                        records.push(MatchRecord { home: h, away: a, home_count: 3, away_count: 1 });
                    }
                }
            }
        }
        let schedule = Schedule::new(4, records).unwrap();
        let model = PoissonModel::new(4).unwrap();
        let set = run(&model, &schedule, &config(2, 3000, 1000, 2)).unwrap();
        let home = set.mean("home").unwrap();
        assert!((home - 3.0_f64.ln()).abs() < 0.25, "home advantage {home}");
    }

    /// Density is finite only at the origin, so every proposal is invalid.
    struct FrozenModel {
        inner: PoissonModel,
    }

    impl ScoreModel for FrozenModel {
        fn variant(&self) -> ModelVariant {
            ModelVariant::Poisson
        }
        fn n_entities(&self) -> usize {
            self.inner.n_entities()
        }
        fn layout(&self) -> &ParameterLayout {
            self.inner.layout()
        }
        fn update_order(&self) -> &[usize] {
            self.inner.update_order()
        }
        fn rates(&self, params: &[f64], home: usize, away: usize) -> (f64, f64) {
            self.inner.rates(params, home, away)
        }
        fn match_log_likelihood(&self, params: &[f64], record: &MatchRecord) -> f64 {
            self.inner.match_log_likelihood(params, record)
        }
        fn simulate_match(
            &self,
            params: &[f64],
            home: usize,
            away: usize,
            rng: &mut dyn RngCore,
        ) -> Result<(u32, u32)> {
            self.inner.simulate_match(params, home, away, rng)
        }
        fn log_prior(&self, params: &[f64]) -> f64 {
            if params.iter().all(|&p| p == 0.0) {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        }
        fn initial_free(&self, _rng: &mut dyn RngCore) -> Vec<f64> {
            vec![0.0; self.inner.layout().n_free()]
        }
    }

    #[test]
    fn test_stalled_iterations_flagged_and_fatal_above_threshold() {
        let schedule = round_robin_k3();
        let model = FrozenModel { inner: PoissonModel::new(3).unwrap() };

        let err = run(&model, &schedule, &config(1, 40, 10, 1)).unwrap_err();
        assert!(matches!(err, ScorelineError::ConvergenceFailure { stalled: 40, total: 40, .. }));

        let mut tolerant = config(1, 40, 10, 1);
        tolerant.max_stall_fraction = 1.0;
        let set = run(&model, &schedule, &tolerant).unwrap();
        assert_eq!(set.chains()[0].stalled_iterations.len(), 40);
        assert_eq!(set.total_draws(), 30);
        assert!((set.chains()[0].stalled_fraction() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_start_reported() {
        struct Impossible(PoissonModel);
        impl ScoreModel for Impossible {
            fn variant(&self) -> ModelVariant {
                ModelVariant::Poisson
            }
            fn n_entities(&self) -> usize {
                self.0.n_entities()
            }
            fn layout(&self) -> &ParameterLayout {
                self.0.layout()
            }
            fn update_order(&self) -> &[usize] {
                self.0.update_order()
            }
            fn rates(&self, params: &[f64], home: usize, away: usize) -> (f64, f64) {
                self.0.rates(params, home, away)
            }
            fn match_log_likelihood(&self, _params: &[f64], _record: &MatchRecord) -> f64 {
                f64::NEG_INFINITY
            }
            fn simulate_match(
                &self,
                params: &[f64],
                home: usize,
                away: usize,
                rng: &mut dyn RngCore,
            ) -> Result<(u32, u32)> {
                self.0.simulate_match(params, home, away, rng)
            }
        }

        let schedule = round_robin_k3();
        let model = Impossible(PoissonModel::new(3).unwrap());
        let err = run(&model, &schedule, &config(2, 20, 5, 1)).unwrap_err();
        assert!(matches!(err, ScorelineError::InvalidStart { .. }));
    }
}
