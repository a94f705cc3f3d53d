/// One-call analysis wrapper.
///
/// Encode → sample → replay → aggregate → diagnose. Pure function, no IO.
/// Entities are identified by caller-provided labels.
use std::sync::atomic::AtomicBool;

use tracing::info;

use crate::comparison::{BayesFactor, InformationCriterion};
use crate::constants::DEFAULT_CREDIBLE_MASS;
use crate::diagnostics::DiagnosticTable;
use crate::error::{Result, ScorelineError};
use crate::layout::Scope;
use crate::model::{ModelVariant, ScoreModel};
use crate::posterior::PosteriorSampleSet;
use crate::replay::{predict_fixture, replay_all, FixturePrediction};
use crate::sampler::{run_with_cancel, McmcConfig};
use crate::schedule::{encode_schedule, EntityIndex};
use crate::standings::StandingsDistribution;
use crate::types::{EffectEstimate, EntitySummary, MatchInput};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisOptions {
    pub variant: ModelVariant,
    pub mcmc: McmcConfig,
    /// Seed of the per-draw replay streams.
    pub replay_seed: u64,
    /// Mass of every HPD interval in the output.
    pub credible_mass: f64,
    /// Explicit entity order. Defaults to first appearance in the matches.
    pub labels: Option<Vec<String>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            variant: ModelVariant::Poisson,
            mcmc: McmcConfig::default(),
            replay_seed: 7,
            credible_mass: DEFAULT_CREDIBLE_MASS,
            labels: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisResult {
    pub variant: ModelVariant,
    /// One row per entity, in entity index order.
    pub entities: Vec<EntitySummary>,
    pub diagnostics: DiagnosticTable,
    pub information_criterion: InformationCriterion,
    /// Sign test on the home advantage.
    pub home_advantage: BayesFactor,
    pub standings: StandingsDistribution,
    pub samples: PosteriorSampleSet,
    /// Seed the standings were replayed with; reused by `predict`.
    pub replay_seed: u64,
}

impl AnalysisResult {
    /// Rows ordered by mean replayed rank, best first.
    pub fn ranked(&self) -> Vec<&EntitySummary> {
        let mut rows: Vec<&EntitySummary> = self.entities.iter().collect();
        rows.sort_by(|a, b| a.mean_rank.total_cmp(&b.mean_rank).then(a.entity.cmp(&b.entity)));
        rows
    }

    pub fn entity(&self, label: &str) -> Option<&EntitySummary> {
        self.entities.iter().find(|e| e.label == label)
    }

    /// Posterior-predictive outcome of `home` hosting `away`, by label.
    pub fn predict(&self, home: &str, away: &str) -> Result<FixturePrediction> {
        let index_of = |label: &str| {
            self.entity(label)
                .map(|e| e.entity)
                .ok_or_else(|| ScorelineError::InvalidRecord(format!("unknown entity \"{label}\"")))
        };
        let (home, away) = (index_of(home)?, index_of(away)?);
        let model = self.variant.build(self.entities.len())?;
        predict_fixture(model.as_ref(), &self.samples, home, away, self.replay_seed)
    }
}

/// Fit one model variant to labelled match results and derive everything
/// downstream of the posterior.
pub fn run_analysis(matches: &[MatchInput], options: &AnalysisOptions) -> Result<AnalysisResult> {
    let never = AtomicBool::new(false);
    run_analysis_with_cancel(matches, options, &never)
}

pub fn run_analysis_with_cancel(
    matches: &[MatchInput],
    options: &AnalysisOptions,
    cancel: &AtomicBool,
) -> Result<AnalysisResult> {
    if !(options.credible_mass > 0.0 && options.credible_mass <= 1.0) {
        return Err(ScorelineError::InvalidConfig(format!(
            "credible_mass must be within (0, 1], got {}",
            options.credible_mass
        )));
    }
    options.mcmc.validate()?;

    let (index, schedule) = encode_schedule(matches, options.labels.as_deref())?;
    let model = options.variant.build(index.len())?;
    info!(
        model = model.name(),
        entities = index.len(),
        matches = schedule.len(),
        "fitting"
    );

    let samples = run_with_cancel(model.as_ref(), &schedule, &options.mcmc, cancel)?;
    let tables = replay_all(model.as_ref(), &samples, options.replay_seed)?;
    let standings = StandingsDistribution::from_tables(&tables);
    let diagnostics = DiagnosticTable::from_samples(&samples, options.credible_mass);
    let information_criterion = InformationCriterion::dic(model.as_ref(), &samples, &schedule)?;
    let home_advantage = BayesFactor::home_advantage(&samples)?;
    let entities = summarise_entities(model.as_ref(), &index, &samples, &standings, options.credible_mass);

    info!(
        model = model.name(),
        draws = samples.total_draws(),
        stalled = samples.stalled_iterations(),
        dic = information_criterion.dic,
        bayes_factor = home_advantage.factor,
        "analysis complete"
    );

    Ok(AnalysisResult {
        variant: options.variant,
        entities,
        diagnostics,
        information_criterion,
        home_advantage,
        standings,
        samples,
        replay_seed: options.replay_seed,
    })
}

fn summarise_entities(
    model: &dyn ScoreModel,
    index: &EntityIndex,
    samples: &PosteriorSampleSet,
    standings: &StandingsDistribution,
    mass: f64,
) -> Vec<EntitySummary> {
    let entity_groups: Vec<_> = model
        .layout()
        .groups()
        .iter()
        .filter(|g| g.scope == Scope::Entity)
        .collect();

    (0..index.len())
        .map(|entity| {
            let effects = entity_groups
                .iter()
                .filter_map(|g| {
                    let name = format!("{}[{}]", g.name, entity);
                    Some(EffectEstimate {
                        group: g.name.to_string(),
                        mean: samples.mean(&name)?,
                        interval: samples.hpd(&name, mass)?,
                    })
                })
                .collect();
            EntitySummary {
                entity,
                label: index.label(entity).to_string(),
                effects,
                mean_points: standings.mean_points(entity),
                points_interval: standings.points_hpd(entity, mass),
                mean_rank: standings.mean_rank(entity),
                rank_interval: standings.rank_hpd(entity, mass),
                rank_probabilities: standings.rank_probabilities(entity),
            }
        })
        .collect()
}
