/// scoreline-core: Bayesian scoring models for paired match results.
///
/// Match scores → hierarchical log-linear model → MCMC posterior → replayed
/// round robins, standings, diagnostics and model comparison.
/// No IO, no files. Just math. Bring your own results.
///
/// Entities are identified by caller-provided labels. The crate handles the
/// mapping to array indices; callers never think about indices.
///
/// # Quick start
///
/// ```rust
/// use scoreline_core::{run_analysis, AnalysisOptions, MatchInput, McmcConfig, ModelVariant};
///
/// let result = |home: &str, away: &str, h: u32, a: u32| MatchInput {
///     home: home.to_string(),
///     away: away.to_string(),
///     home_count: h,
///     away_count: a,
/// };
/// let matches = vec![
///     result("Ajax", "PSV", 2, 1),
///     result("PSV", "Feyenoord", 1, 1),
///     result("Feyenoord", "Ajax", 0, 3),
///     result("PSV", "Ajax", 2, 2),
///     result("Feyenoord", "PSV", 1, 0),
///     result("Ajax", "Feyenoord", 4, 1),
/// ];
///
/// let analysis = run_analysis(&matches, &AnalysisOptions {
///     variant: ModelVariant::Poisson,
///     mcmc: McmcConfig { n_chains: 2, n_iter: 400, n_burnin: 200, thin: 2, ..McmcConfig::default() },
///     ..AnalysisOptions::default()
/// }).unwrap();
///
/// for e in analysis.ranked() {
///     println!("{}: {:.1} pts, rank {:.2}", e.label, e.mean_points, e.mean_rank);
/// }
/// println!("DIC {:.1}", analysis.information_criterion.dic);
/// ```

pub mod analysis;
pub mod comparison;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod layout;
pub mod model;
pub mod negbin;
pub mod poisson;
pub mod posterior;
pub mod replay;
pub mod sampler;
pub mod schedule;
pub mod standings;
pub mod types;

// Re-export primary public API at crate root.
pub use analysis::{run_analysis, run_analysis_with_cancel, AnalysisOptions, AnalysisResult};
pub use comparison::{compare, BayesFactor, BayesFactorMethod, ComparisonRow, InformationCriterion, Marginal};
pub use diagnostics::{
    autocorrelation, effective_sample_size, geweke, multi_chain_ess, split_rhat, ChainReport,
    DiagnosticTable, ParameterDiagnostics,
};
pub use error::{Result, ScorelineError};
pub use layout::{ParameterLayout, Prior};
pub use model::{ModelVariant, ScoreModel};
pub use negbin::NegBinModel;
pub use poisson::PoissonModel;
pub use posterior::{ChainDraws, PosteriorSampleSet};
pub use replay::{predict_fixture, replay_all, simulate_round_robin, FixturePrediction, ReplayTable};
pub use sampler::{run, run_with_cancel, McmcConfig};
pub use schedule::{encode_schedule, EntityIndex, Schedule};
pub use standings::{award_points, ranks, StandingsDistribution};
pub use types::{EffectEstimate, EntitySummary, Interval, MatchInput, MatchRecord};
