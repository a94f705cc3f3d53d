/// Prior variance for the intercept, home advantage and every free team
/// effect. Deliberately diffuse.
pub const EFFECT_PRIOR_VARIANCE: f64 = 1.0e4;

/// Upper bound of the Uniform(0, R) prior on negative-binomial dispersions.
pub const DISPERSION_PRIOR_UPPER: f64 = 50.0;

/// Points for a win, a draw and a loss.
pub const POINTS_WIN: u32 = 3;
pub const POINTS_DRAW: u32 = 1;
pub const POINTS_LOSS: u32 = 0;

/// Initial half-width of the uniform random-walk proposal for effects.
pub const INITIAL_PROPOSAL_SCALE: f64 = 0.3;

/// Initial half-width of the proposal for dispersion parameters, which live
/// on a much wider scale than the log-linear effects.
pub const INITIAL_DISPERSION_PROPOSAL_SCALE: f64 = 2.0;

/// Burn-in adaptation: scales are retuned every this many iterations.
pub const ADAPTATION_INTERVAL: usize = 50;

/// Burn-in adaptation keeps each coordinate's acceptance rate inside this
/// band (centred near 0.44, the optimum for one-dimensional random walks).
pub const ACCEPTANCE_BAND_LOW: f64 = 0.3;
pub const ACCEPTANCE_BAND_HIGH: f64 = 0.55;

/// Multipliers applied to a proposal scale below / above the band.
pub const SCALE_DECREASE_FACTOR: f64 = 0.8;
pub const SCALE_INCREASE_FACTOR: f64 = 1.25;

/// Proposal scales are kept inside this range during adaptation.
pub const MIN_PROPOSAL_SCALE: f64 = 1.0e-3;
pub const MAX_PROPOSAL_SCALE: f64 = 10.0;

/// Default fraction of stalled iterations above which a run is rejected.
pub const DEFAULT_MAX_STALL_FRACTION: f64 = 0.2;

/// High bit set on every replay stream id. Chain streams are the chain index,
/// so the two never share a ChaCha stream under the same seed.
pub const REPLAY_STREAM_TAG: u64 = 1 << 63;

/// Attempts at drawing a starting point with finite log density.
pub const MAX_INIT_ATTEMPTS: usize = 100;

/// Shortest chain the autocorrelation-based diagnostics accept.
pub const MIN_DIAGNOSTIC_LENGTH: usize = 10;

/// Geweke segment fractions (first 10% vs last 50%).
pub const GEWEKE_FIRST_FRACTION: f64 = 0.1;
pub const GEWEKE_LAST_FRACTION: f64 = 0.5;

/// |z| above this flags questionable convergence.
pub const GEWEKE_Z_THRESHOLD: f64 = 2.0;

/// Split R-hat above this flags questionable convergence.
pub const R_HAT_THRESHOLD: f64 = 1.05;

/// Credible mass used for HPD intervals in summaries.
pub const DEFAULT_CREDIBLE_MASS: f64 = 0.95;
