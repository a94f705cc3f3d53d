/// Convergence diagnostics on raw chains.
///
/// Standalone functions return `InsufficientData` for series shorter than
/// `MIN_DIAGNOSTIC_LENGTH`. `DiagnosticTable` turns those errors into empty
/// cells plus a warning, so a short run still gets a table.
use rayon::prelude::*;
use tracing::warn;

use crate::constants::{
    GEWEKE_FIRST_FRACTION, GEWEKE_LAST_FRACTION, GEWEKE_Z_THRESHOLD, MIN_DIAGNOSTIC_LENGTH,
    R_HAT_THRESHOLD,
};
use crate::error::{Result, ScorelineError};
use crate::posterior::{hpd_interval, mean, sample_variance, PosteriorSampleSet};
use crate::types::Interval;

fn require_length(series: &[f64]) -> Result<()> {
    if series.len() < MIN_DIAGNOSTIC_LENGTH {
        return Err(ScorelineError::InsufficientData {
            required: MIN_DIAGNOSTIC_LENGTH,
            available: series.len(),
        });
    }
    Ok(())
}

/// Lag-`lag` autocorrelation, normalised by the lag-0 sum of squares.
/// Zero for a constant series.
fn acf_at(series: &[f64], m: f64, denominator: f64, lag: usize) -> f64 {
    if denominator <= 0.0 || lag >= series.len() {
        return 0.0;
    }
    let numerator: f64 = series
        .iter()
        .zip(&series[lag..])
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    numerator / denominator
}

/// Autocorrelation for lags 0..=max_lag (capped at len - 1).
pub fn autocorrelation(series: &[f64], max_lag: usize) -> Result<Vec<f64>> {
    require_length(series)?;
    let m = mean(series);
    let denominator: f64 = series.iter().map(|v| (v - m) * (v - m)).sum();
    let max_lag = max_lag.min(series.len() - 1);
    Ok((0..=max_lag)
        .map(|lag| if lag == 0 { 1.0 } else { acf_at(series, m, denominator, lag) })
        .collect())
}

/// Initial-positive-sequence ESS: sum autocorrelations until the first
/// non-positive one. Never exceeds the series length.
fn ess_unchecked(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return n as f64;
    }
    let m = mean(series);
    let denominator: f64 = series.iter().map(|v| (v - m) * (v - m)).sum();
    if denominator <= 0.0 {
        return n as f64;
    }
    let mut rho_sum = 0.0;
    for lag in 1..n {
        let rho = acf_at(series, m, denominator, lag);
        if rho <= 0.0 {
            break;
        }
        rho_sum += rho;
    }
    n as f64 / (1.0 + 2.0 * rho_sum).max(1.0)
}

pub fn effective_sample_size(series: &[f64]) -> Result<f64> {
    require_length(series)?;
    Ok(ess_unchecked(series))
}

/// Sum of per-chain ESS.
pub fn multi_chain_ess(chains: &[Vec<f64>]) -> Result<f64> {
    chains.iter().map(|c| effective_sample_size(c)).sum()
}

/// Geweke z-score: mean of the first 10% against mean of the last 50%,
/// each standard error corrected by its segment's ESS.
pub fn geweke(series: &[f64]) -> Result<f64> {
    require_length(series)?;
    let n = series.len();
    let n_first = ((n as f64 * GEWEKE_FIRST_FRACTION).round() as usize).max(2);
    let n_last = ((n as f64 * GEWEKE_LAST_FRACTION).floor() as usize).max(2);
    let first = &series[..n_first];
    let last = &series[n - n_last..];

    let diff = mean(first) - mean(last);
    let se2 = sample_variance(first) / ess_unchecked(first) + sample_variance(last) / ess_unchecked(last);
    if se2 <= 0.0 {
        return Ok(if diff == 0.0 { 0.0 } else { diff.signum() * f64::INFINITY });
    }
    Ok(diff / se2.sqrt())
}

/// Split R-hat: each chain halved, chains truncated to a common even length.
pub fn split_rhat(chains: &[Vec<f64>]) -> Result<f64> {
    if chains.len() < 2 {
        return Err(ScorelineError::InsufficientData { required: 2, available: chains.len() });
    }
    let min_len = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    let used = min_len - min_len % 2;
    if used < MIN_DIAGNOSTIC_LENGTH {
        return Err(ScorelineError::InsufficientData { required: MIN_DIAGNOSTIC_LENGTH, available: used });
    }
    let half = used / 2;
    let split: Vec<&[f64]> = chains
        .iter()
        .flat_map(|c| [&c[..half], &c[half..used]])
        .collect();

    let m = split.len() as f64;
    let n = half as f64;
    let chain_means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let grand_mean = mean(&chain_means);
    let b = n / (m - 1.0) * chain_means.iter().map(|cm| (cm - grand_mean).powi(2)).sum::<f64>();
    let w = split.iter().map(|c| sample_variance(c)).sum::<f64>() / m;
    if w <= 0.0 {
        // Constant chains agree only if they sit at the same value.
        return Ok(if b <= 0.0 { 1.0 } else { f64::INFINITY });
    }
    let var_hat = (n - 1.0) / n * w + b / n;
    Ok((var_hat / w).sqrt())
}

/// Summary and convergence statistics of one parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterDiagnostics {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub hpd: Interval,
    /// `None` when the pooled chain is too short.
    pub geweke_z: Option<f64>,
    pub ess: Option<f64>,
    /// `None` with fewer than two chains or too few draws.
    pub r_hat: Option<f64>,
    /// |z| above the Geweke threshold, or R-hat above its threshold.
    pub flagged: bool,
}

/// Per-chain run statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainReport {
    pub chain: usize,
    pub draws: usize,
    /// Mean acceptance rate over sampled coordinates.
    pub mean_acceptance: Option<f64>,
    pub stalled_iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticTable {
    pub rows: Vec<ParameterDiagnostics>,
    pub chains: Vec<ChainReport>,
    pub warnings: Vec<String>,
}

impl DiagnosticTable {
    pub fn from_samples(set: &PosteriorSampleSet, mass: f64) -> Self {
        let rows: Vec<ParameterDiagnostics> = set
            .param_names()
            .par_iter()
            .enumerate()
            .map(|(idx, name)| diagnose_parameter(set, idx, name, mass))
            .collect();

        let chains: Vec<ChainReport> = set
            .chains()
            .iter()
            .map(|c| {
                let rates: Vec<f64> = c.acceptance_rates.iter().flatten().copied().collect();
                ChainReport {
                    chain: c.chain,
                    draws: c.draws.len(),
                    mean_acceptance: (!rates.is_empty()).then(|| mean(&rates)),
                    stalled_iterations: c.stalled_iterations.len(),
                }
            })
            .collect();

        let mut warnings = Vec::new();
        let per_chain = set.chains().iter().map(|c| c.draws.len()).min().unwrap_or(0);
        if set.total_draws() < MIN_DIAGNOSTIC_LENGTH {
            warnings.push(format!(
                "insufficient data: {} draws, need {} for Geweke",
                set.total_draws(),
                MIN_DIAGNOSTIC_LENGTH
            ));
        }
        if per_chain < MIN_DIAGNOSTIC_LENGTH {
            warnings.push(format!(
                "insufficient data: {per_chain} draws per chain, need {MIN_DIAGNOSTIC_LENGTH} for ESS and split R-hat"
            ));
        }
        if set.n_chains() < 2 {
            warnings.push("single chain: split R-hat not computed".to_string());
        }
        let flagged: Vec<&str> = rows.iter().filter(|r| r.flagged).map(|r| r.name.as_str()).collect();
        if !flagged.is_empty() {
            warnings.push(format!("questionable convergence: {}", flagged.join(", ")));
        }
        let stalled: usize = chains.iter().map(|c| c.stalled_iterations).sum();
        if stalled > 0 {
            warnings.push(format!("{stalled} stalled iterations across all chains"));
        }

        for w in &warnings {
            warn!("{w}");
        }

        DiagnosticTable { rows, chains, warnings }
    }

    pub fn row(&self, name: &str) -> Option<&ParameterDiagnostics> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ParameterDiagnostics> + '_ {
        self.rows.iter().filter(|r| r.flagged)
    }
}

fn diagnose_parameter(set: &PosteriorSampleSet, idx: usize, name: &str, mass: f64) -> ParameterDiagnostics {
    let traces = set.traces_at(idx);
    let pooled: Vec<f64> = traces.iter().flatten().copied().collect();

    let geweke_z = geweke(&pooled).ok();
    let ess = multi_chain_ess(&traces).ok();
    let r_hat = split_rhat(&traces).ok();
    let flagged = geweke_z.is_some_and(|z| z.abs() > GEWEKE_Z_THRESHOLD)
        || r_hat.is_some_and(|r| r > R_HAT_THRESHOLD || r.is_nan());

    ParameterDiagnostics {
        name: name.to_string(),
        mean: mean(&pooled),
        sd: sample_variance(&pooled).sqrt(),
        hpd: hpd_interval(&pooled, mass),
        geweke_z,
        ess,
        r_hat,
        flagged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelVariant;
    use crate::posterior::ChainDraws;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn white_noise(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| rng.random::<f64>() - 0.5).collect()
    }

    fn ar1(seed: u64, n: usize, phi: f64) -> Vec<f64> {
        let noise = white_noise(seed, n);
        let mut x = 0.0;
        noise
            .into_iter()
            .map(|e| {
                x = phi * x + e;
                x
            })
            .collect()
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let short = vec![1.0, 2.0, 3.0];
        let expected = ScorelineError::InsufficientData { required: 10, available: 3 };
        assert_eq!(autocorrelation(&short, 2).unwrap_err(), expected);
        assert_eq!(effective_sample_size(&short).unwrap_err(), expected);
        assert_eq!(geweke(&short).unwrap_err(), expected);
    }

    #[test]
    fn test_autocorrelation_lags() {
        let series = ar1(1, 2000, 0.8);
        let acf = autocorrelation(&series, 5).unwrap();
        assert_eq!(acf.len(), 6);
        assert_eq!(acf[0], 1.0);
        assert!((acf[1] - 0.8).abs() < 0.1, "lag 1: {}", acf[1]);
        assert!(acf[1] > acf[3]);

        let capped = autocorrelation(&series[..12], 50).unwrap();
        assert_eq!(capped.len(), 12);
    }

    #[test]
    fn test_ess_reflects_autocorrelation() {
        let n = 4000;
        let iid = effective_sample_size(&white_noise(2, n)).unwrap();
        let sticky = effective_sample_size(&ar1(3, n, 0.9)).unwrap();
        assert!(iid > 0.5 * n as f64 && iid <= n as f64, "iid ESS {iid}");
        assert!(sticky < 0.2 * n as f64, "AR(1) ESS {sticky}");

        let constant = vec![2.0; 50];
        assert_eq!(effective_sample_size(&constant).unwrap(), 50.0);
    }

    #[test]
    fn test_multi_chain_ess_sums_chains() {
        let a = white_noise(4, 500);
        let b = white_noise(5, 500);
        let total = multi_chain_ess(&[a.clone(), b.clone()]).unwrap();
        let expected = effective_sample_size(&a).unwrap() + effective_sample_size(&b).unwrap();
        assert!((total - expected).abs() < 1e-9);
    }

    #[test]
    fn test_geweke_on_stationary_and_drifting_series() {
        let stationary = white_noise(6, 2000);
        assert!(geweke(&stationary).unwrap().abs() < 3.0);

        let drifting: Vec<f64> = stationary.iter().enumerate().map(|(i, e)| e + i as f64 * 0.01).collect();
        assert!(geweke(&drifting).unwrap().abs() > GEWEKE_Z_THRESHOLD);
    }

    #[test]
    fn test_split_rhat() {
        let mixed = [white_noise(7, 400), white_noise(8, 400)];
        let r = split_rhat(&mixed).unwrap();
        assert!(r < 1.05, "R-hat {r}");

        let shifted: Vec<f64> = white_noise(9, 400).iter().map(|v| v + 3.0).collect();
        let apart = [white_noise(10, 400), shifted];
        assert!(split_rhat(&apart).unwrap() > 1.5);

        assert!(matches!(
            split_rhat(&[white_noise(11, 400)]),
            Err(ScorelineError::InsufficientData { required: 2, available: 1 })
        ));
    }

    fn set_from_traces(traces: &[Vec<f64>]) -> PosteriorSampleSet {
        let chains = traces
            .iter()
            .enumerate()
            .map(|(i, t)| ChainDraws {
                chain: i,
                stream: i as u64,
                draws: t.iter().map(|&v| vec![v]).collect(),
                stalled_iterations: vec![],
                acceptance_rates: vec![Some(0.4)],
                iterations: t.len(),
            })
            .collect();
        PosteriorSampleSet::new(ModelVariant::Poisson, vec!["mu".to_string()], chains).unwrap()
    }

    #[test]
    fn test_table_flags_short_runs_instead_of_failing() {
        let set = set_from_traces(&[vec![0.1, 0.2, 0.3, 0.2, 0.1]]);
        let table = DiagnosticTable::from_samples(&set, 0.95);
        let row = table.row("mu").unwrap();
        assert!(row.geweke_z.is_none());
        assert!(row.ess.is_none());
        assert!(row.r_hat.is_none());
        assert!(!row.flagged);
        assert!(table.warnings.iter().any(|w| w.contains("insufficient data")));
        assert_eq!(table.chains[0].mean_acceptance, Some(0.4));
    }

    #[test]
    fn test_table_flags_disagreeing_chains() {
        let shifted: Vec<f64> = white_noise(12, 300).iter().map(|v| v + 5.0).collect();
        let set = set_from_traces(&[white_noise(13, 300), shifted]);
        let table = DiagnosticTable::from_samples(&set, 0.95);
        let row = table.row("mu").unwrap();
        assert!(row.r_hat.unwrap() > R_HAT_THRESHOLD);
        assert!(row.flagged);
        assert_eq!(table.flagged().count(), 1);
        assert!(table.warnings.iter().any(|w| w.contains("questionable convergence: mu")));
    }
}
