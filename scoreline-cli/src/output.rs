/// Output formatting: terminal tables and JSON.
use scoreline_core::{
    AnalysisResult, BayesFactor, ComparisonRow, DiagnosticTable, EntitySummary, FixturePrediction,
    InformationCriterion,
};
use serde::Serialize;

use crate::bail;

#[derive(Serialize)]
struct JsonFixture<'a> {
    home_label: &'a str,
    away_label: &'a str,
    #[serde(flatten)]
    prediction: &'a FixturePrediction,
}

#[derive(Serialize)]
struct JsonModelOutput<'a> {
    model: &'static str,
    draws: usize,
    entities: Vec<&'a EntitySummary>,
    predictions: Vec<JsonFixture<'a>>,
    diagnostics: &'a DiagnosticTable,
    information_criterion: &'a InformationCriterion,
    home_advantage: &'a BayesFactor,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    models: Vec<JsonModelOutput<'a>>,
    matches: usize,
    comparison: &'a [ComparisonRow],
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.precision$}"),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

/// Print the per-entity standings table, best mean rank first.
pub fn print_table(result: &AnalysisResult, mass: f64) {
    let ranked = result.ranked();
    let name_width = ranked.iter().map(|e| e.label.len()).max().unwrap_or(4).max(4);
    let effect_names: Vec<String> = ranked
        .first()
        .map(|e| e.effects.iter().map(|x| x.group.clone()).collect())
        .unwrap_or_default();
    let pct = (mass * 100.0).round();

    println!("Model: {}", result.variant.name());
    let mut header = format!(" # | {:<name_width$}", "Team");
    let mut rule = format!("---|-{}", "-".repeat(name_width));
    for name in &effect_names {
        header.push_str(&format!(" | {name:>8}"));
        rule.push_str(&format!("-|-{}", "-".repeat(8)));
    }
    header.push_str(&format!(
        " | {:>6} | {:>13} | {:>9} | {:>11} | {:>6}",
        "Points",
        format!("{pct}% HPD"),
        "Mean rank",
        "Rank HPD",
        "P(1st)"
    ));
    rule.push_str("-|--------|---------------|-----------|-------------|-------");
    println!("{header}");
    println!("{rule}");

    for (i, e) in ranked.iter().enumerate() {
        let mut line = format!("{:>2} | {:<name_width$}", i + 1, e.label);
        for name in &effect_names {
            line.push_str(&format!(" | {:>8}", fmt_opt(e.effect(name), 3)));
        }
        line.push_str(&format!(
            " | {:>6.1} | {:>13} | {:>9.2} | {:>11} | {:>6.3}",
            e.mean_points,
            format!("[{:.0}, {:.0}]", e.points_interval.lower, e.points_interval.upper),
            e.mean_rank,
            format!("[{:.0}, {:.0}]", e.rank_interval.lower, e.rank_interval.upper),
            e.top_probability(),
        ));
        println!("{line}");
    }

    let ic = &result.information_criterion;
    println!(
        "\n{} teams, {} posterior draws across {} chains",
        result.entities.len(),
        result.samples.total_draws(),
        result.samples.n_chains(),
    );
    println!(
        "DIC {:.2} (mean deviance {:.2}, pD {:.2})",
        ic.dic, ic.mean_deviance, ic.effective_parameters,
    );
    let bf = &result.home_advantage;
    println!(
        "Home advantage ≥ 0: Bayes factor {:.3} (prior odds {:.3}, posterior odds {:.3})",
        bf.factor, bf.prior_odds, bf.posterior_odds,
    );
}

/// Print posterior-predictive outcome probabilities of requested fixtures.
pub fn print_predictions(result: &AnalysisResult, predictions: &[FixturePrediction]) {
    if predictions.is_empty() {
        return;
    }
    println!("\n{:<30} | {:>6} | {:>6} | {:>6} | {:>11}", "Fixture", "Home", "Draw", "Away", "Mean score");
    println!("-------------------------------|--------|--------|--------|------------");
    for p in predictions {
        let fixture = format!("{} vs {}", result.entities[p.home].label, result.entities[p.away].label);
        println!(
            "{:<30} | {:>6.3} | {:>6.3} | {:>6.3} | {:>11}",
            fixture,
            p.home_win,
            p.draw,
            p.away_win,
            format!("{:.2}-{:.2}", p.mean_home_count, p.mean_away_count),
        );
    }
}

/// Print per-parameter convergence diagnostics and any warnings.
pub fn print_diagnostics(table: &DiagnosticTable) {
    let name_width = table.rows.iter().map(|r| r.name.len()).max().unwrap_or(9).max(9);
    println!(
        "\n{:<name_width$} | {:>8} | {:>7} | {:>8} | {:>7} | {:>6}",
        "Parameter", "Mean", "SD", "Geweke z", "ESS", "R-hat"
    );
    println!("{}-|----------|---------|----------|---------|-------", "-".repeat(name_width));
    for r in &table.rows {
        println!(
            "{:<name_width$} | {:>8.4} | {:>7.4} | {:>8} | {:>7} | {:>6}{}",
            r.name,
            r.mean,
            r.sd,
            fmt_opt(r.geweke_z, 2),
            fmt_opt(r.ess, 0),
            fmt_opt(r.r_hat, 3),
            if r.flagged { "  *" } else { "" },
        );
    }
    for c in &table.chains {
        println!(
            "chain {}: {} draws, acceptance {}, {} stalled iterations",
            c.chain,
            c.draws,
            fmt_opt(c.mean_acceptance, 2),
            c.stalled_iterations,
        );
    }
    for w in &table.warnings {
        println!("Warning: {w}");
    }
}

/// Print the DIC ranking of several fitted models.
pub fn print_comparison(rows: &[ComparisonRow]) {
    println!("\n{:<8} | {:>10} | {:>14} | {:>8} | {:>8}", "Model", "DIC", "Mean deviance", "pD", "ΔDIC");
    println!("---------|------------|----------------|----------|---------");
    for r in rows {
        println!(
            "{:<8} | {:>10.2} | {:>14.2} | {:>8.2} | {:>8.2}",
            r.model, r.criterion.dic, r.criterion.mean_deviance, r.criterion.effective_parameters, r.delta,
        );
    }
}

/// Print results as JSON. Raw draws are left out.
pub fn print_json(
    results: &[AnalysisResult],
    predictions: &[Vec<FixturePrediction>],
    matches: usize,
    comparison: &[ComparisonRow],
) {
    let models = results
        .iter()
        .zip(predictions)
        .map(|(r, preds)| JsonModelOutput {
            model: r.variant.name(),
            draws: r.samples.total_draws(),
            entities: r.ranked(),
            predictions: preds
                .iter()
                .map(|p| JsonFixture {
                    home_label: &r.entities[p.home].label,
                    away_label: &r.entities[p.away].label,
                    prediction: p,
                })
                .collect(),
            diagnostics: &r.diagnostics,
            information_criterion: &r.information_criterion,
            home_advantage: &r.home_advantage,
        })
        .collect();

    let output = JsonOutput { models, matches, comparison };
    let text = serde_json::to_string_pretty(&output)
        .unwrap_or_else(|e| bail(format!("Failed to serialize output: {e}")));
    println!("{text}");
}
