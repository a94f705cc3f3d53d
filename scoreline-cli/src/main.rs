mod config;
mod output;
mod parse;

use clap::Parser;
use scoreline_core::{
    compare, run_analysis, AnalysisOptions, AnalysisResult, FixturePrediction, MatchInput, McmcConfig,
    ModelVariant,
};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use tracing::Level;

use crate::config::ScorelineConfig;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "scoreline", version, about = "Fit Bayesian score models to match results")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Fit one or both models, replay the round robin and report standings
    Fit(FitArgs),
    /// Create a default config file at ~/.config/scoreline/config.toml
    Init,
}

#[derive(Parser)]
struct FitArgs {
    /// File with match results: a JSON array, or one home,away,home_count,away_count
    /// per line. Reads stdin when omitted.
    #[arg(long)]
    matches: Option<PathBuf>,

    /// Likelihood: "poisson", "negbin" or "both"
    #[arg(long)]
    model: Option<String>,

    /// Number of independent chains
    #[arg(long)]
    chains: Option<usize>,

    /// Iterations per chain, burn-in included
    #[arg(long)]
    iterations: Option<usize>,

    /// Iterations discarded at the start of every chain
    #[arg(long)]
    burn_in: Option<usize>,

    /// Keep every n-th post-burn-in draw
    #[arg(long)]
    thin: Option<usize>,

    /// Seed for the chains
    #[arg(long)]
    seed: Option<u64>,

    /// Predict a fixture as HOME,AWAY. Repeatable.
    #[arg(long)]
    predict: Vec<String>,

    /// Output JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file (default: ~/.config/scoreline/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Load match records from --matches or stdin.
fn load_matches(args: &FitArgs) -> Vec<MatchInput> {
    let content = match args.matches {
        Some(ref path) => std::fs::read_to_string(path)
            .unwrap_or_else(|e| bail(format!("Failed to read matches file {}: {e}", path.display()))),
        None => {
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                bail("No matches provided. Use --matches <file> or pipe records via stdin.");
            }
            let mut content = String::new();
            stdin
                .read_to_string(&mut content)
                .unwrap_or_else(|e| bail(format!("Failed to read from stdin: {e}")));
            content
        }
    };

    let matches = parse::parse_matches(&content).unwrap_or_else(|e| bail(e));
    if matches.is_empty() {
        bail("No match records found in input");
    }
    matches
}

fn select_variants(name: &str) -> Vec<ModelVariant> {
    match name {
        "poisson" => vec![ModelVariant::Poisson],
        "negbin" => vec![ModelVariant::NegativeBinomial],
        "both" => vec![ModelVariant::Poisson, ModelVariant::NegativeBinomial],
        other => bail(format!("Unknown model \"{other}\". Use \"poisson\", \"negbin\" or \"both\".")),
    }
}

/// Merge config file and CLI args (CLI wins) over the built-in defaults.
fn analysis_options(args: &FitArgs, cfg: &ScorelineConfig) -> AnalysisOptions {
    let defaults = AnalysisOptions::default();
    let mcmc = McmcConfig {
        n_chains: args.chains.or(cfg.chains).unwrap_or(defaults.mcmc.n_chains),
        n_iter: args.iterations.or(cfg.iterations).unwrap_or(defaults.mcmc.n_iter),
        n_burnin: args.burn_in.or(cfg.burn_in).unwrap_or(defaults.mcmc.n_burnin),
        thin: args.thin.or(cfg.thin).unwrap_or(defaults.mcmc.thin),
        seed: args.seed.or(cfg.seed).unwrap_or(defaults.mcmc.seed),
        max_stall_fraction: cfg.max_stall_fraction.unwrap_or(defaults.mcmc.max_stall_fraction),
        ..defaults.mcmc.clone()
    };
    AnalysisOptions {
        mcmc,
        replay_seed: cfg.replay_seed.unwrap_or(defaults.replay_seed),
        credible_mass: cfg.credible_mass.unwrap_or(defaults.credible_mass),
        ..defaults
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fit(args) => run_fit(args),
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your default model, chains, iterations, etc.");
        }
    }
}

fn run_fit(args: FitArgs) {
    init_logging(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let model_name = args
        .model
        .clone()
        .or_else(|| cfg.model.clone())
        .unwrap_or_else(|| "poisson".to_string());
    let variants = select_variants(&model_name);

    let matches = load_matches(&args);
    let base = analysis_options(&args, &cfg);
    tracing::info!(
        matches = matches.len(),
        chains = base.mcmc.n_chains,
        iterations = base.mcmc.n_iter,
        "loaded match records"
    );

    let results: Vec<AnalysisResult> = variants
        .into_iter()
        .map(|variant| {
            let options = AnalysisOptions { variant, ..base.clone() };
            run_analysis(&matches, &options)
                .unwrap_or_else(|e| bail(format!("{} model failed: {e}", variant.name())))
        })
        .collect();

    let fixtures: Vec<(String, String)> = args
        .predict
        .iter()
        .map(|f| parse::parse_fixture(f).unwrap_or_else(|e| bail(e)))
        .collect();
    let predictions: Vec<Vec<FixturePrediction>> = results
        .iter()
        .map(|r| {
            fixtures
                .iter()
                .map(|(home, away)| {
                    r.predict(home, away)
                        .unwrap_or_else(|e| bail(format!("Cannot predict {home} vs {away}: {e}")))
                })
                .collect()
        })
        .collect();

    let candidates: Vec<(&str, _)> = results
        .iter()
        .map(|r| (r.variant.name(), r.information_criterion))
        .collect();
    let comparison = compare(&candidates);

    if args.json {
        output::print_json(&results, &predictions, matches.len(), &comparison);
    } else {
        for (i, result) in results.iter().enumerate() {
            if i > 0 {
                println!();
            }
            output::print_table(result, base.credible_mass);
            output::print_predictions(result, &predictions[i]);
            output::print_diagnostics(&result.diagnostics);
        }
        if comparison.len() > 1 {
            output::print_comparison(&comparison);
        }
    }
}
