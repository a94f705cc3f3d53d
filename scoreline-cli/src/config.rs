/// Config file loading and creation for the scoreline CLI.
///
/// Config lives at ~/.config/scoreline/config.toml.
/// All fields are optional. CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Deserialize, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScorelineConfig {
    pub model: Option<String>,
    pub chains: Option<usize>,
    pub iterations: Option<usize>,
    pub burn_in: Option<usize>,
    pub thin: Option<usize>,
    pub seed: Option<u64>,
    pub replay_seed: Option<u64>,
    pub credible_mass: Option<f64>,
    pub max_stall_fraction: Option<f64>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# scoreline configuration
# All values here can be overridden by CLI flags.

# Likelihood: \"poisson\", \"negbin\" or \"both\"
# model = \"poisson\"

# MCMC settings
# chains = 3
# iterations = 6000
# burn_in = 1000
# thin = 5
# seed = 42

# Fail the run when more than this fraction of iterations stall
# max_stall_fraction = 0.2

# Seed of the posterior-predictive round-robin replay
# replay_seed = 7

# Mass of the HPD intervals in the output
# credible_mass = 0.95
";

/// Returns the default config path: ~/.config/scoreline/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("scoreline").join("config.toml")
}

pub fn parse_config(content: &str) -> Result<ScorelineConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> ScorelineConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ScorelineConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}
