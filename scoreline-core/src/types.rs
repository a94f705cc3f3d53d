/// One observed match, as supplied by the caller.
///
/// Teams are identified by label; `schedule::encode_schedule` maps them to
/// indices.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchInput {
    pub home: String,
    pub away: String,
    pub home_count: u32,
    pub away_count: u32,
}

/// One observed match in index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchRecord {
    pub home: usize,
    pub away: usize,
    pub home_count: u32,
    pub away_count: u32,
}

/// Closed credible interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Posterior mean of one entity-level effect, e.g. `attack` or `strength`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectEstimate {
    /// Group name without the index, e.g. "attack".
    pub group: String,
    pub mean: f64,
    pub interval: Interval,
}

/// Per-entity row of the final table: effects plus replayed standings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntitySummary {
    pub entity: usize,
    pub label: String,
    pub effects: Vec<EffectEstimate>,
    pub mean_points: f64,
    pub points_interval: Interval,
    pub mean_rank: f64,
    pub rank_interval: Interval,
    /// P(rank = r) for r = 1..=K, indexed from 0.
    pub rank_probabilities: Vec<f64>,
}

impl EntitySummary {
    /// Posterior mean of the named effect group, if the model has it.
    pub fn effect(&self, group: &str) -> Option<f64> {
        self.effects.iter().find(|e| e.group == group).map(|e| e.mean)
    }

    /// Share of replays that finish first, ties included.
    pub fn top_probability(&self) -> f64 {
        self.rank_probabilities.first().copied().unwrap_or(0.0)
    }
}
