/// Parameter layout: names, priors and sum-to-zero constraints.
///
/// A full parameter vector holds every coordinate, including the last
/// coordinate of each constrained group. That coordinate is derived as the
/// negated sum of the rest of its group and is never part of chain state:
/// chains store the free coordinates only and call `expand_into` before every
/// density evaluation.
use rand::{Rng, RngCore};

use crate::error::{Result, ScorelineError};

/// Prior on one free coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prior {
    Normal { mean: f64, variance: f64 },
    /// Open interval (lower, upper); density is zero outside.
    Uniform { lower: f64, upper: f64 },
}

impl Prior {
    pub fn log_density(&self, x: f64) -> f64 {
        match *self {
            Prior::Normal { mean, variance } => {
                let d = x - mean;
                -0.5 * (d * d / variance + (2.0 * std::f64::consts::PI * variance).ln())
            }
            Prior::Uniform { lower, upper } => {
                if x > lower && x < upper {
                    -(upper - lower).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    /// Dispersed but finite starting value.
    fn initial_value(&self, rng: &mut dyn RngCore) -> f64 {
        match *self {
            Prior::Normal { mean, .. } => mean + rng.random_range(-0.5..0.5),
            Prior::Uniform { lower, upper } => {
                let width = upper - lower;
                rng.random_range((lower + 0.02 * width)..(lower + 0.4 * width))
            }
        }
    }
}

/// Whether a group holds global scalars or one value per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Entity,
}

/// Declaration of one parameter group.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: &'static str,
    pub len: usize,
    pub scope: Scope,
    pub sum_to_zero: bool,
    pub prior: Prior,
}

impl GroupSpec {
    pub fn scalar(name: &'static str, prior: Prior) -> Self {
        GroupSpec { name, len: 1, scope: Scope::Global, sum_to_zero: false, prior }
    }

    pub fn entity_effect(name: &'static str, n_entities: usize, prior: Prior) -> Self {
        GroupSpec { name, len: n_entities, scope: Scope::Entity, sum_to_zero: true, prior }
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: &'static str,
    pub start: usize,
    pub len: usize,
    pub scope: Scope,
    pub sum_to_zero: bool,
    pub prior: Prior,
}

impl Group {
    /// Full-vector index of the derived coordinate, if the group is constrained.
    pub fn derived_index(&self) -> Option<usize> {
        self.sum_to_zero.then(|| self.start + self.len - 1)
    }
}

#[derive(Debug, Clone)]
pub struct ParameterLayout {
    names: Vec<String>,
    groups: Vec<Group>,
    /// full index -> group index
    coord_group: Vec<usize>,
    /// Full-vector indices of the free coordinates, in layout order.
    free: Vec<usize>,
}

impl ParameterLayout {
    pub fn new(specs: &[GroupSpec]) -> Result<Self> {
        let mut names = Vec::new();
        let mut groups = Vec::with_capacity(specs.len());
        let mut coord_group = Vec::new();
        let mut free = Vec::new();

        for (g, spec) in specs.iter().enumerate() {
            if spec.len == 0 {
                return Err(ScorelineError::InvalidConfig(format!(
                    "parameter group {} is empty",
                    spec.name
                )));
            }
            if spec.sum_to_zero && spec.len < 2 {
                return Err(ScorelineError::InvalidConfig(format!(
                    "sum-to-zero group {} needs at least 2 coordinates",
                    spec.name
                )));
            }
            let start = names.len();
            for i in 0..spec.len {
                if spec.scope == Scope::Global && spec.len == 1 {
                    names.push(spec.name.to_string());
                } else {
                    names.push(format!("{}[{}]", spec.name, i));
                }
                coord_group.push(g);
                let is_derived = spec.sum_to_zero && i == spec.len - 1;
                if !is_derived {
                    free.push(start + i);
                }
            }
            groups.push(Group {
                name: spec.name,
                start,
                len: spec.len,
                scope: spec.scope,
                sum_to_zero: spec.sum_to_zero,
                prior: spec.prior,
            });
        }

        Ok(ParameterLayout { names, groups, coord_group, free })
    }

    /// Dimension of the full vector.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_of(&self, full_idx: usize) -> &Group {
        &self.groups[self.coord_group[full_idx]]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn is_derived(&self, full_idx: usize) -> bool {
        self.group_of(full_idx).derived_index() == Some(full_idx)
    }

    /// Entity a coordinate belongs to, for entity-scoped groups.
    pub fn entity_of(&self, full_idx: usize) -> Option<usize> {
        let group = self.group_of(full_idx);
        (group.scope == Scope::Entity).then(|| full_idx - group.start)
    }

    /// Write the free coordinates into `full` and re-derive every constrained
    /// coordinate from them.
    pub fn expand_into(&self, free: &[f64], full: &mut [f64]) {
        debug_assert_eq!(free.len(), self.free.len());
        debug_assert_eq!(full.len(), self.names.len());
        for (&idx, &value) in self.free.iter().zip(free) {
            full[idx] = value;
        }
        for group in &self.groups {
            if let Some(derived) = group.derived_index() {
                let sum: f64 = full[group.start..derived].iter().sum();
                full[derived] = -sum;
            }
        }
    }

    pub fn expand(&self, free: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; self.names.len()];
        self.expand_into(free, &mut full);
        full
    }

    /// Free coordinates of a full vector.
    pub fn compress(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&idx| full[idx]).collect()
    }

    /// Largest |sum| over constrained groups; zero up to rounding for any
    /// vector produced by `expand`.
    pub fn max_constraint_violation(&self, full: &[f64]) -> f64 {
        self.groups
            .iter()
            .filter(|g| g.sum_to_zero)
            .map(|g| full[g.start..g.start + g.len].iter().sum::<f64>().abs())
            .fold(0.0_f64, f64::max)
    }

    /// Sum of prior log densities over free coordinates. Derived coordinates
    /// carry no prior of their own.
    pub fn log_prior(&self, full: &[f64]) -> f64 {
        let mut total = 0.0;
        for &idx in &self.free {
            total += self.group_of(idx).prior.log_density(full[idx]);
            if !total.is_finite() {
                return f64::NEG_INFINITY;
            }
        }
        total
    }

    pub fn initial_free(&self, rng: &mut dyn RngCore) -> Vec<f64> {
        self.free
            .iter()
            .map(|&idx| self.group_of(idx).prior.initial_value(rng))
            .collect()
    }

    /// Resolve an explicit update order (parameter names) into positions of
    /// the free vector. Every free coordinate must appear exactly once and no
    /// derived coordinate may appear at all.
    pub fn resolve_update_order<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let mut order = Vec::with_capacity(names.len());
        let mut seen = vec![false; self.free.len()];

        for name in names {
            let name = name.as_ref();
            let full_idx = self.index_of(name).ok_or_else(|| {
                ScorelineError::Identifiability(format!("unknown parameter {name}"))
            })?;
            if self.is_derived(full_idx) {
                return Err(ScorelineError::Identifiability(format!(
                    "{name} is derived from the sum-to-zero constraint and cannot be sampled"
                )));
            }
            let pos = self
                .free
                .iter()
                .position(|&i| i == full_idx)
                .ok_or_else(|| ScorelineError::Identifiability(format!("{name} is not free")))?;
            if seen[pos] {
                return Err(ScorelineError::InvalidConfig(format!(
                    "{name} appears twice in the update order"
                )));
            }
            seen[pos] = true;
            order.push(pos);
        }

        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(ScorelineError::InvalidConfig(format!(
                "update order is missing {}",
                self.names[self.free[missing]]
            )));
        }

        Ok(order)
    }

    /// Layout order over the free coordinates.
    pub fn default_update_order(&self) -> Vec<usize> {
        (0..self.free.len()).collect()
    }
}
