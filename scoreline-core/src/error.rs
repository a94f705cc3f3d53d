/// Error type shared by every fallible operation in the crate.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScorelineError {
    /// Rejected before any sampling starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid match record: {0}")]
    InvalidRecord(String),

    /// Caller asked the sampler to visit a coordinate that is derived from a
    /// sum-to-zero constraint, or named a parameter the model does not have.
    #[error("identifiability violation: {0}")]
    Identifiability(String),

    #[error("chain {chain}: no starting point with a finite log density")]
    InvalidStart { chain: usize },

    #[error("convergence failure: {stalled} of {total} iterations stalled (threshold {threshold})")]
    ConvergenceFailure {
        stalled: usize,
        total: usize,
        threshold: f64,
    },

    #[error("sampling cancelled before all chains completed")]
    Cancelled,

    #[error("invalid distribution parameters: {0}")]
    Distribution(String),

    #[error("insufficient data: need at least {required} values, got {available}")]
    InsufficientData { required: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, ScorelineError>;
