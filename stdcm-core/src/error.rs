use thiserror::Error;

use crate::sim::{AllowanceError, SimulationError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("No path found")]
    NoPathFound,
    #[error("Search aborted after {iterations} iterations")]
    SearchAborted { iterations: usize },
    #[error("Search timed out after {iterations} iterations")]
    SearchTimeout { iterations: usize },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid infrastructure: {0}")]
    InvalidInfra(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Allowance error: {0}")]
    Allowance(#[from] AllowanceError),
    #[error(
        "Failed to compute a standard allowance that wouldn't cause conflicts \
         (mareco: {mareco}, linear: {linear})"
    )]
    StandardAllowance {
        mareco: AllowanceFailure,
        linear: AllowanceFailure,
    },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Why one allowance distribution failed during post-processing
#[derive(Debug, Clone, PartialEq)]
pub enum AllowanceFailure {
    /// The simulator couldn't slow the train down enough
    TooMuchTime,
    /// A conflict happened again at an offset which already has a fixed time
    RepeatedConflict { offset: crate::Distance },
    /// Conflicts were still found after the maximum number of iterations
    IterationLimit { iterations: usize },
}

impl std::fmt::Display for AllowanceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllowanceFailure::TooMuchTime => write!(f, "allowance requires too much time"),
            AllowanceFailure::RepeatedConflict { offset } => {
                write!(f, "repeated conflict at offset {offset:.3}m")
            }
            AllowanceFailure::IterationLimit { iterations } => {
                write!(f, "conflicts remain after {iterations} iterations")
            }
        }
    }
}
