//! Tunable parameters of a planning request.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Distance, Error, Speed, Time};

/// Default granularity used to discretize edge entry times.
///
/// Two edges on the same block entered within the same bucket are treated
/// as duplicates. Changing it trades search completeness against
/// tractability, every scenario test depends on it.
pub const DEFAULT_EDGE_TIME_BUCKET: Time = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdcmConfig {
    /// Minimum time between two kept visits of the same location, determined empirically
    pub minimum_visit_gap: Time,
    /// Edge identity bucket, see [`DEFAULT_EDGE_TIME_BUCKET`]
    pub edge_time_bucket: Time,
    /// Blocks explored ahead of the current one before building edges
    pub lookahead_blocks: usize,
    /// How many previous edges can be re-simulated to fix a speed discontinuity
    pub max_backtracking_depth: usize,
    /// How many previous edges an engineering allowance can span
    pub max_allowance_edges: usize,
    /// Distance looked back when estimating how much margin could be added before a node
    pub margin_lookback_distance: Distance,
    /// Maximum run time of the train, from departure to arrival
    pub max_run_time: Time,
    /// How much the departure time can be shifted after the requested start time
    pub maximum_departure_delay: Time,
    /// Maximum number of node expansions before the search gives up
    pub max_iterations: usize,
    /// Optional wall-clock budget of the search, in seconds
    pub timeout_seconds: Option<u64>,
    pub simulation: SimulationConfig,
}

impl Default for StdcmConfig {
    fn default() -> Self {
        Self {
            minimum_visit_gap: 4.0 * 60.0,
            edge_time_bucket: DEFAULT_EDGE_TIME_BUCKET,
            lookahead_blocks: 3,
            max_backtracking_depth: 10,
            max_allowance_edges: 10,
            margin_lookback_distance: 20_000.0,
            max_run_time: 12.0 * 3600.0,
            maximum_departure_delay: 2.0 * 3600.0,
            max_iterations: 1_000_000,
            timeout_seconds: None,
            simulation: SimulationConfig::default(),
        }
    }
}

/// Parameters of the reference envelope simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum distance between two simulated points
    pub position_step: Distance,
    /// Mareco allowances never slow the train below this speed
    pub capacity_speed_limit: Speed,
    /// Linear allowances never scale speeds below this factor
    pub min_linear_factor: f64,
    /// Allowances reach their target time within this tolerance (never below it)
    pub allowance_tolerance: Time,
    pub max_allowance_iterations: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            position_step: 10.0,
            // Needs to be >0 to avoid problems when simulating low speeds
            capacity_speed_limit: 1.0,
            min_linear_factor: 1e-3,
            allowance_tolerance: 1e-3,
            max_allowance_iterations: 100,
        }
    }
}

impl StdcmConfig {
    /// Parses and validates a TOML configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or holds invalid values
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: StdcmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or is invalid
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to read config '{}': {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that all values are usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field
    pub fn validate(&self) -> Result<(), Error> {
        fn positive(name: &str, value: f64) -> Result<(), Error> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )))
            }
        }

        positive("edge_time_bucket", self.edge_time_bucket)?;
        positive("margin_lookback_distance", self.margin_lookback_distance)?;
        positive("max_run_time", self.max_run_time)?;
        positive("simulation.position_step", self.simulation.position_step)?;
        positive(
            "simulation.capacity_speed_limit",
            self.simulation.capacity_speed_limit,
        )?;
        positive("simulation.min_linear_factor", self.simulation.min_linear_factor)?;
        positive(
            "simulation.allowance_tolerance",
            self.simulation.allowance_tolerance,
        )?;
        if self.minimum_visit_gap < 0.0 || !self.minimum_visit_gap.is_finite() {
            return Err(Error::InvalidConfig(
                "minimum_visit_gap can't be negative".to_string(),
            ));
        }
        if self.maximum_departure_delay < 0.0 {
            return Err(Error::InvalidConfig(
                "maximum_departure_delay can't be negative".to_string(),
            ));
        }
        if self.simulation.min_linear_factor >= 1.0 {
            return Err(Error::InvalidConfig(
                "simulation.min_linear_factor must be below 1".to_string(),
            ));
        }
        if self.lookahead_blocks == 0 {
            return Err(Error::InvalidConfig(
                "lookahead_blocks must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 || self.simulation.max_allowance_iterations == 0 {
            return Err(Error::InvalidConfig(
                "iteration limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
