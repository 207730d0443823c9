//! Time-aware A* search over blocks.
//!
//! Nodes and edges live in a [`SearchArena`]. The [`StdcmGraph`] produces
//! the edges leaving a node through the [`EdgeBuilder`], which relies on
//! the delay, engineering allowance and backtracking managers.

pub mod arena;
pub mod astar;
pub mod backtracking;
pub mod delay;
pub mod edge_builder;
pub mod engineering_allowance;
pub mod explorer;
pub mod graph;
pub mod heuristic;
pub mod time_data;
pub mod visited;

pub use arena::{Edge, EdgeId, EdgeKey, Node, NodeId, NodeLocation, SearchArena};
pub use astar::{SearchResult, find_path};
pub use edge_builder::EdgeBuilder;
pub use graph::StdcmGraph;
pub use heuristic::RemainingTimeEstimator;
pub use time_data::TimeData;
pub use visited::{Fingerprint, VisitedNodes};

use crate::config::StdcmConfig;
use crate::model::{Infrastructure, RollingStock, StdcmStep};
use crate::occupancy::BlockAvailability;
use crate::sim::{AllowanceValue, CachedBlockMrsp, Envelope, EnvelopeSimulator};
use crate::{Distance, Time};

/// Everything a search needs, scoped to a single planning request
pub struct StdcmContext<'a> {
    pub infra: &'a dyn Infrastructure,
    pub simulator: &'a dyn EnvelopeSimulator,
    pub availability: &'a dyn BlockAvailability,
    pub rolling_stock: &'a RollingStock,
    pub steps: &'a [StdcmStep],
    pub config: &'a StdcmConfig,
    /// Earliest departure time requested
    pub start_time: Time,
    pub standard_allowance: Option<AllowanceValue>,
    pub estimator: RemainingTimeEstimator<'a>,
}

impl<'a> StdcmContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        infra: &'a dyn Infrastructure,
        simulator: &'a dyn EnvelopeSimulator,
        availability: &'a dyn BlockAvailability,
        rolling_stock: &'a RollingStock,
        steps: &'a [StdcmStep],
        config: &'a StdcmConfig,
        start_time: Time,
        standard_allowance: Option<AllowanceValue>,
    ) -> Self {
        let mrsp = CachedBlockMrsp::new(infra, Some(rolling_stock));
        Self {
            infra,
            simulator,
            availability,
            rolling_stock,
            steps,
            config,
            start_time,
            standard_allowance,
            estimator: RemainingTimeEstimator::new(infra, mrsp, steps),
        }
    }

    pub fn mrsp(&self) -> &CachedBlockMrsp<'a> {
        self.estimator.mrsp()
    }

    pub fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Whether the train stops at step `index`. The destination is always a stop.
    pub fn is_stop(&self, index: usize) -> bool {
        index == self.last_step_index() || self.steps.get(index).is_some_and(|s| s.stop)
    }

    pub fn stop_duration(&self, index: usize) -> Time {
        self.steps.get(index).map_or(0.0, StdcmStep::stop_duration)
    }

    /// Factor applied to speeds to account for the standard allowance
    /// during the search
    pub fn speed_factor(&self, envelope: &Envelope, length: Distance) -> f64 {
        match self.standard_allowance {
            Some(value) => 1.0 / (1.0 + value.ratio(envelope.total_time(), length).max(0.0)),
            None => 1.0,
        }
    }
}
