//! Envelope simulation seam.
//!
//! The search only talks to an [`EnvelopeSimulator`]; [`KinematicSimulator`]
//! is the in-process implementation used by the planner and the tests.

pub mod allowance;
pub mod envelope;
pub mod kinematic;
pub mod mrsp;

pub use allowance::{AllowanceDistribution, AllowanceRange, AllowanceValue};
pub use envelope::{Envelope, EnvelopePoint};
pub use kinematic::KinematicSimulator;
pub use mrsp::CachedBlockMrsp;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BlockId, Distance, Speed, Time};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Cannot simulate an empty path")]
    EmptyPath,
    #[error("Invalid range [{begin}, {end}] on block {block}")]
    InvalidRange {
        block: BlockId,
        begin: Distance,
        end: Distance,
    },
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("Invalid rolling stock: {0}")]
    InvalidRollingStock(String),
    #[error("Train stalled at position {position}")]
    Stalled { position: Distance },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllowanceError {
    /// The distribution can't slow the train down that much. Recoverable by
    /// trying another distribution.
    #[error("Allowance requires too much time ({requested:.3}s requested, {achievable:.3}s achievable)")]
    TooMuchTime { requested: Time, achievable: Time },
    #[error("Invalid allowance range [{begin}, {end}]")]
    InvalidRange { begin: Distance, end: Distance },
    #[error("Cannot apply an allowance on an empty envelope")]
    EmptyEnvelope,
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Part of a block travelled by the train, offsets relative to the block entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathRange {
    pub block: BlockId,
    pub begin: Distance,
    pub end: Distance,
}

impl PathRange {
    pub fn new(block: BlockId, begin: Distance, end: Distance) -> Self {
        Self { block, begin, end }
    }

    pub fn length(&self) -> Distance {
        self.end - self.begin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    pub path: Vec<PathRange>,
    pub begin_speed: Speed,
    /// Upper bound of the speed at the end of the path
    pub end_speed: Option<Speed>,
    /// Offsets on the path where the train stops
    pub stops: Vec<Distance>,
}

impl SimulationRequest {
    pub fn new(path: Vec<PathRange>, begin_speed: Speed) -> Self {
        Self {
            path,
            begin_speed,
            end_speed: None,
            stops: Vec::new(),
        }
    }

    pub fn path_length(&self) -> Distance {
        self.path.iter().map(PathRange::length).sum()
    }
}

/// Physics black box used by the search and the post-processing
pub trait EnvelopeSimulator {
    /// Fastest envelope over the requested path.
    ///
    /// The begin speed of the result may be lower than the requested one if
    /// the train can't brake in time for what's ahead.
    fn simulate(&self, request: &SimulationRequest) -> Result<Envelope, SimulationError>;

    /// Slows the envelope down so that every range takes its added time
    /// more, keeping the envelope speed at range boundaries.
    fn apply_allowance(
        &self,
        envelope: &Envelope,
        ranges: &[AllowanceRange],
        distribution: AllowanceDistribution,
    ) -> Result<Envelope, AllowanceError>;
}
