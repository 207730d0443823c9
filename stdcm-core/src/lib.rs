//! Short-term capacity pathfinding (STDCM) for trains.
//!
//! Given a rolling stock, an ordered list of steps and a network already
//! occupied by other trains, finds a conflict-free route together with a
//! physically valid speed/time envelope, then applies the requested
//! standard allowance without reintroducing conflicts.
//!
//! The crate is organised leaves first:
//! - [`model`]: infrastructure, rolling stock and request steps
//! - [`sim`]: envelopes, block MRSP cache and the envelope simulator
//! - [`occupancy`]: the block availability oracle
//! - [`search`]: the time-aware A* search over blocks
//! - [`postprocessing`]: the final envelope builder
//! - [`planner`]: the `plan_path` entry point gluing everything together

pub mod config;
pub mod error;
pub mod model;
pub mod occupancy;
pub mod planner;
pub mod postprocessing;
pub mod prelude;
pub mod search;
pub mod sim;

pub use config::{SimulationConfig, StdcmConfig};
pub use error::Error;
pub use planner::{StdcmRequest, StdcmResponse, plan_path, plan_path_with_simulator};

/// Seconds
pub type Time = f64;
/// Metres
pub type Distance = f64;
/// Metres per second
pub type Speed = f64;
/// Index of a block in the infrastructure block table
pub type BlockId = usize;
/// Index of a detector (block boundary)
pub type DetectorId = usize;

/// Two positions closer than this are considered equal (1 mm).
pub const POSITION_EPSILON: Distance = 1e-3;

/// Occupancy overlaps shorter than this are not reported as conflicts.
pub const TIME_EPSILON: Time = 1e-3;

pub(crate) fn positions_equal(a: Distance, b: Distance) -> bool {
    (a - b).abs() < POSITION_EPSILON
}

/// Equality on times which may be infinite (no next occupancy).
pub(crate) fn times_equal(a: Time, b: Time) -> bool {
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    (a - b).abs() < TIME_EPSILON
}
