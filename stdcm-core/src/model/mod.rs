//! Data model of a planning request
//!
//! Contains the infrastructure seam, the rolling stock and the steps the
//! train has to go through.

pub mod infra;
pub mod rolling_stock;
pub mod steps;

pub use infra::{
    Block, BlockLocation, BlockNetwork, BlockNetworkBuilder, Infrastructure, SpeedSection,
};
pub use rolling_stock::{Comfort, RollingStock};
pub use steps::{StdcmStep, first_stop_after, validate_steps};
