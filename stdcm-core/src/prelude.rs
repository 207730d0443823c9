// Re-export key components
pub use crate::config::{SimulationConfig, StdcmConfig};
pub use crate::error::{AllowanceFailure, Error};
pub use crate::model::{
    BlockLocation, BlockNetwork, BlockNetworkBuilder, Comfort, Infrastructure, RollingStock,
    SpeedSection, StdcmStep,
};
pub use crate::occupancy::{Availability, BlockAvailability, OccupancyTable, TimedPath};
pub use crate::planner::{StdcmRequest, StdcmResponse, plan_path, plan_path_with_simulator};
pub use crate::postprocessing::{FinalEnvelope, FixedTimePoint};
pub use crate::sim::{
    AllowanceDistribution, AllowanceValue, Envelope, EnvelopeSimulator, KinematicSimulator,
};

// Units
pub use crate::BlockId;
pub use crate::Distance; // metres
pub use crate::Speed; // m/s
pub use crate::Time; // seconds
