use serde::{Deserialize, Serialize};

use crate::sim::SimulationError;
use crate::Speed;

/// Comfort setting, which changes the effort curves used by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comfort {
    #[default]
    Standard,
    AirConditioning,
    Heating,
}

/// Performance model of the train. Opaque to the search, only read by the
/// simulator and the MRSP cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStock {
    pub name: String,
    /// Train length, in metres
    pub length: f64,
    pub max_speed: Speed,
    /// m/s²
    pub max_acceleration: f64,
    /// m/s², positive
    pub max_deceleration: f64,
    #[serde(default)]
    pub comfort: Comfort,
}

impl RollingStock {
    /// # Errors
    ///
    /// Returns an error if any physical value is not a positive number
    pub fn validate(&self) -> Result<(), SimulationError> {
        let values = [
            ("length", self.length),
            ("max_speed", self.max_speed),
            ("max_acceleration", self.max_acceleration),
            ("max_deceleration", self.max_deceleration),
        ];
        for (name, value) in values {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimulationError::InvalidRollingStock(format!(
                    "{}: {name} must be positive, got {value}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Acceleration actually used for the given comfort setting.
    ///
    /// Auxiliary loads take part of the traction power.
    pub fn effective_acceleration(&self) -> f64 {
        match self.comfort {
            Comfort::Standard => self.max_acceleration,
            Comfort::AirConditioning | Comfort::Heating => self.max_acceleration * 0.95,
        }
    }
}
