use serde::{Deserialize, Serialize};

use super::infra::{BlockLocation, Infrastructure};
use crate::{Error, Time};

/// A place the train has to go through, in order.
///
/// The first step is the origin, the last one the destination. The
/// destination is always a stop, whatever its `stop` flag says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdcmStep {
    /// Any of these locations satisfies the step
    pub locations: Vec<BlockLocation>,
    #[serde(default)]
    pub stop: bool,
    /// Stop duration, only meaningful when stopping
    #[serde(default)]
    pub duration: Option<Time>,
}

impl StdcmStep {
    pub fn new(locations: Vec<BlockLocation>, stop: bool, duration: Option<Time>) -> Self {
        Self {
            locations,
            stop,
            duration,
        }
    }

    pub fn pass_through(location: BlockLocation) -> Self {
        Self::new(vec![location], false, None)
    }

    pub fn stop_at(location: BlockLocation, duration: Time) -> Self {
        Self::new(vec![location], true, Some(duration))
    }

    pub fn stop_duration(&self) -> Time {
        if self.stop {
            self.duration.unwrap_or(0.0)
        } else {
            0.0
        }
    }
}

/// Checks that steps can be used for a search
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if there are fewer than two steps, a
/// step has no location, or a location isn't on the infrastructure.
pub fn validate_steps(steps: &[StdcmStep], infra: &dyn Infrastructure) -> Result<(), Error> {
    if steps.len() < 2 {
        return Err(Error::InvalidRequest(
            "at least an origin and a destination are required".to_string(),
        ));
    }
    for (i, step) in steps.iter().enumerate() {
        if step.locations.is_empty() {
            return Err(Error::InvalidRequest(format!("step {i} has no location")));
        }
        if let Some(duration) = step.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(Error::InvalidRequest(format!(
                    "step {i} has an invalid stop duration {duration}"
                )));
            }
        }
        for location in &step.locations {
            if !infra.contains(location.block) {
                return Err(Error::InvalidRequest(format!(
                    "step {i} references unknown block {}",
                    location.block
                )));
            }
            let length = infra.block_length(location.block);
            if location.offset < 0.0 || location.offset > length + crate::POSITION_EPSILON {
                return Err(Error::InvalidRequest(format!(
                    "step {i} offset {} is outside of block {} (length {length})",
                    location.offset, location.block
                )));
            }
        }
    }
    Ok(())
}

/// Index of the first step after `index` where the train stops, if any
pub fn first_stop_after(steps: &[StdcmStep], index: usize) -> Option<usize> {
    let last = steps.len().checked_sub(1)?;
    (index + 1..=last).find(|&i| i == last || steps[i].stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockNetwork;

    fn infra() -> BlockNetwork {
        let mut builder = BlockNetwork::builder();
        builder.add_block("a", 1000.0, 20.0).unwrap();
        builder.add_block("b", 1000.0, 20.0).unwrap();
        builder.connect(0, 1).unwrap();
        builder.build()
    }

    #[test]
    fn first_stop_lookup() {
        let steps = vec![
            StdcmStep::pass_through(BlockLocation::new(0, 0.0)),
            StdcmStep::pass_through(BlockLocation::new(0, 500.0)),
            StdcmStep::stop_at(BlockLocation::new(1, 200.0), 60.0),
            StdcmStep::pass_through(BlockLocation::new(1, 1000.0)),
        ];
        assert_eq!(first_stop_after(&steps, 0), Some(2));
        assert_eq!(first_stop_after(&steps, 2), Some(3));
        assert_eq!(first_stop_after(&steps, 3), None);
    }

    #[test]
    fn stop_duration_ignored_without_stop() {
        let step = StdcmStep::new(vec![BlockLocation::new(0, 0.0)], false, Some(30.0));
        assert_eq!(step.stop_duration(), 0.0);
        assert_eq!(
            StdcmStep::stop_at(BlockLocation::new(0, 0.0), 30.0).stop_duration(),
            30.0
        );
    }

    #[test]
    fn step_validation() {
        let infra = infra();
        let origin = StdcmStep::pass_through(BlockLocation::new(0, 0.0));
        let valid = vec![origin.clone(), StdcmStep::stop_at(BlockLocation::new(1, 1000.0), 0.0)];
        assert!(validate_steps(&valid, &infra).is_ok());
        assert!(validate_steps(&valid[..1], &infra).is_err());

        let unknown = vec![origin.clone(), StdcmStep::pass_through(BlockLocation::new(9, 0.0))];
        assert!(validate_steps(&unknown, &infra).is_err());

        let outside = vec![origin, StdcmStep::pass_through(BlockLocation::new(1, 1500.0))];
        assert!(validate_steps(&outside, &infra).is_err());
    }
}
