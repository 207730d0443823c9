//! Allowances: extra time added to an envelope by slowing the train down.

use serde::{Deserialize, Serialize};

use super::AllowanceError;
use super::envelope::Envelope;
use crate::config::SimulationConfig;
use crate::{Distance, Speed, Time};

/// How extra time is spread over a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceDistribution {
    /// Caps the speed, which slows down the fastest parts first
    Mareco,
    /// Scales every speed by the same factor
    Linear,
}

/// Extra time to add between two path offsets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllowanceRange {
    pub begin: Distance,
    pub end: Distance,
    pub added_time: Time,
}

/// Standard allowance requested for the whole train run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AllowanceValue {
    /// Percentage of the base run time
    Percentage(f64),
    /// Minutes per 100 km
    TimePerDistance(f64),
    /// Seconds over the whole run
    FixedTime(Time),
}

impl AllowanceValue {
    /// Extra time this allowance adds to a run taking `base_time` over `distance`
    pub fn added_time(&self, base_time: Time, distance: Distance) -> Time {
        match *self {
            AllowanceValue::Percentage(percentage) => base_time * percentage / 100.0,
            AllowanceValue::TimePerDistance(minutes) => minutes * 60.0 * distance / 100_000.0,
            AllowanceValue::FixedTime(time) => time,
        }
    }

    /// Ratio between the extra time and the base time
    pub fn ratio(&self, base_time: Time, distance: Distance) -> f64 {
        if base_time <= 0.0 {
            return 0.0;
        }
        self.added_time(base_time, distance) / base_time
    }
}

/// Rolling stock and tuning values used to apply allowances
#[derive(Debug, Clone, Copy)]
pub(crate) struct AllowanceParams {
    pub acceleration: f64,
    pub deceleration: f64,
    pub capacity_speed_limit: Speed,
    pub min_linear_factor: f64,
    pub tolerance: Time,
    pub max_iterations: usize,
}

impl AllowanceParams {
    pub(crate) fn new(acceleration: f64, deceleration: f64, config: &SimulationConfig) -> Self {
        Self {
            acceleration,
            deceleration,
            capacity_speed_limit: config.capacity_speed_limit,
            min_linear_factor: config.min_linear_factor,
            tolerance: config.allowance_tolerance,
            max_iterations: config.max_allowance_iterations,
        }
    }
}

fn run_time(positions: &[Distance], speeds: &[Speed]) -> Time {
    let mut total = 0.0;
    for i in 1..positions.len() {
        let dx = positions[i] - positions[i - 1];
        if dx <= 0.0 {
            continue;
        }
        let sum = speeds[i - 1] + speeds[i];
        if sum <= 0.0 {
            return f64::INFINITY;
        }
        total += 2.0 * dx / sum;
    }
    total
}

/// One range of the envelope being slowed down
struct RangeSlowdown<'a> {
    positions: &'a [Distance],
    base: Vec<Speed>,
    /// Lowest speeds that still allow leaving the begin speed and
    /// reaching the end speed
    floor: Vec<Speed>,
    distribution: AllowanceDistribution,
}

impl RangeSlowdown<'_> {
    fn speeds(&self, param: f64) -> Vec<Speed> {
        self.base
            .iter()
            .zip(&self.floor)
            .map(|(&v, &floor)| {
                let slowed = match self.distribution {
                    AllowanceDistribution::Mareco => param,
                    AllowanceDistribution::Linear => v * param,
                };
                v.min(slowed.max(floor))
            })
            .collect()
    }

    fn time(&self, param: f64) -> Time {
        run_time(self.positions, &self.speeds(param))
    }
}

/// Applies allowances on independent ranges of an envelope.
///
/// Ranges with no significant added time are left untouched. The time of
/// every other range ends up in `[target, target + tolerance]`.
pub(crate) fn apply(
    envelope: &Envelope,
    ranges: &[AllowanceRange],
    distribution: AllowanceDistribution,
    params: &AllowanceParams,
) -> Result<Envelope, AllowanceError> {
    if envelope.is_empty() {
        return Err(AllowanceError::EmptyEnvelope);
    }
    let end_pos = envelope.end_pos();
    let mut previous_end = 0.0;
    for range in ranges {
        let valid = range.begin >= previous_end - crate::POSITION_EPSILON
            && range.begin < range.end
            && range.end <= end_pos + crate::POSITION_EPSILON;
        if !valid {
            return Err(AllowanceError::InvalidRange {
                begin: range.begin,
                end: range.end,
            });
        }
        previous_end = range.end;
    }

    let bounds: Vec<Distance> = ranges.iter().flat_map(|r| [r.begin, r.end]).collect();
    let refined = envelope.with_points_at(&bounds);
    let positions: Vec<Distance> = refined.points().iter().map(|p| p.position).collect();
    let mut speeds: Vec<Speed> = refined.points().iter().map(|p| p.speed).collect();
    let index_of = |position: Distance| {
        let idx = positions.partition_point(|&p| p < position - crate::POSITION_EPSILON);
        idx.min(positions.len() - 1)
    };

    for range in ranges {
        if range.added_time <= params.tolerance {
            continue;
        }
        let first = index_of(range.begin);
        let last = index_of(range.end);
        if last <= first {
            continue;
        }
        let range_positions = &positions[first..=last];
        let base = speeds[first..=last].to_vec();
        let (begin_pos, end_pos) = (range_positions[0], range_positions[last - first]);
        let (begin_speed, end_speed) = (base[0], base[last - first]);
        let floor = range_positions
            .iter()
            .map(|&x| {
                let leaving = begin_speed.powi(2) - 2.0 * params.deceleration * (x - begin_pos);
                let arriving = end_speed.powi(2) - 2.0 * params.acceleration * (end_pos - x);
                leaving.max(arriving).max(0.0).sqrt()
            })
            .collect();
        let max_speed = base.iter().copied().fold(0.0, f64::max);
        let slowdown = RangeSlowdown {
            positions: range_positions,
            base,
            floor,
            distribution,
        };

        let base_time = run_time(range_positions, &slowdown.base);
        let target = base_time + range.added_time;
        let (mut slow, mut fast) = match distribution {
            AllowanceDistribution::Mareco => {
                (params.capacity_speed_limit.min(max_speed), max_speed)
            }
            AllowanceDistribution::Linear => (params.min_linear_factor, 1.0),
        };
        let max_time = slowdown.time(slow);
        if max_time < target {
            return Err(AllowanceError::TooMuchTime {
                requested: range.added_time,
                achievable: max_time - base_time,
            });
        }

        // time decreases when the parameter increases
        let mut slow_time = max_time;
        for _ in 0..params.max_iterations {
            if slow_time - target <= params.tolerance {
                break;
            }
            let middle = (slow + fast) / 2.0;
            let time = slowdown.time(middle);
            if time >= target {
                slow = middle;
                slow_time = time;
            } else {
                fast = middle;
            }
        }
        speeds[first..=last].copy_from_slice(&slowdown.speeds(slow));
    }

    Ok(Envelope::from_speeds(&positions, &speeds)?)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn params() -> AllowanceParams {
        AllowanceParams::new(0.5, 0.5, &SimulationConfig::default())
    }

    fn cruise() -> Envelope {
        let positions: Vec<f64> = (0..=100).map(|i| i as f64 * 10.0).collect();
        let speeds = vec![20.0; positions.len()];
        Envelope::from_speeds(&positions, &speeds).unwrap()
    }

    #[rstest]
    #[case(AllowanceDistribution::Mareco)]
    #[case(AllowanceDistribution::Linear)]
    fn reaches_target_time(#[case] distribution: AllowanceDistribution) {
        let envelope = cruise();
        let ranges = [AllowanceRange {
            begin: 0.0,
            end: 1000.0,
            added_time: 10.0,
        }];
        let res = apply(&envelope, &ranges, distribution, &params()).unwrap();
        let time = res.total_time();
        assert!(time >= 60.0 && time <= 60.0 + 1e-3, "got {time}");
        assert_eq!(res.begin_speed(), 20.0);
        assert_eq!(res.end_speed(), 20.0);
    }

    #[test]
    fn keeps_speed_at_range_boundaries() {
        let envelope = cruise();
        let ranges = [
            AllowanceRange {
                begin: 0.0,
                end: 500.0,
                added_time: 5.0,
            },
            AllowanceRange {
                begin: 500.0,
                end: 1000.0,
                added_time: 0.0,
            },
        ];
        let res = apply(&envelope, &ranges, AllowanceDistribution::Mareco, &params()).unwrap();
        assert_eq!(res.interpolate_speed(500.0), 20.0);
        assert!((res.interpolate_time(500.0) - 30.0).abs() <= 1e-3 + 1e-9);
        // untouched second half
        assert!((res.total_time() - res.interpolate_time(500.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn too_much_time_is_reported() {
        let ranges = [AllowanceRange {
            begin: 0.0,
            end: 1000.0,
            added_time: 1e6,
        }];
        let res = apply(&cruise(), &ranges, AllowanceDistribution::Mareco, &params());
        assert!(matches!(res, Err(AllowanceError::TooMuchTime { .. })));
    }

    #[test]
    fn rejects_invalid_ranges() {
        let ranges = [AllowanceRange {
            begin: 200.0,
            end: 1500.0,
            added_time: 1.0,
        }];
        let res = apply(&cruise(), &ranges, AllowanceDistribution::Linear, &params());
        assert!(matches!(res, Err(AllowanceError::InvalidRange { .. })));
        let empty = apply(&Envelope::default(), &[], AllowanceDistribution::Linear, &params());
        assert!(matches!(empty, Err(AllowanceError::EmptyEnvelope)));
    }

    #[test]
    fn allowance_values() {
        assert_eq!(AllowanceValue::Percentage(10.0).added_time(100.0, 5000.0), 10.0);
        assert_eq!(
            AllowanceValue::TimePerDistance(5.0).added_time(100.0, 100_000.0),
            300.0
        );
        assert_eq!(AllowanceValue::Percentage(10.0).ratio(100.0, 1.0), 0.1);
        assert_eq!(AllowanceValue::Percentage(10.0).ratio(0.0, 1.0), 0.0);
    }
}
