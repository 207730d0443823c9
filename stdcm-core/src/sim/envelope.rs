//! Speed/time profiles along a path.

use serde::{Deserialize, Serialize};

use super::SimulationError;
use crate::{Distance, Speed, Time};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePoint {
    pub position: Distance,
    pub speed: Speed,
    pub time: Time,
}

/// Ordered points starting at position 0 and time 0. The acceleration is
/// constant between two consecutive points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    points: Vec<EnvelopePoint>,
}

/// Time needed to go over `dx` when the speed varies linearly in v² space
fn segment_time(dx: Distance, v0: Speed, v1: Speed) -> Option<Time> {
    if dx <= 0.0 {
        return Some(0.0);
    }
    let sum = v0 + v1;
    if sum <= 0.0 { None } else { Some(2.0 * dx / sum) }
}

impl Envelope {
    /// Builds an envelope from positions and speeds, integrating times.
    ///
    /// Positions are re-based so that the first one is 0.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Stalled`] if the train would have to cover
    /// a distance at zero speed.
    pub fn from_speeds(positions: &[Distance], speeds: &[Speed]) -> Result<Self, SimulationError> {
        debug_assert_eq!(positions.len(), speeds.len());
        let Some(&origin) = positions.first() else {
            return Ok(Self::default());
        };
        let mut points = Vec::with_capacity(positions.len());
        let mut time = 0.0;
        for i in 0..positions.len() {
            if i > 0 {
                let dx = positions[i] - positions[i - 1];
                time += segment_time(dx, speeds[i - 1], speeds[i]).ok_or(
                    SimulationError::Stalled {
                        position: positions[i - 1],
                    },
                )?;
            }
            points.push(EnvelopePoint {
                position: positions[i] - origin,
                speed: speeds[i],
                time,
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[EnvelopePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn begin_speed(&self) -> Speed {
        self.points.first().map_or(0.0, |p| p.speed)
    }

    pub fn end_speed(&self) -> Speed {
        self.points.last().map_or(0.0, |p| p.speed)
    }

    pub fn end_pos(&self) -> Distance {
        self.points.last().map_or(0.0, |p| p.position)
    }

    pub fn total_time(&self) -> Time {
        self.points.last().map_or(0.0, |p| p.time)
    }

    pub fn max_speed(&self) -> Speed {
        self.points.iter().map(|p| p.speed).fold(0.0, f64::max)
    }

    /// Index of the segment containing `position`, and the clamped position
    fn locate(&self, position: Distance) -> Option<(usize, Distance)> {
        let last = self.points.len().checked_sub(1)?;
        let position = position.clamp(0.0, self.end_pos());
        let upper = self
            .points
            .partition_point(|p| p.position <= position)
            .clamp(1, last.max(1));
        Some((upper.min(last), position))
    }

    /// Speed and time at `position`, clamped to the envelope bounds
    fn interpolate(&self, position: Distance) -> Option<(Speed, Time)> {
        let (upper, position) = self.locate(position)?;
        if upper == 0 {
            let p = self.points[0];
            return Some((p.speed, p.time));
        }
        let a = self.points[upper - 1];
        let b = self.points[upper];
        let dx = b.position - a.position;
        if dx <= 0.0 {
            return Some((b.speed, b.time));
        }
        let accel = (b.speed * b.speed - a.speed * a.speed) / (2.0 * dx);
        let delta = position - a.position;
        let speed = (a.speed * a.speed + 2.0 * accel * delta).max(0.0).sqrt();
        let time = a.time + segment_time(delta, a.speed, speed).unwrap_or(0.0);
        Some((speed, time))
    }

    pub fn interpolate_time(&self, position: Distance) -> Time {
        self.interpolate(position).map_or(0.0, |(_, t)| t)
    }

    pub fn interpolate_speed(&self, position: Distance) -> Speed {
        self.interpolate(position).map_or(0.0, |(v, _)| v)
    }

    /// Extracts the part between `begin` and `end`, re-based at position 0
    /// and time 0.
    pub fn slice(&self, begin: Distance, end: Distance) -> Envelope {
        if self.points.is_empty() || end < begin {
            return Envelope::default();
        }
        let (begin_speed, begin_time) = self.interpolate(begin).unwrap_or((0.0, 0.0));
        let (end_speed, end_time) = self.interpolate(end).unwrap_or((0.0, 0.0));
        let begin = begin.clamp(0.0, self.end_pos());
        let end = end.clamp(0.0, self.end_pos());

        let mut points = vec![EnvelopePoint {
            position: 0.0,
            speed: begin_speed,
            time: 0.0,
        }];
        for p in &self.points {
            if p.position > begin && p.position < end {
                points.push(EnvelopePoint {
                    position: p.position - begin,
                    speed: p.speed,
                    time: p.time - begin_time,
                });
            }
        }
        if end > begin {
            points.push(EnvelopePoint {
                position: end - begin,
                speed: end_speed,
                time: end_time - begin_time,
            });
        }
        Envelope { points }
    }

    /// Same envelope with interpolated points added at the given positions
    pub fn with_points_at(&self, positions: &[Distance]) -> Envelope {
        let mut points = self.points.clone();
        for &position in positions {
            if position <= 0.0 || position >= self.end_pos() {
                continue;
            }
            let idx = points.partition_point(|p| p.position < position);
            if idx < points.len() && crate::positions_equal(points[idx].position, position) {
                continue;
            }
            if let Some((speed, time)) = self.interpolate(position) {
                points.insert(
                    idx,
                    EnvelopePoint {
                        position,
                        speed,
                        time,
                    },
                );
            }
        }
        Envelope { points }
    }

    /// Same positions run `factor` times as fast: speeds are multiplied and
    /// times divided by it.
    pub fn scaled(&self, factor: f64) -> Envelope {
        if factor == 1.0 || factor <= 0.0 {
            return self.clone();
        }
        let points = self
            .points
            .iter()
            .map(|p| EnvelopePoint {
                position: p.position,
                speed: p.speed * factor,
                time: p.time / factor,
            })
            .collect();
        Envelope { points }
    }

    /// Puts envelopes one after the other. When the speed matches at a
    /// junction, the duplicated point is dropped.
    pub fn concat(parts: &[Envelope]) -> Envelope {
        let mut points: Vec<EnvelopePoint> = Vec::new();
        for part in parts {
            let (offset, time) = points
                .last()
                .map_or((0.0, 0.0), |p| (p.position, p.time));
            let mut iter = part.points.iter().peekable();
            if let (Some(last), Some(first)) = (points.last(), iter.peek()) {
                if (last.speed - first.speed).abs() < 1e-9 && first.position <= 0.0 {
                    iter.next();
                }
            }
            points.extend(iter.map(|p| EnvelopePoint {
                position: p.position + offset,
                speed: p.speed,
                time: p.time + time,
            }));
        }
        Envelope { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accelerate_then_cruise() -> Envelope {
        // 0 -> 20 m/s over 400m at 0.5 m/s², then 600m at 20 m/s
        let positions = [0.0, 100.0, 400.0, 1000.0];
        let speeds = [0.0, 10.0, 20.0, 20.0];
        Envelope::from_speeds(&positions, &speeds).unwrap()
    }

    #[test]
    fn integrates_times() {
        let env = accelerate_then_cruise();
        assert!((env.total_time() - 70.0).abs() < 1e-9);
        assert_eq!(env.end_pos(), 1000.0);
        assert_eq!(env.begin_speed(), 0.0);
        assert_eq!(env.end_speed(), 20.0);
        assert_eq!(env.max_speed(), 20.0);
    }

    #[test]
    fn interpolation_uses_constant_acceleration() {
        let env = accelerate_then_cruise();
        // v² = x on the first 400m
        assert!((env.interpolate_speed(225.0) - 15.0).abs() < 1e-9);
        assert!((env.interpolate_time(225.0) - 30.0).abs() < 1e-9);
        assert!((env.interpolate_time(700.0) - 55.0).abs() < 1e-9);
        // clamped
        assert_eq!(env.interpolate_time(2000.0), env.total_time());
        assert_eq!(env.interpolate_time(-5.0), 0.0);
    }

    #[test]
    fn slice_is_rebased() {
        let env = accelerate_then_cruise();
        let slice = env.slice(225.0, 700.0);
        assert_eq!(slice.points()[0].position, 0.0);
        assert!((slice.end_pos() - 475.0).abs() < 1e-9);
        assert!((slice.begin_speed() - 15.0).abs() < 1e-9);
        assert!((slice.total_time() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn concat_drops_duplicated_junctions() {
        let env = accelerate_then_cruise();
        let parts = [env.slice(0.0, 400.0), env.slice(400.0, 1000.0)];
        let joined = Envelope::concat(&parts);
        assert_eq!(joined.points().len(), env.points().len());
        assert!((joined.total_time() - env.total_time()).abs() < 1e-9);
    }

    #[test]
    fn scaling_stretches_times() {
        let env = accelerate_then_cruise();
        let slow = env.scaled(0.5);
        assert!((slow.total_time() - 140.0).abs() < 1e-9);
        assert!((slow.interpolate_time(700.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn zero_speed_over_a_distance_is_an_error() {
        let res = Envelope::from_speeds(&[0.0, 10.0], &[0.0, 0.0]);
        assert!(matches!(res, Err(SimulationError::Stalled { .. })));
    }

    #[test]
    fn extra_points_keep_the_profile() {
        let env = accelerate_then_cruise();
        let refined = env.with_points_at(&[225.0, 400.0]);
        assert_eq!(refined.points().len(), env.points().len() + 1);
        assert!((refined.interpolate_time(300.0) - env.interpolate_time(300.0)).abs() < 1e-9);
    }
}
