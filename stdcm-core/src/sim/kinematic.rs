use log::trace;

use super::allowance::{self, AllowanceParams};
use super::mrsp::CachedBlockMrsp;
use super::{
    AllowanceDistribution, AllowanceError, AllowanceRange, Envelope, EnvelopeSimulator,
    SimulationError, SimulationRequest,
};
use crate::config::SimulationConfig;
use crate::model::{Infrastructure, RollingStock};
use crate::{Distance, Speed};

/// Envelope simulator with constant acceleration and braking rates.
///
/// The path is cut in speed sections (block and MRSP boundaries, stops),
/// each split in equal intervals of at most `position_step`. Braking
/// curves are computed backwards first, then traction forwards.
pub struct KinematicSimulator<'a> {
    infra: &'a dyn Infrastructure,
    rolling_stock: &'a RollingStock,
    mrsp: CachedBlockMrsp<'a>,
    config: SimulationConfig,
}

/// Interval of the path with a single speed limit, in path offsets
#[derive(Debug, Clone, Copy)]
struct Section {
    begin: Distance,
    end: Distance,
    speed: Speed,
}

impl<'a> KinematicSimulator<'a> {
    /// # Errors
    ///
    /// Returns an error if the rolling stock is invalid
    pub fn new(
        infra: &'a dyn Infrastructure,
        rolling_stock: &'a RollingStock,
        config: SimulationConfig,
    ) -> Result<Self, SimulationError> {
        rolling_stock.validate()?;
        Ok(Self {
            infra,
            rolling_stock,
            mrsp: CachedBlockMrsp::new(infra, Some(rolling_stock)),
            config,
        })
    }

    pub fn rolling_stock(&self) -> &RollingStock {
        self.rolling_stock
    }

    fn sections(&self, request: &SimulationRequest) -> Result<Vec<Section>, SimulationError> {
        let mut sections = Vec::new();
        let mut offset = 0.0;
        for range in &request.path {
            if !self.infra.contains(range.block) {
                return Err(SimulationError::UnknownBlock(range.block));
            }
            let length = self.infra.block_length(range.block);
            if range.begin < -crate::POSITION_EPSILON
                || range.end > length + crate::POSITION_EPSILON
                || range.end < range.begin
            {
                return Err(SimulationError::InvalidRange {
                    block: range.block,
                    begin: range.begin,
                    end: range.end,
                });
            }
            for s in self.mrsp.get(range.block).iter() {
                let begin = s.begin.max(range.begin);
                let end = s.end.min(range.end);
                if end - begin > 0.0 {
                    sections.push(Section {
                        begin: offset + begin - range.begin,
                        end: offset + end - range.begin,
                        speed: s.speed,
                    });
                }
            }
            offset += range.length();
        }
        if sections.is_empty() {
            return Err(SimulationError::EmptyPath);
        }

        // stops need a point of their own
        for &stop in &request.stops {
            if let Some(i) = sections
                .iter()
                .position(|s| s.begin + crate::POSITION_EPSILON < stop && stop < s.end - crate::POSITION_EPSILON)
            {
                let section = sections[i];
                sections[i].end = stop;
                sections.insert(
                    i + 1,
                    Section {
                        begin: stop,
                        ..section
                    },
                );
            }
        }
        Ok(sections)
    }
}

impl EnvelopeSimulator for KinematicSimulator<'_> {
    fn simulate(&self, request: &SimulationRequest) -> Result<Envelope, SimulationError> {
        let sections = self.sections(request)?;
        let step = self.config.position_step;

        let mut positions = vec![sections[0].begin];
        let mut interval_limits = Vec::new();
        for section in &sections {
            let length = section.end - section.begin;
            let count = (length / step).ceil().max(1.0) as usize;
            for k in 1..=count {
                positions.push(section.begin + length * k as f64 / count as f64);
                interval_limits.push(section.speed);
            }
        }
        let n = interval_limits.len();

        let mut speeds: Vec<Speed> = (0..=n)
            .map(|i| {
                let before = if i > 0 { interval_limits[i - 1] } else { f64::INFINITY };
                let after = interval_limits.get(i).copied().unwrap_or(f64::INFINITY);
                before.min(after)
            })
            .collect();
        let is_stop: Vec<bool> = positions
            .iter()
            .map(|&p| request.stops.iter().any(|&s| crate::positions_equal(s, p)))
            .collect();

        let deceleration = self.rolling_stock.max_deceleration;
        let acceleration = self.rolling_stock.effective_acceleration();

        if let Some(end_speed) = request.end_speed {
            speeds[n] = speeds[n].min(end_speed.max(0.0));
        }
        if is_stop[n] {
            speeds[n] = 0.0;
        }
        for i in (0..n).rev() {
            let dx = positions[i + 1] - positions[i];
            let braking = (speeds[i + 1].powi(2) + 2.0 * deceleration * dx).sqrt();
            speeds[i] = if is_stop[i] { 0.0 } else { speeds[i].min(braking) };
        }

        speeds[0] = speeds[0].min(request.begin_speed.max(0.0));
        for i in 0..n {
            let dx = positions[i + 1] - positions[i];
            let traction = (speeds[i].powi(2) + 2.0 * acceleration * dx).sqrt();
            speeds[i + 1] = speeds[i + 1].min(traction);
        }

        let envelope = Envelope::from_speeds(&positions, &speeds)?;
        trace!(
            "simulated {:.1}m in {:.2}s (begin speed {:.2} for {:.2} requested)",
            envelope.end_pos(),
            envelope.total_time(),
            envelope.begin_speed(),
            request.begin_speed
        );
        Ok(envelope)
    }

    fn apply_allowance(
        &self,
        envelope: &Envelope,
        ranges: &[AllowanceRange],
        distribution: AllowanceDistribution,
    ) -> Result<Envelope, AllowanceError> {
        let params = AllowanceParams::new(
            self.rolling_stock.effective_acceleration(),
            self.rolling_stock.max_deceleration,
            &self.config,
        );
        allowance::apply(envelope, ranges, distribution, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockNetwork, Comfort};
    use crate::sim::PathRange;

    fn infra() -> BlockNetwork {
        let mut builder = BlockNetwork::builder();
        for name in ["a", "b", "c"] {
            builder.add_block(name, 1000.0, 20.0).unwrap();
        }
        builder.add_block("slow", 1000.0, 5.0).unwrap();
        builder.build()
    }

    fn train() -> RollingStock {
        RollingStock {
            name: "test".to_string(),
            length: 100.0,
            max_speed: 30.0,
            max_acceleration: 0.5,
            max_deceleration: 0.5,
            comfort: Comfort::Standard,
        }
    }

    #[test]
    fn accelerate_cruise_and_stop() {
        let infra = infra();
        let train = train();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let path = vec![
            PathRange::new(0, 0.0, 1000.0),
            PathRange::new(1, 0.0, 1000.0),
            PathRange::new(2, 0.0, 1000.0),
        ];
        let mut request = SimulationRequest::new(path, 0.0);
        request.stops.push(3000.0);
        let envelope = sim.simulate(&request).unwrap();
        // 40s to reach 20m/s over 400m, 2200m at 20m/s, 40s to brake
        assert!((envelope.total_time() - 190.0).abs() < 1e-6);
        assert_eq!(envelope.end_speed(), 0.0);
        assert!((envelope.interpolate_time(1000.0) - 70.0).abs() < 1e-6);
    }

    #[test]
    fn intermediate_stop_and_partial_blocks() {
        let infra = infra();
        let train = train();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let path = vec![PathRange::new(0, 0.0, 1000.0), PathRange::new(1, 0.0, 500.0)];
        let mut request = SimulationRequest::new(path, 0.0);
        request.stops = vec![505.0, 1500.0];
        let envelope = sim.simulate(&request).unwrap();
        assert_eq!(envelope.interpolate_speed(505.0), 0.0);
        assert!((envelope.end_pos() - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn begin_speed_lowered_when_braking_is_impossible() {
        let infra = infra();
        let train = train();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let path = vec![PathRange::new(0, 950.0, 1000.0), PathRange::new(3, 0.0, 1000.0)];
        let envelope = sim.simulate(&SimulationRequest::new(path, 20.0)).unwrap();
        // v² = 25 + 2 * 0.5 * 50
        assert!((envelope.begin_speed() - 75f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn end_speed_limit() {
        let infra = infra();
        let train = train();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let mut request = SimulationRequest::new(vec![PathRange::new(0, 0.0, 1000.0)], 20.0);
        request.end_speed = Some(10.0);
        let envelope = sim.simulate(&request).unwrap();
        assert!((envelope.end_speed() - 10.0).abs() < 1e-9);
        assert_eq!(envelope.begin_speed(), 20.0);
    }

    #[test]
    fn invalid_requests() {
        let infra = infra();
        let train = train();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let unknown = SimulationRequest::new(vec![PathRange::new(12, 0.0, 10.0)], 0.0);
        assert_eq!(sim.simulate(&unknown), Err(SimulationError::UnknownBlock(12)));
        let outside = SimulationRequest::new(vec![PathRange::new(0, 0.0, 1200.0)], 0.0);
        assert!(matches!(
            sim.simulate(&outside),
            Err(SimulationError::InvalidRange { .. })
        ));
        let empty = SimulationRequest::new(vec![PathRange::new(0, 10.0, 10.0)], 0.0);
        assert_eq!(sim.simulate(&empty), Err(SimulationError::EmptyPath));

        let mut bad_train = train.clone();
        bad_train.max_acceleration = -1.0;
        assert!(KinematicSimulator::new(&infra, &bad_train, SimulationConfig::default()).is_err());
    }
}
