//! Final envelope of the path found by the search.
//!
//! The envelopes built during the search are approximations, simulated
//! one edge at a time. Here the whole path is simulated at once, then
//! slowed down to match the times the search relied on. The times are
//! pinned by fixed time points, starting with one per stop. When the
//! resulting envelope conflicts with another train, a fixed point is added
//! near the conflict and the simulation runs again.

use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::error::AllowanceFailure;
use crate::occupancy::{Availability, PathBlock, PathStop, TimedPath};
use crate::search::{Edge, SearchResult, StdcmContext};
use crate::sim::{
    AllowanceDistribution, AllowanceError, AllowanceRange, Envelope, PathRange, SimulationRequest,
};
use crate::{Distance, Error, POSITION_EPSILON, Time, positions_equal};

/// The train has to reach `offset` at `time` (since departure)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixedTimePoint {
    pub offset: Distance,
    pub time: Time,
    /// Set when the train stops there
    pub stop_duration: Option<Time>,
}

/// Result of the post-processing
#[derive(Debug, Clone)]
pub struct FinalEnvelope {
    /// Envelope over the whole path, stop durations excluded
    pub envelope: Envelope,
    pub fixed_points: Vec<FixedTimePoint>,
    pub distribution: AllowanceDistribution,
    /// Simulations run with the distribution that succeeded
    pub iterations: usize,
    pub departure_time: Time,
    pub path: Vec<PathRange>,
    pub blocks: Vec<PathBlock>,
    pub stops: Vec<PathStop>,
}

impl FinalEnvelope {
    /// Arrival time at the destination, its own stop excluded
    pub fn arrival_time(&self) -> Time {
        let end = self.envelope.end_pos();
        let stop_time: Time = self
            .stops
            .iter()
            .filter(|s| s.offset < end - POSITION_EPSILON)
            .map(|s| s.duration)
            .sum();
        self.departure_time + self.envelope.total_time() + stop_time
    }
}

enum Attempt {
    Success {
        envelope: Envelope,
        fixed_points: Vec<FixedTimePoint>,
        iterations: usize,
    },
    Failed(AllowanceFailure),
}

/// Edges of the path with their offsets on the travelled path
struct EdgeRanges<'e> {
    edges: &'e [Edge],
    starts: Vec<Distance>,
    length: Distance,
    final_shift: Time,
}

impl<'e> EdgeRanges<'e> {
    fn new(edges: &'e [Edge], final_shift: Time) -> Self {
        let mut starts = Vec::with_capacity(edges.len());
        let mut length = 0.0;
        for edge in edges {
            starts.push(length);
            length += edge.length();
        }
        Self {
            edges,
            starts,
            length,
            final_shift,
        }
    }

    /// First edge ending at or after `offset`
    fn edge_index_at(&self, offset: Distance) -> Result<usize, Error> {
        self.edges
            .iter()
            .zip(&self.starts)
            .position(|(edge, start)| offset <= start + edge.length() + POSITION_EPSILON)
            .ok_or_else(|| Error::Invariant(format!("offset {offset} is not on the path")))
    }

    fn round_offset(&self, offset: Distance, to_end: bool) -> Result<Distance, Error> {
        let index = self.edge_index_at(offset)?;
        let start = self.starts[index];
        Ok(if to_end {
            start + self.edges[index].length()
        } else {
            start
        })
    }

    /// Time at which the search expected the train at `offset`, relative
    /// to `departure_time`
    fn time_at(&self, offset: Distance, departure_time: Time) -> Result<Time, Error> {
        let index = self.edge_index_at(offset)?;
        let edge = &self.edges[index];
        let on_edge = (offset - self.starts[index]).clamp(0.0, edge.length());
        let entry = edge.time_data.time_with_shift(self.final_shift);
        Ok(entry + edge.timed_envelope().interpolate_time(on_edge) - departure_time)
    }

    fn path_ranges(&self) -> Vec<PathRange> {
        self.edges
            .iter()
            .map(|e| PathRange::new(e.block, e.envelope_start_offset, e.end_offset))
            .collect()
    }

    fn path_blocks(&self, ctx: &StdcmContext<'_>) -> Vec<PathBlock> {
        // a stop splits a block into two edges
        self.edges
            .iter()
            .zip(&self.starts)
            .map(|(edge, start)| PathBlock {
                block: edge.block,
                length: ctx.infra.block_length(edge.block),
                offset: start - edge.envelope_start_offset,
            })
            .dedup_by(|a, b| a.block == b.block && positions_equal(a.offset, b.offset))
            .collect()
    }

    fn stops(&self, ctx: &StdcmContext<'_>) -> Vec<PathStop> {
        self.edges
            .iter()
            .zip(&self.starts)
            .filter(|(edge, _)| edge.end_at_stop)
            .map(|(edge, start)| PathStop {
                offset: start + edge.length(),
                duration: ctx.stop_duration(edge.waypoint_index),
            })
            .collect()
    }
}

struct PostProcessing<'c, 'a, 'e> {
    ctx: &'c StdcmContext<'a>,
    ranges: EdgeRanges<'e>,
    blocks: Vec<PathBlock>,
    stops: Vec<PathStop>,
    departure_time: Time,
    max_effort: Envelope,
}

impl PostProcessing<'_, '_, '_> {
    /// Creates a fixed point at `offset`, rounded to an edge transition:
    /// the end of the edge containing it, else its start, else the offset
    /// itself. The exact time is only known at edge transitions.
    fn make_fixed_point(
        &self,
        fixed_points: &[FixedTimePoint],
        offset: Distance,
        stop_duration: Time,
    ) -> Result<FixedTimePoint, Error> {
        let taken = |x: Distance| fixed_points.iter().any(|p| positions_equal(p.offset, x));
        let mut rounded = self.ranges.round_offset(offset, true)?;
        if taken(rounded) {
            rounded = self.ranges.round_offset(offset, false)?;
        }
        if taken(rounded) || positions_equal(rounded, 0.0) {
            rounded = offset;
        }
        Ok(FixedTimePoint {
            offset: rounded,
            time: self.ranges.time_at(rounded, self.departure_time)?,
            stop_duration: (stop_duration > 0.0).then_some(stop_duration),
        })
    }

    fn initial_fixed_points(&self) -> Result<Vec<FixedTimePoint>, Error> {
        let mut res: Vec<FixedTimePoint> = Vec::new();
        for stop in &self.stops {
            let point = self.make_fixed_point(&res, stop.offset, stop.duration)?;
            insert_sorted(&mut res, point);
        }
        let end = self.max_effort.end_pos();
        let has_end = res.iter().any(|p| positions_equal(p.offset, end));
        if self.ctx.standard_allowance.is_some() && !has_end {
            let point = self.make_fixed_point(&res, end, 0.0)?;
            insert_sorted(&mut res, point);
        }
        Ok(res)
    }

    /// One allowance range ending at each fixed point, plus a range without
    /// added time up to the end of the path
    fn allowance_ranges(&self, fixed_points: &[FixedTimePoint]) -> Vec<AllowanceRange> {
        let envelope = &self.max_effort;
        let mut transition = 0.0;
        let mut transition_time = 0.0;
        let mut previous_added_time = 0.0;
        let mut res = Vec::with_capacity(fixed_points.len() + 1);
        for point in fixed_points {
            let base_time =
                envelope.interpolate_time(point.offset) - envelope.interpolate_time(transition);
            let arrival_time = transition_time + base_time;
            let needed_delay = (point.time - arrival_time - previous_added_time).max(0.0);
            res.push(AllowanceRange {
                begin: transition,
                end: point.offset,
                added_time: needed_delay,
            });
            previous_added_time += needed_delay;
            transition_time += base_time + point.stop_duration.unwrap_or(0.0);
            transition = point.offset;
        }
        if transition < envelope.end_pos() - POSITION_EPSILON {
            res.push(AllowanceRange {
                begin: transition,
                end: envelope.end_pos(),
                added_time: 0.0,
            });
        }
        res
    }

    fn simulate_with_fixed_points(
        &self,
        fixed_points: &[FixedTimePoint],
        distribution: AllowanceDistribution,
    ) -> Result<Envelope, AllowanceError> {
        let ranges = self.allowance_ranges(fixed_points);
        if ranges.iter().all(|r| r.added_time <= 0.0) {
            return Ok(self.max_effort.clone());
        }
        self.ctx
            .simulator
            .apply_allowance(&self.max_effort, &ranges, distribution)
    }

    fn first_conflict(&self, envelope: &Envelope) -> Option<Distance> {
        let path = TimedPath {
            blocks: self.blocks.clone(),
            envelope,
            envelope_offset: 0.0,
            stops: self.stops.clone(),
        };
        let availability =
            self.ctx
                .availability
                .availability(&path, 0.0, envelope.end_pos(), self.departure_time);
        match availability {
            Availability::Available { .. } => None,
            Availability::Unavailable {
                first_conflict_offset,
                ..
            } => Some(first_conflict_offset),
        }
    }

    fn attempt(&self, distribution: AllowanceDistribution) -> Result<Attempt, Error> {
        let mut fixed_points = self.initial_fixed_points()?;
        let max_iterations = self.ranges.edges.len() * 2;
        for iteration in 1..=max_iterations {
            let envelope = match self.simulate_with_fixed_points(&fixed_points, distribution) {
                Ok(envelope) => envelope,
                Err(AllowanceError::TooMuchTime { .. }) => {
                    info!("Can't slow down enough to match the fixed points with a {distribution:?} allowance");
                    return Ok(Attempt::Failed(AllowanceFailure::TooMuchTime));
                }
                Err(e) => return Err(e.into()),
            };
            let Some(conflict) = self.first_conflict(&envelope) else {
                return Ok(Attempt::Success {
                    envelope,
                    fixed_points,
                    iterations: iteration,
                });
            };
            if fixed_points
                .iter()
                .any(|p| positions_equal(p.offset, conflict))
            {
                return Ok(Attempt::Failed(AllowanceFailure::RepeatedConflict {
                    offset: conflict,
                }));
            }
            info!("Conflict in new envelope at offset {conflict:.1}, splitting {distribution:?} ranges");
            let point = self.make_fixed_point(&fixed_points, conflict, 0.0)?;
            if positions_equal(point.offset, 0.0) {
                return Ok(Attempt::Failed(AllowanceFailure::RepeatedConflict {
                    offset: conflict,
                }));
            }
            debug!("New fixed point at {:.1}, time {:.1}", point.offset, point.time);
            insert_sorted(&mut fixed_points, point);
        }
        Ok(Attempt::Failed(AllowanceFailure::IterationLimit {
            iterations: max_iterations,
        }))
    }
}

fn insert_sorted(points: &mut Vec<FixedTimePoint>, point: FixedTimePoint) {
    if points.iter().any(|p| positions_equal(p.offset, point.offset)) {
        return;
    }
    let index = points.partition_point(|p| p.offset < point.offset);
    points.insert(index, point);
}

/// Builds the final envelope of a path found by the search.
///
/// Tries a Mareco distribution first and falls back to a linear one.
///
/// # Errors
///
/// Returns [`Error::StandardAllowance`] when neither distribution gives a
/// conflict-free envelope, and propagates simulation errors.
pub fn build_final_envelope(
    ctx: &StdcmContext<'_>,
    search: &SearchResult,
) -> Result<FinalEnvelope, Error> {
    if search.edges.is_empty() {
        return Err(Error::Invariant("empty path".to_string()));
    }
    let ranges = EdgeRanges::new(&search.edges, search.departure_time_shift);
    let path = ranges.path_ranges();
    let blocks = ranges.path_blocks(ctx);
    let stops = ranges.stops(ctx);

    let mut request = SimulationRequest::new(path.clone(), 0.0);
    request.stops = stops.iter().map(|s| s.offset).collect();
    let max_effort = ctx.simulator.simulate(&request)?;
    if !positions_equal(max_effort.end_pos(), ranges.length) {
        return Err(Error::Invariant(format!(
            "simulated path length {} differs from the edges length {}",
            max_effort.end_pos(),
            ranges.length
        )));
    }

    let post = PostProcessing {
        ctx,
        ranges,
        blocks,
        stops,
        departure_time: ctx.start_time + search.departure_time_shift,
        max_effort,
    };

    let mareco = match post.attempt(AllowanceDistribution::Mareco)? {
        Attempt::Success {
            envelope,
            fixed_points,
            iterations,
        } => return Ok(post.finish(envelope, fixed_points, AllowanceDistribution::Mareco, iterations)),
        Attempt::Failed(failure) => failure,
    };
    info!("Failed to compute a mareco standard allowance ({mareco}), falling back to linear");
    match post.attempt(AllowanceDistribution::Linear)? {
        Attempt::Success {
            envelope,
            fixed_points,
            iterations,
        } => Ok(post.finish(envelope, fixed_points, AllowanceDistribution::Linear, iterations)),
        Attempt::Failed(linear) => Err(Error::StandardAllowance { mareco, linear }),
    }
}

impl PostProcessing<'_, '_, '_> {
    fn finish(
        self,
        envelope: Envelope,
        fixed_points: Vec<FixedTimePoint>,
        distribution: AllowanceDistribution,
        iterations: usize,
    ) -> FinalEnvelope {
        FinalEnvelope {
            envelope,
            fixed_points,
            distribution,
            iterations,
            departure_time: self.departure_time,
            path: self.ranges.path_ranges(),
            blocks: self.blocks,
            stops: self.stops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockLocation, BlockNetwork, Comfort, RollingStock, StdcmStep};
    use crate::occupancy::OccupancyTable;
    use crate::search::{Node, NodeLocation, SearchArena, TimeData};
    use crate::sim::KinematicSimulator;
    use crate::{SimulationConfig, StdcmConfig};

    /// Three edges of 100m at 10m/s, entered at 0s, 10s and 20s
    fn edges() -> Vec<Edge> {
        let mut arena = SearchArena::new();
        let origin = arena.add_node(Node {
            time_data: TimeData::at_departure(0.0, 0.0),
            speed: 10.0,
            location: NodeLocation::OnBlock {
                block: 0,
                offset: 0.0,
            },
            previous_edge: None,
            waypoint_index: 0,
            stop_duration: None,
            remaining_time_estimate: 0.0,
        });
        (0..3)
            .map(|block| Edge {
                block,
                envelope: Envelope::from_speeds(&[0.0, 100.0], &[10.0, 10.0]).unwrap(),
                envelope_start_offset: 0.0,
                end_offset: 100.0,
                time_data: TimeData::at_departure(10.0 * block as f64, 0.0),
                added_delay: 0.0,
                previous_node: origin,
                minute_time_start: 0,
                standard_allowance_speed_factor: 1.0,
                waypoint_index: 0,
                end_at_stop: false,
            })
            .collect()
    }

    fn with_post_processing(f: impl FnOnce(&PostProcessing<'_, '_, '_>)) {
        let mut builder = BlockNetwork::builder();
        for name in ["b0", "b1", "b2"] {
            builder.add_block(name, 100.0, 10.0).unwrap();
        }
        builder.connect(0, 1).unwrap();
        builder.connect(1, 2).unwrap();
        let infra = builder.build();
        let train = RollingStock {
            name: "test".to_string(),
            length: 50.0,
            max_speed: 10.0,
            max_acceleration: 0.5,
            max_deceleration: 0.5,
            comfort: Comfort::Standard,
        };
        let steps = vec![
            StdcmStep::pass_through(BlockLocation::new(0, 0.0)),
            StdcmStep::stop_at(BlockLocation::new(2, 100.0), 0.0),
        ];
        let table = OccupancyTable::new();
        let sim = KinematicSimulator::new(&infra, &train, SimulationConfig::default()).unwrap();
        let config = StdcmConfig::default();
        let ctx = StdcmContext::new(&infra, &sim, &table, &train, &steps, &config, 0.0, None);

        let edges = edges();
        let ranges = EdgeRanges::new(&edges, 0.0);
        let post = PostProcessing {
            ctx: &ctx,
            blocks: ranges.path_blocks(&ctx),
            stops: ranges.stops(&ctx),
            ranges,
            departure_time: 0.0,
            max_effort: Envelope::from_speeds(&[0.0, 300.0], &[10.0, 10.0]).unwrap(),
        };
        f(&post);
    }

    fn point(offset: Distance, time: Time) -> FixedTimePoint {
        FixedTimePoint {
            offset,
            time,
            stop_duration: None,
        }
    }

    #[test]
    fn offsets_round_to_edge_transitions() {
        let edges = edges();
        let ranges = EdgeRanges::new(&edges, 0.0);
        assert_eq!(ranges.length, 300.0);
        assert_eq!(ranges.round_offset(150.0, true).unwrap(), 200.0);
        assert_eq!(ranges.round_offset(150.0, false).unwrap(), 100.0);
        // a transition belongs to the edge ending there
        assert_eq!(ranges.round_offset(100.0, true).unwrap(), 100.0);
        assert!(ranges.edge_index_at(301.0).is_err());
        assert!((ranges.time_at(150.0, 0.0).unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_point_at_the_end_of_the_edge() {
        with_post_processing(|post| {
            let p = post.make_fixed_point(&[], 150.0, 0.0).unwrap();
            assert_eq!(p.offset, 200.0);
            assert!((p.time - 20.0).abs() < 1e-9);
            assert_eq!(p.stop_duration, None);
        });
    }

    #[test]
    fn fixed_point_falls_back_to_the_edge_start() {
        with_post_processing(|post| {
            let p = post.make_fixed_point(&[point(200.0, 20.0)], 150.0, 0.0).unwrap();
            assert_eq!(p.offset, 100.0);
            assert!((p.time - 10.0).abs() < 1e-9);
        });
    }

    #[test]
    fn fixed_point_on_the_exact_offset_when_both_ends_are_taken() {
        with_post_processing(|post| {
            let taken = [point(100.0, 10.0), point(200.0, 20.0)];
            let p = post.make_fixed_point(&taken, 150.0, 0.0).unwrap();
            assert_eq!(p.offset, 150.0);
            assert!((p.time - 15.0).abs() < 1e-9);
        });
    }

    #[test]
    fn fixed_point_never_at_the_path_start() {
        with_post_processing(|post| {
            let p = post.make_fixed_point(&[point(100.0, 10.0)], 50.0, 30.0).unwrap();
            assert_eq!(p.offset, 50.0);
            assert!((p.time - 5.0).abs() < 1e-9);
            assert_eq!(p.stop_duration, Some(30.0));
        });
    }

    #[test]
    fn inserting_keeps_points_sorted_and_unique() {
        let mut points = Vec::new();
        insert_sorted(&mut points, point(200.0, 20.0));
        insert_sorted(&mut points, point(100.0, 10.0));
        insert_sorted(&mut points, point(200.0, 25.0));
        assert_eq!(points, vec![point(100.0, 10.0), point(200.0, 20.0)]);
    }
}
