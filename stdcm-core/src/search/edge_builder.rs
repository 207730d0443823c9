//! Builds the edges leaving a node.

use log::trace;

use super::StdcmContext;
use super::arena::{Edge, EdgeId, Node, NodeId, NodeLocation, SearchArena, time_bucket};
use super::backtracking::BacktrackingManager;
use super::delay::DelayManager;
use super::engineering_allowance::EngineeringAllowanceManager;
use super::explorer::EdgeCandidate;
use crate::sim::{Envelope, PathRange, SimulationRequest};
use crate::{Error, POSITION_EPSILON, Speed, TIME_EPSILON, Time};

/// Speeds closer than this are continuous
pub(crate) const SPEED_EPSILON: Speed = 1e-6;

pub struct EdgeBuilder<'c, 'a> {
    ctx: &'c StdcmContext<'a>,
    arena: &'c mut SearchArena,
    node: NodeId,
}

impl<'c, 'a> EdgeBuilder<'c, 'a> {
    pub fn from_node(ctx: &'c StdcmContext<'a>, arena: &'c mut SearchArena, node: NodeId) -> Self {
        Self { ctx, arena, node }
    }

    /// Every valid edge leaving the node along the given candidates. Dead
    /// ends give no edge, not an error.
    ///
    /// The previous node of the returned edges may be a rebuilt version of
    /// the starting node, when backtracking or engineering allowances were
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the simulator fails or an internal invariant is
    /// broken
    pub fn make_edges_for(mut self, candidates: &[EdgeCandidate]) -> Result<Vec<EdgeId>, Error> {
        let node = self.arena.node(self.node).clone();
        let mut res = Vec::new();
        for candidate in candidates {
            res.extend(self.make_edges(&node, candidate)?);
        }
        Ok(res)
    }

    fn make_edges(&mut self, node: &Node, candidate: &EdgeCandidate) -> Result<Vec<EdgeId>, Error> {
        let envelope = simulate_candidate(self.ctx, candidate, node.speed)?;

        let base_id = if envelope.begin_speed() > node.speed + SPEED_EPSILON {
            return Err(Error::Invariant(format!(
                "envelope on block {} starts at {} m/s, faster than the {} m/s reached",
                candidate.block,
                envelope.begin_speed(),
                node.speed
            )));
        } else if envelope.begin_speed() < node.speed - SPEED_EPSILON {
            let fixed = BacktrackingManager::new(self.ctx, &mut *self.arena)
                .fix_speed_discontinuity(self.node, envelope.begin_speed())?;
            match fixed {
                Some(id) => id,
                None => {
                    trace!("block {}: speed discontinuity can't be fixed", candidate.block);
                    return Ok(Vec::new());
                }
            }
        } else {
            self.node
        };
        let base = self.arena.node(base_id).clone();

        let factor = self.ctx.speed_factor(&envelope, candidate.length());
        let timed = envelope.scaled(factor);
        let delay_manager = DelayManager::new(self.ctx);
        let max_delay = base.time_data.max_departure_delay.max(0.0);
        let run_time = base.time_data.run_time(self.ctx.start_time) + timed.total_time();
        let allowance_budget = (self.ctx.config.max_run_time - run_time).max(0.0);
        let openings = delay_manager.minimum_delays_per_opening(
            candidate,
            &timed,
            base.time(),
            max_delay + allowance_budget,
        );

        let mut res = Vec::new();
        for opening in openings {
            let edge = if opening.delay <= max_delay + TIME_EPSILON {
                let delay = opening.delay.min(max_delay);
                Some(make_single_edge(
                    self.ctx,
                    base_id,
                    &base,
                    candidate,
                    envelope.clone(),
                    delay,
                    (max_delay - delay).min(opening.maximum_delay),
                    opening.time_of_next_conflict,
                ))
            } else {
                EngineeringAllowanceManager::new(self.ctx, &mut *self.arena)
                    .try_engineering_allowance(base_id, candidate, &envelope, &opening)?
            };
            let Some(edge) = edge else {
                continue;
            };
            if delay_manager.is_run_time_too_long(&edge) {
                trace!("block {}: run time too long", edge.block);
                continue;
            }
            res.push(self.arena.add_edge(edge));
        }
        Ok(res)
    }
}

/// Simulates the train on the candidate edge alone
pub(crate) fn simulate_candidate(
    ctx: &StdcmContext<'_>,
    candidate: &EdgeCandidate,
    begin_speed: Speed,
) -> Result<Envelope, Error> {
    let range = PathRange::new(candidate.block, candidate.start_offset, candidate.end.offset);
    let mut request = SimulationRequest::new(vec![range], begin_speed);
    request.end_speed = candidate.exit_speed_limit;
    if candidate.end.stop {
        request.stops.push(candidate.length());
    }
    Ok(ctx.simulator.simulate(&request)?)
}

/// Edge entered `delay` after the previous node, the departure time being
/// shifted by as much
#[allow(clippy::too_many_arguments)]
pub(crate) fn make_single_edge(
    ctx: &StdcmContext<'_>,
    previous_id: NodeId,
    previous: &Node,
    candidate: &EdgeCandidate,
    envelope: Envelope,
    delay: Time,
    max_delay_after: Time,
    time_of_next_conflict: Time,
) -> Edge {
    let factor = ctx.speed_factor(&envelope, candidate.length());
    let time_data = previous
        .time_data
        .delayed(delay, max_delay_after.max(0.0), time_of_next_conflict);
    Edge {
        block: candidate.block,
        envelope,
        envelope_start_offset: candidate.start_offset,
        end_offset: candidate.end.offset,
        minute_time_start: time_bucket(
            time_data.earliest_reachable_time,
            ctx.config.edge_time_bucket,
        ),
        time_data,
        added_delay: delay,
        previous_node: previous_id,
        standard_allowance_speed_factor: factor,
        waypoint_index: candidate.end.waypoint_index,
        end_at_stop: candidate.end.stop,
    }
}

/// Rebuilds an edge on a new envelope, entered `delay` after `previous`.
///
/// The edge must stay in the same conflict-free window, i.e. lead to the
/// same next occupancy, otherwise the times computed downstream would be
/// wrong.
pub(crate) fn find_edge_same_next_occupancy(
    ctx: &StdcmContext<'_>,
    arena: &SearchArena,
    previous_id: NodeId,
    candidate: &EdgeCandidate,
    envelope: Envelope,
    delay: Time,
    time_of_next_conflict: Time,
) -> Option<Edge> {
    let previous = arena.node(previous_id);
    let max_delay = previous.time_data.max_departure_delay;
    if delay > max_delay + TIME_EPSILON {
        return None;
    }
    let factor = ctx.speed_factor(&envelope, candidate.length());
    let timed = envelope.scaled(factor);
    let (maximum_delay, next_conflict) = DelayManager::new(ctx).maximum_added_delay(
        candidate,
        &timed,
        previous.time() + delay,
    )?;
    if !crate::times_equal(next_conflict, time_of_next_conflict) {
        return None;
    }
    Some(make_single_edge(
        ctx,
        previous_id,
        previous,
        candidate,
        envelope,
        delay,
        (max_delay - delay).min(maximum_delay),
        next_conflict,
    ))
}

/// The node reached at the end of an edge
pub(crate) fn node_after_edge(ctx: &StdcmContext<'_>, edge_id: EdgeId, edge: &Edge) -> Node {
    let length = ctx.infra.block_length(edge.block);
    let stop_duration = edge
        .end_at_stop
        .then(|| ctx.stop_duration(edge.waypoint_index));
    let location = if edge.end_at_stop && edge.end_offset < length - POSITION_EPSILON {
        NodeLocation::OnBlock {
            block: edge.block,
            offset: edge.end_offset,
        }
    } else {
        NodeLocation::BlockExit(edge.block)
    };
    let remaining_time_estimate =
        ctx.estimator
            .estimate(edge.block, edge.end_offset, edge.waypoint_index);
    let speed = if edge.end_at_stop {
        0.0
    } else {
        edge.envelope.end_speed()
    };
    Node {
        time_data: edge
            .time_data
            .after(edge.total_time() + stop_duration.unwrap_or(0.0)),
        speed,
        location,
        previous_edge: Some(edge_id),
        waypoint_index: edge.waypoint_index,
        stop_duration,
        remaining_time_estimate,
    }
}

/// Adds the node at the end of `edge_id` to the arena
pub(crate) fn add_node_after_edge(
    ctx: &StdcmContext<'_>,
    arena: &mut SearchArena,
    edge_id: EdgeId,
) -> NodeId {
    let node = node_after_edge(ctx, edge_id, arena.edge(edge_id));
    arena.add_node(node)
}
