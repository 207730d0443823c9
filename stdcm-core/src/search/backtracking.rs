//! Fixes speed discontinuities by re-simulating the previous edges with a
//! lower exit speed.
//!
//! This happens when an edge has to start slower than the previous one
//! ended, because what comes next was too far ahead to be seen when the
//! previous edge was built.

use log::debug;

use super::StdcmContext;
use super::arena::{EdgeId, NodeId, SearchArena};
use super::edge_builder::{
    SPEED_EPSILON, add_node_after_edge, find_edge_same_next_occupancy, simulate_candidate,
};
use super::explorer::EdgeCandidate;
use crate::sim::Envelope;
use crate::{Error, Speed};

pub struct BacktrackingManager<'c, 'a> {
    ctx: &'c StdcmContext<'a>,
    arena: &'c mut SearchArena,
}

impl<'c, 'a> BacktrackingManager<'c, 'a> {
    pub fn new(ctx: &'c StdcmContext<'a>, arena: &'c mut SearchArena) -> Self {
        Self { ctx, arena }
    }

    /// Returns a new version of `node`, reached at `target_speed`, or `None`
    /// if it can't be done within the backtracking window.
    ///
    /// # Errors
    ///
    /// Returns an error if a re-simulation fails
    pub fn fix_speed_discontinuity(
        &mut self,
        node: NodeId,
        target_speed: Speed,
    ) -> Result<Option<NodeId>, Error> {
        let mut resimulated: Vec<(EdgeId, Envelope)> = Vec::new();
        let mut current = node;
        let mut speed = target_speed;
        for _ in 0..self.ctx.config.max_backtracking_depth {
            let Some(edge_id) = self.arena.previous_edge(current) else {
                return Ok(None);
            };
            let edge = self.arena.edge(edge_id);
            let previous_id = edge.previous_node;
            let previous_speed = self.arena.node(previous_id).speed;
            let candidate = EdgeCandidate::from_edge(edge, Some(speed));

            let envelope = simulate_candidate(self.ctx, &candidate, previous_speed)?;
            if (envelope.end_speed() - speed).abs() > SPEED_EPSILON {
                debug!(
                    "block {}: re-simulation ends at {} m/s instead of {speed} m/s",
                    candidate.block,
                    envelope.end_speed()
                );
                return Ok(None);
            }
            let begin_speed = envelope.begin_speed();
            resimulated.push((edge_id, envelope));
            if begin_speed < previous_speed - SPEED_EPSILON {
                current = previous_id;
                speed = begin_speed;
                continue;
            }
            return Ok(self.rebuild(previous_id, resimulated));
        }
        debug!(
            "speed discontinuity not fixed after {} edges",
            self.ctx.config.max_backtracking_depth
        );
        Ok(None)
    }

    /// Rebuilds the edges forward from `from` with their new envelopes
    fn rebuild(&mut self, from: NodeId, resimulated: Vec<(EdgeId, Envelope)>) -> Option<NodeId> {
        let mut previous = from;
        for (edge_id, envelope) in resimulated.into_iter().rev() {
            let old = self.arena.edge(edge_id);
            let candidate = EdgeCandidate::from_edge(old, None);
            let edge = find_edge_same_next_occupancy(
                self.ctx,
                self.arena,
                previous,
                &candidate,
                envelope,
                old.added_delay,
                old.time_next_occupancy(),
            )?;
            let id = self.arena.add_edge(edge);
            previous = add_node_after_edge(self.ctx, self.arena, id);
        }
        Some(previous)
    }
}
