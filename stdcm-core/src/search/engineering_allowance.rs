//! Slows down the previous edges when an edge needs more delay than the
//! departure time shift can give.

use log::debug;

use super::StdcmContext;
use super::arena::{Edge, EdgeId, Node, NodeId, SearchArena};
use super::delay::{DelayManager, Opening};
use super::edge_builder::{add_node_after_edge, find_edge_same_next_occupancy, make_single_edge};
use super::explorer::EdgeCandidate;
use crate::sim::{AllowanceDistribution, AllowanceError, AllowanceRange, Envelope};
use crate::{Error, Time};

pub struct EngineeringAllowanceManager<'c, 'a> {
    ctx: &'c StdcmContext<'a>,
    arena: &'c mut SearchArena,
}

impl<'c, 'a> EngineeringAllowanceManager<'c, 'a> {
    pub fn new(ctx: &'c StdcmContext<'a>, arena: &'c mut SearchArena) -> Self {
        Self { ctx, arena }
    }

    /// Edges that can be slowed down by `delay` without reaching their next
    /// occupancy, walking back from the node. Stops at the previous stop.
    fn affected_edges(&self, node: &Node, delay: Time) -> Vec<EdgeId> {
        let shift = node.time_data.departure_time_shift;
        let mut res = Vec::new();
        let mut current = node.previous_edge;
        while let Some(edge_id) = current {
            if res.len() >= self.ctx.config.max_allowance_edges {
                break;
            }
            let edge = self.arena.edge(edge_id);
            if edge.end_at_stop || edge.margin(shift) < delay {
                break;
            }
            res.push(edge_id);
            current = self.arena.node(edge.previous_node).previous_edge;
        }
        res.reverse();
        res
    }

    fn apply_allowance(&self, envelope: &Envelope, added_time: Time) -> Result<Option<Envelope>, Error> {
        let range = AllowanceRange {
            begin: 0.0,
            end: envelope.end_pos(),
            added_time,
        };
        for distribution in [AllowanceDistribution::Mareco, AllowanceDistribution::Linear] {
            match self
                .ctx
                .simulator
                .apply_allowance(envelope, &[range], distribution)
            {
                Ok(res) => return Ok(Some(res)),
                Err(AllowanceError::TooMuchTime { .. }) => {
                    debug!("{distribution:?} engineering allowance of {added_time:.1}s needs too much time");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Tries to reach `opening` by shifting the departure time as much as
    /// possible, then slowing down the previous edges for the remaining
    /// delay. Returns the edge entered during the opening.
    ///
    /// # Errors
    ///
    /// Returns an error if applying the allowance fails for another reason
    /// than needing too much time
    pub fn try_engineering_allowance(
        &mut self,
        node_id: NodeId,
        candidate: &EdgeCandidate,
        envelope: &Envelope,
        opening: &Opening,
    ) -> Result<Option<Edge>, Error> {
        let node = self.arena.node(node_id).clone();
        let shift = node.time_data.max_departure_delay.max(0.0);
        let needed = opening.delay - shift;
        let affected = self.affected_edges(&node, opening.delay);
        if affected.is_empty() {
            return Ok(None);
        }
        let edges: Vec<Edge> = affected.iter().map(|&id| self.arena.edge(id).clone()).collect();

        let envelopes: Vec<Envelope> = edges.iter().map(|e| e.envelope.clone()).collect();
        let joined = Envelope::concat(&envelopes);
        let factor = edges
            .iter()
            .map(|e| e.standard_allowance_speed_factor)
            .fold(0.0, f64::max);
        let Some(slowed) = self.apply_allowance(&joined, needed * factor)? else {
            return Ok(None);
        };
        debug!(
            "engineering allowance of {needed:.1}s over {} edges to reach block {}",
            edges.len(),
            candidate.block
        );

        let new_shift = node.time_data.departure_time_shift + shift;
        let mut previous = edges[0].previous_node;
        let mut offset = 0.0;
        for (i, old) in edges.iter().enumerate() {
            let length = old.envelope.end_pos();
            let part = slowed.slice(offset, offset + length);
            offset += length;
            let delay = if i == 0 {
                new_shift - self.arena.node(previous).time_data.departure_time_shift
            } else {
                0.0
            };
            let Some(edge) = find_edge_same_next_occupancy(
                self.ctx,
                self.arena,
                previous,
                &EdgeCandidate::from_edge(old, None),
                part,
                delay,
                old.time_next_occupancy(),
            ) else {
                return Ok(None);
            };
            let id = self.arena.add_edge(edge);
            previous = add_node_after_edge(self.ctx, self.arena, id);
        }

        // The new edge, in the same opening, without any further allowance
        let rebuilt = self.arena.node(previous).clone();
        let factor = self.ctx.speed_factor(envelope, candidate.length());
        let timed = envelope.scaled(factor);
        let Some((maximum_delay, next_conflict)) =
            DelayManager::new(self.ctx).maximum_added_delay(candidate, &timed, rebuilt.time())
        else {
            return Ok(None);
        };
        if !crate::times_equal(next_conflict, opening.time_of_next_conflict) {
            return Ok(None);
        }
        Ok(Some(make_single_edge(
            self.ctx,
            previous,
            &rebuilt,
            candidate,
            envelope.clone(),
            0.0,
            rebuilt.time_data.max_departure_delay.min(maximum_delay),
            next_conflict,
        )))
    }
}
