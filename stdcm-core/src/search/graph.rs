use log::trace;

use super::StdcmContext;
use super::arena::{EdgeId, Node, NodeId, NodeLocation, SearchArena};
use super::edge_builder::{EdgeBuilder, SPEED_EPSILON, add_node_after_edge};
use super::explorer;
use super::time_data::TimeData;
use super::visited::{Fingerprint, VisitedNodes};
use crate::{Error, POSITION_EPSILON, Time};

/// Search graph over blocks, with time as an extra dimension.
///
/// Owns the arena and the visited set of one search.
pub struct StdcmGraph<'c, 'a> {
    ctx: &'c StdcmContext<'a>,
    arena: SearchArena,
    visited: VisitedNodes,
}

impl<'c, 'a> StdcmGraph<'c, 'a> {
    pub fn new(ctx: &'c StdcmContext<'a>) -> Self {
        Self {
            ctx,
            arena: SearchArena::new(),
            visited: VisitedNodes::new(ctx.config.minimum_visit_gap),
        }
    }

    pub fn ctx(&self) -> &'c StdcmContext<'a> {
        self.ctx
    }

    pub fn arena(&self) -> &SearchArena {
        &self.arena
    }

    /// One node per location of the first step, at the requested start time
    pub fn origin_nodes(&mut self) -> Vec<NodeId> {
        let Some(origin) = self.ctx.steps.first() else {
            return Vec::new();
        };
        let mut res = Vec::new();
        for loc in &origin.locations {
            let length = self.ctx.infra.block_length(loc.block);
            let location = if loc.offset >= length - POSITION_EPSILON {
                NodeLocation::BlockExit(loc.block)
            } else {
                NodeLocation::OnBlock {
                    block: loc.block,
                    offset: loc.offset,
                }
            };
            let node = Node {
                time_data: TimeData::at_departure(
                    self.ctx.start_time,
                    self.ctx.config.maximum_departure_delay,
                ),
                speed: 0.0,
                location,
                previous_edge: None,
                waypoint_index: 0,
                stop_duration: None,
                remaining_time_estimate: self.ctx.estimator.estimate(loc.block, loc.offset, 0),
            };
            res.push(self.arena.add_node(node));
        }
        res
    }

    /// How much time could be added before the node with engineering
    /// allowances. Looks back until an edge starting from a standstill or
    /// the lookback distance, infinite when nothing is occupied later.
    fn estimate_max_margin(&self, node_id: NodeId) -> Time {
        let node = self.arena.node(node_id);
        let shift = node.time_data.departure_time_shift;
        let mut margin = f64::INFINITY;
        let mut distance = 0.0;
        let mut current = node.previous_edge;
        while let Some(edge_id) = current {
            let edge = self.arena.edge(edge_id);
            margin = margin.min(edge.margin(shift).max(0.0));
            distance += edge.length();
            if edge.envelope.begin_speed() < SPEED_EPSILON
                || distance >= self.ctx.config.margin_lookback_distance
            {
                break;
            }
            current = self.arena.node(edge.previous_node).previous_edge;
        }
        margin
    }

    /// Edges leaving the node, skipping the candidates whose start has
    /// already been visited in a better state
    ///
    /// # Errors
    ///
    /// Returns an error if building edges fails
    pub fn adjacent_edges(&mut self, node_id: NodeId) -> Result<Vec<EdgeId>, Error> {
        let node = self.arena.node(node_id);
        let time = node.time();
        let remaining = node.remaining_time_estimate;
        let waypoint_index = node.waypoint_index;
        let slack = node.time_data.max_departure_delay.max(0.0) + self.estimate_max_margin(node_id);

        let mut candidates = explorer::candidates(self.ctx, node);
        candidates.retain(|candidate| {
            let fingerprint =
                Fingerprint::new(candidate.block, waypoint_index, candidate.start_offset);
            if self.visited.is_visited(&fingerprint, time, slack, remaining) {
                trace!("block {} at {time:.1}: already visited", candidate.block);
                return false;
            }
            self.visited
                .mark_visited(fingerprint, time, slack, remaining);
            true
        });
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        EdgeBuilder::from_node(self.ctx, &mut self.arena, node_id).make_edges_for(&candidates)
    }

    /// Adds the node reached at the end of the edge
    pub fn edge_end_node(&mut self, edge: EdgeId) -> NodeId {
        add_node_after_edge(self.ctx, &mut self.arena, edge)
    }

    pub fn into_arena(self) -> SearchArena {
        self.arena
    }
}
