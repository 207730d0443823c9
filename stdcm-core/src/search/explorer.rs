//! Where edges leaving a node go, and how fast the train may leave them.

use crate::model::{BlockLocation, Infrastructure};
use crate::{BlockId, Distance, POSITION_EPSILON, Speed};

use super::StdcmContext;
use super::arena::{Edge, Node, NodeLocation};

/// Where an edge stops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEnd {
    pub offset: Distance,
    /// Last step passed at the end of the edge
    pub waypoint_index: usize,
    /// The train stops at the end of the edge
    pub stop: bool,
}

/// An edge that could be built from a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCandidate {
    pub block: BlockId,
    pub start_offset: Distance,
    pub end: EdgeEnd,
    /// Highest speed at the edge exit that lets the train brake in time
    /// for whatever comes next
    pub exit_speed_limit: Option<Speed>,
}

impl EdgeCandidate {
    pub fn length(&self) -> Distance {
        self.end.offset - self.start_offset
    }

    /// Geometry of an existing edge, for re-simulations
    pub fn from_edge(edge: &Edge, exit_speed_limit: Option<Speed>) -> Self {
        Self {
            block: edge.block,
            start_offset: edge.envelope_start_offset,
            end: EdgeEnd {
                offset: edge.end_offset,
                waypoint_index: edge.waypoint_index,
                stop: edge.end_at_stop,
            },
            exit_speed_limit,
        }
    }
}

/// Offset of a step location seen from `block`. A location at the entry of
/// a successor is the exit of the block.
fn location_offset(
    location: &BlockLocation,
    block: BlockId,
    length: Distance,
    successors: &[BlockId],
) -> Option<Distance> {
    if location.block == block {
        Some(location.offset)
    } else if location.offset <= POSITION_EPSILON && successors.contains(&location.block) {
        Some(length)
    } else {
        None
    }
}

/// Finds where an edge starting at `start` on `block` ends: at the first
/// stop found on the block, or at its exit.
pub fn find_edge_end(
    ctx: &StdcmContext<'_>,
    block: BlockId,
    start: Distance,
    waypoint_index: usize,
) -> EdgeEnd {
    let length = ctx.infra.block_length(block);
    let successors = ctx.infra.successors(block);
    let mut position = start;
    let mut waypoint = waypoint_index;
    for index in waypoint_index + 1..ctx.steps.len() {
        let next = ctx.steps[index]
            .locations
            .iter()
            .filter_map(|loc| location_offset(loc, block, length, &successors))
            .filter(|&offset| offset > start + POSITION_EPSILON && offset >= position - POSITION_EPSILON)
            .min_by(f64::total_cmp);
        let Some(offset) = next else {
            break;
        };
        waypoint = index;
        if ctx.is_stop(index) {
            return EdgeEnd {
                offset,
                waypoint_index: index,
                stop: true,
            };
        }
        position = offset;
    }
    EdgeEnd {
        offset: length,
        waypoint_index: waypoint,
        stop: false,
    }
}

/// Lowest speed constraint ahead of a block exit, over every way the
/// train could go within `depth` blocks.
///
/// The same edge is shared by all the continuations, so its exit speed
/// must suit all of them.
fn lookahead_speed_limit(
    ctx: &StdcmContext<'_>,
    block: BlockId,
    distance: Distance,
    waypoint_index: usize,
    depth: usize,
) -> Speed {
    let deceleration = ctx.rolling_stock.max_deceleration;
    let braking = |d: Distance, speed: Speed| (speed * speed + 2.0 * deceleration * d).sqrt();

    let mut limit = f64::INFINITY;
    for section in ctx.mrsp().get(block).iter() {
        limit = limit.min(braking(distance + section.begin, section.speed));
    }
    let end = find_edge_end(ctx, block, 0.0, waypoint_index);
    if end.stop {
        return limit.min(braking(distance + end.offset, 0.0));
    }
    if depth > 1 {
        let length = ctx.infra.block_length(block);
        for next in ctx.infra.successors(block) {
            let next_limit =
                lookahead_speed_limit(ctx, next, distance + length, end.waypoint_index, depth - 1);
            limit = limit.min(next_limit);
        }
    }
    limit
}

fn exit_speed_limit(ctx: &StdcmContext<'_>, block: BlockId, waypoint_index: usize) -> Option<Speed> {
    let depth = ctx.config.lookahead_blocks;
    let limit = ctx
        .infra
        .successors(block)
        .into_iter()
        .map(|next| lookahead_speed_limit(ctx, next, 0.0, waypoint_index, depth))
        .fold(f64::INFINITY, f64::min);
    limit.is_finite().then_some(limit)
}

fn candidate(
    ctx: &StdcmContext<'_>,
    block: BlockId,
    start_offset: Distance,
    waypoint_index: usize,
) -> Option<EdgeCandidate> {
    let end = find_edge_end(ctx, block, start_offset, waypoint_index);
    if end.offset - start_offset < POSITION_EPSILON {
        return None;
    }
    let exit_speed_limit = if end.stop {
        None
    } else {
        if ctx.infra.successors(block).is_empty() {
            // dead end
            return None;
        }
        exit_speed_limit(ctx, block, end.waypoint_index)
    };
    Some(EdgeCandidate {
        block,
        start_offset,
        end,
        exit_speed_limit,
    })
}

/// All the edges that could leave the node
pub fn candidates(ctx: &StdcmContext<'_>, node: &Node) -> Vec<EdgeCandidate> {
    match node.location {
        NodeLocation::BlockExit(block) => ctx
            .infra
            .successors(block)
            .into_iter()
            .filter_map(|next| candidate(ctx, next, 0.0, node.waypoint_index))
            .collect(),
        NodeLocation::OnBlock { block, offset } => {
            candidate(ctx, block, offset, node.waypoint_index)
                .into_iter()
                .collect()
        }
    }
}
