use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use hashbrown::HashSet;
use log::{debug, info, warn};

use super::StdcmContext;
use super::arena::{Edge, EdgeKey, NodeId};
use super::graph::StdcmGraph;
use crate::{Error, Time};

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: Time,
    node: NodeId,
}

impl Eq for State {}

// Min-heap by cost, oldest node first on ties
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Path found by the search
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Edges from the origin to the destination
    pub edges: Vec<Edge>,
    /// Total departure time shift, the train leaves at start time + shift
    pub departure_time_shift: Time,
    /// Arrival time at the destination, with the final departure time
    pub arrival_time: Time,
    /// Number of expanded nodes
    pub iterations: usize,
}

/// A* over the STDCM graph, ordered by estimated arrival time at the
/// destination.
///
/// # Errors
///
/// Returns [`Error::NoPathFound`] when every branch has been explored,
/// [`Error::SearchAborted`] or [`Error::SearchTimeout`] when the search
/// budget is exhausted, and propagates edge building errors.
pub fn find_path(ctx: &StdcmContext<'_>) -> Result<SearchResult, Error> {
    let mut graph = StdcmGraph::new(ctx);
    let deadline = ctx.config.timeout().map(|timeout| Instant::now() + timeout);
    let last_step = ctx.last_step_index();
    let mut heap = BinaryHeap::new();
    let mut seen: HashSet<(EdgeKey, usize)> = HashSet::new();

    for node in graph.origin_nodes() {
        let remaining = graph.arena().node(node).remaining_time_estimate;
        if remaining.is_finite() {
            heap.push(State {
                cost: remaining,
                node,
            });
        }
    }
    info!(
        "Starting search from {} origin(s) with {} steps",
        heap.len(),
        ctx.steps.len()
    );

    let mut iterations = 0;
    while let Some(State { cost, node }) = heap.pop() {
        iterations += 1;
        if iterations > ctx.config.max_iterations {
            warn!("Search aborted after {} iterations", ctx.config.max_iterations);
            return Err(Error::SearchAborted {
                iterations: ctx.config.max_iterations,
            });
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!("Search timed out after {iterations} iterations");
            return Err(Error::SearchTimeout { iterations });
        }

        let current = graph.arena().node(node);
        if current.waypoint_index == last_step {
            let edges: Vec<Edge> = graph
                .arena()
                .path_to(node)
                .into_iter()
                .map(|id| graph.arena().edge(id).clone())
                .collect();
            let departure_time_shift = edges
                .last()
                .map_or(0.0, |e| e.total_departure_time_shift());
            let arrival_time = current.time() - current.stop_duration.unwrap_or(0.0);
            info!(
                "Path found after {iterations} iterations: {} edges, {} nodes created, arrival at {arrival_time:.1}",
                edges.len(),
                graph.arena().node_count()
            );
            return Ok(SearchResult {
                edges,
                departure_time_shift,
                arrival_time,
                iterations,
            });
        }
        let run_time = current.time_data.run_time(ctx.start_time);
        if run_time + current.remaining_time_estimate > ctx.config.max_run_time {
            debug!("node {node:?} can't reach the destination in time, cost {cost:.1}");
            continue;
        }

        for edge_id in graph.adjacent_edges(node)? {
            let edge = graph.arena().edge(edge_id);
            let start_waypoint = graph.arena().node(edge.previous_node).waypoint_index;
            if !seen.insert((edge.key(), start_waypoint)) {
                continue;
            }
            let next = graph.edge_end_node(edge_id);
            let next_node = graph.arena().node(next);
            if !next_node.remaining_time_estimate.is_finite() {
                continue;
            }
            heap.push(State {
                cost: next_node.time() - ctx.start_time + next_node.remaining_time_estimate,
                node: next,
            });
        }
    }
    info!("No path found after {iterations} iterations");
    Err(Error::NoPathFound)
}
