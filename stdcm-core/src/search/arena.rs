//! Nodes and edges of the search, stored in an arena and linked by index.

use std::hash::{Hash, Hasher};

use super::time_data::TimeData;
use crate::sim::Envelope;
use crate::{BlockId, Distance, Speed, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// Where a node is located on the infrastructure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeLocation {
    /// At the exit of a block, the next edges start on its successors
    BlockExit(BlockId),
    /// Somewhere on a block, after the origin or a stop
    OnBlock { block: BlockId, offset: Distance },
}

/// The train has reached a location at a given time and speed
#[derive(Debug, Clone)]
pub struct Node {
    pub time_data: TimeData,
    pub speed: Speed,
    pub location: NodeLocation,
    pub previous_edge: Option<EdgeId>,
    /// Index of the last step the train went through
    pub waypoint_index: usize,
    /// Set when the node is a stop, the node time includes it
    pub stop_duration: Option<Time>,
    /// Lower bound of the time needed to reach the destination
    pub remaining_time_estimate: Time,
}

impl Node {
    pub fn time(&self) -> Time {
        self.time_data.earliest_reachable_time
    }
}

/// Identity of an edge: same block, entered in the same time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub block: BlockId,
    pub minute_time_start: i64,
}

/// Traversal of a block, or of the part of a block between a stop and one
/// of its ends
#[derive(Debug, Clone)]
pub struct Edge {
    pub block: BlockId,
    /// Envelope on the edge only, without the standard allowance
    pub envelope: Envelope,
    /// Offset on the block where the edge starts
    pub envelope_start_offset: Distance,
    pub end_offset: Distance,
    /// Timing at the edge entry. `max_departure_delay` is the delay that
    /// can still be added after this edge.
    pub time_data: TimeData,
    /// Departure time shift added to reach this edge
    pub added_delay: Time,
    pub previous_node: NodeId,
    pub minute_time_start: i64,
    pub standard_allowance_speed_factor: f64,
    /// Index of the last step passed at the end of the edge
    pub waypoint_index: usize,
    pub end_at_stop: bool,
}

impl Edge {
    pub fn time_start(&self) -> Time {
        self.time_data.earliest_reachable_time
    }

    pub fn maximum_added_delay_after(&self) -> Time {
        self.time_data.max_departure_delay
    }

    pub fn time_next_occupancy(&self) -> Time {
        self.time_data.time_of_next_conflict
    }

    pub fn total_departure_time_shift(&self) -> Time {
        self.time_data.departure_time_shift
    }

    pub fn length(&self) -> Distance {
        self.end_offset - self.envelope_start_offset
    }

    /// Time spent on the edge, standard allowance included
    pub fn total_time(&self) -> Time {
        self.envelope.total_time() / self.standard_allowance_speed_factor
    }

    pub fn end_time(&self) -> Time {
        self.time_start() + self.total_time()
    }

    /// Envelope with the standard allowance applied as a speed factor
    pub fn timed_envelope(&self) -> Envelope {
        self.envelope.scaled(self.standard_allowance_speed_factor)
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            block: self.block,
            minute_time_start: self.minute_time_start,
        }
    }

    /// How much later the edge could end without reaching the next
    /// occupancy, once the departure has been shifted by `current_shift`
    pub fn margin(&self, current_shift: Time) -> Time {
        let end = self.end_time() + current_shift - self.total_departure_time_shift();
        self.time_next_occupancy() - end
    }
}

/// Edges entered during the same time bucket are considered identical
impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

pub(crate) fn time_bucket(time: Time, bucket: Time) -> i64 {
    (time / bucket).floor() as i64
}

/// Owns every node and edge created during one search
#[derive(Debug, Default)]
pub struct SearchArena {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl SearchArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_edge(&mut self, edge: Edge) -> EdgeId {
        self.edges.push(edge);
        EdgeId(self.edges.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edge leading to the node, if it isn't an origin
    pub fn previous_edge(&self, node: NodeId) -> Option<EdgeId> {
        self.node(node).previous_edge
    }

    /// Edges from an origin to `node`, in travel order
    pub fn path_to(&self, node: NodeId) -> Vec<EdgeId> {
        let mut res = Vec::new();
        let mut current = self.node(node).previous_edge;
        while let Some(edge) = current {
            res.push(edge);
            current = self.node(self.edge(edge).previous_node).previous_edge;
        }
        res.reverse();
        res
    }
}
