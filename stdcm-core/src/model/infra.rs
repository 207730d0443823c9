//! Infrastructure seen by the planning core: blocks, their successors and
//! their static speed limits.

use hashbrown::HashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::{BlockId, DetectorId, Distance, Error, Speed};

/// Static speed limit over a part of a block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSection {
    pub begin: Distance,
    pub end: Distance,
    pub speed: Speed,
}

/// A location on a block, as an offset from its entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub block: BlockId,
    pub offset: Distance,
}

impl BlockLocation {
    pub fn new(block: BlockId, offset: Distance) -> Self {
        Self { block, offset }
    }
}

/// Read-only view of the infrastructure consumed by the search.
///
/// The core never looks at the internal topology of a block; it only asks
/// for successors, lengths and speed limits.
pub trait Infrastructure {
    fn contains(&self, block: BlockId) -> bool;
    fn successors(&self, block: BlockId) -> Vec<BlockId>;
    /// Needed to build the remaining time heuristic backwards from the destination
    fn predecessors(&self, block: BlockId) -> Vec<BlockId>;
    fn block_length(&self, block: BlockId) -> Distance;
    fn block_exit(&self, block: BlockId) -> DetectorId;
    /// Speed limits along the block, offsets relative to the block entry.
    /// Parts without a section are only limited by the rolling stock.
    fn speed_sections(&self, block: BlockId) -> Vec<SpeedSection>;
}

/// Block graph node
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub length: Distance,
    pub exit: DetectorId,
    pub speed_sections: Vec<SpeedSection>,
}

/// In-memory block graph. Nodes are blocks, edges are the allowed
/// transitions from the exit of one block to the entry of the next.
#[derive(Debug, Clone, Default)]
pub struct BlockNetwork {
    graph: DiGraph<Block, ()>,
    names: HashMap<String, BlockId>,
}

impl BlockNetwork {
    pub fn builder() -> BlockNetworkBuilder {
        BlockNetworkBuilder::default()
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn block(&self, block: BlockId) -> Option<&Block> {
        self.graph.node_weight(NodeIndex::new(block))
    }

    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.names.get(name).copied()
    }

    pub fn block_name(&self, block: BlockId) -> Option<&str> {
        self.block(block).map(|b| b.name.as_str())
    }

    fn neighbors(&self, block: BlockId, direction: Direction) -> Vec<BlockId> {
        if !self.contains(block) {
            return Vec::new();
        }
        let mut res: Vec<BlockId> = self
            .graph
            .neighbors_directed(NodeIndex::new(block), direction)
            .map(NodeIndex::index)
            .collect();
        // petgraph walks the adjacency list backwards
        res.sort_unstable();
        res
    }
}

impl Infrastructure for BlockNetwork {
    fn contains(&self, block: BlockId) -> bool {
        block < self.graph.node_count()
    }

    fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.neighbors(block, Direction::Outgoing)
    }

    fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.neighbors(block, Direction::Incoming)
    }

    fn block_length(&self, block: BlockId) -> Distance {
        self.block(block).map_or(0.0, |b| b.length)
    }

    fn block_exit(&self, block: BlockId) -> DetectorId {
        self.block(block).map_or(block, |b| b.exit)
    }

    fn speed_sections(&self, block: BlockId) -> Vec<SpeedSection> {
        self.block(block)
            .map(|b| b.speed_sections.clone())
            .unwrap_or_default()
    }
}

/// Incremental construction of a [`BlockNetwork`] with validation
#[derive(Debug, Default)]
pub struct BlockNetworkBuilder {
    network: BlockNetwork,
}

impl BlockNetworkBuilder {
    /// Adds a block with a single speed limit over its whole length
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names or invalid length / speed
    pub fn add_block(
        &mut self,
        name: &str,
        length: Distance,
        speed_limit: Speed,
    ) -> Result<BlockId, Error> {
        let sections = vec![SpeedSection {
            begin: 0.0,
            end: length,
            speed: speed_limit,
        }];
        self.add_block_with_sections(name, length, sections)
    }

    /// Adds a block with arbitrary speed sections
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names, invalid lengths, or sections that
    /// don't fit in the block
    pub fn add_block_with_sections(
        &mut self,
        name: &str,
        length: Distance,
        mut speed_sections: Vec<SpeedSection>,
    ) -> Result<BlockId, Error> {
        if self.network.names.contains_key(name) {
            return Err(Error::InvalidInfra(format!("Duplicate block name {name}")));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::InvalidInfra(format!(
                "Block {name} has an invalid length {length}"
            )));
        }
        for section in &speed_sections {
            let fits = section.begin >= 0.0
                && section.begin < section.end
                && section.end <= length + crate::POSITION_EPSILON;
            if !fits || !(section.speed > 0.0) {
                return Err(Error::InvalidInfra(format!(
                    "Block {name} has an invalid speed section {section:?}"
                )));
            }
        }
        speed_sections.sort_by(|a, b| a.begin.total_cmp(&b.begin));

        let id = self.network.graph.node_count();
        let index = self.network.graph.add_node(Block {
            name: name.to_string(),
            length,
            exit: id,
            speed_sections,
        });
        debug_assert_eq!(index.index(), id);
        self.network.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Allows trains to go from the exit of `from` to the entry of `to`
    ///
    /// # Errors
    ///
    /// Returns an error if one of the blocks doesn't exist
    pub fn connect(&mut self, from: BlockId, to: BlockId) -> Result<(), Error> {
        for block in [from, to] {
            if !self.network.contains(block) {
                return Err(Error::InvalidInfra(format!("Unknown block {block}")));
            }
        }
        self.network
            .graph
            .update_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        Ok(())
    }

    pub fn build(self) -> BlockNetwork {
        self.network
    }
}
