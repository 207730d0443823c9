//! Admissible estimate of the remaining time to the destination.
//!
//! Built once per request by running a reverse Dijkstra from every step,
//! weighting blocks by their traversal time at the MRSP. Real envelopes
//! can only be slower, so the estimate never overestimates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use log::debug;

use crate::model::{Infrastructure, StdcmStep};
use crate::sim::CachedBlockMrsp;
use crate::{BlockId, Distance, POSITION_EPSILON, Time};

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: Time,
    block: BlockId,
}

impl Eq for State {}

// Min-heap by cost
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.block.cmp(&self.block))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct RemainingTimeEstimator<'a> {
    infra: &'a dyn Infrastructure,
    mrsp: CachedBlockMrsp<'a>,
    steps: &'a [StdcmStep],
    /// `costs[k][block]`: from the block entry to the destination, with step
    /// `k` as the next step to go through
    costs: Vec<HashMap<BlockId, Time>>,
    /// `after_step[k][i]`: from location `i` of step `k` to the destination
    after_step: Vec<Vec<Time>>,
}

impl<'a> RemainingTimeEstimator<'a> {
    pub fn new(
        infra: &'a dyn Infrastructure,
        mrsp: CachedBlockMrsp<'a>,
        steps: &'a [StdcmStep],
    ) -> Self {
        let mut estimator = Self {
            infra,
            mrsp,
            steps,
            costs: vec![HashMap::new(); steps.len()],
            after_step: vec![Vec::new(); steps.len()],
        };
        for k in (1..steps.len()).rev() {
            let after: Vec<Time> = steps[k]
                .locations
                .iter()
                .map(|loc| {
                    if k + 1 == steps.len() {
                        0.0
                    } else {
                        estimator.estimate(loc.block, loc.offset, k)
                    }
                })
                .collect();

            let mut seeds: HashMap<BlockId, Time> = HashMap::new();
            for (loc, &remaining) in steps[k].locations.iter().zip(&after) {
                let cost = estimator.mrsp.block_time(loc.block, loc.offset) + remaining;
                let entry = seeds.entry(loc.block).or_insert(f64::INFINITY);
                *entry = entry.min(cost);
            }
            let costs = estimator.reverse_dijkstra(seeds);
            estimator.after_step[k] = after;
            estimator.costs[k] = costs;
            debug!(
                "remaining time estimates for step {k}: {} reachable blocks",
                estimator.costs[k].len()
            );
        }
        estimator
    }

    pub fn mrsp(&self) -> &CachedBlockMrsp<'a> {
        &self.mrsp
    }

    fn reverse_dijkstra(&self, seeds: HashMap<BlockId, Time>) -> HashMap<BlockId, Time> {
        let mut costs: HashMap<BlockId, Time> = HashMap::new();
        let mut settled = FixedBitSet::new();
        let mut heap = BinaryHeap::new();
        for (block, cost) in seeds {
            if cost.is_finite() {
                costs.insert(block, cost);
                heap.push(State { cost, block });
            }
        }

        while let Some(State { cost, block }) = heap.pop() {
            if block >= settled.len() {
                settled.grow(block + 1);
            }
            if settled.put(block) {
                continue;
            }
            for previous in self.infra.predecessors(block) {
                let length = self.infra.block_length(previous);
                let next_cost = cost + self.mrsp.block_time(previous, length);
                match costs.entry(previous) {
                    hashbrown::hash_map::Entry::Vacant(entry) => {
                        entry.insert(next_cost);
                        heap.push(State {
                            cost: next_cost,
                            block: previous,
                        });
                    }
                    hashbrown::hash_map::Entry::Occupied(mut entry) => {
                        if next_cost < *entry.get() {
                            *entry.get_mut() = next_cost;
                            heap.push(State {
                                cost: next_cost,
                                block: previous,
                            });
                        }
                    }
                }
            }
        }
        costs
    }

    /// Lower bound of the time needed to reach the destination from
    /// `offset` on `block`, once steps up to `waypoint_index` are passed.
    ///
    /// Infinite when the destination can't be reached from there.
    pub fn estimate(&self, block: BlockId, offset: Distance, waypoint_index: usize) -> Time {
        let next_step = waypoint_index + 1;
        if next_step >= self.steps.len() {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        for (loc, &remaining) in self.steps[next_step]
            .locations
            .iter()
            .zip(&self.after_step[next_step])
        {
            if loc.block == block && loc.offset >= offset - POSITION_EPSILON {
                let time = self.mrsp.range_time(block, offset, loc.offset) + remaining;
                best = best.min(time);
            }
        }

        let length = self.infra.block_length(block);
        let to_exit = self.mrsp.range_time(block, offset, length);
        for next in self.infra.successors(block) {
            if let Some(&cost) = self.costs[next_step].get(&next) {
                best = best.min(to_exit + cost);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockLocation, BlockNetwork};

    /// a -> b -> c, and a -> d (dead end). 1000m at 20m/s each.
    fn infra() -> BlockNetwork {
        let mut builder = BlockNetwork::builder();
        for name in ["a", "b", "c", "d"] {
            builder.add_block(name, 1000.0, 20.0).unwrap();
        }
        builder.connect(0, 1).unwrap();
        builder.connect(1, 2).unwrap();
        builder.connect(0, 3).unwrap();
        builder.build()
    }

    fn estimator<'a>(infra: &'a BlockNetwork, steps: &'a [StdcmStep]) -> RemainingTimeEstimator<'a> {
        RemainingTimeEstimator::new(infra, CachedBlockMrsp::new(infra, None), steps)
    }

    #[test]
    fn corridor_estimates() {
        let infra = infra();
        let steps = vec![
            StdcmStep::pass_through(BlockLocation::new(0, 0.0)),
            StdcmStep::stop_at(BlockLocation::new(2, 1000.0), 0.0),
        ];
        let estimator = estimator(&infra, &steps);
        assert!((estimator.estimate(0, 0.0, 0) - 150.0).abs() < 1e-9);
        assert!((estimator.estimate(1, 500.0, 0) - 75.0).abs() < 1e-9);
        assert!(estimator.estimate(3, 0.0, 0).is_infinite());
        assert_eq!(estimator.estimate(2, 1000.0, 1), 0.0);
    }

    #[test]
    fn intermediate_steps_are_taken_in_order() {
        let infra = infra();
        let steps = vec![
            StdcmStep::pass_through(BlockLocation::new(0, 0.0)),
            StdcmStep::stop_at(BlockLocation::new(1, 500.0), 60.0),
            StdcmStep::stop_at(BlockLocation::new(2, 1000.0), 0.0),
        ];
        let estimator = estimator(&infra, &steps);
        assert!((estimator.estimate(0, 0.0, 0) - 150.0).abs() < 1e-9);
        // the intermediate stop is behind
        assert!(estimator.estimate(1, 600.0, 0).is_infinite());
        assert!((estimator.estimate(1, 600.0, 1) - 70.0).abs() < 1e-9);
    }
}
