//! Block availability oracle: are the blocks free when the train needs them?

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::sim::Envelope;
use crate::{BlockId, Distance, Error, Time, TIME_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Availability {
    /// No conflict. The train could be delayed by `maximum_delay` at most
    /// before running into the next occupancy.
    Available {
        maximum_delay: Time,
        time_of_next_conflict: Time,
    },
    /// The train needs to be delayed by at least `minimum_delay`
    Unavailable {
        minimum_delay: Time,
        first_conflict_offset: Distance,
    },
}

/// A block of the travelled path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathBlock {
    pub block: BlockId,
    pub length: Distance,
    /// Offset of the block entry on the path, negative if the path starts
    /// in the middle of the block
    pub offset: Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathStop {
    pub offset: Distance,
    pub duration: Time,
}

/// The blocks of a path with the envelope the train runs on them
#[derive(Debug, Clone)]
pub struct TimedPath<'a> {
    pub blocks: Vec<PathBlock>,
    pub envelope: &'a Envelope,
    /// Path offset where the envelope starts
    pub envelope_offset: Distance,
    pub stops: Vec<PathStop>,
}

impl TimedPath<'_> {
    /// Time elapsed since departure when the head of the train reaches
    /// `offset`. Stops located at `offset` count only if `after_stop` is set.
    pub fn time_at(&self, offset: Distance, after_stop: bool) -> Time {
        let stop_time: Time = self
            .stops
            .iter()
            .filter(|s| {
                if after_stop {
                    s.offset <= offset + crate::POSITION_EPSILON
                } else {
                    s.offset < offset - crate::POSITION_EPSILON
                }
            })
            .map(|s| s.duration)
            .sum();
        self.envelope.interpolate_time(offset - self.envelope_offset) + stop_time
    }
}

/// Oracle answering whether a timed path conflicts with other trains
pub trait BlockAvailability {
    /// Checks the part of `path` between `start_offset` and `end_offset`,
    /// for a train leaving the start of the envelope at `departure_time`.
    fn availability(
        &self,
        path: &TimedPath<'_>,
        start_offset: Distance,
        end_offset: Distance,
        departure_time: Time,
    ) -> Availability;
}

/// Reservations of other trains, as half-open occupied intervals per block
#[derive(Debug, Clone, Default)]
pub struct OccupancyTable {
    occupancies: HashMap<BlockId, Vec<(Time, Time)>>,
}

impl OccupancyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `block` as occupied during `[begin, end)`. Overlapping
    /// intervals are merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the interval is empty or not a number
    pub fn add(&mut self, block: BlockId, begin: Time, end: Time) -> Result<(), Error> {
        if begin.is_nan() || end.is_nan() || end <= begin {
            return Err(Error::InvalidRequest(format!(
                "invalid occupancy [{begin}, {end}) on block {block}"
            )));
        }
        let intervals = self.occupancies.entry(block).or_default();
        intervals.push((begin, end));
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut merged: Vec<(Time, Time)> = Vec::with_capacity(intervals.len());
        for &(begin, end) in intervals.iter() {
            match merged.last_mut() {
                Some(last) if begin <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((begin, end)),
            }
        }
        *intervals = merged;
        Ok(())
    }

    pub fn occupancies(&self, block: BlockId) -> &[(Time, Time)] {
        self.occupancies.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.occupancies.is_empty()
    }
}

impl BlockAvailability for OccupancyTable {
    fn availability(
        &self,
        path: &TimedPath<'_>,
        start_offset: Distance,
        end_offset: Distance,
        departure_time: Time,
    ) -> Availability {
        let mut maximum_delay = f64::INFINITY;
        let mut time_of_next_conflict = f64::INFINITY;
        let mut conflict: Option<(Time, Distance)> = None;

        for block in &path.blocks {
            let begin = block.offset.max(start_offset);
            let end = (block.offset + block.length).min(end_offset);
            if end - begin <= 0.0 {
                continue;
            }
            let needed_from = departure_time + path.time_at(begin, false);
            let needed_until = departure_time + path.time_at(end, true);

            for &(occupied_from, occupied_until) in self.occupancies(block.block) {
                if occupied_until <= needed_from + TIME_EPSILON {
                    continue;
                }
                if occupied_from >= needed_until - TIME_EPSILON {
                    maximum_delay = maximum_delay.min(occupied_from - needed_until);
                    time_of_next_conflict = time_of_next_conflict.min(occupied_from);
                    break;
                }
                let delay = occupied_until - needed_from;
                conflict = Some(match conflict {
                    Some((d, offset)) => (d.max(delay), offset.min(begin)),
                    None => (delay, begin),
                });
            }
        }

        match conflict {
            Some((minimum_delay, first_conflict_offset)) => Availability::Unavailable {
                minimum_delay,
                first_conflict_offset,
            },
            None => Availability::Available {
                maximum_delay: maximum_delay.max(0.0),
                time_of_next_conflict,
            },
        }
    }
}
