//! How much the departure time has to (or can) be shifted so that an edge
//! doesn't conflict with other trains.

use log::trace;

use super::StdcmContext;
use super::arena::Edge;
use super::explorer::EdgeCandidate;
use crate::Time;
use crate::occupancy::{Availability, PathBlock, PathStop, TimedPath};
use crate::sim::Envelope;

/// A window during which the edge can be entered without conflict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opening {
    /// Delay to add to reach the start of the window
    pub delay: Time,
    /// How much more the edge could be delayed within the window
    pub maximum_delay: Time,
    pub time_of_next_conflict: Time,
}

pub struct DelayManager<'c, 'a> {
    ctx: &'c StdcmContext<'a>,
}

impl<'c, 'a> DelayManager<'c, 'a> {
    pub fn new(ctx: &'c StdcmContext<'a>) -> Self {
        Self { ctx }
    }

    /// Availability of the edge, entered at `time` and run on `envelope`
    /// (standard allowance included)
    pub fn availability(
        &self,
        candidate: &EdgeCandidate,
        envelope: &Envelope,
        time: Time,
    ) -> Availability {
        let length = candidate.length();
        let mut stops = Vec::new();
        if candidate.end.stop {
            stops.push(PathStop {
                offset: length,
                duration: self.ctx.stop_duration(candidate.end.waypoint_index),
            });
        }
        let path = TimedPath {
            blocks: vec![PathBlock {
                block: candidate.block,
                length: self.ctx.infra.block_length(candidate.block),
                offset: -candidate.start_offset,
            }],
            envelope,
            envelope_offset: 0.0,
            stops,
        };
        self.ctx.availability.availability(&path, 0.0, length, time)
    }

    /// Delays to add so that the edge is entered at the start of each
    /// conflict-free window, up to `max_delay`.
    pub fn minimum_delays_per_opening(
        &self,
        candidate: &EdgeCandidate,
        envelope: &Envelope,
        start_time: Time,
        max_delay: Time,
    ) -> Vec<Opening> {
        let mut res = Vec::new();
        let mut delay = 0.0;
        while delay <= max_delay {
            match self.availability(candidate, envelope, start_time + delay) {
                Availability::Available {
                    maximum_delay,
                    time_of_next_conflict,
                } => {
                    res.push(Opening {
                        delay,
                        maximum_delay,
                        time_of_next_conflict,
                    });
                    if !maximum_delay.is_finite() {
                        break;
                    }
                    // Skip to the next occupancy, the next iteration will
                    // jump over it
                    delay += maximum_delay + 1.0;
                }
                Availability::Unavailable { minimum_delay, .. } => {
                    delay += minimum_delay.max(crate::TIME_EPSILON);
                }
            }
        }
        trace!(
            "block {} entered at {start_time:.1}: {} openings",
            candidate.block,
            res.len()
        );
        res
    }

    /// Delay that can be added after entering the edge at `time`, or `None`
    /// if there is a conflict
    pub fn maximum_added_delay(
        &self,
        candidate: &EdgeCandidate,
        envelope: &Envelope,
        time: Time,
    ) -> Option<(Time, Time)> {
        match self.availability(candidate, envelope, time) {
            Availability::Available {
                maximum_delay,
                time_of_next_conflict,
            } => Some((maximum_delay, time_of_next_conflict)),
            Availability::Unavailable { .. } => None,
        }
    }

    /// Whether the train would run for longer than allowed once at the end
    /// of the edge
    pub fn is_run_time_too_long(&self, edge: &Edge) -> bool {
        let run_time = edge.time_data.run_time(self.ctx.start_time) + edge.total_time();
        run_time > self.ctx.config.max_run_time
    }
}
