use crate::Time;

/// Timing bookkeeping carried by every node and edge of the search.
///
/// Values are derived once from the previous element of the chain; only
/// the backtracking and engineering allowance managers rebuild them, by
/// creating new elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeData {
    /// Time at which the location is reached, given the departure time
    /// shift known so far
    pub earliest_reachable_time: Time,
    /// When the location becomes unavailable because of another train
    pub time_of_next_conflict: Time,
    /// How much the departure time can still be shifted without causing a
    /// conflict anywhere on the explored path
    pub max_departure_delay: Time,
    /// Total departure time shift so far
    pub departure_time_shift: Time,
}

impl TimeData {
    pub fn at_departure(start_time: Time, max_departure_delay: Time) -> Self {
        Self {
            earliest_reachable_time: start_time,
            time_of_next_conflict: f64::INFINITY,
            max_departure_delay,
            departure_time_shift: 0.0,
        }
    }

    /// Entering a new edge after shifting the departure time by `delay`
    pub fn delayed(&self, delay: Time, max_delay_after: Time, next_conflict: Time) -> Self {
        Self {
            earliest_reachable_time: self.earliest_reachable_time + delay,
            time_of_next_conflict: next_conflict,
            max_departure_delay: max_delay_after,
            departure_time_shift: self.departure_time_shift + delay,
        }
    }

    /// Same state, `duration` later
    pub fn after(&self, duration: Time) -> Self {
        Self {
            earliest_reachable_time: self.earliest_reachable_time + duration,
            ..*self
        }
    }

    /// Time since the actual departure of the train
    pub fn run_time(&self, start_time: Time) -> Time {
        self.earliest_reachable_time - self.departure_time_shift - start_time
    }

    /// Time at which the location is actually reached once the departure
    /// time has been shifted by `final_shift` in total
    pub fn time_with_shift(&self, final_shift: Time) -> Time {
        self.earliest_reachable_time + final_shift - self.departure_time_shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_shift_the_departure() {
        let start = TimeData::at_departure(100.0, 600.0);
        let edge = start.delayed(30.0, 200.0, 500.0);
        assert_eq!(edge.earliest_reachable_time, 130.0);
        assert_eq!(edge.departure_time_shift, 30.0);
        assert_eq!(edge.run_time(100.0), 0.0);

        let end = edge.after(50.0);
        assert_eq!(end.run_time(100.0), 50.0);
        assert_eq!(end.max_departure_delay, 200.0);
        assert_eq!(end.time_of_next_conflict, 500.0);
        assert_eq!(end.time_with_shift(45.0), 195.0);
    }
}
