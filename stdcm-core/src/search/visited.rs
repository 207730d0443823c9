use hashbrown::HashMap;

use crate::{BlockId, Distance, Time};

/// Location of an edge start, as seen by the visited set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub block: BlockId,
    pub waypoint_index: usize,
    /// Offset of the start on the block, in millimetres
    offset: i64,
}

impl Fingerprint {
    pub fn new(block: BlockId, waypoint_index: usize, offset: Distance) -> Self {
        Self {
            block,
            waypoint_index,
            offset: (offset * 1000.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    /// Estimated arrival time at the destination
    time: Time,
    /// How much delay could still be absorbed after this point
    slack: Time,
}

impl Visit {
    fn dominates(&self, other: &Visit, minimum_gap: Time) -> bool {
        self.time <= other.time && (self.slack >= other.slack || other.time - self.time < minimum_gap)
    }
}

/// Locations already reached during the search, with the best timings seen
/// there.
///
/// A visit is pruned if an earlier visit of the same location had at least
/// as much slack, or happened less than `minimum_gap` before it.
#[derive(Debug, Clone)]
pub struct VisitedNodes {
    minimum_gap: Time,
    visits: HashMap<Fingerprint, Vec<Visit>>,
}

impl VisitedNodes {
    pub fn new(minimum_gap: Time) -> Self {
        Self {
            minimum_gap,
            visits: HashMap::new(),
        }
    }

    pub fn is_visited(
        &self,
        fingerprint: &Fingerprint,
        time: Time,
        max_delay: Time,
        remaining_time_estimate: Time,
    ) -> bool {
        let candidate = Visit {
            time: time + remaining_time_estimate,
            slack: max_delay,
        };
        self.visits
            .get(fingerprint)
            .is_some_and(|visits| visits.iter().any(|v| v.dominates(&candidate, self.minimum_gap)))
    }

    /// Records a visit, forgetting the ones it dominates
    pub fn mark_visited(
        &mut self,
        fingerprint: Fingerprint,
        time: Time,
        max_delay: Time,
        remaining_time_estimate: Time,
    ) {
        let visit = Visit {
            time: time + remaining_time_estimate,
            slack: max_delay,
        };
        let visits = self.visits.entry(fingerprint).or_default();
        visits.retain(|v| !(visit.time <= v.time && visit.slack >= v.slack));
        visits.push(visit);
    }

    /// Number of recorded visits
    pub fn len(&self) -> usize {
        self.visits.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fingerprint() -> Fingerprint {
        Fingerprint::new(3, 1, 250.0)
    }

    #[test]
    fn nothing_is_visited_at_first() {
        let visited = VisitedNodes::new(240.0);
        assert!(!visited.is_visited(&fingerprint(), 100.0, 0.0, 0.0));
        assert!(visited.is_empty());
    }

    #[test]
    fn checking_is_idempotent() {
        let mut visited = VisitedNodes::new(240.0);
        visited.mark_visited(fingerprint(), 1000.0, 50.0, 0.0);
        let first = visited.is_visited(&fingerprint(), 1500.0, 100.0, 0.0);
        let second = visited.is_visited(&fingerprint(), 1500.0, 100.0, 0.0);
        assert_eq!(first, second);
        assert!(!first);
        assert!(visited.is_visited(&fingerprint(), 1000.0, 50.0, 0.0));
    }

    #[rstest]
    // later and less slack
    #[case(1000.0, 50.0, true)]
    #[case(5000.0, 10.0, true)]
    // later but within the minimum gap
    #[case(1100.0, 500.0, true)]
    // later, more slack, after the gap
    #[case(1300.0, 500.0, false)]
    // earlier
    #[case(900.0, 0.0, false)]
    fn dominance(#[case] time: Time, #[case] slack: Time, #[case] expected: bool) {
        let mut visited = VisitedNodes::new(240.0);
        visited.mark_visited(fingerprint(), 1000.0, 50.0, 0.0);
        assert_eq!(visited.is_visited(&fingerprint(), time, slack, 0.0), expected);
    }

    #[test]
    fn fingerprints_are_independent() {
        let mut visited = VisitedNodes::new(240.0);
        visited.mark_visited(fingerprint(), 1000.0, 50.0, 0.0);
        assert!(!visited.is_visited(&Fingerprint::new(3, 2, 250.0), 1000.0, 50.0, 0.0));
        assert!(!visited.is_visited(&Fingerprint::new(3, 1, 260.0), 1000.0, 50.0, 0.0));
        assert!(visited.is_visited(&Fingerprint::new(3, 1, 250.0001), 1000.0, 50.0, 0.0));
    }

    #[test]
    fn dominated_visits_are_forgotten() {
        let mut visited = VisitedNodes::new(240.0);
        visited.mark_visited(fingerprint(), 1000.0, 50.0, 0.0);
        visited.mark_visited(fingerprint(), 2000.0, 10.0, 0.0);
        visited.mark_visited(fingerprint(), 900.0, 100.0, 0.0);
        assert_eq!(visited.len(), 1);
    }
}
