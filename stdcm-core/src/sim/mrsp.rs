use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::model::{Infrastructure, RollingStock, SpeedSection};
use crate::{BlockId, Distance, Speed, Time};

/// Max speed used when no rolling stock is given, 320 km/h
pub const DEFAULT_MAX_SPEED: Speed = 320.0 / 3.6;

/// Most restrictive speed profile of blocks, computed once per block and
/// per request.
pub struct CachedBlockMrsp<'a> {
    infra: &'a dyn Infrastructure,
    max_speed: Speed,
    cache: RefCell<HashMap<BlockId, Rc<[SpeedSection]>>>,
}

impl<'a> CachedBlockMrsp<'a> {
    pub fn new(infra: &'a dyn Infrastructure, rolling_stock: Option<&RollingStock>) -> Self {
        Self {
            infra,
            max_speed: rolling_stock.map_or(DEFAULT_MAX_SPEED, |rs| rs.max_speed),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn max_speed(&self) -> Speed {
        self.max_speed
    }

    /// Speed limits covering the whole block without gaps, sorted by offset
    pub fn get(&self, block: BlockId) -> Rc<[SpeedSection]> {
        if let Some(mrsp) = self.cache.borrow().get(&block) {
            return Rc::clone(mrsp);
        }
        let mrsp: Rc<[SpeedSection]> = self.compute(block).into();
        self.cache.borrow_mut().insert(block, Rc::clone(&mrsp));
        mrsp
    }

    fn compute(&self, block: BlockId) -> Vec<SpeedSection> {
        let length = self.infra.block_length(block);
        let sections = self.infra.speed_sections(block);

        let mut bounds = vec![0.0, length];
        for s in &sections {
            bounds.push(s.begin.clamp(0.0, length));
            bounds.push(s.end.clamp(0.0, length));
        }
        bounds.sort_by(f64::total_cmp);
        bounds.dedup_by(|a, b| crate::positions_equal(*a, *b));

        let mut res: Vec<SpeedSection> = Vec::new();
        for (&begin, &end) in bounds.iter().zip(bounds.iter().skip(1)) {
            let middle = (begin + end) / 2.0;
            let speed = sections
                .iter()
                .filter(|s| s.begin <= middle && middle < s.end)
                .map(|s| s.speed)
                .fold(self.max_speed, f64::min);
            match res.last_mut() {
                Some(last) if last.speed == speed => last.end = end,
                _ => res.push(SpeedSection { begin, end, speed }),
            }
        }
        res
    }

    /// Time needed to run from `begin` to `end` on the block at its MRSP.
    ///
    /// A lower bound of any physical traversal of that range.
    pub fn range_time(&self, block: BlockId, begin: Distance, end: Distance) -> Time {
        self.get(block)
            .iter()
            .map(|s| {
                let overlap = s.end.min(end) - s.begin.max(begin);
                if overlap > 0.0 { overlap / s.speed } else { 0.0 }
            })
            .sum()
    }

    /// Time needed to run the block at its MRSP, from its entry to `end_offset`
    pub fn block_time(&self, block: BlockId, end_offset: Distance) -> Time {
        self.range_time(block, 0.0, end_offset)
    }
}
