//! Bounded page access history driving eviction.
//!
//! The history remembers the last `capacity` page resolutions in a ring
//! buffer and keeps a per-page count of how often each page appears in it.
//! The page with the lowest count is the eviction candidate. This only
//! approximates LRU: a page touched many times long ago but still inside
//! the window outranks a page touched once just now, and accesses older
//! than the window are forgotten entirely.

use std::collections::HashMap;

pub struct AccessHistory {
    slots: Vec<u64>,
    next: usize,
    capacity: usize,
    counts: HashMap<u64, usize>,
}

impl AccessHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            next: 0,
            capacity,
            counts: HashMap::new(),
        }
    }

    /// Records one access, dropping the oldest once the window is full.
    pub fn record(&mut self, page: u64) {
        if self.slots.len() == self.capacity {
            let oldest = std::mem::replace(&mut self.slots[self.next], page);
            if let Some(count) = self.counts.get_mut(&oldest) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&oldest);
                }
            }
        } else {
            self.slots.push(page);
        }
        self.next = (self.next + 1) % self.capacity;
        *self.counts.entry(page).or_insert(0) += 1;
    }

    /// Accesses of `page` inside the window
    #[inline]
    pub fn count(&self, page: u64) -> usize {
        self.counts.get(&page).copied().unwrap_or(0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Picks the candidate with the fewest recorded accesses. Ties go to the
    /// first candidate seen. Falls back to the first candidate when every
    /// candidate fills the whole window.
    pub fn coldest(&self, candidates: impl IntoIterator<Item = u64>) -> Option<u64> {
        let mut first = None;
        let mut best: Option<(u64, usize)> = None;
        for page in candidates {
            first.get_or_insert(page);
            let usage = self.count(page);
            let threshold = best.map_or(self.capacity, |(_, c)| c);
            if usage < threshold {
                best = Some((page, usage));
            }
        }
        best.map(|(page, _)| page).or(first)
    }
}
