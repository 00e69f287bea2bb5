//! Strips of consideration.
//!
//! Seeds sorted by their diagonal coordinate are swept with a window of
//! fixed width; each window position is a candidate strip scored by the
//! accumulated seed length. Overlapping candidates suppress each other
//! during the sweep, the survivors become a max-heap and are extracted
//! best-first by the harmonization loop.

use crate::params::AlignParams;
use crate::seed::{Seed, Seeds};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Score of one strip. Larger accumulated length wins; on ties the
/// strip with *lower* ambiguity wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocOrder {
    pub accumulative_length: u64,
    pub seed_ambiguity: u64,
    pub seed_count: u32,
}

impl SocOrder {
    pub fn add(&mut self, seed: &Seed) {
        self.accumulative_length += seed.value();
        self.seed_ambiguity += seed.ambiguity as u64;
        self.seed_count += 1;
    }

    pub fn remove(&mut self, seed: &Seed) {
        debug_assert!(self.accumulative_length >= seed.value());
        debug_assert!(self.seed_ambiguity >= seed.ambiguity as u64);
        self.accumulative_length -= seed.value();
        self.seed_ambiguity -= seed.ambiguity as u64;
        self.seed_count -= 1;
    }
}

impl Ord for SocOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.accumulative_length
            .cmp(&other.accumulative_length)
            .then(other.seed_ambiguity.cmp(&self.seed_ambiguity))
    }
}

impl PartialOrd for SocOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SocOrder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SocOrder {}

/// One candidate strip: its order plus the index range into the
/// delta-sorted seed vector.
#[derive(Debug, Clone, Copy)]
struct SocEntry {
    order: SocOrder,
    first: usize,
    last: usize,
}

impl Ord for SocEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.cmp(&other.order)
    }
}

impl PartialOrd for SocEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SocEntry {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for SocEntry {}

/// Queue of strips, built in sweep order and drained best-first.
///
/// The queue has two states. While building, `push_back_no_overlap`
/// appends candidates whose strip starts never decrease; `finalize`
/// seals the queue into a heap; only then may `pop` be called.
pub struct SocPriorityQueue {
    seeds: Vec<Seed>,
    entries: Vec<SocEntry>,
    heap: BinaryHeap<SocEntry>,
    sealed: bool,
    last_end: i64,
    extracted: u32,
}

impl SocPriorityQueue {
    pub fn new(seeds: Vec<Seed>) -> Self {
        SocPriorityQueue {
            seeds,
            entries: Vec::new(),
            heap: BinaryHeap::new(),
            sealed: false,
            last_end: i64::MIN,
            extracted: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        if self.sealed {
            self.heap.is_empty()
        } else {
            self.entries.is_empty()
        }
    }

    pub fn num_strips(&self) -> usize {
        if self.sealed {
            self.heap.len()
        } else {
            self.entries.len()
        }
    }

    /// Number of strips handed out so far.
    pub fn extracted(&self) -> u32 {
        self.extracted
    }

    /// Offer the current sweep window as a strip candidate. Keeps at
    /// most one of two overlapping candidates, preferring the better
    /// order.
    pub fn push_back_no_overlap(
        &mut self,
        order: SocOrder,
        first: usize,
        last: usize,
        curr_start: i64,
        curr_end: i64,
    ) {
        debug_assert!(!self.sealed, "push into a sealed queue");
        debug_assert!(first < last && last <= self.seeds.len());
        if self.entries.is_empty()
            || self.last_end <= curr_start
            || self.entries.last().unwrap().order < order
        {
            if !self.entries.is_empty() && self.last_end > curr_start {
                // Overlapping and better: replace the previous strip.
                self.entries.pop();
            }
            self.entries.push(SocEntry { order, first, last });
            self.last_end = curr_end;
        }
        // Overlapping and not better: drop the candidate.
    }

    /// Seal the queue: candidates become a max-heap.
    pub fn finalize(&mut self) {
        debug_assert!(!self.sealed, "finalize called twice");
        self.sealed = true;
        self.heap = BinaryHeap::from(std::mem::take(&mut self.entries));
    }

    /// Extract the best remaining strip as an owned seed set.
    pub fn pop(&mut self) -> Option<Seeds> {
        debug_assert!(self.sealed, "pop from an unsealed queue");
        let entry = self.heap.pop()?;
        self.extracted += 1;
        let mut out = Seeds::with_capacity(entry.order.seed_count as usize);
        for seed in &self.seeds[entry.first..entry.last] {
            out.push(*seed);
        }
        Some(out)
    }

    /// Order of the best remaining strip.
    pub fn peek_order(&self) -> Option<SocOrder> {
        debug_assert!(self.sealed);
        self.heap.peek().map(|e| e.order)
    }
}

/// Sweep the delta-sorted seeds and emit the sealed strip queue.
pub struct StripOfConsiderationBuilder {
    strip_width: u64,
}

impl StripOfConsiderationBuilder {
    pub fn new(params: &AlignParams, query_len: usize) -> Self {
        StripOfConsiderationBuilder {
            strip_width: params.effective_strip_width(query_len),
        }
    }

    pub fn build(&self, mut seeds: Seeds) -> SocPriorityQueue {
        seeds.as_mut_slice().sort_by_key(|s| (s.delta(), s.q_start));
        let seeds: Vec<Seed> = seeds.into_iter().collect();
        let n = seeds.len();
        let width = self.strip_width as i64;
        let mut queue = SocPriorityQueue::new(seeds);

        let mut order = SocOrder::default();
        let mut last = 0usize;
        for first in 0..n {
            let start = queue.seeds[first].delta();
            while last < n && queue.seeds[last].delta() < start + width {
                order.add(&queue.seeds[last]);
                last += 1;
            }
            queue.push_back_no_overlap(order, first, last, start, start + width);
            order.remove(&queue.seeds[first]);
        }
        queue.finalize();
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_at(delta: u64, len: u64) -> Seed {
        // q_start 0 keeps delta == r_start.
        Seed::new(0, len, delta, true, 1)
    }

    fn params_with_width(w: u64) -> AlignParams {
        AlignParams {
            strip_width: w,
            ..AlignParams::default()
        }
    }

    #[test]
    fn order_prefers_length_then_low_ambiguity() {
        let mut long = SocOrder::default();
        long.add(&Seed::new(0, 20, 0, true, 9));
        let mut short = SocOrder::default();
        short.add(&Seed::new(0, 10, 0, true, 1));
        assert!(short < long);

        let mut crisp = SocOrder::default();
        crisp.add(&Seed::new(0, 10, 0, true, 1));
        let mut murky = SocOrder::default();
        murky.add(&Seed::new(0, 10, 0, true, 7));
        assert!(murky < crisp);
        assert_eq!(crisp, crisp);
    }

    #[test]
    fn strips_pop_best_first() {
        // Diagonals {0,0,0,100,100,200}, all length 10, width 5: three
        // strips of accumulated length 30, 20, 10, popped in that order.
        let seeds: Seeds = [
            seed_at(0, 10),
            seed_at(0, 10),
            seed_at(0, 10),
            seed_at(100, 10),
            seed_at(100, 10),
            seed_at(200, 10),
        ]
        .into_iter()
        .collect();
        let mut queue = StripOfConsiderationBuilder::new(&params_with_width(5), 10).build(seeds);
        assert_eq!(queue.num_strips(), 3);
        let totals: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|s| s.score())
            .collect();
        assert_eq!(totals, vec![30, 20, 10]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn pops_are_non_increasing() {
        let seeds: Seeds = (0..40)
            .map(|i| seed_at(i * 17 % 400, 4 + i % 13))
            .collect();
        let mut queue = StripOfConsiderationBuilder::new(&params_with_width(30), 50).build(seeds);
        let mut prev: Option<SocOrder> = None;
        while let Some(strip) = queue.pop() {
            assert!(!strip.is_empty());
            let mut order = SocOrder::default();
            for s in &strip {
                order.add(s);
            }
            if let Some(p) = prev {
                assert!(order <= p, "pop order not monotone");
            }
            prev = Some(order);
        }
    }

    #[test]
    fn width_one_separates_distinct_diagonals() {
        let seeds: Seeds = [seed_at(0, 5), seed_at(1, 5), seed_at(2, 5)]
            .into_iter()
            .collect();
        let queue = StripOfConsiderationBuilder::new(&params_with_width(1), 10).build(seeds);
        assert_eq!(queue.num_strips(), 3);
    }

    #[test]
    fn tie_broken_by_lower_ambiguity() {
        let mut murky = seed_at(0, 10);
        murky.ambiguity = 50;
        let crisp = Seed::new(0, 10, 300, true, 2);
        let seeds: Seeds = [murky, crisp].into_iter().collect();
        let mut queue = StripOfConsiderationBuilder::new(&params_with_width(5), 10).build(seeds);
        let first = queue.pop().unwrap();
        assert_eq!(first[0].ambiguity, 2);
    }

    #[test]
    fn overlapping_windows_keep_the_better_strip() {
        // Seeds at deltas 0 and 3 with width 5: the windows overlap, and
        // the window holding both seeds must win.
        let seeds: Seeds = [seed_at(0, 6), seed_at(3, 9)].into_iter().collect();
        let mut queue = StripOfConsiderationBuilder::new(&params_with_width(5), 10).build(seeds);
        let first = queue.pop().unwrap();
        assert_eq!(first.score(), 15);
        // The second window (only the delta-3 seed) overlapped and lost.
        assert!(queue.pop().is_none());
    }
}
