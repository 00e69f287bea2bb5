//! FM-index over the packed reference.
//!
//! The seeder only depends on the [`FmIndexQuery`] contract: extend an
//! SA interval backwards by one symbol, and enumerate the occurrences of
//! an interval up to an ambiguity cap. The bundled [`FmIndex`] fulfils
//! the contract over the concatenated forward and reverse strands of a
//! pack, which makes the intervals bi-directional: the interval of a
//! pattern and of its reverse complement always have the same size, so
//! forward extension comes for free by swapping the two interval halves
//! and extending with the complement symbol.

use crate::nucseq::complement;
use crate::pack::Pack;
use anyhow::{ensure, Result};
use bio::data_structures::suffix_array::suffix_array;

/// Occurrence block granularity of the sampled rank table.
const OCC_BLOCK: usize = 64;

/// Text alphabet: byte 0 is the sentinel, bytes 1..=5 are codes 0..=4.
const SIGMA: usize = 6;

/// A bi-directional SA interval: `fwd` is the interval start of the
/// pattern, `rev` the interval start of its reverse complement, `size`
/// the shared interval length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaInterval {
    pub fwd: u64,
    pub rev: u64,
    pub size: u64,
}

impl SaInterval {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The interval of the reverse complement pattern.
    #[inline]
    pub fn swapped(self) -> SaInterval {
        SaInterval {
            fwd: self.rev,
            rev: self.fwd,
            size: self.size,
        }
    }
}

/// Query contract the seeder consumes.
pub trait FmIndexQuery {
    /// Interval of the single-symbol pattern `symbol` (a code in 0..4).
    fn init_interval(&self, symbol: u8) -> SaInterval;

    /// Extend the pattern by one symbol on the left.
    fn extend_back(&self, interval: SaInterval, symbol: u8) -> SaInterval;

    /// Extend the pattern by one symbol on the right. Derived from
    /// [`FmIndexQuery::extend_back`] through the interval symmetry.
    fn extend_front(&self, interval: SaInterval, symbol: u8) -> SaInterval {
        self.extend_back(interval.swapped(), complement(symbol))
            .swapped()
    }

    /// All reference positions of the interval, or `None` when the
    /// interval is more ambiguous than `cap` occurrences.
    fn occurrences(&self, interval: &SaInterval, cap: u64) -> Option<Vec<u64>>;

    /// Length of the indexed text (forward plus reverse strand).
    fn text_len(&self) -> u64;
}

/// FM-index with sampled occurrence blocks and a complete suffix array.
///
/// The complete SA costs eight bytes per indexed base. That is the
/// simple, robust choice here; interval resolution stays O(1) per
/// occurrence and index construction is a single pass over the
/// suffix array.
pub struct FmIndex {
    bwt: Vec<u8>,
    counts: [u64; SIGMA + 1],
    occ_blocks: Vec<[u64; SIGMA]>,
    sa: Vec<u64>,
    sentinel_row: u64,
    text_len: u64,
}

impl FmIndex {
    /// Build from a pack. Holes enter the text as N, which no query
    /// symbol ever extends into, so hole regions can never seed.
    pub fn build(pack: &Pack) -> Result<FmIndex> {
        ensure!(pack.len_forward() > 0, "cannot index an empty pack");
        let n = pack.len_total();
        let mut fwd_codes = Vec::with_capacity(pack.len_forward() as usize);
        for id in 0..pack.num_contigs() {
            fwd_codes.extend_from_slice(pack.extract_contig(id)?.as_slice());
        }
        let mut text = Vec::with_capacity(n as usize + 1);
        text.extend(fwd_codes.iter().map(|&c| c + 1));
        text.extend(fwd_codes.iter().rev().map(|&c| complement(c) + 1));
        text.push(0u8);

        let sa_raw = suffix_array(&text);
        let mut bwt = Vec::with_capacity(text.len());
        let mut sa = Vec::with_capacity(text.len());
        let mut sentinel_row = 0u64;
        for (row, &suffix) in sa_raw.iter().enumerate() {
            if suffix == 0 {
                sentinel_row = row as u64;
                bwt.push(text[text.len() - 1]);
            } else {
                bwt.push(text[suffix - 1]);
            }
            sa.push(suffix as u64);
        }

        let mut counts = [0u64; SIGMA + 1];
        for &b in &bwt {
            counts[b as usize + 1] += 1;
        }
        for i in 1..=SIGMA {
            counts[i] += counts[i - 1];
        }

        // One trailing entry so lookups at the text end need no clamping.
        let n_blocks = bwt.len().div_ceil(OCC_BLOCK) + 1;
        let mut occ_blocks = Vec::with_capacity(n_blocks);
        let mut running = [0u64; SIGMA];
        for (i, &b) in bwt.iter().enumerate() {
            if i % OCC_BLOCK == 0 {
                occ_blocks.push(running);
            }
            running[b as usize] += 1;
        }
        occ_blocks.push(running);

        Ok(FmIndex {
            bwt,
            counts,
            occ_blocks,
            sa,
            sentinel_row,
            text_len: n,
        })
    }

    /// Occurrences of every symbol in `bwt[0..pos)`.
    fn occ_all(&self, pos: u64) -> [u64; SIGMA] {
        let pos = pos as usize;
        let block = pos / OCC_BLOCK;
        let mut occ = self.occ_blocks[block];
        for &b in &self.bwt[block * OCC_BLOCK..pos] {
            occ[b as usize] += 1;
        }
        occ
    }
}

impl FmIndexQuery for FmIndex {
    fn init_interval(&self, symbol: u8) -> SaInterval {
        debug_assert!(symbol < 4);
        let b = symbol as usize + 1;
        let rc = complement(symbol) as usize + 1;
        SaInterval {
            fwd: self.counts[b],
            rev: self.counts[rc],
            size: self.counts[b + 1] - self.counts[b],
        }
    }

    fn extend_back(&self, interval: SaInterval, symbol: u8) -> SaInterval {
        debug_assert!(symbol < 4);
        if interval.size == 0 {
            return interval;
        }
        let lo = self.occ_all(interval.fwd);
        let hi = self.occ_all(interval.fwd + interval.size);

        // Window occurrence counts per code (bytes 1..=5).
        let mut sizes = [0u64; 5];
        for code in 0..5 {
            sizes[code] = hi[code + 1] - lo[code + 1];
        }
        let sentinel_in_window = (interval.fwd <= self.sentinel_row
            && self.sentinel_row < interval.fwd + interval.size)
            as u64;

        // The reverse-complement intervals of the four possible
        // extensions partition the old reverse interval; symbols sorted
        // by the code of their complement, the sentinel first.
        let mut rev = [0u64; 4];
        rev[3] = interval.rev + sentinel_in_window;
        rev[2] = rev[3] + sizes[3];
        rev[1] = rev[2] + sizes[2];
        rev[0] = rev[1] + sizes[1];

        let code = symbol as usize;
        SaInterval {
            fwd: self.counts[code + 1] + lo[code + 1],
            rev: rev[code],
            size: sizes[code],
        }
    }

    fn occurrences(&self, interval: &SaInterval, cap: u64) -> Option<Vec<u64>> {
        if interval.size > cap {
            return None;
        }
        let lo = interval.fwd as usize;
        let hi = (interval.fwd + interval.size) as usize;
        Some(self.sa[lo..hi].to_vec())
    }

    fn text_len(&self) -> u64 {
        self.text_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nucseq::NucSeq;

    fn index_of(seq: &str) -> (Pack, FmIndex) {
        let mut pack = Pack::new();
        pack.append_sequence("c0", "", &NucSeq::from_ascii("c0", seq.as_bytes()));
        let index = FmIndex::build(&pack).unwrap();
        (pack, index)
    }

    fn search(index: &FmIndex, pattern: &[u8]) -> SaInterval {
        let mut ival = index.init_interval(pattern[pattern.len() - 1]);
        for &c in pattern[..pattern.len() - 1].iter().rev() {
            ival = index.extend_back(ival, c);
        }
        ival
    }

    #[test]
    fn backward_search_finds_both_strands() {
        let (pack, index) = index_of("ACGGTCA");
        // "GGT" occurs once on the forward strand; "ACC" is its
        // reverse complement and must mirror onto the reverse strand.
        let ival = search(&index, &[2, 2, 3]);
        assert_eq!(ival.size, 1);
        let occ = index.occurrences(&ival, 10).unwrap();
        assert_eq!(occ, vec![2]);

        let rc = search(&index, &[0, 1, 1]);
        assert_eq!(rc.size, 1);
        let occ = index.occurrences(&rc, 10).unwrap();
        assert_eq!(occ.len(), 1);
        assert!(pack.is_on_reverse(occ[0]));
        // The mirrored range covers the forward "GGT".
        assert_eq!(pack.mirror(occ[0] + 2), 2);
    }

    #[test]
    fn interval_sizes_are_strand_symmetric() {
        let (_, index) = index_of("ACGGTCAGGTTAC");
        for pattern in [&[2u8, 2, 3][..], &[0, 1][..], &[3, 3][..]] {
            let fwd = search(&index, pattern);
            let rc: Vec<u8> = pattern.iter().rev().map(|&c| complement(c)).collect();
            let rev = search(&index, &rc);
            assert_eq!(fwd.size, rev.size, "pattern {pattern:?}");
            assert_eq!(fwd.rev, rev.fwd, "pattern {pattern:?}");
        }
    }

    #[test]
    fn extend_front_matches_backward_search() {
        let (_, index) = index_of("ACGGTCAGGTTACGGA");
        // Build "GGT" left-to-right with extend_front and compare with
        // the backward search of the same pattern.
        let mut ival = index.init_interval(2);
        ival = index.extend_front(ival, 2);
        ival = index.extend_front(ival, 3);
        let direct = search(&index, &[2, 2, 3]);
        assert_eq!(ival, direct);
    }

    #[test]
    fn occurrences_respect_ambiguity_cap() {
        let (_, index) = index_of("ACACACACAC");
        let ival = search(&index, &[0, 1]); // "AC", frequent
        assert!(ival.size >= 5);
        assert!(index.occurrences(&ival, 3).is_none());
        assert!(index.occurrences(&ival, 100).is_some());
    }

    #[test]
    fn holes_never_match() {
        let mut pack = Pack::new();
        pack.append_sequence("c0", "", &NucSeq::from_ascii("c0", b"AAAANNNNNNNNGGGG"));
        let index = FmIndex::build(&pack).unwrap();
        // Any 5-mer crossing the hole contains an N in the text and can
        // not be matched by ACGT queries.
        for pattern in [&[0u8, 0, 0, 0, 2][..], &[0, 0, 2, 2][..]] {
            let ival = search(&index, pattern);
            assert_eq!(ival.size, 0, "pattern {pattern:?}");
        }
        // The flanks themselves are still findable.
        assert_eq!(search(&index, &[0, 0, 0, 0]).size, 1); // AAAA
        assert_eq!(search(&index, &[3, 3, 3, 3]).size, 1); // TTTT on the reverse strand
    }
}
