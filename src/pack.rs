//! Packed reference container.
//!
//! Only the forward strand is stored, 2-bit packed with four symbols per
//! byte (most significant pair first). The reverse strand is virtual:
//! positions in `[fwd_len, 2*fwd_len)` address the reverse complement via
//! `pos -> 2*fwd_len - pos - 1`. N-runs cannot be represented in two bits;
//! they are recorded as hole descriptors and the packed bases underneath
//! are randomized so that downstream stages never see a bias.
//!
//! On disk a pack is three files sharing a prefix: `<p>.pac` (packed
//! bases, zero sentinel when the length is a byte multiple, final byte
//! `fwd_len % 4`), `<p>.ann` (contig descriptors) and `<p>.amb` (hole
//! descriptors).

use crate::nucseq::{complement, NucSeq, CODE_N};
use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigEntry {
    pub name: String,
    pub comment: String,
    pub gi: u32,
    pub offset: u64,
    pub length: u64,
    pub holes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoleEntry {
    pub offset: u64,
    pub length: u64,
    pub symbol: u8,
}

/// Immutable packed collection of reference contigs.
#[derive(Debug, Default)]
pub struct Pack {
    packed: Vec<u8>,
    contigs: Vec<ContigEntry>,
    holes: Vec<HoleEntry>,
    fwd_len: u64,
    seed: u32,
}

impl Pack {
    pub fn new() -> Self {
        Pack {
            packed: Vec::new(),
            contigs: Vec::new(),
            holes: Vec::new(),
            fwd_len: 0,
            seed: 11,
        }
    }

    /// Append one contig. Empty sequences are skipped; they would produce
    /// zero-length descriptors that break the offset invariant.
    pub fn append_sequence(&mut self, name: &str, comment: &str, seq: &NucSeq) {
        if seq.is_empty() {
            log::warn!("skipping empty sequence {name}");
            return;
        }
        let mut entry = ContigEntry {
            name: name.to_string(),
            comment: if comment.is_empty() {
                "none".to_string()
            } else {
                comment.to_string()
            },
            gi: 0,
            offset: self.fwd_len,
            length: seq.len() as u64,
            holes: 0,
        };

        let mut rng = StdRng::seed_from_u64(self.seed as u64 ^ self.fwd_len);
        let mut in_hole = false;
        for i in 0..seq.len() {
            let mut code = seq[i];
            if code >= 4 {
                if in_hole {
                    self.holes.last_mut().unwrap().length += 1;
                } else {
                    self.holes.push(HoleEntry {
                        offset: self.fwd_len,
                        length: 1,
                        symbol: b'N',
                    });
                    entry.holes += 1;
                    in_hole = true;
                }
                code = rng.gen_range(0..4u8);
            } else {
                in_hole = false;
            }
            let shift = ((!self.fwd_len & 3) << 1) as u8;
            if shift == 6 {
                self.packed.push(code << shift);
            } else {
                *self.packed.last_mut().unwrap() |= code << shift;
            }
            self.fwd_len += 1;
        }
        self.contigs.push(entry);
        debug_assert_eq!(self.packed.len() as u64, self.fwd_len.div_ceil(4));
    }

    #[inline]
    pub fn len_forward(&self) -> u64 {
        self.fwd_len
    }

    /// Forward plus virtual reverse strand.
    #[inline]
    pub fn len_total(&self) -> u64 {
        self.fwd_len * 2
    }

    pub fn num_contigs(&self) -> usize {
        self.contigs.len()
    }

    pub fn contigs(&self) -> &[ContigEntry] {
        &self.contigs
    }

    pub fn holes(&self) -> &[HoleEntry] {
        &self.holes
    }

    pub fn contig_names(&self) -> Vec<String> {
        self.contigs.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contig_lengths(&self) -> Vec<u64> {
        self.contigs.iter().map(|c| c.length).collect()
    }

    pub fn contig_starts(&self) -> Vec<u64> {
        self.contigs.iter().map(|c| c.offset).collect()
    }

    #[inline]
    pub fn is_on_reverse(&self, pos: u64) -> bool {
        pos >= self.fwd_len
    }

    /// Mirror a position across the forward/reverse midpoint.
    #[inline]
    pub fn mirror(&self, pos: u64) -> u64 {
        self.len_total() - pos - 1
    }

    /// Map a combined-strand position to its forward-strand twin.
    #[inline]
    pub fn forward_pos(&self, pos: u64) -> u64 {
        if self.is_on_reverse(pos) {
            self.mirror(pos)
        } else {
            pos
        }
    }

    /// Contig holding a forward-strand position.
    pub fn contig_of(&self, fwd_pos: u64) -> usize {
        debug_assert!(fwd_pos < self.fwd_len);
        let idx = self.contigs.partition_point(|c| c.offset <= fwd_pos);
        idx - 1
    }

    /// Contig id doubled, with the low bit carrying the strand.
    pub fn contig_id_or_rev(&self, pos: u64) -> usize {
        let id = self.contig_of(self.forward_pos(pos));
        id * 2 + self.is_on_reverse(pos) as usize
    }

    /// Pack-coordinate range `[start, end)` of a strand-qualified contig id.
    pub fn contig_range_or_rev(&self, id_or_rev: usize) -> (u64, u64) {
        let c = &self.contigs[id_or_rev / 2];
        if id_or_rev % 2 == 1 {
            (
                self.len_total() - (c.offset + c.length),
                self.len_total() - c.offset,
            )
        } else {
            (c.offset, c.offset + c.length)
        }
    }

    /// True when the two positions lie on different strands or contigs.
    pub fn bridging_positions(&self, a: u64, b: u64) -> bool {
        self.is_on_reverse(a) != self.is_on_reverse(b)
            || self.contig_id_or_rev(a) != self.contig_id_or_rev(b)
    }

    /// True when `[begin, begin + size)` spans a contig boundary or the
    /// forward/reverse midpoint. Out-of-range intervals count as bridging.
    pub fn bridging(&self, begin: u64, size: u64) -> bool {
        if size == 0 {
            return false;
        }
        if begin + size > self.len_total() {
            return true;
        }
        self.bridging_positions(begin, begin + size - 1)
    }

    /// Shrink a bridging interval to its larger non-bridging half.
    pub fn unbridge(&self, begin: u64, size: u64) -> (u64, u64) {
        let (_, split) = self.contig_range_or_rev(self.contig_id_or_rev(begin));
        if begin + size / 2 > split {
            (split, begin + size - split)
        } else {
            (begin, split - begin)
        }
    }

    /// Packed base on the forward strand; holes deliver their randomized
    /// filler, not N.
    #[inline]
    pub fn base_forward(&self, fwd_pos: u64) -> u8 {
        debug_assert!(fwd_pos < self.fwd_len);
        let shift = ((!fwd_pos & 3) << 1) as u32;
        (self.packed[(fwd_pos >> 2) as usize] >> shift) & 3
    }

    /// Base at a combined-strand position, complemented on the reverse.
    #[inline]
    pub fn base_at(&self, pos: u64) -> u8 {
        if self.is_on_reverse(pos) {
            complement(self.base_forward(self.mirror(pos)))
        } else {
            self.base_forward(pos)
        }
    }

    pub fn is_hole(&self, fwd_pos: u64) -> bool {
        let idx = self
            .holes
            .partition_point(|h| h.offset + h.length <= fwd_pos);
        idx < self.holes.len() && self.holes[idx].offset <= fwd_pos
    }

    /// Fraction of `[begin, end)` (forward coordinates) covered by holes.
    pub fn hole_coverage(&self, begin: u64, end: u64) -> f64 {
        assert!(begin < end);
        let mut covered = 0;
        for h in &self.holes {
            if h.offset < end && h.offset + h.length > begin {
                covered += (h.offset + h.length).min(end) - h.offset.max(begin);
            }
        }
        covered as f64 / (end - begin) as f64
    }

    fn check_extract_range(&self, begin: u64, end: u64) -> Result<()> {
        ensure!(
            begin <= end,
            "extraction with begin {begin} greater than end {end}"
        );
        ensure!(
            end <= self.len_total(),
            "extraction range [{begin}, {end}) beyond pack of size {}",
            self.len_total()
        );
        if begin < end && self.is_on_reverse(begin) != self.is_on_reverse(end - 1) {
            bail!("extraction range [{begin}, {end}) bridges the strand midpoint");
        }
        if begin < end {
            let a = self.forward_pos(if self.is_on_reverse(begin) { end - 1 } else { begin });
            let b = self.forward_pos(if self.is_on_reverse(begin) { begin } else { end - 1 });
            if self.contig_of(a) != self.contig_of(b) {
                bail!("extraction range [{begin}, {end}) bridges a contig boundary");
            }
        }
        Ok(())
    }

    /// Extract `[begin, end)` with holes expanded to N. Reverse-strand
    /// ranges yield the reverse complement of the underlying forward bases.
    pub fn extract(&self, begin: u64, end: u64) -> Result<NucSeq> {
        self.check_extract_range(begin, end)?;
        let mut out = NucSeq::new("");
        if begin == end {
            return Ok(out);
        }
        if !self.is_on_reverse(begin) {
            // Merging walk over the sorted hole list.
            let mut hi = self.holes.partition_point(|h| h.offset + h.length <= begin);
            for pos in begin..end {
                while hi < self.holes.len()
                    && self.holes[hi].offset + self.holes[hi].length <= pos
                {
                    hi += 1;
                }
                if hi < self.holes.len() && self.holes[hi].offset <= pos {
                    out.push(CODE_N);
                } else {
                    out.push(self.base_forward(pos));
                }
            }
        } else {
            let abs_begin = self.mirror(begin);
            let abs_end = self.mirror(end - 1);
            // Walk the hole list backwards alongside the descending scan.
            let mut hi = self.holes.partition_point(|h| h.offset <= abs_begin);
            for pos in (abs_end..=abs_begin).rev() {
                while hi > 0 && self.holes[hi - 1].offset > pos {
                    hi -= 1;
                }
                if hi > 0 && self.holes[hi - 1].offset + self.holes[hi - 1].length > pos {
                    out.push(CODE_N);
                } else {
                    out.push(complement(self.base_forward(pos)));
                }
            }
        }
        Ok(out)
    }

    /// Extract `[begin, end)` as stored, i.e. with the randomized filler
    /// bases instead of N.
    pub fn extract_raw(&self, begin: u64, end: u64) -> Result<NucSeq> {
        self.check_extract_range(begin, end)?;
        let mut out = NucSeq::new("");
        for pos in begin..end {
            out.push(self.base_at(pos));
        }
        Ok(out)
    }

    /// Whole contig on the forward strand, holes as N.
    pub fn extract_contig(&self, id: usize) -> Result<NucSeq> {
        let c = &self.contigs[id];
        let mut seq = self.extract(c.offset, c.offset + c.length)?;
        seq.name = c.name.clone();
        Ok(seq)
    }

    /// Clamp `[begin, end)` to the contig (and strand) holding `anchor`.
    pub fn clamp_to_contig(&self, begin: u64, end: u64, anchor: u64) -> (u64, u64) {
        let (far_begin, far_end) = self.contig_range_or_rev(self.contig_id_or_rev(anchor));
        (begin.max(far_begin), end.min(far_end))
    }

    /// Resolve a pack-coordinate range to (contig id, 0-based forward
    /// position of its leftmost base, strand).
    pub fn locate(&self, begin: u64, end: u64) -> (usize, u64, bool) {
        debug_assert!(begin < end);
        let on_reverse = self.is_on_reverse(begin);
        let abs_start = if on_reverse { self.mirror(end - 1) } else { begin };
        let id = self.contig_of(abs_start);
        (id, abs_start - self.contigs[id].offset, !on_reverse)
    }

    pub fn store(&self, prefix: &Path) -> Result<()> {
        let pac_path = prefix.with_extension("pac");
        let mut pac = BufWriter::new(
            File::create(&pac_path).with_context(|| format!("creating {}", pac_path.display()))?,
        );
        pac.write_all(&self.packed)?;
        if self.fwd_len % 4 == 0 {
            pac.write_all(&[0u8])?;
        }
        pac.write_all(&[(self.fwd_len % 4) as u8])?;
        pac.flush()?;

        let ann_path = prefix.with_extension("ann");
        let mut ann = BufWriter::new(
            File::create(&ann_path).with_context(|| format!("creating {}", ann_path.display()))?,
        );
        writeln!(ann, "{} {} {}", self.fwd_len, self.contigs.len(), self.seed)?;
        for c in &self.contigs {
            writeln!(ann, "{} {} {}", c.gi, c.name, c.comment)?;
            writeln!(ann, "{} {} {}", c.offset, c.length, c.holes)?;
        }
        ann.flush()?;

        let amb_path = prefix.with_extension("amb");
        let mut amb = BufWriter::new(
            File::create(&amb_path).with_context(|| format!("creating {}", amb_path.display()))?,
        );
        writeln!(
            amb,
            "{} {} {}",
            self.fwd_len,
            self.contigs.len(),
            self.holes.len()
        )?;
        for h in &self.holes {
            writeln!(amb, "{} {} {}", h.offset, h.length, h.symbol as char)?;
        }
        amb.flush()?;
        Ok(())
    }

    pub fn load(prefix: &Path) -> Result<Pack> {
        let mut pack = Pack::new();

        let ann_path = prefix.with_extension("ann");
        let ann = BufReader::new(
            File::open(&ann_path).with_context(|| format!("opening {}", ann_path.display()))?,
        );
        let mut lines = ann.lines();
        let header = lines
            .next()
            .context("missing header line in .ann file")??;
        let mut fields = header.split_whitespace();
        pack.fwd_len = parse_field(&mut fields, "forward size", &ann_path)?;
        let n_contigs: usize = parse_field(&mut fields, "contig count", &ann_path)?;
        pack.seed = parse_field(&mut fields, "seed", &ann_path)?;
        for _ in 0..n_contigs {
            let name_line = lines
                .next()
                .context("missing contig name line in .ann file")??;
            let mut parts = name_line.splitn(3, ' ');
            let gi: u32 = parse_field(&mut parts, "gi", &ann_path)?;
            let name = parts
                .next()
                .context("missing contig name in .ann file")?
                .to_string();
            let comment = parts.next().unwrap_or("none").to_string();
            let desc_line = lines
                .next()
                .context("missing contig descriptor line in .ann file")??;
            let mut parts = desc_line.split_whitespace();
            let offset = parse_field(&mut parts, "contig offset", &ann_path)?;
            let length = parse_field(&mut parts, "contig length", &ann_path)?;
            let holes = parse_field(&mut parts, "contig hole count", &ann_path)?;
            pack.contigs.push(ContigEntry {
                name,
                comment,
                gi,
                offset,
                length,
                holes,
            });
        }

        // Offset invariant before touching the packed bytes.
        let mut running = 0u64;
        for c in &pack.contigs {
            ensure!(
                c.offset == running,
                "inconsistent contig offsets in {}",
                ann_path.display()
            );
            running += c.length;
        }
        ensure!(
            running == pack.fwd_len,
            "contig lengths in {} do not sum to the forward size",
            ann_path.display()
        );

        let pac_path = prefix.with_extension("pac");
        let mut pac_bytes = Vec::new();
        File::open(&pac_path)
            .with_context(|| format!("opening {}", pac_path.display()))?
            .read_to_end(&mut pac_bytes)?;
        let sentinel = pack.fwd_len % 4 == 0;
        let expected = pack.fwd_len.div_ceil(4) as usize + 1 + sentinel as usize;
        ensure!(
            pac_bytes.len() == expected,
            "pack file {} has {} bytes, expected {}",
            pac_path.display(),
            pac_bytes.len(),
            expected
        );
        let checksum = pac_bytes.pop().unwrap();
        ensure!(
            checksum as u64 == pack.fwd_len % 4,
            "pack file {} carries checksum {}, expected {}",
            pac_path.display(),
            checksum,
            pack.fwd_len % 4
        );
        if sentinel {
            let z = pac_bytes.pop().unwrap();
            ensure!(
                z == 0,
                "pack file {} misses the expected zero sentinel byte",
                pac_path.display()
            );
        }
        pack.packed = pac_bytes;

        let amb_path = prefix.with_extension("amb");
        let amb = BufReader::new(
            File::open(&amb_path).with_context(|| format!("opening {}", amb_path.display()))?,
        );
        let mut lines = amb.lines();
        let header = lines
            .next()
            .context("missing header line in .amb file")??;
        let mut fields = header.split_whitespace();
        let amb_fwd: u64 = parse_field(&mut fields, "forward size", &amb_path)?;
        let _: usize = parse_field(&mut fields, "contig count", &amb_path)?;
        let n_holes: usize = parse_field(&mut fields, "hole count", &amb_path)?;
        ensure!(
            amb_fwd == pack.fwd_len,
            "forward size differs between .ann and .amb for prefix {}",
            prefix.display()
        );
        for _ in 0..n_holes {
            let line = lines.next().context("missing hole line in .amb file")??;
            let mut parts = line.split_whitespace();
            let offset = parse_field(&mut parts, "hole offset", &amb_path)?;
            let length = parse_field(&mut parts, "hole length", &amb_path)?;
            let symbol = parts
                .next()
                .and_then(|s| s.bytes().next())
                .context("missing hole symbol in .amb file")?;
            pack.holes.push(HoleEntry {
                offset,
                length,
                symbol,
            });
        }
        ensure!(
            pack.holes.windows(2).all(|w| w[0].offset + w[0].length <= w[1].offset),
            "holes in {} overlap or are unsorted",
            amb_path.display()
        );
        Ok(pack)
    }
}

fn parse_field<'a, T: std::str::FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    what: &str,
    path: &Path,
) -> Result<T> {
    let raw = fields
        .next()
        .with_context(|| format!("missing {} in {}", what, path.display()))?;
    raw.parse()
        .ok()
        .with_context(|| format!("invalid {} {:?} in {}", what, raw, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_of(seqs: &[(&str, &str)]) -> Pack {
        let mut pack = Pack::new();
        for (name, seq) in seqs {
            pack.append_sequence(name, "", &NucSeq::from_ascii(*name, seq.as_bytes()));
        }
        pack
    }

    #[test]
    fn packs_and_extracts_forward() {
        let pack = pack_of(&[("c0", "ACGTACGTACGT")]);
        assert_eq!(pack.len_forward(), 12);
        assert_eq!(pack.extract(0, 12).unwrap().to_ascii_string(), "ACGTACGTACGT");
        assert_eq!(pack.extract(2, 6).unwrap().to_ascii_string(), "GTAC");
        assert_eq!(pack.extract(5, 5).unwrap().len(), 0);
    }

    #[test]
    fn reverse_extraction_is_reverse_complement() {
        let pack = pack_of(&[("c0", "ACGGTTCA")]);
        let n = pack.len_forward();
        let fwd = pack.extract(0, n).unwrap();
        let rev = pack.extract(n, 2 * n).unwrap();
        assert_eq!(rev, fwd.reverse_complement());
        // Mirror law on a sub-range.
        let sub = pack.extract(1, 5).unwrap();
        let mirrored = pack.extract(pack.mirror(4), pack.mirror(1) + 1).unwrap();
        assert_eq!(mirrored, sub.reverse_complement());
    }

    #[test]
    fn extraction_concatenation() {
        let pack = pack_of(&[("c0", "ACGGTTCAGGTCA")]);
        let a = pack.extract(0, 5).unwrap();
        let b = pack.extract(5, 11).unwrap();
        let joint = pack.extract(0, 11).unwrap();
        let mut cat = a.as_slice().to_vec();
        cat.extend_from_slice(b.as_slice());
        assert_eq!(cat, joint.as_slice());
    }

    #[test]
    fn holes_expand_to_n() {
        let pack = pack_of(&[("c0", "AAAANNNNNNNNGGGG")]);
        assert_eq!(pack.holes().len(), 1);
        assert_eq!(pack.holes()[0].offset, 4);
        assert_eq!(pack.holes()[0].length, 8);
        assert_eq!(
            pack.extract(0, 16).unwrap().to_ascii_string(),
            "AAAANNNNNNNNGGGG"
        );
        // Reverse strand shows the hole as well.
        let rev = pack.extract(pack.len_forward(), pack.len_total()).unwrap();
        assert_eq!(rev.to_ascii_string(), "CCCCNNNNNNNNTTTT");
        assert!(pack.is_hole(4));
        assert!(!pack.is_hole(3));
        assert!((pack.hole_coverage(0, 16) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bridging_detection() {
        let pack = pack_of(&[("c0", "ACGTACGT"), ("c1", "TTTTCCCC")]);
        assert!(!pack.bridging(0, 8));
        assert!(pack.bridging(4, 8)); // crosses c0/c1
        assert!(!pack.bridging(8, 8));
        assert!(pack.bridging(12, 8)); // crosses the midpoint
        assert!(!pack.bridging(16, 8)); // reverse c1
        assert!(pack.bridging(30, 4)); // out of range
        assert!(pack.extract(4, 12).is_err());
        assert!(pack.extract(12, 20).is_err());
    }

    #[test]
    fn contig_lookup_and_locate() {
        let pack = pack_of(&[("c0", "ACGTACGT"), ("c1", "TTTTCCCC")]);
        assert_eq!(pack.contig_of(0), 0);
        assert_eq!(pack.contig_of(7), 0);
        assert_eq!(pack.contig_of(8), 1);
        assert_eq!(pack.contig_id_or_rev(0), 0);
        assert_eq!(pack.contig_id_or_rev(9), 2);
        assert_eq!(pack.contig_id_or_rev(16), 3); // reverse of c1
        assert_eq!(pack.contig_id_or_rev(25), 1); // reverse of c0
        // Reverse range [25, 29) covers forward positions 3..7 of c0.
        let (id, pos, fwd) = pack.locate(25, 29);
        assert_eq!((id, pos, fwd), (0, 3, false));
        let (id, pos, fwd) = pack.locate(9, 12);
        assert_eq!((id, pos, fwd), (1, 1, true));
    }

    #[test]
    fn unbridge_shrinks_to_larger_half() {
        let pack = pack_of(&[("c0", "ACGTACGT"), ("c1", "TTTTCCCC")]);
        // [6, 14) crosses the c0/c1 border at 8; the right half is larger.
        let (b, s) = pack.unbridge(6, 8);
        assert_eq!((b, s), (8, 6));
        // [1, 8) stays left of the border after clamping.
        let (b, s) = pack.unbridge(1, 9);
        assert_eq!((b, s), (1, 7));
    }

    #[test]
    fn clamp_to_contig_respects_strand() {
        let pack = pack_of(&[("c0", "ACGTACGT"), ("c1", "TTTTCCCC")]);
        assert_eq!(pack.clamp_to_contig(0, 20, 9), (8, 16));
        // Anchor on reverse c1 (positions 16..24).
        assert_eq!(pack.clamp_to_contig(10, 30, 18), (16, 24));
    }

    #[test]
    fn store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        for seq in ["ACGTACGTACGTA", "ACGTACGTACGT"] {
            // Both byte-aligned and unaligned forward sizes.
            let mut pack = pack_of(&[("c0", seq), ("c1", "TTNNTT")]);
            pack.contigs[0].comment = "with comment".to_string();
            let prefix = dir.path().join("ref");
            pack.store(&prefix).unwrap();
            let loaded = Pack::load(&prefix).unwrap();
            assert_eq!(loaded.len_forward(), pack.len_forward());
            assert_eq!(loaded.contigs(), pack.contigs());
            assert_eq!(loaded.holes(), pack.holes());
            assert_eq!(loaded.packed, pack.packed);
            let n = pack.len_total();
            for (b, e) in [(0, n / 2), (2, 7), (n / 2, n)] {
                assert_eq!(
                    loaded.extract(b, e).unwrap(),
                    pack.extract(b, e).unwrap()
                );
            }
        }
    }

    #[test]
    fn load_rejects_corrupt_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let pack = pack_of(&[("c0", "ACGTACG")]);
        let prefix = dir.path().join("ref");
        pack.store(&prefix).unwrap();
        let pac = prefix.with_extension("pac");
        let mut bytes = std::fs::read(&pac).unwrap();
        *bytes.last_mut().unwrap() ^= 1;
        std::fs::write(&pac, &bytes).unwrap();
        assert!(Pack::load(&prefix).is_err());
    }
}
