//! Banded dynamic-programming extension of harmonized chains.
//!
//! Two kernels: a global gap filler for the windows between consecutive
//! chain seeds (two-piece affine gaps, value-based traceback over the
//! full banded matrix) and an anchored extension off the chain ends
//! (single affine piece, Z-drop early exit, traceback from the best
//! cell). The chain walker stitches seed runs, gap fills and end
//! extensions into one alignment and freezes it. DP scratch space is
//! thread-local and reused across strips.

use crate::alignment::{AlnOp, Alignment};
use crate::nucseq::NucSeq;
use crate::pack::Pack;
use crate::params::AlignParams;
use crate::seed::{Seed, Seeds};
use anyhow::{ensure, Result};
use std::cell::RefCell;

const NEG: i64 = i64::MIN / 4;

const TB_NONE: u8 = 0;
const TB_DIAG: u8 = 1;
const TB_DEL: u8 = 2;
const TB_INS: u8 = 3;

/// Pre-allocation for typical short-read windows.
const INITIAL_ROW: usize = 512;

thread_local! {
    static WORKSPACE: RefCell<DpWorkspace> = RefCell::new(DpWorkspace::new());
}

/// Per-worker scratch for the DP kernels, reused across strips within a
/// query and across queries on the same thread.
struct DpWorkspace {
    /// Rolling H and E rows of the anchored extension.
    h: Vec<i64>,
    e: Vec<i64>,
    /// Full matrices of the gap filler.
    hm: Vec<i64>,
    em1: Vec<i64>,
    em2: Vec<i64>,
    fm1: Vec<i64>,
    fm2: Vec<i64>,
}

impl DpWorkspace {
    fn new() -> Self {
        DpWorkspace {
            h: Vec::with_capacity(INITIAL_ROW),
            e: Vec::with_capacity(INITIAL_ROW),
            hm: Vec::new(),
            em1: Vec::new(),
            em2: Vec::new(),
            fm1: Vec::new(),
            fm2: Vec::new(),
        }
    }
}

fn with_workspace<F, R>(f: F) -> R
where
    F: FnOnce(&mut DpWorkspace) -> R,
{
    WORKSPACE.with(|ws| f(&mut ws.borrow_mut()))
}

fn reset(buf: &mut Vec<i64>, len: usize) {
    buf.clear();
    buf.resize(len, NEG);
}

/// Outcome of an anchored end extension.
#[derive(Debug, Default)]
struct Extension {
    ops: Vec<(AlnOp, u32)>,
    q_used: usize,
    r_used: usize,
    score: i64,
}

pub struct DpExtender<'a> {
    params: &'a AlignParams,
}

impl<'a> DpExtender<'a> {
    pub fn new(params: &'a AlignParams) -> Self {
        DpExtender { params }
    }

    #[inline]
    fn pair(&self, a: u8, b: u8) -> i64 {
        if a >= 4 || b >= 4 {
            -1
        } else if a == b {
            self.params.match_score as i64
        } else {
            -(self.params.mismatch_penalty as i64)
        }
    }

    /// Turn one harmonized chain into a frozen alignment.
    ///
    /// Seeds must be sorted by query position and monotone on both
    /// axes; overlapping neighbors are trimmed along their diagonal.
    /// Seeds that left the contig of the first seed are dropped, the
    /// window never crosses a contig or strand boundary.
    pub fn align_chain(
        &self,
        chain: &Seeds,
        query: &NucSeq,
        pack: &Pack,
    ) -> Result<Option<Alignment>> {
        if chain.is_empty() {
            return Ok(None);
        }
        ensure!(
            query.len() as i64 * self.params.match_score as i64 <= i32::MAX as i64 / 2,
            "query of length {} overflows the i32 score range",
            query.len()
        );

        let anchor_contig = pack.contig_id_or_rev(chain[0].r_start);
        let mut seeds: Vec<Seed> = Vec::with_capacity(chain.len());
        for &s in chain {
            if pack.contig_id_or_rev(s.r_start) != anchor_contig {
                log::debug!(
                    "{}: dropping chain seed at {} outside the anchor contig",
                    query.name,
                    s.r_start
                );
                continue;
            }
            match seeds.last() {
                None => seeds.push(s),
                Some(prev) => {
                    let cut_q = prev.q_end().saturating_sub(s.q_start);
                    let cut_r = prev.r_end().saturating_sub(s.r_start);
                    let cut = cut_q.max(cut_r);
                    if cut >= s.len {
                        continue;
                    }
                    let mut t = s;
                    t.q_start += cut;
                    t.r_start += cut;
                    t.len -= cut;
                    seeds.push(t);
                }
            }
        }
        if seeds.is_empty() {
            return Ok(None);
        }

        let first = seeds[0];
        let last = *seeds.last().unwrap();
        let qlen = query.len() as u64;
        let want_begin = first.r_start.saturating_sub(first.q_start + self.params.padding);
        let want_end = (last.r_end() + (qlen - last.q_end()) + self.params.padding)
            .min(pack.len_total());
        let (win_begin, win_end) = pack.clamp_to_contig(want_begin, want_end, first.r_start);

        // Left extension over the reversed prefix.
        let q_pre: Vec<u8> = query.as_slice()[..first.q_start as usize]
            .iter()
            .rev()
            .copied()
            .collect();
        let r_pre: Vec<u8> = pack
            .extract(win_begin, first.r_start)?
            .as_slice()
            .iter()
            .rev()
            .copied()
            .collect();
        let left = self.extend_anchored(&q_pre, &r_pre);

        let q_begin = first.q_start - left.q_used as u64;
        let r_begin = first.r_start - left.r_used as u64;
        let mut aln = Alignment::new(r_begin, q_begin);
        if q_begin > 0 {
            aln.append(AlnOp::SoftClip, q_begin as u32);
        }
        for &(op, n) in left.ops.iter().rev() {
            aln.append(op, n);
        }

        // Chain body: seed runs with gap fills in between.
        aln.append(AlnOp::Seed, first.len as u32);
        let mut prev = first;
        for &s in &seeds[1..] {
            let gap_q = &query.as_slice()[prev.q_end() as usize..s.q_start as usize];
            let gap_r = pack.extract(prev.r_end(), s.r_start)?;
            self.fill_gap(gap_q, gap_r.as_slice(), &mut aln);
            aln.append(AlnOp::Seed, s.len as u32);
            prev = s;
        }

        // Right extension to the query end.
        let q_suf = &query.as_slice()[last.q_end() as usize..];
        let r_suf = pack.extract(last.r_end(), win_end)?;
        let right = self.extend_anchored(q_suf, r_suf.as_slice());
        log::trace!(
            "{}: end extensions scored {} left, {} right",
            query.name,
            left.score,
            right.score
        );
        for &(op, n) in &right.ops {
            aln.append(op, n);
        }
        let tail = qlen - last.q_end() - right.q_used as u64;
        if tail > 0 {
            aln.append(AlnOp::SoftClip, tail as u32);
        }

        aln.freeze(self.params);
        Ok(Some(aln))
    }

    /// Global banded alignment of a gap window; appends ops in place.
    ///
    /// Windows larger than the gap-area cap are filled with plain indel
    /// runs instead of DP.
    fn fill_gap(&self, q: &[u8], t: &[u8], out: &mut Alignment) {
        let (nq, nt) = (q.len(), t.len());
        if nq == 0 && nt == 0 {
            return;
        }
        if nq == 0 {
            out.append(AlnOp::Deletion, nt as u32);
            return;
        }
        if nt == 0 {
            out.append(AlnOp::Insertion, nq as u32);
            return;
        }
        if ((nq + 1) * (nt + 1)) as u64 > self.params.max_gap_area {
            log::debug!("gap window {nq}x{nt} beyond the DP area cap, filling with indel runs");
            out.append(AlnOp::Deletion, nt as u32);
            out.append(AlnOp::Insertion, nq as u32);
            return;
        }
        with_workspace(|ws| self.fill_gap_banded(ws, q, t, out));
    }

    fn fill_gap_banded(&self, ws: &mut DpWorkspace, q: &[u8], t: &[u8], out: &mut Alignment) {
        let (nq, nt) = (q.len(), t.len());
        let shift = (nq as i64 - nt as i64).abs();
        let w = (self.params.min_gap_bandwidth as i64).max(shift + 8);
        let oe1 = (self.params.gap_open + self.params.gap_extend) as i64;
        let e1 = self.params.gap_extend as i64;
        let oe2 = (self.params.gap_open_2 + self.params.gap_extend_2) as i64;
        let e2 = self.params.gap_extend_2 as i64;

        let stride = nq + 1;
        let idx = |i: usize, j: usize| i * stride + j;
        let cells = (nt + 1) * stride;
        reset(&mut ws.hm, cells);
        reset(&mut ws.em1, cells);
        reset(&mut ws.em2, cells);
        reset(&mut ws.fm1, cells);
        reset(&mut ws.fm2, cells);

        ws.hm[idx(0, 0)] = 0;
        for i in 1..=nt {
            if i as i64 > w {
                break;
            }
            ws.em1[idx(i, 0)] = -(self.params.gap_open as i64 + e1 * i as i64);
            ws.em2[idx(i, 0)] = -(self.params.gap_open_2 as i64 + e2 * i as i64);
            ws.hm[idx(i, 0)] = ws.em1[idx(i, 0)].max(ws.em2[idx(i, 0)]);
        }
        for j in 1..=nq {
            if j as i64 > w {
                break;
            }
            ws.fm1[idx(0, j)] = -(self.params.gap_open as i64 + e1 * j as i64);
            ws.fm2[idx(0, j)] = -(self.params.gap_open_2 as i64 + e2 * j as i64);
            ws.hm[idx(0, j)] = ws.fm1[idx(0, j)].max(ws.fm2[idx(0, j)]);
        }

        for i in 1..=nt {
            let beg = ((i as i64 - w).max(1)) as usize;
            let end = ((i as i64 + w).min(nq as i64)) as usize;
            for j in beg..=end {
                let e1v = (ws.hm[idx(i - 1, j)] - oe1).max(ws.em1[idx(i - 1, j)] - e1);
                let e2v = (ws.hm[idx(i - 1, j)] - oe2).max(ws.em2[idx(i - 1, j)] - e2);
                let f1v = (ws.hm[idx(i, j - 1)] - oe1).max(ws.fm1[idx(i, j - 1)] - e1);
                let f2v = (ws.hm[idx(i, j - 1)] - oe2).max(ws.fm2[idx(i, j - 1)] - e2);
                let m = ws.hm[idx(i - 1, j - 1)] + self.pair(q[j - 1], t[i - 1]);
                ws.em1[idx(i, j)] = e1v;
                ws.em2[idx(i, j)] = e2v;
                ws.fm1[idx(i, j)] = f1v;
                ws.fm2[idx(i, j)] = f2v;
                ws.hm[idx(i, j)] = m.max(e1v).max(e2v).max(f1v).max(f2v);
            }
        }

        // Value-based traceback from the corner, preferring diagonal
        // steps and gap opens on ties.
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            H,
            E1,
            E2,
            F1,
            F2,
        }
        let mut ops: Vec<(AlnOp, u32)> = Vec::new();
        let mut push = |ops: &mut Vec<(AlnOp, u32)>, op: AlnOp| match ops.last_mut() {
            Some((last, n)) if *last == op => *n += 1,
            _ => ops.push((op, 1)),
        };
        let (mut i, mut j) = (nt, nq);
        let mut state = State::H;
        while i > 0 || j > 0 {
            match state {
                State::H => {
                    let h = ws.hm[idx(i, j)];
                    if i > 0
                        && j > 0
                        && h == ws.hm[idx(i - 1, j - 1)] + self.pair(q[j - 1], t[i - 1])
                    {
                        let op = if q[j - 1] == t[i - 1] && q[j - 1] < 4 {
                            AlnOp::Match
                        } else {
                            AlnOp::Mismatch
                        };
                        push(&mut ops, op);
                        i -= 1;
                        j -= 1;
                    } else if i > 0 && h == ws.em1[idx(i, j)] {
                        state = State::E1;
                    } else if i > 0 && h == ws.em2[idx(i, j)] {
                        state = State::E2;
                    } else if j > 0 && h == ws.fm1[idx(i, j)] {
                        state = State::F1;
                    } else if j > 0 && h == ws.fm2[idx(i, j)] {
                        state = State::F2;
                    } else {
                        debug_assert!(false, "gap fill traceback stuck at ({i}, {j})");
                        break;
                    }
                }
                State::E1 | State::E2 => {
                    let (mat, oe, ext) = if state == State::E1 {
                        (&ws.em1, oe1, e1)
                    } else {
                        (&ws.em2, oe2, e2)
                    };
                    let opened = mat[idx(i, j)] == ws.hm[idx(i - 1, j)] - oe;
                    let continued = mat[idx(i, j)] == mat[idx(i - 1, j)] - ext;
                    push(&mut ops, AlnOp::Deletion);
                    i -= 1;
                    if opened || !continued {
                        state = State::H;
                    }
                }
                State::F1 | State::F2 => {
                    let (mat, oe, ext) = if state == State::F1 {
                        (&ws.fm1, oe1, e1)
                    } else {
                        (&ws.fm2, oe2, e2)
                    };
                    let opened = mat[idx(i, j)] == ws.hm[idx(i, j - 1)] - oe;
                    let continued = mat[idx(i, j)] == mat[idx(i, j - 1)] - ext;
                    push(&mut ops, AlnOp::Insertion);
                    j -= 1;
                    if opened || !continued {
                        state = State::H;
                    }
                }
            }
        }
        for &(op, n) in ops.iter().rev() {
            out.append(op, n);
        }
    }

    /// Anchored extension from the window origin: global scoring with
    /// a band and Z-drop, traceback from the best-scoring cell.
    fn extend_anchored(&self, query: &[u8], target: &[u8]) -> Extension {
        if query.is_empty() || target.is_empty() {
            return Extension::default();
        }
        with_workspace(|ws| self.extend_anchored_banded(ws, query, target))
    }

    fn extend_anchored_banded(
        &self,
        ws: &mut DpWorkspace,
        query: &[u8],
        target: &[u8],
    ) -> Extension {
        let qlen = query.len();
        let tlen = target.len();
        let w = self.params.bandwidth_dp_extension as i64;
        let o = self.params.gap_open as i64;
        let e_ext = self.params.gap_extend as i64;
        let oe = o + e_ext;
        let zdrop = self.params.zdrop as i64;

        reset(&mut ws.h, qlen + 1);
        reset(&mut ws.e, qlen + 1);
        ws.h[0] = 0;
        for j in 1..=qlen.min(w as usize) {
            ws.h[j] = -(o + e_ext * j as i64);
        }

        let mut tb: Vec<Vec<u8>> = Vec::with_capacity(tlen + 1);
        let mut row0 = vec![TB_NONE; qlen + 1];
        for cell in row0.iter_mut().take(qlen + 1).skip(1) {
            *cell = TB_INS;
        }
        tb.push(row0);

        let mut best = (0i64, 0usize, 0usize);
        let mut gscore = NEG;
        let mut gscore_i = 0usize;
        for i in 1..=tlen {
            let beg = (i as i64 - w).max(1) as usize;
            let end = ((i as i64 + w).min(qlen as i64)) as usize;
            if beg > end {
                break;
            }
            let mut row = vec![TB_NONE; qlen + 1];

            // The j = 0 column of this row.
            let h0_cur = if i as i64 <= w { -(o + e_ext * i as i64) } else { NEG };
            if beg == 1 {
                row[0] = TB_DEL;
            }

            let mut h_diag = ws.h[beg - 1];
            let mut h_left = if beg == 1 { h0_cur } else { NEG };
            let mut f = NEG;
            let mut row_best = NEG;
            let mut row_best_j = beg;
            for j in beg..=end {
                let m = h_diag + self.pair(query[j - 1], target[i - 1]);
                let e_val = (ws.h[j] - oe).max(ws.e[j] - e_ext);
                let f_val = (h_left - oe).max(f - e_ext);
                let (hv, dir) = if m >= e_val && m >= f_val {
                    (m, TB_DIAG)
                } else if e_val >= f_val {
                    (e_val, TB_DEL)
                } else {
                    (f_val, TB_INS)
                };
                h_diag = ws.h[j];
                ws.h[j] = hv;
                ws.e[j] = e_val;
                f = f_val;
                h_left = hv;
                row[j] = dir;
                if hv > row_best {
                    row_best = hv;
                    row_best_j = j;
                }
            }
            if beg == 1 {
                ws.h[0] = h0_cur;
            }
            tb.push(row);

            if end == qlen && ws.h[qlen] > gscore {
                gscore = ws.h[qlen];
                gscore_i = i;
            }
            if row_best > best.0 {
                best = (row_best, i, row_best_j);
            } else if zdrop > 0 {
                let diff_i = i as i64 - best.1 as i64;
                let diff_j = row_best_j as i64 - best.2 as i64;
                let gap_skew = (diff_i - diff_j).abs();
                if best.0 - row_best > zdrop + gap_skew * e_ext {
                    break;
                }
            }
        }

        // Reach the query boundary unless the full-length score drops
        // too far below the local optimum; otherwise soft-clip there.
        if gscore > 0 && gscore > best.0 - self.params.clip_penalty as i64 {
            best = (gscore, gscore_i, qlen);
        }
        if best.0 <= 0 {
            return Extension::default();
        }

        let (mut i, mut j) = (best.1, best.2);
        let mut ops: Vec<(AlnOp, u32)> = Vec::new();
        let mut push = |ops: &mut Vec<(AlnOp, u32)>, op: AlnOp| match ops.last_mut() {
            Some((last, n)) if *last == op => *n += 1,
            _ => ops.push((op, 1)),
        };
        while i > 0 || j > 0 {
            match tb[i][j] {
                TB_DIAG => {
                    let op = if query[j - 1] == target[i - 1] && query[j - 1] < 4 {
                        AlnOp::Match
                    } else {
                        AlnOp::Mismatch
                    };
                    push(&mut ops, op);
                    i -= 1;
                    j -= 1;
                }
                TB_DEL => {
                    push(&mut ops, AlnOp::Deletion);
                    i -= 1;
                }
                TB_INS => {
                    push(&mut ops, AlnOp::Insertion);
                    j -= 1;
                }
                _ => {
                    debug_assert!(i == 0 && j == 0, "extension traceback stuck at ({i}, {j})");
                    break;
                }
            }
        }
        ops.reverse();
        Extension {
            ops,
            q_used: best.2,
            r_used: best.1,
            score: best.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(reference: &str) -> (Pack, AlignParams) {
        let mut pack = Pack::new();
        pack.append_sequence("c0", "", &NucSeq::from_ascii("c0", reference.as_bytes()));
        (pack, AlignParams::default())
    }

    fn chain(seeds: &[Seed]) -> Seeds {
        seeds.iter().copied().collect()
    }

    #[test]
    fn exact_single_seed_chain() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        let query = NucSeq::from_ascii("q", b"CAGTTACG");
        let extender = DpExtender::new(&params);
        let aln = extender
            .align_chain(&chain(&[Seed::new(0, 8, 5, true, 1)]), &query, &pack)
            .unwrap()
            .unwrap();
        assert_eq!(aln.cigar(), "8=");
        assert_eq!(aln.score, 16);
        assert_eq!(aln.r_begin, 5);
        assert_eq!(aln.q_begin, 0);
        assert_eq!(aln.op_sum_query(), aln.query_span());
        assert_eq!(aln.op_sum_ref(), aln.ref_span());
    }

    #[test]
    fn gap_fill_emits_insertion() {
        // Query carries a 4bp insertion between two exact halves.
        let (pack, params) = setup("ACGGTCAGTTACGGATCAGGTCCATGCA");
        let query = NucSeq::from_ascii("q", b"ACGGTCAGTCCCCTACGGATCA");
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(0, 9, 0, true, 1), Seed::new(13, 9, 9, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "9=4I9=");
        assert_eq!(aln.op_sum_query(), 22);
        assert_eq!(aln.op_sum_ref(), 18);
    }

    #[test]
    fn gap_fill_emits_deletion() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCAGGTC");
        // Query misses the reference bases 9..12.
        let query = NucSeq::from_ascii("q", b"ACGGTCAGTGGATCAGGTC");
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(0, 9, 0, true, 1), Seed::new(9, 10, 12, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "9=3D10=");
    }

    #[test]
    fn mismatch_gap_is_filled_diagonally() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        // One substitution in the middle of an otherwise exact match.
        let query = NucSeq::from_ascii("q", b"ACGGTCAGATACGGATCA");
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(0, 8, 0, true, 1), Seed::new(9, 9, 9, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "8=1X9=");
        assert_eq!(aln.score, 17 * 2 - 4);
    }

    #[test]
    fn ends_extend_across_mismatches() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        // Seed covers only the middle; both flanks match except one
        // substitution on the left flank.
        let query = NucSeq::from_ascii("q", b"AGGGTCAGTTACGGATCA");
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(4, 8, 4, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "1=1X16=");
        assert_eq!(aln.r_begin, 0);
        assert_eq!(aln.q_begin, 0);
    }

    #[test]
    fn unextendable_tail_is_soft_clipped() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        // The last 6 query symbols match nothing near the seed.
        let query = NucSeq::from_ascii("q", b"CAGTTACGCCCCCC");
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(0, 8, 5, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert!(aln.cigar().starts_with("8="));
        assert!(aln.cigar().ends_with('S'));
        assert_eq!(aln.query_span() + aln.clipped(), 14);
    }

    #[test]
    fn overlapping_seeds_are_trimmed() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        let query = NucSeq::from_ascii("q", b"ACGGTCAGTTACGG");
        let extender = DpExtender::new(&params);
        // Co-diagonal overlapping seeds over an exact region.
        let seeds = chain(&[Seed::new(0, 10, 0, true, 1), Seed::new(6, 8, 6, true, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "14=");
        assert_eq!(aln.score, 28);
    }

    #[test]
    fn reverse_strand_chain_aligns_against_reverse_extraction() {
        let (pack, params) = setup("ACGGTCAGTTACGGATCA");
        let fwd = NucSeq::from_ascii("q", b"CAGTTACG");
        let query = fwd.reverse_complement();
        // The reverse-strand occurrence of the reverse complement:
        // forward range [5, 13) mirrors to [23, 31) in pack coordinates.
        let r_start = pack.mirror(13 - 1);
        let extender = DpExtender::new(&params);
        let seeds = chain(&[Seed::new(0, 8, r_start, false, 1)]);
        let aln = extender.align_chain(&seeds, &query, &pack).unwrap().unwrap();
        assert_eq!(aln.cigar(), "8=");
        let loc = aln.locate(&pack);
        assert!(!loc.on_forward);
        assert_eq!(loc.position, 5);
    }
}
