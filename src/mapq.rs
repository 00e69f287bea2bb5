//! Mapping quality and primary/secondary/supplementary marking.
//!
//! The confidence of the primary alignment is the relative score gap to
//! the runner-up, clamped to [0, 1]. Alignments that barely overlap the
//! primary on the query continue a chimeric mapping and are emitted as
//! supplementaries with zero confidence; everything else overlapping
//! the primary is secondary.

use crate::alignment::Alignment;
use crate::pack::Pack;
use crate::params::AlignParams;

/// Rank alignments, assign confidences, and trim the list to the
/// configured report size.
pub fn assign(alignments: &mut Vec<Alignment>, pack: &Pack, params: &AlignParams) {
    alignments.retain(|a| a.score >= params.min_alignment_score);
    if alignments.is_empty() {
        return;
    }

    // Primary first: best score, ties broken by genome position
    // (contig, forward-strand offset, forward before reverse).
    alignments.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            let (ca, pa, fa) = pack.locate(a.r_begin, a.r_end);
            let (cb, pb, fb) = pack.locate(b.r_begin, b.r_end);
            (ca, pa, !fa).cmp(&(cb, pb, !fb))
        })
    });

    let primary_score = alignments[0].score;
    let runner_up = alignments.get(1).map(|a| a.score);
    let mapq = match runner_up {
        None => 1.0,
        Some(_) if primary_score <= 0 => 0.0,
        Some(second) => ((primary_score - second) as f32 / primary_score as f32).clamp(0.0, 1.0),
    };

    let primary = alignments[0].clone();
    alignments[0].mapq = mapq;
    alignments[0].secondary = false;
    alignments[0].supplementary = false;

    let mut supplementaries = 0usize;
    for aln in alignments.iter_mut().skip(1) {
        let overlap = aln.query_overlap(&primary);
        if overlap <= params.max_overlap_supplementary
            && supplementaries < params.max_supplementary_per_prim
        {
            aln.supplementary = true;
            aln.secondary = false;
            supplementaries += 1;
        } else {
            aln.secondary = true;
            aln.supplementary = false;
        }
        aln.mapq = 0.0;
    }

    alignments.truncate(params.report_n_best.max(1));
}
