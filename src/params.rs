//! Pipeline configuration.
//!
//! One plain value threaded through the stage constructors; no global
//! parameter state. The defaults are tuned for short reads on a
//! reasonably repetitive genome and every stage reads only the knobs it
//! owns.

/// Tuning knobs for the whole alignment pipeline.
#[derive(Debug, Clone)]
pub struct AlignParams {
    // Seeding
    pub min_seed_len: usize, // discard SMEMs shorter than this
    pub max_ambiguity: u64,  // skip a segment if its SA interval is larger

    // Strips of consideration
    pub strip_width: u64, // diagonal width of one strip; 0 = query length

    // Harmonization
    pub optimistic_gap_estimation: bool, // lower-bound gap costs in the chain cut
    pub do_gap_cost_cut: bool,
    pub do_ransac: bool,
    pub max_delta_dist: f64, // RANSAC inlier bound, relative to query length
    pub min_delta_dist: u64, // RANSAC inlier bound, absolute floor
    pub max_delta_distance_in_cluster: u64,
    pub min_query_coverage: f64, // above this coverage the cluster split keeps everything
    pub harm_score_min: u64,     // absolute floor on a harmonized chain score
    pub harm_score_min_rel: f64, // relative floor on a harmonized chain score

    // Strip extraction break criteria
    pub max_tries: usize,
    pub min_tries: usize,
    pub score_tolerance: f64, // stop once the harmonized score drops this far below the best
    pub max_equal_score_lookahead: usize,
    pub score_diff_tolerance: f64,
    pub switch_q_len: usize, // queries longer than this use the score-drop criterion

    // DP extension
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub gap_open_2: i32, // second affine piece; a gap costs the cheaper of the two
    pub gap_extend_2: i32,
    pub zdrop: i32,
    /// End extensions run to the query boundary unless the full-length
    /// score falls this far below the local optimum.
    pub clip_penalty: i32,
    pub padding: u64, // reference slack beyond the chain ends
    pub min_gap_bandwidth: i32,
    pub bandwidth_dp_extension: i32,
    pub max_gap_area: u64, // gaps larger than this are filled with plain indel runs

    // Mapping quality / output
    pub report_n_best: usize,
    /// Alignments scoring below this are never reported. Sized for real
    /// read lengths; drop it for toy references.
    pub min_alignment_score: i32,
    pub max_overlap_supplementary: f64,
    pub max_supplementary_per_prim: usize,

    // Driver
    pub num_threads: usize, // 0 = rayon default
}

impl Default for AlignParams {
    fn default() -> Self {
        AlignParams {
            min_seed_len: 16,
            max_ambiguity: 500,

            strip_width: 0,

            optimistic_gap_estimation: true,
            do_gap_cost_cut: true,
            do_ransac: true,
            max_delta_dist: 0.1,
            min_delta_dist: 16,
            max_delta_distance_in_cluster: 200,
            min_query_coverage: 1.1,
            harm_score_min: 18,
            harm_score_min_rel: 0.002,

            max_tries: 50,
            min_tries: 2,
            score_tolerance: 0.1,
            max_equal_score_lookahead: 3,
            score_diff_tolerance: 0.0001,
            switch_q_len: 800,

            match_score: 2,
            mismatch_penalty: 4,
            gap_open: 4,
            gap_extend: 2,
            gap_open_2: 24,
            gap_extend_2: 1,
            zdrop: 200,
            clip_penalty: 10,
            padding: 1000,
            min_gap_bandwidth: 20,
            bandwidth_dp_extension: 512,
            max_gap_area: 10_000,

            report_n_best: 3,
            min_alignment_score: 75,
            max_overlap_supplementary: 0.1,
            max_supplementary_per_prim: 1,

            num_threads: 0,
        }
    }
}

impl AlignParams {
    /// Strip width used for a query of the given length.
    pub fn effective_strip_width(&self, query_len: usize) -> u64 {
        if self.strip_width > 0 {
            self.strip_width
        } else {
            (query_len as u64).max(1)
        }
    }

    /// Cheapest cost of a gap of the given length under the two affine pieces.
    pub fn gap_cost(&self, len: u64) -> i64 {
        if len == 0 {
            return 0;
        }
        let one = self.gap_open as i64 + self.gap_extend as i64 * len as i64;
        let two = self.gap_open_2 as i64 + self.gap_extend_2 as i64 * len as i64;
        one.min(two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_width_defaults_to_query_length() {
        let p = AlignParams::default();
        assert_eq!(p.effective_strip_width(150), 150);
        let fixed = AlignParams {
            strip_width: 64,
            ..AlignParams::default()
        };
        assert_eq!(fixed.effective_strip_width(150), 64);
    }

    #[test]
    fn gap_cost_takes_cheaper_piece() {
        let p = AlignParams::default();
        // Short gaps favor the steep piece, long gaps the flat one.
        assert_eq!(p.gap_cost(1), 6);
        assert_eq!(p.gap_cost(100), 124);
        assert_eq!(p.gap_cost(0), 0);
    }
}
