//! Harmonization: turning one strip of consideration into a consistent
//! chain.
//!
//! Each seed casts a shadow onto the left and the right border of its
//! strip. Two seeds can lie on a common monotone chain exactly when
//! neither shadow of one is nested inside the corresponding shadow of
//! the other, so one line sweep per border over the shadow intervals
//! removes every contradiction in O(n log n). The surviving seeds then
//! pass a trend filter (deterministic RANSAC over seed centers), a
//! gap-cost cut, a cluster split and a score floor.

use crate::params::AlignParams;
use crate::seed::{Seed, Seeds};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Shadow of one seed on one strip border, with a back-pointer to the
/// seed it came from.
#[derive(Debug, Clone, Copy)]
struct ShadowInterval {
    begin: i64,
    end: i64,
    seed_idx: usize,
}

impl ShadowInterval {
    fn left_of(seed: &Seed, query_len: u64) -> Self {
        ShadowInterval {
            begin: seed.q_start as i64,
            end: (seed.r_end() + query_len) as i64,
            seed_idx: usize::MAX,
        }
    }

    fn right_of(seed: &Seed, ref_len: u64) -> Self {
        ShadowInterval {
            begin: seed.r_start as i64,
            end: (seed.q_end() + ref_len) as i64,
            seed_idx: usize::MAX,
        }
    }
}

pub struct Harmonizer<'a> {
    params: &'a AlignParams,
}

impl<'a> Harmonizer<'a> {
    pub fn new(params: &'a AlignParams) -> Self {
        Harmonizer { params }
    }

    /// Reduce one strip to at most one consistent chain. `None` means
    /// the strip died (no seeds survived or the score floor was not
    /// reached); the caller simply tries the next strip.
    pub fn harmonize(&self, strip: Seeds, query_len: u64, ref_len: u64) -> Option<Seeds> {
        if strip.is_empty() {
            return None;
        }
        let mut seeds = strip;
        seeds.sort_by_q_pos();
        seeds.lump();

        // Stage A: one sweep per strip border.
        let shadows: Vec<ShadowInterval> = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| ShadowInterval {
                seed_idx: i,
                ..ShadowInterval::left_of(s, query_len)
            })
            .collect();
        let alive = linesweep(shadows, seeds.len());
        let seeds: Seeds = seeds
            .into_iter()
            .enumerate()
            .filter_map(|(i, s)| alive[i].then_some(s))
            .collect();

        let shadows: Vec<ShadowInterval> = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| ShadowInterval {
                seed_idx: i,
                ..ShadowInterval::right_of(s, ref_len)
            })
            .collect();
        let alive = linesweep(shadows, seeds.len());
        let mut seeds: Seeds = seeds
            .into_iter()
            .enumerate()
            .filter_map(|(i, s)| alive[i].then_some(s))
            .collect();

        // Stage B: RANSAC trend filter.
        if self.params.do_ransac {
            self.ransac_filter(&mut seeds, query_len);
        }

        // Stage C: gap-cost cut.
        seeds.sort_by_q_pos();
        if self.params.do_gap_cost_cut {
            self.gap_cost_cut(&mut seeds);
        }

        // Stage D: cluster split.
        let mut seeds = self.split_clusters(seeds, query_len);

        // Stage E: score floor.
        let floor = (self.params.harm_score_min as f64)
            .max(self.params.harm_score_min_rel * query_len as f64);
        if (seeds.score() as f64) < floor {
            return None;
        }
        if seeds.is_empty() {
            return None;
        }
        seeds.sort_by_q_pos();
        seeds.consistent = true;
        Some(seeds)
    }

    /// Deviation of a seed from the line given by angle and intercept,
    /// measured perpendicular to the line in the rotated frame.
    fn delta_distance(seed: &Seed, angle: f64, intercept: f64) -> f64 {
        let q = seed.q_start as f64;
        let r = seed.r_start as f64;
        let y = r + q / (PI / 2.0 - angle).tan();
        let x = (y - intercept) * angle.sin();
        let x1 = q / (PI / 2.0 - angle).sin();
        (x - x1).abs()
    }

    /// Fit a trend line through the seed centers: sample seed pairs with
    /// a seeded generator, keep the angle and intercept with the most
    /// inliers. Degenerate inputs yield `None` and no filtering.
    fn ransac(&self, seeds: &Seeds, query_len: u64) -> Option<(f64, f64)> {
        let n = seeds.len();
        if n < 2 {
            return None;
        }
        let bound = self.inlier_bound(query_len);
        let mut rng = StdRng::seed_from_u64(n as u64 ^ (query_len << 17));
        let center = |s: &Seed| {
            (
                s.q_start as f64 + s.len as f64 / 2.0,
                s.r_start as f64 + s.len as f64 / 2.0,
            )
        };
        let mut best: Option<(usize, f64, f64)> = None;
        for _ in 0..32 {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            if a == b {
                continue;
            }
            let (qa, ra) = center(&seeds[a]);
            let (qb, rb) = center(&seeds[b]);
            let (dq, dr) = (qb - qa, rb - ra);
            let angle = dr.atan2(dq);
            // Near-degenerate lines cannot carry a monotone chain.
            if !(0.01..PI / 2.0 - 0.01).contains(&angle) {
                continue;
            }
            let intercept = ra - qa / angle.tan();
            let inliers = seeds
                .iter()
                .filter(|s| Self::delta_distance(s, angle, intercept) <= bound)
                .count();
            if best.map_or(true, |(count, _, _)| inliers > count) {
                best = Some((inliers, angle, intercept));
            }
        }
        best.map(|(_, angle, intercept)| (angle, intercept))
    }

    fn inlier_bound(&self, query_len: u64) -> f64 {
        (self.params.min_delta_dist as f64).max(self.params.max_delta_dist * query_len as f64)
    }

    fn ransac_filter(&self, seeds: &mut Seeds, query_len: u64) {
        let Some((angle, intercept)) = self.ransac(seeds, query_len) else {
            return;
        };
        let bound = self.inlier_bound(query_len);
        let kept: Seeds = seeds
            .iter()
            .filter(|s| Self::delta_distance(s, angle, intercept) <= bound)
            .copied()
            .collect();
        // A fit that would erase the strip is no fit.
        if !kept.is_empty() {
            *seeds = kept;
        }
    }

    /// Penalty estimate for chaining two consecutive seeds.
    fn gap_penalty(&self, prev: &Seed, curr: &Seed) -> i64 {
        let dq = curr.q_start.saturating_sub(prev.q_end());
        let dr = curr.r_start.saturating_sub(prev.r_end());
        let skew = dq.abs_diff(dr);
        let indel = self.params.gap_cost(skew);
        if self.params.optimistic_gap_estimation {
            // Lower bound: everything besides the unavoidable indel
            // could be matches.
            indel
        } else {
            // Assume an even match/mismatch mixture across the gap.
            indel + dq.min(dr) as i64 * self.params.match_score as i64 / 2
        }
    }

    /// Truncate the chain at the first prefix whose running score falls
    /// too far below its maximum, even if later seeds would recover.
    /// Seed values enter in score units so they weigh against the gap
    /// penalties. Expects seeds sorted by query position.
    fn gap_cost_cut(&self, seeds: &mut Seeds) {
        if seeds.len() < 2 {
            return;
        }
        let mut score = 0i64;
        let mut max_score = 0i64;
        let mut max_idx = 0usize;
        for i in 0..seeds.len() {
            if i > 0 {
                score -= self.gap_penalty(&seeds[i - 1], &seeds[i]);
            }
            score += seeds[i].value() as i64 * self.params.match_score as i64;
            if score > max_score {
                max_score = score;
                max_idx = i;
            } else if (score as f64) < max_score as f64 * (1.0 - self.params.score_tolerance) {
                seeds.truncate(max_idx + 1);
                return;
            }
        }
    }

    /// Split on large delta jumps and keep the best-scoring cluster,
    /// unless the seeds already cover most of the query.
    fn split_clusters(&self, seeds: Seeds, query_len: u64) -> Seeds {
        if seeds.len() < 2 {
            return seeds;
        }
        if let Some((lo, hi)) = seeds.query_extent() {
            if (hi - lo) as f64 >= self.params.min_query_coverage * query_len as f64 {
                return seeds;
            }
        }
        let all: Vec<Seed> = seeds.into_iter().collect();
        let mut clusters: Vec<Vec<Seed>> = vec![vec![all[0]]];
        for pair in all.windows(2) {
            let jump = pair[0].delta().abs_diff(pair[1].delta());
            if jump > self.params.max_delta_distance_in_cluster {
                clusters.push(Vec::new());
            }
            clusters.last_mut().unwrap().push(pair[1]);
        }
        let best = clusters
            .into_iter()
            .max_by_key(|c| c.iter().map(Seed::value).sum::<u64>())
            .unwrap();
        Seeds::from_vec(best)
    }
}

/// The line sweep: intervals arrive sorted by begin (longer first on
/// ties); a balanced tree ordered by end holds the open intervals. An
/// interval nested inside an open one marks its seed contradictory, and
/// vice versa. Returns the per-seed survival mask.
fn linesweep(mut shadows: Vec<ShadowInterval>, num_seeds: usize) -> Vec<bool> {
    let mut alive = vec![true; num_seeds];
    shadows.sort_by(|a, b| a.begin.cmp(&b.begin).then(b.end.cmp(&a.end)));

    // Key: (end, insertion tag) so equal ends stay distinct.
    let mut open: BTreeMap<(i64, usize), ShadowInterval> = BTreeMap::new();
    for (tag, shadow) in shadows.into_iter().enumerate() {
        while let Some((&key, _)) = open.first_key_value() {
            if key.0 <= shadow.begin {
                open.pop_first();
            } else {
                break;
            }
        }
        // The open interval with the smallest end not below ours; all
        // open intervals start at or before us, so containment only
        // needs the end comparison.
        if let Some((_, successor)) = open.range((shadow.end, 0)..).next() {
            if successor.begin <= shadow.begin {
                alive[shadow.seed_idx] = false;
            }
        }
        if let Some((_, predecessor)) = open.range(..(shadow.end, usize::MAX)).next_back() {
            if predecessor.begin >= shadow.begin && predecessor.end <= shadow.end {
                alive[predecessor.seed_idx] = false;
            }
        }
        open.insert((shadow.end, tag), shadow);
    }
    alive
}
