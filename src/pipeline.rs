//! Per-query pipeline driver.
//!
//! One query runs seeding, strip building, the harmonize-and-extend
//! loop, and mapping-quality assignment, all against a shared read-only
//! pack and FM-index. Batches fan the per-query flow out over a rayon
//! pool; workers share nothing mutable, diagnostics are merged into one
//! mutex-guarded counter block once per query.

use crate::alignment::Alignment;
use crate::extension::DpExtender;
use crate::fm_index::FmIndexQuery;
use crate::harmonization::Harmonizer;
use crate::mapq;
use crate::nucseq::NucSeq;
use crate::pack::Pack;
use crate::params::AlignParams;
use crate::seeding::BinarySeeder;
use crate::soc::StripOfConsiderationBuilder;
use anyhow::Result;
use rayon::prelude::*;
use std::path::Path;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative cancellation handle, checked between strips.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Aggregate diagnostics across queries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub queries: u64,
    pub queries_failed: u64,
    pub queries_cancelled: u64,
    pub segments_dropped_ambiguity: u64,
    pub strips_harmonized: u64,
    pub chains_extended: u64,
    pub alignments_emitted: u64,
}

impl PipelineStats {
    fn merge(&mut self, other: &PipelineStats) {
        self.queries += other.queries;
        self.queries_failed += other.queries_failed;
        self.queries_cancelled += other.queries_cancelled;
        self.segments_dropped_ambiguity += other.segments_dropped_ambiguity;
        self.strips_harmonized += other.strips_harmonized;
        self.chains_extended += other.chains_extended;
        self.alignments_emitted += other.alignments_emitted;
    }
}

/// The wired pipeline. Pack and index are shared read-only; everything
/// else is per-query state.
pub struct Aligner<I: FmIndexQuery> {
    pack: Arc<Pack>,
    index: Arc<I>,
    params: AlignParams,
    stats: Mutex<PipelineStats>,
}

impl<I: FmIndexQuery + Sync + Send> Aligner<I> {
    pub fn new(pack: Arc<Pack>, index: Arc<I>, params: AlignParams) -> Self {
        Aligner {
            pack,
            index,
            params,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    pub fn params(&self) -> &AlignParams {
        &self.params
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().unwrap().clone()
    }

    /// Align one query end to end.
    pub fn align_query(&self, query: &NucSeq) -> Result<Vec<Alignment>> {
        self.align_query_cancellable(query, &CancelFlag::new())
    }

    /// Align the two mates of a pair independently. No rescoring or
    /// rescue happens between the mates; downstream pairing logic is
    /// the caller's business.
    pub fn align_pair(
        &self,
        first: &NucSeq,
        second: &NucSeq,
    ) -> Result<(Vec<Alignment>, Vec<Alignment>)> {
        Ok((self.align_query(first)?, self.align_query(second)?))
    }

    /// Align one query, giving up between strips once `cancel` is set.
    /// Alignments finished before the cancellation are returned.
    pub fn align_query_cancellable(
        &self,
        query: &NucSeq,
        cancel: &CancelFlag,
    ) -> Result<Vec<Alignment>> {
        let mut local = PipelineStats {
            queries: 1,
            ..PipelineStats::default()
        };
        let result = self.run_query(query, cancel, &mut local);
        if result.is_err() {
            local.queries_failed += 1;
        }
        self.stats.lock().unwrap().merge(&local);
        result
    }

    fn run_query(
        &self,
        query: &NucSeq,
        cancel: &CancelFlag,
        stats: &mut PipelineStats,
    ) -> Result<Vec<Alignment>> {
        query.ensure_valid()?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let query_len = query.len() as u64;

        let seeder = BinarySeeder::new(&self.params);
        let (seeds, dropped) = seeder.seeds(self.index.as_ref(), &self.pack, query);
        stats.segments_dropped_ambiguity += dropped;
        if seeds.is_empty() {
            log::debug!("{}: no seeds", query.name);
            return Ok(Vec::new());
        }
        log::debug!("{}: {} seeds", query.name, seeds.len());

        let mut queue = StripOfConsiderationBuilder::new(&self.params, query.len()).build(seeds);
        log::debug!("{}: {} strips", query.name, queue.num_strips());

        let harmonizer = Harmonizer::new(&self.params);
        let extender = DpExtender::new(&self.params);
        let mut alignments: Vec<Alignment> = Vec::new();
        let mut best_harm_score = 0u64;
        let mut recent: VecDeque<u64> = VecDeque::new();
        let mut tries = 0usize;

        while let Some(strip) = queue.pop() {
            if cancel.is_cancelled() {
                log::debug!("{}: cancelled after {} strips", query.name, tries);
                stats.queries_cancelled += 1;
                break;
            }
            tries += 1;
            stats.strips_harmonized += 1;

            let Some(chain) =
                harmonizer.harmonize(strip, query_len, self.pack.len_total())
            else {
                // Strip died in harmonization; try the next one.
                if tries >= self.params.max_tries {
                    break;
                }
                continue;
            };
            let harm_score = chain.score();

            if self.break_extraction(harm_score, best_harm_score, &recent, tries, query.len()) {
                log::debug!(
                    "{}: extraction break after {} strips (score {} vs best {})",
                    query.name,
                    tries,
                    harm_score,
                    best_harm_score
                );
                break;
            }
            best_harm_score = best_harm_score.max(harm_score);
            recent.push_back(harm_score);
            while recent.len() > self.params.max_equal_score_lookahead {
                recent.pop_front();
            }

            if let Some(aln) = extender.align_chain(&chain, query, &self.pack)? {
                stats.chains_extended += 1;
                alignments.push(aln);
            }
            if tries >= self.params.max_tries {
                break;
            }
        }

        mapq::assign(&mut alignments, &self.pack, &self.params);
        stats.alignments_emitted += alignments.len() as u64;
        Ok(alignments)
    }

    /// Break criteria of the strip extraction loop. Short queries use
    /// the equal-score lookahead, long queries the score-drop rule.
    fn break_extraction(
        &self,
        harm_score: u64,
        best: u64,
        recent: &VecDeque<u64>,
        tries: usize,
        query_len: usize,
    ) -> bool {
        if tries <= self.params.min_tries {
            return false;
        }
        if query_len > self.params.switch_q_len {
            // Score-drop rule.
            (harm_score as f64) < best as f64 * (1.0 - self.params.score_tolerance)
        } else {
            // Equal-score lookahead: a run of near-identical scores
            // signals a repeat that more strips will not resolve.
            if recent.len() < self.params.max_equal_score_lookahead {
                return false;
            }
            let tolerance = self.params.score_diff_tolerance * best.max(1) as f64;
            recent
                .iter()
                .all(|&s| (s as f64 - harm_score as f64).abs() <= tolerance)
        }
    }

    /// Align a batch of queries on the rayon pool. Output order is not
    /// deterministic across queries; pair results with the query name.
    /// Failing queries produce an empty record and a logged error.
    pub fn align_batch(
        &self,
        queries: &[NucSeq],
        cancel: &CancelFlag,
    ) -> Vec<(String, Vec<Alignment>)> {
        let run = || {
            queries
                .par_iter()
                .map(|query| {
                    let alignments = match self.align_query_cancellable(query, cancel) {
                        Ok(alignments) => alignments,
                        Err(err) => {
                            log::error!("query {} failed: {:#}", query.name, err);
                            Vec::new()
                        }
                    };
                    (query.name.clone(), alignments)
                })
                .collect()
        };
        if self.params.num_threads == 0 {
            return run();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.num_threads)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(err) => {
                log::warn!("falling back to the global rayon pool: {err}");
                run()
            }
        }
    }
}

impl Aligner<crate::fm_index::FmIndex> {
    /// Load a stored pack and index it.
    pub fn open(prefix: &Path, params: AlignParams) -> Result<Self> {
        let pack = Arc::new(Pack::load(prefix)?);
        let index = Arc::new(crate::fm_index::FmIndex::build(&pack)?);
        Ok(Aligner::new(pack, index, params))
    }
}
