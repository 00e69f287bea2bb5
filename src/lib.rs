//! stripmap: a seed-and-extend DNA read mapper.
//!
//! The pipeline maps one query at a time against a packed reference:
//! SMEM seeding from an FM-index, clustering of seeds into strips of
//! consideration, harmonization of each strip into a consistent chain,
//! and banded dynamic-programming extension of the chain into a scored,
//! CIGAR-bearing alignment with a mapping quality.
//!
//! Reading FASTA/FASTQ and writing SAM are left to the embedding
//! application; the crate consumes [`nucseq::NucSeq`] records and
//! produces [`alignment::Alignment`] values.

pub mod alignment;
pub mod extension;
pub mod fm_index;
pub mod harmonization;
pub mod mapq;
pub mod nucseq;
pub mod pack;
pub mod params;
pub mod pipeline;
pub mod seed;
pub mod seeding;
pub mod soc;

pub use alignment::Alignment;
pub use fm_index::{FmIndex, FmIndexQuery};
pub use nucseq::NucSeq;
pub use pack::Pack;
pub use params::AlignParams;
pub use pipeline::{Aligner, CancelFlag};
