//! Nucleotide sequences in 3-bit code space.
//!
//! All pipeline stages operate on numeric codes, never on ASCII:
//! A=0, C=1, G=2, T=3, N=4. Reverse complement is `3 - code` for the
//! four proper bases and N stays N.

use anyhow::{bail, Result};
use std::sync::Once;

pub const CODE_A: u8 = 0;
pub const CODE_C: u8 = 1;
pub const CODE_G: u8 = 2;
pub const CODE_T: u8 = 3;
pub const CODE_N: u8 = 4;

/// ASCII to code. Everything that is not a recognized base maps to N.
pub const ASCII_TO_CODE: [u8; 256] = {
    let mut table = [CODE_N; 256];
    table[b'A' as usize] = CODE_A;
    table[b'a' as usize] = CODE_A;
    table[b'C' as usize] = CODE_C;
    table[b'c' as usize] = CODE_C;
    table[b'G' as usize] = CODE_G;
    table[b'g' as usize] = CODE_G;
    table[b'T' as usize] = CODE_T;
    table[b't' as usize] = CODE_T;
    table
};

pub const CODE_TO_ASCII: [u8; 5] = [b'A', b'C', b'G', b'T', b'N'];

#[inline(always)]
pub fn complement(code: u8) -> u8 {
    if code < 4 { 3 - code } else { CODE_N }
}

static UNKNOWN_SYMBOL_WARNING: Once = Once::new();

/// An owned nucleotide sequence with a name and optional per-base quality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NucSeq {
    pub name: String,
    seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

impl NucSeq {
    pub fn new(name: impl Into<String>) -> Self {
        NucSeq {
            name: name.into(),
            seq: Vec::new(),
            qual: None,
        }
    }

    /// Translate an ASCII record into code space. Unrecognized symbols
    /// become N; the first such symbol seen by the process is reported once.
    pub fn from_ascii(name: impl Into<String>, ascii: &[u8]) -> Self {
        let mut seq = Vec::with_capacity(ascii.len());
        for &b in ascii {
            let code = ASCII_TO_CODE[b as usize];
            if code == CODE_N && !matches!(b, b'N' | b'n') {
                UNKNOWN_SYMBOL_WARNING.call_once(|| {
                    log::warn!(
                        "unrecognized input symbol {:?} translated to N (reported once)",
                        b as char
                    );
                });
            }
            seq.push(code);
        }
        NucSeq {
            name: name.into(),
            seq,
            qual: None,
        }
    }

    pub fn from_codes(name: impl Into<String>, codes: Vec<u8>) -> Self {
        NucSeq {
            name: name.into(),
            seq: codes,
            qual: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    #[inline]
    pub fn push(&mut self, code: u8) {
        self.seq.push(code);
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.seq
    }

    pub fn resize(&mut self, len: usize) {
        self.seq.resize(len, CODE_N);
    }

    pub fn clear(&mut self) {
        self.seq.clear();
    }

    /// Every stored symbol must be a valid code. A sequence that fails this
    /// check must not enter the pipeline.
    pub fn ensure_valid(&self) -> Result<()> {
        if let Some(pos) = self.seq.iter().position(|&c| c > CODE_N) {
            log::error!(
                "query {}: invalid symbol code {} at position {}",
                self.name,
                self.seq[pos],
                pos
            );
            bail!(
                "query {} carries invalid symbol code {} at position {}",
                self.name,
                self.seq[pos],
                pos
            );
        }
        Ok(())
    }

    pub fn reverse_complement(&self) -> NucSeq {
        let seq = self.seq.iter().rev().map(|&c| complement(c)).collect();
        NucSeq {
            name: self.name.clone(),
            seq,
            qual: self.qual.as_ref().map(|q| {
                let mut q = q.clone();
                q.reverse();
                q
            }),
        }
    }

    pub fn to_ascii_string(&self) -> String {
        self.seq
            .iter()
            .map(|&c| CODE_TO_ASCII[c.min(CODE_N) as usize] as char)
            .collect()
    }
}

impl std::ops::Index<usize> for NucSeq {
    type Output = u8;

    #[inline]
    fn index(&self, i: usize) -> &u8 {
        &self.seq[i]
    }
}

impl std::ops::IndexMut<usize> for NucSeq {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut u8 {
        &mut self.seq[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_translation_table() {
        assert_eq!(ASCII_TO_CODE[b'A' as usize], 0);
        assert_eq!(ASCII_TO_CODE[b'c' as usize], 1);
        assert_eq!(ASCII_TO_CODE[b'G' as usize], 2);
        assert_eq!(ASCII_TO_CODE[b't' as usize], 3);
        assert_eq!(ASCII_TO_CODE[b'N' as usize], 4);
        assert_eq!(ASCII_TO_CODE[b'.' as usize], 4);
        assert_eq!(ASCII_TO_CODE[b'R' as usize], 4);
    }

    #[test]
    fn complement_maps_bases_and_keeps_n() {
        assert_eq!(complement(CODE_A), CODE_T);
        assert_eq!(complement(CODE_C), CODE_G);
        assert_eq!(complement(CODE_G), CODE_C);
        assert_eq!(complement(CODE_T), CODE_A);
        assert_eq!(complement(CODE_N), CODE_N);
    }

    #[test]
    fn reverse_complement_round_trip() {
        let s = NucSeq::from_ascii("q", b"ACGTNACC");
        let rc = s.reverse_complement();
        assert_eq!(rc.to_ascii_string(), "GGTNACGT");
        assert_eq!(rc.reverse_complement().to_ascii_string(), "ACGTNACC");
    }

    #[test]
    fn ensure_valid_rejects_out_of_range_codes() {
        let good = NucSeq::from_codes("q", vec![0, 1, 2, 3, 4]);
        assert!(good.ensure_valid().is_ok());
        let bad = NucSeq::from_codes("q", vec![0, 1, 7]);
        assert!(bad.ensure_valid().is_err());
    }
}
