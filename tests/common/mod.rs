// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use logless_pairhmm::{PairHmm, PairHmmParams, Precision};

/// Constant qualities for all positions of a read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Quals {
    pub(crate) base: u8,
    pub(crate) insertion: u8,
    pub(crate) deletion: u8,
    pub(crate) gap_continuation: u8,
}

impl Quals {
    pub(crate) fn all(qual: u8) -> Self {
        Quals {
            base: qual,
            insertion: qual,
            deletion: qual,
            gap_continuation: qual,
        }
    }

    pub(crate) fn new(base: u8, insertion: u8, deletion: u8, gap_continuation: u8) -> Self {
        Quals {
            base,
            insertion,
            deletion,
            gap_continuation,
        }
    }
}

impl Default for Quals {
    fn default() -> Self {
        Quals::new(30, 45, 45, 10)
    }
}

pub(crate) fn pairhmm(precision: Precision) -> PairHmm {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut hmm = PairHmm::new(PairHmmParams {
        precision,
        ..PairHmmParams::default()
    });
    hmm.initialize(128, 128).unwrap();
    hmm
}

/// Likelihood of the read given the haplotype, keeping the cells of the given window
/// `(row_start, col_start, hap_start_offset)` from the previous computation.
pub(crate) fn windowed_likelihood(
    hmm: &mut PairHmm,
    read: &[u8],
    haplotype: &[u8],
    quals: Quals,
    window: (usize, usize, usize),
) -> f64 {
    let n = read.len();
    let (row_start, col_start, hap_start_offset) = window;
    hmm.compute_log10_likelihood(
        row_start,
        col_start,
        haplotype,
        read,
        &vec![quals.insertion; n],
        &vec![quals.deletion; n],
        &vec![quals.gap_continuation; n],
        &vec![quals.base; n],
        hap_start_offset,
    )
    .unwrap()
}

pub(crate) fn likelihood(read: &[u8], haplotype: &[u8], quals: Quals) -> f64 {
    windowed_likelihood(
        &mut pairhmm(Precision::Double),
        read,
        haplotype,
        quals,
        (0, 0, 0),
    )
}
