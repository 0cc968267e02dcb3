// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Logless pair HMM computing the probability of a read given a haplotype.
//!
//! A `PairHmm` is a per-worker computation context owning the transition table and the DP
//! lanes. The lanes are allocated explicitly with `initialize` and reused for all pairs of
//! equal or smaller size. Consecutive haplotypes of equal length evaluated against the same
//! read only recompute the columns after their first difference.

pub mod forward;
pub mod matrix;
pub mod quality;
pub mod read;
pub mod transitions;

use anyhow::Result;

use crate::constants::MIN_ACCEPTED_SINGLE_PRECISION;
use crate::errors::{self, Error};
use crate::params::{PairHmmParams, Precision};

pub use forward::{ForwardEngine, ForwardOutcome, LoglessFloat, MatchEmission, Window};
pub use read::Read;
pub use transitions::{Transition, TransitionModel};

pub struct PairHmm {
    params: PairHmmParams,
    transitions: TransitionModel,
    emission: MatchEmission,
    double: ForwardEngine<f64>,
    single: Option<ForwardEngine<f32>>,
}

impl PairHmm {
    pub fn new(params: PairHmmParams) -> Self {
        let single = match params.precision {
            Precision::Double => None,
            Precision::SingleWithFallback => Some(ForwardEngine::new()),
        };
        PairHmm {
            emission: MatchEmission::new(params.tristate_correction),
            params,
            transitions: TransitionModel::new(),
            double: ForwardEngine::new(),
            single,
        }
    }

    pub fn params(&self) -> &PairHmmParams {
        &self.params
    }

    /// Allocate the DP lanes for reads up to `max_read_len` and haplotypes up to
    /// `max_haplotype_len`.
    pub fn initialize(&mut self, max_read_len: usize, max_haplotype_len: usize) -> Result<()> {
        let limit = self.params.max_matrix_bytes;
        let double_bytes = matrix::DpMatrix::<f64>::required_bytes(max_read_len, max_haplotype_len);
        let single_bytes = if self.single.is_some() {
            matrix::DpMatrix::<f32>::required_bytes(max_read_len, max_haplotype_len)
        } else {
            Some(0)
        };
        let total = double_bytes
            .and_then(|double| single_bytes.and_then(|single| double.checked_add(single)));
        match total {
            Some(bytes) if bytes <= limit => (),
            _ => Err(Error::AllocationError {
                max_read_len,
                max_haplotype_len,
                bytes: total.unwrap_or(usize::MAX),
                limit,
            })?,
        }

        self.double
            .initialize(max_read_len, max_haplotype_len, limit)?;
        if let Some(single) = self.single.as_mut() {
            single.initialize(max_read_len, max_haplotype_len, limit)?;
        }
        Ok(())
    }

    /// Make sure that a read of `read_len` against haplotypes of up to `haplotype_len` fits,
    /// reallocating larger lanes otherwise.
    pub fn ensure_capacity(&mut self, read_len: usize, haplotype_len: usize) -> Result<()> {
        let matrix = self.double.matrix();
        if !matrix.fits(read_len, haplotype_len) {
            let max_read_len = read_len.max(matrix.max_read_len());
            let max_haplotype_len = haplotype_len.max(matrix.max_haplotype_len());
            debug!(
                "growing pair HMM lanes to {} x {}",
                max_read_len, max_haplotype_len
            );
            self.initialize(max_read_len, max_haplotype_len)?;
        }
        Ok(())
    }

    /// Populate the transition table for the next computations on a read.
    pub fn build_transition_model(
        &mut self,
        insertion_quals: &[u8],
        deletion_quals: &[u8],
        gap_continuation_quals: &[u8],
    ) -> Result<()> {
        self.transitions
            .build(insertion_quals, deletion_quals, gap_continuation_quals)
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    /// Diagnostics of the current transition table. Non-empty means the current read
    /// should be flagged for exclusion by the caller.
    pub fn inconsistencies(&self) -> &[Error] {
        self.transitions.inconsistencies()
    }

    /// Seed boundaries and emission priors for the given pair and run the forward recurrence
    /// over the cells outside of the kept window, using the current transition table.
    /// Returns the log10 likelihood of the read given the haplotype.
    pub fn seed_priors_and_boundaries(
        &mut self,
        is_new: bool,
        row_start: usize,
        col_start: usize,
        haplotype: &[u8],
        read_bases: &[u8],
        read_quals: &[u8],
        hap_start_offset: usize,
    ) -> Result<f64> {
        let window = Window::new(row_start, col_start, hap_start_offset);

        if let Some(single) = self.single.as_mut() {
            let outcome = single.compute(
                is_new,
                &window,
                haplotype,
                read_bases,
                read_quals,
                &self.transitions,
                &self.emission,
            )?;
            if outcome.scaled_sum >= MIN_ACCEPTED_SINGLE_PRECISION {
                return Ok(outcome.log10_likelihood);
            }
            debug!(
                "single precision sum {:e} below {:e}, recomputing in double precision",
                outcome.scaled_sum, MIN_ACCEPTED_SINGLE_PRECISION
            );
        }

        let outcome = self.double.compute(
            is_new,
            &window,
            haplotype,
            read_bases,
            read_quals,
            &self.transitions,
            &self.emission,
        )?;
        Ok(outcome.log10_likelihood)
    }

    /// Compute the log10 likelihood of the read given the haplotype.
    ///
    /// A zero window (`row_start`, `col_start` and `hap_start_offset` all zero) computes from
    /// scratch. Otherwise the cells inside the window are taken from the previous computation,
    /// which must have been for a read and haplotype of the same lengths sharing the
    /// respective prefixes.
    pub fn compute_log10_likelihood(
        &mut self,
        row_start: usize,
        col_start: usize,
        haplotype: &[u8],
        read_bases: &[u8],
        insertion_quals: &[u8],
        deletion_quals: &[u8],
        gap_continuation_quals: &[u8],
        base_quals: &[u8],
        hap_start_offset: usize,
    ) -> Result<f64> {
        let read_len = read_bases.len();
        if base_quals.len() != read_len {
            Err(errors::dimension_mismatch(
                "base qualities",
                read_len,
                base_quals.len(),
            ))?;
        }
        if insertion_quals.len() != read_len {
            Err(errors::dimension_mismatch(
                "insertion qualities",
                read_len,
                insertion_quals.len(),
            ))?;
        }
        self.build_transition_model(insertion_quals, deletion_quals, gap_continuation_quals)?;

        let is_new = Window::new(row_start, col_start, hap_start_offset).is_full();
        self.seed_priors_and_boundaries(
            is_new,
            row_start,
            col_start,
            haplotype,
            read_bases,
            base_quals,
            hap_start_offset,
        )
    }

    /// Log10 likelihoods of the read given each of the haplotypes.
    ///
    /// The transition table is built once. For each haplotype of the same length as its
    /// predecessor, only the columns after the first differing position are recomputed.
    /// The lanes are not grown: pairs exceeding the allocation fail with `Uninitialized`.
    pub fn compute_read_likelihoods<H: AsRef<[u8]>>(
        &mut self,
        read: &Read,
        haplotypes: &[H],
    ) -> Result<Vec<f64>> {
        self.build_transition_model(
            read.insertion_quals(),
            read.deletion_quals(),
            read.gap_continuation_quals(),
        )?;

        let mut previous: Option<&[u8]> = None;
        let mut likelihoods = Vec::with_capacity(haplotypes.len());
        for haplotype in haplotypes {
            let haplotype = haplotype.as_ref();
            let hap_start_offset = match previous {
                Some(previous) if previous.len() == haplotype.len() => {
                    first_position_where_haplotypes_differ(previous, haplotype)
                }
                _ => 0,
            };
            likelihoods.push(self.seed_priors_and_boundaries(
                previous.is_none(),
                0,
                0,
                haplotype,
                read.bases(),
                read.base_quals(),
                hap_start_offset,
            )?);
            previous = Some(haplotype);
        }

        Ok(likelihoods)
    }
}

/// Index of the first position where the haplotypes differ, or the length of the shorter
/// one if it is a prefix of the other.
pub fn first_position_where_haplotypes_differ(first: &[u8], second: &[u8]) -> usize {
    first
        .iter()
        .zip(second)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| first.len().min(second.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmm(precision: Precision) -> PairHmm {
        let mut hmm = PairHmm::new(PairHmmParams {
            precision,
            ..PairHmmParams::default()
        });
        hmm.initialize(128, 128).unwrap();
        hmm
    }

    fn compute(hmm: &mut PairHmm, read: &[u8], haplotype: &[u8], offset: usize) -> f64 {
        let n = read.len();
        hmm.compute_log10_likelihood(
            0,
            0,
            haplotype,
            read,
            &vec![45; n],
            &vec![45; n],
            &vec![10; n],
            &vec![30; n],
            offset,
        )
        .unwrap()
    }

    #[test]
    fn test_first_position_where_haplotypes_differ() {
        assert_eq!(first_position_where_haplotypes_differ(b"ACGT", b"ACTT"), 2);
        assert_eq!(first_position_where_haplotypes_differ(b"ACGT", b"ACGT"), 4);
        assert_eq!(first_position_where_haplotypes_differ(b"ACG", b"ACGTT"), 3);
        assert_eq!(first_position_where_haplotypes_differ(b"TACG", b"ACGT"), 0);
        assert_eq!(first_position_where_haplotypes_differ(b"", b"ACGT"), 0);
    }

    #[test]
    fn test_mismatch_with_default_quals() {
        let mut hmm = hmm(Precision::Double);
        assert_relative_eq!(
            compute(&mut hmm, b"ACGT", b"ACGG", 0),
            -4.08282185133271,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_without_tristate_correction() {
        let mut hmm = PairHmm::new(PairHmmParams {
            tristate_correction: false,
            ..PairHmmParams::default()
        });
        hmm.initialize(8, 8).unwrap();
        assert_relative_eq!(
            compute(&mut hmm, b"ACGT", b"ACGG", 0),
            -3.634203976834044,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let mut hmm = hmm(Precision::Double);
        let first = compute(&mut hmm, b"ACGTTGCATG", b"GGACGTTGCTTGCC", 0);
        compute(&mut hmm, b"TTTT", b"GGGG", 0);
        let second = compute(&mut hmm, b"ACGTTGCATG", b"GGACGTTGCTTGCC", 0);
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_uninitialized() {
        let mut hmm = PairHmm::new(PairHmmParams::default());
        let err = hmm
            .compute_log10_likelihood(0, 0, b"A", b"A", &[45], &[45], &[10], &[30], 0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Uninitialized { .. })
        ));
    }

    #[test]
    fn test_read_larger_than_allocation() {
        let mut hmm = PairHmm::new(PairHmmParams::default());
        hmm.initialize(2, 8).unwrap();
        let n = 3;
        let err = hmm
            .compute_log10_likelihood(
                0,
                0,
                b"ACGT",
                b"ACG",
                &vec![45; n],
                &vec![45; n],
                &vec![10; n],
                &vec![30; n],
                0,
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Uninitialized { .. })
        ));
    }

    #[test]
    fn test_quality_length_mismatch() {
        let mut hmm = hmm(Precision::Double);
        let err = hmm
            .compute_log10_likelihood(0, 0, b"ACGT", b"ACG", &[45; 3], &[45; 3], &[10; 3], &[30; 2], 0)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::DimensionMismatch {
                what: "base qualities",
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_haplotype_shorter_than_window() {
        let mut hmm = hmm(Precision::Double);
        let err = hmm
            .compute_log10_likelihood(0, 5, b"ACGT", b"ACG", &[45; 3], &[45; 3], &[10; 3], &[30; 3], 0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_allocation_limit() {
        let mut hmm = PairHmm::new(PairHmmParams {
            max_matrix_bytes: 1000,
            ..PairHmmParams::default()
        });
        let err = hmm.initialize(100, 100).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AllocationError { .. })
        ));
    }

    #[test]
    fn test_ensure_capacity_grows() {
        let mut hmm = hmm(Precision::Double);
        hmm.ensure_capacity(200, 10).unwrap();
        assert_eq!(hmm.double.matrix().max_read_len(), 200);
        assert_eq!(hmm.double.matrix().max_haplotype_len(), 128);
    }

    #[test]
    fn test_read_likelihoods_do_not_grow_lanes() {
        let params = PairHmmParams::default();
        let read = Read::with_default_indel_quals(b"ACGT".to_vec(), vec![30; 4], &params).unwrap();
        let mut hmm = PairHmm::new(params);
        hmm.initialize(4, 3).unwrap();
        let err = hmm
            .compute_read_likelihoods(&read, &[&b"ACG"[..], &b"ACGT"[..]])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Uninitialized { .. })
        ));
        assert_eq!(hmm.double.matrix().max_haplotype_len(), 3);
    }

    #[test]
    fn test_window_after_other_read() {
        for &precision in &[Precision::Double, Precision::SingleWithFallback] {
            let mut resumed = hmm(precision);
            compute(&mut resumed, b"ACGTTGCATG", b"GGACGTTGCATGCC", 0);
            let other = |hmm: &mut PairHmm, offset| {
                hmm.compute_log10_likelihood(
                    0,
                    0,
                    b"GGACGTTGCTTGCC",
                    b"TTTTTTTTTT",
                    &[30; 10],
                    &[30; 10],
                    &[10; 10],
                    &[20; 10],
                    offset,
                )
                .unwrap()
            };
            let resumed = other(&mut resumed, 9);
            let scratch = other(&mut hmm(precision), 0);
            assert_eq!(resumed, scratch);
        }
    }

    #[test]
    fn test_model_inconsistency_does_not_abort() {
        let mut hmm = hmm(Precision::Double);
        let likelihood = hmm
            .compute_log10_likelihood(0, 0, b"ACGT", b"ACGT", &[0; 4], &[2; 4], &[10; 4], &[30; 4], 0)
            .unwrap();
        assert!(likelihood.is_finite());
        assert_eq!(hmm.inconsistencies().len(), 4);
    }

    #[test]
    fn test_single_precision_fallback() {
        let read = vec![b'A'; 100];
        let haplotype = vec![b'C'; 100];
        let mut double = hmm(Precision::Double);
        let mut fallback = hmm(Precision::SingleWithFallback);
        let expected = compute(&mut double, &read, &haplotype, 0);
        // far below what single precision lanes can represent
        assert_relative_eq!(expected, -106.0201113580228, epsilon = 1e-6);
        assert_eq!(compute(&mut fallback, &read, &haplotype, 0), expected);

        let expected = compute(&mut double, b"ACGTTGCA", b"TTACGTTGCATT", 0);
        assert_relative_eq!(
            compute(&mut fallback, b"ACGTTGCA", b"TTACGTTGCATT", 0),
            expected,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_read_likelihoods_with_prefix_caching() {
        let params = PairHmmParams::default();
        let read =
            Read::with_default_indel_quals(b"ACGTTGCATG".to_vec(), vec![30; 10], &params).unwrap();
        let haplotypes: Vec<&[u8]> = vec![
            &b"GGACGTTGCATGCC"[..],
            &b"GGACGTTGCTTGCC"[..],
            &b"GGACGTTGCTTGCA"[..],
            &b"GGACGTTGCTTGCA"[..],
            &b"ACGTTGCATG"[..],
            &b"GGACGTAGCTTGCA"[..],
        ];
        let mut cached = hmm(Precision::Double);
        let likelihoods = cached.compute_read_likelihoods(&read, &haplotypes).unwrap();

        for (haplotype, likelihood) in haplotypes.iter().zip(&likelihoods) {
            let mut scratch = hmm(Precision::Double);
            assert_eq!(compute(&mut scratch, b"ACGTTGCATG", haplotype, 0), *likelihood);
        }
        assert_eq!(likelihoods[2], likelihoods[3]);
    }
}
