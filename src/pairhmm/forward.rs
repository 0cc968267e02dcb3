// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Forward recurrence of the logless pair HMM.
//!
//! All lanes are computed in probability space. Underflow is avoided by scaling the leading
//! deletion mass with a large power of two (`LoglessFloat::initial_condition`) and by
//! flooring every cell at the smallest positive normal value of the lane type. The only
//! logarithm is taken on the final sum.

use std::fmt::Debug;

use anyhow::Result;
use num_traits::Float;

use crate::constants::{TRISTATE_CORRECTION, UNKNOWN_BASE};
use crate::errors;
use crate::pairhmm::matrix::DpMatrix;
use crate::pairhmm::quality::QUALITY_TABLE;
use crate::pairhmm::transitions::TransitionModel;

/// Floating point type the DP lanes are computed in.
pub trait LoglessFloat: Float + Debug + Send + Sync + 'static {
    /// Scaling of the leading deletion mass.
    fn initial_condition() -> Self;

    /// Lower bound for every computed lane value.
    fn min_lane_value() -> Self;

    fn from_prob(value: f64) -> Self;

    fn into_f64(self) -> f64;

    fn initial_condition_log10() -> f64 {
        Self::initial_condition().into_f64().log10()
    }
}

impl LoglessFloat for f64 {
    #[inline]
    fn initial_condition() -> Self {
        2f64.powi(1020)
    }

    #[inline]
    fn min_lane_value() -> Self {
        f64::MIN_POSITIVE
    }

    #[inline]
    fn from_prob(value: f64) -> Self {
        value
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}

impl LoglessFloat for f32 {
    #[inline]
    fn initial_condition() -> Self {
        2f32.powi(120)
    }

    #[inline]
    fn min_lane_value() -> Self {
        f32::MIN_POSITIVE
    }

    #[inline]
    fn from_prob(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

/// Match emission priors, evaluated lazily per cell from the read base quality.
#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct MatchEmission {
    tristate_correction: bool,
}

impl MatchEmission {
    /// Probabilities of emitting a matching and a mismatching base at the given quality.
    #[inline]
    pub fn priors(&self, base_qual: u8) -> (f64, f64) {
        let prob_miscall = QUALITY_TABLE.prob_error(base_qual);
        let prob_mismatch = if self.tristate_correction {
            prob_miscall / TRISTATE_CORRECTION
        } else {
            prob_miscall
        };
        (QUALITY_TABLE.prob_no_error(base_qual), prob_mismatch)
    }
}

#[inline]
fn is_match(read_base: u8, haplotype_base: u8) -> bool {
    read_base == haplotype_base || read_base == UNKNOWN_BASE || haplotype_base == UNKNOWN_BASE
}

/// Part of the DP matrix that has to be recomputed.
///
/// `row_start` and `col_start` are the lengths of read and haplotype prefixes that are
/// unchanged since the last computation; cells inside both prefixes are kept.
/// `hap_start_offset` is the length of the haplotype prefix shared with the previous
/// haplotype for the same read; columns inside it are kept in every row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, new)]
pub struct Window {
    pub row_start: usize,
    pub col_start: usize,
    pub hap_start_offset: usize,
}

impl Window {
    /// The window recomputing every cell.
    pub fn full() -> Self {
        Window::default()
    }

    pub fn is_full(&self) -> bool {
        self.col_start == 0 && self.hap_start_offset == 0
    }

    /// Number of leading columns kept in the given row.
    #[inline]
    pub fn kept_columns(&self, row: usize) -> usize {
        if row <= self.row_start {
            self.col_start.max(self.hap_start_offset)
        } else {
            self.hap_start_offset
        }
    }

    pub fn validate(&self, read_len: usize, haplotype_len: usize) -> Result<()> {
        if self.row_start > read_len {
            Err(errors::dimension_mismatch(
                "read shorter than resumption row",
                self.row_start,
                read_len,
            ))?;
        }
        let col_start = self.col_start.max(self.hap_start_offset);
        if col_start > haplotype_len {
            Err(errors::dimension_mismatch(
                "haplotype shorter than resumption column",
                col_start,
                haplotype_len,
            ))?;
        }
        Ok(())
    }
}

/// Result of a forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardOutcome {
    /// Sum over the final row of match and insertion lane, still carrying the initial condition.
    pub scaled_sum: f64,
    pub log10_likelihood: f64,
}

/// Forward recurrence over DP lanes of type `T`, owned by one worker.
#[derive(Debug, Getters)]
pub struct ForwardEngine<T> {
    #[getset(get = "pub")]
    matrix: DpMatrix<T>,
}

impl<T: LoglessFloat> Default for ForwardEngine<T> {
    fn default() -> Self {
        ForwardEngine {
            matrix: DpMatrix::new(),
        }
    }
}

impl<T: LoglessFloat> ForwardEngine<T> {
    pub fn new() -> Self {
        ForwardEngine::default()
    }

    pub fn initialize(
        &mut self,
        max_read_len: usize,
        max_haplotype_len: usize,
        max_bytes: usize,
    ) -> Result<()> {
        self.matrix
            .initialize(max_read_len, max_haplotype_len, max_bytes)
    }

    /// Seed the boundaries and run the recurrence over the cells outside of the kept window.
    ///
    /// If `is_new` is set the window is ignored and all cells are recomputed. Otherwise the
    /// window is restricted to the cells the lanes share with the given pair, see
    /// `DpMatrix::reusable_window`.
    pub fn compute(
        &mut self,
        is_new: bool,
        window: &Window,
        haplotype: &[u8],
        read_bases: &[u8],
        read_quals: &[u8],
        transitions: &TransitionModel,
        emission: &MatchEmission,
    ) -> Result<ForwardOutcome> {
        let read_len = read_bases.len();
        let haplotype_len = haplotype.len();
        if read_quals.len() != read_len {
            Err(errors::dimension_mismatch(
                "base qualities",
                read_len,
                read_quals.len(),
            ))?;
        }
        if transitions.len() != read_len {
            Err(errors::dimension_mismatch(
                "transition model",
                read_len,
                transitions.len(),
            ))?;
        }
        window.validate(read_len, haplotype_len)?;
        self.matrix.ensure_capacity(read_len, haplotype_len)?;

        let window = if is_new || window.is_full() {
            Window::full()
        } else {
            let reusable = self.matrix.reusable_window(
                window,
                read_bases,
                read_quals,
                transitions.rows(),
                haplotype,
                emission,
            );
            if reusable != *window {
                debug!(
                    "lanes hold a different pair, keeping {:?} instead of {:?}",
                    reusable, window
                );
            }
            reusable
        };
        let resume = !window.is_full();

        self.matrix.invalidate();
        self.matrix
            .seed_boundaries(read_len, haplotype_len, !resume);

        if read_len == 0 {
            self.matrix
                .mark_valid(read_bases, read_quals, transitions.rows(), haplotype, emission);
            return Ok(ForwardOutcome {
                scaled_sum: T::initial_condition().into_f64(),
                log10_likelihood: 0.0,
            });
        }

        for i in 1..=read_len {
            self.update_row(
                i,
                window.kept_columns(i) + 1,
                haplotype,
                read_bases[i - 1].to_ascii_uppercase(),
                read_quals[i - 1],
                transitions,
                emission,
            );
        }

        let scaled_sum = self.final_sum(read_len, haplotype_len);
        self.matrix
            .mark_valid(read_bases, read_quals, transitions.rows(), haplotype, emission);

        Ok(ForwardOutcome {
            scaled_sum,
            log10_likelihood: scaled_sum.log10() - T::initial_condition_log10(),
        })
    }

    /// Update the cells `first_col..=M` of row `i`.
    #[inline]
    fn update_row(
        &mut self,
        i: usize,
        first_col: usize,
        haplotype: &[u8],
        read_base: u8,
        base_qual: u8,
        transitions: &TransitionModel,
        emission: &MatchEmission,
    ) {
        let t = transitions.get(i - 1);
        let match_to_match = T::from_prob(t.match_to_match);
        let match_to_insertion = T::from_prob(t.match_to_insertion);
        let match_to_deletion = T::from_prob(t.match_to_deletion);
        let insertion_to_insertion = T::from_prob(t.insertion_to_insertion);
        let insertion_to_match = T::from_prob(t.insertion_to_match);
        let deletion_to_deletion = T::from_prob(t.deletion_to_deletion);
        let deletion_to_match = T::from_prob(t.deletion_to_match);

        let (prob_match, prob_mismatch) = emission.priors(base_qual);
        let prob_match = T::from_prob(prob_match);
        let prob_mismatch = T::from_prob(prob_mismatch);
        let floor = T::min_lane_value();

        let m = &mut self.matrix;
        let curr = i * m.stride;
        let prev = (i - 1) * m.stride;

        for j in first_col..=haplotype.len() {
            let prior = if is_match(read_base, haplotype[j - 1].to_ascii_uppercase()) {
                prob_match
            } else {
                prob_mismatch
            };

            let value_match = prior
                * (m.match_lane[prev + j - 1] * match_to_match
                    + m.insertion_lane[prev + j - 1] * insertion_to_match
                    + m.deletion_lane[prev + j - 1] * deletion_to_match);
            let value_insertion = m.match_lane[prev + j] * match_to_insertion
                + m.insertion_lane[prev + j] * insertion_to_insertion;
            let value_deletion = m.match_lane[curr + j - 1] * match_to_deletion
                + m.deletion_lane[curr + j - 1] * deletion_to_deletion;

            m.match_lane[curr + j] = value_match.max(floor);
            m.insertion_lane[curr + j] = value_insertion.max(floor);
            m.deletion_lane[curr + j] = value_deletion.max(floor);
        }
    }

    /// Sum of match and insertion lane over the last row. Paths ending in a deletion are
    /// not counted.
    fn final_sum(&self, read_len: usize, haplotype_len: usize) -> f64 {
        let m = &self.matrix;
        let last = read_len * m.stride;
        let mut sum = 0.0;
        for j in 1..=haplotype_len {
            sum += m.match_lane[last + j].into_f64() + m.insertion_lane[last + j].into_f64();
        }
        sum.max(T::min_lane_value().into_f64())
    }
}
