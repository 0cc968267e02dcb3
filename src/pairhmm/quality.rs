// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use bio::stats::{PHREDProb, Prob};

lazy_static! {
    /// Process wide quality table, shared read-only by all computation contexts.
    pub static ref QUALITY_TABLE: QualityTable = QualityTable::new();
}

/// Lookup of miscall probabilities for all 256 quality bytes.
#[derive(Debug, Clone)]
pub struct QualityTable {
    error: [f64; 256],
    no_error: [f64; 256],
}

impl QualityTable {
    fn new() -> Self {
        let mut error = [0.0; 256];
        let mut no_error = [0.0; 256];
        for qual in 0u8..=255u8 {
            let prob = prob_error_from_phred(qual);
            error[qual as usize] = prob;
            no_error[qual as usize] = 1.0 - prob;
        }
        QualityTable { error, no_error }
    }

    /// Probability that the event encoded by the Phred quality happened, `10^(-q/10)`.
    #[inline]
    pub fn prob_error(&self, qual: u8) -> f64 {
        self.error[qual as usize]
    }

    /// Complement of `prob_error`.
    #[inline]
    pub fn prob_no_error(&self, qual: u8) -> f64 {
        self.no_error[qual as usize]
    }
}

/// Convert a Phred quality into a probability in `[f64::MIN_POSITIVE, 1]`.
fn prob_error_from_phred(qual: u8) -> f64 {
    let prob = *Prob::from(PHREDProb(qual as f64));
    prob.min(1.0).max(f64::MIN_POSITIVE)
}

/// Shorthand for looking up the shared table.
#[inline]
pub fn prob_error(qual: u8) -> f64 {
    QUALITY_TABLE.prob_error(qual)
}

#[inline]
pub fn prob_no_error(qual: u8) -> f64 {
    QUALITY_TABLE.prob_no_error(qual)
}
