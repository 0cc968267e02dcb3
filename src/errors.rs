// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(
        "pair HMM matrices are not initialized for read length {read_len} and haplotype length \
         {haplotype_len} (allocated: {max_read_len} x {max_haplotype_len}); call initialize first"
    )]
    Uninitialized {
        read_len: usize,
        haplotype_len: usize,
        max_read_len: usize,
        max_haplotype_len: usize,
    },
    #[error(
        "unable to allocate pair HMM matrices for {max_read_len} x {max_haplotype_len}: \
         {bytes} bytes requested, limit is {limit} bytes"
    )]
    AllocationError {
        max_read_len: usize,
        max_haplotype_len: usize,
        bytes: usize,
        limit: usize,
    },
    #[error(
        "inconsistent transition model at read position {position}: insertion ({prob_insertion}) \
         and deletion ({prob_deletion}) open probabilities sum above 1; match transition clamped to 0"
    )]
    ModelInconsistency {
        position: usize,
        prob_insertion: f64,
        prob_deletion: f64,
    },
}

pub(crate) fn dimension_mismatch(what: &'static str, expected: usize, found: usize) -> Error {
    Error::DimensionMismatch {
        what,
        expected,
        found,
    }
}
