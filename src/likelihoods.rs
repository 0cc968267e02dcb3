// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp::Ordering;

use anyhow::Result;
use rayon::prelude::*;

use crate::pairhmm::{PairHmm, Read};
use crate::params::PairHmmParams;

/// Log10 likelihoods of a batch of reads given each of a set of haplotypes.
#[derive(Debug, Clone, PartialEq, Getters, new, Serialize)]
#[getset(get = "pub")]
pub struct ReadLikelihoods {
    /// One row per read, one column per haplotype.
    log10: Vec<Vec<f64>>,
    /// Indices of reads whose qualities yielded an inconsistent transition model.
    flagged_reads: Vec<usize>,
}

impl ReadLikelihoods {
    pub fn get(&self, read: usize, haplotype: usize) -> f64 {
        self.log10[read][haplotype]
    }

    pub fn read_likelihoods(&self, read: usize) -> &[f64] {
        &self.log10[read]
    }

    /// Index and log10 likelihood of the haplotype that best explains the given read.
    pub fn best_haplotype(&self, read: usize) -> Option<(usize, f64)> {
        self.log10[read]
            .iter()
            .cloned()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    pub fn is_flagged(&self, read: usize) -> bool {
        self.flagged_reads.binary_search(&read).is_ok()
    }

    pub fn len(&self) -> usize {
        self.log10.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log10.is_empty()
    }
}

/// Compute the likelihoods of all reads given all haplotypes.
///
/// Reads are distributed over the rayon thread pool. Each worker owns its own `PairHmm`,
/// allocated once for the largest read and haplotype of the batch.
pub fn compute_likelihoods<H: AsRef<[u8]> + Sync>(
    params: &PairHmmParams,
    reads: &[Read],
    haplotypes: &[H],
) -> Result<ReadLikelihoods> {
    let max_read_len = reads.iter().map(|read| read.len()).max().unwrap_or(0);
    let max_haplotype_len = haplotypes
        .iter()
        .map(|haplotype| haplotype.as_ref().len())
        .max()
        .unwrap_or(0);
    debug!(
        "computing likelihoods of {} reads (max length {}) given {} haplotypes (max length {})",
        reads.len(),
        max_read_len,
        haplotypes.len(),
        max_haplotype_len
    );

    let rows = reads
        .par_iter()
        .map_init(
            || PairHmm::new(params.clone()),
            |hmm, read| -> Result<(Vec<f64>, bool)> {
                hmm.ensure_capacity(max_read_len, max_haplotype_len)?;
                let likelihoods = if params.preprocess_reads {
                    hmm.compute_read_likelihoods(&read.preprocessed(params), haplotypes)?
                } else {
                    hmm.compute_read_likelihoods(read, haplotypes)?
                };
                Ok((likelihoods, !hmm.transitions().is_consistent()))
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let mut log10 = Vec::with_capacity(rows.len());
    let mut flagged_reads = Vec::new();
    for (i, (likelihoods, flagged)) in rows.into_iter().enumerate() {
        if flagged {
            flagged_reads.push(i);
        }
        log10.push(likelihoods);
    }
    if !flagged_reads.is_empty() {
        warn!(
            "{} of {} reads have inconsistent indel qualities and should be excluded",
            flagged_reads.len(),
            reads.len()
        );
    }

    Ok(ReadLikelihoods::new(log10, flagged_reads))
}
