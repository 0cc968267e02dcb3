// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;

use anyhow::Result;

use crate::constants::MIN_USABLE_Q_SCORE;
use crate::errors;
use crate::params::PairHmmParams;

/// A sequenced read with its four parallel Phred quality tracks.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Read {
    bases: Vec<u8>,
    base_quals: Vec<u8>,
    insertion_quals: Vec<u8>,
    deletion_quals: Vec<u8>,
    gap_continuation_quals: Vec<u8>,
    mapping_quality: Option<u8>,
}

impl Read {
    pub fn new(
        bases: Vec<u8>,
        base_quals: Vec<u8>,
        insertion_quals: Vec<u8>,
        deletion_quals: Vec<u8>,
        gap_continuation_quals: Vec<u8>,
    ) -> Result<Self> {
        let len = bases.len();
        for (what, quals) in [
            ("base qualities", &base_quals),
            ("insertion qualities", &insertion_quals),
            ("deletion qualities", &deletion_quals),
            ("gap continuation qualities", &gap_continuation_quals),
        ]
        .iter()
        {
            if quals.len() != len {
                Err(errors::dimension_mismatch(*what, len, quals.len()))?;
            }
        }

        Ok(Read {
            bases,
            base_quals,
            insertion_quals,
            deletion_quals,
            gap_continuation_quals,
            mapping_quality: None,
        })
    }

    /// Create a read that uses the configured constant indel qualities.
    pub fn with_default_indel_quals(
        bases: Vec<u8>,
        base_quals: Vec<u8>,
        params: &PairHmmParams,
    ) -> Result<Self> {
        let len = bases.len();
        Read::new(
            bases,
            base_quals,
            vec![params.default_insertion_qual; len],
            vec![params.default_deletion_qual; len],
            vec![params.constant_gap_continuation_qual; len],
        )
    }

    pub fn with_mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = Some(mapping_quality);
        self
    }

    /// Copy of the read with qualities adjusted for likelihood computation: base qualities
    /// are capped at the mapping quality (if known and enabled), base qualities below the
    /// threshold and indel qualities below the minimum usable quality are raised to the
    /// minimum usable quality.
    pub fn preprocessed(&self, params: &PairHmmParams) -> Self {
        let cap = if params.cap_base_quals_to_mapping_quality {
            self.mapping_quality
        } else {
            None
        };
        let base_quals: Vec<u8> = self
            .base_quals
            .iter()
            .map(|&qual| {
                let qual = cap.map_or(qual, |mq| cmp::min(qual, mq));
                fixed_if_too_low(qual, params.base_quality_threshold)
            })
            .collect();
        let raise = |quals: &[u8]| {
            quals
                .iter()
                .map(|&qual| fixed_if_too_low(qual, MIN_USABLE_Q_SCORE))
                .collect::<Vec<u8>>()
        };

        Read {
            bases: self.bases.clone(),
            base_quals,
            insertion_quals: raise(&self.insertion_quals),
            deletion_quals: raise(&self.deletion_quals),
            gap_continuation_quals: self.gap_continuation_quals.clone(),
            mapping_quality: self.mapping_quality,
        }
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

fn fixed_if_too_low(qual: u8, min_qual: u8) -> u8 {
    if qual < min_qual {
        MIN_USABLE_Q_SCORE
    } else {
        qual
    }
}
