// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;
use itertools::izip;

use crate::errors::{self, Error};
use crate::pairhmm::quality::{prob_error, prob_no_error};

/// Transition probabilities between the three state lanes for a single read position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transition {
    pub match_to_match: f64,
    pub match_to_insertion: f64,
    pub match_to_deletion: f64,
    pub insertion_to_insertion: f64,
    pub insertion_to_match: f64,
    pub deletion_to_deletion: f64,
    pub deletion_to_match: f64,
}

impl Transition {
    /// Derive transitions from insertion-open, deletion-open and gap-continuation qualities.
    /// Returns the transition and whether the match transition had to be clamped to zero.
    pub fn from_quals(ins_qual: u8, del_qual: u8, gcp_qual: u8) -> (Self, bool) {
        let prob_insertion = prob_error(ins_qual);
        let prob_deletion = prob_error(del_qual);
        let prob_gap_extend = prob_error(gcp_qual);
        let prob_gap_close = prob_no_error(gcp_qual);

        let prob_match = 1.0 - (prob_insertion + prob_deletion);
        let clamped = prob_match < 0.0;

        (
            Transition {
                match_to_match: prob_match.max(0.0),
                match_to_insertion: prob_insertion,
                match_to_deletion: prob_deletion,
                insertion_to_insertion: prob_gap_extend,
                insertion_to_match: prob_gap_close,
                deletion_to_deletion: prob_gap_extend,
                deletion_to_match: prob_gap_close,
            },
            clamped,
        )
    }

    /// Total outgoing probability of the match, insertion and deletion state.
    pub fn outgoing(&self) -> [f64; 3] {
        [
            self.match_to_match + self.match_to_insertion + self.match_to_deletion,
            self.insertion_to_insertion + self.insertion_to_match,
            self.deletion_to_deletion + self.deletion_to_match,
        ]
    }
}

/// Per read position transitions, derived once per read and consumed read-only by the
/// forward recurrence. Position `i` of the table feeds row `i + 1` of the DP lanes.
#[derive(Debug, Clone, Default, Getters)]
pub struct TransitionModel {
    rows: Vec<Transition>,
    /// Diagnostics for positions whose qualities did not yield a proper distribution.
    #[getset(get = "pub")]
    inconsistencies: Vec<Error>,
    quals: Option<[Vec<u8>; 3]>,
}

impl TransitionModel {
    pub fn new() -> Self {
        TransitionModel::default()
    }

    /// Build the table from the read's indel quality tracks. Rebuilding is skipped if the
    /// qualities equal those of the previous call.
    pub fn build(&mut self, ins_quals: &[u8], del_quals: &[u8], gcp_quals: &[u8]) -> Result<()> {
        let len = ins_quals.len();
        if del_quals.len() != len {
            Err(errors::dimension_mismatch(
                "deletion qualities",
                len,
                del_quals.len(),
            ))?;
        }
        if gcp_quals.len() != len {
            Err(errors::dimension_mismatch(
                "gap continuation qualities",
                len,
                gcp_quals.len(),
            ))?;
        }

        if let Some([ins, del, gcp]) = &self.quals {
            if ins.as_slice() == ins_quals && del.as_slice() == del_quals && gcp.as_slice() == gcp_quals
            {
                return Ok(());
            }
        }

        self.rows.clear();
        self.rows.reserve(len);
        self.inconsistencies.clear();
        for (position, (&ins, &del, &gcp)) in izip!(ins_quals, del_quals, gcp_quals).enumerate() {
            let (transition, clamped) = Transition::from_quals(ins, del, gcp);
            if clamped {
                let inconsistency = Error::ModelInconsistency {
                    position,
                    prob_insertion: transition.match_to_insertion,
                    prob_deletion: transition.match_to_deletion,
                };
                warn!("{}", inconsistency);
                self.inconsistencies.push(inconsistency);
            }
            self.rows.push(transition);
        }
        self.quals = Some([ins_quals.to_vec(), del_quals.to_vec(), gcp_quals.to_vec()]);

        Ok(())
    }

    /// Forget the cached qualities so that the next `build` recomputes the table.
    pub fn invalidate(&mut self) {
        self.quals = None;
    }

    #[inline]
    pub fn get(&self, position: usize) -> &Transition {
        &self.rows[position]
    }

    pub fn rows(&self) -> &[Transition] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}
