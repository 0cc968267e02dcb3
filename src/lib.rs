// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A logless pair hidden Markov model for the probability of a sequenced read given a
//! candidate haplotype, computed in scaled probability space instead of log space.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate strum_macros;
#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod cli;
pub mod constants;
pub mod errors;
pub mod likelihoods;
pub mod pairhmm;
pub mod params;

pub use crate::errors::Error;
pub use crate::likelihoods::{compute_likelihoods, ReadLikelihoods};
pub use crate::pairhmm::{first_position_where_haplotypes_differ, PairHmm, Read};
pub use crate::params::{PairHmmParams, Precision};
