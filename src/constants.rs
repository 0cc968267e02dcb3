// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

/// Divisor of the miscall probability when a read base mismatches the haplotype:
/// any of the three other bases could have been called.
pub const TRISTATE_CORRECTION: f64 = 3.0;

/// Qualities below this are considered unusable and raised to it during read preprocessing.
pub const MIN_USABLE_Q_SCORE: u8 = 6;

// Defaults used when a read comes without indel qualities.
pub const DEFAULT_INSERTION_QUAL: u8 = 45;
pub const DEFAULT_DELETION_QUAL: u8 = 45;
pub const DEFAULT_GAP_CONTINUATION_QUAL: u8 = 10;

/// Base qualities below this threshold are set to `MIN_USABLE_Q_SCORE` during preprocessing.
pub const DEFAULT_BASE_QUALITY_THRESHOLD: u8 = 18;

/// Smallest scaled single precision sum that is trusted. Below, the pair is recomputed in
/// double precision.
pub const MIN_ACCEPTED_SINGLE_PRECISION: f64 = 1e-28;

/// Read bases or haplotype bases with this value match any base.
pub const UNKNOWN_BASE: u8 = b'N';
