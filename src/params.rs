// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use crate::constants;

/// Floating point precision of the DP lanes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    /// Compute all lanes in f64.
    Double,
    /// Compute in f32 first and recompute in f64 if the single precision result underflows.
    SingleWithFallback,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Double
    }
}

/// Parameters of the pair HMM computation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairHmmParams {
    /// Divide the miscall probability by three on mismatches.
    pub tristate_correction: bool,
    pub precision: Precision,
    /// Upper bound for the memory occupied by the three DP lanes.
    pub max_matrix_bytes: usize,
    pub default_insertion_qual: u8,
    pub default_deletion_qual: u8,
    pub constant_gap_continuation_qual: u8,
    /// Base qualities below this are raised to the minimum usable quality by read preprocessing.
    pub base_quality_threshold: u8,
    pub cap_base_quals_to_mapping_quality: bool,
    /// Adjust read qualities before batch likelihood computation.
    pub preprocess_reads: bool,
}

impl Default for PairHmmParams {
    fn default() -> Self {
        PairHmmParams {
            tristate_correction: true,
            precision: Precision::default(),
            max_matrix_bytes: 1 << 31,
            default_insertion_qual: constants::DEFAULT_INSERTION_QUAL,
            default_deletion_qual: constants::DEFAULT_DELETION_QUAL,
            constant_gap_continuation_qual: constants::DEFAULT_GAP_CONTINUATION_QUAL,
            base_quality_threshold: constants::DEFAULT_BASE_QUALITY_THRESHOLD,
            cap_base_quals_to_mapping_quality: true,
            preprocess_reads: true,
        }
    }
}
