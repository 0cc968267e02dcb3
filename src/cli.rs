// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use structopt::StructOpt;

use crate::likelihoods::compute_likelihoods;
use crate::pairhmm::Read;
use crate::params::{PairHmmParams, Precision};

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "logless-pairhmm",
    about = "Compute the log10 likelihood of a read given one or more candidate haplotypes."
)]
#[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
pub struct PairHmmCli {
    #[structopt(long, help = "Read bases.")]
    pub read: String,
    #[structopt(
        long = "haplotype",
        short = "H",
        required = true,
        number_of_values = 1,
        help = "Candidate haplotype bases (can be given multiple times)."
    )]
    pub haplotypes: Vec<String>,
    #[structopt(
        long = "base-quals",
        help = "Base qualities of the read, Phred+33 encoded as in FASTQ. If omitted, \
                --base-qual is used for every base."
    )]
    pub base_quals: Option<String>,
    #[structopt(
        long = "base-qual",
        default_value = "30",
        help = "Constant base quality used if --base-quals is not given."
    )]
    pub base_qual: u8,
    #[structopt(long = "ins-qual", help = "Constant insertion opening quality.")]
    pub insertion_qual: Option<u8>,
    #[structopt(long = "del-qual", help = "Constant deletion opening quality.")]
    pub deletion_qual: Option<u8>,
    #[structopt(long = "gcp", help = "Constant gap continuation quality.")]
    pub gap_continuation_qual: Option<u8>,
    #[structopt(
        long,
        possible_values = &["double", "single-with-fallback"],
        help = "Floating point precision of the DP lanes."
    )]
    pub precision: Option<Precision>,
    #[structopt(
        long = "no-tristate-correction",
        help = "Do not divide the miscall probability by three on mismatches."
    )]
    pub no_tristate_correction: bool,
    #[structopt(
        long = "mapping-quality",
        help = "Mapping quality of the read. Base qualities are capped at it when preprocessing."
    )]
    pub mapping_quality: Option<u8>,
    #[structopt(
        long = "no-preprocess",
        help = "Use the read qualities as given. By default, base qualities are capped at the \
                mapping quality and unusably low qualities are raised."
    )]
    pub no_preprocess: bool,
    #[structopt(
        long,
        parse(from_os_str),
        help = "JSON file with pair HMM parameters. Missing keys take their default values. \
                Command line options take precedence."
    )]
    pub params: Option<PathBuf>,
    #[structopt(long, short = "t", help = "Number of threads to use.")]
    pub threads: Option<usize>,
    #[structopt(long, short = "v", help = "Print debug information.")]
    pub verbose: bool,
}

impl PairHmmCli {
    /// Parameters from the optional JSON file, overridden by the given command line options.
    pub fn pairhmm_params(&self) -> Result<PairHmmParams> {
        let mut params = if let Some(path) = &self.params {
            let reader = File::open(path)
                .with_context(|| format!("unable to open parameter file {}", path.display()))?;
            serde_json::from_reader(reader)
                .with_context(|| format!("invalid parameter file {}", path.display()))?
        } else {
            PairHmmParams::default()
        };

        if let Some(precision) = self.precision {
            params.precision = precision;
        }
        if self.no_tristate_correction {
            params.tristate_correction = false;
        }
        if let Some(qual) = self.insertion_qual {
            params.default_insertion_qual = qual;
        }
        if let Some(qual) = self.deletion_qual {
            params.default_deletion_qual = qual;
        }
        if let Some(qual) = self.gap_continuation_qual {
            params.constant_gap_continuation_qual = qual;
        }
        if self.no_preprocess {
            params.preprocess_reads = false;
        }

        Ok(params)
    }

    pub fn read(&self, params: &PairHmmParams) -> Result<Read> {
        let bases = self.read.as_bytes().to_vec();
        let base_quals = match &self.base_quals {
            Some(encoded) => decode_phred33(encoded)?,
            None => vec![self.base_qual; bases.len()],
        };
        let read = Read::with_default_indel_quals(bases, base_quals, params)?;
        Ok(match self.mapping_quality {
            Some(mapq) => read.with_mapping_quality(mapq),
            None => read,
        })
    }
}

/// Decode FASTQ style qualities (ASCII offset 33).
pub fn decode_phred33(encoded: &str) -> Result<Vec<u8>> {
    encoded
        .bytes()
        .map(|c| {
            c.checked_sub(33)
                .ok_or_else(|| anyhow!("invalid Phred+33 quality character {:?}", c as char))
        })
        .collect()
}

pub fn run(opt: PairHmmCli) -> Result<()> {
    if let Some(threads) = opt.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let params = opt.pairhmm_params()?;
    debug!("pair HMM parameters: {:?}", params);
    let read = opt.read(&params)?;
    let haplotypes = opt
        .haplotypes
        .iter()
        .map(|haplotype| haplotype.as_bytes())
        .collect_vec();

    let likelihoods = compute_likelihoods(&params, &[read], &haplotypes)?;
    if likelihoods.is_flagged(0) {
        warn!("read has inconsistent indel qualities, its likelihoods should not be used");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (haplotype, likelihood) in opt.haplotypes.iter().zip(likelihoods.read_likelihoods(0)) {
        writeln!(out, "{}\t{}", haplotype, likelihood)?;
    }
    if let Some((best, likelihood)) = likelihoods.best_haplotype(0) {
        info!(
            "best haplotype: {} (log10 likelihood {})",
            opt.haplotypes[best], likelihood
        );
    }

    Ok(())
}
