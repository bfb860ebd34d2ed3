use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use libhhpair::config::parse_excluded_ranges;
use libhhpair::{AlignmentConfig, AlignmentConfigBuilder, SecondaryStructureMode};

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Align query profiles against template profiles")]
    Align(AlignArgs),
    #[command(about = "Load profile files and report what they contain")]
    Validate(ValidateArgs),
}

#[derive(Parser)]
#[command(name = "hhpair")]
#[command(about = "Pairwise profile HMM alignment: Viterbi, Forward/Backward, MAC & sampling")]
pub struct Cli {
    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: SubCommands,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The number of threads that hhpair will use
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = 8usize,
        value_name = "n"
    )]
    pub num_threads: usize,

    /// Allow hhpair to overwrite files
    #[arg(short = 'q', long = "allow-overwrite", default_value_t = false)]
    pub allow_overwrite: bool,
}

/// Which alignment each repeat reports.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// Best scoring path
    Viterbi,
    /// Maximum accuracy path over the posterior match probabilities
    Mac,
    /// Paths drawn from the Forward ensemble
    Stochastic,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsModeArg {
    Off,
    Auto,
    Qpto,
    Qotp,
    Pred,
}

impl From<SsModeArg> for SecondaryStructureMode {
    fn from(value: SsModeArg) -> Self {
        match value {
            SsModeArg::Off => SecondaryStructureMode::Off,
            SsModeArg::Auto => SecondaryStructureMode::Auto,
            SsModeArg::Qpto => SecondaryStructureMode::QueryPredictedTemplateObserved,
            SsModeArg::Qotp => SecondaryStructureMode::QueryObservedTemplatePredicted,
            SsModeArg::Pred => SecondaryStructureMode::BothPredicted,
        }
    }
}

#[derive(Debug, Args)]
pub struct AlignArgs {
    /// Query profile file (JSON)
    #[arg(value_name = "QUERY.json")]
    pub query_path: PathBuf,

    /// Template profile file (JSON)
    #[arg(value_name = "TEMPLATES.json")]
    pub template_path: PathBuf,

    /// Arguments that control output options
    #[command(flatten)]
    pub output_args: OutputArgs,

    /// Arguments that are passed to libhhpair functions
    #[command(flatten)]
    pub hhpair_args: HhpairArgs,

    /// Arguments that are common across all hhpair subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Profile files (JSON)
    #[arg(value_name = "PROFILES.json", required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HhpairArgs {
    /// Which alignment to report
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = AlignMode::Viterbi)]
    pub mode: AlignMode,

    /// Anchor both ends of the alignment instead of aligning locally
    #[arg(long, action)]
    pub global: bool,

    /// Posterior threshold of the MAC alignment
    #[arg(long, default_value_t = 0.35, value_name = "F")]
    pub mact: f64,

    /// Score offset (bits) added to every matched column
    #[arg(long, default_value_t = -0.03, value_name = "F", allow_hyphen_values = true)]
    pub shift: f32,

    /// Weight of the score autocorrelation bonus
    #[arg(long, default_value_t = 0.1, value_name = "F")]
    pub corr: f32,

    /// Bits charged per skipped query column before a global alignment
    #[arg(long = "egq", default_value_t = 0.0, value_name = "F")]
    pub end_gap_query: f32,

    /// Bits charged per skipped template column before a global alignment
    #[arg(long = "egt", default_value_t = 0.0, value_name = "F")]
    pub end_gap_template: f32,

    /// Minimum number of overlapping columns
    #[arg(long = "min-overlap", value_name = "N")]
    pub min_overlap: Option<usize>,

    /// Secondary structure scoring
    #[arg(long = "ss", value_enum, default_value_t = SsModeArg::Auto)]
    pub ss_mode: SsModeArg,

    /// Weight of the secondary structure score
    #[arg(long = "ssw", default_value_t = 0.11, value_name = "F")]
    pub ss_weight: f32,

    /// Query columns that may not be aligned, e.g. "3-57,238-314"
    #[arg(long = "exclude", value_name = "RANGES")]
    pub excluded_ranges: Option<String>,

    /// The number of non-overlapping alignments to report per pair
    #[arg(short = 'r', long = "repeats", default_value_t = 1usize, value_name = "N")]
    pub repeats: usize,

    /// The number of paths drawn per pair in stochastic mode
    #[arg(long = "samples", default_value_t = 10usize, value_name = "N")]
    pub samples: usize,

    /// Random seed of the stochastic backtrace
    #[arg(long = "seed", default_value_t = 0u64, value_name = "N")]
    pub seed: u64,

    /// Override the database size (number of templates) used for E-value calculation
    #[arg(short = 'Z', value_name = "N")]
    pub database_size: Option<usize>,
}

impl HhpairArgs {
    pub fn config(&self, num_templates: usize) -> anyhow::Result<AlignmentConfig> {
        let excluded_ranges = match &self.excluded_ranges {
            Some(ranges) => parse_excluded_ranges(ranges)?,
            None => vec![],
        };

        AlignmentConfigBuilder::default()
            .local(!self.global)
            .mact(self.mact)
            .shift(self.shift)
            .corr(self.corr)
            .end_gap_query(self.end_gap_query)
            .end_gap_template(self.end_gap_template)
            .min_overlap(self.min_overlap)
            .ss_mode(self.ss_mode.into())
            .ss_weight(self.ss_weight)
            .excluded_ranges(excluded_ranges)
            .database_size(self.database_size.unwrap_or(num_templates).max(1))
            .build()
            .context("failed to build alignment config")
    }
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Only report alignments with an E-value below this value
    #[arg(short = 'E', default_value_t = 10.0, value_name = "F")]
    pub e_value_threshold: f64,

    /// Where to place tabular output
    #[arg(
        short = 'T',
        long = "tab-output",
        default_value = "results.tbl",
        value_name = "path"
    )]
    pub tbl_results_path: PathBuf,

    /// Where to place alignment output
    #[arg(short = 'O', long = "output", value_name = "path")]
    pub ali_results_path: Option<PathBuf>,

    /// Where to place the alignments as JSON
    #[arg(short = 'J', long = "json-output", value_name = "path")]
    pub json_results_path: Option<PathBuf>,
}
