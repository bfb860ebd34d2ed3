use std::ops::RangeInclusive;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which pair of secondary structure annotations enters the column score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecondaryStructureMode {
    Off,
    /// Pick the first usable pairing from the annotations both profiles carry.
    #[default]
    Auto,
    QueryPredictedTemplateObserved,
    QueryObservedTemplatePredicted,
    BothPredicted,
}

#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default)]
pub struct AlignmentConfig {
    /// Local alignment when true, global (end-anchored) when false
    pub local: bool,
    /// Bits charged per query column skipped before a global alignment starts
    pub end_gap_query: f32,
    /// Bits charged per template column skipped before a global alignment starts
    pub end_gap_template: f32,
    /// Posterior threshold of the maximum accuracy alignment
    pub mact: f64,
    /// Score offset (bits) added to every matched column
    pub shift: f32,
    /// Weight of the score autocorrelation bonus
    pub corr: f32,
    /// Overrides the minimum number of overlapping columns
    pub min_overlap: Option<usize>,
    pub ss_mode: SecondaryStructureMode,
    pub ss_weight: f32,
    /// Query column ranges (1-based, inclusive) that may not be aligned
    pub excluded_ranges: Vec<RangeInclusive<usize>>,
    pub database_size: usize,
    /// Lambda of the local length correction
    pub length_lambda: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            local: true,
            end_gap_query: 0.0,
            end_gap_template: 0.0,
            mact: 0.35,
            shift: -0.03,
            corr: 0.1,
            min_overlap: None,
            ss_mode: SecondaryStructureMode::Auto,
            ss_weight: 0.11,
            excluded_ranges: vec![],
            database_size: 1,
            length_lambda: 0.388,
        }
    }
}

/// Parses a comma separated list of query ranges such as "3-57,238-314".
///
/// A single column may be given without a dash.
pub fn parse_excluded_ranges(ranges: &str) -> Result<Vec<RangeInclusive<usize>>, ConfigError> {
    ranges
        .split(',')
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .map(|range| {
            let malformed = || ConfigError {
                range: range.to_string(),
            };

            let (start, end) = match range.split_once('-') {
                Some((start, end)) => (start.trim(), end.trim()),
                None => (range, range),
            };

            let start: usize = start.parse().map_err(|_| malformed())?;
            let end: usize = end.parse().map_err(|_| malformed())?;

            if start == 0 || start > end {
                return Err(malformed());
            }

            Ok(start..=end)
        })
        .collect()
}
