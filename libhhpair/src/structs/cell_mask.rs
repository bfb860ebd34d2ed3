use crate::config::AlignmentConfig;
use crate::error::AlignError;

use super::DpMatrix;

/// Tracks which (query, template) cells may still be part of an alignment.
///
/// A cell is excluded by the self-comparison band, by the minimum overlap
/// bands, by a user excluded query range, or because an earlier alignment
/// passed near it. Exclusion is permanent for the life of the mask.
#[derive(Clone, Debug)]
pub struct CellMask {
    cells: DpMatrix<bool>,
    self_comparison: bool,
    min_overlap: usize,
}

impl CellMask {
    /// Cells within this many columns of the main diagonal are excluded
    /// when a profile is aligned to itself.
    pub const SELF_EXCLUSION: usize = 3;
    /// Cells within this distance of a backtraced cell, along its row and
    /// column, are excluded.
    pub const NEIGHBORHOOD_RADIUS: usize = 2;

    pub fn new(
        query_length: usize,
        template_length: usize,
        self_comparison: bool,
        config: &AlignmentConfig,
    ) -> Result<Self, AlignError> {
        let cells = DpMatrix::new("cell mask", query_length, template_length, false)?;

        let min_overlap = match config.min_overlap {
            Some(requested) => Self::capped_min_overlap(query_length, template_length, requested),
            None => Self::default_min_overlap(query_length, template_length),
        };

        let mut mask = Self {
            cells,
            self_comparison,
            min_overlap,
        };

        if self_comparison {
            mask.exclude_self_band();
        } else {
            mask.exclude_overlap_bands();
        }

        for range in &config.excluded_ranges {
            let start = (*range.start()).max(1);
            let end = (*range.end()).min(query_length);
            for query_idx in start..=end {
                for template_idx in 1..=template_length {
                    mask.exclude(query_idx, template_idx);
                }
            }
        }

        Ok(mask)
    }

    pub fn default_min_overlap(query_length: usize, template_length: usize) -> usize {
        let shorter = query_length.min(template_length) as f64;
        60.min((0.333 * shorter).floor() as usize) + 1
    }

    pub fn capped_min_overlap(
        query_length: usize,
        template_length: usize,
        requested: usize,
    ) -> usize {
        let shorter = query_length.min(template_length) as f64;
        requested.min((0.8 * shorter).floor() as usize)
    }

    fn exclude_self_band(&mut self) {
        let template_length = self.template_length();
        for query_idx in 1..=self.query_length() {
            let band_end = (query_idx + Self::SELF_EXCLUSION).min(template_length);
            for template_idx in 1..=band_end {
                self.exclude(query_idx, template_idx);
            }
        }
    }

    /// Forbids alignments that cannot cover `min_overlap` columns: early
    /// query columns may not pair with the template tail and late query
    /// columns may not pair with the template head.
    fn exclude_overlap_bands(&mut self) {
        let query_length = self.query_length();
        let template_length = self.template_length();
        let min_overlap = self.min_overlap;

        for query_idx in 1..min_overlap.min(query_length + 1) {
            let start = (query_idx + template_length + 1)
                .saturating_sub(min_overlap)
                .max(1);
            for template_idx in start..=template_length {
                self.exclude(query_idx, template_idx);
            }
        }

        let first_row = (query_length + 1).saturating_sub(min_overlap).max(1);
        for query_idx in first_row..=query_length {
            let end = (query_idx + min_overlap).saturating_sub(query_length);
            for template_idx in 1..end.min(template_length + 1) {
                self.exclude(query_idx, template_idx);
            }
        }
    }

    #[inline]
    pub fn is_excluded(&self, query_idx: usize, template_idx: usize) -> bool {
        self.cells.get(query_idx, template_idx)
    }

    #[inline]
    pub fn exclude(&mut self, query_idx: usize, template_idx: usize) {
        self.cells.set(query_idx, template_idx, true);
    }

    /// Excludes the cross of radius `NEIGHBORHOOD_RADIUS` centered on a cell.
    pub fn exclude_neighborhood(&mut self, query_idx: usize, template_idx: usize) {
        let radius = Self::NEIGHBORHOOD_RADIUS;

        let row_start = query_idx.saturating_sub(radius).max(1);
        let row_end = (query_idx + radius).min(self.query_length());
        for row in row_start..=row_end {
            self.exclude(row, template_idx);
        }

        let col_start = template_idx.saturating_sub(radius).max(1);
        let col_end = (template_idx + radius).min(self.template_length());
        for col in col_start..=col_end {
            self.exclude(query_idx, col);
        }
    }

    /// The first template column of a query row outside the self-comparison
    /// band; `template_length + 1` when the band covers the whole row.
    #[inline]
    pub fn band_start(&self, query_idx: usize) -> usize {
        if self.self_comparison {
            (query_idx + Self::SELF_EXCLUSION + 1).min(self.template_length() + 1)
        } else {
            1
        }
    }

    pub fn is_self_comparison(&self) -> bool {
        self.self_comparison
    }

    pub fn min_overlap(&self) -> usize {
        self.min_overlap
    }

    pub fn query_length(&self) -> usize {
        self.cells.query_length
    }

    pub fn template_length(&self) -> usize {
        self.cells.template_length
    }

    pub fn excluded_count(&self) -> usize {
        (1..=self.query_length())
            .map(|query_idx| {
                self.cells.row(query_idx)[1..=self.template_length()]
                    .iter()
                    .filter(|&&excluded| excluded)
                    .count()
            })
            .sum()
    }
}
