use log::{debug, trace};

use crate::align::scoring::PairScorer;
use crate::config::AlignmentConfig;
use crate::error::{AlignError, ProfileError};
use crate::structs::{CellMask, DpMatrix, Profile};

/// Running products of scale factors below this are flushed to zero.
pub const SCALE_UNDERFLOW: f64 = f64::MIN_POSITIVE * 100.0;

/// The four gap-state matrices of the probability lattice.
#[derive(Clone, Debug)]
pub struct GapMatrices {
    pub gd: DpMatrix<f64>,
    pub im: DpMatrix<f64>,
    pub dg: DpMatrix<f64>,
    pub mi: DpMatrix<f64>,
}

impl GapMatrices {
    pub fn new(query_length: usize, template_length: usize) -> Result<Self, AlignError> {
        let matrix = |name| DpMatrix::new(name, query_length, template_length, 0.0);
        Ok(Self {
            gd: matrix("GD")?,
            im: matrix("IM")?,
            dg: matrix("DG")?,
            mi: matrix("MI")?,
        })
    }

    pub fn fill(&mut self, value: f64) {
        self.gd.fill(value);
        self.im.fill(value);
        self.dg.fill(value);
        self.mi.fill(value);
    }

    pub fn set_all(&mut self, query_idx: usize, template_idx: usize, value: f64) {
        self.gd.set(query_idx, template_idx, value);
        self.im.set(query_idx, template_idx, value);
        self.dg.set(query_idx, template_idx, value);
        self.mi.set(query_idx, template_idx, value);
    }
}

/// What the gap matrices currently hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapContents {
    Empty,
    Forward,
    /// Overwritten by the Backward pass
    Backward,
}

/// The scaled Forward lattice.
///
/// Row i of every matrix holds the true Forward values multiplied by the
/// cumulative scale C_i, the product of `scale[1..=i]`.
#[derive(Clone, Debug)]
pub struct ForwardMatrices {
    pub mm: DpMatrix<f64>,
    pub gaps: GapMatrices,
    /// The scale factor of each row; `scale[query_length + 1]` is applied
    /// after the last row.
    pub scale: Vec<f64>,
    /// The scaled total probability of the pair
    pub p_forward: f64,
    /// The Forward score in bits
    pub score: f64,
    pub(crate) gap_contents: GapContents,
}

impl ForwardMatrices {
    pub fn new(query_length: usize, template_length: usize) -> Result<Self, AlignError> {
        Ok(Self {
            mm: DpMatrix::new("MM", query_length, template_length, 0.0)?,
            gaps: GapMatrices::new(query_length, template_length)?,
            scale: vec![1.0; query_length + 2],
            p_forward: 0.0,
            score: -f64::INFINITY,
            gap_contents: GapContents::Empty,
        })
    }

    pub fn query_length(&self) -> usize {
        self.mm.query_length
    }

    pub fn template_length(&self) -> usize {
        self.mm.template_length
    }

    pub fn gap_contents(&self) -> GapContents {
        self.gap_contents
    }

    /// The cumulative scale C_i of every row, 0..=query_length + 1, with
    /// the same underflow flushing the Forward fill applies.
    pub fn cumulative_scale(&self) -> Vec<f64> {
        let mut cumulative = Vec::with_capacity(self.scale.len());
        let mut product = 1.0;
        for (row, &scale) in self.scale.iter().enumerate() {
            if row > 1 {
                product *= scale;
                if product < SCALE_UNDERFLOW {
                    product = 0.0;
                }
            }
            cumulative.push(product);
        }
        cumulative
    }

    /// The log2 of the unscaled total probability of the pair.
    pub fn log2_total_probability(&self) -> f64 {
        self.score + 10.0
    }
}

/// Whether an alignment may begin at a cell.
#[inline]
pub(crate) fn begin_allowed(
    query_idx: usize,
    template_idx: usize,
    mask: &CellMask,
    config: &AlignmentConfig,
) -> bool {
    config.local || query_idx == 1 || template_idx == mask.band_start(query_idx)
}

/// Fills the scaled Forward lattice and returns the Forward score in bits.
///
/// Each row is computed with the scale factor chosen from the previous row's
/// largest MM value, keeping every row near 1. Global alignments may only
/// begin in the first row or the first allowed column and only end in the
/// last row or the last column.
pub fn forward(
    query: &Profile,
    template: &Profile,
    mask: &CellMask,
    config: &AlignmentConfig,
    matrices: &mut ForwardMatrices,
) -> Result<f64, AlignError> {
    for profile in [query, template] {
        if profile.length == 0 {
            return Err(ProfileError::Empty {
                name: profile.name.clone(),
            }
            .into());
        }
    }

    let query_length = query.length;
    let template_length = template.length;
    let scorer = PairScorer::new(query, template, config);

    matrices.mm.fill(0.0);
    matrices.gaps.fill(0.0);
    matrices.scale.iter_mut().for_each(|scale| *scale = 1.0);

    let ForwardMatrices {
        mm: f_mm, gaps, scale, ..
    } = matrices;

    // the cumulative scale C_i of the current row
    let mut scale_prod = 1.0;

    for query_idx in 1..=query_length {
        if query_idx > 1 {
            scale_prod *= scale[query_idx];
            if scale_prod < SCALE_UNDERFLOW {
                scale_prod = 0.0;
            }
        }
        let row_scale = scale[query_idx];
        let prev = query_idx - 1;

        let q_m2m = query.transition(Profile::MATCH_TO_MATCH_IDX, prev);
        let q_i2m = query.transition(Profile::INSERT_TO_MATCH_IDX, prev);
        let q_d2m = query.transition(Profile::DELETE_TO_MATCH_IDX, prev);
        let q_m2d = query.transition(Profile::MATCH_TO_DELETE_IDX, prev);
        let q_d2d = query.transition(Profile::DELETE_TO_DELETE_IDX, prev);
        let q_m2i = query.transition(Profile::MATCH_TO_INSERT_IDX, query_idx);
        let q_i2i = query.transition(Profile::INSERT_TO_INSERT_IDX, query_idx);

        let mut row_max: f64 = 0.0;

        for template_idx in 1..=template_length {
            if mask.is_excluded(query_idx, template_idx) {
                f_mm.set(query_idx, template_idx, 0.0);
                gaps.set_all(query_idx, template_idx, 0.0);
                continue;
            }

            let t_prev = template_idx - 1;
            let t_m2m = template.transition(Profile::MATCH_TO_MATCH_IDX, t_prev);

            let begin = if begin_allowed(query_idx, template_idx, mask, config) {
                scale_prod
            } else {
                0.0
            };

            let predecessors = f_mm.get(prev, t_prev) * q_m2m * t_m2m
                + gaps.gd.get(prev, t_prev)
                    * q_m2m
                    * template.transition(Profile::DELETE_TO_MATCH_IDX, t_prev)
                + gaps.im.get(prev, t_prev) * q_i2m * t_m2m
                + gaps.dg.get(prev, t_prev) * q_d2m * t_m2m
                + gaps.mi.get(prev, t_prev)
                    * q_m2m
                    * template.transition(Profile::INSERT_TO_MATCH_IDX, t_prev);

            let mm = scorer.match_probability(query, query_idx, template, template_idx)
                * (begin + row_scale * predecessors);
            f_mm.set(query_idx, template_idx, mm);
            row_max = row_max.max(mm);

            gaps.gd.set(
                query_idx,
                template_idx,
                f_mm.get(query_idx, t_prev)
                    * template.transition(Profile::MATCH_TO_DELETE_IDX, t_prev)
                    + gaps.gd.get(query_idx, t_prev)
                        * template.transition(Profile::DELETE_TO_DELETE_IDX, t_prev),
            );

            gaps.im.set(
                query_idx,
                template_idx,
                (f_mm.get(query_idx, t_prev) * q_m2i + gaps.im.get(query_idx, t_prev) * q_i2i)
                    * t_m2m,
            );

            gaps.dg.set(
                query_idx,
                template_idx,
                row_scale
                    * (f_mm.get(prev, template_idx) * q_m2d
                        + gaps.dg.get(prev, template_idx) * q_d2d),
            );

            gaps.mi.set(
                query_idx,
                template_idx,
                row_scale
                    * q_m2m
                    * (f_mm.get(prev, template_idx)
                        * template.transition(Profile::MATCH_TO_INSERT_IDX, template_idx)
                        + gaps.mi.get(prev, template_idx)
                            * template.transition(Profile::INSERT_TO_INSERT_IDX, template_idx)),
            );
        }

        scale[query_idx + 1] = 1.0 / (row_max + 1.0);
        trace!("forward row {}: scale {:e}", query_idx, scale[query_idx + 1]);
    }

    let final_sum = f_mm.get(query_length, template_length)
        + gaps.gd.get(query_length, template_length)
        + gaps.im.get(query_length, template_length)
        + gaps.dg.get(query_length, template_length)
        + gaps.mi.get(query_length, template_length);
    if final_sum.is_infinite() || final_sum.is_nan() {
        return Err(AlignError::Numerical {
            stage: "forward",
            query_idx: query_length,
            template_idx: template_length,
            value: final_sum,
        });
    }

    let row_sum =
        |query_idx: usize| -> f64 { f_mm.row(query_idx)[1..=template_length].iter().sum() };

    let p_forward = if config.local {
        let mut p = 1.0;
        for query_idx in 1..=query_length {
            p = (p + row_sum(query_idx)) * scale[query_idx + 1];
        }
        p
    } else {
        let mut p = 0.0;
        for query_idx in 1..query_length {
            p = (p + f_mm.get(query_idx, template_length)) * scale[query_idx + 1];
        }
        (p + row_sum(query_length)) * scale[query_length + 1]
    };

    let log_scale: f64 = scale[1..=query_length + 1].iter().map(|s| s.log2()).sum();
    let score = p_forward.log2() - log_scale - 10.0;

    if !score.is_finite() || !p_forward.is_finite() {
        return Err(AlignError::Numerical {
            stage: "forward",
            query_idx: query_length,
            template_idx: template_length,
            value: if p_forward.is_finite() { score } else { p_forward },
        });
    }

    matrices.p_forward = p_forward;
    matrices.score = score;
    matrices.gap_contents = GapContents::Forward;

    debug!(
        "forward {} x {}: score {:.3}, p_forward {:e}",
        query.name, template.name, score, p_forward
    );

    Ok(score)
}
