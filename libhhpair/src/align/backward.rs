use log::{debug, log_enabled, trace, Level};

use crate::align::forward::{ForwardMatrices, GapContents, GapMatrices, SCALE_UNDERFLOW};
use crate::align::scoring::PairScorer;
use crate::config::AlignmentConfig;
use crate::error::AlignError;
use crate::structs::{CellMask, DpMatrix, Profile};

/// The Backward lattice.
///
/// The gap matrices are borrowed from the Forward pass and overwritten, so
/// they cannot outlive it; only the MM matrix is owned. Row i holds the true
/// Backward values multiplied by the product of the scale factors of the
/// rows after it.
pub struct BackwardMatrices<'f> {
    pub mm: DpMatrix<f64>,
    pub gaps: &'f mut GapMatrices,
}

impl<'f> BackwardMatrices<'f> {
    pub fn new(
        query_length: usize,
        template_length: usize,
        gaps: &'f mut GapMatrices,
    ) -> Result<Self, AlignError> {
        Ok(Self {
            mm: DpMatrix::new("posterior", query_length, template_length, 0.0)?,
            gaps,
        })
    }

    /// Releases the borrowed gap matrices and keeps the MM matrix.
    pub fn into_mm(self) -> DpMatrix<f64> {
        self.mm
    }
}

/// Runs the Backward pass and converts its MM matrix into posterior match
/// probabilities, P(query column i is aligned to template column j).
///
/// The Forward gap matrices are overwritten with Backward values, which
/// rules out a later stochastic backtrace on the same lattice.
pub fn backward(
    query: &Profile,
    template: &Profile,
    mask: &CellMask,
    config: &AlignmentConfig,
    forward: &mut ForwardMatrices,
) -> Result<DpMatrix<f64>, AlignError> {
    if forward.gap_contents != GapContents::Forward {
        return Err(AlignError::StageOrder {
            required: "a completed forward pass",
            requested: "backward",
        });
    }
    forward.gap_contents = GapContents::Backward;

    let query_length = query.length;
    let template_length = template.length;
    let scorer = PairScorer::new(query, template, config);

    let ForwardMatrices {
        mm: forward_mm,
        gaps,
        scale,
        p_forward,
        ..
    } = forward;
    let p_forward = *p_forward;

    let mut lattice = BackwardMatrices::new(query_length, template_length, gaps)?;
    let BackwardMatrices { mm: b_mm, gaps } = &mut lattice;

    // the product of the scale factors of every row after the current one
    let mut scale_prod = scale[query_length + 1];

    for template_idx in (1..=template_length).rev() {
        let value = if mask.is_excluded(query_length, template_idx) {
            0.0
        } else {
            scale_prod
        };
        b_mm.set(query_length, template_idx, value);
        gaps.set_all(query_length, template_idx, 0.0);
    }

    for query_idx in (1..query_length).rev() {
        let next = query_idx + 1;
        let next_scale = scale[next];
        scale_prod *= next_scale;
        if scale_prod < SCALE_UNDERFLOW {
            scale_prod = 0.0;
        }

        let q_m2m = query.transition(Profile::MATCH_TO_MATCH_IDX, query_idx);
        let q_m2i = query.transition(Profile::MATCH_TO_INSERT_IDX, query_idx);
        let q_m2d = query.transition(Profile::MATCH_TO_DELETE_IDX, query_idx);
        let q_i2m = query.transition(Profile::INSERT_TO_MATCH_IDX, query_idx);
        let q_i2i = query.transition(Profile::INSERT_TO_INSERT_IDX, query_idx);
        let q_d2m = query.transition(Profile::DELETE_TO_MATCH_IDX, query_idx);
        let q_d2d = query.transition(Profile::DELETE_TO_DELETE_IDX, query_idx);

        for template_idx in (1..=template_length).rev() {
            if mask.is_excluded(query_idx, template_idx) {
                b_mm.set(query_idx, template_idx, 0.0);
                gaps.set_all(query_idx, template_idx, 0.0);
                continue;
            }

            let end = if config.local || template_idx == template_length {
                scale_prod
            } else {
                0.0
            };

            if template_idx == template_length {
                b_mm.set(query_idx, template_idx, end);
                gaps.set_all(query_idx, template_idx, 0.0);
                continue;
            }

            let t_m2m = template.transition(Profile::MATCH_TO_MATCH_IDX, template_idx);
            let t_m2i = template.transition(Profile::MATCH_TO_INSERT_IDX, template_idx);
            let t_m2d = template.transition(Profile::MATCH_TO_DELETE_IDX, template_idx);
            let t_i2m = template.transition(Profile::INSERT_TO_MATCH_IDX, template_idx);
            let t_i2i = template.transition(Profile::INSERT_TO_INSERT_IDX, template_idx);
            let t_d2m = template.transition(Profile::DELETE_TO_MATCH_IDX, template_idx);
            let t_d2d = template.transition(Profile::DELETE_TO_DELETE_IDX, template_idx);

            let next_match = if mask.is_excluded(next, template_idx + 1) {
                0.0
            } else {
                b_mm.get(next, template_idx + 1)
                    * scorer.match_probability(query, next, template, template_idx + 1)
                    * next_scale
            };

            let gd_right = gaps.gd.get(query_idx, template_idx + 1);
            let im_right = gaps.im.get(query_idx, template_idx + 1);
            let dg_down = gaps.dg.get(next, template_idx) * next_scale;
            let mi_down = gaps.mi.get(next, template_idx) * next_scale;

            b_mm.set(
                query_idx,
                template_idx,
                end + next_match * q_m2m * t_m2m
                    + gd_right * t_m2d
                    + im_right * q_m2i * t_m2m
                    + dg_down * q_m2d
                    + mi_down * q_m2m * t_m2i,
            );

            gaps.gd.set(
                query_idx,
                template_idx,
                next_match * q_m2m * t_d2m + gd_right * t_d2d,
            );
            gaps.im.set(
                query_idx,
                template_idx,
                (next_match * q_i2m + im_right * q_i2i) * t_m2m,
            );
            gaps.dg.set(
                query_idx,
                template_idx,
                next_match * q_d2m * t_m2m + dg_down * q_d2d,
            );
            gaps.mi.set(
                query_idx,
                template_idx,
                q_m2m * (next_match * t_i2m + mi_down * t_i2i),
            );
        }
    }

    for query_idx in 1..=query_length {
        for template_idx in 1..=template_length {
            let posterior = b_mm.get(query_idx, template_idx)
                * forward_mm.get(query_idx, template_idx)
                / p_forward;
            b_mm.set(query_idx, template_idx, posterior);
        }
    }

    let corner = b_mm.get(1, 1);
    if corner.is_nan() || corner.is_infinite() {
        return Err(AlignError::Numerical {
            stage: "backward",
            query_idx: 1,
            template_idx: 1,
            value: corner,
        });
    }

    debug!("backward {} x {}: posterior ready", query.name, template.name);
    if log_enabled!(Level::Trace) {
        trace!(
            "posterior {} x {}:\n{}",
            query.name,
            template.name,
            b_mm.dump_string()
        );
    }

    Ok(lattice.into_mm())
}
