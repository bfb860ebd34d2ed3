use log::debug;

use crate::align::scoring::{local_length_correction, PairScorer};
use crate::config::AlignmentConfig;
use crate::error::AlignError;
use crate::structs::{CellMask, DpMatrix, PairState, Profile};
use crate::util::{max2, max6};

/// Per-state predecessor matrices filled by `viterbi`.
#[derive(Clone, Debug)]
pub struct BacktraceMatrices {
    pub mm: DpMatrix<PairState>,
    pub gd: DpMatrix<PairState>,
    pub im: DpMatrix<PairState>,
    pub dg: DpMatrix<PairState>,
    pub mi: DpMatrix<PairState>,
}

impl BacktraceMatrices {
    pub fn new(query_length: usize, template_length: usize) -> Result<Self, AlignError> {
        let matrix = |name| DpMatrix::new(name, query_length, template_length, PairState::Stop);
        Ok(Self {
            mm: matrix("viterbi MM backtrace")?,
            gd: matrix("viterbi GD backtrace")?,
            im: matrix("viterbi IM backtrace")?,
            dg: matrix("viterbi DG backtrace")?,
            mi: matrix("viterbi MI backtrace")?,
        })
    }

    /// The predecessor recorded for `state` at a cell.
    pub fn predecessor(
        &self,
        state: PairState,
        query_idx: usize,
        template_idx: usize,
    ) -> PairState {
        let matrix = match state {
            PairState::MM => &self.mm,
            PairState::GD => &self.gd,
            PairState::IM => &self.im,
            PairState::DG => &self.dg,
            PairState::MI => &self.mi,
            PairState::Stop => return PairState::Stop,
        };
        matrix.get(query_idx, template_idx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViterbiResult {
    /// The best score in bits, local length correction included
    pub score: f64,
    /// The cell where the best alignment ends, `None` when every cell is
    /// excluded
    pub end: Option<(usize, usize)>,
}

/// One query row of Viterbi scores for every state.
struct ScoreRow {
    mm: Vec<f32>,
    gd: Vec<f32>,
    im: Vec<f32>,
    dg: Vec<f32>,
    mi: Vec<f32>,
}

impl ScoreRow {
    fn new(template_length: usize) -> Self {
        let row = vec![-f32::INFINITY; template_length + 1];
        Self {
            mm: row.clone(),
            gd: row.clone(),
            im: row.clone(),
            dg: row.clone(),
            mi: row,
        }
    }

    fn reset(&mut self) {
        for row in [
            &mut self.mm,
            &mut self.gd,
            &mut self.im,
            &mut self.dg,
            &mut self.mi,
        ] {
            row.iter_mut().for_each(|score| *score = -f32::INFINITY);
        }
    }
}

/// The score of starting an alignment at a cell.
///
/// Local alignments may start anywhere; global alignments start in the first
/// query row or the first allowed template column and pay for the end gaps
/// they skip.
#[inline]
pub fn begin_score(
    query_idx: usize,
    template_idx: usize,
    mask: &CellMask,
    config: &AlignmentConfig,
) -> f32 {
    if config.local {
        0.0
    } else if query_idx == 1 {
        -((template_idx - 1) as f32) * config.end_gap_template
    } else if template_idx == mask.band_start(query_idx) {
        -((query_idx - 1) as f32) * config.end_gap_query
    } else {
        -f32::INFINITY
    }
}

/// Fills the Viterbi backtrace matrices and finds the best alignment end.
///
/// Excluded cells score -infinity in every state. Ties between predecessors
/// go to the earlier of MM, GD, IM, DG, MI; gap states prefer opening from MM.
pub fn viterbi(
    query: &Profile,
    template: &Profile,
    mask: &CellMask,
    config: &AlignmentConfig,
    backtrace: &mut BacktraceMatrices,
) -> ViterbiResult {
    let query_length = query.length;
    let template_length = template.length;
    let scorer = PairScorer::new(query, template, config);

    let mut prev = ScoreRow::new(template_length);
    let mut curr = ScoreRow::new(template_length);

    let mut best_score = -f32::INFINITY;
    let mut end = None;

    for query_idx in 1..=query_length {
        curr.reset();

        let q_m2m = query.transition_score(Profile::MATCH_TO_MATCH_IDX, query_idx - 1);
        let q_i2m = query.transition_score(Profile::INSERT_TO_MATCH_IDX, query_idx - 1);
        let q_d2m = query.transition_score(Profile::DELETE_TO_MATCH_IDX, query_idx - 1);
        let q_m2d = query.transition_score(Profile::MATCH_TO_DELETE_IDX, query_idx - 1);
        let q_d2d = query.transition_score(Profile::DELETE_TO_DELETE_IDX, query_idx - 1);
        let q_m2i = query.transition_score(Profile::MATCH_TO_INSERT_IDX, query_idx);
        let q_i2i = query.transition_score(Profile::INSERT_TO_INSERT_IDX, query_idx);

        for template_idx in mask.band_start(query_idx)..=template_length {
            if mask.is_excluded(query_idx, template_idx) {
                continue;
            }

            let t_prev = template_idx - 1;
            let t_m2m = template.transition_score(Profile::MATCH_TO_MATCH_IDX, t_prev);

            // match-match
            let (mm_score, mm_state) = max6(
                begin_score(query_idx, template_idx, mask, config),
                [
                    prev.mm[t_prev] + q_m2m + t_m2m,
                    prev.gd[t_prev]
                        + q_m2m
                        + template.transition_score(Profile::DELETE_TO_MATCH_IDX, t_prev),
                    prev.im[t_prev] + q_i2m + t_m2m,
                    prev.dg[t_prev] + q_d2m + t_m2m,
                    prev.mi[t_prev]
                        + q_m2m
                        + template.transition_score(Profile::INSERT_TO_MATCH_IDX, t_prev),
                ],
            );
            curr.mm[template_idx] =
                mm_score + scorer.match_score(query, query_idx, template, template_idx);
            backtrace.mm.set(query_idx, template_idx, mm_state);

            // query gap against template match
            let (gd_score, gd_state) = max2(
                (
                    curr.mm[t_prev]
                        + template.transition_score(Profile::MATCH_TO_DELETE_IDX, t_prev),
                    PairState::MM,
                ),
                (
                    curr.gd[t_prev]
                        + template.transition_score(Profile::DELETE_TO_DELETE_IDX, t_prev),
                    PairState::GD,
                ),
            );
            curr.gd[template_idx] = gd_score;
            backtrace.gd.set(query_idx, template_idx, gd_state);

            // query insert against template match
            let (im_score, im_state) = max2(
                (curr.mm[t_prev] + q_m2i + t_m2m, PairState::MM),
                (curr.im[t_prev] + q_i2i + t_m2m, PairState::IM),
            );
            curr.im[template_idx] = im_score;
            backtrace.im.set(query_idx, template_idx, im_state);

            // query match against template gap
            let (dg_score, dg_state) = max2(
                (prev.mm[template_idx] + q_m2d, PairState::MM),
                (prev.dg[template_idx] + q_d2d, PairState::DG),
            );
            curr.dg[template_idx] = dg_score;
            backtrace.dg.set(query_idx, template_idx, dg_state);

            // query match against template insert
            let (mi_score, mi_state) = max2(
                (
                    prev.mm[template_idx]
                        + q_m2m
                        + template.transition_score(Profile::MATCH_TO_INSERT_IDX, template_idx),
                    PairState::MM,
                ),
                (
                    prev.mi[template_idx]
                        + q_m2m
                        + template.transition_score(Profile::INSERT_TO_INSERT_IDX, template_idx),
                    PairState::MI,
                ),
            );
            curr.mi[template_idx] = mi_score;
            backtrace.mi.set(query_idx, template_idx, mi_state);

            if (config.local || query_idx == query_length) && curr.mm[template_idx] > best_score {
                best_score = curr.mm[template_idx];
                end = Some((query_idx, template_idx));
            }
        }

        if !config.local && curr.mm[template_length] > best_score {
            best_score = curr.mm[template_length];
            end = Some((query_idx, template_length));
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    // global ties go to the corner, which leaves no end gap
    let corner = prev.mm[template_length];
    if !config.local && corner > -f32::INFINITY && corner >= best_score {
        best_score = corner;
        end = Some((query_length, template_length));
    }

    let mut score = best_score as f64;
    if config.local && end.is_some() {
        score += local_length_correction(
            query_length,
            template_length,
            mask.is_self_comparison(),
            config.length_lambda,
        );
    }

    debug!(
        "viterbi {} x {}: score {:.3}, end {:?}",
        query.name, template.name, score, end
    );

    ViterbiResult { score, end }
}
