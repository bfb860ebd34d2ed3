use log::debug;

use crate::config::AlignmentConfig;
use crate::error::AlignError;
use crate::structs::{CellMask, DpMatrix, PairState};
use crate::util::max4;

#[derive(Clone, Debug)]
pub struct MacMatrices {
    pub score: DpMatrix<f64>,
    pub backtrace: DpMatrix<PairState>,
}

impl MacMatrices {
    pub fn new(query_length: usize, template_length: usize) -> Result<Self, AlignError> {
        Ok(Self {
            score: DpMatrix::new("MAC score", query_length, template_length, -f64::INFINITY)?,
            backtrace: DpMatrix::new(
                "MAC backtrace",
                query_length,
                template_length,
                PairState::Stop,
            )?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MacResult {
    pub score: f64,
    pub end: Option<(usize, usize)>,
}

/// Finds the alignment maximizing the summed posterior match probability in
/// excess of `config.mact`.
///
/// Each matched pair scores its posterior minus `mact` and each unmatched
/// column costs `mact / 2`. The boundary row and column score -infinity, so
/// every alignment begins with a matched pair recorded as STOP.
pub fn maximum_accuracy(
    posterior: &DpMatrix<f64>,
    mask: &CellMask,
    config: &AlignmentConfig,
    mac: &mut MacMatrices,
) -> MacResult {
    let query_length = posterior.query_length;
    let template_length = posterior.template_length;
    let mact = config.mact;

    mac.score.fill(-f64::INFINITY);
    mac.backtrace.fill(PairState::Stop);

    let mut best_score = -f64::INFINITY;
    let mut end = None;

    for query_idx in 1..=query_length {
        for template_idx in 1..=template_length {
            if mask.is_excluded(query_idx, template_idx) {
                continue;
            }

            let match_score = posterior.get(query_idx, template_idx) - mact;
            let (score, state) = max4(
                match_score,
                mac.score.get(query_idx - 1, template_idx - 1) + match_score,
                mac.score.get(query_idx - 1, template_idx) - 0.5 * mact,
                mac.score.get(query_idx, template_idx - 1) - 0.5 * mact,
            );

            mac.score.set(query_idx, template_idx, score);
            mac.backtrace.set(query_idx, template_idx, state);

            if (config.local || query_idx == query_length) && score > best_score {
                best_score = score;
                end = Some((query_idx, template_idx));
            }
        }

        if !config.local {
            let score = mac.score.get(query_idx, template_length);
            if score > best_score {
                best_score = score;
                end = Some((query_idx, template_length));
            }
        }
    }

    debug!("mac: score {:.3}, end {:?}", best_score, end);

    MacResult {
        score: best_score,
        end,
    }
}
