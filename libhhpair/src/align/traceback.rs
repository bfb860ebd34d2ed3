use log::{debug, warn};

use crate::align::maximum_accuracy::MacMatrices;
use crate::align::scoring::{
    column_score, correlation_score, log_p_value, p_value, probability, PairScorer,
};
use crate::align::viterbi::{begin_score, BacktraceMatrices};
use crate::config::AlignmentConfig;
use crate::error::AlignError;
use crate::structs::{
    Alignment, AlignmentStep, BacktraceMode, CellMask, DpMatrix, PairState, Profile,
};

/// Follows the Viterbi predecessor matrices back from `end`.
///
/// STOP is the predecessor of the first aligned pair. Every visited cell
/// has its neighborhood excluded in `mask`. The returned steps run from the
/// first aligned pair to the last.
pub fn viterbi_traceback(
    backtrace: &BacktraceMatrices,
    end: (usize, usize),
    mask: &mut CellMask,
) -> Result<Vec<AlignmentStep>, AlignError> {
    let (mut query_idx, mut template_idx) = end;
    let mut state = PairState::MM;
    let mut steps = vec![];

    while state != PairState::Stop {
        if query_idx == 0 || template_idx == 0 {
            return Err(AlignError::Inconsistent {
                state,
                step: steps.len(),
                query_idx,
                template_idx,
            });
        }

        steps.push(AlignmentStep::new(state, query_idx, template_idx));
        mask.exclude_neighborhood(query_idx, template_idx);

        let predecessor = backtrace.predecessor(state, query_idx, template_idx);
        if state.consumes_query() {
            query_idx -= 1;
        }
        if state.consumes_template() {
            template_idx -= 1;
        }
        state = predecessor;
    }

    steps.reverse();
    if let Some(first) = steps.first_mut() {
        first.state = PairState::MM;
    }

    Ok(steps)
}

/// Follows the maximum accuracy matrix back from `end`.
///
/// STOP marks the first aligned pair itself, which is relabeled MM. When the
/// end cell records neither MM nor STOP, no alignment is reported.
pub fn mac_traceback(
    mac: &MacMatrices,
    posterior: &DpMatrix<f64>,
    end: (usize, usize),
    mask: &mut CellMask,
) -> Result<Vec<AlignmentStep>, AlignError> {
    let (mut query_idx, mut template_idx) = end;

    let end_state = mac.backtrace.get(query_idx, template_idx);
    if !matches!(end_state, PairState::MM | PairState::Stop) {
        warn!(
            "maximum accuracy alignment ends in state {} at ({}, {})",
            end_state, query_idx, template_idx
        );
        return Ok(vec![]);
    }

    let mut steps = vec![];
    loop {
        if query_idx == 0 || template_idx == 0 {
            return Err(AlignError::Inconsistent {
                state: mac.backtrace.get(query_idx, template_idx),
                step: steps.len(),
                query_idx,
                template_idx,
            });
        }

        let state = mac.backtrace.get(query_idx, template_idx);
        let mut step = AlignmentStep::new(state, query_idx, template_idx);
        if matches!(state, PairState::MM | PairState::Stop) {
            step.posterior = Some(posterior.get(query_idx, template_idx));
        }
        steps.push(step);
        mask.exclude_neighborhood(query_idx, template_idx);

        match state {
            PairState::MM => {
                query_idx -= 1;
                template_idx -= 1;
            }
            PairState::MI => query_idx -= 1,
            PairState::IM => template_idx -= 1,
            PairState::Stop => break,
            PairState::GD | PairState::DG => {
                return Err(AlignError::Inconsistent {
                    state,
                    step: steps.len(),
                    query_idx,
                    template_idx,
                })
            }
        }
    }

    steps.reverse();
    if let Some(first) = steps.first_mut() {
        first.state = PairState::MM;
    }

    Ok(steps)
}

/// Scores a path under the Viterbi model: begin score, transitions between
/// consecutive steps and the match scores of matched pairs.
///
/// The local length correction is not included.
pub fn path_score(
    query: &Profile,
    template: &Profile,
    mask: &CellMask,
    config: &AlignmentConfig,
    steps: &[AlignmentStep],
) -> Result<f64, AlignError> {
    let Some(first) = steps.first() else {
        return Ok(0.0);
    };

    let scorer = PairScorer::new(query, template, config);
    let mut score = begin_score(first.query_idx, first.template_idx, mask, config) as f64;

    for (step_idx, step) in steps.iter().enumerate() {
        if step_idx > 0 {
            let previous = &steps[step_idx - 1];
            score += transition_score(query, template, previous, step).ok_or(
                AlignError::Inconsistent {
                    state: step.state,
                    step: step_idx,
                    query_idx: step.query_idx,
                    template_idx: step.template_idx,
                },
            )? as f64;
        }

        if step.state == PairState::MM {
            score += scorer.match_score(query, step.query_idx, template, step.template_idx) as f64;
        }
    }

    Ok(score)
}

/// The log2 transition score from one step to the next, `None` when the
/// move is not allowed.
fn transition_score(
    query: &Profile,
    template: &Profile,
    from: &AlignmentStep,
    to: &AlignmentStep,
) -> Option<f32> {
    let (i, j) = (to.query_idx, to.template_idx);

    let moved_query = usize::from(to.state.consumes_query());
    let moved_template = usize::from(to.state.consumes_template());
    if from.query_idx + moved_query != i || from.template_idx + moved_template != j {
        return None;
    }

    let q = |idx, column| query.transition_score(idx, column);
    let t = |idx, column| template.transition_score(idx, column);

    let score = match (to.state, from.state) {
        (PairState::MM, PairState::MM) => {
            q(Profile::MATCH_TO_MATCH_IDX, i - 1) + t(Profile::MATCH_TO_MATCH_IDX, j - 1)
        }
        (PairState::MM, PairState::GD) => {
            q(Profile::MATCH_TO_MATCH_IDX, i - 1) + t(Profile::DELETE_TO_MATCH_IDX, j - 1)
        }
        (PairState::MM, PairState::IM) => {
            q(Profile::INSERT_TO_MATCH_IDX, i - 1) + t(Profile::MATCH_TO_MATCH_IDX, j - 1)
        }
        (PairState::MM, PairState::DG) => {
            q(Profile::DELETE_TO_MATCH_IDX, i - 1) + t(Profile::MATCH_TO_MATCH_IDX, j - 1)
        }
        (PairState::MM, PairState::MI) => {
            q(Profile::MATCH_TO_MATCH_IDX, i - 1) + t(Profile::INSERT_TO_MATCH_IDX, j - 1)
        }
        (PairState::GD, PairState::MM) => t(Profile::MATCH_TO_DELETE_IDX, j - 1),
        (PairState::GD, PairState::GD) => t(Profile::DELETE_TO_DELETE_IDX, j - 1),
        (PairState::IM, PairState::MM) => {
            q(Profile::MATCH_TO_INSERT_IDX, i) + t(Profile::MATCH_TO_MATCH_IDX, j - 1)
        }
        (PairState::IM, PairState::IM) => {
            q(Profile::INSERT_TO_INSERT_IDX, i) + t(Profile::MATCH_TO_MATCH_IDX, j - 1)
        }
        (PairState::DG, PairState::MM) => q(Profile::MATCH_TO_DELETE_IDX, i - 1),
        (PairState::DG, PairState::DG) => q(Profile::DELETE_TO_DELETE_IDX, i - 1),
        (PairState::MI, PairState::MM) => {
            q(Profile::MATCH_TO_MATCH_IDX, i - 1) + t(Profile::MATCH_TO_INSERT_IDX, j)
        }
        (PairState::MI, PairState::MI) => {
            q(Profile::MATCH_TO_MATCH_IDX, i - 1) + t(Profile::INSERT_TO_INSERT_IDX, j)
        }
        _ => return None,
    };

    Some(score)
}

/// Turns a backtraced path into a scored alignment.
///
/// `score` is the raw score of the path in bits; the correlation bonus is
/// added here and the statistics follow from the template's extreme value
/// parameters.
pub fn finish_alignment(
    query: &Profile,
    template: &Profile,
    config: &AlignmentConfig,
    mode: BacktraceMode,
    repeat_idx: usize,
    mut steps: Vec<AlignmentStep>,
    score: f64,
) -> Alignment {
    let (Some(first), Some(last)) = (steps.first().copied(), steps.last().copied()) else {
        return Alignment::empty(mode, repeat_idx);
    };

    let scorer = PairScorer::new(query, template, config);
    for step in steps.iter_mut() {
        if step.state == PairState::MM {
            step.match_score = column_score(query, step.query_idx, template, step.template_idx);
            step.ss_score = scorer.ss(query, step.query_idx, template, step.template_idx);
        }
    }

    let match_scores: Vec<f32> = steps.iter().map(|step| step.match_score).collect();
    let correlation = config.corr as f64 * correlation_score(&match_scores);
    let ss_score: f64 = steps.iter().map(|step| step.ss_score as f64).sum();
    let matched_cols = steps
        .iter()
        .filter(|step| step.state == PairState::MM)
        .count();

    let sum_of_probs = match mode {
        BacktraceMode::MaximumAccuracy => Some(
            steps
                .iter()
                .filter(|step| match &template.ss_dssp {
                    Some(dssp) => dssp[step.template_idx] > 0,
                    None => true,
                })
                .filter_map(|step| step.posterior)
                .sum::<f64>(),
        ),
        BacktraceMode::Viterbi | BacktraceMode::Stochastic => None,
    };

    let score = score + correlation;
    let p_value = p_value(score, template.lambda, template.mu);
    let log_p_value = log_p_value(score, template.lambda, template.mu);

    debug!(
        "{} alignment {} x {}: {} steps, {} matched, score {:.3}",
        mode,
        query.name,
        template.name,
        steps.len(),
        matched_cols,
        score
    );

    Alignment {
        mode,
        repeat_idx,
        query_start: first.query_idx,
        query_end: last.query_idx,
        template_start: first.template_idx,
        template_end: last.template_idx,
        steps,
        matched_cols,
        score,
        ss_score,
        correlation,
        p_value,
        log_p_value,
        e_value: p_value * config.database_size as f64,
        probability: probability(log_p_value, config.local, scorer.uses_ss()),
        sum_of_probs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::viterbi::viterbi;
    use crate::config::AlignmentConfigBuilder;
    use crate::structs::profile::test_profiles::*;

    fn align_to_itself(
        profile: &Profile,
        config: &AlignmentConfig,
    ) -> anyhow::Result<(Vec<AlignmentStep>, f64, CellMask)> {
        let mut mask = CellMask::new(profile.length, profile.length, false, config)?;
        let mut backtrace = BacktraceMatrices::new(profile.length, profile.length)?;

        let result = viterbi(profile, profile, &mask, config, &mut backtrace);
        let end = result.end.ok_or_else(|| anyhow::anyhow!("no alignment"))?;
        let steps = viterbi_traceback(&backtrace, end, &mut mask)?;
        Ok((steps, result.score, mask))
    }

    #[test]
    fn test_identity_round_trip() -> anyhow::Result<()> {
        let profile = uniform_gapless("u", 3, 4);
        let config = AlignmentConfigBuilder::default()
            .local(false)
            .shift(0.0)
            .end_gap_query(0.0)
            .end_gap_template(0.0)
            .build()?;

        let (steps, score, _) = align_to_itself(&profile, &config)?;
        let cells: Vec<_> = steps
            .iter()
            .map(|step| (step.state, step.query_idx, step.template_idx))
            .collect();
        assert_eq!(
            cells,
            vec![
                (PairState::MM, 1, 1),
                (PairState::MM, 2, 2),
                (PairState::MM, 3, 3)
            ]
        );

        let alignment =
            finish_alignment(&profile, &profile, &config, BacktraceMode::Viterbi, 0, steps, score);
        assert_eq!(alignment.matched_cols, 3);
        assert_eq!(alignment.score, 0.0);
        Ok(())
    }

    #[test]
    fn test_identity_alignment_statistics() -> anyhow::Result<()> {
        let profile = peaked("p", &[0, 1, 2, 3, 0], 4);
        let config = AlignmentConfigBuilder::default().local(false).build()?;

        let (steps, score, _) = align_to_itself(&profile, &config)?;
        assert_eq!(
            steps.iter().map(|step| step.query_idx).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(steps.iter().all(|step| step.query_idx == step.template_idx));

        let alignment =
            finish_alignment(&profile, &profile, &config, BacktraceMode::Viterbi, 0, steps, score);
        assert_eq!(alignment.matched_cols, 5);
        assert_eq!((alignment.query_start, alignment.query_end), (1, 5));
        assert_eq!((alignment.template_start, alignment.template_end), (1, 5));

        // equal match scores correlated over lags 1..=4
        let column = column_score(&profile, 1, &profile, 1) as f64;
        let correlation = config.corr as f64 * column * column * (4.0 + 3.0 + 2.0 + 1.0);
        assert!((alignment.correlation - correlation).abs() < 1e-4);
        assert!((alignment.score - score - alignment.correlation).abs() < 1e-9);
        assert!(alignment.e_value > 0.0);
        assert!(alignment.p_value < 1.0);
        Ok(())
    }

    #[test]
    fn test_viterbi_score_matches_path_score() -> anyhow::Result<()> {
        let query = peaked("q", &[0, 1, 2, 3, 0, 1, 1, 2], 4);
        let template = peaked("t", &[0, 1, 3, 3, 3, 2, 3, 0, 1], 4);

        for local in [true, false] {
            let config = AlignmentConfigBuilder::default()
                .local(local)
                .shift(1.0)
                .end_gap_query(0.5)
                .end_gap_template(0.25)
                .build()?;
            let mut mask = CellMask::new(query.length, template.length, false, &config)?;
            let mut backtrace = BacktraceMatrices::new(query.length, template.length)?;

            let result = viterbi(&query, &template, &mask, &config, &mut backtrace);
            let end = result.end.ok_or_else(|| anyhow::anyhow!("no alignment"))?;
            let steps = viterbi_traceback(&backtrace, end, &mut mask)?;
            let rescored = path_score(&query, &template, &mask, &config, &steps)?;

            let correction = if local {
                crate::align::scoring::local_length_correction(
                    query.length,
                    template.length,
                    false,
                    config.length_lambda,
                )
            } else {
                0.0
            };
            assert!(
                (result.score - correction - rescored).abs() < 1e-3,
                "local {local}: {} vs {}",
                result.score - correction,
                rescored
            );
        }
        Ok(())
    }

    #[test]
    fn test_traceback_masks_path() -> anyhow::Result<()> {
        let profile = peaked("p", &[0, 1, 2, 3, 0, 1], 4);
        let config = AlignmentConfigBuilder::default().local(false).build()?;

        let (steps, _, mask) = align_to_itself(&profile, &config)?;
        assert_eq!(steps.len(), 6);
        for step in &steps {
            assert!(mask.is_excluded(step.query_idx, step.template_idx));
        }
        assert!(mask.is_excluded(1, 3));
        assert!(mask.is_excluded(3, 1));
        Ok(())
    }

    #[test]
    fn test_corrupt_backtrace_is_inconsistent() -> anyhow::Result<()> {
        let config = AlignmentConfig::default();
        let mut mask = CellMask::new(3, 3, false, &config)?;
        let mut backtrace = BacktraceMatrices::new(3, 3)?;
        // a diagonal that never stops
        for idx in 1..=3 {
            backtrace.mm.set(idx, idx, PairState::MM);
        }

        let result = viterbi_traceback(&backtrace, (3, 3), &mut mask);
        assert!(matches!(
            result,
            Err(AlignError::Inconsistent {
                query_idx: 0,
                template_idx: 0,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_mac_traceback_relabels_stop() -> anyhow::Result<()> {
        let config = AlignmentConfigBuilder::default()
            .min_overlap(Some(0))
            .build()?;
        let mut posterior = DpMatrix::new("posterior", 3, 3, 0.0)?;
        let mut mac = MacMatrices::new(3, 3)?;
        mac.backtrace.set(1, 1, PairState::Stop);
        mac.backtrace.set(2, 1, PairState::MI);
        mac.backtrace.set(3, 2, PairState::MM);
        posterior.set(1, 1, 0.5);
        posterior.set(3, 2, 0.75);

        let mut mask = CellMask::new(3, 3, false, &config)?;
        let steps = mac_traceback(&mac, &posterior, (3, 2), &mut mask)?;
        let states: Vec<_> = steps.iter().map(|step| step.state).collect();
        assert_eq!(states, vec![PairState::MM, PairState::MI, PairState::MM]);
        assert_eq!(steps[0].posterior, Some(0.5));
        assert_eq!(steps[1].posterior, None);

        let alignment = finish_alignment(
            &uniform("q", 3, 4),
            &uniform("t", 3, 4),
            &config,
            BacktraceMode::MaximumAccuracy,
            0,
            steps,
            1.0,
        );
        assert_eq!(alignment.matched_cols, 2);
        assert_eq!(alignment.sum_of_probs, Some(1.25));

        mac.backtrace.set(3, 3, PairState::IM);
        assert!(mac_traceback(&mac, &posterior, (3, 3), &mut mask)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_path_score_rejects_illegal_moves() -> anyhow::Result<()> {
        let profile = uniform("u", 4, 4);
        let config = AlignmentConfig::default();
        let mask = CellMask::new(4, 4, false, &config)?;

        let steps = vec![
            AlignmentStep::new(PairState::MM, 1, 1),
            AlignmentStep::new(PairState::MM, 3, 3),
        ];
        assert!(path_score(&profile, &profile, &mask, &config, &steps).is_err());

        let steps = vec![
            AlignmentStep::new(PairState::MM, 1, 1),
            AlignmentStep::new(PairState::GD, 1, 2),
            AlignmentStep::new(PairState::IM, 1, 3),
        ];
        assert!(path_score(&profile, &profile, &mask, &config, &steps).is_err());
        Ok(())
    }
}
