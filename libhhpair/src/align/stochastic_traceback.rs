use log::debug;
use rand::Rng;

use crate::align::forward::{begin_allowed, ForwardMatrices, GapContents};
use crate::config::AlignmentConfig;
use crate::error::AlignError;
use crate::structs::{AlignmentStep, CellMask, PairState, Profile};

/// How the stochastic backtrace chooses among weighted candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PickStrategy {
    /// Always take the heaviest candidate, the earliest one on ties.
    Maximize,
    /// Draw a candidate with probability proportional to its weight.
    #[default]
    Sample,
}

impl PickStrategy {
    /// Returns the index of the chosen weight. Zero-weight candidates are
    /// never drawn unless every weight is zero, in which case the first
    /// candidate is returned.
    pub fn pick<R: Rng>(&self, weights: &[f64], rng: &mut R) -> usize {
        match self {
            PickStrategy::Maximize => {
                let mut best = 0;
                for (idx, &weight) in weights.iter().enumerate().skip(1) {
                    if weight > weights[best] {
                        best = idx;
                    }
                }
                best
            }
            PickStrategy::Sample => {
                let total: f64 = weights.iter().sum();
                if total.is_nan() || total <= 0.0 {
                    return 0;
                }

                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                let mut last_positive = 0;
                for (idx, &weight) in weights.iter().enumerate() {
                    if weight > 0.0 {
                        cumulative += weight;
                        last_positive = idx;
                        if target < cumulative {
                            return idx;
                        }
                    }
                }
                last_positive
            }
        }
    }
}

/// Chooses the end cell among the last row and the last column, weighted
/// by the unscaled Forward MM value.
fn pick_end<R: Rng>(
    forward: &ForwardMatrices,
    mask: &CellMask,
    strategy: PickStrategy,
    rng: &mut R,
) -> Option<(usize, usize)> {
    let query_length = forward.query_length();
    let template_length = forward.template_length();

    let mut cells = Vec::with_capacity(query_length + template_length);
    let mut weights = Vec::with_capacity(query_length + template_length);

    for template_idx in 1..=template_length {
        cells.push((query_length, template_idx));
        weights.push(forward.mm.get(query_length, template_idx));
    }

    // rescale earlier rows to the last row's cumulative scale
    let mut rescale = 1.0;
    for query_idx in (1..query_length).rev() {
        rescale *= forward.scale[query_idx + 1];
        cells.push((query_idx, template_length));
        weights.push(forward.mm.get(query_idx, template_length) * rescale);
    }

    for (weight, &(query_idx, template_idx)) in weights.iter_mut().zip(cells.iter()) {
        if mask.is_excluded(query_idx, template_idx) {
            *weight = 0.0;
        }
    }

    if !weights.iter().any(|&weight| weight > 0.0) {
        return None;
    }

    Some(cells[strategy.pick(&weights, rng)])
}

/// Draws one alignment from the Forward ensemble.
///
/// The gap matrices must still hold Forward values: running `backward` on
/// the same lattice first is a stage order error. The returned steps run
/// from the first aligned pair to the last; they are empty when every
/// boundary cell is excluded.
pub fn stochastic_traceback<R: Rng>(
    query: &Profile,
    template: &Profile,
    mask: &CellMask,
    config: &AlignmentConfig,
    forward: &ForwardMatrices,
    strategy: PickStrategy,
    rng: &mut R,
) -> Result<Vec<AlignmentStep>, AlignError> {
    if forward.gap_contents() != GapContents::Forward {
        return Err(AlignError::StageOrder {
            required: "forward gap matrices that backward has not overwritten",
            requested: "stochastic traceback",
        });
    }

    let Some((mut query_idx, mut template_idx)) = pick_end(forward, mask, strategy, rng) else {
        return Ok(vec![]);
    };

    let cumulative = forward.cumulative_scale();
    let f_mm = &forward.mm;
    let gaps = &forward.gaps;

    let mut state = PairState::MM;
    let mut steps = vec![];

    loop {
        if query_idx == 0 || template_idx == 0 {
            return Err(AlignError::Inconsistent {
                state,
                step: steps.len(),
                query_idx,
                template_idx,
            });
        }
        steps.push(AlignmentStep::new(state, query_idx, template_idx));

        let (i, j) = (query_idx, template_idx);
        let q = |idx| query.transition(idx, i - 1);
        let t = |idx| template.transition(idx, j - 1);

        let next = match state {
            PairState::MM => {
                let begin = if begin_allowed(i, j, mask, config) {
                    cumulative[i]
                } else {
                    0.0
                };
                let row_scale = forward.scale[i];
                let weights = [
                    begin,
                    row_scale
                        * f_mm.get(i - 1, j - 1)
                        * q(Profile::MATCH_TO_MATCH_IDX)
                        * t(Profile::MATCH_TO_MATCH_IDX),
                    row_scale
                        * gaps.gd.get(i - 1, j - 1)
                        * q(Profile::MATCH_TO_MATCH_IDX)
                        * t(Profile::DELETE_TO_MATCH_IDX),
                    row_scale
                        * gaps.im.get(i - 1, j - 1)
                        * q(Profile::INSERT_TO_MATCH_IDX)
                        * t(Profile::MATCH_TO_MATCH_IDX),
                    row_scale
                        * gaps.dg.get(i - 1, j - 1)
                        * q(Profile::DELETE_TO_MATCH_IDX)
                        * t(Profile::MATCH_TO_MATCH_IDX),
                    row_scale
                        * gaps.mi.get(i - 1, j - 1)
                        * q(Profile::MATCH_TO_MATCH_IDX)
                        * t(Profile::INSERT_TO_MATCH_IDX),
                ];
                const STATES: [PairState; 6] = [
                    PairState::Stop,
                    PairState::MM,
                    PairState::GD,
                    PairState::IM,
                    PairState::DG,
                    PairState::MI,
                ];
                query_idx -= 1;
                template_idx -= 1;
                STATES[strategy.pick(&weights, rng)]
            }
            PairState::GD => {
                let weights = [
                    f_mm.get(i, j - 1) * t(Profile::MATCH_TO_DELETE_IDX),
                    gaps.gd.get(i, j - 1) * t(Profile::DELETE_TO_DELETE_IDX),
                ];
                template_idx -= 1;
                [PairState::MM, PairState::GD][strategy.pick(&weights, rng)]
            }
            PairState::IM => {
                let q_here = |idx| query.transition(idx, i);
                let weights = [
                    f_mm.get(i, j - 1) * q_here(Profile::MATCH_TO_INSERT_IDX),
                    gaps.im.get(i, j - 1) * q_here(Profile::INSERT_TO_INSERT_IDX),
                ];
                template_idx -= 1;
                [PairState::MM, PairState::IM][strategy.pick(&weights, rng)]
            }
            PairState::DG => {
                let weights = [
                    f_mm.get(i - 1, j) * q(Profile::MATCH_TO_DELETE_IDX),
                    gaps.dg.get(i - 1, j) * q(Profile::DELETE_TO_DELETE_IDX),
                ];
                query_idx -= 1;
                [PairState::MM, PairState::DG][strategy.pick(&weights, rng)]
            }
            PairState::MI => {
                let t_here = |idx| template.transition(idx, j);
                let weights = [
                    f_mm.get(i - 1, j) * t_here(Profile::MATCH_TO_INSERT_IDX),
                    gaps.mi.get(i - 1, j) * t_here(Profile::INSERT_TO_INSERT_IDX),
                ];
                query_idx -= 1;
                [PairState::MM, PairState::MI][strategy.pick(&weights, rng)]
            }
            PairState::Stop => break,
        };

        if next == PairState::Stop {
            break;
        }
        state = next;
    }

    steps.reverse();

    debug!(
        "stochastic traceback {} x {}: {} steps",
        query.name,
        template.name,
        steps.len()
    );

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::backward::backward;
    use crate::align::forward::forward;
    use crate::align::traceback::path_score;
    use crate::config::AlignmentConfigBuilder;
    use crate::structs::profile::test_profiles::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn forward_for(
        query: &Profile,
        template: &Profile,
        config: &AlignmentConfig,
    ) -> anyhow::Result<(CellMask, ForwardMatrices)> {
        let mask = CellMask::new(query.length, template.length, false, config)?;
        let mut matrices = ForwardMatrices::new(query.length, template.length)?;
        forward(query, template, &mask, config, &mut matrices)?;
        Ok((mask, matrices))
    }

    #[test]
    fn test_pick_strategy() {
        let mut rng = Pcg64::seed_from_u64(7);
        assert_eq!(PickStrategy::Maximize.pick(&[1.0, 3.0, 3.0, 2.0], &mut rng), 1);
        assert_eq!(PickStrategy::Maximize.pick(&[0.0, 0.0], &mut rng), 0);
        assert_eq!(PickStrategy::Sample.pick(&[0.0, 0.0], &mut rng), 0);

        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[PickStrategy::Sample.pick(&[1.0, 0.0, 3.0], &mut rng)] += 1;
        }
        assert_eq!(counts[1], 0);
        assert!(counts[2] > 2 * counts[0]);
    }

    #[test]
    fn test_sampled_paths_are_valid() -> anyhow::Result<()> {
        let query = peaked("q", &[0, 1, 2, 3, 0, 1, 2], 4);
        let template = peaked("t", &[2, 0, 1, 3, 3, 0, 1, 2, 0], 4);
        let mut rng = Pcg64::seed_from_u64(42);

        for local in [true, false] {
            let config = AlignmentConfigBuilder::default().local(local).build()?;
            let (mask, matrices) = forward_for(&query, &template, &config)?;

            for _ in 0..50 {
                let steps = stochastic_traceback(
                    &query,
                    &template,
                    &mask,
                    &config,
                    &matrices,
                    PickStrategy::Sample,
                    &mut rng,
                )?;
                assert!(!steps.is_empty());
                assert_eq!(steps[0].state, PairState::MM);

                let last = steps[steps.len() - 1];
                assert!(last.query_idx == query.length || last.template_idx == template.length);

                // every move is a legal transition with nonzero probability
                let score = path_score(&query, &template, &mask, &config, &steps)?;
                assert!(score.is_finite());
            }
        }
        Ok(())
    }

    #[test]
    fn test_maximize_is_deterministic() -> anyhow::Result<()> {
        let query = peaked("q", &[0, 1, 2, 3, 0], 4);
        let template = peaked("t", &[1, 0, 1, 2, 3, 0], 4);
        let config = AlignmentConfig::default();
        let (mask, matrices) = forward_for(&query, &template, &config)?;

        let mut first_rng = Pcg64::seed_from_u64(1);
        let mut second_rng = Pcg64::seed_from_u64(2);
        let first = stochastic_traceback(
            &query,
            &template,
            &mask,
            &config,
            &matrices,
            PickStrategy::Maximize,
            &mut first_rng,
        )?;
        let second = stochastic_traceback(
            &query,
            &template,
            &mask,
            &config,
            &matrices,
            PickStrategy::Maximize,
            &mut second_rng,
        )?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_requires_forward_gaps() -> anyhow::Result<()> {
        let query = uniform("q", 4, 4);
        let config = AlignmentConfig::default();
        let (mask, mut matrices) = forward_for(&query, &query, &config)?;
        backward(&query, &query, &mask, &config, &mut matrices)?;

        let mut rng = Pcg64::seed_from_u64(3);
        let result = stochastic_traceback(
            &query,
            &query,
            &mask,
            &config,
            &matrices,
            PickStrategy::Sample,
            &mut rng,
        );
        assert!(matches!(result, Err(AlignError::StageOrder { .. })));
        Ok(())
    }
}
