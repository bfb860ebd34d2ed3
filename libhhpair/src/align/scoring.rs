use lazy_static::lazy_static;

use crate::config::{AlignmentConfig, SecondaryStructureMode};
use crate::structs::Profile;

const NUM_DSSP: usize = Profile::NUM_DSSP_STATES as usize;
const NUM_PRED: usize = Profile::NUM_PREDICTED_STATES as usize;
const NUM_CONF: usize = Profile::MAX_CONFIDENCE as usize + 1;

/// Maps the DSSP states "-HECTSGB" onto the predicted states "-HEC".
const DSSP_TO_PREDICTED: [usize; NUM_DSSP] = [0, 1, 2, 3, 3, 3, 1, 2];

/// The probability that a prediction made with `confidence` is right.
fn prediction_accuracy(confidence: usize) -> f64 {
    (1.0 + 1.8 * confidence as f64 / Profile::MAX_CONFIDENCE as f64) / 3.0
}

/// Log-odds (bits) of a three-state event observed with probability
/// `p_agree` against a uniform background.
fn agreement_score(p_agree: f64, agree: bool) -> f32 {
    if agree {
        (3.0 * p_agree).log2() as f32
    } else {
        (1.5 * (1.0 - p_agree)).log2() as f32
    }
}

lazy_static! {
    /// Scores of an observed state against a (predicted state, confidence).
    pub static ref SS_OBSERVED_PREDICTED: [[[f32; NUM_CONF]; NUM_PRED]; NUM_DSSP] = {
        let mut table = [[[0.0; NUM_CONF]; NUM_PRED]; NUM_DSSP];
        for (observed, row) in table.iter_mut().enumerate().skip(1) {
            for (predicted, scores) in row.iter_mut().enumerate().skip(1) {
                for (confidence, score) in scores.iter_mut().enumerate() {
                    let agree = DSSP_TO_PREDICTED[observed] == predicted;
                    *score = agreement_score(prediction_accuracy(confidence), agree);
                }
            }
        }
        table
    };

    /// Scores of two (predicted state, confidence) pairs against each other.
    pub static ref SS_PREDICTED_PREDICTED: [[[[f32; NUM_CONF]; NUM_PRED]; NUM_CONF]; NUM_PRED] = {
        let mut table = [[[[0.0; NUM_CONF]; NUM_PRED]; NUM_CONF]; NUM_PRED];
        for (first, first_row) in table.iter_mut().enumerate().skip(1) {
            for (first_conf, second_table) in first_row.iter_mut().enumerate() {
                for (second, scores) in second_table.iter_mut().enumerate().skip(1) {
                    for (second_conf, score) in scores.iter_mut().enumerate() {
                        let p1 = prediction_accuracy(first_conf);
                        let p2 = prediction_accuracy(second_conf);
                        let p_agree = p1 * p2 + (1.0 - p1) * (1.0 - p2) / 2.0;
                        *score = agreement_score(p_agree, first == second);
                    }
                }
            }
        }
        table
    };
}

/// Resolves `Auto` and drops pairings whose annotations are missing.
pub fn resolve_ss_mode(
    mode: SecondaryStructureMode,
    query: &Profile,
    template: &Profile,
) -> SecondaryStructureMode {
    use SecondaryStructureMode::*;

    let usable = |mode: SecondaryStructureMode| match mode {
        QueryPredictedTemplateObserved => query.has_predicted_ss() && template.has_observed_ss(),
        QueryObservedTemplatePredicted => query.has_observed_ss() && template.has_predicted_ss(),
        BothPredicted => query.has_predicted_ss() && template.has_predicted_ss(),
        Off | Auto => false,
    };

    match mode {
        Auto => [
            QueryPredictedTemplateObserved,
            QueryObservedTemplatePredicted,
            BothPredicted,
        ]
        .into_iter()
        .find(|&mode| usable(mode))
        .unwrap_or(Off),
        mode if usable(mode) => mode,
        _ => Off,
    }
}

/// The secondary structure score (bits, weighted) of pairing two columns
/// under a resolved mode.
#[inline]
pub fn ss_score(
    query: &Profile,
    query_idx: usize,
    template: &Profile,
    template_idx: usize,
    mode: SecondaryStructureMode,
    weight: f32,
) -> f32 {
    use SecondaryStructureMode::*;

    let at = |annotation: &Option<Vec<u8>>, idx: usize| {
        annotation.as_ref().map_or(0, |values| values[idx] as usize)
    };

    let score = match mode {
        QueryPredictedTemplateObserved => {
            SS_OBSERVED_PREDICTED[at(&template.ss_dssp, template_idx)]
                [at(&query.ss_pred, query_idx)][at(&query.ss_conf, query_idx)]
        }
        QueryObservedTemplatePredicted => {
            SS_OBSERVED_PREDICTED[at(&query.ss_dssp, query_idx)]
                [at(&template.ss_pred, template_idx)][at(&template.ss_conf, template_idx)]
        }
        BothPredicted => {
            SS_PREDICTED_PREDICTED[at(&query.ss_pred, query_idx)][at(&query.ss_conf, query_idx)]
                [at(&template.ss_pred, template_idx)][at(&template.ss_conf, template_idx)]
        }
        Off | Auto => 0.0,
    };

    weight * score
}

/// The odds of both columns emitting the same symbol against the query's
/// null model, `sum_a q[a] * t[a] / f[a]`.
#[inline]
pub fn column_probability(
    query: &Profile,
    query_idx: usize,
    template: &Profile,
    template_idx: usize,
) -> f64 {
    query
        .emission(query_idx)
        .iter()
        .zip(template.emission(template_idx))
        .zip(query.background())
        .map(|((q, t), f)| q * t / f)
        .sum()
}

/// The log2 odds column score of pairing two columns.
#[inline]
pub fn column_score(
    query: &Profile,
    query_idx: usize,
    template: &Profile,
    template_idx: usize,
) -> f32 {
    column_probability(query, query_idx, template, template_idx).log2() as f32
}

/// The score correction applied to local alignments for the size of the
/// search space.
pub fn local_length_correction(
    query_length: usize,
    template_length: usize,
    self_comparison: bool,
    lambda: f64,
) -> f64 {
    let factor = if self_comparison { 0.5 } else { 1.0 };
    let search_space = factor * template_length as f64 * query_length as f64 / (200.0 * 200.0);
    -search_space.ln() / lambda - 11.2
}

/// The autocorrelation of the per-step match scores over lags 1..=4.
pub fn correlation_score(match_scores: &[f32]) -> f64 {
    match_scores
        .iter()
        .enumerate()
        .map(|(step, &score)| {
            match_scores[step + 1..]
                .iter()
                .take(4)
                .map(|&other| score as f64 * other as f64)
                .sum::<f64>()
        })
        .sum()
}

/// The P-value of a score under a Gumbel distribution.
pub fn p_value(score: f64, lambda: f64, mu: f64) -> f64 {
    let h = lambda * (score - mu);
    if h > 10.0 {
        (-h).exp()
    } else {
        -(-(-h).exp()).exp_m1()
    }
}

/// The natural log of `p_value`, kept accurate in both tails.
pub fn log_p_value(score: f64, lambda: f64, mu: f64) -> f64 {
    let h = lambda * (score - mu);
    if h > 10.0 {
        -h
    } else if h < -2.5 {
        -(-(-h).exp()).exp()
    } else {
        (-(-(-h).exp()).exp_m1()).ln()
    }
}

/// The probability (in percent) that a hit is a true homolog, given its log
/// P-value.
pub fn probability(log_p_value: f64, local: bool, secondary_structure: bool) -> f64 {
    let (a, b, c, d) = match (local, secondary_structure) {
        (true, true) => (4000.0f64.sqrt(), 5.0, 0.15f64.sqrt(), 68.0),
        (true, false) => (6600.0f64.sqrt(), 5.0, 0.095f64.sqrt(), 60.0),
        (false, true) => (4000.0f64.sqrt(), 6.0, 0.13f64.sqrt(), 68.0),
        (false, false) => (6000.0f64.sqrt(), 5.0, 0.10f64.sqrt(), 68.0),
    };

    let s = (-log_p_value).max(0.0);
    let t = a * (-s / b).exp() + c * (-s / d).exp();
    100.0 / (1.0 + t * t)
}

/// Everything needed to score a matched pair under a configuration.
#[derive(Clone, Copy, Debug)]
pub struct PairScorer {
    pub ss_mode: SecondaryStructureMode,
    pub ss_weight: f32,
    pub shift: f32,
}

impl PairScorer {
    pub fn new(query: &Profile, template: &Profile, config: &AlignmentConfig) -> Self {
        Self {
            ss_mode: resolve_ss_mode(config.ss_mode, query, template),
            ss_weight: config.ss_weight,
            shift: config.shift,
        }
    }

    pub fn uses_ss(&self) -> bool {
        self.ss_mode != SecondaryStructureMode::Off
    }

    #[inline]
    pub fn ss(
        &self,
        query: &Profile,
        query_idx: usize,
        template: &Profile,
        template_idx: usize,
    ) -> f32 {
        if self.uses_ss() {
            ss_score(query, query_idx, template, template_idx, self.ss_mode, self.ss_weight)
        } else {
            0.0
        }
    }

    /// The log2 score of a matched pair, secondary structure and shift
    /// included.
    #[inline]
    pub fn match_score(
        &self,
        query: &Profile,
        query_idx: usize,
        template: &Profile,
        template_idx: usize,
    ) -> f32 {
        column_score(query, query_idx, template, template_idx)
            + self.ss(query, query_idx, template, template_idx)
            + self.shift
    }

    /// The linear-space match emission, 2 raised to `match_score`.
    #[inline]
    pub fn match_probability(
        &self,
        query: &Profile,
        query_idx: usize,
        template: &Profile,
        template_idx: usize,
    ) -> f64 {
        let bonus = self.ss(query, query_idx, template, template_idx) + self.shift;
        column_probability(query, query_idx, template, template_idx) * (bonus as f64).exp2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::profile::test_profiles::*;

    #[test]
    fn test_p_value_is_decreasing() {
        let (lambda, mu) = (0.3, 3.0);
        let mut previous = f64::INFINITY;
        for step in -400..400 {
            let score = step as f64 * 0.25;
            let p = p_value(score, lambda, mu);
            assert!(p < previous || (p == previous && p == 1.0), "{score}: {p} >= {previous}");
            assert!((0.0..=1.0).contains(&p));
            previous = p;
        }
    }

    #[test]
    fn test_p_value_formula() {
        let (lambda, mu) = (0.3, 3.0);
        assert!((p_value(mu, lambda, mu) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);

        let median = mu - 2.0f64.ln().ln() / lambda;
        assert!((p_value(median, lambda, mu) - 0.5).abs() < 1e-12);

        // tail approximation
        let far = mu + 50.0 / lambda;
        assert!((p_value(far, lambda, mu) - (-50.0f64).exp()).abs() < 1e-30);
    }

    #[test]
    fn test_log_p_value_matches_p_value() {
        let (lambda, mu) = (0.3, 3.0);
        for step in -40..120 {
            let score = step as f64 * 0.5;
            let expected = p_value(score, lambda, mu).ln();
            let actual = log_p_value(score, lambda, mu);
            assert!((expected - actual).abs() < 1e-3, "{score}: {expected} vs {actual}");
        }
        assert!((log_p_value(mu + 100.0 / lambda, lambda, mu) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_probability_bounds() {
        for &(local, ss) in &[(true, true), (true, false), (false, true), (false, false)] {
            let mut previous = 0.0;
            for log_p in (0..200).map(|x| -(x as f64)) {
                let probability = probability(log_p, local, ss);
                assert!(probability > previous);
                assert!(probability <= 100.0);
                previous = probability;
            }
        }
        assert!(probability(-1000.0, true, false) > 99.9);
        assert!(probability(0.0, true, false) < 0.1);
    }

    #[test]
    fn test_length_correction() {
        let full = local_length_correction(200, 200, false, 0.388);
        assert!((full + 11.2).abs() < 1e-12);

        let halved = local_length_correction(200, 200, true, 0.388);
        assert!((halved - full - 2.0f64.ln() / 0.388).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_score() {
        assert_eq!(correlation_score(&[]), 0.0);
        assert_eq!(correlation_score(&[2.0]), 0.0);
        // pairs at lags 1..=4 only
        assert_eq!(correlation_score(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]), 4.0 + 4.0 + 3.0 + 2.0 + 1.0);
        assert_eq!(correlation_score(&[2.0, 0.0, 3.0]), 6.0);
    }

    #[test]
    fn test_column_score() -> anyhow::Result<()> {
        // a uniform column is indistinguishable from the null model
        let query = uniform("q", 2, 4);
        let template = peaked("t", &[0, 1], 4);
        assert!(column_score(&query, 1, &template, 2).abs() < 1e-6);

        let identical = peaked("p", &[0, 1], 4);
        assert!(column_score(&template, 1, &identical, 1) > 1.5);
        assert!(column_score(&template, 1, &identical, 2) < -1.5);

        // rare symbols are worth more
        let mut data = data_from_emissions("skewed", vec![vec![0.0, 0.0, 1.0, 0.0]]);
        data.background = Some(vec![0.4, 0.4, 0.1, 0.1]);
        let skewed = Profile::new(data)?;
        let expected = (0.9f64 / 0.1).log2() as f32;
        assert!((column_score(&skewed, 1, &peaked("p", &[2], 4), 1) - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_ss_tables() {
        // no information at confidence 0
        assert!(SS_OBSERVED_PREDICTED[1][1][0].abs() < 1e-6);
        assert!(SS_OBSERVED_PREDICTED[1][1][9] > 1.0);
        assert!(SS_OBSERVED_PREDICTED[1][2][9] < -1.0);
        // a 3-10 helix counts as a helix
        assert_eq!(SS_OBSERVED_PREDICTED[6][1][7], SS_OBSERVED_PREDICTED[1][1][7]);
        // unknown states score nothing
        assert_eq!(SS_OBSERVED_PREDICTED[0][1][9], 0.0);
        assert_eq!(SS_PREDICTED_PREDICTED[0][5][1][9], 0.0);
        assert!(SS_PREDICTED_PREDICTED[2][9][2][9] > 0.0);
        assert!(SS_PREDICTED_PREDICTED[2][9][3][9] < 0.0);
    }

    #[test]
    fn test_resolve_ss_mode() -> anyhow::Result<()> {
        let plain = uniform("plain", 3, 4);

        let mut data = data_from_emissions("pred", vec![vec![0.25; 4]; 3]);
        data.secondary_structure.predicted = Some(vec![1, 1, 2]);
        let predicted = Profile::new(data)?;

        let mut data = data_from_emissions("dssp", vec![vec![0.25; 4]; 3]);
        data.secondary_structure.dssp = Some(vec![1, 1, 2]);
        let observed = Profile::new(data)?;

        use SecondaryStructureMode::*;
        assert_eq!(resolve_ss_mode(Auto, &plain, &observed), Off);
        assert_eq!(
            resolve_ss_mode(Auto, &predicted, &observed),
            QueryPredictedTemplateObserved
        );
        assert_eq!(
            resolve_ss_mode(Auto, &observed, &predicted),
            QueryObservedTemplatePredicted
        );
        assert_eq!(resolve_ss_mode(Auto, &predicted, &predicted), BothPredicted);
        assert_eq!(resolve_ss_mode(BothPredicted, &predicted, &observed), Off);
        assert_eq!(resolve_ss_mode(Off, &predicted, &observed), Off);

        let config = AlignmentConfig::default();
        let scorer = PairScorer::new(&predicted, &observed, &config);
        assert!(scorer.ss(&predicted, 1, &observed, 1) > 0.0);
        assert!(scorer.ss(&predicted, 1, &observed, 3) < 0.0);
        Ok(())
    }
}
