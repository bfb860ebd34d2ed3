use std::fmt;
use std::io::Write;

use serde::Serialize;

use super::Profile;

/// The states of the pair HMM.
///
/// GD and IM consume a template column only, DG and MI a query column only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PairState {
    #[default]
    Stop,
    /// Query match aligned to template match
    MM,
    /// Query gap (in a delete run) against template match
    GD,
    /// Query insert against template match
    IM,
    /// Query match against template gap (in a delete run)
    DG,
    /// Query match against template insert
    MI,
}

impl PairState {
    pub fn name(&self) -> &'static str {
        match self {
            PairState::Stop => "STOP",
            PairState::MM => "MM",
            PairState::GD => "GD",
            PairState::IM => "IM",
            PairState::DG => "DG",
            PairState::MI => "MI",
        }
    }

    /// Whether the state consumes a query column.
    pub fn consumes_query(&self) -> bool {
        matches!(self, PairState::MM | PairState::DG | PairState::MI)
    }

    /// Whether the state consumes a template column.
    pub fn consumes_template(&self) -> bool {
        matches!(self, PairState::MM | PairState::GD | PairState::IM)
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// The algorithm that produced an alignment.
///
/// The two deterministic backtraces disagree on what STOP means: the Viterbi
/// matrices record STOP as the predecessor of the first aligned pair, while
/// the maximum accuracy matrix records STOP on the first aligned pair itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BacktraceMode {
    Viterbi,
    MaximumAccuracy,
    Stochastic,
}

impl fmt::Display for BacktraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BacktraceMode::Viterbi => "viterbi",
            BacktraceMode::MaximumAccuracy => "mac",
            BacktraceMode::Stochastic => "stochastic",
        };
        f.pad(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AlignmentStep {
    pub state: PairState,
    pub query_idx: usize,
    pub template_idx: usize,
    /// Column score (bits) of a matched pair, 0 otherwise
    pub match_score: f32,
    /// Secondary structure score (bits) of a matched pair, 0 otherwise
    pub ss_score: f32,
    /// Posterior probability of a matched pair, when posteriors are known
    pub posterior: Option<f64>,
}

impl AlignmentStep {
    pub fn new(state: PairState, query_idx: usize, template_idx: usize) -> Self {
        Self {
            state,
            query_idx,
            template_idx,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Alignment {
    pub mode: BacktraceMode,
    /// Which repeat of the query-template comparison produced this alignment
    pub repeat_idx: usize,
    /// The path, first aligned pair first
    pub steps: Vec<AlignmentStep>,
    pub query_start: usize,
    pub query_end: usize,
    pub template_start: usize,
    pub template_end: usize,
    pub matched_cols: usize,
    /// The score in bits, correlation bonus included
    pub score: f64,
    pub ss_score: f64,
    pub correlation: f64,
    pub p_value: f64,
    pub log_p_value: f64,
    pub e_value: f64,
    /// Probability (in percent) that the match is a true homolog
    pub probability: f64,
    /// Expected number of correctly aligned pairs, when posteriors are known
    pub sum_of_probs: Option<f64>,
}

impl Alignment {
    pub fn empty(mode: BacktraceMode, repeat_idx: usize) -> Self {
        Self {
            mode,
            repeat_idx,
            steps: vec![],
            query_start: 0,
            query_end: 0,
            template_start: 0,
            template_end: 0,
            matched_cols: 0,
            score: 0.0,
            ss_score: 0.0,
            correlation: 0.0,
            p_value: 1.0,
            log_p_value: 0.0,
            e_value: 0.0,
            probability: 0.0,
            sum_of_probs: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// The (query, template) cells of the matched pairs.
    pub fn matched_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.steps
            .iter()
            .filter(|step| step.state == PairState::MM)
            .map(|step| (step.query_idx, step.template_idx))
    }

    /// Returns the query line, the match line and the template line of a
    /// gapped consensus display.
    pub fn display_strings(&self, query: &Profile, template: &Profile) -> (String, String, String) {
        let mut query_line = String::with_capacity(self.steps.len());
        let mut match_line = String::with_capacity(self.steps.len());
        let mut template_line = String::with_capacity(self.steps.len());

        for step in &self.steps {
            let query_char = if step.state.consumes_query() {
                query.consensus[step.query_idx] as char
            } else {
                '-'
            };
            let template_char = if step.state.consumes_template() {
                template.consensus[step.template_idx] as char
            } else {
                '-'
            };

            let match_char = match step.state {
                PairState::MM if query_char.eq_ignore_ascii_case(&template_char) => '|',
                PairState::MM if step.match_score > 1.0 => '+',
                PairState::MM if step.match_score > 0.0 => '.',
                _ => ' ',
            };

            query_line.push(query_char);
            match_line.push(match_char);
            template_line.push(template_char);
        }

        (query_line, match_line, template_line)
    }

    pub fn dump(&self, out: &mut impl Write) -> anyhow::Result<()> {
        writeln!(
            out,
            "st     q     t     score  ss-score  postprob - {} alignment, {} steps",
            self.mode,
            self.steps.len()
        )?;
        writeln!(out, "----  ----  ----  -------  --------  --------")?;
        for step in &self.steps {
            write!(
                out,
                "{:4}  {:4}  {:4}  {:7.3}  {:8.3}",
                step.state, step.query_idx, step.template_idx, step.match_score, step.ss_score
            )?;
            match step.posterior {
                Some(posterior) => writeln!(out, "  {:8.4}", posterior)?,
                None => writeln!(out, "  {:>8}", "-")?,
            }
        }
        writeln!(out, "----  ----  ----  -------  --------  --------")?;
        writeln!(
            out,
            "score: {:.3} bits, P-value: {:.3e}, E-value: {:.3e}, probability: {:.2}%",
            self.score, self.p_value, self.e_value, self.probability
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_pads() {
        assert_eq!(format!("{:>4}", PairState::MM), "  MM");
        assert_eq!(format!("{}", PairState::Stop), "STOP");
        assert!(PairState::GD.consumes_template());
        assert!(!PairState::GD.consumes_query());
        assert!(PairState::MI.consumes_query());
    }

    #[test]
    fn test_matched_cells() {
        let mut alignment = Alignment::empty(BacktraceMode::Viterbi, 0);
        alignment.steps = vec![
            AlignmentStep::new(PairState::MM, 1, 1),
            AlignmentStep::new(PairState::GD, 1, 2),
            AlignmentStep::new(PairState::MM, 2, 3),
        ];

        let cells: Vec<_> = alignment.matched_cells().collect();
        assert_eq!(cells, vec![(1, 1), (2, 3)]);
        assert_eq!(alignment.len(), 3);

        let mut out: Vec<u8> = vec![];
        assert!(alignment.dump(&mut out).is_ok());
        assert_eq!(String::from_utf8_lossy(&out).lines().count(), 7);
    }
}
