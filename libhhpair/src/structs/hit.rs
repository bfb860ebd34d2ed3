use log::{debug, warn};
use rand::Rng;

use crate::align::scoring::local_length_correction;
use crate::align::{
    backward, finish_alignment, forward, mac_traceback, maximum_accuracy, path_score,
    stochastic_traceback, viterbi, viterbi_traceback, BacktraceMatrices, ForwardMatrices,
    MacMatrices, MacResult, PickStrategy, ViterbiResult,
};
use crate::config::AlignmentConfig;
use crate::error::{AlignError, ProfileError};

use super::{Alignment, BacktraceMode, CellMask, DpMatrix, Profile};

/// One query-template comparison.
///
/// A `Hit` owns the cell mask and every dynamic programming matrix of the
/// pair, so independent hits can run on separate threads. The mask
/// persists across repeats: each backtrace excludes the cells around its
/// path, and the next repeat searches what is left.
pub struct Hit<'a> {
    pub query: &'a Profile,
    pub template: &'a Profile,
    pub repeat_idx: usize,
    mask: CellMask,
    viterbi: Option<BacktraceMatrices>,
    viterbi_result: Option<ViterbiResult>,
    forward: Option<ForwardMatrices>,
    posterior: Option<DpMatrix<f64>>,
    mac: Option<MacMatrices>,
    mac_result: Option<MacResult>,
}

impl<'a> Hit<'a> {
    pub fn new(
        query: &'a Profile,
        template: &'a Profile,
        self_comparison: bool,
        config: &AlignmentConfig,
    ) -> Result<Self, AlignError> {
        for profile in [query, template] {
            if profile.length == 0 {
                return Err(ProfileError::Empty {
                    name: profile.name.clone(),
                }
                .into());
            }
        }

        if query.alphabet_size != template.alphabet_size {
            return Err(ProfileError::AlphabetMismatch {
                query: query.name.clone(),
                query_size: query.alphabet_size,
                template: template.name.clone(),
                template_size: template.alphabet_size,
            }
            .into());
        }

        Ok(Self {
            query,
            template,
            repeat_idx: 0,
            mask: CellMask::new(query.length, template.length, self_comparison, config)?,
            viterbi: None,
            viterbi_result: None,
            forward: None,
            posterior: None,
            mac: None,
            mac_result: None,
        })
    }

    pub fn mask(&self) -> &CellMask {
        &self.mask
    }

    pub fn posterior(&self) -> Option<&DpMatrix<f64>> {
        self.posterior.as_ref()
    }

    pub fn forward_matrices(&self) -> Option<&ForwardMatrices> {
        self.forward.as_ref()
    }

    pub fn viterbi_result(&self) -> Option<ViterbiResult> {
        self.viterbi_result
    }

    pub fn mac_result(&self) -> Option<MacResult> {
        self.mac_result
    }

    /// Runs the Viterbi fill over the cells the mask still allows and
    /// returns the best score.
    pub fn viterbi(&mut self, config: &AlignmentConfig) -> Result<f64, AlignError> {
        let backtrace = match &mut self.viterbi {
            Some(backtrace) => backtrace,
            slot @ None => slot.insert(BacktraceMatrices::new(
                self.query.length,
                self.template.length,
            )?),
        };

        let result = viterbi(self.query, self.template, &self.mask, config, backtrace);
        self.viterbi_result = Some(result);
        Ok(result.score)
    }

    pub fn viterbi_traceback(&mut self, config: &AlignmentConfig) -> Result<Alignment, AlignError> {
        let (Some(backtrace), Some(result)) = (self.viterbi.as_ref(), self.viterbi_result.take())
        else {
            return Err(AlignError::StageOrder {
                required: "viterbi",
                requested: "viterbi traceback",
            });
        };

        let Some(end) = result.end else {
            warn!(
                "{} x {}: no cells left for a viterbi alignment",
                self.query.name, self.template.name
            );
            return Ok(Alignment::empty(BacktraceMode::Viterbi, self.repeat_idx));
        };

        let steps = viterbi_traceback(backtrace, end, &mut self.mask)?;
        Ok(finish_alignment(
            self.query,
            self.template,
            config,
            BacktraceMode::Viterbi,
            self.repeat_idx,
            steps,
            result.score,
        ))
    }

    /// Runs the scaled Forward pass and returns the Forward score.
    pub fn forward(&mut self, config: &AlignmentConfig) -> Result<f64, AlignError> {
        let matrices = match &mut self.forward {
            Some(matrices) => matrices,
            slot @ None => slot.insert(ForwardMatrices::new(
                self.query.length,
                self.template.length,
            )?),
        };

        forward(self.query, self.template, &self.mask, config, matrices)
    }

    /// Runs the Backward pass on the Forward lattice and keeps the
    /// posterior match probabilities.
    pub fn backward(&mut self, config: &AlignmentConfig) -> Result<(), AlignError> {
        let Some(matrices) = self.forward.as_mut() else {
            return Err(AlignError::StageOrder {
                required: "forward",
                requested: "backward",
            });
        };

        self.posterior = Some(backward(
            self.query,
            self.template,
            &self.mask,
            config,
            matrices,
        )?);
        Ok(())
    }

    /// Runs the maximum accuracy fill and returns its score.
    pub fn maximum_accuracy(&mut self, config: &AlignmentConfig) -> Result<f64, AlignError> {
        let Some(posterior) = self.posterior.as_ref() else {
            return Err(AlignError::StageOrder {
                required: "backward",
                requested: "maximum accuracy alignment",
            });
        };

        let mac = match &mut self.mac {
            Some(mac) => mac,
            slot @ None => slot.insert(MacMatrices::new(
                self.query.length,
                self.template.length,
            )?),
        };

        let result = maximum_accuracy(posterior, &self.mask, config, mac);
        self.mac_result = Some(result);
        Ok(result.score)
    }

    /// Backtraces the maximum accuracy alignment. Its score is the Forward
    /// score of the pair.
    pub fn mac_traceback(&mut self, config: &AlignmentConfig) -> Result<Alignment, AlignError> {
        let (Some(mac), Some(posterior), Some(forward), Some(result)) = (
            self.mac.as_ref(),
            self.posterior.as_ref(),
            self.forward.as_ref(),
            self.mac_result.take(),
        ) else {
            return Err(AlignError::StageOrder {
                required: "maximum accuracy alignment",
                requested: "maximum accuracy traceback",
            });
        };

        let Some(end) = result.end else {
            warn!(
                "{} x {}: no cells left for a maximum accuracy alignment",
                self.query.name, self.template.name
            );
            return Ok(Alignment::empty(BacktraceMode::MaximumAccuracy, self.repeat_idx));
        };

        let steps = mac_traceback(mac, posterior, end, &mut self.mask)?;
        Ok(finish_alignment(
            self.query,
            self.template,
            config,
            BacktraceMode::MaximumAccuracy,
            self.repeat_idx,
            steps,
            forward.score,
        ))
    }

    /// Draws an alignment from the Forward ensemble. The mask is left
    /// untouched so that repeated draws sample the same distribution.
    pub fn stochastic_traceback<R: Rng>(
        &mut self,
        config: &AlignmentConfig,
        strategy: PickStrategy,
        rng: &mut R,
    ) -> Result<Alignment, AlignError> {
        let Some(matrices) = self.forward.as_ref() else {
            return Err(AlignError::StageOrder {
                required: "forward",
                requested: "stochastic traceback",
            });
        };

        let steps = stochastic_traceback(
            self.query,
            self.template,
            &self.mask,
            config,
            matrices,
            strategy,
            rng,
        )?;

        let mut score = path_score(self.query, self.template, &self.mask, config, &steps)?;
        if config.local && !steps.is_empty() {
            score += local_length_correction(
                self.query.length,
                self.template.length,
                self.mask.is_self_comparison(),
                config.length_lambda,
            );
        }

        Ok(finish_alignment(
            self.query,
            self.template,
            config,
            BacktraceMode::Stochastic,
            self.repeat_idx,
            steps,
            score,
        ))
    }

    /// Moves on to the next repeat. The mask keeps every exclusion made so
    /// far; stage results of the previous repeat are discarded.
    pub fn next_repeat(&mut self) {
        self.repeat_idx += 1;
        self.viterbi_result = None;
        self.mac_result = None;
        debug!(
            "{} x {}: repeat {}, {} cells excluded",
            self.query.name,
            self.template.name,
            self.repeat_idx,
            self.mask.excluded_count()
        );
    }

    /// Frees every dynamic programming matrix, keeping the mask.
    pub fn release_matrices(&mut self) {
        self.viterbi = None;
        self.viterbi_result = None;
        self.forward = None;
        self.posterior = None;
        self.mac = None;
        self.mac_result = None;
    }
}
