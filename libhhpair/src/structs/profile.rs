use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Secondary structure annotations, one entry per match column.
///
/// Observed states use the DSSP letters "-HECTSGB" as codes 0..=7, predicted
/// states use "-HEC" as codes 0..=3 with a confidence of 0..=10.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryStructure {
    #[serde(default)]
    pub dssp: Option<Vec<u8>>,
    #[serde(default)]
    pub predicted: Option<Vec<u8>>,
    #[serde(default)]
    pub confidence: Option<Vec<u8>>,
}

/// The serialized form of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub name: String,
    #[serde(default)]
    pub consensus: Option<String>,
    /// Emission probabilities for match columns 1..=L.
    pub emissions: Vec<Vec<f64>>,
    /// Transition probabilities out of columns 0..=L, ordered
    /// M->M, M->I, M->D, I->M, I->I, D->M, D->D.
    pub transitions: Vec<[f64; 7]>,
    pub lambda: f64,
    pub mu: f64,
    /// Symbol frequencies of the null model, uniform when absent.
    #[serde(default)]
    pub background: Option<Vec<f64>>,
    #[serde(default)]
    pub secondary_structure: SecondaryStructure,
}

#[derive(Clone)]
pub struct Profile {
    pub name: String,
    /// The number of match columns
    pub length: usize,
    pub alphabet_size: usize,
    /// Consensus residues, padded so that index 1 is the first column
    pub consensus: Vec<u8>,
    /// Emission probabilities, row 0 is empty
    emissions: Vec<Vec<f64>>,
    transitions: Vec<[f64; Profile::NUM_TRANSITIONS]>,
    /// The log2 of `transitions`
    transition_scores: Vec<[f32; Profile::NUM_TRANSITIONS]>,
    /// Null model symbol frequencies
    background: Vec<f64>,
    /// Extreme value distribution parameters of the template score
    pub lambda: f64,
    pub mu: f64,
    /// Observed secondary structure, padded like `consensus`
    pub ss_dssp: Option<Vec<u8>>,
    /// Predicted secondary structure, padded like `consensus`
    pub ss_pred: Option<Vec<u8>>,
    /// Prediction confidence, padded like `consensus`
    pub ss_conf: Option<Vec<u8>>,
}

impl Profile {
    pub const NUM_TRANSITIONS: usize = 7;
    pub const MATCH_TO_MATCH_IDX: usize = 0;
    pub const MATCH_TO_INSERT_IDX: usize = 1;
    pub const MATCH_TO_DELETE_IDX: usize = 2;
    pub const INSERT_TO_MATCH_IDX: usize = 3;
    pub const INSERT_TO_INSERT_IDX: usize = 4;
    pub const DELETE_TO_MATCH_IDX: usize = 5;
    pub const DELETE_TO_DELETE_IDX: usize = 6;

    pub const NUM_DSSP_STATES: u8 = 8;
    pub const NUM_PREDICTED_STATES: u8 = 4;
    pub const MAX_CONFIDENCE: u8 = 10;

    /// How far a probability row may stray from summing to 1
    pub const PROBABILITY_TOLERANCE: f64 = 1e-3;

    pub fn new(data: ProfileData) -> Result<Self, ProfileError> {
        let name = data.name;
        let length = data.emissions.len();

        if length == 0 {
            return Err(ProfileError::Empty { name });
        }

        if data.transitions.len() != length + 1 {
            return Err(ProfileError::TableLength {
                name,
                table: "transition",
                expected: length + 1,
                found: data.transitions.len(),
            });
        }

        let alphabet_size = data.emissions[0].len();
        for (column_minus_one, row) in data.emissions.iter().enumerate() {
            let column = column_minus_one + 1;
            if row.len() != alphabet_size || alphabet_size == 0 {
                return Err(ProfileError::AlphabetSize {
                    name,
                    column,
                    expected: alphabet_size,
                    found: row.len(),
                });
            }

            if let Some(&value) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                return Err(ProfileError::Probability {
                    name,
                    column,
                    value,
                });
            }

            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > Self::PROBABILITY_TOLERANCE {
                return Err(ProfileError::EmissionSum { name, column, sum });
            }
        }

        let background = match data.background {
            None => vec![1.0 / alphabet_size as f64; alphabet_size],
            Some(background) => {
                let problem = if background.len() != alphabet_size {
                    Some(format!(
                        "have {} symbols, expected {}",
                        background.len(),
                        alphabet_size
                    ))
                } else if background.iter().any(|&f| !(f > 0.0 && f <= 1.0)) {
                    Some("must lie in (0, 1]".to_string())
                } else {
                    let sum: f64 = background.iter().sum();
                    ((sum - 1.0).abs() > Self::PROBABILITY_TOLERANCE)
                        .then(|| format!("sum to {sum}"))
                };

                if let Some(problem) = problem {
                    return Err(ProfileError::Background { name, problem });
                }
                background
            }
        };

        for (column, row) in data.transitions.iter().enumerate() {
            if let Some(&value) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                return Err(ProfileError::Probability {
                    name,
                    column,
                    value,
                });
            }

            let sums = [
                ("match", &row[0..3]),
                ("insert", &row[3..5]),
                ("delete", &row[5..7]),
            ];
            for (state, probabilities) in sums {
                let sum: f64 = probabilities.iter().sum();
                if (sum - 1.0).abs() > Self::PROBABILITY_TOLERANCE {
                    return Err(ProfileError::TransitionSum {
                        name,
                        state,
                        column,
                        sum,
                    });
                }
            }
        }

        let consensus = match data.consensus {
            Some(consensus) if consensus.len() == length => {
                let mut bytes = vec![b' '];
                bytes.extend(consensus.bytes());
                bytes
            }
            Some(consensus) => {
                return Err(ProfileError::TableLength {
                    name,
                    table: "consensus",
                    expected: length,
                    found: consensus.len(),
                })
            }
            None => {
                let mut bytes = vec![b'x'; length + 1];
                bytes[0] = b' ';
                bytes
            }
        };

        let ss = data.secondary_structure;
        let ss_dssp = pad_annotation(&name, "dssp", ss.dssp, length, Self::NUM_DSSP_STATES - 1)?;
        let ss_pred = pad_annotation(
            &name,
            "predicted structure",
            ss.predicted,
            length,
            Self::NUM_PREDICTED_STATES - 1,
        )?;
        let ss_conf = pad_annotation(
            &name,
            "confidence",
            ss.confidence,
            length,
            Self::MAX_CONFIDENCE,
        )?;

        // a prediction without confidences is treated as fully confident
        let ss_conf = match (&ss_pred, ss_conf) {
            (Some(_), None) => Some(vec![Self::MAX_CONFIDENCE; length + 1]),
            (_, conf) => conf,
        };

        let transition_scores = data
            .transitions
            .iter()
            .map(|row| {
                let mut scores = [0.0f32; Self::NUM_TRANSITIONS];
                scores
                    .iter_mut()
                    .zip(row)
                    .for_each(|(score, &p)| *score = p.log2() as f32);
                scores
            })
            .collect();

        let mut emissions = Vec::with_capacity(length + 1);
        emissions.push(vec![]);
        emissions.extend(data.emissions);

        Ok(Self {
            name,
            length,
            alphabet_size,
            consensus,
            emissions,
            transitions: data.transitions,
            transition_scores,
            background,
            lambda: data.lambda,
            mu: data.mu,
            ss_dssp,
            ss_pred,
            ss_conf,
        })
    }

    #[inline(always)]
    pub fn emission(&self, column: usize) -> &[f64] {
        &self.emissions[column]
    }

    /// The null model frequency of every symbol.
    #[inline(always)]
    pub fn background(&self) -> &[f64] {
        &self.background
    }

    /// The probability of a transition out of `column`.
    #[inline(always)]
    pub fn transition(&self, transition_idx: usize, column: usize) -> f64 {
        self.transitions[column][transition_idx]
    }

    /// The log2 probability of a transition out of `column`.
    #[inline(always)]
    pub fn transition_score(&self, transition_idx: usize, column: usize) -> f32 {
        self.transition_scores[column][transition_idx]
    }

    pub fn has_observed_ss(&self) -> bool {
        self.ss_dssp.is_some()
    }

    pub fn has_predicted_ss(&self) -> bool {
        self.ss_pred.is_some()
    }
}

fn pad_annotation(
    name: &str,
    table: &'static str,
    annotation: Option<Vec<u8>>,
    length: usize,
    max_code: u8,
) -> Result<Option<Vec<u8>>, ProfileError> {
    let Some(annotation) = annotation else {
        return Ok(None);
    };

    if annotation.len() != length {
        return Err(ProfileError::TableLength {
            name: name.to_string(),
            table,
            expected: length,
            found: annotation.len(),
        });
    }

    if let Some((column_minus_one, &code)) =
        annotation.iter().enumerate().find(|(_, &code)| code > max_code)
    {
        return Err(ProfileError::Probability {
            name: name.to_string(),
            column: column_minus_one + 1,
            value: code as f64,
        });
    }

    let mut padded = Vec::with_capacity(length + 1);
    padded.push(0);
    padded.extend(annotation);
    Ok(Some(padded))
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("alphabet_size", &self.alphabet_size)
            .field("lambda", &self.lambda)
            .field("mu", &self.mu)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_profiles::*;
    use super::*;

    #[test]
    fn test_new_pads_columns() -> anyhow::Result<()> {
        let mut data = data_from_emissions("p", vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
        data.consensus = Some("AB".to_string());
        let profile = Profile::new(data)?;

        assert_eq!(profile.length, 2);
        assert_eq!(profile.alphabet_size, 2);
        assert_eq!(profile.emission(2), &[1.0, 0.0]);
        assert_eq!(profile.consensus[1], b'A');
        assert_eq!(
            profile.transition_score(Profile::INSERT_TO_INSERT_IDX, 0),
            0.4f64.log2() as f32
        );
        assert!(profile.transition_score(Profile::MATCH_TO_MATCH_IDX, 2) < 0.0);
        Ok(())
    }

    #[test]
    fn test_new_rejects_empty() {
        let data = data_from_emissions("empty", vec![]);
        assert!(matches!(Profile::new(data), Err(ProfileError::Empty { .. })));
    }

    #[test]
    fn test_new_rejects_bad_sums() {
        let data = data_from_emissions("bad", vec![vec![0.5, 0.4]]);
        assert!(matches!(
            Profile::new(data),
            Err(ProfileError::EmissionSum { column: 1, .. })
        ));

        let mut data = data_from_emissions("bad", vec![vec![0.5, 0.5]]);
        data.transitions[1][Profile::DELETE_TO_DELETE_IDX] = 0.9;
        assert!(matches!(
            Profile::new(data),
            Err(ProfileError::TransitionSum {
                state: "delete",
                column: 1,
                ..
            })
        ));

        let mut data = data_from_emissions("bad", vec![vec![0.5, 0.5]]);
        data.transitions.pop();
        assert!(matches!(
            Profile::new(data),
            Err(ProfileError::TableLength { .. })
        ));
    }

    #[test]
    fn test_background() -> anyhow::Result<()> {
        let profile = Profile::new(data_from_emissions("p", vec![vec![0.5, 0.3, 0.2]]))?;
        assert_eq!(profile.background(), &[1.0 / 3.0; 3]);

        let mut data = data_from_emissions("p", vec![vec![0.5, 0.5]]);
        data.background = Some(vec![0.8, 0.2]);
        assert_eq!(Profile::new(data)?.background(), &[0.8, 0.2]);

        for background in [vec![0.5, 0.25, 0.25], vec![1.0, 0.0], vec![0.6, 0.6]] {
            let mut data = data_from_emissions("bad", vec![vec![0.5, 0.5]]);
            data.background = Some(background);
            assert!(matches!(
                Profile::new(data),
                Err(ProfileError::Background { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_secondary_structure_annotations() -> anyhow::Result<()> {
        let mut data = data_from_emissions("ss", vec![vec![0.5, 0.5]; 3]);
        data.secondary_structure.predicted = Some(vec![1, 2, 3]);
        let profile = Profile::new(data)?;

        assert!(profile.has_predicted_ss());
        assert!(!profile.has_observed_ss());
        assert_eq!(profile.ss_pred.as_deref(), Some(&[0, 1, 2, 3][..]));
        assert_eq!(profile.ss_conf.as_deref(), Some(&[10, 10, 10, 10][..]));

        let mut data = data_from_emissions("ss", vec![vec![0.5, 0.5]; 3]);
        data.secondary_structure.dssp = Some(vec![1, 2, 9]);
        assert!(Profile::new(data).is_err());
        Ok(())
    }

    #[test]
    fn test_profile_data_from_json() -> anyhow::Result<()> {
        let json = r#"{
            "name": "tiny",
            "emissions": [[0.25, 0.25, 0.25, 0.25]],
            "transitions": [
                [0.9, 0.05, 0.05, 0.6, 0.4, 0.6, 0.4],
                [0.9, 0.05, 0.05, 0.6, 0.4, 0.6, 0.4]
            ],
            "lambda": 0.3,
            "mu": 3.0
        }"#;

        let data: ProfileData = serde_json::from_str(json)?;
        let profile = Profile::new(data)?;
        assert_eq!(profile.length, 1);
        assert_eq!(profile.alphabet_size, 4);
        assert!(profile.ss_dssp.is_none());
        Ok(())
    }
}
