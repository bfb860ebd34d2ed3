use thiserror::Error;

use crate::structs::PairState;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile {name} has no match columns")]
    Empty { name: String },
    #[error("profile {name}: expected {expected} {table} rows, found {found}")]
    TableLength {
        name: String,
        table: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("profile {name}: emission row for column {column} has {found} symbols, expected {expected}")]
    AlphabetSize {
        name: String,
        column: usize,
        expected: usize,
        found: usize,
    },
    #[error("profile {name}: emission probabilities of column {column} sum to {sum}")]
    EmissionSum {
        name: String,
        column: usize,
        sum: f64,
    },
    #[error("profile {name}: {state} transitions out of column {column} sum to {sum}")]
    TransitionSum {
        name: String,
        state: &'static str,
        column: usize,
        sum: f64,
    },
    #[error("profile {name}: background frequencies {problem}")]
    Background { name: String, problem: String },
    #[error("profile {name}: probability {value} out of range at column {column}")]
    Probability {
        name: String,
        column: usize,
        value: f64,
    },
    #[error("alphabet size mismatch: query {query} has {query_size} symbols, template {template} has {template_size}")]
    AlphabetMismatch {
        query: String,
        query_size: usize,
        template: String,
        template_size: usize,
    },
}

#[derive(Error, Debug)]
pub enum AlignError {
    #[error(
        "failed to allocate the {rows} x {cols} {matrix} matrix: \
         reduce the profile lengths or make more memory available"
    )]
    Allocation {
        matrix: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("numerical instability in {stage} at cell ({query_idx}, {template_idx}): {value}")]
    Numerical {
        stage: &'static str,
        query_idx: usize,
        template_idx: usize,
        value: f64,
    },
    #[error(transparent)]
    InvalidProfile(#[from] ProfileError),
    #[error("backtrace reached cell ({query_idx}, {template_idx}) in state {state} at step {step}")]
    Inconsistent {
        state: PairState,
        step: usize,
        query_idx: usize,
        template_idx: usize,
    },
    #[error("{requested} requires {required}")]
    StageOrder {
        required: &'static str,
        requested: &'static str,
    },
}

#[derive(Error, Debug)]
#[error("malformed excluded range: \"{range}\"")]
pub struct ConfigError {
    pub range: String,
}
