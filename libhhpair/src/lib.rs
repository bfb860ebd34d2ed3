//! Pairwise alignment of profile hidden Markov models.
//!
//! A [`structs::Hit`] owns the dynamic programming state of one
//! query-template comparison and drives the stages in [`align`]: Viterbi
//! with its backtrace, Forward/Backward posteriors with the maximum accuracy
//! alignment, and stochastic backtraces through the Forward lattice.

pub mod align;
pub mod config;
pub mod error;
pub mod structs;
pub mod util;

pub use config::{AlignmentConfig, AlignmentConfigBuilder, SecondaryStructureMode};
pub use error::{AlignError, ConfigError, ProfileError};
