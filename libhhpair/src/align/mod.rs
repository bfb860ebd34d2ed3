mod backward;
pub use backward::{backward, BackwardMatrices};

mod forward;
pub use forward::{forward, ForwardMatrices, GapContents, GapMatrices, SCALE_UNDERFLOW};

mod maximum_accuracy;
pub use maximum_accuracy::{maximum_accuracy, MacMatrices, MacResult};

pub mod scoring;
pub use scoring::{log_p_value, p_value, probability, PairScorer};

mod stochastic_traceback;
pub use stochastic_traceback::{stochastic_traceback, PickStrategy};

mod traceback;
pub use traceback::{finish_alignment, mac_traceback, path_score, viterbi_traceback};

mod viterbi;
pub use viterbi::{begin_score, viterbi, BacktraceMatrices, ViterbiResult};
