mod alignment;
pub use alignment::{Alignment, AlignmentStep, BacktraceMode, PairState};

mod cell_mask;
pub use cell_mask::CellMask;

mod dp_matrix;
pub use dp_matrix::DpMatrix;

mod hit;
pub use hit::Hit;

pub mod profile;
pub use profile::{Profile, ProfileData, SecondaryStructure};
