//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::balance::{BalanceConfig, ClassWeights};
pub use crate::consts::AFFINITY_THRESHOLD;
pub use crate::{
    accumulate_malis_gradient, compute_constrained_malis_gradient, compute_malis_gradient,
    ground_truth_affinities, split_affinities,
};
pub use crate::{AffinityValue, LabelValue};
pub use crate::{ConstrainedReport, MalisReport};
pub use crate::{MalisConfig, MalisMode, MalisOutcome};
pub use crate::{MalisError, MalisResult};
