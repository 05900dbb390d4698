//! 损失计算配置.

use ndarray::{ArrayD, ArrayViewD};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constrained::{constrained_malis_gradient, ConstrainedReport};
use crate::kernel::{compute_malis_gradient, MalisReport};
use crate::value::{AffinityValue, LabelValue};
use crate::MalisResult;

/// 计算模式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MalisMode {
    /// 仅正向遍历.
    Positive,

    /// 仅负向遍历.
    Negative,

    /// 约束 (对称) MALIS, 正负两遍取平均.
    #[default]
    Constrained,
}

/// MALIS 损失配置.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MalisConfig {
    /// 计算模式.
    pub mode: MalisMode,

    /// 约束模式下是否并行执行两遍. 需要 `rayon` feature.
    pub parallel: bool,
}

impl Default for MalisConfig {
    fn default() -> Self {
        Self {
            mode: MalisMode::default(),
            parallel: true,
        }
    }
}

/// 按配置计算的标量输出.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MalisOutcome {
    /// 单遍输出.
    Single(MalisReport),

    /// 约束模式输出.
    Constrained(ConstrainedReport),
}

impl MalisOutcome {
    /// 损失值.
    #[inline]
    pub fn loss(&self) -> f64 {
        match self {
            MalisOutcome::Single(r) => r.loss,
            MalisOutcome::Constrained(r) => r.loss,
        }
    }

    /// Rand 指数. 约束模式不提供.
    #[inline]
    pub fn rand_index(&self) -> Option<f64> {
        match self {
            MalisOutcome::Single(r) => Some(r.rand_index),
            MalisOutcome::Constrained(_) => None,
        }
    }
}

impl MalisConfig {
    /// 以配置 `mode` 计算梯度与标量输出.
    pub fn evaluate<A, L>(
        &self,
        affinities: ArrayViewD<'_, A>,
        groundtruth: ArrayViewD<'_, L>,
    ) -> MalisResult<(ArrayD<A>, MalisOutcome)>
    where
        A: AffinityValue,
        L: LabelValue,
    {
        match self.mode {
            MalisMode::Positive | MalisMode::Negative => {
                let pos = self.mode == MalisMode::Positive;
                let (grad, report) = compute_malis_gradient(affinities, groundtruth, pos)?;
                Ok((grad, MalisOutcome::Single(report)))
            }
            MalisMode::Constrained => {
                let (grad, report) =
                    constrained_malis_gradient(affinities, groundtruth, self.parallel)?;
                Ok((grad, MalisOutcome::Constrained(report)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MalisConfig, MalisMode, MalisOutcome};
    use ndarray::array;

    #[test]
    fn test_evaluate_modes() {
        let aff = array![[0.3, 0.9, 0.1, 0.9]].into_dyn();
        let gt = array![1u32, 1, 2, 2].into_dyn();

        for mode in [MalisMode::Positive, MalisMode::Negative] {
            let cfg = MalisConfig {
                mode,
                parallel: false,
            };
            let (_, outcome) = cfg.evaluate(aff.view(), gt.view()).unwrap();
            assert!(matches!(outcome, MalisOutcome::Single(_)));
            assert!((outcome.loss() - 0.01).abs() < 1e-9);
            assert_eq!(outcome.rand_index(), Some(1.0));
        }

        let (grad, outcome) = MalisConfig::default()
            .evaluate(aff.view(), gt.view())
            .unwrap();
        assert!(matches!(outcome, MalisOutcome::Constrained(_)));
        assert_eq!(outcome.rand_index(), None);
        assert_eq!(grad.shape(), aff.shape());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serde() {
        let cfg = MalisConfig {
            mode: MalisMode::Negative,
            parallel: false,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(json, r#"{"mode":"Negative","parallel":false}"#);
        let back: MalisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
