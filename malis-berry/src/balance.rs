//! 亲和类别平衡.
//!
//! 统计真值亲和中正样本 (同段连通边) 的比例, 裁剪后换算为正负两类的权重,
//! 使两类在损失中的总贡献大致相当.

use ndarray::{ArrayD, ArrayViewD};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::{AFFINITY_THRESHOLD, BALANCE_CLIP_LOWER, BALANCE_CLIP_UPPER};
use crate::graph::{AffinityGraph, EdgeTruth};
use crate::value::{AffinityValue, LabelValue};
use crate::{MalisError, MalisResult};

/// 类别平衡参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BalanceConfig {
    /// 正样本比例的裁剪下界.
    pub clip_lower: f64,

    /// 正样本比例的裁剪上界.
    pub clip_upper: f64,

    /// 是否排除连向未标注像素的边. 边界边总是被排除.
    pub mask_ignore: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            clip_lower: BALANCE_CLIP_LOWER,
            clip_upper: BALANCE_CLIP_UPPER,
            mask_ignore: true,
        }
    }
}

/// 负类 / 正类权重.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassWeights {
    /// 真值亲和为 0 的边的权重.
    pub negative: f64,

    /// 真值亲和为 1 的边的权重.
    pub positive: f64,
}

impl BalanceConfig {
    /// 由真值计算类别权重.
    ///
    /// `w_pos = 1 / (2 * p)`, `w_neg = 1 / (2 * (1 - p))`, 其中 `p` 为裁剪后的正样本比例.
    ///
    /// # 错误
    ///
    /// - 裁剪区间不满足 `0 < lower <= upper < 1` 时返回 [`MalisError::InvalidClip`];
    /// - 没有任何可统计的边时返回 [`MalisError::EmptyMask`].
    pub fn class_weights<L: LabelValue>(
        &self,
        groundtruth: ArrayViewD<'_, L>,
    ) -> MalisResult<ClassWeights> {
        let (lower, upper) = (self.clip_lower, self.clip_upper);
        if !(lower > 0.0 && lower <= upper && upper < 1.0) {
            return Err(MalisError::InvalidClip(lower, upper));
        }

        let graph = AffinityGraph::new(groundtruth.shape());
        let labels: Vec<L> = groundtruth.iter().copied().collect();
        let (mut counted, mut positive) = (0u64, 0u64);
        for edge in 0..graph.edge_count() {
            match graph.edge_truth(edge, &labels) {
                EdgeTruth::Invalid => {}
                EdgeTruth::Ignored if self.mask_ignore => {}
                EdgeTruth::Connected => {
                    counted += 1;
                    positive += 1;
                }
                EdgeTruth::Separated | EdgeTruth::Ignored => counted += 1,
            }
        }
        if counted == 0 {
            return Err(MalisError::EmptyMask);
        }

        let frac_positive = (positive as f64 / counted as f64).clamp(lower, upper);
        log::debug!("balance: {positive}/{counted} positive edges, clipped to {frac_positive:.4}");
        Ok(ClassWeights {
            negative: 1.0 / (2.0 * (1.0 - frac_positive)),
            positive: 1.0 / (2.0 * frac_positive),
        })
    }
}

impl ClassWeights {
    /// 按真值亲和张量逐边生成权重张量. 亲和值大于判定门限的边视为正类.
    pub fn weights_for<A: AffinityValue>(&self, gt_affinities: ArrayViewD<'_, A>) -> ArrayD<A> {
        let (neg, pos) = (A::narrow(self.negative), A::narrow(self.positive));
        gt_affinities.mapv(|a| {
            if a.widen() > AFFINITY_THRESHOLD {
                pos
            } else {
                neg
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{BalanceConfig, ClassWeights};
    use crate::graph::ground_truth_affinities;
    use crate::MalisError;
    use ndarray::{array, ArrayD};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_class_weights() {
        // 有效边 3 条: 1-1 (正), 1-2 (负), 2-0 (未标注).
        let gt = array![1u8, 1, 2, 0].into_dyn();

        let w = BalanceConfig::default().class_weights(gt.view()).unwrap();
        assert!(f64_eq(w.positive, 1.0));
        assert!(f64_eq(w.negative, 1.0));

        let cfg = BalanceConfig {
            mask_ignore: false,
            ..Default::default()
        };
        let w = cfg.class_weights(gt.view()).unwrap();
        assert!(f64_eq(w.positive, 1.5));
        assert!(f64_eq(w.negative, 0.75));
    }

    #[test]
    fn test_class_weights_clipped() {
        let gt = array![[3u16, 3, 3], [3, 3, 3]].into_dyn();
        let w = BalanceConfig::default().class_weights(gt.view()).unwrap();
        assert!(f64_eq(w.positive, 1.0 / 1.9));
        assert!(f64_eq(w.negative, 10.0));
    }

    #[test]
    fn test_class_weights_errors() {
        let gt = array![0u8, 0, 5].into_dyn();
        assert_eq!(
            BalanceConfig::default().class_weights(gt.view()),
            Err(MalisError::EmptyMask)
        );

        let cfg = BalanceConfig {
            clip_lower: 0.6,
            clip_upper: 0.4,
            mask_ignore: true,
        };
        assert_eq!(
            cfg.class_weights(gt.view()),
            Err(MalisError::InvalidClip(0.6, 0.4))
        );
    }

    #[test]
    fn test_weights_for() {
        let gt = array![1u8, 1, 2].into_dyn();
        let gt_aff: ArrayD<f32> = ground_truth_affinities(gt.view());
        let w = ClassWeights {
            negative: 0.25,
            positive: 4.0,
        };
        assert_eq!(w.weights_for(gt_aff.view()), array![[0.25f32, 4.0, 0.25]].into_dyn());
    }
}
