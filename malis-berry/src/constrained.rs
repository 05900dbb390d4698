//! 约束 (对称) MALIS: 由原始亲和值与真值构造正负两个亲和张量, 分别运行单遍核,
//! 再合并两者的梯度与损失.

use log::debug;
use ndarray::{ArrayD, ArrayViewD};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::graph::{check_shapes, AffinityGraph, EdgeTruth};
use crate::iter::CoordIter;
use crate::kernel::{compute_malis_gradient, MalisReport};
use crate::value::{AffinityValue, LabelValue};
use crate::MalisResult;

/// 约束 MALIS 的标量输出.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstrainedReport {
    /// `(loss_pos + loss_neg) / 2`.
    pub loss: f64,

    /// 正向遍历损失.
    pub loss_pos: f64,

    /// 负向遍历损失.
    pub loss_neg: f64,
}

/// 构造正负两遍的亲和张量.
///
/// 正向张量等价于 `min(affinity, gt_affinity)`, 负向张量等价于
/// `max(affinity, gt_affinity)`, 其中真值亲和仅在有效且两端同为非零标签时为 1:
///
/// | 边类型 | 正向 | 负向 |
/// | --- | --- | --- |
/// | 同段 | `affinity` | `1` |
/// | 其它 (含边界, 异段, 未标注) | `0` | `affinity` |
pub fn split_affinities<A, L>(
    affinities: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
) -> MalisResult<(ArrayD<A>, ArrayD<A>)>
where
    A: AffinityValue,
    L: LabelValue,
{
    check_shapes(&affinities, &groundtruth, None)?;
    let graph = AffinityGraph::new(groundtruth.shape());
    let labels: Vec<L> = groundtruth.iter().copied().collect();

    let mut aff_pos = ArrayD::<A>::zeros(affinities.raw_dim());
    let mut aff_neg = affinities.to_owned();
    for coord in CoordIter::new(affinities.shape()) {
        if let EdgeTruth::Connected = graph.edge_truth_at(&coord, &labels) {
            let at = coord.as_slice();
            aff_pos[at] = affinities[at];
            aff_neg[at] = A::one();
        }
    }
    Ok((aff_pos, aff_neg))
}

/// 计算约束 MALIS 梯度.
///
/// 正负两遍分别写入各自独立清零的梯度缓冲区, 最后逐元素相加.
/// 启用 `rayon` feature 时两遍并行执行, 结果与串行一致.
/// 两遍各自的误分类率与 Rand 指数被丢弃.
///
/// # 错误
///
/// 同 [`compute_malis_gradient`]. 任一遍失败即整体失败.
pub fn compute_constrained_malis_gradient<A, L>(
    affinities: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
) -> MalisResult<(ArrayD<A>, ConstrainedReport)>
where
    A: AffinityValue,
    L: LabelValue,
{
    constrained_malis_gradient(affinities, groundtruth, true)
}

/// 同 [`compute_constrained_malis_gradient`], 由 `parallel` 决定两遍是否并行.
/// 未启用 `rayon` feature 时 `parallel` 被忽略.
pub(crate) fn constrained_malis_gradient<A, L>(
    affinities: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
    parallel: bool,
) -> MalisResult<(ArrayD<A>, ConstrainedReport)>
where
    A: AffinityValue,
    L: LabelValue,
{
    let (aff_pos, aff_neg) = split_affinities(affinities, groundtruth.view())?;
    let (pos, neg) = run_passes(aff_pos.view(), aff_neg.view(), groundtruth, parallel);
    let (grad_pos, report_pos) = pos?;
    let (grad_neg, report_neg) = neg?;

    let report = combine(&report_pos, &report_neg);
    debug!(
        "constrained malis: loss_pos = {:.6}, loss_neg = {:.6}",
        report.loss_pos, report.loss_neg
    );
    Ok((grad_pos + grad_neg, report))
}

type Pass<A> = MalisResult<(ArrayD<A>, MalisReport)>;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        fn run_passes<A, L>(
            aff_pos: ArrayViewD<'_, A>,
            aff_neg: ArrayViewD<'_, A>,
            groundtruth: ArrayViewD<'_, L>,
            parallel: bool,
        ) -> (Pass<A>, Pass<A>)
        where
            A: AffinityValue,
            L: LabelValue,
        {
            if !parallel {
                return run_passes_seq(aff_pos, aff_neg, groundtruth);
            }
            rayon::join(
                || compute_malis_gradient(aff_pos, groundtruth.view(), true),
                || compute_malis_gradient(aff_neg, groundtruth.view(), false),
            )
        }
    } else {
        fn run_passes<A, L>(
            aff_pos: ArrayViewD<'_, A>,
            aff_neg: ArrayViewD<'_, A>,
            groundtruth: ArrayViewD<'_, L>,
            _parallel: bool,
        ) -> (Pass<A>, Pass<A>)
        where
            A: AffinityValue,
            L: LabelValue,
        {
            run_passes_seq(aff_pos, aff_neg, groundtruth)
        }
    }
}

fn run_passes_seq<A, L>(
    aff_pos: ArrayViewD<'_, A>,
    aff_neg: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
) -> (Pass<A>, Pass<A>)
where
    A: AffinityValue,
    L: LabelValue,
{
    (
        compute_malis_gradient(aff_pos, groundtruth.view(), true),
        compute_malis_gradient(aff_neg, groundtruth.view(), false),
    )
}

#[inline]
fn combine(pos: &MalisReport, neg: &MalisReport) -> ConstrainedReport {
    ConstrainedReport {
        loss: (pos.loss + neg.loss) / 2.0,
        loss_pos: pos.loss,
        loss_neg: neg.loss,
    }
}
