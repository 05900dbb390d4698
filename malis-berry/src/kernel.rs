//! 单遍 MALIS 梯度.
//!
//! 以 Kruskal 算法按亲和值降序构建最大生成树 (maximin 树). 每次合并两个集合时,
//! 根据两侧重叠袋的完全交叉统计本次合并首次连通的真值像素对, 据此累加损失与梯度.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use log::{debug, trace};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};
use ordered_float::OrderedFloat;
use petgraph::unionfind::UnionFind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::AFFINITY_THRESHOLD;
use crate::graph::{check_shapes, AffinityGraph};
use crate::overlap::OverlapBags;
use crate::value::{AffinityValue, LabelValue};
use crate::{EdgeIndex, MalisError, MalisResult};

/// 单遍计算的标量输出.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MalisReport {
    /// 归一化后的损失. 非负.
    pub loss: f64,

    /// 误分类像素对比例.
    pub classification_error: f64,

    /// `1 - classification_error`.
    pub rand_index: f64,

    /// 像素对归一化常数. 恒为正.
    pub n_pair_norm: u64,

    /// 误分类像素对个数.
    pub n_pair_incorrect: u64,

    /// 实际执行的并查集合并次数.
    pub merges: usize,
}

/// 计算单遍 MALIS 梯度, 返回新分配的梯度张量 (与 `affinities` 同形) 和标量输出.
///
/// `pos` 为 `true` 时计算正向遍历 (惩罚同段像素未连通),
/// 否则计算负向遍历 (惩罚异段像素被连通). 真值标签 `0` 不参与像素对统计.
///
/// # 错误
///
/// - 形状不相容时返回 [`MalisError::ShapeMismatch`];
/// - 归一化常数为零时返回 [`MalisError::DegenerateNormalization`].
pub fn compute_malis_gradient<A, L>(
    affinities: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
    pos: bool,
) -> MalisResult<(ArrayD<A>, MalisReport)>
where
    A: AffinityValue,
    L: LabelValue,
{
    let mut gradients = ArrayD::<A>::zeros(affinities.raw_dim());
    let report = accumulate_malis_gradient(affinities, groundtruth, pos, gradients.view_mut())?;
    Ok((gradients, report))
}

/// 同 [`compute_malis_gradient`], 但将梯度 **累加** 进调用方提供的 `gradients`.
///
/// # 累加约定
///
/// 函数只对 `gradients` 做加法, 从不清零. 首次调用前应由调用方清零.
/// 每条被处理的边先在本地求出本遍贡献并除以归一化常数, 再加进缓冲区,
/// 缓冲区中已有的值不会被重新缩放. 因此把正负两遍依次累加进同一缓冲区,
/// 与分别计算再相加的结果逐位一致.
///
/// 无效边和冗余边 (两端已属同一集合) 所在位置不会被写入.
/// 出错时 `gradients` 保持不变.
pub fn accumulate_malis_gradient<A, L>(
    affinities: ArrayViewD<'_, A>,
    groundtruth: ArrayViewD<'_, L>,
    pos: bool,
    mut gradients: ArrayViewMutD<'_, A>,
) -> MalisResult<MalisReport>
where
    A: AffinityValue,
    L: LabelValue,
{
    check_shapes(&affinities, &groundtruth, Some(gradients.shape()))?;
    let graph = AffinityGraph::new(groundtruth.shape());

    // 1. 单点集合, 重叠袋, 段大小.
    let mut bags = OverlapBags::new(graph.node_count());
    let mut segment_sizes: BTreeMap<L, u64> = BTreeMap::new();
    let (mut n_labeled, mut n_pair_pos) = (0u64, 0u64);
    for (node, &label) in groundtruth.iter().enumerate() {
        if label.is_ignored() {
            continue;
        }
        bags.seed(node, label);
        let size = segment_sizes.entry(label).or_insert(0);
        *size += 1;
        n_labeled += 1;
        n_pair_pos += *size - 1;
    }

    // 2. 归一化.
    let n_pair_norm = pair_normalization(pos, n_labeled, n_pair_pos)?;
    debug!(
        "malis {} pass: {} nodes, {} labeled, {} segments, n_pair_norm = {n_pair_norm}",
        polarity_name(pos),
        graph.node_count(),
        n_labeled,
        segment_sizes.len(),
    );

    // 3. 按亲和值降序排列边. 稳定排序, 相同亲和值按线性索引升序.
    let values: Vec<f64> = affinities.iter().map(|a| a.widen()).collect();
    let mut queue: Vec<EdgeIndex> = (0..values.len()).collect();
    queue.sort_by_key(|&e| Reverse(OrderedFloat(values[e])));

    // 4. Kruskal.
    let mut sets = UnionFind::<usize>::new(graph.node_count());
    let mut loss = 0.0f64;
    let mut n_pair_incorrect = 0u64;
    let mut merges = 0usize;
    for edge_index in queue {
        let Some(edge) = graph.edge(edge_index) else {
            continue;
        };
        let set_u = sets.find_mut(edge.u);
        let set_v = sets.find_mut(edge.v);
        if set_u == set_v {
            continue;
        }
        sets.union(set_u, set_v);
        merges += 1;

        let affinity = values[edge_index];
        let mut contribution = 0.0f64;
        for (label_u, label_v, n_pair) in bags.pairs(set_u, set_v) {
            let (gradient, incorrect) = match (pos, label_u == label_v) {
                (true, true) => (1.0 - affinity, affinity <= AFFINITY_THRESHOLD),
                (false, false) => (-affinity, affinity > AFFINITY_THRESHOLD),
                _ => continue,
            };
            let n = n_pair as f64;
            loss += gradient * gradient * n;
            contribution += gradient * n;
            if incorrect {
                n_pair_incorrect += n_pair;
            }
        }

        let coord = graph.edge_coord(edge_index);
        let cell = &mut gradients[coord.as_slice()];
        *cell = *cell + A::narrow(contribution / n_pair_norm as f64);

        let (keep, gone) = if sets.find_mut(set_u) == set_v {
            (set_v, set_u)
        } else {
            (set_u, set_v)
        };
        let before = if cfg!(debug_assertions) {
            bags.labeled_in(keep) + bags.labeled_in(gone)
        } else {
            0
        };
        bags.absorb(keep, gone);
        debug_assert_eq!(bags.labeled_in(keep), before);
        trace!(
            "edge {edge_index} ({affinity:.4}) merged {gone} into {keep}, bag size {}",
            bags.bag(keep).len()
        );
    }

    // 5. 输出.
    let norm = n_pair_norm as f64;
    let classification_error = n_pair_incorrect as f64 / norm;
    let report = MalisReport {
        loss: loss / norm,
        classification_error,
        rand_index: 1.0 - classification_error,
        n_pair_norm,
        n_pair_incorrect,
        merges,
    };
    debug!(
        "malis {} pass done: loss = {:.6}, rand = {:.6}, {merges} merges",
        polarity_name(pos),
        report.loss,
        report.rand_index,
    );
    Ok(report)
}

/// 正向遍历取同段像素对个数; 负向遍历取全部有标注像素对减去同段像素对.
fn pair_normalization(pos: bool, n_labeled: u64, n_pair_pos: u64) -> MalisResult<u64> {
    let norm = if pos {
        n_pair_pos
    } else {
        let total = n_labeled * n_labeled.saturating_sub(1) / 2;
        total - n_pair_pos
    };
    if norm == 0 {
        log::warn!(
            "degenerate {} normalization with {n_labeled} labeled pixels",
            polarity_name(pos)
        );
        return Err(MalisError::DegenerateNormalization {
            positive: pos,
            labeled: n_labeled,
        });
    }
    Ok(norm)
}

#[inline]
fn polarity_name(pos: bool) -> &'static str {
    if pos {
        "positive"
    } else {
        "negative"
    }
}

#[cfg(test)]
mod tests {
    use super::{accumulate_malis_gradient, compute_malis_gradient, pair_normalization};
    use crate::error::{MalisError, ShapeCheck};
    use ndarray::{array, s, ArrayD, IxDyn};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 1D 真值 `[1, 1, 2, 2]`, 第 0 条边是边界边.
    fn line() -> (ArrayD<f64>, ArrayD<u32>) {
        let aff = array![[0.3, 0.9, 0.1, 0.9]].into_dyn();
        let gt = array![1u32, 1, 2, 2].into_dyn();
        (aff, gt)
    }

    /// 由简单线性同余生成的确定性 "随机" 亲和值.
    fn noisy(shape: &[usize], seed: u64) -> ArrayD<f64> {
        let mut state = seed;
        ArrayD::from_shape_simple_fn(IxDyn(shape), || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        })
    }

    fn blocks() -> ArrayD<u16> {
        array![
            [1u16, 1, 1, 2, 2],
            [1, 1, 0, 2, 2],
            [3, 3, 0, 2, 2],
            [3, 3, 3, 3, 2],
        ]
        .into_dyn()
    }

    #[test]
    fn test_line_positive() {
        // 其它测试可能已设置 logger.
        let _ = simple_logger::init_with_level(log::Level::Trace);
        let (aff, gt) = line();
        let (grad, r) = compute_malis_gradient(aff.view(), gt.view(), true).unwrap();
        assert_eq!(r.n_pair_norm, 2);
        assert_eq!(r.merges, 3);
        // (1 - 0.9)^2 * 2 / 2
        assert!(f64_eq(r.loss, 0.01));
        assert_eq!(r.classification_error, 0.0);
        assert_eq!(r.rand_index, 1.0);

        assert_eq!(grad[[0, 0]], 0.0);
        assert!(f64_eq(grad[[0, 1]], 0.05));
        // 跨段边在正向遍历中不贡献.
        assert_eq!(grad[[0, 2]], 0.0);
        assert!(f64_eq(grad[[0, 3]], 0.05));
    }

    #[test]
    fn test_line_negative() {
        let (aff, gt) = line();
        let (grad, r) = compute_malis_gradient(aff.view(), gt.view(), false).unwrap();
        // C(4, 2) - 2
        assert_eq!(r.n_pair_norm, 4);
        // 0.1^2 * 4 / 4
        assert!(f64_eq(r.loss, 0.01));
        assert_eq!(r.n_pair_incorrect, 0);

        assert_eq!(grad[[0, 1]], 0.0);
        assert!(f64_eq(grad[[0, 2]], -0.1));
        assert_eq!(grad[[0, 3]], 0.0);
    }

    #[test]
    fn test_misclassified_pairs() {
        let aff = array![[0.0, 0.2]].into_dyn();
        let gt = array![5i64, 5].into_dyn();
        let (grad, r) = compute_malis_gradient(aff.view(), gt.view(), true).unwrap();
        assert_eq!(r.n_pair_incorrect, 1);
        assert_eq!(r.classification_error, 1.0);
        assert_eq!(r.rand_index, 0.0);
        assert!(f64_eq(r.loss, 0.64));
        assert!(f64_eq(grad[[0, 1]], 0.8));

        // 异段像素以高亲和值连通.
        let aff = array![[0.0, 0.7, 0.9]].into_dyn();
        let gt = array![1u8, 2, 2].into_dyn();
        let (_, r) = compute_malis_gradient(aff.view(), gt.view(), false).unwrap();
        assert_eq!(r.n_pair_norm, 2);
        assert_eq!(r.n_pair_incorrect, 2);
        assert!(f64_eq(r.loss, 0.49));
    }

    #[test]
    fn test_all_unlabeled_is_degenerate() {
        let aff = array![[[0.1, 0.5], [0.5, 0.9]], [[0.2, 0.3], [0.4, 0.6]]].into_dyn();
        let gt = ArrayD::<u32>::zeros(IxDyn(&[2, 2]));
        for pos in [true, false] {
            let e = compute_malis_gradient(aff.view(), gt.view(), pos).unwrap_err();
            assert_eq!(
                e,
                MalisError::DegenerateNormalization {
                    positive: pos,
                    labeled: 0
                }
            );
        }
    }

    #[test]
    fn test_single_segment_negative_is_degenerate() {
        let aff = array![[0.0, 0.5, 0.5]].into_dyn();
        let gt = array![4u8, 4, 0].into_dyn();
        assert!(compute_malis_gradient(aff.view(), gt.view(), true).is_ok());
        assert!(matches!(
            compute_malis_gradient(aff.view(), gt.view(), false),
            Err(MalisError::DegenerateNormalization { positive: false, .. })
        ));
    }

    #[test]
    fn test_pair_normalization() {
        assert_eq!(pair_normalization(true, 5, 4), Ok(4));
        assert_eq!(pair_normalization(false, 5, 4), Ok(6));
        assert!(pair_normalization(true, 1, 0).is_err());
        assert!(pair_normalization(false, 1, 0).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let gt = blocks();
        let aff = noisy(&[2, 4, 4], 1);
        let e = compute_malis_gradient(aff.view(), gt.view(), true).unwrap_err();
        assert_eq!(
            e,
            MalisError::ShapeMismatch {
                what: ShapeCheck::SpatialAxis(1),
                expected: 5,
                actual: 4
            }
        );

        let aff = noisy(&[3, 4, 5], 1);
        let e = compute_malis_gradient(aff.view(), gt.view(), true).unwrap_err();
        assert!(matches!(
            e,
            MalisError::ShapeMismatch {
                what: ShapeCheck::AffinityChannels,
                ..
            }
        ));

        let aff = noisy(&[2, 4, 5], 1);
        let flat = gt.view().into_shape(20).unwrap().into_dyn();
        let e = compute_malis_gradient(aff.view(), flat, true).unwrap_err();
        assert!(matches!(
            e,
            MalisError::ShapeMismatch {
                what: ShapeCheck::AffinityRank,
                ..
            }
        ));

        let mut grad = ArrayD::<f64>::zeros(IxDyn(&[2, 4, 6]));
        let e =
            accumulate_malis_gradient(aff.view(), gt.view(), true, grad.view_mut()).unwrap_err();
        assert!(matches!(
            e,
            MalisError::ShapeMismatch {
                what: ShapeCheck::GradientAxis(2),
                ..
            }
        ));
        // 出错时不写入.
        assert_eq!(grad.sum(), 0.0);
    }

    #[test]
    fn test_boundary_edges_never_contribute() {
        let gt = blocks();
        let mut aff = noisy(&[2, 4, 5], 7);
        // 把边界边设为最高亲和值, 使其最先被处理.
        aff.slice_mut(s![0, 0, ..]).fill(1.0);
        aff.slice_mut(s![1, .., 0]).fill(1.0);

        for pos in [true, false] {
            let (grad, _) = compute_malis_gradient(aff.view(), gt.view(), pos).unwrap();
            for w in 0..5 {
                assert_eq!(grad[[0, 0, w]], 0.0);
            }
            for h in 0..4 {
                assert_eq!(grad[[1, h, 0]], 0.0);
            }
        }
    }

    #[test]
    fn test_report_invariants() {
        let gt = blocks();
        for seed in 0..16 {
            let aff = noisy(&[2, 4, 5], seed);
            for pos in [true, false] {
                let (_, r) = compute_malis_gradient(aff.view(), gt.view(), pos).unwrap();
                assert!(r.loss >= 0.0);
                assert!(f64_eq(r.classification_error + r.rand_index, 1.0));
                assert!(r.n_pair_incorrect <= r.n_pair_norm);
                // 网格连通, 最终合并为一棵生成树.
                assert_eq!(r.merges, 4 * 5 - 1);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let gt = blocks();
        let aff = noisy(&[2, 4, 5], 42);
        let (g1, r1) = compute_malis_gradient(aff.view(), gt.view(), false).unwrap();
        let (g2, r2) = compute_malis_gradient(aff.view(), gt.view(), false).unwrap();
        assert_eq!(g1, g2);
        assert_eq!(r1, r2);
    }

    /// 累加模式只加不覆盖: 重复累加两次等于单次结果的两倍.
    #[test]
    fn test_accumulates_into_buffer() {
        let gt = blocks();
        let aff = noisy(&[2, 4, 5], 3);
        let (once, _) = compute_malis_gradient(aff.view(), gt.view(), true).unwrap();

        let mut buf = ArrayD::<f64>::zeros(IxDyn(&[2, 4, 5]));
        accumulate_malis_gradient(aff.view(), gt.view(), true, buf.view_mut()).unwrap();
        accumulate_malis_gradient(aff.view(), gt.view(), true, buf.view_mut()).unwrap();
        assert_eq!(buf, &once * 2.0);
    }

    /// 梯度张量可以是非标准内存布局 (例如转置视图).
    #[test]
    fn test_non_standard_layout() {
        let gt = blocks();
        let aff = noisy(&[2, 4, 5], 11);
        let (expected, _) = compute_malis_gradient(aff.view(), gt.view(), true).unwrap();

        let mut storage = ArrayD::<f64>::zeros(IxDyn(&[5, 4, 2]));
        let grad = storage.view_mut().reversed_axes();
        accumulate_malis_gradient(aff.view(), gt.view(), true, grad).unwrap();
        assert_eq!(storage.view().reversed_axes(), expected.view());
    }

    #[test]
    fn test_f32_affinities() {
        let aff = array![[0.3f32, 0.9, 0.1, 0.9]].into_dyn();
        let gt = array![1u8, 1, 2, 2].into_dyn();
        let (grad, r) = compute_malis_gradient(aff.view(), gt.view(), true).unwrap();
        assert!((r.loss - 0.01).abs() < 1e-6);
        assert!((grad[[0, 1]] - 0.05).abs() < 1e-6);
    }
}
