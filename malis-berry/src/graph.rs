//! 最近邻亲和图的拓扑.
//!
//! 每个真值像素 (体素) 是一个节点, 亲和张量的每个元素是一条边.
//! 亲和坐标 `(axis, x_0, ..., x_{D-1})` 表示的边连接两个真值像素:
//!
//! - `U = (x_0, ..., x_{D-1})`, 即空间部分本身;
//! - `V` 为 `U` 在第 `axis` 维上减一.
//!
//! 当 `x_axis == 0` 时 `V` 不存在, 该边无效. 不做环绕, 也不支持其它邻域.

use ndarray::{ArrayD, ArrayViewD};

use crate::error::{MalisError, ShapeCheck};
use crate::iter::CoordIter;
use crate::value::{AffinityValue, LabelValue};
use crate::{EdgeIndex, MalisResult, NodeIndex};

/// 一条有效边. `u`, `v` 为两端真值像素的行优先线性索引.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Edge {
    /// 边所在的通道 (空间轴).
    pub axis: usize,
    /// 亲和坐标空间部分对应的节点.
    pub u: NodeIndex,
    /// 沿 `axis` 向前一格的节点.
    pub v: NodeIndex,
}

/// 根据真值推断的边类型 ("真值亲和").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeTruth {
    /// 位于边界, 不存在 `V` 端.
    Invalid,

    /// 两端为同一个非零标签. 真值亲和为 1.
    Connected,

    /// 两端均有标注但标签不同. 真值亲和为 0.
    Separated,

    /// 至少一端未标注. 真值亲和为 0.
    Ignored,
}

impl EdgeTruth {
    #[inline]
    fn classify<L: LabelValue>(label_u: L, label_v: L) -> Self {
        if label_u.is_ignored() || label_v.is_ignored() {
            EdgeTruth::Ignored
        } else if label_u == label_v {
            EdgeTruth::Connected
        } else {
            EdgeTruth::Separated
        }
    }

    /// 真值亲和是否为 1.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, EdgeTruth::Connected)
    }
}

/// 亲和图拓扑, 完全由真值形状决定.
///
/// 所有线性索引均指 **逻辑** 行优先顺序, 与 `ndarray` 的内存布局无关.
#[derive(Clone, Debug)]
pub struct AffinityGraph {
    pixel_shape: Vec<usize>,
    pixel_strides: Vec<usize>,
    node_count: usize,
}

impl AffinityGraph {
    /// 以真值形状 `pixel_shape` 构建拓扑.
    pub fn new(pixel_shape: &[usize]) -> Self {
        let mut pixel_strides = vec![1; pixel_shape.len()];
        for d in (0..pixel_shape.len().saturating_sub(1)).rev() {
            pixel_strides[d] = pixel_strides[d + 1] * pixel_shape[d + 1];
        }
        Self {
            pixel_shape: pixel_shape.to_vec(),
            pixel_strides,
            node_count: pixel_shape.iter().product(),
        }
    }

    /// 空间维数 `D`.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.pixel_shape.len()
    }

    /// 真值形状.
    #[inline]
    pub fn pixel_shape(&self) -> &[usize] {
        &self.pixel_shape
    }

    /// 对应的亲和张量形状 `(D, ...pixel_shape)`.
    pub fn edge_shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.ndim() + 1);
        shape.push(self.ndim());
        shape.extend_from_slice(&self.pixel_shape);
        shape
    }

    /// 节点 (像素) 个数.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// 边个数 (含无效边).
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.ndim() * self.node_count
    }

    /// 真值坐标 -> 节点线性索引. 不检查越界.
    #[inline]
    pub fn node_index(&self, coord: &[usize]) -> NodeIndex {
        debug_assert_eq!(coord.len(), self.ndim());
        coord
            .iter()
            .zip(self.pixel_strides.iter())
            .map(|(c, s)| c * s)
            .sum()
    }

    /// 边线性索引 -> 亲和坐标 `(axis, spatial...)`.
    pub fn edge_coord(&self, edge: EdgeIndex) -> Vec<usize> {
        debug_assert!(edge < self.edge_count());
        let (axis, node) = (edge / self.node_count, edge % self.node_count);
        let mut coord = Vec::with_capacity(self.ndim() + 1);
        coord.push(axis);
        coord.extend(
            self.pixel_strides
                .iter()
                .zip(self.pixel_shape.iter())
                .map(|(s, n)| node / s % n),
        );
        coord
    }

    /// 解析边线性索引. 无效边 (或越界) 返回 `None`.
    pub fn edge(&self, edge: EdgeIndex) -> Option<Edge> {
        if edge >= self.edge_count() {
            return None;
        }
        let (axis, u) = (edge / self.node_count, edge % self.node_count);
        let stride = self.pixel_strides[axis];
        if u / stride % self.pixel_shape[axis] == 0 {
            return None;
        }
        Some(Edge {
            axis,
            u,
            v: u - stride,
        })
    }

    /// 解析亲和坐标 `(axis, spatial...)`. 无效边返回 `None`.
    pub fn edge_at(&self, coord: &[usize]) -> Option<Edge> {
        debug_assert_eq!(coord.len(), self.ndim() + 1);
        let axis = coord[0];
        if coord[axis + 1] == 0 {
            return None;
        }
        let u = self.node_index(&coord[1..]);
        Some(Edge {
            axis,
            u,
            v: u - self.pixel_strides[axis],
        })
    }

    /// 按边线性索引推断真值亲和. `labels` 为行优先展开的真值.
    #[inline]
    pub fn edge_truth<L: LabelValue>(&self, edge: EdgeIndex, labels: &[L]) -> EdgeTruth {
        Self::truth_of(self.edge(edge), labels)
    }

    /// 按亲和坐标推断真值亲和. `labels` 为行优先展开的真值.
    #[inline]
    pub fn edge_truth_at<L: LabelValue>(&self, coord: &[usize], labels: &[L]) -> EdgeTruth {
        Self::truth_of(self.edge_at(coord), labels)
    }

    #[inline]
    fn truth_of<L: LabelValue>(edge: Option<Edge>, labels: &[L]) -> EdgeTruth {
        match edge {
            None => EdgeTruth::Invalid,
            Some(Edge { u, v, .. }) => EdgeTruth::classify(labels[u], labels[v]),
        }
    }
}

/// 检查亲和张量, 真值 (以及可选的梯度张量) 形状是否相容.
pub(crate) fn check_shapes<A, L>(
    affinities: &ArrayViewD<'_, A>,
    groundtruth: &ArrayViewD<'_, L>,
    gradient_shape: Option<&[usize]>,
) -> MalisResult<()> {
    let mismatch = |what: ShapeCheck, expected: usize, actual: usize| -> MalisResult<()> {
        log::warn!("shape mismatch on {what}: expected {expected}, got {actual}");
        Err(MalisError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    };

    let dim = groundtruth.ndim();
    if affinities.ndim() != dim + 1 {
        return mismatch(ShapeCheck::AffinityRank, dim + 1, affinities.ndim());
    }
    let aff_shape = affinities.shape();
    if aff_shape[0] != dim {
        return mismatch(ShapeCheck::AffinityChannels, dim, aff_shape[0]);
    }
    for (axis, (&expected, &actual)) in groundtruth
        .shape()
        .iter()
        .zip(aff_shape[1..].iter())
        .enumerate()
    {
        if expected != actual {
            return mismatch(ShapeCheck::SpatialAxis(axis), expected, actual);
        }
    }

    if let Some(grad_shape) = gradient_shape {
        if grad_shape.len() != aff_shape.len() {
            return mismatch(ShapeCheck::GradientRank, aff_shape.len(), grad_shape.len());
        }
        for (axis, (&expected, &actual)) in aff_shape.iter().zip(grad_shape.iter()).enumerate() {
            if expected != actual {
                return mismatch(ShapeCheck::GradientAxis(axis), expected, actual);
            }
        }
    }
    Ok(())
}

/// 由真值推断完整的真值亲和张量, 形状为 `(D, ...groundtruth.shape())`.
///
/// 有效且两端为同一非零标签的边为 1, 其余 (包括边界边) 为 0.
pub fn ground_truth_affinities<A, L>(groundtruth: ArrayViewD<'_, L>) -> ArrayD<A>
where
    A: AffinityValue,
    L: LabelValue,
{
    fill_by_truth(groundtruth, |truth| truth.is_connected())
}

/// 亲和掩码: 有效且两端均有标注的边为 1, 其余为 0.
///
/// 即屏蔽所有连向未标注像素 (标签 `0`) 的边.
pub fn affinity_mask<A, L>(groundtruth: ArrayViewD<'_, L>) -> ArrayD<A>
where
    A: AffinityValue,
    L: LabelValue,
{
    fill_by_truth(groundtruth, |truth| {
        matches!(truth, EdgeTruth::Connected | EdgeTruth::Separated)
    })
}

fn fill_by_truth<A, L, F>(groundtruth: ArrayViewD<'_, L>, pred: F) -> ArrayD<A>
where
    A: AffinityValue,
    L: LabelValue,
    F: Fn(EdgeTruth) -> bool,
{
    let graph = AffinityGraph::new(groundtruth.shape());
    let labels: Vec<L> = groundtruth.iter().copied().collect();
    let edge_shape = graph.edge_shape();
    let mut out = ArrayD::<A>::zeros(edge_shape.as_slice());
    for coord in CoordIter::new(&edge_shape) {
        if pred(graph.edge_truth_at(&coord, &labels)) {
            out[coord.as_slice()] = A::one();
        }
    }
    out
}
