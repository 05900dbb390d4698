use itertools::Itertools;
use std::collections::BTreeMap;
use std::mem;

use crate::value::LabelValue;
use crate::NodeIndex;

/// 单个集合的重叠袋: 真值标签 -> 该集合中带此标签的像素个数.
pub(crate) type OverlapBag<L> = BTreeMap<L, usize>;

/// 以并查集代表元为索引的重叠袋集合.
///
/// 袋的所有权属于代表元. 合并时被吸收一方的袋被整体取出 (`mem::take`)
/// 并倾倒进存活一方, 不存在共享引用. 使用有序映射, 保证交叉遍历顺序
/// (从而浮点累加顺序) 确定.
pub(crate) struct OverlapBags<L> {
    bags: Vec<OverlapBag<L>>,
}

impl<L: LabelValue> OverlapBags<L> {
    /// `nodes` 个空袋.
    pub fn new(nodes: usize) -> Self {
        Self {
            bags: (0..nodes).map(|_| BTreeMap::new()).collect(),
        }
    }

    /// 向单像素集合 `node` 放入一个带 `label` 的像素.
    #[inline]
    pub fn seed(&mut self, node: NodeIndex, label: L) {
        *self.bags[node].entry(label).or_insert(0) += 1;
    }

    /// 获取代表元 `rep` 的袋.
    #[inline]
    pub fn bag(&self, rep: NodeIndex) -> &OverlapBag<L> {
        &self.bags[rep]
    }

    /// 两个袋的完全交叉: `(label_a, label_b, count_a * count_b)`.
    pub fn pairs(&self, a: NodeIndex, b: NodeIndex) -> impl Iterator<Item = (L, L, u64)> + '_ {
        debug_assert_ne!(a, b);
        self.bags[a]
            .iter()
            .cartesian_product(self.bags[b].iter())
            .map(|((&la, &ca), (&lb, &cb))| (la, lb, (ca * cb) as u64))
    }

    /// 将 `gone` 的袋倾倒进 `keep`, 之后 `gone` 的袋为空.
    pub fn absorb(&mut self, keep: NodeIndex, gone: NodeIndex) {
        debug_assert_ne!(keep, gone);
        let drained = mem::take(&mut self.bags[gone]);
        let target = &mut self.bags[keep];
        for (label, count) in drained {
            *target.entry(label).or_insert(0) += count;
        }
    }

    /// 代表元 `rep` 所代表集合中的有标注像素个数.
    #[inline]
    pub fn labeled_in(&self, rep: NodeIndex) -> usize {
        self.bags[rep].values().sum()
    }
}
