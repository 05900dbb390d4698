use std::iter::FusedIterator;

/// 任意维数的行优先坐标迭代器 (最后一维变化最快).
///
/// 与 `ndarray::indices` 的遍历顺序完全一致, 但直接产出 `Vec<usize>`,
/// 便于配合 [`AffinityGraph`](crate::AffinityGraph) 的切片接口使用.
///
/// - 任一维长度为 0 时, 不产出任何坐标;
/// - 零维形状产出恰好一个空坐标.
#[derive(Debug, Clone)]
pub struct CoordIter {
    shape: Vec<usize>,
    cur: Vec<usize>,
    done: bool,
}

impl CoordIter {
    /// 创建遍历 `shape` 内全部坐标的迭代器.
    #[inline]
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            cur: vec![0; shape.len()],
            done: shape.iter().any(|&n| n == 0),
        }
    }

    /// 剩余坐标个数.
    fn remaining(&self) -> usize {
        if self.done {
            return 0;
        }
        let mut consumed = 0;
        for (&c, &n) in self.cur.iter().zip(self.shape.iter()) {
            consumed = consumed * n + c;
        }
        self.shape.iter().product::<usize>() - consumed
    }
}

impl Iterator for CoordIter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let ret = self.cur.clone();

        // 从最后一维开始进位. 全部进位溢出即结束.
        self.done = true;
        for (c, &n) in self.cur.iter_mut().zip(self.shape.iter()).rev() {
            *c += 1;
            if *c < n {
                self.done = false;
                break;
            }
            *c = 0;
        }
        Some(ret)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for CoordIter {}

impl FusedIterator for CoordIter {}
