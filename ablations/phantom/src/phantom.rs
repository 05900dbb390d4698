//! 合成体模: 由 0 值膜分隔的块状分割, 以及带噪声的预测亲和.

use malis_berry::ground_truth_affinities;
use ndarray::{ArrayD, Dimension, IxDyn};

/// 合成样本参数.
#[derive(Copy, Clone, Debug)]
pub struct Phantom {
    /// 像素网格形状.
    pub shape: &'static [usize],

    /// 块边长. 每 `block` 个像素放一层膜.
    pub block: usize,

    /// 噪声幅度, 位于 `[0, 0.5)`.
    pub noise: f32,

    /// 随机种子.
    pub seed: u64,
}

/// 全部合成样本.
pub const PHANTOMS: [Phantom; 4] = [
    Phantom {
        shape: &[64, 64],
        block: 8,
        noise: 0.1,
        seed: 1,
    },
    Phantom {
        shape: &[64, 64],
        block: 8,
        noise: 0.45,
        seed: 2,
    },
    Phantom {
        shape: &[16, 32, 32],
        block: 6,
        noise: 0.2,
        seed: 3,
    },
    Phantom {
        shape: &[24, 48, 48],
        block: 12,
        noise: 0.35,
        seed: 4,
    },
];

/// 线性同余生成器, 仅用于可复现的噪声.
struct Lcg(u64);

impl Lcg {
    #[inline]
    fn next_unit(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

impl Phantom {
    /// 生成块状真值. 任一坐标为 `block` 的整数倍的像素为膜 (标签 0),
    /// 其余像素按所在块编号, 从 1 开始.
    pub fn groundtruth(&self) -> ArrayD<u32> {
        let per_axis: Vec<usize> = self.shape.iter().map(|&s| s / self.block + 1).collect();
        ArrayD::from_shape_fn(IxDyn(self.shape), |idx| {
            let coord = idx.slice();
            if coord.iter().any(|&c| c % self.block == 0) {
                return 0;
            }
            let id = coord
                .iter()
                .zip(per_axis.iter())
                .fold(0usize, |acc, (&c, &n)| acc * n + c / self.block);
            id as u32 + 1
        })
    }

    /// 由真值亲和加噪得到预测亲和, 结果截断至 `[0, 1]`.
    pub fn affinities(&self, groundtruth: &ArrayD<u32>) -> ArrayD<f32> {
        let mut rng = Lcg(self.seed);
        let noise = self.noise;
        ground_truth_affinities::<f32, u32>(groundtruth.view()).mapv_into(|a| {
            let jitter = (rng.next_unit() * 2.0 - 1.0) * noise;
            let base = if a > 0.5 { 1.0 - noise } else { noise };
            (base + jitter).clamp(0.0, 1.0)
        })
    }
}
