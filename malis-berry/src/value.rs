//! 亲和值与真值标签的类型约束.

use num::{Float, PrimInt};
use std::fmt::Debug;

/// 亲和张量 / 梯度张量的元素类型. 目前仅为 `f32` 和 `f64` 实现.
///
/// 损失与梯度的内部累加一律以 `f64` 进行, 写回张量时再收窄为本类型.
pub trait AffinityValue: Float + Debug + Send + Sync + 'static {
    /// 扩展为 `f64`. 无损.
    fn widen(self) -> f64;

    /// 从 `f64` 收窄. 对 `f32` 可能损失精度.
    fn narrow(v: f64) -> Self;
}

macro_rules! impl_affinity_value {
    ($t: ty) => {
        impl AffinityValue for $t {
            #[inline]
            fn widen(self) -> f64 {
                self as f64
            }

            #[inline]
            fn narrow(v: f64) -> Self {
                v as $t
            }
        }
    };
}

impl_affinity_value!(f32);
impl_affinity_value!(f64);

/// 真值标签类型. 任意原生整数均可, 其中 `0` 保留为 "未标注".
pub trait LabelValue: PrimInt + Debug + Send + Sync + 'static {
    /// 是否为未标注 (忽略) 标签.
    #[inline]
    fn is_ignored(self) -> bool {
        self.is_zero()
    }
}

impl<T: PrimInt + Debug + Send + Sync + 'static> LabelValue for T {}
