//! 运行时错误.

use std::fmt::{self, Display, Formatter};

/// 形状检查的具体位置.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShapeCheck {
    /// 亲和张量的维数应为真值维数加一.
    AffinityRank,

    /// 亲和张量第一维 (通道数) 应等于空间维数.
    AffinityChannels,

    /// 亲和张量第 `axis + 1` 维应等于真值第 `axis` 维.
    SpatialAxis(usize),

    /// 梯度张量的维数应与亲和张量一致.
    GradientRank,

    /// 梯度张量第 `axis` 维应与亲和张量一致.
    GradientAxis(usize),
}

impl Display for ShapeCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ShapeCheck::AffinityRank => write!(f, "亲和张量维数"),
            ShapeCheck::AffinityChannels => write!(f, "亲和通道数"),
            ShapeCheck::SpatialAxis(axis) => write!(f, "空间第 {axis} 维"),
            ShapeCheck::GradientRank => write!(f, "梯度张量维数"),
            ShapeCheck::GradientAxis(axis) => write!(f, "梯度张量第 {axis} 维"),
        }
    }
}

/// MALIS 损失计算错误.
#[derive(Clone, Debug, PartialEq)]
pub enum MalisError {
    /// 输入形状不匹配. 在任何计算开始前报告.
    ShapeMismatch {
        /// 出错的检查项.
        what: ShapeCheck,
        /// 期望值.
        expected: usize,
        /// 实际值.
        actual: usize,
    },

    /// 像素对归一化常数为零. 在扫描真值之后, 处理任何边之前报告.
    ///
    /// 正向遍历时意味着不存在同段像素对 (有标注像素不足两个, 或每段只有一个像素);
    /// 负向遍历时意味着不存在异段像素对 (全部有标注像素属于同一段).
    DegenerateNormalization {
        /// 是否为正向遍历.
        positive: bool,
        /// 有标注像素个数.
        labeled: u64,
    },

    /// 类别平衡时没有可统计的边.
    EmptyMask,

    /// 类别平衡裁剪区间非法. 要求 `0 < lower <= upper < 1`.
    InvalidClip(f64, f64),
}

impl Display for MalisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MalisError::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(f, "形状不匹配: {what} 期望 {expected}, 实际 {actual}"),
            MalisError::DegenerateNormalization { positive, labeled } => write!(
                f,
                "{}遍历归一化常数为零 (有标注像素 {labeled} 个)",
                if *positive { "正向" } else { "负向" }
            ),
            MalisError::EmptyMask => write!(f, "没有可用于类别平衡统计的边"),
            MalisError::InvalidClip(lower, upper) => {
                write!(f, "非法裁剪区间 [{lower}, {upper}]")
            }
        }
    }
}

impl std::error::Error for MalisError {}
