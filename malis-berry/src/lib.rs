#![warn(missing_docs)]

//! 核心库. 提供 MALIS (MAximin-affinity Learning of Image Segmentation)
//! 损失及其对稠密亲和图的梯度.
//!
//! 给定预测的最近邻亲和张量 (形状 `(D, ...)`) 与逐像素真值标签 (形状 `(...)`),
//! 计算标量损失, 误分类率, Rand 指数以及与亲和张量同形的梯度张量,
//! 用于亲和预测网络的训练.
//!
//! # 注意
//!
//! 1. 真值标签 `0` 保留为 "未标注", 不参与任何像素对统计.
//! 2. 仅支持最近邻 (每轴一跳) 拓扑. 亲和坐标 `(axis, x...)` 连接 `x` 与
//!   `x` 在第 `axis` 维上减一的像素; 第 `axis` 维坐标为 0 的边无效.
//! 3. 输入非法时返回 [`MalisError`], 不会 panic.
//!
//! # 开发计划
//!
//! ### 单遍 MALIS 梯度 ✅
//!
//! Kruskal 最大生成树 + 并查集 + 重叠袋.
//!
//! 实现位于 `malis-berry/src/kernel.rs`.
//!
//! ### 约束 (对称) MALIS ✅
//!
//! 正负两遍分别写入独立缓冲区后相加. 两遍可借助 `rayon` 并行.
//!
//! 实现位于 `malis-berry/src/constrained.rs`.
//!
//! ### 真值亲和与类别平衡 ✅
//!
//! 实现位于 `malis-berry/src/graph.rs` 和 `malis-berry/src/balance.rs`.
//!
//! ### 任意偏移邻域 (长程亲和, 对角连通) ⌛️
//!
//! 需要将 `AffinityGraph` 的 "前一格" 约定改为显式偏移向量列表.

/// 真值像素 (并查集节点) 的行优先线性索引.
type NodeIndex = usize;

/// 亲和张量元素 (边) 的行优先线性索引.
type EdgeIndex = usize;

pub mod consts;

mod error;
pub use error::{MalisError, ShapeCheck};

/// 计算运行时错误.
pub type MalisResult<T> = Result<T, MalisError>;

mod value;
pub use value::{AffinityValue, LabelValue};

mod iter;
pub use iter::CoordIter;

mod graph;
pub use graph::{affinity_mask, ground_truth_affinities, AffinityGraph, Edge, EdgeTruth};

mod overlap;

mod kernel;
pub use kernel::{accumulate_malis_gradient, compute_malis_gradient, MalisReport};

mod constrained;
pub use constrained::{compute_constrained_malis_gradient, split_affinities, ConstrainedReport};

pub mod balance;

mod config;
pub use config::{MalisConfig, MalisMode, MalisOutcome};

pub mod prelude;
