//! 通用常量.

/// 亲和值判定门限.
///
/// 正向遍历中, 亲和值 `<=` 该值的同段像素对计为误分类;
/// 负向遍历中, 亲和值 `>` 该值的异段像素对计为误分类.
pub const AFFINITY_THRESHOLD: f64 = 0.5;

/// 类别平衡时, 正样本比例的默认裁剪下界.
pub const BALANCE_CLIP_LOWER: f64 = 0.05;

/// 类别平衡时, 正样本比例的默认裁剪上界.
pub const BALANCE_CLIP_UPPER: f64 = 0.95;
