//! 消融实验依赖的通用组件.

use malis_berry::MalisConfig;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 串行的约束 MALIS 配置. 消融实验自己管理线程, 不再让两遍嵌套并行.
#[inline]
pub fn sequential_constrained() -> MalisConfig {
    MalisConfig {
        parallel: false,
        ..Default::default()
    }
}
