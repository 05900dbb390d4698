//! 对磁盘上 `.npy` 样本的加载封装.
//!
//! 样本根目录下每个子目录是一个样本, 包含 `affinities.npy` (`f32`, 形状 `(D, ...)`)
//! 和 `groundtruth.npy` (`u32`, 形状 `(...)`).

use ndarray::ArrayD;
use ndarray_npy::{read_npy, ReadNpyError};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 亲和张量文件名.
pub const AFFINITIES_NPY: &str = "affinities.npy";

/// 真值文件名.
pub const GROUNDTRUTH_NPY: &str = "groundtruth.npy";

/// 一个磁盘样本.
#[derive(Debug, Clone)]
pub struct Case {
    /// 预测亲和.
    pub affinities: ArrayD<f32>,

    /// 真值标签.
    pub groundtruth: ArrayD<u32>,
}

/// 获取样本根目录.
///
/// 1. 若环境变量 `$MALIS_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/malis` (无法确定主目录时返回 `None`).
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("MALIS_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => {
            let mut ans = dirs::home_dir()?;
            ans.extend(["dataset", "malis"]);
            Some(ans)
        }
    }
}

/// 从样本目录 `dir` 读取一个样本.
pub fn load_case<P: AsRef<Path>>(dir: P) -> Result<Case, ReadNpyError> {
    let dir = dir.as_ref();
    Ok(Case {
        affinities: read_npy(dir.join(AFFINITIES_NPY))?,
        groundtruth: read_npy(dir.join(GROUNDTRUTH_NPY))?,
    })
}

/// 按目录名升序惰性加载 `root` 下全部样本. 迭代项为 `(样本名, 读取结果)`.
pub fn case_loader<P: AsRef<Path>>(
    root: P,
) -> io::Result<impl Iterator<Item = (String, Result<Case, ReadNpyError>)>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root.as_ref())?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.join(GROUNDTRUTH_NPY).is_file())
        .collect();
    dirs.sort();
    log::info!("found {} cases under {}", dirs.len(), root.as_ref().display());

    Ok(dirs.into_iter().map(|d| {
        let name = d
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (name, load_case(&d))
    }))
}

/// 从 `$MALIS_DATA_DIR` 或者 `$HOME/dataset/malis` 加载全部样本.
/// 目录不存在或不可读时返回空 `Vec`.
pub fn cases_from_env_or_home() -> Vec<(String, Result<Case, ReadNpyError>)> {
    match data_dir_from_env_or_home() {
        Some(d) if d.is_dir() => match case_loader(&d) {
            Ok(it) => it.collect(),
            Err(e) => {
                log::warn!("cannot read {}: {e}", d.display());
                vec![]
            }
        },
        _ => vec![],
    }
}
