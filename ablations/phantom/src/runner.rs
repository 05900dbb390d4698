//! 程序运行函数.

use crate::phantom::PHANTOMS;
use crate::profile::Profile;
use crate::result::AblationResult;
use malis_berry::{MalisConfig, MalisMode};
use ndarray::ArrayD;
use std::thread;
use utils::loader;

/// 一个待计算样本.
struct Sample {
    name: String,
    affinities: ArrayD<f32>,
    groundtruth: ArrayD<u32>,
}

/// 汇集合成体模与磁盘样本.
fn collect_samples() -> Vec<Sample> {
    let mut samples: Vec<Sample> = PHANTOMS
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let groundtruth = p.groundtruth();
            Sample {
                name: format!("phantom-{i}"),
                affinities: p.affinities(&groundtruth),
                groundtruth,
            }
        })
        .collect();

    for (name, case) in loader::cases_from_env_or_home() {
        match case {
            Ok(c) => samples.push(Sample {
                name,
                affinities: c.affinities,
                groundtruth: c.groundtruth,
            }),
            Err(e) => log::warn!("skip case `{name}`: {e}"),
        }
    }
    samples
}

/// 在全部样本上以 `config` 计算一遍.
fn profile_mode(config: MalisConfig, samples: &[Sample]) -> Profile {
    let mut profile = Profile::new();
    for s in samples {
        profile.case_start();
        let r = config.evaluate(s.affinities.view(), s.groundtruth.view());
        profile.case_elapsed();

        match r {
            Ok((_, outcome)) => profile.count_outcome(&outcome),
            Err(e) => {
                log::info!("`{}` under {:?}: {e}", s.name, config.mode);
                profile.count_degenerate();
            }
        }
    }
    profile.finish()
}

/// 实际运行.
pub fn run() -> AblationResult {
    let samples = collect_samples();
    assert!(!samples.is_empty(), "No samples available");

    println!(
        "Running ablation studies on {} samples with {} cpus...",
        samples.len(),
        utils::cpus()
    );
    let samples = samples.as_slice();
    let modes = [MalisMode::Positive, MalisMode::Negative, MalisMode::Constrained];

    thread::scope(|s| {
        let handles = modes.map(|mode| {
            let config = MalisConfig {
                mode,
                ..utils::sequential_constrained()
            };
            s.spawn(move || profile_mode(config, samples))
        });

        AblationResult::from_iter(
            ["positive", "negative", "constrained"].into_iter().zip(
                handles
                    .into_iter()
                    .map(|th| th.join().expect("Thread joining error")),
            ),
        )
    })
}
