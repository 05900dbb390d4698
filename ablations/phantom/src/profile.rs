//! 损失计算运行统计.

use malis_berry::MalisOutcome;
use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时视为已经开始计时.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    #[inline]
    fn get_total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

/// ablation/benchmark 数据统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 成功计算的样本数.
    cases: u64,

    /// 因归一化退化或形状错误而跳过的样本数.
    degenerate: u64,

    /// 梯度计算花费的总时间.
    case_time: AccTimer,

    /// 整个任务花费的总时间 (包括数据生成与加载).
    real_time: AccTimer,

    /// 最耗时的一次计算.
    most: Option<Duration>,

    loss_sum: f64,

    /// Rand 指数之和与计数. 约束模式下不计.
    rand_sum: f64,
    rand_count: u64,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            cases: 0,
            degenerate: 0,
            case_time: AccTimer::new(),
            real_time: AccTimer::new(),
            most: None,
            loss_sum: 0.0,
            rand_sum: 0.0,
            rand_count: 0,
        }
    }

    /// 开始一次计算计时.
    #[inline]
    pub fn case_start(&mut self) {
        self.case_time.start();
    }

    /// 结束一次计算计时.
    #[inline]
    pub fn case_elapsed(&mut self) {
        let d = self.case_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
    }

    /// 记录一次成功计算.
    pub fn count_outcome(&mut self, outcome: &MalisOutcome) {
        self.cases += 1;
        self.loss_sum += outcome.loss();
        if let Some(ri) = outcome.rand_index() {
            self.rand_sum += ri;
            self.rand_count += 1;
        }
    }

    /// 记录一次失败计算.
    #[inline]
    pub fn count_degenerate(&mut self) {
        self.degenerate += 1;
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    #[inline]
    pub fn get_cases(&self) -> u64 {
        self.cases
    }

    #[inline]
    pub fn get_degenerate(&self) -> u64 {
        self.degenerate
    }

    /// 以微秒为单位获得梯度计算的总时间.
    #[inline]
    pub fn get_case_time_us(&self) -> u64 {
        self.case_time.get_total_us()
    }

    /// 以微秒为单位获得总自然时间.
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.get_total_us()
    }

    /// 以微秒为单位获得单样本平均计算时间.
    pub fn get_avg_case_time_us(&self) -> Option<f64> {
        match self.cases {
            0 => None,
            n => Some(self.get_case_time_us() as f64 / n as f64),
        }
    }

    pub fn get_avg_loss(&self) -> Option<f64> {
        match self.cases {
            0 => None,
            n => Some(self.loss_sum / n as f64),
        }
    }

    pub fn get_avg_rand_index(&self) -> Option<f64> {
        match self.rand_count {
            0 => None,
            n => Some(self.rand_sum / n as f64),
        }
    }

    /// 获取最耗时的一次计算. 若不存在计算, 则返回 `None`.
    #[inline]
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        self.most
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Profile;
    use malis_berry::{MalisOutcome, MalisReport};

    #[test]
    fn test_profile_averages() {
        let mut p = Profile::new();
        assert_eq!(p.get_avg_loss(), None);
        assert_eq!(p.get_most_time_consuming(), None);

        let report = MalisReport {
            loss: 0.5,
            classification_error: 0.0,
            rand_index: 1.0,
            n_pair_norm: 1,
            n_pair_incorrect: 0,
            merges: 1,
        };
        p.case_start();
        p.case_elapsed();
        p.count_outcome(&MalisOutcome::Single(report));
        p.count_degenerate();

        let p = p.finish();
        assert_eq!(p.get_cases(), 1);
        assert_eq!(p.get_degenerate(), 1);
        assert_eq!(p.get_avg_loss(), Some(0.5));
        assert_eq!(p.get_avg_rand_index(), Some(1.0));
        assert!(p.get_most_time_consuming().is_some());
    }
}
