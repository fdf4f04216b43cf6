//! 学習率スケジュール。
//!
//! 学習率は固定値のほか、イテレーション数と累積学習時間の関数として与えられます。

use std::time::Duration;

pub trait LearningRateSchedule {
    /// `iteration` 回目の更新で使う学習率。
    fn learning_rate(&self, iteration: usize, running_time: Duration) -> f64;
}

impl LearningRateSchedule for f64 {
    fn learning_rate(&self, _iteration: usize, _running_time: Duration) -> f64 {
        *self
    }
}

impl<F> LearningRateSchedule for F
where
    F: Fn(usize, Duration) -> f64,
{
    fn learning_rate(&self, iteration: usize, running_time: Duration) -> f64 {
        self(iteration, running_time)
    }
}

/// 累積学習時間が `interval` 経過するごとに学習率へ `gamma` を掛けます。
///
/// `lr = initial * gamma^(running_time / interval)`
#[derive(Debug, Clone, Copy)]
pub struct StepDecay {
    pub initial: f64,
    pub gamma: f64,
    pub interval: Duration,
}

impl LearningRateSchedule for StepDecay {
    fn learning_rate(&self, _iteration: usize, running_time: Duration) -> f64 {
        if self.interval.is_zero() {
            return self.initial;
        }
        let steps = (running_time.as_secs_f64() / self.interval.as_secs_f64()).floor() as i32;
        self.initial * self.gamma.powi(steps)
    }
}
