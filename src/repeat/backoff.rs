use crate::config::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the delays between repeated attempts.
///
/// Every strategy yields an endless sequence; attempt counting starts at 0.
/// Bounded strategies clamp each value to `[0, maximum]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// No delay
    #[default]
    Immediate,
    /// The same delay every time
    Constant(#[serde(with = "duration_ms")] Duration),
    /// Uniformly random in `[minimum, maximum)`
    Random {
        #[serde(with = "duration_ms")]
        minimum: Duration,
        #[serde(with = "duration_ms")]
        maximum: Duration,
    },
    /// `initial + increment * n`
    Incrementing {
        #[serde(with = "duration_ms")]
        initial: Duration,
        #[serde(with = "duration_ms")]
        increment: Duration,
    },
    /// `period * fib(n)` with `fib` starting 0, 1, 1, 2, ...
    Fibonacci {
        #[serde(with = "duration_ms")]
        period: Duration,
        #[serde(with = "duration_ms")]
        maximum: Duration,
    },
    /// `period * power^n`
    Exponential {
        power: f64,
        #[serde(with = "duration_ms")]
        period: Duration,
        #[serde(with = "duration_ms")]
        maximum: Duration,
    },
}

impl WaitStrategy {
    /// The sequence of delays for this strategy
    pub fn iter(&self) -> IntervalIterator {
        IntervalIterator {
            strategy: self.clone(),
            count: 0,
            fibonacci: (0, 1),
        }
    }
}

impl IntoIterator for WaitStrategy {
    type Item = Duration;
    type IntoIter = IntervalIterator;

    fn into_iter(self) -> IntervalIterator {
        self.iter()
    }
}

/// Endless iterator over the delays of a [`WaitStrategy`]
#[derive(Debug, Clone)]
pub struct IntervalIterator {
    strategy: WaitStrategy,
    count: u32,
    fibonacci: (u64, u64),
}

/// Scale `period` by `factor`, clamped to `[0, maximum]`
fn scaled(period: Duration, factor: f64, maximum: Duration) -> Duration {
    let nanos = (period.as_nanos() as f64 * factor).max(0.0);
    if nanos >= maximum.as_nanos() as f64 {
        return maximum;
    }
    Duration::from_nanos(nanos.round() as u64)
}

impl Iterator for IntervalIterator {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let n = self.count;
        self.count = self.count.saturating_add(1);

        let delay = match &self.strategy {
            WaitStrategy::Immediate => Duration::ZERO,
            WaitStrategy::Constant(delay) => *delay,
            WaitStrategy::Random { minimum, maximum } => {
                let span = maximum.saturating_sub(*minimum);
                *minimum + span.mul_f64(rand::random::<f64>())
            }
            WaitStrategy::Incrementing { initial, increment } => {
                initial.saturating_add(increment.saturating_mul(n))
            }
            WaitStrategy::Fibonacci { period, maximum } => {
                let (current, next) = self.fibonacci;
                self.fibonacci = (next, current.saturating_add(next));
                scaled(*period, current as f64, *maximum)
            }
            WaitStrategy::Exponential {
                power,
                period,
                maximum,
            } => {
                let multiplier = power.powi(n.min(i32::MAX as u32) as i32);
                scaled(*period, multiplier, *maximum)
            }
        };
        Some(delay)
    }
}
