//! Absolute-time periodic wait, grounded on `original_source/src/Waiter.cpp`'s
//! `SleepWaiter`: a target instant is computed once and advanced by one
//! period per call, so jitter in any single tick does not shift subsequent
//! ticks. Per §5's redesign of the original's behavior, a tick that runs
//! past its deadline does not let the backlog accumulate: `wait` returns
//! immediately and re-targets to `now + period` instead of sleeping through
//! every missed period back-to-back.

use std::time::{Duration, Instant};

pub struct Waiter {
    period: Duration,
    target: Instant,
}

impl Waiter {
    pub fn new(period_seconds: f64) -> Self {
        let mut waiter = Waiter { period: Duration::from_secs_f64(period_seconds.max(0.0)), target: Instant::now() };
        waiter.reset();
        waiter
    }

    pub fn period(&self) -> f64 {
        self.period.as_secs_f64()
    }

    /// Resets the target to `now + period`, keeping the current period.
    pub fn reset(&mut self) {
        self.target = Instant::now() + self.period;
    }

    /// Resets the target and adopts a new period.
    pub fn reset_with_period(&mut self, period_seconds: f64) {
        self.period = Duration::from_secs_f64(period_seconds.max(0.0));
        self.reset();
    }

    /// Blocks until the target instant, then advances the target by one
    /// period. If this tick ran long enough that the target already
    /// passed, returns immediately and re-targets from `now` rather than
    /// letting the shortfall accumulate across ticks.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now >= self.target {
            self.target = now + self.period;
            return;
        }
        std::thread::sleep(self.target - now);
        self.target += self.period;
    }
}
