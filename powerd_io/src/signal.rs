//! Signal handles and the derivative (least-squares slope) signal.

use crate::domain::Domain;
use crate::error::Result;
use crate::platform_io::PlatformIo;
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

/// How a signal's successive samples behave, used by the reporter to choose
/// a sensible aggregation and by the trace/report writers for formatting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalBehavior {
    Monotone,
    Variable,
    Constant,
    Label,
}

/// A bounded FIFO of the `N` most recent `(time, value)` points. The ring
/// never grows past its declared capacity; pushing past capacity evicts the
/// oldest point. Grounded on the subtract-reference-time trick: all
/// statistics subtract the first point in the ring from every `(t, v)` pair
/// before accumulating, to avoid cancellation at large absolute clock values.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    capacity: usize,
    points: VecDeque<(f64, f64)>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "a derivative history needs at least two slots");
        HistoryBuffer { capacity, points: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, time: f64, value: f64) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((time, value));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Least-squares slope of `value` against `time` over every point
    /// currently in the ring, or `NaN` with fewer than two points.
    ///
    /// `x = t − t₀`, `y = v − v₀` (reference subtraction against the
    /// oldest point in the ring) before accumulating
    /// `Σxy − (Σx·Σy)/n) / (Σx² − (Σx)²/n)`.
    pub fn slope(&self) -> f64 {
        if self.points.len() < 2 {
            return f64::NAN;
        }
        let (t0, v0) = self.points[0];
        let n = self.points.len() as f64;
        let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
        for &(t, v) in &self.points {
            let x = t - t0;
            let y = v - v0;
            sx += x;
            sy += y;
            sxy += x * y;
            sxx += x * x;
        }
        let denom = sxx - (sx * sx) / n;
        if denom == 0.0 {
            return 0.0;
        }
        (sxy - (sx * sy) / n) / denom
    }
}

/// A derivative signal: owns two upstream signals (time, value) and a
/// bounded history; its value is the least-squares slope of that history.
pub struct DerivativeSignal {
    history: HistoryBuffer,
}

impl DerivativeSignal {
    pub fn new(history_len: usize) -> Self {
        DerivativeSignal { history: HistoryBuffer::new(history_len) }
    }

    /// Folds one new `(time, value)` observation from the upstream signals.
    pub fn update(&mut self, time: f64, value: f64) {
        self.history.push(time, value);
    }

    /// Current slope estimate; NaN until two points have been observed.
    pub fn sample(&self) -> f64 {
        self.history.slope()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Out-of-band polling path for callers outside the batched tick loop
    /// (e.g. a one-shot CLI query): reads the `time_signal`/`value_signal`
    /// pair directly through `platform_io.read_signal`, sleeping `delay`
    /// between reads, until the history is full. Does not touch the
    /// batched read/write state `platform_io.read_batch`/`write_batch` use.
    pub fn read(
        &mut self,
        platform_io: &mut PlatformIo,
        time_signal: (&str, Domain, usize),
        value_signal: (&str, Domain, usize),
        delay: Duration,
    ) -> Result<f64> {
        while !self.history.is_full() {
            let (time_name, time_domain, time_idx) = time_signal;
            let (value_name, value_domain, value_idx) = value_signal;
            let time = platform_io.read_signal(time_name, time_domain, time_idx)?;
            let value = platform_io.read_signal(value_name, value_domain, value_idx)?;
            self.history.push(time, value);
            if !self.history.is_full() {
                thread::sleep(delay);
            }
        }
        Ok(self.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_until_two_points() {
        let mut d = DerivativeSignal::new(4);
        assert!(d.sample().is_nan());
        d.update(0.0, 1.0);
        assert!(d.sample().is_nan());
        d.update(1.0, 1.0);
        assert!(!d.sample().is_nan());
    }

    #[test]
    fn constant_upstream_slope_is_zero() {
        let mut d = DerivativeSignal::new(8);
        for t in 0..5 {
            d.update(t as f64, 42.0);
        }
        assert_eq!(d.sample(), 0.0);
    }

    #[test]
    fn linear_upstream_recovers_slope() {
        let mut d = DerivativeSignal::new(8);
        let a = 3.5;
        let b = 1000.0;
        for t in 0..10 {
            let t = t as f64;
            d.update(t, a * t + b);
        }
        assert!((d.sample() - a).abs() < 1e-9);
    }

    #[test]
    fn linear_upstream_at_large_absolute_time() {
        let mut d = DerivativeSignal::new(8);
        let a = 2.0;
        let base = 1.0e12;
        for i in 0..6 {
            let t = base + i as f64;
            d.update(t, a * t);
        }
        assert!((d.sample() - a).abs() < 1e-6);
    }

    #[test]
    fn read_polls_until_history_is_full() {
        use crate::domain::PlatformTopo;
        use crate::platform_io::ConstConfigIoGroup;

        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
        let mut provider = ConstConfigIoGroup::new();
        provider.add_signal("TIME", Domain::Board, 0, 0.0);
        provider.add_signal("ENERGY", Domain::Board, 0, 10.0);
        io.add_provider(Box::new(provider));

        let mut d = DerivativeSignal::new(3);
        let slope = d
            .read(&mut io, ("TIME", Domain::Board, 0), ("ENERGY", Domain::Board, 0), Duration::from_millis(0))
            .unwrap();

        assert!(!slope.is_nan());
        assert_eq!(slope, 0.0);
    }

    #[test]
    fn ring_evicts_oldest_point() {
        let mut h = HistoryBuffer::new(3);
        for i in 0..10 {
            h.push(i as f64, i as f64);
        }
        assert_eq!(h.len(), 3);
        assert!((h.slope() - 1.0).abs() < 1e-9);
    }
}
