//! Per-CPU status word (§4.7, wire layout §6): one independently atomic
//! 64-bit word per CPU,
//!
//! ```text
//! bits 0..31   hint
//! bits 32..47  progress numerator
//! bits 48..63  progress denominator
//! ```
//!
//! All operations are wait-free: readers and writers only ever perform a
//! single atomic load or a read-modify-write loop on one word, never a lock.
//! `update_cache` is the consumer-side operation: it snapshots every slot
//! into a local array once per tick so the rest of that tick's processing
//! reads a stable view instead of re-issuing atomic loads per query.

use crate::error::{Error, Result};
use crate::shared_region::SharedRegion;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// Denominator used by the `*_fraction` convenience methods.
const FRACTION_SCALE: u16 = 10_000;

fn pack(hint: u32, numerator: u16, denominator: u16) -> u64 {
    hint as u64 | ((numerator as u64) << 32) | ((denominator as u64) << 48)
}

fn unpack(word: u64) -> (u32, u16, u16) {
    let hint = word as u32;
    let numerator = ((word >> 32) & 0xFFFF) as u16;
    let denominator = ((word >> 48) & 0xFFFF) as u16;
    (hint, numerator, denominator)
}

/// One status word per CPU, backed by a [`SharedRegion`].
pub struct StatusMap {
    region: Arc<dyn SharedRegion>,
    /// Consumer-side snapshot taken by `update_cache`.
    cache: Mutex<Vec<u64>>,
}

impl StatusMap {
    /// Builds a status map over `region`, which must hold exactly `num_cpu`
    /// words.
    pub fn new(region: Arc<dyn SharedRegion>, num_cpu: usize) -> Result<Self> {
        if region.len() != num_cpu {
            return Err(Error::Invalid(format!(
                "status map region has {} words, expected {num_cpu}",
                region.len()
            )));
        }
        Ok(StatusMap { region, cache: Mutex::new(vec![0; num_cpu]) })
    }

    pub fn num_cpu(&self) -> usize {
        self.region.len()
    }

    fn word(&self, cpu: usize) -> Result<&std::sync::atomic::AtomicU64> {
        self.region
            .words()
            .get(cpu)
            .ok_or_else(|| Error::Invalid(format!("cpu {cpu} out of range")))
    }

    pub fn set_hint(&self, cpu: usize, hint: u32) -> Result<()> {
        self.word(cpu)?
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                let (_, numerator, denominator) = unpack(w);
                Some(pack(hint, numerator, denominator))
            })
            .map(|_| ())
            .map_err(|_| unreachable!())
    }

    pub fn get_hint(&self, cpu: usize) -> Result<u32> {
        Ok(unpack(self.word(cpu)?.load(Ordering::Acquire)).0)
    }

    pub fn set_progress(&self, cpu: usize, numerator: u16, denominator: u16) -> Result<()> {
        self.word(cpu)?
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                let (hint, _, _) = unpack(w);
                Some(pack(hint, numerator, denominator))
            })
            .map(|_| ())
            .map_err(|_| unreachable!())
    }

    /// Convenience wrapper expressing progress as a `[0, 1]` fraction rather
    /// than a raw numerator/denominator pair.
    pub fn set_progress_fraction(&self, cpu: usize, fraction: f64) -> Result<()> {
        let numerator = (fraction.clamp(0.0, 1.0) * FRACTION_SCALE as f64).round() as u16;
        self.set_progress(cpu, numerator, FRACTION_SCALE)
    }

    /// Live (uncached) progress fraction in `[0, 1]` for `cpu`. `0.0` if the
    /// denominator has never been set.
    pub fn get_progress_cpu(&self, cpu: usize) -> Result<f64> {
        let (_, numerator, denominator) = unpack(self.word(cpu)?.load(Ordering::Acquire));
        Ok(if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 })
    }

    /// Snapshots every CPU's word into this map's consumer-side cache.
    pub fn update_cache(&self) {
        let mut cache = self.cache.lock().unwrap();
        for (slot, word) in cache.iter_mut().zip(self.region.words()) {
            *slot = word.load(Ordering::Acquire);
        }
    }

    pub fn cached_hint(&self, cpu: usize) -> Result<u32> {
        let cache = self.cache.lock().unwrap();
        let word = *cache.get(cpu).ok_or_else(|| Error::Invalid(format!("cpu {cpu} out of range")))?;
        Ok(unpack(word).0)
    }

    pub fn cached_progress(&self, cpu: usize) -> Result<f64> {
        let cache = self.cache.lock().unwrap();
        let word = *cache.get(cpu).ok_or_else(|| Error::Invalid(format!("cpu {cpu} out of range")))?;
        let (_, numerator, denominator) = unpack(word);
        Ok(if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_region::InProcessRegion;

    fn map(num_cpu: usize) -> StatusMap {
        StatusMap::new(Arc::new(InProcessRegion::new(num_cpu)), num_cpu).unwrap()
    }

    #[test]
    fn unset_cpu_reports_zero_progress() {
        let m = map(4);
        assert_eq!(m.get_progress_cpu(0).unwrap(), 0.0);
        assert_eq!(m.get_hint(0).unwrap(), 0);
    }

    #[test]
    fn set_progress_preserves_hint() {
        let m = map(2);
        m.set_hint(0, 7).unwrap();
        m.set_progress(0, 3, 4).unwrap();
        assert_eq!(m.get_hint(0).unwrap(), 7);
        assert!((m.get_progress_cpu(0).unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn set_hint_preserves_progress() {
        let m = map(2);
        m.set_progress(0, 1, 2).unwrap();
        m.set_hint(0, 3).unwrap();
        assert!((m.get_progress_cpu(0).unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(m.get_hint(0).unwrap(), 3);
    }

    #[test]
    fn fraction_helper_round_trips() {
        let m = map(1);
        m.set_progress_fraction(0, 0.5).unwrap();
        assert!((m.get_progress_cpu(0).unwrap() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn update_cache_snapshots_and_is_stable_until_next_call() {
        let m = map(1);
        m.set_progress(0, 1, 4).unwrap();
        m.update_cache();
        assert!((m.cached_progress(0).unwrap() - 0.25).abs() < 1e-9);
        m.set_progress(0, 3, 4).unwrap();
        // Live value changed, cached value has not.
        assert!((m.get_progress_cpu(0).unwrap() - 0.75).abs() < 1e-9);
        assert!((m.cached_progress(0).unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_cpu_is_invalid() {
        let m = map(1);
        assert!(m.get_hint(5).is_err());
    }
}
