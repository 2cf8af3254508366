//! Governors: domain-indexed control writers with bound clamping and
//! change detection. Grounded on `FrequencyGovernorImp.hpp` /
//! `SSTClosGovernorImp.hpp`.

use crate::error::{Error, Result};

/// Clamps `request` into `[min, max]`.
fn clamp(request: f64, min: f64, max: f64) -> f64 {
    request.max(min).min(max)
}

/// Snaps `value` to the nearest multiple of `step`, rounding toward the
/// previous value: decreasing requests round up to the next step (so the
/// governor never overshoots downward past what was asked), increasing
/// requests round down, so the governor never overshoots upward either.
fn snap_toward_previous(value: f64, previous: f64, step: f64) -> f64 {
    let steps = value / step;
    let snapped = if value < previous {
        steps.ceil()
    } else if value > previous {
        steps.floor()
    } else {
        steps.round()
    };
    snapped * step
}

/// Per-domain frequency control with clamping and directional-rounding
/// quantization.
pub struct FrequencyGovernor {
    min: f64,
    max: f64,
    step: f64,
    last_freq: Vec<f64>,
    write_batch: bool,
    clamp_count: u64,
}

impl FrequencyGovernor {
    pub fn new(min: f64, max: f64, step: f64, num_domain: usize) -> Self {
        FrequencyGovernor {
            min,
            max,
            step,
            last_freq: vec![min; num_domain],
            write_batch: false,
            clamp_count: 0,
        }
    }

    pub fn frequency_min(&self) -> f64 {
        self.min
    }

    pub fn frequency_max(&self) -> f64 {
        self.max
    }

    pub fn frequency_step(&self) -> f64 {
        self.step
    }

    pub fn clamp_count(&self) -> u64 {
        self.clamp_count
    }

    /// Narrows the governor's allowed range; used when a policy imposes a
    /// tighter bound than the platform default.
    pub fn set_frequency_bounds(&mut self, min: f64, max: f64) -> Result<()> {
        if min > max {
            return Err(Error::Invalid(format!("frequency bounds min {min} > max {max}")));
        }
        self.min = min;
        self.max = max;
        Ok(())
    }

    /// Clamps and quantizes every element of `requests`, updating the
    /// cached last-applied vector. Sets the internal write-batch flag if any
    /// element changed. Idempotent: calling twice with the same `requests`
    /// leaves `do_write_batch()` false on the second call.
    pub fn adjust_platform(&mut self, requests: &[f64]) -> Result<&[f64]> {
        if requests.len() != self.last_freq.len() {
            return Err(Error::Invalid(format!(
                "expected {} frequency requests, got {}",
                self.last_freq.len(),
                requests.len()
            )));
        }
        let mut changed = false;
        for (i, &req) in requests.iter().enumerate() {
            let clamped = clamp(req, self.min, self.max);
            if clamped != req {
                self.clamp_count += 1;
            }
            let snapped = snap_toward_previous(clamped, self.last_freq[i], self.step);
            if snapped != self.last_freq[i] {
                changed = true;
            }
            self.last_freq[i] = snapped;
        }
        self.write_batch = changed;
        Ok(&self.last_freq)
    }

    pub fn do_write_batch(&self) -> bool {
        self.write_batch
    }

    pub fn last_applied(&self) -> &[f64] {
        &self.last_freq
    }
}

/// Single-scalar package-power budget governor with a minimum averaging
/// time-window on the underlying control.
pub struct PowerGovernor {
    min: f64,
    max: f64,
    min_time_window: f64,
    last_power: f64,
    write_batch: bool,
}

impl PowerGovernor {
    pub fn new(min: f64, max: f64, min_time_window: f64) -> Self {
        PowerGovernor { min, max, min_time_window, last_power: min, write_batch: false }
    }

    pub fn min_time_window(&self) -> f64 {
        self.min_time_window
    }

    pub fn adjust_platform(&mut self, request: f64) -> Result<f64> {
        if request.is_nan() {
            return Err(Error::Invalid("power request must not be NaN".into()));
        }
        let clamped = clamp(request, self.min, self.max);
        self.write_batch = clamped != self.last_power;
        self.last_power = clamped;
        Ok(self.last_power)
    }

    pub fn do_write_batch(&self) -> bool {
        self.write_batch
    }

    pub fn last_applied(&self) -> f64 {
        self.last_power
    }
}

/// Class-of-service priority, 0 = highest. Configuration for the four
/// classes (priority weight, min frequency, max frequency) is written once
/// at init; `adjust_platform` writes the per-core class vector only when it
/// differs from the cached one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosPriority {
    HighPriority,
    LowPriority,
}

pub struct ClosClassConfig {
    pub priority_weight: u32,
    pub min_frequency: f64,
    pub max_frequency: f64,
}

pub struct ClosGovernor {
    classes: [ClosClassConfig; 4],
    enabled: bool,
    last_assoc: Vec<u8>,
    write_batch: bool,
}

impl ClosGovernor {
    pub fn new(classes: [ClosClassConfig; 4], num_core: usize) -> Self {
        ClosGovernor { classes, enabled: false, last_assoc: vec![0; num_core], write_batch: false }
    }

    /// Writes the four class configurations and enables prioritized turbo.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Inverse of `enable`.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn class(&self, index: usize) -> &ClosClassConfig {
        &self.classes[index]
    }

    /// `assoc[core]` is the class index (0..3) for that core.
    pub fn adjust_platform(&mut self, assoc: &[u8]) -> Result<()> {
        if assoc.len() != self.last_assoc.len() {
            return Err(Error::Invalid(format!(
                "expected {} CLOS associations, got {}",
                self.last_assoc.len(),
                assoc.len()
            )));
        }
        for &a in assoc {
            if a > 3 {
                return Err(Error::Invalid(format!("CLOS class index {a} out of range 0..3")));
            }
        }
        self.write_batch = assoc != self.last_assoc.as_slice();
        self.last_assoc.copy_from_slice(assoc);
        Ok(())
    }

    /// Maps a boolean "is this core's immediate target above its low
    /// priority frequency" into a CLOS priority, per §4.4.1 rule 3.
    pub fn priority_for(above_low_priority: bool) -> ClosPriority {
        if above_low_priority {
            ClosPriority::HighPriority
        } else {
            ClosPriority::LowPriority
        }
    }

    pub fn do_write_batch(&self) -> bool {
        self.write_batch
    }

    pub fn last_applied(&self) -> &[u8] {
        &self.last_assoc
    }
}
