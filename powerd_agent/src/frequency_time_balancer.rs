//! Computes a per-core target frequency such that the slowest core's
//! epoch time equals every other core's time scaled by `f_old/f_new`:
//! cores that finished early give back frequency (and power) without
//! lengthening the package's critical path.

/// Returns a per-core target frequency given each core's current frequency
/// and its non-network time spent in the most recent balancing window.
/// Cores with a NaN time or frequency are left unchanged (no information).
pub fn balance(old_freq: &[f64], non_network_time: &[f64]) -> Vec<f64> {
    assert_eq!(old_freq.len(), non_network_time.len());
    let max_time = non_network_time.iter().copied().filter(|t| !t.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    if !max_time.is_finite() || max_time <= 0.0 {
        return old_freq.to_vec();
    }
    old_freq
        .iter()
        .zip(non_network_time)
        .map(|(&f, &t)| if f.is_nan() || t.is_nan() { f } else { f * (t / max_time) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slowest_core_is_left_at_its_current_frequency() {
        let out = balance(&[3.0, 3.0, 3.0], &[1.0, 0.8, 0.5]);
        assert!((out[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn faster_cores_are_scaled_down_proportionally() {
        let out = balance(&[3.0, 3.0], &[1.0, 0.5]);
        assert!((out[1] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn all_nan_times_leaves_frequencies_unchanged() {
        let out = balance(&[2.5, 2.5], &[f64::NAN, f64::NAN]);
        assert_eq!(out, vec![2.5, 2.5]);
    }
}
