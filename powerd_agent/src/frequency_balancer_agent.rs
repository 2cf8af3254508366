//! The frequency balancer (§4.4.1): a per-package leaf agent combining
//! epoch-boundary rebalancing with two immediate per-tick overrides and an
//! optional SST-TF CLOS mapping. This is the hardest agent in the core: it
//! is the only one whose `adjust_platform` depends on multi-tick history
//! (consecutive-hint streaks, accumulated non-network time) rather than
//! just the current policy and the latest sample.

use crate::error::{Error, Result};
use crate::frequency_limit_detector::FrequencyLimitDetector;
use crate::frequency_time_balancer;
use crate::Agent;
use powerd_io::governor::ClosPriority;
use powerd_io::{ClosGovernor, Domain, FrequencyGovernor, PlatformIo};

/// Region hint indicating the CPU is blocked on network I/O. The hint
/// vocabulary otherwise belongs to the instrumented application; this is
/// the one value the balancer treats specially.
pub const HINT_NETWORK: u32 = 1;

/// Applies the two immediate per-tick override rules (§4.4.1 rule 2) to
/// `target`, which on entry holds each core's most recent epoch-balanced
/// frequency and on exit holds this tick's actual target. Returns, per
/// core, whether its target was forced to the low-priority frequency
/// (feeds CLOS classification in rule 3).
///
/// `previous_high_priority` is each core's CLOS classification as of the
/// previous tick; a package with no high-priority, not-waiting core lifts
/// every sufficiently-idle-of-network core to `platform_max`.
#[allow(clippy::too_many_arguments)]
pub fn apply_immediate_overrides(
    target: &mut [f64],
    region_hash: &[f64],
    consecutive_network: &[u32],
    consecutive_non_network: &[u32],
    previous_high_priority: &[bool],
    low_priority_freq: f64,
    platform_max: f64,
    k_net: u32,
    k_non_net: u32,
) -> Vec<bool> {
    let n = target.len();
    let mut forced_low = vec![false; n];
    for i in 0..n {
        let non_app = region_hash[i].is_nan() || region_hash[i] == 0.0;
        let network_throttled = consecutive_network[i] >= k_net;
        if non_app || network_throttled {
            target[i] = low_priority_freq;
            forced_low[i] = true;
        }
    }
    let any_high_priority_not_waiting =
        (0..n).any(|i| previous_high_priority.get(i).copied().unwrap_or(false) && !forced_low[i]);
    if !any_high_priority_not_waiting {
        for i in 0..n {
            if !forced_low[i] && consecutive_non_network[i] >= k_non_net {
                target[i] = platform_max;
            }
        }
    }
    forced_low
}

struct CoreHandles {
    hash: powerd_io::platform_io::Handle,
    hint: powerd_io::platform_io::Handle,
    freq_control: powerd_io::platform_io::Handle,
}

pub struct FrequencyBalancerAgent {
    num_core: usize,
    platform_max: f64,
    e_min: u64,
    p_min_ticks: f64,
    k_net: u32,
    k_non_net: u32,
    sst_tf_enabled: bool,

    governor: FrequencyGovernor,
    clos: Option<ClosGovernor>,
    detector: FrequencyLimitDetector,

    handles: Vec<CoreHandles>,
    epoch_handle: Option<powerd_io::platform_io::Handle>,

    consecutive_network: Vec<u32>,
    consecutive_non_network: Vec<u32>,
    previous_high_priority: Vec<bool>,
    non_network_time_accum: Vec<f64>,
    current_target: Vec<f64>,
    clos_assoc: Vec<u8>,

    last_epoch_count: f64,
    epoch_count_at_last_balance: f64,
    ticks_since_balance: f64,
    last_core_hash: Vec<f64>,
    last_core_hint: Vec<u32>,
}

impl FrequencyBalancerAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_core: usize,
        platform_min: f64,
        platform_max: f64,
        platform_step: f64,
        low_priority_freq: f64,
        e_min: u64,
        p_min_ticks: f64,
        k_net: u32,
        k_non_net: u32,
        sst_tf_enabled: bool,
    ) -> Self {
        FrequencyBalancerAgent {
            num_core,
            platform_max,
            e_min,
            p_min_ticks,
            k_net,
            k_non_net,
            sst_tf_enabled,
            governor: FrequencyGovernor::new(platform_min, platform_max, platform_step, num_core),
            clos: if sst_tf_enabled {
                Some(ClosGovernor::new(
                    [
                        powerd_io::governor::ClosClassConfig { priority_weight: 3, min_frequency: platform_min, max_frequency: platform_max },
                        powerd_io::governor::ClosClassConfig { priority_weight: 2, min_frequency: platform_min, max_frequency: platform_max },
                        powerd_io::governor::ClosClassConfig { priority_weight: 1, min_frequency: platform_min, max_frequency: platform_max },
                        powerd_io::governor::ClosClassConfig { priority_weight: 0, min_frequency: platform_min, max_frequency: low_priority_freq },
                    ],
                    num_core,
                ))
            } else {
                None
            },
            detector: FrequencyLimitDetector::new(low_priority_freq),
            handles: Vec::new(),
            epoch_handle: None,
            consecutive_network: vec![0; num_core],
            consecutive_non_network: vec![0; num_core],
            previous_high_priority: vec![false; num_core],
            non_network_time_accum: vec![0.0; num_core],
            current_target: vec![platform_max; num_core],
            clos_assoc: vec![0; num_core],
            last_epoch_count: f64::NAN,
            epoch_count_at_last_balance: f64::NAN,
            ticks_since_balance: 0.0,
            last_core_hash: vec![f64::NAN; num_core],
            last_core_hint: vec![0; num_core],
        }
    }

    fn low_priority_freq(&self) -> f64 {
        self.detector.low_priority_frequency()
    }
}

impl Agent for FrequencyBalancerAgent {
    fn init(&mut self, _level: usize, _fan_out: usize, _is_level_root: bool, platform_io: &mut PlatformIo) -> Result<()> {
        self.handles.clear();
        for core in 0..self.num_core {
            let hash = platform_io.push_signal("REGION_HASH", Domain::Core, core)?;
            let hint = platform_io.push_signal("REGION_HINT", Domain::Core, core)?;
            let freq_control = platform_io.push_control("CPU_FREQUENCY_CONTROL", Domain::Core, core)?;
            self.handles.push(CoreHandles { hash, hint, freq_control });
        }
        self.epoch_handle = Some(platform_io.push_signal("EPOCH_COUNT", Domain::Board, 0)?);
        Ok(())
    }

    fn validate_policy(&mut self, policy: &mut [f64]) -> Result<()> {
        for v in policy.iter_mut() {
            if v.is_nan() {
                *v = self.platform_max;
            }
        }
        Ok(())
    }

    fn aggregate_sample(&mut self, child_samples: &[Vec<f64>], out_sample: &mut [f64]) {
        for slot in out_sample.iter_mut() {
            *slot = 0.0;
        }
        for child in child_samples {
            for (slot, &v) in out_sample.iter_mut().zip(child) {
                *slot += v;
            }
        }
    }

    fn sample_platform(&mut self, platform_io: &PlatformIo, out_sample: &mut [f64]) -> Result<()> {
        for (i, h) in self.handles.iter().enumerate() {
            let hash = platform_io.sample(h.hash)?;
            let hint = platform_io.sample(h.hint)?;
            self.last_core_hash[i] = hash;
            self.last_core_hint[i] = hint as u32;
            if self.last_core_hint[i] == HINT_NETWORK {
                self.consecutive_network[i] += 1;
                self.consecutive_non_network[i] = 0;
            } else {
                self.consecutive_network[i] = 0;
                self.consecutive_non_network[i] += 1;
                self.non_network_time_accum[i] += 1.0;
            }
            if let Some(slot) = out_sample.get_mut(i) {
                *slot = self.governor.last_applied().get(i).copied().unwrap_or(f64::NAN);
            }
        }
        self.ticks_since_balance += 1.0;
        if let Some(epoch_handle) = self.epoch_handle {
            let epoch_count = platform_io.sample(epoch_handle)?;
            if !epoch_count.is_nan() {
                // Establish the baseline from the first reading rather than
                // from zero, so a non-zero starting epoch count does not
                // read as epochs having already elapsed.
                if self.epoch_count_at_last_balance.is_nan() {
                    self.epoch_count_at_last_balance = epoch_count;
                }
                self.last_epoch_count = epoch_count;
            }
        }
        Ok(())
    }

    fn adjust_platform(&mut self, policy: &[f64], platform_io: &mut PlatformIo) -> Result<()> {
        if policy.len() != 1 {
            return Err(Error::Invalid("frequency balancer policy is a single max-frequency budget".into()));
        }
        let epochs_elapsed = if self.last_epoch_count.is_nan() { 0.0 } else { self.last_epoch_count - self.epoch_count_at_last_balance };
        let should_rebalance =
            epochs_elapsed >= self.e_min as f64 && self.ticks_since_balance >= self.p_min_ticks && !self.last_epoch_count.is_nan();

        if should_rebalance {
            let high_priority_count = self.previous_high_priority.iter().filter(|&&hp| hp).count();
            self.detector.update(high_priority_count, self.governor.last_applied());
            self.current_target = frequency_time_balancer::balance(self.governor.last_applied(), &self.non_network_time_accum);
            let bound = self.detector.achievable_frequency(high_priority_count).min(policy[0]);
            for target in self.current_target.iter_mut() {
                if !target.is_nan() {
                    *target = target.min(bound);
                }
            }
            self.epoch_count_at_last_balance = self.last_epoch_count;
            self.ticks_since_balance = 0.0;
            self.non_network_time_accum.iter_mut().for_each(|t| *t = 0.0);
        }

        let mut target = self.current_target.clone();
        let forced_low = apply_immediate_overrides(
            &mut target,
            &self.last_core_hash,
            &self.consecutive_network,
            &self.consecutive_non_network,
            &self.previous_high_priority,
            self.low_priority_freq(),
            self.platform_max,
            self.k_net,
            self.k_non_net,
        );

        let applied = self.governor.adjust_platform(&target)?.to_vec();
        for (h, &v) in self.handles.iter().zip(&applied) {
            platform_io.adjust(h.freq_control, v)?;
        }

        self.previous_high_priority =
            applied.iter().map(|&f| ClosGovernor::priority_for(f > self.low_priority_freq()) == ClosPriority::HighPriority).collect();
        let _ = forced_low;

        if let Some(clos) = &mut self.clos {
            self.clos_assoc = self
                .previous_high_priority
                .iter()
                .map(|&hp| if hp { 0u8 } else { 3u8 })
                .collect();
            clos.adjust_platform(&self.clos_assoc)?;
        }

        Ok(())
    }

    fn do_write_batch(&self) -> bool {
        self.governor.do_write_batch() || self.clos.as_ref().is_some_and(|c| c.do_write_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 2: 1 package, 4 cores, min/max/step = 1.0/3.7/0.1 GHz,
    /// core 0 non-app (NaN hash), core 3 NETWORK for 4 samples, cores 1
    /// and 2 normal, low-priority frequency 2.1 GHz. No core has yet been
    /// classified high-priority (first epoch), so the "lift idle cores to
    /// platform max" rule applies to cores 1 and 2.
    #[test]
    fn immediate_overrides_match_expected_frequency_and_clos_vector() {
        let mut target = vec![3.7, 3.7, 3.7, 3.7];
        let region_hash = vec![f64::NAN, 11.0, 22.0, 33.0];
        let consecutive_network = vec![0, 0, 0, 4];
        let consecutive_non_network = vec![0, 1, 1, 0];
        let previous_high_priority = vec![false; 4];

        let forced_low = apply_immediate_overrides(
            &mut target,
            &region_hash,
            &consecutive_network,
            &consecutive_non_network,
            &previous_high_priority,
            2.1,
            3.7,
            4,
            1,
        );

        assert_eq!(target, vec![2.1, 3.7, 3.7, 2.1]);
        assert_eq!(forced_low, vec![true, false, false, true]);

        let clos: Vec<ClosPriority> = target.iter().map(|&f| ClosGovernor::priority_for(f > 2.1)).collect();
        assert_eq!(
            clos,
            vec![ClosPriority::LowPriority, ClosPriority::HighPriority, ClosPriority::HighPriority, ClosPriority::LowPriority]
        );
    }

    #[test]
    fn an_existing_high_priority_core_suppresses_the_lift() {
        let mut target = vec![3.0, 3.0];
        let region_hash = vec![11.0, 22.0];
        let consecutive_network = vec![0, 0];
        let consecutive_non_network = vec![10, 10];
        let previous_high_priority = vec![true, false];

        apply_immediate_overrides(&mut target, &region_hash, &consecutive_network, &consecutive_non_network, &previous_high_priority, 2.1, 3.7, 4, 1);

        // A high-priority, not-waiting core already exists, so no lift happens.
        assert_eq!(target, vec![3.0, 3.0]);
    }

    /// Drives `sample_platform`/`adjust_platform` across several ticks with
    /// an `EPOCH_COUNT` signal that never advances: rebalancing must gate on
    /// the epoch counter's delta, not on tick count, so `current_target`
    /// must never move away from its initial all-`platform_max` state even
    /// once many ticks (and many calls) have elapsed.
    #[test]
    fn rebalance_is_gated_on_epoch_delta_not_tick_count() {
        let mut io = PlatformIo::new(powerd_io::PlatformTopo::uniform(1, 2, 1));
        let mut provider = powerd_io::ConstConfigIoGroup::new();
        provider.add_signal("REGION_HASH", Domain::Core, 0, 11.0);
        provider.add_signal("REGION_HASH", Domain::Core, 1, 22.0);
        provider.add_signal("REGION_HINT", Domain::Core, 0, 0.0);
        provider.add_signal("REGION_HINT", Domain::Core, 1, 0.0);
        provider.add_control("CPU_FREQUENCY_CONTROL", Domain::Core, 0, 3.7);
        provider.add_control("CPU_FREQUENCY_CONTROL", Domain::Core, 1, 3.7);
        provider.add_signal("EPOCH_COUNT", Domain::Board, 0, 5.0);
        io.add_provider(Box::new(provider));

        // k_net/k_non_net set far out of reach so only the epoch-rebalance
        // path can move `current_target` away from its initial value.
        let mut agent = FrequencyBalancerAgent::new(2, 1.0, 3.7, 0.1, 2.1, 2, 1.0, 100, 100, false);
        agent.init(0, 0, true, &mut io).unwrap();

        for _ in 0..10 {
            io.read_batch().unwrap();
            let mut sample = vec![0.0; 2];
            agent.sample_platform(&io, &mut sample).unwrap();
            agent.adjust_platform(&[3.7], &mut io).unwrap();
        }

        // The epoch count never advanced past its initial reading, so no
        // rebalance ever ran and every core stays at `platform_max`.
        assert_eq!(agent.current_target, vec![3.7, 3.7]);
        assert_eq!(agent.epoch_count_at_last_balance, 5.0);
    }
}
