//! The CPU-activity governor: a leaf agent that classifies each core into a
//! CLOS priority class by comparing a per-core activity signal against a
//! policy-supplied threshold, driving `powerd_io`'s `ClosGovernor` directly
//! (the CLOS association is a governor-internal write, not a `PlatformIo`
//! control, matching how `FrequencyBalancerAgent`'s optional SST-TF path
//! drives the same governor). Grounded on
//! `examples/original_source/test/CPUActivityAgentTest.cpp`'s per-core
//! high/low classification by a scaled activity ratio against a policy
//! "phi" parameter, simplified here to one activity signal and threshold.

use crate::agent::Agent;
use crate::error::{Error, Result};
use powerd_io::governor::ClosClassConfig;
use powerd_io::{ClosGovernor, Domain, PlatformIo};

pub struct CpuActivityGovernorAgent {
    num_core: usize,
    clos: ClosGovernor,
    activity_handles: Vec<powerd_io::platform_io::Handle>,
    last_activity: Vec<f64>,
    clos_assoc: Vec<u8>,
}

impl CpuActivityGovernorAgent {
    /// `low_freq`/`high_freq` bound the two CLOS classes this agent uses:
    /// class 0 (high priority, active cores) and class 3 (low priority,
    /// idle cores).
    pub fn new(num_core: usize, low_freq: f64, high_freq: f64) -> Self {
        CpuActivityGovernorAgent {
            num_core,
            clos: ClosGovernor::new(
                [
                    ClosClassConfig { priority_weight: 3, min_frequency: low_freq, max_frequency: high_freq },
                    ClosClassConfig { priority_weight: 2, min_frequency: low_freq, max_frequency: high_freq },
                    ClosClassConfig { priority_weight: 1, min_frequency: low_freq, max_frequency: high_freq },
                    ClosClassConfig { priority_weight: 0, min_frequency: low_freq, max_frequency: low_freq },
                ],
                num_core,
            ),
            activity_handles: Vec::new(),
            last_activity: vec![0.0; num_core],
            clos_assoc: vec![3; num_core],
        }
    }
}

impl Agent for CpuActivityGovernorAgent {
    fn init(&mut self, _level: usize, _fan_out: usize, _is_level_root: bool, platform_io: &mut PlatformIo) -> Result<()> {
        self.activity_handles.clear();
        for core in 0..self.num_core {
            self.activity_handles.push(platform_io.push_signal("CPU_ACTIVITY", Domain::Core, core)?);
        }
        self.clos.enable();
        Ok(())
    }

    fn validate_policy(&mut self, policy: &mut [f64]) -> Result<()> {
        if policy.len() != 1 {
            return Err(Error::Invalid("CPU-activity governor policy is a single activity threshold in [0, 1]".into()));
        }
        if policy[0].is_nan() {
            policy[0] = 0.5;
        }
        policy[0] = policy[0].clamp(0.0, 1.0);
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
        for (i, &h) in self.activity_handles.iter().enumerate() {
            let value = platform_io.sample(h)?;
            self.last_activity[i] = value;
            if let Some(slot) = out_sample.get_mut(i) {
                *slot = value;
            }
        }
        Ok(())
    }

    fn adjust_platform(&mut self, policy: &[f64], _platform_io: &mut PlatformIo) -> Result<()> {
        let threshold = policy.first().copied().unwrap_or(0.5);
        self.clos_assoc = self.last_activity.iter().map(|&activity| if activity >= threshold { 0u8 } else { 3u8 }).collect();
        self.clos.adjust_platform(&self.clos_assoc)?;
        Ok(())
    }

    fn do_write_batch(&self) -> bool {
        self.clos.do_write_batch()
    }

    fn trace_names(&self) -> Vec<String> {
        (0..self.num_core).map(|core| format!("CPU_ACTIVITY[{core}]")).collect()
    }

    fn trace_values(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.last_activity);
    }

    fn tick_metrics(&self) -> Vec<(u64, String, String, f64)> {
        self.last_activity
            .iter()
            .enumerate()
            .map(|(core, &activity)| (powerd_app::REGION_HASH_UNMARKED, "cpu_activity_governor".to_string(), format!("activity[{core}]"), activity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerd_io::{ConstConfigIoGroup, PlatformTopo};

    fn io_with_activity(values: &[f64]) -> PlatformIo {
        let mut io = PlatformIo::new(PlatformTopo::uniform(1, values.len(), 1));
        let mut provider = ConstConfigIoGroup::new();
        for (core, &v) in values.iter().enumerate() {
            provider.add_signal("CPU_ACTIVITY", Domain::Core, core, v);
        }
        io.add_provider(Box::new(provider));
        io
    }

    #[test]
    fn cores_above_threshold_are_classified_high_priority() {
        let mut io = io_with_activity(&[0.9, 0.1, 0.6]);
        let mut agent = CpuActivityGovernorAgent::new(3, 1.0, 3.0);
        agent.init(0, 0, true, &mut io).unwrap();

        let mut policy = [0.5];
        agent.validate_policy(&mut policy).unwrap();
        io.read_batch().unwrap();
        let mut sample = vec![0.0; 3];
        agent.sample_platform(&io, &mut sample).unwrap();
        agent.adjust_platform(&policy, &mut io).unwrap();

        assert_eq!(agent.clos_assoc, vec![0, 3, 0]);
        assert!(agent.do_write_batch());
    }

    #[test]
    fn nan_policy_falls_back_to_default_threshold() {
        let mut agent = CpuActivityGovernorAgent::new(1, 1.0, 3.0);
        let mut policy = [f64::NAN];
        agent.validate_policy(&mut policy).unwrap();
        assert_eq!(policy[0], 0.5);
    }

    #[test]
    fn rejects_wrong_length_policy() {
        let mut agent = CpuActivityGovernorAgent::new(1, 1.0, 3.0);
        assert!(agent.validate_policy(&mut [1.0, 2.0]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn classification_matches_threshold_comparison(
            activity in proptest::collection::vec(0.0f64..1.0, 1..6),
            threshold in 0.0f64..1.0,
        ) {
            let num_core = activity.len();
            let mut io = io_with_activity(&activity);
            let mut agent = CpuActivityGovernorAgent::new(num_core, 1.0, 3.0);
            agent.init(0, 0, true, &mut io).unwrap();
            io.read_batch().unwrap();
            let mut sample = vec![0.0; num_core];
            agent.sample_platform(&io, &mut sample).unwrap();
            agent.adjust_platform(&[threshold], &mut io).unwrap();

            for (core, &a) in activity.iter().enumerate() {
                let expected = if a >= threshold { 0u8 } else { 3u8 };
                proptest::prop_assert_eq!(agent.clos_assoc[core], expected);
            }
        }
    }
}
