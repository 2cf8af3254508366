//! A leaf agent that enforces a single package-power budget by delegating
//! directly to [`PowerGovernor`]. The policy is a one-element vector: the
//! requested power cap in watts.

use crate::agent::Agent;
use crate::error::{Error, Result};
use powerd_io::{Domain, PlatformIo, PowerGovernor};

pub struct PowerGovernorAgent {
    governor: PowerGovernor,
    power_signal: Option<powerd_io::platform_io::Handle>,
    power_control: Option<powerd_io::platform_io::Handle>,
    last_sample: f64,
}

impl PowerGovernorAgent {
    pub fn new(min: f64, max: f64, min_time_window: f64) -> Self {
        PowerGovernorAgent {
            governor: PowerGovernor::new(min, max, min_time_window),
            power_signal: None,
            power_control: None,
            last_sample: f64::NAN,
        }
    }
}

impl Agent for PowerGovernorAgent {
    fn init(&mut self, _level: usize, _fan_out: usize, _is_level_root: bool, platform_io: &mut PlatformIo) -> Result<()> {
        self.power_signal = Some(platform_io.push_signal("PACKAGE_POWER", Domain::Package, 0)?);
        self.power_control = Some(platform_io.push_control("PACKAGE_POWER_LIMIT", Domain::Package, 0)?);
        Ok(())
    }

    fn validate_policy(&mut self, policy: &mut [f64]) -> Result<()> {
        if policy.len() != 1 {
            return Err(Error::Invalid("power governor policy must be a single watt budget".into()));
        }
        if policy[0].is_nan() {
            policy[0] = self.governor.last_applied();
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

    fn adjust_platform(&mut self, policy: &[f64], platform_io: &mut PlatformIo) -> Result<()> {
        let applied = self.governor.adjust_platform(policy[0]).map_err(Error::from)?;
        if let Some(control) = self.power_control {
            platform_io.adjust(control, applied)?;
        }
        Ok(())
    }

    fn do_write_batch(&self) -> bool {
        self.governor.do_write_batch()
    }

    fn sample_platform(&mut self, platform_io: &PlatformIo, out_sample: &mut [f64]) -> Result<()> {
        if let Some(signal) = self.power_signal {
            self.last_sample = platform_io.sample(signal)?;
            if let Some(slot) = out_sample.first_mut() {
                *slot = self.last_sample;
            }
        }
        Ok(())
    }

    fn trace_names(&self) -> Vec<String> {
        vec!["PACKAGE_POWER".to_string()]
    }

    fn trace_values(&self, out: &mut Vec<f64>) {
        out.push(self.last_sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerd_io::{ConstConfigIoGroup, PlatformTopo};

    #[test]
    fn rejects_wrong_length_policy() {
        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
        let mut provider = ConstConfigIoGroup::new();
        provider.add_signal("PACKAGE_POWER", Domain::Package, 0, 90.0);
        provider.add_control("PACKAGE_POWER_LIMIT", Domain::Package, 0, 90.0);
        io.add_provider(Box::new(provider));

        let mut agent = PowerGovernorAgent::new(50.0, 150.0, 0.04);
        agent.init(0, 0, true, &mut io).unwrap();
        assert!(agent.validate_policy(&mut [1.0, 2.0]).is_err());
    }

    #[test]
    fn clamps_budget_and_writes_through_to_platform_io() {
        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
        let mut provider = ConstConfigIoGroup::new();
        provider.add_signal("PACKAGE_POWER", Domain::Package, 0, 90.0);
        provider.add_control("PACKAGE_POWER_LIMIT", Domain::Package, 0, 90.0);
        io.add_provider(Box::new(provider));

        let mut agent = PowerGovernorAgent::new(50.0, 150.0, 0.04);
        agent.init(0, 0, true, &mut io).unwrap();
        let mut policy = [500.0];
        agent.validate_policy(&mut policy).unwrap();
        agent.adjust_platform(&policy, &mut io).unwrap();
        assert!(agent.do_write_batch());
    }
}
