//! The monitor agent: a leaf agent that reads a fixed list of signals and
//! writes no controls. Used for passive observation (§8 scenario 1) and as
//! the simplest possible conformer to the `Agent` trait.

use crate::agent::Agent;
use crate::error::Result;
use powerd_io::{Domain, PlatformIo};

pub struct MonitorAgent {
    signal_names: Vec<String>,
    domain: Domain,
    handles: Vec<powerd_io::platform_io::Handle>,
    last_sample: Vec<f64>,
}

impl MonitorAgent {
    pub fn new(signal_names: Vec<String>, domain: Domain) -> Self {
        let last_sample = vec![f64::NAN; signal_names.len()];
        MonitorAgent { signal_names, domain, handles: Vec::new(), last_sample }
    }
}

impl Agent for MonitorAgent {
    fn init(&mut self, _level: usize, _fan_out: usize, _is_level_root: bool, platform_io: &mut PlatformIo) -> Result<()> {
        self.handles.clear();
        for name in &self.signal_names {
            self.handles.push(platform_io.push_signal(name, self.domain, 0)?);
        }
        Ok(())
    }

    fn validate_policy(&mut self, _policy: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn aggregate_sample(&mut self, child_samples: &[Vec<f64>], out_sample: &mut [f64]) {
        // Sum children's samples element-wise, the default reduction for a
        // purely observational agent.
        for slot in out_sample.iter_mut() {
            *slot = 0.0;
        }
        for child in child_samples {
            for (slot, &v) in out_sample.iter_mut().zip(child) {
                *slot += v;
            }
        }
    }

    fn adjust_platform(&mut self, _policy: &[f64], _platform_io: &mut PlatformIo) -> Result<()> {
        Ok(())
    }

    fn do_write_batch(&self) -> bool {
        false
    }

    fn sample_platform(&mut self, platform_io: &PlatformIo, out_sample: &mut [f64]) -> Result<()> {
        for (i, &handle) in self.handles.iter().enumerate() {
            let value = platform_io.sample(handle)?;
            self.last_sample[i] = value;
            if let Some(slot) = out_sample.get_mut(i) {
                *slot = value;
            }
        }
        Ok(())
    }

    fn trace_names(&self) -> Vec<String> {
        self.signal_names.clone()
    }

    fn trace_formats(&self) -> Vec<String> {
        vec!["%.6f".to_string(); self.signal_names.len()]
    }

    fn trace_values(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.last_sample);
    }

    fn tick_metrics(&self) -> Vec<(u64, String, String, f64)> {
        self.signal_names
            .iter()
            .zip(&self.last_sample)
            .map(|(name, &value)| (powerd_app::REGION_HASH_UNMARKED, "monitor".to_string(), name.clone(), value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerd_io::{ConstConfigIoGroup, PlatformTopo};

    #[test]
    fn three_ticks_of_constant_signal_accumulate_to_zero_std() {
        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
        let mut provider = ConstConfigIoGroup::new();
        provider.add_signal("cpu-energy", Domain::Board, 0, 100.0);
        provider.add_signal("gpu-energy", Domain::Board, 0, 50.0);
        io.add_provider(Box::new(provider));

        let mut agent = MonitorAgent::new(vec!["cpu-energy".into(), "gpu-energy".into()], Domain::Board);
        agent.init(0, 0, true, &mut io).unwrap();

        let mut report = powerd_logging::report::Report::new();
        for _ in 0..3 {
            io.read_batch().unwrap();
            let mut sample = vec![0.0; 2];
            agent.sample_platform(&io, &mut sample).unwrap();
            for (hash, name, metric, value) in agent.tick_metrics() {
                report.region_mut(hash, &name).observe(&metric, value);
            }
        }
        let region = &report.regions[&powerd_app::REGION_HASH_UNMARKED].1;
        let acc = &region.metrics["cpu-energy"];
        assert_eq!(acc.count(), 3);
        assert_eq!(acc.first(), 100.0);
        assert_eq!(acc.last(), 100.0);
        assert_eq!(acc.min(), 100.0);
        assert_eq!(acc.max(), 100.0);
        assert_eq!(acc.mean(), 100.0);
        assert_eq!(acc.std(), 0.0);
    }
}
