//! An `IOGroup` bridging the application-side [`StatusMap`] into
//! `PlatformIO`: surfaces `REGION_HINT` and `REGION_PROGRESS` as ordinary
//! per-core signals so agents like the frequency balancer read a profiled
//! process's hint the same way they read any MSR or sysfs signal, without
//! knowing the status map exists.

use crate::status_map::StatusMap;
use powerd_io::error::Result;
use powerd_io::platform_io::IOGroup;
use powerd_io::{Domain, Error, SignalBehavior};
use std::any::Any;
use std::sync::Arc;

const REGION_HINT: &str = "REGION_HINT";
const REGION_PROGRESS: &str = "REGION_PROGRESS";

/// Maps a `Domain::Core` index directly onto the status map's CPU index.
/// One core, one hardware thread, one status word: the topology this
/// crate's callers build with `PlatformTopo::uniform(.., .., 1)`.
pub struct StatusMapIoGroup {
    status_map: Arc<StatusMap>,
    pushed: Vec<usize>,
}

impl StatusMapIoGroup {
    pub fn new(status_map: Arc<StatusMap>) -> Self {
        StatusMapIoGroup { status_map, pushed: Vec::new() }
    }
}

impl IOGroup for StatusMapIoGroup {
    fn name(&self) -> &str {
        "STATUS_MAP"
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_valid_signal(&self, name: &str) -> bool {
        name == REGION_HINT || name == REGION_PROGRESS
    }

    fn is_valid_control(&self, _name: &str) -> bool {
        false
    }

    fn signal_domain_type(&self, name: &str) -> Option<Domain> {
        if self.is_valid_signal(name) {
            Some(Domain::Core)
        } else {
            None
        }
    }

    fn control_domain_type(&self, _name: &str) -> Option<Domain> {
        None
    }

    fn signal_behavior(&self, name: &str) -> SignalBehavior {
        if name == REGION_HINT {
            SignalBehavior::Label
        } else {
            SignalBehavior::Variable
        }
    }

    fn push_signal(&mut self, _name: &str, _domain: Domain, domain_idx: usize) -> Result<()> {
        if !self.pushed.contains(&domain_idx) {
            self.pushed.push(domain_idx);
        }
        Ok(())
    }

    fn push_control(&mut self, name: &str, _domain: Domain, _domain_idx: usize) -> Result<()> {
        Err(Error::NotSupported(format!("{name} is not a control this group provides")))
    }

    /// Snapshots every pushed CPU's status word once, so every `sample`
    /// this tick reads a stable view instead of racing the profiled
    /// process's writes.
    fn read_batch(&mut self) -> Result<()> {
        self.status_map.update_cache();
        Ok(())
    }

    fn write_batch(&mut self) -> Result<()> {
        Ok(())
    }

    fn sample(&self, name: &str, _domain: Domain, domain_idx: usize) -> Result<f64> {
        match name {
            REGION_HINT => self
                .status_map
                .cached_hint(domain_idx)
                .map(f64::from)
                .map_err(|e| Error::Invalid(e.to_string())),
            REGION_PROGRESS => self.status_map.cached_progress(domain_idx).map_err(|e| Error::Invalid(e.to_string())),
            other => Err(Error::Invalid(format!("unknown signal {other}"))),
        }
    }

    fn adjust(&mut self, name: &str, _domain: Domain, _domain_idx: usize, _value: f64) -> Result<()> {
        Err(Error::NotSupported(format!("{name} is not a control this group provides")))
    }

    fn read_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<f64> {
        match name {
            REGION_HINT => self.status_map.get_hint(domain_idx).map(f64::from).map_err(|e| Error::Invalid(e.to_string())),
            REGION_PROGRESS => self.status_map.get_progress_cpu(domain_idx).map_err(|e| Error::Invalid(e.to_string())),
            other => Err(Error::Invalid(format!("unknown signal {other}[{domain_idx}] for domain {domain:?}"))),
        }
    }

    fn write_control(&mut self, name: &str, _domain: Domain, _domain_idx: usize, _value: f64) -> Result<()> {
        Err(Error::NotSupported(format!("{name} is not a control this group provides")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_region::InProcessRegion;
    use powerd_io::{PlatformIo, PlatformTopo};

    #[test]
    fn frequency_balancer_reads_a_hint_written_through_profile() {
        let status_map = Arc::new(StatusMap::new(Arc::new(InProcessRegion::new(2)), 2).unwrap());
        let record_log = Arc::new(crate::RecordLog::new(16).unwrap());
        let profile = crate::Profile::new(1, 1, record_log, Arc::clone(&status_map));
        profile.enter_region(0.0, "blocked_on_network", 7).unwrap();

        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 2, 1));
        io.add_provider(Box::new(StatusMapIoGroup::new(status_map)));
        let handle = io.push_signal(REGION_HINT, Domain::Core, 1).unwrap();
        io.read_batch().unwrap();

        assert_eq!(io.sample(handle).unwrap(), 7.0);
    }
}
