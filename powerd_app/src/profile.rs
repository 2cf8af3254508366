//! `Profile` ties the record log and status map together into the surface
//! a profiled application actually calls into: region entry/exit (assigning
//! a region id from its name the first time it is seen), progress and hint
//! reporting, and epoch marking.

use crate::crc32::crc32_str;
use crate::error::Result;
use crate::record::region_id;
use crate::record_log::RecordLog;
use crate::status_map::StatusMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct Profile {
    process: i32,
    cpu: usize,
    record_log: Arc<RecordLog>,
    status_map: Arc<StatusMap>,
    /// Region name -> assigned id, so repeated calls with the same name
    /// reuse the id (and its first-bound hint) instead of re-hashing and
    /// re-binding.
    region_ids: Mutex<HashMap<String, u64>>,
    /// Stack of hints for the regions currently entered on this CPU, so
    /// exiting an inner region restores the enclosing region's hint rather
    /// than clearing it outright.
    hint_stack: Mutex<Vec<u32>>,
    epoch_count: AtomicU64,
}

impl Profile {
    pub fn new(process: i32, cpu: usize, record_log: Arc<RecordLog>, status_map: Arc<StatusMap>) -> Self {
        Profile {
            process,
            cpu,
            record_log,
            status_map,
            region_ids: Mutex::new(HashMap::new()),
            hint_stack: Mutex::new(Vec::new()),
            epoch_count: AtomicU64::new(0),
        }
    }

    /// Returns the region id for `(name, hint)`, assigning one (the hint
    /// in the high half, the name's CRC-32 hash in the low half) and
    /// binding the name in the record log the first time this name is
    /// seen. A name already bound keeps its first-bound hint.
    pub fn region(&self, time: f64, name: &str, hint: u32) -> u64 {
        let mut ids = self.region_ids.lock().unwrap();
        if let Some(&id) = ids.get(name) {
            return id;
        }
        let hash = crc32_str(name);
        self.record_log.bind_name(self.process, time, name);
        let id = region_id(hint, hash);
        ids.insert(name.to_string(), id);
        id
    }

    /// Equivalent to [`Profile::region`] with an unset hint.
    pub fn region_id(&self, time: f64, name: &str) -> u64 {
        self.region(time, name, crate::HINT_UNSET)
    }

    /// Enters `name`'s region at `time` with hint `hint`, recording a
    /// (possibly nested) region entry, pushing `hint` onto this CPU's hint
    /// stack, and resetting this CPU's reported progress to zero.
    pub fn enter_region(&self, time: f64, name: &str, hint: u32) -> Result<u64> {
        let id = self.region(time, name, hint);
        self.record_log.enter_region(self.process, time, id);
        self.hint_stack.lock().unwrap().push(hint);
        self.status_map.set_hint(self.cpu, hint)?;
        self.status_map.set_progress(self.cpu, 0, 1)?;
        Ok(id)
    }

    /// Exits `region_id` at `time`, restoring the hint of the enclosing
    /// region (or the unset sentinel, if this was the outermost region).
    pub fn exit_region(&self, time: f64, region_id: u64) -> Result<()> {
        self.record_log.exit_region(self.process, time, region_id);
        let restored_hint = {
            let mut stack = self.hint_stack.lock().unwrap();
            stack.pop();
            stack.last().copied().unwrap_or(crate::HINT_UNSET)
        };
        self.status_map.set_hint(self.cpu, restored_hint)?;
        self.status_map.set_progress(self.cpu, 1, 1)
    }

    /// Reports fractional progress (`[0, 1]`) through the currently
    /// entered region.
    pub fn set_progress(&self, fraction: f64) -> Result<()> {
        self.status_map.set_progress_fraction(self.cpu, fraction)
    }

    pub fn set_hint(&self, time: f64, hint: u32) -> Result<()> {
        self.record_log.hint_change(self.process, time, hint as u64);
        self.status_map.set_hint(self.cpu, hint)
    }

    /// Marks an application epoch boundary, incrementing and returning the
    /// new epoch count.
    pub fn epoch(&self, time: f64) -> u64 {
        let count = self.epoch_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.record_log.epoch_count(self.process, time, count);
        count
    }

    pub fn epoch_count(&self) -> u64 {
        self.epoch_count.load(Ordering::SeqCst)
    }

    /// Asks the controller to end the run at its next step.
    pub fn request_shutdown(&self, time: f64) {
        self.record_log.request_shutdown(self.process, time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_region::InProcessRegion;

    fn profile() -> Profile {
        let log = Arc::new(RecordLog::new(64).unwrap());
        let status = Arc::new(StatusMap::new(Arc::new(InProcessRegion::new(1)), 1).unwrap());
        Profile::new(1, 0, log, status)
    }

    #[test]
    fn same_name_reuses_region_id() {
        let p = profile();
        let a = p.region_id(0.0, "compute_kernel");
        let b = p.region_id(1.0, "compute_kernel");
        assert_eq!(a, b);
    }

    #[test]
    fn enter_region_resets_progress_and_exit_completes_it() {
        let p = profile();
        let id = p.enter_region(0.0, "compute_kernel", crate::HINT_UNSET).unwrap();
        assert_eq!(p.status_map.get_progress_cpu(0).unwrap(), 0.0);
        p.set_progress(0.5).unwrap();
        assert!((p.status_map.get_progress_cpu(0).unwrap() - 0.5).abs() < 1e-3);
        p.exit_region(1.0, id).unwrap();
        assert_eq!(p.status_map.get_progress_cpu(0).unwrap(), 1.0);
    }

    #[test]
    fn entering_a_region_sets_its_hint_and_exiting_restores_the_outer_hint() {
        const HINT_COMPUTE: u32 = 1;
        const HINT_NETWORK: u32 = 2;
        let p = profile();

        let outer = p.enter_region(0.0, "outer", HINT_COMPUTE).unwrap();
        assert_eq!(p.status_map.get_hint(0).unwrap(), HINT_COMPUTE);

        let inner = p.enter_region(0.5, "inner", HINT_NETWORK).unwrap();
        assert_eq!(p.status_map.get_hint(0).unwrap(), HINT_NETWORK);

        p.exit_region(0.8, inner).unwrap();
        assert_eq!(p.status_map.get_hint(0).unwrap(), HINT_COMPUTE, "exiting the inner region restores the outer region's hint");

        p.exit_region(1.0, outer).unwrap();
        assert_eq!(p.status_map.get_hint(0).unwrap(), crate::HINT_UNSET, "exiting the outermost region clears the hint");
    }

    #[test]
    fn epoch_increments_and_is_monotonic() {
        let p = profile();
        assert_eq!(p.epoch(0.0), 1);
        assert_eq!(p.epoch(1.0), 2);
        assert_eq!(p.epoch_count(), 2);
    }

    #[test]
    fn request_shutdown_reaches_the_record_log() {
        let log = Arc::new(RecordLog::new(64).unwrap());
        let status = Arc::new(StatusMap::new(Arc::new(InProcessRegion::new(1)), 1).unwrap());
        let p = Profile::new(1, 0, Arc::clone(&log), status);
        p.request_shutdown(3.0);
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), Some(crate::record::EventKind::ShutdownRequest));
    }
}
