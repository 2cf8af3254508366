//! The record log (§4.6): a bounded single-producer/single-consumer
//! channel of [`Record`]s. The producer (the profiled application) must
//! never block — once the channel is full, newly completed regions are
//! folded into a short-region summary table instead of being dropped or
//! stalling the caller. Region entry/exit additionally carries a per-process
//! nesting counter so that re-entrant regions only emit one entry and one
//! exit record, and a region name is only ever bound once per hash.
//!
//! The channel itself is `std::sync::mpsc::sync_channel`, the same
//! SPSC primitive the tree communicator's `SharedQueueSend`/`SharedQueueRecv`
//! wrap: the producer side (`enter_region`, `exit_region`, ...) never takes
//! a lock shared with the consumer, and `try_send` against a full channel
//! returns immediately instead of blocking.

use crate::crc32::crc32_str;
use crate::error::{Error, Result};
use crate::record::{region_hash, Record, RecordEvent, ShortRegionSummary};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

#[derive(Default)]
struct OpenRegion {
    depth: u32,
    entered_at: f64,
}

pub struct RecordLog {
    capacity: usize,
    tx: SyncSender<Record>,
    rx: Mutex<Receiver<Record>>,
    len: AtomicUsize,
    short_regions: Mutex<HashMap<u32, ShortRegionSummary>>,
    bound_hashes: Mutex<HashSet<u32>>,
    open: Mutex<HashMap<(i32, u64), OpenRegion>>,
}

impl RecordLog {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Invalid("record log capacity must be nonzero".into()));
        }
        let (tx, rx) = mpsc::sync_channel(capacity);
        Ok(RecordLog {
            capacity,
            tx,
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
            short_regions: Mutex::new(HashMap::new()),
            bound_hashes: Mutex::new(HashSet::new()),
            open: Mutex::new(HashMap::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues `record`, or folds it into the short-region overflow table
    /// if the channel is full. Returns `true` if it was enqueued, `false`
    /// if it overflowed. Never blocks.
    fn push_or_overflow(&self, record: Record, overflow_duration: Option<(u32, f64)>) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                if let Some((hash, duration)) = overflow_duration {
                    let mut short = self.short_regions.lock().unwrap();
                    short.entry(hash).or_insert_with(|| ShortRegionSummary::new(hash as u64)).record_completion(duration);
                }
                false
            }
        }
    }

    /// Records entry into `region_id` for `process` at `time`. Only the
    /// outermost entry of a nested re-entry produces a record.
    pub fn enter_region(&self, process: i32, time: f64, region_id: u64) {
        let mut open = self.open.lock().unwrap();
        let state = open.entry((process, region_id)).or_default();
        state.depth += 1;
        if state.depth == 1 {
            state.entered_at = time;
            drop(open);
            self.push_or_overflow(RecordEvent::RegionEntry { process, time, region_id }.into_record(), None);
        }
    }

    /// Records exit from `region_id` for `process` at `time`. Only the
    /// outermost exit produces a record; on overflow the region's duration
    /// is folded into its short-region summary instead.
    pub fn exit_region(&self, process: i32, time: f64, region_id: u64) {
        let mut open = self.open.lock().unwrap();
        let Some(state) = open.get_mut(&(process, region_id)) else { return };
        if state.depth == 0 {
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            let duration = time - state.entered_at;
            open.remove(&(process, region_id));
            drop(open);
            let hash = region_hash(region_id);
            self.push_or_overflow(
                RecordEvent::RegionExit { process, time, region_id }.into_record(),
                Some((hash, duration)),
            );
        }
    }

    pub fn epoch_count(&self, process: i32, time: f64, count: u64) {
        self.push_or_overflow(RecordEvent::EpochCount { process, time, count }.into_record(), None);
    }

    pub fn hint_change(&self, process: i32, time: f64, hint: u64) {
        self.push_or_overflow(RecordEvent::HintChange { process, time, hint }.into_record(), None);
    }

    /// Asks the controller to end the run. Like every other record, this
    /// never blocks; if the channel happens to be full the request is
    /// folded away rather than retried, same as any other overflowing
    /// record (the application is expected to keep requesting shutdown, or
    /// rely on an OS signal, if this one is lost).
    pub fn request_shutdown(&self, process: i32, time: f64) {
        self.push_or_overflow(RecordEvent::ShutdownRequest { process, time }.into_record(), None);
    }

    /// Binds `name` to its CRC-32 hash the first time it is seen for this
    /// log; subsequent calls with the same name are no-ops. Returns the
    /// hash either way.
    pub fn bind_name(&self, process: i32, time: f64, name: &str) -> u32 {
        let hash = crc32_str(name);
        let mut bound = self.bound_hashes.lock().unwrap();
        if bound.insert(hash) {
            drop(bound);
            self.push_or_overflow(RecordEvent::NameBinding { process, time, hash: hash as u64 }.into_record(), None);
        }
        hash
    }

    /// Drains all currently buffered records in FIFO order, leaving the log
    /// empty. The only lock this takes guards the single-consumer side,
    /// never the producer's `try_send`.
    pub fn drain(&self) -> Vec<Record> {
        let rx = self.rx.lock().unwrap();
        let mut drained = Vec::new();
        while let Ok(record) = rx.try_recv() {
            drained.push(record);
        }
        self.len.fetch_sub(drained.len(), Ordering::SeqCst);
        drained
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the overflow short-region table, keyed by region hash.
    pub fn short_region_summaries(&self) -> Vec<ShortRegionSummary> {
        self.short_regions.lock().unwrap().values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{region_id, EventKind};

    #[test]
    fn nested_reentry_emits_single_entry_and_exit() {
        let log = RecordLog::new(16).unwrap();
        let rid = region_id(0, 1);
        log.enter_region(1, 0.0, rid);
        log.enter_region(1, 0.1, rid);
        log.exit_region(1, 0.2, rid);
        log.exit_region(1, 0.3, rid);
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind(), Some(EventKind::RegionEntry));
        assert_eq!(drained[1].kind(), Some(EventKind::RegionExit));
    }

    #[test]
    fn name_bound_only_once() {
        let log = RecordLog::new(16).unwrap();
        let h1 = log.bind_name(1, 0.0, "main_loop");
        let h2 = log.bind_name(1, 1.0, "main_loop");
        assert_eq!(h1, h2);
        assert_eq!(log.drain().len(), 1);
    }

    #[test]
    fn overflow_never_blocks_and_merges_into_short_region() {
        let log = RecordLog::new(1).unwrap();
        let rid = region_id(0, 7);
        // Fill the single slot with an entry record.
        log.enter_region(1, 0.0, rid);
        assert_eq!(log.len(), 1);
        // Exit overflows: the exit record can't fit, so it's merged.
        log.exit_region(1, 1.5, rid);
        assert_eq!(log.len(), 1, "producer never blocks or grows past capacity");
        let summaries = log.short_region_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].num_complete, 1);
        assert!((summaries[0].total_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn request_shutdown_enqueues_a_shutdown_record() {
        let log = RecordLog::new(16).unwrap();
        log.request_shutdown(1, 2.0);
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), Some(EventKind::ShutdownRequest));
    }

    #[test]
    fn exit_without_matching_entry_is_ignored() {
        let log = RecordLog::new(16).unwrap();
        log.exit_region(1, 0.0, region_id(0, 9));
        assert!(log.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn len_never_exceeds_capacity(hashes in proptest::collection::vec(0u32..4, 0..64)) {
            let capacity = 4;
            let log = RecordLog::new(capacity).unwrap();
            for (i, hash) in hashes.iter().enumerate() {
                log.enter_region(1, i as f64, region_id(0, *hash));
                proptest::prop_assert!(log.len() <= capacity);
            }
        }
    }
}
