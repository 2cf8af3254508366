//! Record filters observe the record stream as it is produced and may
//! inject synthetic records. The only filter implemented here is the
//! proxy-epoch filter (§8 scenario 3), which turns repeated entry into a
//! designated "epoch" region into synthesized epoch-count records when the
//! application never calls an explicit epoch marker.

use crate::error::{Error, Result};
use crate::record::{region_hash, EventKind, Record, RecordEvent};

/// Observes one record at a time and returns the records that should
/// actually be appended to the log: usually just the input record,
/// occasionally the input record plus a synthesized one.
pub trait RecordFilter: Send {
    fn filter(&mut self, record: Record) -> Vec<Record>;
}

/// Synthesizes an `epoch_count` record every `calls_per_epoch`-th entry
/// into `region_hash`, after the first `startup_count` entries into that
/// region have passed through unmodified.
pub struct ProxyEpochRecordFilter {
    region_hash: u32,
    calls_per_epoch: i64,
    /// Signed count of matched entries, biased so it reaches zero exactly
    /// at the first post-startup entry. Checked before incrementing, so
    /// that first post-startup entry is itself epoch-eligible.
    count: i64,
    epoch_count: u64,
}

impl ProxyEpochRecordFilter {
    pub fn new(region_hash: u32, calls_per_epoch: u64, startup_count: u64) -> Result<Self> {
        if calls_per_epoch == 0 {
            return Err(Error::Invalid("calls_per_epoch must be nonzero".into()));
        }
        Ok(ProxyEpochRecordFilter { region_hash, calls_per_epoch: calls_per_epoch as i64, count: -(startup_count as i64), epoch_count: 0 })
    }

    pub fn epoch_count(&self) -> u64 {
        self.epoch_count
    }
}

impl RecordFilter for ProxyEpochRecordFilter {
    fn filter(&mut self, record: Record) -> Vec<Record> {
        let mut out = vec![record];
        if record.kind() != Some(EventKind::RegionEntry) {
            return out;
        }
        let Some(RecordEvent::RegionEntry { process, time, region_id }) = RecordEvent::from_record(record) else {
            return out;
        };
        if region_hash(region_id) != self.region_hash {
            return out;
        }
        if self.count >= 0 && self.count % self.calls_per_epoch == 0 {
            self.epoch_count += 1;
            out.push(RecordEvent::EpochCount { process, time, count: self.epoch_count }.into_record());
        }
        self.count += 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::region_id;

    fn entry_at(hash: u32, time: f64) -> Record {
        RecordEvent::RegionEntry { process: 1, time, region_id: region_id(0, hash) }.into_record()
    }

    #[test]
    fn startup_entries_pass_through_unmodified() {
        let mut filter = ProxyEpochRecordFilter::new(5, 3, 2).unwrap();
        assert_eq!(filter.filter(entry_at(5, 0.0)).len(), 1);
        assert_eq!(filter.filter(entry_at(5, 1.0)).len(), 1);
        assert_eq!(filter.epoch_count(), 0);
    }

    #[test]
    fn every_nth_entry_after_startup_synthesizes_an_epoch() {
        // startup_count=3, calls_per_epoch=2: the first post-startup entry
        // is itself epoch-eligible, so over 10 entries epochs synthesize at
        // entries 4, 6, 8, 10 (4 epochs), not 5, 7, 9.
        let mut filter = ProxyEpochRecordFilter::new(5, 2, 3).unwrap();
        let mut epoch_entries = Vec::new();
        for i in 0..10 {
            let out = filter.filter(entry_at(5, i as f64));
            if out.len() == 2 {
                assert_eq!(out[1].kind(), Some(EventKind::EpochCount));
                epoch_entries.push(i + 1);
            }
        }
        assert_eq!(epoch_entries, vec![4, 6, 8, 10]);
        assert_eq!(filter.epoch_count(), 4);
    }

    #[test]
    fn unrelated_region_hash_is_untouched() {
        let mut filter = ProxyEpochRecordFilter::new(5, 1, 0).unwrap();
        let out = filter.filter(entry_at(9, 0.0));
        assert_eq!(out.len(), 1);
        assert_eq!(filter.epoch_count(), 0);
    }
}
