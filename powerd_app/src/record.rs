//! Fixed wire layouts for the record log (§6): a 32-byte `Record` and a
//! 24-byte `ShortRegionSummary`, plus the higher-level `RecordEvent` tagged
//! union used by producers and consumers.

/// A 64-bit region identifier: a 32-bit hint in the high half, a 32-bit
/// CRC-32 hash of the region name in the low half.
pub const fn region_id(hint: u32, hash: u32) -> u64 {
    ((hint as u64) << 32) | hash as u64
}

pub fn region_hint(id: u64) -> u32 {
    (id >> 32) as u32
}

pub fn region_hash(id: u64) -> u32 {
    id as u32
}

/// Sentinel region identifier denoting the unmarked/outside-region state.
pub const REGION_ID_UNMARKED: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    RegionEntry = 0,
    RegionExit = 1,
    EpochCount = 2,
    ShortRegion = 3,
    HintChange = 4,
    NameBinding = 5,
    ShutdownRequest = 6,
}

impl EventKind {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(EventKind::RegionEntry),
            1 => Some(EventKind::RegionExit),
            2 => Some(EventKind::EpochCount),
            3 => Some(EventKind::ShortRegion),
            4 => Some(EventKind::HintChange),
            5 => Some(EventKind::NameBinding),
            6 => Some(EventKind::ShutdownRequest),
            _ => None,
        }
    }
}

/// The fixed 32-byte on-the-wire record: `process:i32, pad:i32, time:f64,
/// event:u32, pad:u32, signal:u64`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Record {
    pub process: i32,
    _pad0: i32,
    pub time: f64,
    pub event: u32,
    _pad1: u32,
    pub signal: u64,
}

const _: () = assert!(std::mem::size_of::<Record>() == 32);

impl Record {
    pub fn new(process: i32, time: f64, event: EventKind, signal: u64) -> Self {
        Record { process, _pad0: 0, time, event: event as u32, _pad1: 0, signal }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_u32(self.event)
    }
}

/// A higher-level view of [`Record`] used throughout the rest of this
/// crate; every variant carries `(process_id, monotonic_time, signal)`
/// where `signal` is event-specific (a region id for entry/exit, a counter
/// for epoch, an index into the short-region table for short-region
/// events).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecordEvent {
    RegionEntry { process: i32, time: f64, region_id: u64 },
    RegionExit { process: i32, time: f64, region_id: u64 },
    EpochCount { process: i32, time: f64, count: u64 },
    ShortRegion { process: i32, time: f64, table_index: u64 },
    HintChange { process: i32, time: f64, hint: u64 },
    NameBinding { process: i32, time: f64, hash: u64 },
    /// Asks the controller to end the run, per §4.8's "a signal or shutdown
    /// record from any application process" cancellation path.
    ShutdownRequest { process: i32, time: f64 },
}

impl RecordEvent {
    pub fn process(&self) -> i32 {
        match *self {
            RecordEvent::RegionEntry { process, .. }
            | RecordEvent::RegionExit { process, .. }
            | RecordEvent::EpochCount { process, .. }
            | RecordEvent::ShortRegion { process, .. }
            | RecordEvent::HintChange { process, .. }
            | RecordEvent::NameBinding { process, .. }
            | RecordEvent::ShutdownRequest { process, .. } => process,
        }
    }

    pub fn time(&self) -> f64 {
        match *self {
            RecordEvent::RegionEntry { time, .. }
            | RecordEvent::RegionExit { time, .. }
            | RecordEvent::EpochCount { time, .. }
            | RecordEvent::ShortRegion { time, .. }
            | RecordEvent::HintChange { time, .. }
            | RecordEvent::NameBinding { time, .. }
            | RecordEvent::ShutdownRequest { time, .. } => time,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            RecordEvent::RegionEntry { process, time, region_id } => {
                Record::new(process, time, EventKind::RegionEntry, region_id)
            }
            RecordEvent::RegionExit { process, time, region_id } => {
                Record::new(process, time, EventKind::RegionExit, region_id)
            }
            RecordEvent::EpochCount { process, time, count } => {
                Record::new(process, time, EventKind::EpochCount, count)
            }
            RecordEvent::ShortRegion { process, time, table_index } => {
                Record::new(process, time, EventKind::ShortRegion, table_index)
            }
            RecordEvent::HintChange { process, time, hint } => {
                Record::new(process, time, EventKind::HintChange, hint)
            }
            RecordEvent::NameBinding { process, time, hash } => {
                Record::new(process, time, EventKind::NameBinding, hash)
            }
            RecordEvent::ShutdownRequest { process, time } => {
                Record::new(process, time, EventKind::ShutdownRequest, 0)
            }
        }
    }

    pub fn from_record(record: Record) -> Option<Self> {
        let kind = record.kind()?;
        Some(match kind {
            EventKind::RegionEntry => {
                RecordEvent::RegionEntry { process: record.process, time: record.time, region_id: record.signal }
            }
            EventKind::RegionExit => {
                RecordEvent::RegionExit { process: record.process, time: record.time, region_id: record.signal }
            }
            EventKind::EpochCount => {
                RecordEvent::EpochCount { process: record.process, time: record.time, count: record.signal }
            }
            EventKind::ShortRegion => {
                RecordEvent::ShortRegion { process: record.process, time: record.time, table_index: record.signal }
            }
            EventKind::HintChange => {
                RecordEvent::HintChange { process: record.process, time: record.time, hint: record.signal }
            }
            EventKind::NameBinding => {
                RecordEvent::NameBinding { process: record.process, time: record.time, hash: record.signal }
            }
            EventKind::ShutdownRequest => {
                RecordEvent::ShutdownRequest { process: record.process, time: record.time }
            }
        })
    }
}

/// The fixed 24-byte short-region summary: `hash:u64, num_complete:u32,
/// pad:u32, total_time:f64`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShortRegionSummary {
    pub hash: u64,
    pub num_complete: u32,
    _pad: u32,
    pub total_time: f64,
}

const _: () = assert!(std::mem::size_of::<ShortRegionSummary>() == 24);

impl ShortRegionSummary {
    pub fn new(hash: u64) -> Self {
        ShortRegionSummary { hash, num_complete: 0, _pad: 0, total_time: 0.0 }
    }

    pub fn record_completion(&mut self, duration: f64) {
        self.num_complete += 1;
        self.total_time += duration;
    }
}
