//! Application-side profiling channel: the record log shared-memory ring,
//! the per-CPU status map, region id assignment and nesting accounting
//! (`Profile`), and record filters.

pub mod crc32;
pub mod error;
pub mod profile;
pub mod record;
pub mod record_filter;
pub mod record_log;
pub mod shared_region;
pub mod status_map;
pub mod status_map_io_group;

pub use error::Error;
pub use profile::Profile;
pub use record::{Record, RecordEvent, ShortRegionSummary};
pub use record_filter::{ProxyEpochRecordFilter, RecordFilter};
pub use record_log::RecordLog;
pub use shared_region::{InProcessRegion, SharedRegion};
pub use status_map::StatusMap;
pub use status_map_io_group::StatusMapIoGroup;

/// Sentinel denoting "no region"/"outside any region."
pub const REGION_HASH_UNMARKED: u64 = 0;
/// Sentinel hint value meaning "no hint set."
pub const HINT_UNSET: u32 = 0;
