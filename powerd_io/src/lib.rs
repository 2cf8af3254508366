//! PlatformIO: the single entry point through which agents request scalar
//! signals and emit scalar controls, dispatched to registered [`IOGroup`]
//! providers and batched into one read and one write per tick.
//!
//! Threads of responsibility, leaves-first: [`domain`] enumerates the
//! hardware hierarchy a signal or control is defined over; [`signal`] is the
//! handle/history/derivative layer; [`governor`] turns agent requests into
//! bounded, quantized control writes; [`platform_io`] ties push/read/write
//! together and dispatches across providers.

pub mod domain;
pub mod error;
pub mod governor;
pub mod platform_io;
pub mod signal;

pub use domain::{Domain, PlatformTopo};
pub use error::Error;
pub use governor::{ClosGovernor, FrequencyGovernor, PowerGovernor};
pub use platform_io::{ConstConfigIoGroup, IOGroup, PlatformIo, SignalBehavior};
pub use signal::{DerivativeSignal, HistoryBuffer};
