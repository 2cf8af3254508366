//! Concrete decision agents running atop `powerd_io`'s PlatformIO and
//! governors: the `Agent` trait every level of the tree implements, a
//! pass-through monitor, a single-scalar power governor, a CLOS-driven
//! CPU-activity governor, and the frequency balancer (the hardest agent,
//! combining epoch-boundary rebalancing with per-tick immediate overrides
//! and SST-TF CLOS mapping).

pub mod agent;
pub mod cpu_activity_governor_agent;
pub mod error;
pub mod frequency_balancer_agent;
pub mod frequency_limit_detector;
pub mod frequency_time_balancer;
pub mod monitor;
pub mod power_governor_agent;

pub use agent::Agent;
pub use cpu_activity_governor_agent::CpuActivityGovernorAgent;
pub use error::Error;
pub use frequency_balancer_agent::FrequencyBalancerAgent;
pub use frequency_limit_detector::FrequencyLimitDetector;
pub use monitor::MonitorAgent;
pub use power_governor_agent::PowerGovernorAgent;
