//! The `Agent` trait: the decision module that runs at one level of the
//! reduction tree. Every method corresponds to one step of the controller
//! loop's five phases; the controller calls them in a fixed order and never
//! reaches back into `read_batch` between `adjust_platform` and
//! `write_batch`.

use crate::error::Result;
use powerd_io::PlatformIo;

/// A decision module running at one level of the tree. A concrete agent
/// type is instantiated once per level it controls; only the level-0
/// (leaf) instance ever touches `platform_io` directly.
pub trait Agent: Send {
    /// Allocates per-level state. At the leaf, also pushes every signal and
    /// control this agent will use onto `platform_io`.
    fn init(&mut self, level: usize, fan_out: usize, is_level_root: bool, platform_io: &mut PlatformIo) -> Result<()>;

    /// In-place policy normalization: replace NaN entries with documented
    /// defaults, clamp to legal ranges, reject mutually exclusive
    /// combinations with `agent-reject`.
    fn validate_policy(&mut self, policy: &mut [f64]) -> Result<()>;

    /// Partitions `in_policy` into one policy vector per child. The default
    /// behavior for an agent with no partitioning logic is to replicate
    /// `in_policy` into every entry of `out_child_policies`.
    fn split_policy(&mut self, in_policy: &[f64], out_child_policies: &mut [Vec<f64>]) {
        for child in out_child_policies.iter_mut() {
            child.clear();
            child.extend_from_slice(in_policy);
        }
    }

    /// Whether `split_policy` produced a message that must actually be sent
    /// this tick (lets the controller suppress redundant downward sends).
    fn do_send_policy(&self) -> bool {
        true
    }

    /// Reduces `child_samples` (one vector per child) to a single sample
    /// vector for this level.
    fn aggregate_sample(&mut self, child_samples: &[Vec<f64>], out_sample: &mut [f64]);

    /// Whether to emit the aggregated sample upward this tick.
    fn do_send_sample(&self) -> bool {
        true
    }

    /// Leaf-only: computes controls from `policy` and the most recently
    /// sampled platform state, writing them through `platform_io.adjust`.
    /// Must be idempotent for an unchanged policy.
    fn adjust_platform(&mut self, policy: &[f64], platform_io: &mut PlatformIo) -> Result<()>;

    /// Whether the last `adjust_platform` call changed any control.
    fn do_write_batch(&self) -> bool;

    /// Leaf-only: reads `platform_io.sample` for every signal this agent
    /// needs and computes derived per-tick state.
    fn sample_platform(&mut self, platform_io: &PlatformIo, out_sample: &mut [f64]) -> Result<()>;

    /// Hook called once per tick from the controller's wait phase. Most
    /// agents have no notion of wall time (the controller owns it per the
    /// concurrency model) and leave this as a no-op.
    fn wait(&mut self) {}

    /// Key-value pairs for the report header. Only the root-level agent's
    /// output is actually emitted.
    fn report_header(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn report_host(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn report_region(&self, _region_hash: u64) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Column names for the trace, in the order `trace_values` fills them.
    fn trace_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// A `printf`-style format hint per column (e.g. `"%.6f"`), parallel to
    /// `trace_names`.
    fn trace_formats(&self) -> Vec<String> {
        Vec::new()
    }

    /// Appends one row's worth of values, parallel to `trace_names`.
    fn trace_values(&self, out: &mut Vec<f64>) {
        let _ = out;
    }

    /// Per-tick `(region_hash, region_name, metric_name, value)` tuples fed
    /// into the shutdown report's region accumulators. Most agents report
    /// under a single synthetic region representing "whole run."
    fn tick_metrics(&self) -> Vec<(u64, String, String, f64)> {
        Vec::new()
    }

    /// One-shot apply path used when the controller loop is not running:
    /// validates and immediately applies `policy` without going through the
    /// tree.
    fn enforce_policy(&mut self, policy: &[f64], platform_io: &mut PlatformIo) -> Result<()> {
        self.adjust_platform(policy, platform_io)
    }
}
