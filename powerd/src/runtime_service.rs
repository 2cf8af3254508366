//! The remote policy channel (§4.9): `SetPolicy`, `GetReport`,
//! `AddChildHost`/`RemoveChildHost` over a single mutex shared with the
//! controller loop thread. The service thread never holds the mutex across
//! I/O; handlers only ever copy small fixed-size state in and out.

use powerd_logging::report::RegionReport;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingPolicy {
    pub agent_name: String,
    /// Tick period in seconds. Zero means "stop after the current tick."
    pub period: f64,
    pub profile_name: String,
    pub params: Vec<f64>,
}

impl PendingPolicy {
    pub fn is_stop_request(&self) -> bool {
        self.period == 0.0
    }
}

struct Shared {
    policy: PendingPolicy,
    is_updated: bool,
    stats: RegionReport,
    child_hosts: Vec<String>,
}

/// Shared mutable state the loop thread polls once per tick and the
/// service thread (an RPC handler, in a full deployment) writes into.
pub struct RuntimeService {
    shared: Mutex<Shared>,
}

impl RuntimeService {
    pub fn new(initial_policy: PendingPolicy) -> Self {
        RuntimeService { shared: Mutex::new(Shared { policy: initial_policy, is_updated: true, stats: RegionReport::default(), child_hosts: Vec::new() }) }
    }

    /// Atomically replaces the current policy. If `agent_name` differs from
    /// the previous policy's, the caller (the controller loop) is expected
    /// to construct a fresh agent from its registry on the next tick.
    pub fn set_policy(&self, agent_name: String, period: f64, profile_name: String, params: Vec<f64>) {
        let mut shared = self.shared.lock().unwrap();
        shared.policy = PendingPolicy { agent_name, period, profile_name, params };
        shared.is_updated = true;
    }

    /// Returns the pending policy and clears the updated flag, or `None` if
    /// nothing has changed since the last call. Called at the top of every
    /// tick.
    pub fn take_policy_if_updated(&self) -> Option<PendingPolicy> {
        let mut shared = self.shared.lock().unwrap();
        if shared.is_updated {
            shared.is_updated = false;
            Some(shared.policy.clone())
        } else {
            None
        }
    }

    /// Folds one metric observation into the current statistics window.
    /// Called by the controller loop once per tick per reported metric.
    pub fn observe_metric(&self, metric: &str, value: f64) {
        self.shared.lock().unwrap().stats.observe(metric, value);
    }

    /// Atomically swaps in a fresh statistics accumulator and returns the
    /// previous window's per-metric count/first/last/min/max/mean/std.
    pub fn get_report(&self) -> RegionReport {
        std::mem::take(&mut self.shared.lock().unwrap().stats)
    }

    pub fn add_child_host(&self, host: String) {
        let mut shared = self.shared.lock().unwrap();
        if !shared.child_hosts.contains(&host) {
            shared.child_hosts.push(host);
        }
    }

    pub fn remove_child_host(&self, host: &str) {
        self.shared.lock().unwrap().child_hosts.retain(|h| h != host);
    }

    pub fn child_hosts(&self) -> Vec<String> {
        self.shared.lock().unwrap().child_hosts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(period: f64) -> PendingPolicy {
        PendingPolicy { agent_name: "monitor".into(), period, profile_name: "default".into(), params: Vec::new() }
    }

    #[test]
    fn take_policy_only_returns_once_per_update() {
        let service = RuntimeService::new(policy(0.005));
        assert!(service.take_policy_if_updated().is_some());
        assert!(service.take_policy_if_updated().is_none());
        service.set_policy("frequency_balancer".into(), 0.01, "p".into(), vec![1.0]);
        let updated = service.take_policy_if_updated().unwrap();
        assert_eq!(updated.agent_name, "frequency_balancer");
    }

    #[test]
    fn zero_period_is_a_stop_request() {
        assert!(policy(0.0).is_stop_request());
        assert!(!policy(0.005).is_stop_request());
    }

    #[test]
    fn get_report_swaps_in_a_fresh_accumulator() {
        let service = RuntimeService::new(policy(0.005));
        service.observe_metric("cpu-energy", 1.0);
        service.observe_metric("cpu-energy", 2.0);
        let report = service.get_report();
        assert_eq!(report.metrics["cpu-energy"].count(), 2);
        let fresh = service.get_report();
        assert!(fresh.metrics.is_empty());
    }

    #[test]
    fn child_hosts_are_deduplicated_and_removable() {
        let service = RuntimeService::new(policy(0.005));
        service.add_child_host("node1".into());
        service.add_child_host("node1".into());
        assert_eq!(service.child_hosts(), vec!["node1".to_string()]);
        service.remove_child_host("node1");
        assert!(service.child_hosts().is_empty());
    }
}
