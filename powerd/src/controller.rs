//! The controller loop (§4.8): the only component that owns wall time.
//! Each tick runs five phases in a fixed order — down, platform, up, trace
//! and report, wait — and a tick that raises a non-`platform` error aborts
//! the run after restoring saved controls.

use crate::error::{ControlError, Result};
use crate::runtime_service::RuntimeService;
use crate::waiter::Waiter;
use powerd_agent::Agent;
use powerd_app::record::RecordEvent;
use powerd_app::{RecordFilter, RecordLog};
use powerd_io::PlatformIo;
use powerd_logging::report::Report;
use powerd_logging::trace::{TraceSchema, TraceWriter};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Runs one leaf agent at level 0 with no tree above it — the common
/// single-node deployment. A multi-level deployment runs one
/// `ControllerLoop` per node and wires `powerd_tree::TreeComm` between
/// nodes; that wiring is the host binary's responsibility, not this loop's.
pub struct ControllerLoop<W: Write + 'static> {
    platform_io: PlatformIo,
    agent: Box<dyn Agent>,
    sample_len: usize,
    waiter: Waiter,
    trace: Option<TraceWriter<W>>,
    report: Report,
    service: Arc<RuntimeService>,
    record_log: Option<Arc<RecordLog>>,
    record_filters: Vec<Box<dyn RecordFilter>>,
    shutdown: Arc<AtomicBool>,
    start: Instant,
    current_policy: Vec<f64>,
    tick_count: u64,
    records_drained: u64,
    epoch_count: u64,
}

impl<W: Write + 'static> ControllerLoop<W> {
    pub fn new(
        mut platform_io: PlatformIo,
        mut agent: Box<dyn Agent>,
        sample_len: usize,
        initial_policy: Vec<f64>,
        period_seconds: f64,
        service: Arc<RuntimeService>,
        record_log: Option<Arc<RecordLog>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        agent.init(0, 0, true, &mut platform_io)?;
        platform_io.save_control()?;
        Ok(ControllerLoop {
            platform_io,
            agent,
            sample_len,
            waiter: Waiter::new(period_seconds),
            trace: None,
            report: Report::new(),
            service,
            record_log,
            record_filters: Vec::new(),
            shutdown,
            start: Instant::now(),
            current_policy: initial_policy,
            tick_count: 0,
            records_drained: 0,
            epoch_count: 0,
        })
    }

    /// Attaches a trace sink. The header row (`time` plus the leaf agent's
    /// columns) is written lazily on the first tick.
    pub fn with_trace(mut self, sink: W) -> Self {
        let mut names = vec!["time".to_string()];
        names.extend(self.agent.trace_names());
        self.trace = Some(TraceWriter::new(TraceSchema::new(names), sink));
        self
    }

    /// Registers a record filter that runs, in insertion order, over every
    /// record drained from the application record log before it is
    /// interpreted (e.g. the proxy-epoch filter, which synthesizes epoch
    /// records an application never marked explicitly).
    pub fn with_record_filter(mut self, filter: Box<dyn RecordFilter>) -> Self {
        self.record_filters.push(filter);
        self
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn report_text(&self) -> String {
        self.report.render()
    }

    /// Runs ticks until the shutdown flag is set (by a `SetPolicy` with
    /// period 0, or by a fatal mid-tick error), then performs the shutdown
    /// sequence.
    pub fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.step() {
                self.report.record_error(e.kind());
                if e.is_fatal_mid_tick() {
                    self.shutdown.store(true, Ordering::SeqCst);
                    self.finish()?;
                    return Err(e);
                }
                // `invalid`/`platform`/`agent-reject`: logged and counted,
                // the loop proceeds to the next tick rather than aborting.
            }
        }
        self.finish()
    }

    /// Runs exactly one tick. Exposed separately from `run` so tests can
    /// drive a fixed number of ticks deterministically.
    pub fn step(&mut self) -> Result<()> {
        // 1. Down phase: poll the runtime service for a fresh policy.
        if let Some(pending) = self.service.take_policy_if_updated() {
            if pending.is_stop_request() {
                self.shutdown.store(true, Ordering::SeqCst);
            } else if !pending.params.is_empty() {
                self.current_policy = pending.params;
            }
        }
        if let Err(e) = self.agent.validate_policy(&mut self.current_policy) {
            // `agent-reject`: keep running the previous validated policy.
            self.report.record_error("agent-reject");
            let _ = e;
        }

        // 2. Platform phase.
        self.platform_io.read_batch()?;
        self.drain_and_process_records();
        self.agent.adjust_platform(&self.current_policy, &mut self.platform_io)?;
        if self.agent.do_write_batch() {
            self.platform_io.write_batch()?;
        }
        let mut sample = vec![f64::NAN; self.sample_len];
        self.agent.sample_platform(&self.platform_io, &mut sample)?;

        // 3. Up phase: no children at this node, so aggregation reduces to
        // a passthrough and the sample is the external sink.
        let mut aggregated = vec![0.0; self.sample_len];
        self.agent.aggregate_sample(&[], &mut aggregated);
        for (region_hash, region_name, metric, value) in self.agent.tick_metrics() {
            self.report.region_mut(region_hash, &region_name).observe(&metric, value);
            self.service.observe_metric(&metric, value);
        }

        // 4. Trace and report update.
        let elapsed = self.start.elapsed().as_secs_f64();
        if let Some(trace) = &mut self.trace {
            let mut row = vec![elapsed];
            self.agent.trace_values(&mut row);
            trace.write_row(elapsed, &row).map_err(|e| ControlError::Platform(e.to_string()))?;
        }

        // 5. Wait.
        self.agent.wait();
        self.waiter.wait();

        self.tick_count += 1;
        Ok(())
    }

    /// Drains the application record log, runs every record through the
    /// registered filters in order, and interprets the result: epoch counts
    /// feed the host report, and a shutdown request from any process sets
    /// the shared shutdown flag, per §4.8's cancellation path.
    fn drain_and_process_records(&mut self) {
        let Some(log) = &self.record_log else { return };
        let drained = log.drain();
        self.records_drained += drained.len() as u64;

        for record in drained {
            let mut records = vec![record];
            for filter in self.record_filters.iter_mut() {
                records = records.into_iter().flat_map(|r| filter.filter(r)).collect();
            }
            for record in records {
                match RecordEvent::from_record(record) {
                    Some(RecordEvent::EpochCount { count, .. }) => self.epoch_count = self.epoch_count.max(count),
                    Some(RecordEvent::ShutdownRequest { .. }) => self.shutdown.store(true, Ordering::SeqCst),
                    _ => {}
                }
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.drain_and_process_records();
        self.report.set_host_fields(vec![
            ("ticks".to_string(), self.tick_count.to_string()),
            ("records_drained".to_string(), self.records_drained.to_string()),
            ("epoch_count".to_string(), self.epoch_count.to_string()),
        ]);
        self.platform_io.restore_control()?;
        if let Some(trace) = &mut self.trace {
            trace.flush().map_err(|e| ControlError::Platform(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_service::PendingPolicy;
    use powerd_agent::MonitorAgent;
    use powerd_io::{ConstConfigIoGroup, Domain, PlatformTopo};

    fn io_with_constants() -> PlatformIo {
        let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
        let mut provider = ConstConfigIoGroup::new();
        provider.add_signal("cpu-energy", Domain::Board, 0, 100.0);
        provider.add_signal("gpu-energy", Domain::Board, 0, 50.0);
        io.add_provider(Box::new(provider));
        io
    }

    #[test]
    fn three_ticks_match_scenario_one_report() {
        let io = io_with_constants();
        let agent = Box::new(MonitorAgent::new(vec!["cpu-energy".into(), "gpu-energy".into()], Domain::Board));
        let service = Arc::new(RuntimeService::new(PendingPolicy {
            agent_name: "monitor".into(),
            period: 0.005,
            profile_name: "default".into(),
            params: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut controller = ControllerLoop::new(io, agent, 2, Vec::new(), 0.0, service, None, shutdown).unwrap().with_trace(Vec::new());

        for _ in 0..3 {
            controller.step().unwrap();
        }

        let text = controller.report_text();
        assert!(text.contains("cpu-energy: count=3, first=100, last=100, min=100, max=100, mean=100, std=0"));
    }

    #[test]
    fn zero_period_set_policy_stops_the_loop() {
        let io = io_with_constants();
        let agent = Box::new(MonitorAgent::new(vec!["cpu-energy".into()], Domain::Board));
        let service = Arc::new(RuntimeService::new(PendingPolicy {
            agent_name: "monitor".into(),
            period: 0.0,
            profile_name: "default".into(),
            params: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut controller = ControllerLoop::new(io, agent, 1, Vec::new(), 0.0, Arc::clone(&service), None, Arc::clone(&shutdown)).unwrap();
        controller.run().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
        assert_eq!(controller.tick_count(), 1);
    }

    #[test]
    fn a_shutdown_record_from_the_application_stops_the_loop() {
        let io = io_with_constants();
        let agent = Box::new(MonitorAgent::new(vec!["cpu-energy".into()], Domain::Board));
        let service = Arc::new(RuntimeService::new(PendingPolicy {
            agent_name: "monitor".into(),
            period: 0.005,
            profile_name: "default".into(),
            params: Vec::new(),
        }));
        let record_log = Arc::new(RecordLog::new(16).unwrap());
        record_log.request_shutdown(1, 0.0);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut controller =
            ControllerLoop::new(io, agent, 1, Vec::new(), 0.0, service, Some(Arc::clone(&record_log)), Arc::clone(&shutdown)).unwrap();
        controller.run().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn a_record_filter_runs_over_drained_records_and_feeds_the_epoch_count() {
        use powerd_app::record::region_id;
        use powerd_app::ProxyEpochRecordFilter;

        let io = io_with_constants();
        let agent = Box::new(MonitorAgent::new(vec!["cpu-energy".into()], Domain::Board));
        let service = Arc::new(RuntimeService::new(PendingPolicy {
            agent_name: "monitor".into(),
            period: 0.005,
            profile_name: "default".into(),
            params: Vec::new(),
        }));
        let record_log = Arc::new(RecordLog::new(16).unwrap());
        let region = region_id(0, 0xabc);
        for i in 0..4 {
            record_log.enter_region(1, i as f64, region);
            record_log.exit_region(1, i as f64 + 0.1, region);
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut controller = ControllerLoop::new(io, agent, 1, Vec::new(), 0.0, service, Some(Arc::clone(&record_log)), shutdown)
            .unwrap()
            .with_record_filter(Box::new(ProxyEpochRecordFilter::new(0xabc, 2, 0).unwrap()));

        for _ in 0..4 {
            controller.step().unwrap();
        }

        assert_eq!(controller.epoch_count, 2, "expected two synthesized epochs from four entries at calls_per_epoch=2");
    }
}
