use clap::Parser;
use powerd::cli::Cli;
use powerd::config::Config;
use powerd::controller::ControllerLoop;
use powerd::error::{ControlError, Result};
use powerd::runtime_service::{PendingPolicy, RuntimeService};
use powerd_agent::{Agent, CpuActivityGovernorAgent, MonitorAgent, PowerGovernorAgent};
use powerd_io::{ConstConfigIoGroup, Domain, PlatformIo, PlatformTopo};
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Builds the leaf agent and platform I/O stack named by `config.agent`.
/// This is the "explicit registry populated at build time" in place of a
/// runtime plugin loader: new agents are wired in here, not discovered.
///
/// The demo `PlatformIo` here is backed by `ConstConfigIoGroup`, a fixed
/// stand-in signal source; a production deployment registers real MSR and
/// sysfs `IOGroup` providers instead.
fn build_agent(config: &Config) -> Result<(Box<dyn Agent>, usize, PlatformIo)> {
    match config.agent.as_str() {
        "monitor" => {
            let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
            let mut provider = ConstConfigIoGroup::new();
            provider.add_signal("cpu-energy", Domain::Board, 0, 0.0);
            provider.add_signal("gpu-energy", Domain::Board, 0, 0.0);
            io.add_provider(Box::new(provider));
            let names = vec!["cpu-energy".to_string(), "gpu-energy".to_string()];
            let sample_len = names.len();
            Ok((Box::new(MonitorAgent::new(names, Domain::Board)), sample_len, io))
        }
        "power_governor" => {
            let mut io = PlatformIo::new(PlatformTopo::uniform(1, 1, 1));
            let mut provider = ConstConfigIoGroup::new();
            provider.add_signal("PACKAGE_POWER", Domain::Package, 0, 0.0);
            provider.add_control("PACKAGE_POWER_LIMIT", Domain::Package, 0, 0.0);
            io.add_provider(Box::new(provider));
            let min = config.params.first().copied().unwrap_or(50.0);
            let max = config.params.get(1).copied().unwrap_or(200.0);
            let window = config.params.get(2).copied().unwrap_or(5.0);
            Ok((Box::new(PowerGovernorAgent::new(min, max, window)), 1, io))
        }
        "cpu_activity_governor" => {
            let num_core = config.params.first().copied().unwrap_or(1.0).max(1.0) as usize;
            let low_freq = config.params.get(1).copied().unwrap_or(1.0);
            let high_freq = config.params.get(2).copied().unwrap_or(3.0);
            let mut io = PlatformIo::new(PlatformTopo::uniform(1, num_core, 1));
            let mut provider = ConstConfigIoGroup::new();
            for core in 0..num_core {
                provider.add_signal("CPU_ACTIVITY", Domain::Core, core, 0.0);
            }
            io.add_provider(Box::new(provider));
            Ok((Box::new(CpuActivityGovernorAgent::new(num_core, low_freq, high_freq)), num_core, io))
        }
        other => Err(ControlError::Invalid(format!("unregistered agent: {other}"))),
    }
}

fn main() -> Result<()> {
    powerd_logging::init_tracing();
    let cli = Cli::parse();

    let config = match cli.config_path() {
        Some(path) => Config::load(&path)?,
        None => return Err(ControlError::Invalid("no configuration supplied: pass --config or set POWERD_CONFIG".to_string())),
    };
    let period = cli.period.unwrap_or(config.period);
    let trace_path = cli.trace_path.or_else(|| config.trace_path.clone().map(Into::into));
    let report_path = cli.report_path.or_else(|| config.report_path.clone().map(Into::into));

    let (agent, sample_len, platform_io) = build_agent(&config)?;
    let service = Arc::new(RuntimeService::new(PendingPolicy {
        agent_name: config.agent.clone(),
        period,
        profile_name: config.profile_name.clone(),
        params: config.params.clone(),
    }));
    let shutdown = Arc::new(AtomicBool::new(false));

    tracing::info!(agent = %config.agent, period, "starting controller loop");

    let report_text = if let Some(path) = trace_path {
        let sink = BufWriter::new(File::create(&path).map_err(|e| ControlError::Invalid(format!("cannot create trace file {}: {e}", path.display())))?);
        let mut controller = ControllerLoop::new(platform_io, agent, sample_len, config.params.clone(), period, service, None, shutdown)?.with_trace(sink);
        controller.run()?;
        controller.report_text()
    } else {
        let mut controller = ControllerLoop::new(platform_io, agent, sample_len, config.params.clone(), period, service, None, shutdown)?.with_trace(std::io::sink());
        controller.run()?;
        controller.report_text()
    };

    match report_path {
        Some(path) => std::fs::write(&path, report_text).map_err(|e| ControlError::Invalid(format!("cannot write report file {}: {e}", path.display())))?,
        None => print!("{report_text}"),
    }

    Ok(())
}
