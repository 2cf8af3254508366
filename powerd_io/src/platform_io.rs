//! PlatformIO: dispatches signal/control requests to registered [`IOGroup`]
//! providers and executes one batched read, one batched write per tick.

use crate::domain::{Domain, PlatformTopo};
use crate::error::{Error, Result};
use crate::signal::{DerivativeSignal, SignalBehavior};
use std::collections::HashMap;

/// A provider plugin exposing a named set of signals and/or controls.
///
/// A `read_batch`/`write_batch` pair is provided so a single MSR/sysfs
/// transaction can cover every signal or control this group was asked for;
/// `read_raw`/`write_raw` are the out-of-band single-shot paths that must
/// not disturb batched state.
pub trait IOGroup {
    fn name(&self) -> &str;
    /// Enables downcasting to a concrete provider type, primarily so tests
    /// can mutate a provider already registered with a `PlatformIo`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
    fn is_valid_signal(&self, name: &str) -> bool;
    fn is_valid_control(&self, name: &str) -> bool;
    fn signal_domain_type(&self, name: &str) -> Option<Domain>;
    fn control_domain_type(&self, name: &str) -> Option<Domain>;
    fn signal_behavior(&self, name: &str) -> SignalBehavior {
        let _ = name;
        SignalBehavior::Variable
    }

    /// Registers interest in a raw signal so it is covered by `read_batch`.
    fn push_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<()>;
    fn push_control(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<()>;

    /// Executes one aggregated read covering every pushed signal.
    fn read_batch(&mut self) -> Result<()>;
    /// Executes one aggregated write covering every queued control value.
    fn write_batch(&mut self) -> Result<()>;

    /// Most recent batched value for a pushed signal.
    fn sample(&self, name: &str, domain: Domain, domain_idx: usize) -> Result<f64>;
    /// Queues a control value for the next `write_batch`.
    fn adjust(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) -> Result<()>;

    /// Out-of-band single-shot read; must not disturb batched state.
    fn read_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<f64>;
    /// Out-of-band single-shot write; must not disturb batched state.
    fn write_control(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) -> Result<()>;

    /// Snapshots current control values so they can be restored at teardown.
    fn save_control(&mut self) -> Result<()> {
        Ok(())
    }
    fn restore_control(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A stable integer returned by `push_signal`/`push_control`, used for
/// `sample`/`adjust` without re-resolving the provider each tick.
pub type Handle = usize;

#[derive(Clone)]
struct SignalKey {
    name: String,
    domain: Domain,
    domain_idx: usize,
    provider: usize,
}

#[derive(Clone)]
struct ControlKey {
    name: String,
    domain: Domain,
    domain_idx: usize,
    provider: usize,
}

/// A derived signal registered against two upstream raw signal handles.
struct Derived {
    time_handle: Handle,
    value_handle: Handle,
    signal: DerivativeSignal,
}

/// The single entry point through which agents request scalar signals and
/// emit scalar controls.
pub struct PlatformIo {
    topo: PlatformTopo,
    providers: Vec<Box<dyn IOGroup>>,
    signals: Vec<SignalKey>,
    signal_index: HashMap<(String, Domain, usize), Handle>,
    controls: Vec<ControlKey>,
    control_index: HashMap<(String, Domain, usize), Handle>,
    derived: Vec<Derived>,
    cache: Vec<f64>,
    has_read: bool,
}

impl PlatformIo {
    /// `topo` is consulted by `push_signal`/`push_control` to reject a
    /// `domain_idx` out of range for the node's actual hardware shape.
    pub fn new(topo: PlatformTopo) -> Self {
        PlatformIo {
            topo,
            providers: Vec::new(),
            signals: Vec::new(),
            signal_index: HashMap::new(),
            controls: Vec::new(),
            control_index: HashMap::new(),
            derived: Vec::new(),
            cache: Vec::new(),
            has_read: false,
        }
    }

    pub fn add_provider(&mut self, provider: Box<dyn IOGroup>) {
        self.providers.push(provider);
    }

    fn find_signal_provider(&self, name: &str) -> Result<usize> {
        self.providers
            .iter()
            .position(|p| p.is_valid_signal(name))
            .ok_or_else(|| Error::NotSupported(format!("no provider for signal {name}")))
    }

    fn find_control_provider(&self, name: &str) -> Result<usize> {
        self.providers
            .iter()
            .position(|p| p.is_valid_control(name))
            .ok_or_else(|| Error::NotSupported(format!("no provider for control {name}")))
    }

    /// Registers interest in a raw signal; idempotent per
    /// `(name, domain, domain_idx)`.
    pub fn push_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<Handle> {
        let key = (name.to_string(), domain, domain_idx);
        if let Some(&h) = self.signal_index.get(&key) {
            return Ok(h);
        }
        if domain_idx >= self.topo.num_domain(domain) {
            tracing::warn!(signal = name, ?domain, domain_idx, "rejected push_signal: domain index out of range");
            return Err(Error::Invalid(format!(
                "domain index {domain_idx} out of range for {:?} ({} instances)",
                domain,
                self.topo.num_domain(domain)
            )));
        }
        let provider = self.find_signal_provider(name)?;
        let declared = self.providers[provider]
            .signal_domain_type(name)
            .ok_or_else(|| Error::NotSupported(name.to_string()))?;
        if declared != domain {
            return Err(Error::Invalid(format!(
                "signal {name} declared at domain {:?}, pushed at {:?}",
                declared, domain
            )));
        }
        self.providers[provider].push_signal(name, domain, domain_idx)?;
        let handle = self.signals.len();
        tracing::debug!(signal = name, ?domain, domain_idx, handle, provider = self.providers[provider].name(), "pushed signal");
        self.signals.push(SignalKey { name: name.to_string(), domain, domain_idx, provider });
        self.signal_index.insert(key, handle);
        self.cache.push(f64::NAN);
        Ok(handle)
    }

    /// Registers a derivative signal over two already-pushed raw signals
    /// (conventionally a monotone time signal and a value signal). Returns
    /// a handle usable with `sample` like any other signal.
    pub fn push_derivative(&mut self, time_handle: Handle, value_handle: Handle, history_len: usize) -> Handle {
        let handle = self.signals.len();
        // Derived signals do not belong to a provider; record a sentinel
        // provider index that `read_batch` skips when doing raw reads.
        self.signals.push(SignalKey {
            name: format!("derivative({time_handle},{value_handle})"),
            domain: self.signals[value_handle].domain,
            domain_idx: self.signals[value_handle].domain_idx,
            provider: usize::MAX,
        });
        self.cache.push(f64::NAN);
        self.derived.push(Derived { time_handle, value_handle, signal: DerivativeSignal::new(history_len) });
        handle
    }

    pub fn push_control(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<Handle> {
        let key = (name.to_string(), domain, domain_idx);
        if let Some(&h) = self.control_index.get(&key) {
            return Ok(h);
        }
        if domain_idx >= self.topo.num_domain(domain) {
            tracing::warn!(control = name, ?domain, domain_idx, "rejected push_control: domain index out of range");
            return Err(Error::Invalid(format!(
                "domain index {domain_idx} out of range for {:?} ({} instances)",
                domain,
                self.topo.num_domain(domain)
            )));
        }
        let provider = self.find_control_provider(name)?;
        let declared = self.providers[provider]
            .control_domain_type(name)
            .ok_or_else(|| Error::NotSupported(name.to_string()))?;
        if declared != domain {
            return Err(Error::Invalid(format!(
                "control {name} declared at domain {:?}, pushed at {:?}",
                declared, domain
            )));
        }
        self.providers[provider].push_control(name, domain, domain_idx)?;
        let handle = self.controls.len();
        self.controls.push(ControlKey { name: name.to_string(), domain, domain_idx, provider });
        self.control_index.insert(key, handle);
        Ok(handle)
    }

    /// Executes one aggregated read per provider, then evaluates derived
    /// signals in dependency order. Derived signals never trigger raw I/O.
    pub fn read_batch(&mut self) -> Result<()> {
        for provider in self.providers.iter_mut() {
            provider.read_batch()?;
        }
        for (handle, key) in self.signals.iter().enumerate() {
            if key.provider == usize::MAX {
                continue;
            }
            self.cache[handle] = self.providers[key.provider].sample(&key.name, key.domain, key.domain_idx)?;
        }
        let raw_cache = self.cache.clone();
        for derived in self.derived.iter_mut() {
            let t = raw_cache[derived.time_handle];
            let v = raw_cache[derived.value_handle];
            if !t.is_nan() && !v.is_nan() {
                derived.signal.update(t, v);
            }
        }
        let mut derived_idx = 0;
        for (handle, key) in self.signals.iter().enumerate() {
            if key.provider == usize::MAX {
                self.cache[handle] = self.derived[derived_idx].signal.sample();
                derived_idx += 1;
            }
        }
        self.has_read = true;
        Ok(())
    }

    pub fn write_batch(&mut self) -> Result<()> {
        let providers: std::collections::HashSet<usize> = self.controls.iter().map(|c| c.provider).collect();
        for p in providers {
            self.providers[p].write_batch()?;
        }
        Ok(())
    }

    /// Returns the value captured at the most recent `read_batch`.
    pub fn sample(&self, handle: Handle) -> Result<f64> {
        if !self.has_read {
            return Err(Error::Ordering("sample() called before any read_batch()".into()));
        }
        self.cache.get(handle).copied().ok_or_else(|| Error::Invalid(format!("unknown signal handle {handle}")))
    }

    /// Queues a control write for the next `write_batch`.
    pub fn adjust(&mut self, handle: Handle, value: f64) -> Result<()> {
        let key = self.controls.get(handle).ok_or_else(|| Error::Invalid(format!("unknown control handle {handle}")))?.clone();
        self.providers[key.provider].adjust(&key.name, key.domain, key.domain_idx, value)
    }

    /// Out-of-band single-shot read; must not disturb batched state.
    pub fn read_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<f64> {
        let provider = self.find_signal_provider(name)?;
        self.providers[provider].read_signal(name, domain, domain_idx)
    }

    /// Out-of-band single-shot write; must not disturb batched state.
    pub fn write_control(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) -> Result<()> {
        let provider = self.find_control_provider(name)?;
        self.providers[provider].write_control(name, domain, domain_idx, value)
    }

    pub fn save_control(&mut self) -> Result<()> {
        for provider in self.providers.iter_mut() {
            provider.save_control()?;
        }
        Ok(())
    }

    pub fn restore_control(&mut self) -> Result<()> {
        tracing::info!(providers = self.providers.len(), "restoring saved controls");
        for provider in self.providers.iter_mut() {
            provider.restore_control()?;
        }
        Ok(())
    }
}

/// A provider backing signals and controls with fixed constant values,
/// configured at construction. Used for tests and as a stand-in for
/// providers (MSR, sysfs, service-proxy, accelerator-runtime) this crate
/// does not implement against real hardware.
#[derive(Default)]
pub struct ConstConfigIoGroup {
    signal_domains: HashMap<String, Domain>,
    control_domains: HashMap<String, Domain>,
    values: HashMap<(String, usize), f64>,
    pushed_signals: Vec<(String, usize)>,
    pushed_controls: Vec<(String, usize)>,
    saved: HashMap<(String, usize), f64>,
}

impl ConstConfigIoGroup {
    pub fn new() -> Self {
        ConstConfigIoGroup::default()
    }

    pub fn add_signal(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) {
        self.signal_domains.insert(name.to_string(), domain);
        self.values.insert((name.to_string(), domain_idx), value);
    }

    pub fn add_control(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) {
        self.control_domains.insert(name.to_string(), domain);
        self.values.insert((name.to_string(), domain_idx), value);
    }

    /// Overwrites a previously-added signal's value (simulating the next
    /// tick's platform reading).
    pub fn set_value(&mut self, name: &str, domain_idx: usize, value: f64) {
        self.values.insert((name.to_string(), domain_idx), value);
    }
}

impl IOGroup for ConstConfigIoGroup {
    fn name(&self) -> &str {
        "CONST_CONFIG"
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn is_valid_signal(&self, name: &str) -> bool {
        self.signal_domains.contains_key(name)
    }

    fn is_valid_control(&self, name: &str) -> bool {
        self.control_domains.contains_key(name)
    }

    fn signal_domain_type(&self, name: &str) -> Option<Domain> {
        self.signal_domains.get(name).copied()
    }

    fn control_domain_type(&self, name: &str) -> Option<Domain> {
        self.control_domains.get(name).copied()
    }

    fn signal_behavior(&self, _name: &str) -> SignalBehavior {
        SignalBehavior::Constant
    }

    fn push_signal(&mut self, name: &str, _domain: Domain, domain_idx: usize) -> Result<()> {
        self.pushed_signals.push((name.to_string(), domain_idx));
        Ok(())
    }

    fn push_control(&mut self, name: &str, _domain: Domain, domain_idx: usize) -> Result<()> {
        self.pushed_controls.push((name.to_string(), domain_idx));
        Ok(())
    }

    fn read_batch(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_batch(&mut self) -> Result<()> {
        Ok(())
    }

    fn sample(&self, name: &str, _domain: Domain, domain_idx: usize) -> Result<f64> {
        self.values
            .get(&(name.to_string(), domain_idx))
            .copied()
            .ok_or_else(|| Error::Invalid(format!("{name}[{domain_idx}] not pushed")))
    }

    fn adjust(&mut self, name: &str, _domain: Domain, domain_idx: usize, value: f64) -> Result<()> {
        self.values.insert((name.to_string(), domain_idx), value);
        Ok(())
    }

    fn read_signal(&mut self, name: &str, domain: Domain, domain_idx: usize) -> Result<f64> {
        self.sample(name, domain, domain_idx)
    }

    fn write_control(&mut self, name: &str, domain: Domain, domain_idx: usize, value: f64) -> Result<()> {
        self.adjust(name, domain, domain_idx, value)
    }

    fn save_control(&mut self) -> Result<()> {
        self.saved = self.values.clone();
        Ok(())
    }

    fn restore_control(&mut self) -> Result<()> {
        for (k, v) in self.saved.clone() {
            self.values.insert(k, v);
        }
        Ok(())
    }
}
