//! Event-buffering logger registry, trace writer and report accumulator.
//!
//! `Registry`/`Logger<T>` are the data path: agents hand rows to a named,
//! buffered sink that flushes on capacity or on an explicit `flush()`. This
//! is distinct from [`init_tracing`], which wires up ordinary operator-facing
//! diagnostics (warnings, platform I/O failures, tick overruns) through the
//! `tracing` ecosystem.

pub mod report;
pub mod trace;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A map from names to typed, buffered loggers.
pub struct Registry {
    time: Instant,
    map: HashMap<String, Box<dyn Any>>,
}

impl Registry {
    /// Creates a new logger registry, with `time` as the common zero point.
    pub fn new(time: Instant) -> Self {
        Registry { time, map: HashMap::new() }
    }

    /// Binds a log name to an action invoked on full (or explicitly flushed)
    /// batches of log events.
    ///
    /// Returns any logger previously bound to `name`, boxed and type-erased.
    /// Existing [`Logger`] handles keep writing to their old destination;
    /// only newly-created loggers see the new one.
    pub fn insert<T: 'static>(
        &mut self,
        name: impl Into<String>,
        action: Box<dyn Fn(&Duration, &[(Duration, T)])>,
    ) -> Option<Box<dyn Any>> {
        let logger = Logger::<T>::new(self.time, action);
        self.map.insert(name.into(), Box::new(logger))
    }

    /// Removes a bound logger, signaling end-of-stream to its action.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.map.remove(name)
    }

    /// Retrieves a shared handle to a previously-inserted logger.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map.get(name).and_then(|entry| entry.downcast_ref::<Logger<T>>()).cloned()
    }
}

/// A buffering logger shared by clone among every caller bound to one name.
pub struct Logger<T> {
    time: Instant,
    action: Rc<dyn Fn(&Duration, &[(Duration, T)])>,
    buffer: Rc<RefCell<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger { time: self.time, action: Rc::clone(&self.action), buffer: Rc::clone(&self.buffer) }
    }
}

impl<T> Logger<T> {
    /// Allocates a new shareable logger bound to a write destination.
    pub fn new(time: Instant, action: Box<dyn Fn(&Duration, &[(Duration, T)])>) -> Self {
        Logger { time, action: Rc::from(action), buffer: Rc::new(RefCell::new(Vec::with_capacity(1024))) }
    }

    /// Logs an event, timestamped at the moment of the call but possibly
    /// delivered later, once the buffer fills or `flush` is called.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes logged events and communicates the new low-water timestamp.
    pub fn flush(&self) {
        let mut buffer = self.buffer.borrow_mut();
        (self.action)(&self.time.elapsed(), &buffer[..]);
        buffer.clear();
    }
}

/// Installs a `tracing-subscriber` global default for operational logging.
///
/// Controlled by the `POWERD_LOG` environment variable (`tracing_subscriber`
/// `EnvFilter` syntax, e.g. `powerd=debug,powerd_io=warn`); defaults to `info`.
/// Idempotent to call more than once per process is not guaranteed: callers
/// (only `powerd`'s `main`) must call it exactly once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("POWERD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
