//! Runtime control core: the controller loop, remote policy/report service,
//! configuration loading, and the unified error type. `main.rs` is a thin
//! binary wiring these together with an explicit agent registry.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod runtime_service;
pub mod waiter;

pub use config::Config;
pub use controller::ControllerLoop;
pub use error::{ControlError, Result};
pub use runtime_service::{PendingPolicy, RuntimeService};
pub use waiter::Waiter;
