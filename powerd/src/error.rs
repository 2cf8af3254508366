//! Unified error type for the controller binary: every sub-crate's error
//! kind folds into the §7 taxonomy (`invalid`, `not-supported`, `ordering`,
//! `level-range`, `platform`, `agent-reject`).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("ordering: {0}")]
    Ordering(String),
    #[error("level out of range: {0}")]
    LevelRange(usize),
    #[error("platform i/o failure: {0}")]
    Platform(String),
    #[error("policy rejected: {0}")]
    AgentReject(String),
}

impl ControlError {
    /// The error kind name as used in the report's `errors` map (§7).
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Invalid(_) => "invalid",
            ControlError::NotSupported(_) => "not-supported",
            ControlError::Ordering(_) => "ordering",
            ControlError::LevelRange(_) => "level-range",
            ControlError::Platform(_) => "platform",
            ControlError::AgentReject(_) => "agent-reject",
        }
    }

    /// Whether this error kind is fatal mid-tick (abort the run) rather
    /// than swallowed-and-counted (`platform`) or policy-rejecting
    /// (`agent-reject`, never aborts).
    pub fn is_fatal_mid_tick(&self) -> bool {
        matches!(self, ControlError::Ordering(_) | ControlError::LevelRange(_))
    }
}

impl From<powerd_io::Error> for ControlError {
    fn from(e: powerd_io::Error) -> Self {
        match e {
            powerd_io::Error::Invalid(m) => ControlError::Invalid(m),
            powerd_io::Error::NotSupported(m) => ControlError::NotSupported(m),
            powerd_io::Error::Ordering(m) => ControlError::Ordering(m),
            powerd_io::Error::Platform(m) => ControlError::Platform(m),
        }
    }
}

impl From<powerd_tree::Error> for ControlError {
    fn from(e: powerd_tree::Error) -> Self {
        match e {
            powerd_tree::Error::Invalid(m) => ControlError::Invalid(m),
            powerd_tree::Error::LevelRange(l) => ControlError::LevelRange(l),
            powerd_tree::Error::Ordering(m) => ControlError::Ordering(m),
        }
    }
}

impl From<powerd_app::Error> for ControlError {
    fn from(e: powerd_app::Error) -> Self {
        match e {
            powerd_app::Error::Invalid(m) => ControlError::Invalid(m),
            powerd_app::Error::Ordering(m) => ControlError::Ordering(m),
        }
    }
}

impl From<powerd_agent::Error> for ControlError {
    fn from(e: powerd_agent::Error) -> Self {
        match e {
            powerd_agent::Error::Invalid(m) => ControlError::Invalid(m),
            powerd_agent::Error::AgentReject(m) => ControlError::AgentReject(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
