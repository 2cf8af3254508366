//! Error taxonomy shared by every signal/control operation in this crate.
//!
//! Mirrors the kinds the controller branches on: `Invalid` and
//! `NotSupported` can occur at init or mid-tick with different fatality
//! (the caller, not this crate, decides); `Ordering` and `Platform` are
//! defined here because they originate from PlatformIO/governor state.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("ordering: {0}")]
    Ordering(String),
    #[error("platform i/o failure: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, Error>;
