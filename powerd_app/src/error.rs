use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("ordering: {0}")]
    Ordering(String),
}

pub type Result<T> = std::result::Result<T, Error>;
