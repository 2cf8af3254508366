use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("policy rejected: {0}")]
    AgentReject(String),
}

impl From<powerd_io::Error> for Error {
    fn from(e: powerd_io::Error) -> Self {
        Error::Invalid(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
