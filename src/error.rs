//! Error types for the parameter-server trainer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MfError>;

#[derive(Error, Debug)]
pub enum MfError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed sample at line {line}: {reason}")]
    MalformedSample { line: u64, reason: String },

    #[error("{0} used before initialization")]
    Uninitialized(&'static str),
}
