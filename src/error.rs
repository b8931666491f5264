//! Domain error types.
//!
//! Most I/O and config failures just propagate as `anyhow::Error`. These
//! variants exist where a caller needs to branch on *what* went wrong
//! (filter parsing, record persistence) rather than just log-and-stop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter missing components: {0}")]
    MissingComponents(String),
    #[error("filter field unknown: {0}")]
    UnknownField(String),
    #[error("filter operator invalid: {0}")]
    InvalidOperator(String),
    #[error("filter value is not a valid {0}: {1}")]
    BadValue(&'static str, String),
    #[error("string kind only supports eq/neq operators")]
    InvalidStringOp,
}

#[derive(Debug, Error)]
pub enum RecordWriteError {
    #[error("failed to create partition directory {0}: {1}")]
    Partition(String, std::io::Error),
    #[error("failed to write record {0}: {1}")]
    Write(String, std::io::Error),
}
