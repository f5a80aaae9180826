use thiserror::Error;

/// Construction and configuration failures.
///
/// Admission rejection and empty selections are normal outcomes and are never
/// reported through this type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GosError {
    #[error("a port set needs at least one port")]
    InvalidPortCount,
    #[error("port index {index} out of range for a set of {len} ports")]
    PortIndexOutOfRange { index: usize, len: usize },
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(String),
    #[error("priority level {0} is outside 0..=10")]
    InvalidPriority(u8),
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GosError>;
