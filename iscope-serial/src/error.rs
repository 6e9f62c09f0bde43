//! Common error types for iscope-serial.
//!
//! Open failures map one-to-one onto the negative codes the plot front end
//! tests for (`code() < 0`). Transfer failures are reported as real errors
//! rather than being folded into a "requested length" return.

use std::path::PathBuf;

use rustix::io::Errno;
use thiserror::Error;

/// Main error type for serial transport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Device path could not be opened (not present, permission denied)
    #[error("failed to open {path}: {source}")]
    OpenFailed { path: PathBuf, source: Errno },

    /// Device is already held exclusively, or exclusivity could not be requested
    #[error("failed to lock {path} for exclusive access: {source}")]
    ExclusiveLockFailed { path: PathBuf, source: Errno },

    /// Descriptor could not be switched from non-blocking to blocking mode
    #[error("failed to switch {path} to blocking mode: {source}")]
    ModeSwitchFailed { path: PathBuf, source: Errno },

    /// Current line-discipline attributes could not be read
    #[error("failed to read line attributes of {path}: {source}")]
    AttributeReadFailed { path: PathBuf, source: Errno },

    /// New line-discipline attributes could not be applied
    #[error("failed to apply line attributes to {path}: {source}")]
    AttributeApplyFailed { path: PathBuf, source: Errno },

    /// Baud rate the driver cannot be asked for
    #[error("invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    /// No byte arrived within the per-byte read timeout
    #[error("timed out after {transferred} of {requested} bytes")]
    Timeout {
        transferred: usize,
        requested: usize,
    },

    /// The device reported end-of-file or hang-up
    #[error("device disconnected after {transferred} of {requested} bytes")]
    Disconnected {
        transferred: usize,
        requested: usize,
    },

    /// Any other transfer failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Negative status code for callers that only check `code < 0`.
    pub fn code(&self) -> i32 {
        match self {
            Error::OpenFailed { .. } => -2,
            Error::ExclusiveLockFailed { .. } => -3,
            Error::ModeSwitchFailed { .. } => -4,
            Error::AttributeReadFailed { .. } => -5,
            Error::AttributeApplyFailed { .. } => -6,
            _ => -1,
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::Io(errno.into())
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
