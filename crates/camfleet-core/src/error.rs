//! Error types for camfleet

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::PropertyCode;

/// Errors reported by the camera driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver error 0x{0:04x}")]
    Code(u32),

    #[error("operation not supported by this driver")]
    Unsupported,

    #[error("unknown device handle {0}")]
    UnknownHandle(u64),

    #[error("device not connected")]
    NotConnected,

    #[error("property {0:?} not reported by device")]
    PropertyUnavailable(PropertyCode),

    #[error("no matching device")]
    NoDevice,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

/// Completion signal failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("signal abandoned before resolution")]
    Abandoned,
}

/// Opening a device handle failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("open rejected: {0}")]
    Rejected(#[from] DriverError),

    #[error("device reported error 0x{0:04x} while connecting")]
    Failed(u32),

    #[error("device disconnected while connecting (0x{0:04x})")]
    Dropped(u32),

    #[error("connect wait failed: {0}")]
    Signal(#[from] SignalError),

    #[error("{identity}: giving up after {attempts} attempt(s)")]
    Exhausted { identity: String, attempts: u32 },
}

/// Bulk transfer failures. Per-file variants are counted, not fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("cannot prepare download directory {path:?}: {reason}")]
    Directory { path: PathBuf, reason: String },

    #[error("no camera connected in transfer mode")]
    NoDevices,

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("unsafe remote file name: {0}")]
    UnsafeName(String),

    #[error("pull of {file} failed: {reason}")]
    Pull { file: String, reason: String },

    #[error("pull of {file} timed out after {after:?}")]
    Timeout { file: String, after: Duration },
}

/// Preset store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresetError {
    #[error("preset file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("preset file contains no known entries")]
    Empty,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("device not connected")]
    NotConnected,

    #[error("reading preset properties failed: {0}")]
    Read(#[from] DriverError),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("no configuration directory available")]
    NoConfigDir,
}
