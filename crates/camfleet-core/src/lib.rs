//! camfleet core - shared types, driver boundary, and configuration
//!
//! This crate contains the foundational pieces used by the fleet supervisor.
//! It has no dependency on the async runtime or the HTTP surface.

pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod path;
pub mod signal;
pub mod types;
pub mod usb;

pub use config::{Config, FleetConfig, HealthConfig, PresetConfig, ServerConfig, TransferConfig};
pub use driver::{
    event_channel, CameraDriver, DeviceEvent, DeviceWarning, EventReceiver, EventSender,
    InterfaceReset, TaggedEvent, TransferNotice,
};
pub use error::*;
pub use signal::{SignalSlot, Waiter};
pub use types::*;

/// Maximum remote file name length in bytes
pub const MAX_FILENAME_LEN: usize = 255;
