//! camfleet daemon - supervises a fleet of USB / network cameras
//!
//! This crate provides:
//! - Device handles fed by a tagged driver event stream
//! - Connection supervision with bounded retries and USB reset
//! - Discovery, health monitoring and preset application
//! - Bulk clip transfer with a connection-mode switch
//! - An HTTP control surface over the shared fleet
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              HTTP handlers (tokio / axum)                   │
//! │  status snapshot, commands, detached scan / download        │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ FleetState (registry mutex,
//!                               │ scanning / downloading flags)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   Management thread, scan / download threads (blocking)     │
//! │   DeviceHandle -> CameraDriver                              │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ crossbeam-channel
//!                               │ (TaggedEvent)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   Event pump: routes driver events to device links,         │
//! │   resolving pending completion signals                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod device;
pub mod discovery;
pub mod events;
pub mod fleet;
pub mod health;
pub mod preset;
pub mod sim;
pub mod supervisor;
pub mod transfer;

pub use api::{router, serve, ApiError};
pub use device::{ControlOutcome, DeviceHandle, DeviceLink, PullFault};
pub use discovery::{scan_and_connect, ScanReport};
pub use events::{EventPump, EventRouter};
pub use fleet::{CommandTally, ExclusiveFlag, FlagGuard, FleetRegistry, FleetState};
pub use health::{spawn_management_thread, HealthMonitor, TickOutcome};
pub use preset::{parse_preset, render_preset, PresetStore};
pub use sim::{OpenFailure, PullBehavior, SimBank, SimCamera};
pub use supervisor::{ConnectTimings, ConnectionSupervisor};
pub use transfer::{run_bulk_transfer, TransferJob};
