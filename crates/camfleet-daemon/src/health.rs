//! Health Monitor
//!
//! Runs on the management thread: an initial discovery with a hardware
//! reset, a stabilization period, then a fixed-interval tick that tolerates
//! short drop-outs and tears the fleet down only after sustained
//! disconnection.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::discovery::{scan_and_connect, ScanReport};
use crate::fleet::FleetState;

/// What one tick decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A scan or download owns the fleet; counter reset
    Deferred,
    /// Every device connected; counter reset
    Healthy,
    /// Some device down, below the reset threshold
    Degraded { disconnected_for: Duration },
    /// Threshold reached: fleet torn down and rediscovered
    Reset(ScanReport),
}

pub struct HealthMonitor {
    fleet: Arc<FleetState>,
    disconnected_for: Duration,
}

impl HealthMonitor {
    pub fn new(fleet: Arc<FleetState>) -> Self {
        Self {
            fleet,
            disconnected_for: Duration::ZERO,
        }
    }

    pub fn disconnected_for(&self) -> Duration {
        self.disconnected_for
    }

    /// One health check
    pub fn tick(&mut self) -> TickOutcome {
        let health = &self.fleet.config().health;

        // Known race: a scan may start right after this check. The tick then
        // waits on the registry lock and evaluates the post-scan fleet.
        if self.fleet.downloading().is_set() || self.fleet.scanning().is_set() {
            self.disconnected_for = Duration::ZERO;
            return TickOutcome::Deferred;
        }

        let mut registry = self.fleet.lock_registry();

        for device in registry.iter() {
            if device.is_connected() && device.clear_reconnecting() {
                info!("Reconnected: {}", device.identity());
            }
        }

        if registry.all_connected() {
            self.disconnected_for = Duration::ZERO;
            return TickOutcome::Healthy;
        }

        self.disconnected_for += health.tick();
        warn!(
            "Camera(s) disconnected for {}s ({} of {} connected)",
            self.disconnected_for.as_secs(),
            registry.connected_count(),
            registry.len()
        );

        if self.disconnected_for < health.reset_after() {
            return TickOutcome::Degraded {
                disconnected_for: self.disconnected_for,
            };
        }

        info!(
            "Resetting after {}s disconnection",
            self.disconnected_for.as_secs()
        );
        registry.disconnect_all();
        let report = scan_and_connect(&self.fleet, &mut registry, true);
        self.disconnected_for = Duration::ZERO;
        TickOutcome::Reset(report)
    }

    /// Management thread body. Returns once the fleet stops running.
    pub fn run(mut self) {
        {
            let mut registry = self.fleet.lock_registry();
            scan_and_connect(&self.fleet, &mut registry, true);
        }

        let health = self.fleet.config().health.clone();
        info!("Stabilizing for {}s", health.stabilize().as_secs());
        if !self.fleet.pause(health.stabilize()) {
            return;
        }

        info!("Fleet stabilized, monitoring every {}s", health.tick().as_secs());
        while self.fleet.pause(health.tick()) {
            self.tick();
        }
        info!("Health monitor stopped");
    }
}

/// Start the management thread
pub fn spawn_management_thread(fleet: Arc<FleetState>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("camfleet-health".into())
        .spawn(move || HealthMonitor::new(fleet).run())
}
