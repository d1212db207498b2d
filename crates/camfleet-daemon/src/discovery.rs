//! Discovery & Reconcile
//!
//! Brings the registry in line with what is attached: enumerate, keep the
//! supervised model family, connect whatever is not already connected, and
//! push the saved preset to the fleet when anything new came up.

use std::thread;

use tracing::{debug, info, warn};

use camfleet_core::{ConnectionMode, PresetError};

use crate::fleet::{FleetRegistry, FleetState};

/// Outcome of one scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Matching cameras enumerated
    pub found: usize,
    /// Cameras connected by this scan
    pub connected: usize,
    /// Registry size afterwards
    pub total: usize,
    /// Preset writes across the fleet
    pub preset_writes: usize,
}

/// Reconcile `registry` with the attached cameras.
///
/// The caller holds the registry lock. `scanning` is set for the duration
/// and always cleared.
pub fn scan_and_connect(fleet: &FleetState, registry: &mut FleetRegistry, reset_first: bool) -> ScanReport {
    let _scanning = fleet.scanning().hold();
    let fleet_config = &fleet.config().fleet;
    let mut report = ScanReport::default();

    if reset_first {
        fleet.set_scan_status("Resetting USB devices...");
        if fleet.supervisor().reset_interfaces() {
            fleet.set_scan_status("Waiting for USB re-enumeration...");
            thread::sleep(fleet_config.scan_reset_settle());
        }
    }

    fleet.set_scan_status("Enumerating cameras...");
    let candidates = match fleet.enumerate_family() {
        Ok(candidates) if !candidates.is_empty() => candidates,
        Ok(_) => {
            fleet.set_scan_status("No cameras found.");
            report.total = registry.len();
            return report;
        }
        Err(e) => {
            warn!("Enumeration failed: {}", e);
            fleet.set_scan_status("No cameras found.");
            report.total = registry.len();
            return report;
        }
    };
    report.found = candidates.len();

    for (i, descriptor) in candidates.iter().enumerate() {
        let identity = descriptor.identity();
        let progress = format!("({}/{})", i + 1, report.found);

        if registry.is_connected(&identity) {
            debug!("Already connected: {}", identity);
            fleet.set_scan_status(format!("Already connected: {} {}", identity, progress));
            continue;
        }

        fleet.set_scan_status(format!("Connecting to {} {}...", identity, progress));
        match fleet.supervisor().connect(
            descriptor,
            ConnectionMode::Control,
            fleet_config.connect_attempts,
        ) {
            Ok(handle) => {
                registry.insert(handle);
                report.connected += 1;
            }
            Err(e) => warn!("Giving up on {}: {}", identity, e),
        }
    }
    report.total = registry.len();

    if report.connected == 0 {
        fleet.set_scan_status("Scan complete. No new cameras found.");
        return report;
    }

    fleet.set_scan_status(format!(
        "Scan complete. {} new camera(s), {} total.",
        report.connected, report.total
    ));
    thread::sleep(fleet_config.post_scan_settle());

    report.preset_writes = apply_saved_preset(fleet, registry);
    report
}

/// Apply the preset file to every connected camera. Missing or empty
/// presets are a no-op.
fn apply_saved_preset(fleet: &FleetState, registry: &FleetRegistry) -> usize {
    let store = fleet.presets();
    let entries = match store.load() {
        Ok(entries) => entries,
        Err(PresetError::NotFound(_)) | Err(PresetError::Empty) => return 0,
        Err(e) => {
            warn!("Cannot load preset: {}", e);
            return 0;
        }
    };

    info!("Applying preset from {:?}", store.path());
    fleet.set_scan_status("Applying preset...");
    let mut writes = 0;
    for device in registry.connected() {
        fleet.set_scan_status(format!("Applying preset to {}...", device.identity()));
        let applied = store.apply(device, &entries);
        info!("{}: {} setting(s) applied", device.identity(), applied);
        writes += applied;
    }
    fleet.set_scan_status(format!("Preset applied. {} camera(s) ready.", registry.len()));
    writes
}
