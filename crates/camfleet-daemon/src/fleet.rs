//! Fleet Registry
//!
//! [`FleetState`] is the one shared object of the daemon: the mutex-guarded
//! device list, the `scanning` / `downloading` / `running` flags, the status
//! strings shown by the UI, and the collaborators every operation needs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info};

use camfleet_core::{
    CameraDriver, CameraStatus, Config, DeviceCommand, DeviceDescriptor, DriverError, FleetStatus,
    InterfaceReset,
};

use crate::device::DeviceHandle;
use crate::events::{EventPump, EventRouter};
use crate::preset::PresetStore;
use crate::supervisor::ConnectionSupervisor;

/// A boolean flag marking one exclusive background operation
#[derive(Clone, Debug, Default)]
pub struct ExclusiveFlag(Arc<AtomicBool>);

impl ExclusiveFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag if it is clear. `None` means the operation is already
    /// running.
    pub fn claim(&self) -> Option<FlagGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlagGuard {
                flag: Arc::clone(&self.0),
                owned: true,
            })
    }

    /// Set the flag unconditionally. Only the guard that actually flipped it
    /// clears it again, so holds nest inside a claim.
    pub fn hold(&self) -> FlagGuard {
        let was_set = self.0.swap(true, Ordering::SeqCst);
        FlagGuard {
            flag: Arc::clone(&self.0),
            owned: !was_set,
        }
    }
}

/// Clears its flag on drop
#[derive(Debug)]
pub struct FlagGuard {
    flag: Arc<AtomicBool>,
    owned: bool,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        if self.owned {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

/// Result of sending one command to every camera
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandTally {
    pub ok: usize,
    pub failed: usize,
}

/// Ordered device list, de-duplicated by identity
#[derive(Default)]
pub struct FleetRegistry {
    devices: Vec<DeviceHandle>,
}

impl FleetRegistry {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    /// Add a device. A stale entry with the same identity is replaced in
    /// place and disconnected.
    pub fn insert(&mut self, device: DeviceHandle) {
        match self
            .devices
            .iter()
            .position(|d| d.identity() == device.identity())
        {
            Some(index) => {
                debug!("Replacing stale entry for {}", device.identity());
                self.devices[index] = device;
            }
            None => self.devices.push(device),
        }
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.devices
            .iter()
            .any(|d| d.identity() == identity && d.is_connected())
    }

    pub fn connected(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter().filter(|d| d.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    pub fn first_connected(&self) -> Option<&DeviceHandle> {
        self.connected().next()
    }

    /// Non-empty and every device connected
    pub fn all_connected(&self) -> bool {
        !self.devices.is_empty() && self.devices.iter().all(|d| d.is_connected())
    }

    /// Send `command` to every device; disconnected devices count as failed
    pub fn broadcast(&self, command: DeviceCommand) -> CommandTally {
        let mut tally = CommandTally::default();
        for device in &self.devices {
            match device.send_command(command) {
                Ok(()) => tally.ok += 1,
                Err(e) => {
                    debug!("{}: {:?} failed: {}", device.identity(), command, e);
                    tally.failed += 1;
                }
            }
        }
        tally
    }

    /// Disconnect and discard every device
    pub fn disconnect_all(&mut self) {
        for device in &mut self.devices {
            device.disconnect();
        }
        self.devices.clear();
    }

    pub fn statuses(&self) -> Vec<CameraStatus> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| device.status(index))
            .collect()
    }
}

/// UI-facing status strings and the current download target
struct StatusBoard {
    scan_status: String,
    download_status: String,
    download_path: PathBuf,
}

/// Everything the daemon's threads share
pub struct FleetState {
    config: Config,
    supervisor: ConnectionSupervisor,
    presets: PresetStore,
    registry: Mutex<FleetRegistry>,
    board: Mutex<StatusBoard>,
    last_cameras: Mutex<Vec<CameraStatus>>,
    scanning: ExclusiveFlag,
    downloading: ExclusiveFlag,
    running: AtomicBool,
    pump: Mutex<EventPump>,
}

impl FleetState {
    pub fn new(
        config: Config,
        driver: Arc<dyn CameraDriver>,
        reset: Option<Arc<dyn InterfaceReset>>,
    ) -> std::io::Result<Arc<Self>> {
        let (router, pump) = EventRouter::start()?;
        let supervisor = ConnectionSupervisor::new(driver, reset, router, &config.fleet);
        let presets = PresetStore::from_config(&config.preset);
        let board = StatusBoard {
            scan_status: String::new(),
            download_status: String::new(),
            download_path: config.transfer.download_dir.clone(),
        };

        Ok(Arc::new(Self {
            config,
            supervisor,
            presets,
            registry: Mutex::new(FleetRegistry::default()),
            board: Mutex::new(board),
            last_cameras: Mutex::new(Vec::new()),
            scanning: ExclusiveFlag::default(),
            downloading: ExclusiveFlag::default(),
            running: AtomicBool::new(true),
            pump: Mutex::new(pump),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn driver(&self) -> &Arc<dyn CameraDriver> {
        self.supervisor.driver()
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    /// Block until the registry is available
    pub fn lock_registry(&self) -> MutexGuard<'_, FleetRegistry> {
        self.registry.lock()
    }

    pub fn try_lock_registry(&self) -> Option<MutexGuard<'_, FleetRegistry>> {
        self.registry.try_lock()
    }

    pub fn scanning(&self) -> &ExclusiveFlag {
        &self.scanning
    }

    pub fn downloading(&self) -> &ExclusiveFlag {
        &self.downloading
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask background loops to exit at their next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn scan_status(&self) -> String {
        self.board.lock().scan_status.clone()
    }

    pub fn set_scan_status(&self, status: impl Into<String>) {
        let status = status.into();
        info!("{}", status);
        self.board.lock().scan_status = status;
    }

    pub fn download_status(&self) -> String {
        self.board.lock().download_status.clone()
    }

    pub fn set_download_status(&self, status: impl Into<String>) {
        let status = status.into();
        info!("{}", status);
        self.board.lock().download_status = status;
    }

    pub fn download_path(&self) -> PathBuf {
        self.board.lock().download_path.clone()
    }

    pub fn set_download_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!("Download path set to {:?}", path);
        self.board.lock().download_path = path;
    }

    /// Sleep for `duration`, waking early once the fleet is stopping.
    /// Returns false if it was cut short.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
        false
    }

    /// Status endpoint body. Never blocks on the registry: while an
    /// operation holds it, the last snapshot taken is served instead.
    pub fn snapshot(&self) -> FleetStatus {
        let cameras = match self.try_lock_registry() {
            Some(registry) => {
                let cameras = registry.statuses();
                drop(registry);
                *self.last_cameras.lock() = cameras.clone();
                cameras
            }
            None => self.last_cameras.lock().clone(),
        };

        let board = self.board.lock();
        FleetStatus {
            cameras,
            downloading: self.downloading.is_set(),
            download_status: board.download_status.clone(),
            download_path: board.download_path.display().to_string(),
            scanning: self.scanning.is_set(),
            scan_status: board.scan_status.clone(),
            preset_path: self.presets.path().display().to_string(),
            has_preset: self.presets.exists(),
        }
    }

    /// Stop background work, disconnect every camera and stop event
    /// delivery.
    pub fn shutdown(&self) {
        self.stop();
        self.lock_registry().disconnect_all();
        self.pump.lock().shutdown();
        info!("Fleet shut down");
    }

    /// Enumerate and return every camera in the supervised family
    pub fn enumerate_family(&self) -> Result<Vec<DeviceDescriptor>, DriverError> {
        let found = self.driver().enumerate(self.config.fleet.enumerate_timeout())?;
        Ok(found
            .into_iter()
            .filter(|d| d.matches_family(&self.config.fleet.model_filter))
            .collect())
    }
}
