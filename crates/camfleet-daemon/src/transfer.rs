//! Bulk Transfer Orchestrator
//!
//! Cameras cannot list or pull clips while in remote-control mode, so a
//! download tears the fleet down, reopens every camera in contents-transfer
//! mode, pulls whatever is not already on disk, and finally rebuilds the
//! control-mode fleet.

use std::fs;
use std::path::Path;
use std::thread;

use tracing::{debug, info, warn};

use camfleet_core::path::local_target;
use camfleet_core::{ConnectionMode, TransferError};

use crate::device::DeviceHandle;
use crate::discovery::scan_and_connect;
use crate::fleet::FleetState;

/// Bookkeeping for one download run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferJob {
    /// Remote file names seen on each camera, by identity
    pub files: Vec<(String, Vec<String>)>,
    pub total: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl TransferJob {
    pub fn summary(&self) -> String {
        format!(
            "Download complete. Downloaded: {}, skipped: {}, errors: {}",
            self.downloaded, self.skipped, self.failed
        )
    }

    /// Status shown while the fleet is reopened in control mode
    pub fn reconnecting(&self) -> String {
        format!("{}. Reconnecting...", self.summary())
    }

    fn progress(&self) -> String {
        format!("[{}/{}]", self.downloaded + self.skipped, self.total)
    }
}

/// Download every clip not yet present in the fleet's download directory.
///
/// Only directory preparation failure and failure to open any camera in
/// transfer mode abort the run; per-file problems are counted. `downloading`
/// is held for the duration.
pub fn run_bulk_transfer(fleet: &FleetState) -> Result<TransferJob, TransferError> {
    let _downloading = fleet.downloading().hold();
    let settings = &fleet.config().transfer;

    fleet.set_download_status("Starting download...");
    let dir = fleet.download_path();
    if let Err(e) = fs::create_dir_all(&dir) {
        fleet.set_download_status(format!("Error creating directory: {}", e));
        return Err(TransferError::Directory {
            path: dir,
            reason: e.to_string(),
        });
    }

    {
        let mut registry = fleet.lock_registry();
        fleet.set_download_status("Disconnecting cameras from Remote mode...");
        registry.disconnect_all();
    }
    thread::sleep(settings.mode_switch_settle());

    fleet.set_download_status("Scanning for cameras in ContentsTransfer mode...");
    let devices = match open_transfer_devices(fleet) {
        Ok(devices) => devices,
        Err(e) => {
            restore_control_mode(fleet);
            return Err(e);
        }
    };
    thread::sleep(settings.ready_settle());

    let mut job = TransferJob::default();
    for device in &devices {
        pull_from_device(fleet, device, &dir, &mut job);
    }

    info!("Transfer pass finished, returning cameras to Remote mode");
    for mut device in devices {
        device.disconnect();
    }
    fleet.set_download_status(job.reconnecting());
    thread::sleep(settings.mode_switch_settle());
    restore_control_mode(fleet);

    fleet.set_download_status(job.summary());
    Ok(job)
}

fn open_transfer_devices(fleet: &FleetState) -> Result<Vec<DeviceHandle>, TransferError> {
    let candidates = match fleet.enumerate_family() {
        Ok(candidates) if !candidates.is_empty() => candidates,
        result => {
            if let Err(e) = result {
                warn!("Enumeration for transfer failed: {}", e);
            }
            fleet.set_download_status("Error: No cameras found for download.");
            return Err(TransferError::NoDevices);
        }
    };

    let devices: Vec<DeviceHandle> = candidates
        .iter()
        .filter_map(|descriptor| {
            fleet
                .supervisor()
                .connect(descriptor, ConnectionMode::Transfer, 1)
                .map_err(|e| warn!("Transfer-mode open failed: {}", e))
                .ok()
        })
        .collect();

    if devices.is_empty() {
        fleet.set_download_status(
            "Error: Could not connect to any camera in ContentsTransfer mode.",
        );
        return Err(TransferError::NoDevices);
    }
    Ok(devices)
}

fn restore_control_mode(fleet: &FleetState) {
    let mut registry = fleet.lock_registry();
    scan_and_connect(fleet, &mut registry, false);
}

fn pull_from_device(fleet: &FleetState, device: &DeviceHandle, dir: &Path, job: &mut TransferJob) {
    let settings = &fleet.config().transfer;
    let camera = device.identity();

    if let Err(e) = device.set_save_path(dir) {
        warn!("{}: cannot set save path: {}", camera, e);
        fleet.set_download_status(format!("Error: SetSaveInfo failed for {}", camera));
        return;
    }

    let folders = match device.date_folders() {
        Ok(folders) if !folders.is_empty() => folders,
        _ => {
            fleet.set_download_status(format!("No folders found on {}", camera));
            return;
        }
    };

    let mut seen = Vec::new();
    for folder in folders {
        let contents = match device.folder_contents(folder.handle) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("{}: cannot list {}: {}", camera, folder.name, e);
                continue;
            }
        };

        for content in contents {
            let info = match device.content_info(content) {
                Ok(info) => info,
                Err(e) => {
                    warn!("{}: cannot read content info: {}", camera, e);
                    job.failed += 1;
                    continue;
                }
            };
            job.total += 1;
            seen.push(info.file_name.clone());

            let target = match local_target(dir, &info.file_name) {
                Ok(target) => target,
                Err(e) => {
                    warn!("{}: {}", camera, e);
                    job.failed += 1;
                    continue;
                }
            };

            if target.exists() {
                job.skipped += 1;
                fleet.set_download_status(format!(
                    "Skipped (exists): {} {}",
                    info.file_name,
                    job.progress()
                ));
                continue;
            }

            fleet.set_download_status(format!(
                "Downloading: {} from {} [{}/{}]",
                info.file_name,
                camera,
                job.downloaded + job.skipped + 1,
                job.total
            ));
            match device.pull(&info, settings.file_timeout()) {
                Ok(()) => job.downloaded += 1,
                Err(e) => {
                    warn!("{}: {}", camera, e);
                    job.failed += 1;
                    let status = match e {
                        TransferError::Timeout { .. } => "Timeout downloading",
                        _ => "Error downloading",
                    };
                    fleet.set_download_status(format!("{}: {}", status, info.file_name));
                }
            }
            thread::sleep(settings.inter_file_pause());
        }
    }

    job.files.push((camera.to_string(), seen));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fleet::tests::fleet_with;
    use crate::sim::{OpenFailure, PullBehavior, SimBank, SimCamera};

    fn control_fleet(bank: &Arc<SimBank>, dir: &Path) -> Arc<FleetState> {
        let fleet = fleet_with(bank, dir);
        let mut registry = fleet.lock_registry();
        scan_and_connect(&fleet, &mut registry, false);
        drop(registry);
        fleet
    }

    #[test]
    fn test_downloads_then_returns_to_control() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::with_cameras(2, "FX30"));
        let fleet = control_fleet(&bank, dir.path());

        let job = run_bulk_transfer(&fleet).unwrap();
        assert_eq!(job.total, 4);
        assert_eq!(job.downloaded, 4);
        assert_eq!(job.failed, 0);
        assert_eq!(job.files.len(), 2);
        assert!(fleet.download_path().join("C0001.MP4").exists());
        assert_eq!(
            fleet.download_status(),
            "Download complete. Downloaded: 4, skipped: 0, errors: 0"
        );

        assert!(!fleet.downloading().is_set());
        let registry = fleet.lock_registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.iter().all(|d| d.mode() == ConnectionMode::Control));
        assert!(registry.all_connected());
    }

    #[test]
    fn test_existing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::with_cameras(1, "FX30"));
        let fleet = control_fleet(&bank, dir.path());
        let downloads = fleet.download_path();
        fs::create_dir_all(&downloads).unwrap();
        fs::write(downloads.join("C0001.MP4"), b"already here").unwrap();

        let job = run_bulk_transfer(&fleet).unwrap();
        assert_eq!(job.skipped, 1);
        assert_eq!(job.downloaded, 1);
        assert_eq!(bank.pull_requests(), 1);

        let again = run_bulk_transfer(&fleet).unwrap();
        assert_eq!(again.skipped, 2);
        assert_eq!(again.downloaded, 0);
        assert_eq!(bank.pull_requests(), 1);
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::new());
        bank.add_camera(
            SimCamera::new("FX30", "A")
                .with_file("C0001.MP4", PullBehavior::Fail)
                .with_file("../escape.MP4", PullBehavior::Complete)
                .with_file_in("20261017", "C0003.MP4", PullBehavior::Complete),
        );
        let fleet = control_fleet(&bank, dir.path());

        let job = run_bulk_transfer(&fleet).unwrap();
        assert_eq!(job.total, 3);
        assert_eq!(job.failed, 2);
        assert_eq!(job.downloaded, 1);
        assert!(!dir.path().join("escape.MP4").exists());
    }

    #[test]
    fn test_no_transfer_devices_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::new());
        let fleet = control_fleet(&bank, dir.path());

        assert_eq!(run_bulk_transfer(&fleet), Err(TransferError::NoDevices));
        assert!(!fleet.downloading().is_set());
        assert_eq!(fleet.download_status(), "Error: No cameras found for download.");
    }

    #[test]
    fn test_transfer_open_failure_restores_control() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A").failing_opens(1, OpenFailure::Rejected));
        // registry starts empty: the only open that fails is the transfer one
        let fleet = fleet_with(&bank, dir.path());

        assert_eq!(run_bulk_transfer(&fleet), Err(TransferError::NoDevices));
        assert_eq!(
            fleet.download_status(),
            "Error: Could not connect to any camera in ContentsTransfer mode."
        );
        assert!(!fleet.downloading().is_set());

        let registry = fleet.lock_registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.iter().all(|d| d.mode() == ConnectionMode::Control));
        assert!(registry.all_connected());
    }

    #[test]
    fn test_reconnecting_status_names_counts() {
        let job = TransferJob {
            downloaded: 3,
            skipped: 1,
            failed: 2,
            ..TransferJob::default()
        };
        assert_eq!(
            job.reconnecting(),
            "Download complete. Downloaded: 3, skipped: 1, errors: 2. Reconnecting..."
        );
    }

    #[test]
    fn test_directory_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(SimBank::with_cameras(1, "FX30"));
        let fleet = control_fleet(&bank, dir.path());
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        fleet.set_download_path(blocker.join("clips"));

        let result = run_bulk_transfer(&fleet);
        assert!(matches!(result, Err(TransferError::Directory { .. })));
        assert!(!fleet.downloading().is_set());
        // fleet untouched
        assert_eq!(fleet.lock_registry().connected_count(), 1);
    }
}
