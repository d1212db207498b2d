//! Linux USB reset via usbfs.
//!
//! Matching devices are found by their `idVendor` / `idProduct` attributes
//! under sysfs, then reset with the `USBDEVFS_RESET` ioctl on the
//! corresponding `/dev/bus/usb/BBB/DDD` node.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::DriverError;

pub const SYSFS_USB_DEVICES: &str = "/sys/bus/usb/devices";

/// `_IO('U', 20)` from linux/usbdevice_fs.h
const USBDEVFS_RESET: libc::c_ulong = 0x5514;

/// Bus / device number pair of one attached USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsbAddress {
    pub bus: u32,
    pub device: u32,
}

impl UsbAddress {
    pub fn node_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/bus/usb/{:03}/{:03}", self.bus, self.device))
    }
}

fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_hex(path: &Path) -> Option<u16> {
    read_attr(path).and_then(|s| u16::from_str_radix(&s, 16).ok())
}

fn read_dec(path: &Path) -> Option<u32> {
    read_attr(path).and_then(|s| s.parse().ok())
}

/// Find every device under `sysfs` with the given ids, sorted by address
pub fn find_devices(sysfs: &Path, vendor_id: u16, product_id: u16) -> io::Result<Vec<UsbAddress>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(sysfs)? {
        let dir = entry?.path();

        // Interface directories ("1-1:1.0") carry no idVendor
        let (Some(vendor), Some(product)) = (
            read_hex(&dir.join("idVendor")),
            read_hex(&dir.join("idProduct")),
        ) else {
            continue;
        };
        if vendor != vendor_id || product != product_id {
            continue;
        }

        if let (Some(bus), Some(device)) =
            (read_dec(&dir.join("busnum")), read_dec(&dir.join("devnum")))
        {
            found.push(UsbAddress { bus, device });
        }
    }

    found.sort();
    Ok(found)
}

/// Issue `USBDEVFS_RESET` on one device node
pub fn reset_device(address: UsbAddress) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(address.node_path())?;

    let result = unsafe { libc::ioctl(file.as_raw_fd(), USBDEVFS_RESET as _, 0) };

    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Reset every matching device. Individual failures are logged and skipped;
/// fails with [`DriverError::NoDevice`] if nothing was reset.
pub fn reset_matching(sysfs: &Path, vendor_id: u16, product_id: u16) -> Result<usize, DriverError> {
    let devices = find_devices(sysfs, vendor_id, product_id)?;
    let mut reset = 0;

    for address in devices {
        match reset_device(address) {
            Ok(()) => {
                info!("Reset USB device {:?}", address.node_path());
                reset += 1;
            }
            Err(e) => warn!("USB reset of {:?} failed: {}", address.node_path(), e),
        }
    }

    if reset == 0 {
        return Err(DriverError::NoDevice);
    }
    Ok(reset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(root: &Path, name: &str, vendor: &str, product: &str, bus: u32, dev: u32) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("idVendor"), format!("{}\n", vendor)).unwrap();
        fs::write(dir.join("idProduct"), format!("{}\n", product)).unwrap();
        fs::write(dir.join("busnum"), format!("{}\n", bus)).unwrap();
        fs::write(dir.join("devnum"), format!("{}\n", dev)).unwrap();
    }

    #[test]
    fn test_find_devices_filters_by_ids() {
        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "1-2", "054c", "0e10", 1, 7);
        fake_device(root.path(), "1-1", "054c", "0e10", 1, 3);
        fake_device(root.path(), "2-1", "046d", "c52b", 2, 2);
        fs::create_dir_all(root.path().join("1-1:1.0")).unwrap();

        let found = find_devices(root.path(), 0x054c, 0x0e10).unwrap();
        assert_eq!(
            found,
            vec![
                UsbAddress { bus: 1, device: 3 },
                UsbAddress { bus: 1, device: 7 },
            ]
        );
    }

    #[test]
    fn test_node_path() {
        let addr = UsbAddress { bus: 1, device: 12 };
        assert_eq!(addr.node_path(), PathBuf::from("/dev/bus/usb/001/012"));
    }

    #[test]
    fn test_missing_sysfs_is_io_error() {
        let result = reset_matching(Path::new("/nonexistent/usb"), 0x054c, 0x0e10);
        assert!(matches!(result, Err(DriverError::Io(_))));
    }

    #[test]
    fn test_no_matching_device_is_not_a_reset() {
        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "2-1", "046d", "c52b", 2, 2);

        let result = reset_matching(root.path(), 0x054c, 0x0e10);
        assert_eq!(result, Err(DriverError::NoDevice));
    }
}
