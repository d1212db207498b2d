//! Hardware reset side channel for USB-attached cameras.
//!
//! Power-cycling the USB interface is the only reliable way to recover a
//! camera whose vendor stack has wedged. Only Linux exposes this to
//! userspace without extra entitlements; other platforms report the
//! facility as unsupported and callers fall back to plain retry delays.

use tracing::debug;

use crate::driver::InterfaceReset;
use crate::error::DriverError;

#[cfg(target_os = "linux")]
pub mod linux;

pub mod fallback;

/// Resets every USB device matching a vendor / product id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbReset {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbReset {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether this platform can reset USB devices at all
    pub const fn is_supported() -> bool {
        cfg!(target_os = "linux")
    }
}

impl InterfaceReset for UsbReset {
    fn reset_interfaces(&self) -> Result<usize, DriverError> {
        debug!(
            "Resetting USB devices {:04x}:{:04x}",
            self.vendor_id, self.product_id
        );

        #[cfg(target_os = "linux")]
        {
            linux::reset_matching(
                std::path::Path::new(linux::SYSFS_USB_DEVICES),
                self.vendor_id,
                self.product_id,
            )
        }

        #[cfg(not(target_os = "linux"))]
        {
            fallback::reset_matching(self.vendor_id, self.product_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_matches_platform() {
        assert_eq!(UsbReset::is_supported(), cfg!(target_os = "linux"));
    }

    #[test]
    fn test_fallback_is_unsupported() {
        assert_eq!(
            fallback::reset_matching(0x054c, 0x0e10),
            Err(DriverError::Unsupported)
        );
    }
}
