//! Fallback for platforms without a userspace USB reset.

use tracing::debug;

use crate::error::DriverError;

pub fn reset_matching(vendor_id: u16, product_id: u16) -> Result<usize, DriverError> {
    debug!(
        "USB reset for {:04x}:{:04x} not available on this platform",
        vendor_id, product_id
    );
    Err(DriverError::Unsupported)
}
