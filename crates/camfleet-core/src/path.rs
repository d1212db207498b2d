//! Local path resolution for pulled files
//!
//! Remote file names come from camera storage and are not trusted: a name
//! must resolve to a plain file directly inside the download directory.

use std::path::{Path, PathBuf};

use crate::error::TransferError;
use crate::MAX_FILENAME_LEN;

/// Validate a remote file name (single path component)
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    let unsafe_name = || TransferError::UnsafeName(name.to_string());

    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return Err(unsafe_name());
    }

    if name.contains('\0') || name.contains('/') || name.contains('\\') {
        return Err(unsafe_name());
    }

    if name == "." || name == ".." {
        return Err(unsafe_name());
    }

    Ok(())
}

/// Where a remote file lands inside `dir`
pub fn local_target(dir: &Path, remote_name: &str) -> Result<PathBuf, TransferError> {
    validate_filename(remote_name)?;
    let target = dir.join(remote_name);

    // Final safety check: ensure the join did not leave the directory
    if target.parent() != Some(dir) {
        return Err(TransferError::UnsafeName(remote_name.to_string()));
    }

    Ok(target)
}
