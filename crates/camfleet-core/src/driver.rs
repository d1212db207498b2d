//! Camera driver boundary
//!
//! The vendor SDK is consumed through [`CameraDriver`]. Calls are synchronous
//! and return once the request has been issued; their completion (connect,
//! disconnect, file pulled) is reported later as a [`DeviceEvent`] on the
//! event channel handed to [`CameraDriver::open`], tagged with the
//! [`DeviceToken`] the caller chose for that connection.

use std::path::Path;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::error::DriverError;
use crate::types::{
    ConnectionMode, ContentHandle, ContentInfo, DateFolder, DeviceCommand, DeviceDescriptor,
    DeviceToken, FolderHandle, NativeHandle, PropertyCode, PropertyValue,
};

/// Warnings the driver raises outside of a request/response pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceWarning {
    /// Link dropped and the driver is re-establishing it
    Reconnecting,
    /// Transfer refused: camera busy
    TransferDeviceBusy,
    /// Transfer refused: camera status error
    TransferStatusError,
    /// Transfer cancelled from the camera body
    TransferCancelled,
    /// Anything else, carried by vendor code
    Other(u32),
}

impl DeviceWarning {
    /// Whether this warning terminates an in-flight file pull
    pub fn fails_transfer(self) -> bool {
        matches!(
            self,
            DeviceWarning::TransferDeviceBusy
                | DeviceWarning::TransferStatusError
                | DeviceWarning::TransferCancelled
        )
    }
}

/// Progress notice for a file pull
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferNotice {
    Started,
    Completed,
    Failed(u32),
}

/// Everything a driver reports asynchronously about one connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected,
    Disconnected { code: u32 },
    Error { code: u32 },
    Warning(DeviceWarning),
    PropertyChanged { codes: Vec<PropertyCode> },
    TransferProgress {
        notice: TransferNotice,
        content: ContentHandle,
        file_name: String,
    },
}

/// A device event plus the connection it belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedEvent {
    pub token: DeviceToken,
    pub event: DeviceEvent,
}

impl TaggedEvent {
    pub fn new(token: DeviceToken, event: DeviceEvent) -> Self {
        Self { token, event }
    }
}

pub type EventSender = Sender<TaggedEvent>;
pub type EventReceiver = Receiver<TaggedEvent>;

/// Create the unbounded device event stream
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}

/// The vendor camera SDK, as seen by the supervisor
pub trait CameraDriver: Send + Sync {
    /// List attached cameras, waiting at most `timeout`
    fn enumerate(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>, DriverError>;

    /// Issue an open. `Connected`, `Error` or `Disconnected` follows on
    /// `events`, tagged with `token`, for the lifetime of the connection.
    fn open(
        &self,
        descriptor: &DeviceDescriptor,
        mode: ConnectionMode,
        token: DeviceToken,
        events: &EventSender,
    ) -> Result<NativeHandle, DriverError>;

    /// Issue a close. `Disconnected` follows on the event stream.
    fn close(&self, handle: NativeHandle) -> Result<(), DriverError>;

    /// Free the native resources behind `handle`. Always succeeds.
    fn release(&self, handle: NativeHandle);

    fn get_properties(
        &self,
        handle: NativeHandle,
        codes: &[PropertyCode],
    ) -> Result<Vec<PropertyValue>, DriverError>;

    fn set_property(&self, handle: NativeHandle, value: &PropertyValue) -> Result<(), DriverError>;

    fn send_command(&self, handle: NativeHandle, command: DeviceCommand) -> Result<(), DriverError>;

    /// Transfer mode: local directory pulled files are written to
    fn set_save_path(&self, handle: NativeHandle, dir: &Path) -> Result<(), DriverError>;

    /// Transfer mode: date folders on the default slot
    fn date_folders(&self, handle: NativeHandle) -> Result<Vec<DateFolder>, DriverError>;

    /// Transfer mode: clips inside one date folder
    fn folder_contents(
        &self,
        handle: NativeHandle,
        folder: FolderHandle,
    ) -> Result<Vec<ContentHandle>, DriverError>;

    /// Transfer mode: details of one clip
    fn content_info(
        &self,
        handle: NativeHandle,
        content: ContentHandle,
    ) -> Result<ContentInfo, DriverError>;

    /// Transfer mode: issue a pull. Completion arrives as `TransferProgress`.
    fn pull_content(&self, handle: NativeHandle, content: ContentHandle) -> Result<(), DriverError>;
}

/// Optional hardware side channel that power-cycles the camera interface
pub trait InterfaceReset: Send + Sync {
    /// Reset every matching interface. Returns how many were reset.
    fn reset_interfaces(&self) -> Result<usize, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_warnings() {
        assert!(DeviceWarning::TransferDeviceBusy.fails_transfer());
        assert!(DeviceWarning::TransferStatusError.fails_transfer());
        assert!(DeviceWarning::TransferCancelled.fails_transfer());
        assert!(!DeviceWarning::Reconnecting.fails_transfer());
        assert!(!DeviceWarning::Other(0x20001).fails_transfer());
    }

    #[test]
    fn test_event_channel_preserves_order() {
        let (tx, rx) = event_channel();
        let token = DeviceToken(7);
        tx.send(TaggedEvent::new(token, DeviceEvent::Connected)).unwrap();
        tx.send(TaggedEvent::new(token, DeviceEvent::Disconnected { code: 0 }))
            .unwrap();

        assert_eq!(rx.recv().unwrap().event, DeviceEvent::Connected);
        assert_eq!(
            rx.recv().unwrap().event,
            DeviceEvent::Disconnected { code: 0 }
        );
    }
}
