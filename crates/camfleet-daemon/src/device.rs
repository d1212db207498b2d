//! Device Handle
//!
//! A [`DeviceHandle`] is one open connection to one camera. Its mutable
//! connection state lives in a shared [`DeviceLink`] so the event pump can
//! update it and resolve completion signals while the handle itself stays
//! exclusively owned by the fleet registry.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use camfleet_core::format::{format_f_number, format_iso, format_labelled, format_shutter_speed};
use camfleet_core::{
    CameraDriver, CameraStatus, ConnectionMode, ConnectionState, ContentHandle, ContentInfo,
    DateFolder, DeviceCommand, DeviceDescriptor, DeviceEvent, DeviceToken, DeviceWarning,
    DriverError, FolderHandle, NativeHandle, PropertyCode, PropertyValue, SignalError,
    SignalSlot, TransferError, TransferNotice, Waiter, RECORDING_STATE_RECORDING,
};

use crate::events::EventRouter;

/// Outcome of a connect or disconnect request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    Connected,
    Disconnected(u32),
    Failed(u32),
}

/// Why a file pull did not complete
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullFault {
    Warning(DeviceWarning),
    Failed(u32),
    Disconnected(u32),
}

impl std::fmt::Display for PullFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullFault::Warning(w) => write!(f, "camera warning {:?}", w),
            PullFault::Failed(code) => write!(f, "transfer failed (0x{:04x})", code),
            PullFault::Disconnected(code) => write!(f, "camera disconnected (0x{:04x})", code),
        }
    }
}

/// State shared between a handle and the event pump
pub struct DeviceLink {
    token: DeviceToken,
    identity: String,
    state: Mutex<ConnectionState>,
    reconnecting: AtomicBool,
    control: SignalSlot<ControlOutcome>,
    pull: SignalSlot<Result<(), PullFault>>,
}

impl DeviceLink {
    pub(crate) fn new(token: DeviceToken, identity: &str) -> Self {
        Self {
            token,
            identity: identity.to_string(),
            state: Mutex::new(ConnectionState::Disconnected),
            reconnecting: AtomicBool::new(false),
            control: SignalSlot::new(),
            pull: SignalSlot::new(),
        }
    }

    pub fn token(&self) -> DeviceToken {
        self.token
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    pub(crate) fn arm_control(&self) -> Waiter<ControlOutcome> {
        self.control.arm()
    }

    /// Apply one driver event. Runs on the event pump thread.
    pub fn handle_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.control.resolve(ControlOutcome::Connected);
            }
            DeviceEvent::Disconnected { code } => {
                self.set_state(ConnectionState::Disconnected);
                self.control.resolve(ControlOutcome::Disconnected(code));
                self.pull.resolve(Err(PullFault::Disconnected(code)));
            }
            DeviceEvent::Error { code } => {
                warn!(identity = %self.identity, "device error 0x{:04x}", code);
                let mut state = self.state.lock();
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Disconnected;
                }
                drop(state);
                self.control.resolve(ControlOutcome::Failed(code));
            }
            DeviceEvent::Warning(DeviceWarning::Reconnecting) => {
                info!(identity = %self.identity, "device reconnecting");
                self.reconnecting.store(true, Ordering::SeqCst);
                self.set_state(ConnectionState::Reconnecting);
            }
            DeviceEvent::Warning(warning) if warning.fails_transfer() => {
                warn!(identity = %self.identity, ?warning, "transfer refused by camera");
                self.pull.resolve(Err(PullFault::Warning(warning)));
            }
            DeviceEvent::Warning(warning) => {
                debug!(identity = %self.identity, ?warning, "device warning");
            }
            DeviceEvent::PropertyChanged { codes } => {
                debug!(identity = %self.identity, count = codes.len(), "properties changed");
            }
            DeviceEvent::TransferProgress {
                notice,
                content,
                file_name,
            } => {
                let outcome = match notice {
                    TransferNotice::Started => {
                        debug!(identity = %self.identity, file = %file_name, "pull started");
                        return;
                    }
                    TransferNotice::Completed => Ok(()),
                    TransferNotice::Failed(code) => Err(PullFault::Failed(code)),
                };
                if !self.pull.resolve_for(content, outcome) {
                    debug!(identity = %self.identity, file = %file_name, ?notice, "no pull waiting for this clip");
                }
            }
        }
    }
}

/// One open camera connection
pub struct DeviceHandle {
    driver: Arc<dyn CameraDriver>,
    router: EventRouter,
    link: Arc<DeviceLink>,
    descriptor: DeviceDescriptor,
    native: Option<NativeHandle>,
    mode: ConnectionMode,
    disconnect_timeout: Duration,
}

impl DeviceHandle {
    pub(crate) fn new(
        driver: Arc<dyn CameraDriver>,
        router: EventRouter,
        link: Arc<DeviceLink>,
        descriptor: DeviceDescriptor,
        native: NativeHandle,
        mode: ConnectionMode,
        disconnect_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            router,
            link,
            descriptor,
            native: Some(native),
            mode,
            disconnect_timeout,
        }
    }

    pub fn identity(&self) -> &str {
        self.link.identity()
    }

    pub fn token(&self) -> DeviceToken {
        self.link.token()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.native.is_some() && self.link.state() == ConnectionState::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.link.is_reconnecting()
    }

    /// Clear the reconnecting flag once the link is back. Returns true if it
    /// was set.
    pub fn clear_reconnecting(&self) -> bool {
        self.link.reconnecting.swap(false, Ordering::SeqCst)
    }

    fn native(&self) -> Result<NativeHandle, DriverError> {
        match self.native {
            Some(native) if self.link.state() == ConnectionState::Connected => Ok(native),
            _ => Err(DriverError::NotConnected),
        }
    }

    pub fn read_properties(&self, codes: &[PropertyCode]) -> Result<Vec<PropertyValue>, DriverError> {
        let native = self.native()?;
        self.driver.get_properties(native, codes)
    }

    pub fn read_property(&self, code: PropertyCode) -> Result<PropertyValue, DriverError> {
        self.read_properties(&[code])?
            .into_iter()
            .find(|v| v.code == code)
            .ok_or(DriverError::PropertyUnavailable(code))
    }

    pub fn write_property(&self, value: &PropertyValue) -> Result<(), DriverError> {
        let native = self.native()?;
        self.driver.set_property(native, value)
    }

    pub fn send_command(&self, command: DeviceCommand) -> Result<(), DriverError> {
        let native = self.native()?;
        self.driver.send_command(native, command)?;
        debug!(identity = %self.identity(), ?command, "command sent");
        Ok(())
    }

    /// Status entry for the status endpoint. Never fails; unreadable
    /// properties keep their placeholder values.
    pub fn status(&self, index: usize) -> CameraStatus {
        let mut status = CameraStatus::unavailable(index, self.identity());
        if !self.is_connected() {
            return status;
        }
        status.connected = true;

        match self.read_properties(&PropertyCode::STATUS) {
            Ok(values) => {
                for value in &values {
                    apply_status_property(&mut status, value);
                }
            }
            Err(e) => debug!(identity = %self.identity(), "status read failed: {}", e),
        }
        status
    }

    pub fn set_save_path(&self, dir: &Path) -> Result<(), DriverError> {
        let native = self.native()?;
        self.driver.set_save_path(native, dir)
    }

    pub fn date_folders(&self) -> Result<Vec<DateFolder>, DriverError> {
        let native = self.native()?;
        self.driver.date_folders(native)
    }

    pub fn folder_contents(&self, folder: FolderHandle) -> Result<Vec<ContentHandle>, DriverError> {
        let native = self.native()?;
        self.driver.folder_contents(native, folder)
    }

    pub fn content_info(&self, content: ContentHandle) -> Result<ContentInfo, DriverError> {
        let native = self.native()?;
        self.driver.content_info(native, content)
    }

    /// Pull one clip and wait for the camera to report completion
    pub fn pull(&self, content: &ContentInfo, timeout: Duration) -> Result<(), TransferError> {
        let native = self.native()?;
        let waiter = self.link.pull.arm_for(content.handle);
        self.driver.pull_content(native, content.handle)?;

        match waiter.wait(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fault)) => Err(TransferError::Pull {
                file: content.file_name.clone(),
                reason: fault.to_string(),
            }),
            Err(SignalError::Timeout(after)) => Err(TransferError::Timeout {
                file: content.file_name.clone(),
                after,
            }),
            Err(e @ SignalError::Abandoned) => Err(TransferError::Pull {
                file: content.file_name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Close the connection, wait (bounded) for confirmation, then release
    /// the native handle. Safe to call more than once.
    pub fn disconnect(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };

        if self.link.state() != ConnectionState::Disconnected {
            let waiter = self.link.arm_control();
            match self.driver.close(native) {
                Ok(()) => {
                    if let Err(e) = waiter.wait(self.disconnect_timeout) {
                        warn!(identity = %self.identity(), "no disconnect confirmation: {}", e);
                    }
                }
                Err(e) => warn!(identity = %self.identity(), "close failed: {}", e),
            }
        }

        self.link.set_state(ConnectionState::Disconnected);
        self.driver.release(native);
        self.router.unregister(self.link.token());
        info!("Disconnected {}", self.identity());
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn apply_status_property(status: &mut CameraStatus, value: &PropertyValue) {
    let raw = value.value;
    match value.code {
        PropertyCode::BatteryRemain => status.battery = raw as i64,
        PropertyCode::IsoSensitivity => status.iso = format_iso(raw),
        PropertyCode::ShutterSpeed => status.shutter_speed = format_shutter_speed(raw),
        PropertyCode::FNumber => status.f_number = format_f_number(raw),
        PropertyCode::WhiteBalance => status.white_balance = format_labelled("WB", raw),
        PropertyCode::ColorTemperature => status.color_temp = raw as i64,
        PropertyCode::RecordingState => status.recording = raw == RECORDING_STATE_RECORDING,
        PropertyCode::MediaSlot1RemainingMinutes => status.media_slot1_min = raw as i64,
        PropertyCode::MediaSlot2RemainingMinutes => status.media_slot2_min = raw as i64,
        PropertyCode::MovieFormat => status.movie_format = format_labelled("Format", raw),
        PropertyCode::MovieRecordingSetting => status.rec_setting = format_labelled("RecSet", raw),
        PropertyCode::MovieFrameRate => status.frame_rate = format_labelled("FR", raw),
        PropertyCode::ClipName => {
            if let Some(text) = &value.text {
                status.clip_name = text.clone();
            }
        }
        PropertyCode::DeviceOverheatingState => status.heat_state = raw as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use camfleet_core::{Config, TaggedEvent};

    use crate::sim::{PullBehavior, SimBank, SimCamera};
    use crate::supervisor::ConnectionSupervisor;

    fn connect_one(bank: &Arc<SimBank>, mode: ConnectionMode) -> (DeviceHandle, crate::events::EventPump) {
        let (router, pump) = EventRouter::start().unwrap();
        let mut config = Config::default();
        config.fleet.disconnect_timeout_ms = 200;
        let supervisor = ConnectionSupervisor::new(bank.clone(), None, router, &config.fleet);
        let descriptor = bank.descriptors()[0].clone();
        let handle = supervisor.connect(&descriptor, mode, 1).unwrap();
        (handle, pump)
    }

    #[test]
    fn test_link_tracks_connection_events() {
        let link = DeviceLink::new(DeviceToken(1), "FX30 (A)");
        let waiter = link.arm_control();
        link.handle_event(DeviceEvent::Connected);
        assert_eq!(waiter.wait(Duration::from_millis(10)), Ok(ControlOutcome::Connected));
        assert_eq!(link.state(), ConnectionState::Connected);

        link.handle_event(DeviceEvent::Warning(DeviceWarning::Reconnecting));
        assert_eq!(link.state(), ConnectionState::Reconnecting);
        assert!(link.is_reconnecting());

        link.handle_event(DeviceEvent::Disconnected { code: 0x8000 });
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_error_while_connecting_fails_signal() {
        let link = DeviceLink::new(DeviceToken(2), "FX30 (B)");
        link.set_state(ConnectionState::Connecting);
        let waiter = link.arm_control();
        link.handle_event(DeviceEvent::Error { code: 0x8203 });
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Ok(ControlOutcome::Failed(0x8203))
        );
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_transfer_warning_fails_pull() {
        let link = DeviceLink::new(DeviceToken(3), "FX30 (C)");
        let waiter = link.pull.arm();
        link.handle_event(DeviceEvent::Warning(DeviceWarning::TransferDeviceBusy));
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Ok(Err(PullFault::Warning(DeviceWarning::TransferDeviceBusy)))
        );
    }

    #[test]
    fn test_status_of_connected_camera() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A"));
        let (handle, _pump) = connect_one(&bank, ConnectionMode::Control);

        let status = handle.status(0);
        assert!(status.connected);
        assert_eq!(status.model, "FX30 (A)");
        assert_eq!(status.iso, "ISO 400");
        assert_eq!(status.f_number, "F2.8");
        assert_eq!(status.shutter_speed, "1/50");
        assert_eq!(status.clip_name, "C0001");
        assert!(!status.recording);
    }

    #[test]
    fn test_commands_and_disconnect() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A"));
        let (mut handle, _pump) = connect_one(&bank, ConnectionMode::Control);

        handle.send_command(DeviceCommand::RecordStart).unwrap();
        assert!(handle.status(0).recording);

        handle.disconnect();
        assert!(!handle.is_connected());
        assert_eq!(handle.status(0).battery, -1);
        assert_eq!(
            handle.send_command(DeviceCommand::RecordStop),
            Err(DriverError::NotConnected)
        );
        assert_eq!(bank.open_sessions(), 0);

        // second disconnect is a no-op
        handle.disconnect();
    }

    #[test]
    fn test_pull_timeout_is_bounded() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A").with_file("C0001.MP4", PullBehavior::Hang));
        let (handle, _pump) = connect_one(&bank, ConnectionMode::Transfer);

        let dir = tempfile::tempdir().unwrap();
        handle.set_save_path(dir.path()).unwrap();
        let folder = handle.date_folders().unwrap()[0].handle;
        let content = handle.folder_contents(folder).unwrap()[0];
        let info = handle.content_info(content).unwrap();

        let result = handle.pull(&info, Duration::from_millis(50));
        assert!(matches!(result, Err(TransferError::Timeout { .. })));
    }

    #[test]
    fn test_completion_for_other_clip_is_ignored() {
        let link = DeviceLink::new(DeviceToken(4), "FX30 (D)");
        let waiter = link.pull.arm_for(2);
        link.handle_event(DeviceEvent::TransferProgress {
            notice: TransferNotice::Completed,
            content: 1,
            file_name: "C0001.MP4".into(),
        });
        assert!(link.pull.is_armed());
        link.handle_event(DeviceEvent::TransferProgress {
            notice: TransferNotice::Failed(0x8402),
            content: 2,
            file_name: "C0002.MP4".into(),
        });
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Ok(Err(PullFault::Failed(0x8402)))
        );
    }

    #[test]
    fn test_late_completion_does_not_finish_next_pull() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(
            SimCamera::new("FX30", "A")
                .with_file("C0001.MP4", PullBehavior::Hang)
                .with_file("C0002.MP4", PullBehavior::Hang),
        );
        let (handle, _pump) = connect_one(&bank, ConnectionMode::Transfer);

        let dir = tempfile::tempdir().unwrap();
        handle.set_save_path(dir.path()).unwrap();
        let folder = handle.date_folders().unwrap()[0].handle;
        let contents = handle.folder_contents(folder).unwrap();
        let first = handle.content_info(contents[0]).unwrap();
        let second = handle.content_info(contents[1]).unwrap();

        let result = handle.pull(&first, Duration::from_millis(50));
        assert!(matches!(result, Err(TransferError::Timeout { .. })));

        let events = handle.router.sender().clone();
        let token = handle.token();
        let result = thread::scope(|s| {
            let pulling = s.spawn(|| handle.pull(&second, Duration::from_millis(400)));
            thread::sleep(Duration::from_millis(50));
            // the camera finally reports the first clip
            events
                .send(TaggedEvent::new(
                    token,
                    DeviceEvent::TransferProgress {
                        notice: TransferNotice::Completed,
                        content: first.handle,
                        file_name: first.file_name.clone(),
                    },
                ))
                .unwrap();
            pulling.join().unwrap()
        });

        assert!(matches!(result, Err(TransferError::Timeout { ref file, .. }) if file == "C0002.MP4"));
        assert!(!dir.path().join("C0002.MP4").exists());
    }
}
