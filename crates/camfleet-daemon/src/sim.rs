//! Simulated camera bank
//!
//! An in-process [`CameraDriver`] standing in for the vendor SDK. Used by the
//! binary when no hardware driver is linked and by the test suite, which
//! scripts open failures, property values, remote files and pull outcomes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use camfleet_core::{
    CameraDriver, ConnectionMode, ContentHandle, ContentInfo, DateFolder, DeviceCommand,
    DeviceDescriptor, DeviceEvent, DeviceToken, DeviceWarning, DriverError, EventSender, FolderHandle,
    InterfaceReset, MediaSlot, NativeHandle, PropertyCode, PropertyValue, TaggedEvent,
    TransferNotice,
};

/// What happens when a file is pulled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullBehavior {
    /// File is written to the save path and completion reported
    Complete,
    /// Camera reports a failed transfer
    Fail,
    /// Camera never reports completion
    Hang,
}

/// How a scripted open failure surfaces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenFailure {
    /// `open` itself returns an error
    Rejected,
    /// `open` succeeds, then an `Error` event arrives
    ErrorEvent,
}

const SIM_ERROR_OPEN: u32 = 0x8203;
const SIM_ERROR_TRANSFER: u32 = 0x8402;

#[derive(Clone, Debug)]
struct SimFile {
    folder: String,
    name: String,
    size: u64,
    behavior: PullBehavior,
}

/// One simulated camera
#[derive(Clone, Debug)]
pub struct SimCamera {
    descriptor: DeviceDescriptor,
    properties: HashMap<PropertyCode, PropertyValue>,
    files: Vec<SimFile>,
    fail_opens: u32,
    open_failure: OpenFailure,
    attached: bool,
}

impl SimCamera {
    pub fn new(model: &str, id: &str) -> Self {
        let mut properties = HashMap::new();
        let defaults = [
            (PropertyCode::BatteryRemain, 80),
            (PropertyCode::IsoSensitivity, 400),
            (PropertyCode::ShutterSpeed, (1 << 16) | 50),
            (PropertyCode::FNumber, 280),
            (PropertyCode::WhiteBalance, 2),
            (PropertyCode::ColorTemperature, 5600),
            (PropertyCode::RecordingState, 0),
            (PropertyCode::MediaSlot1RemainingMinutes, 120),
            (PropertyCode::MediaSlot2RemainingMinutes, 0),
            (PropertyCode::MovieFormat, 3),
            (PropertyCode::MovieRecordingSetting, 5),
            (PropertyCode::MovieFrameRate, 4),
            (PropertyCode::DeviceOverheatingState, 0),
        ];
        for (code, value) in defaults {
            properties.insert(code, PropertyValue::numeric(code, value));
        }
        properties.insert(
            PropertyCode::ClipName,
            PropertyValue::text(PropertyCode::ClipName, "C0001"),
        );

        Self {
            descriptor: DeviceDescriptor::usb(model, id),
            properties,
            files: Vec::new(),
            fail_opens: 0,
            open_failure: OpenFailure::Rejected,
            attached: true,
        }
    }

    pub fn with_property(mut self, code: PropertyCode, value: u64) -> Self {
        self.properties.insert(code, PropertyValue::numeric(code, value));
        self
    }

    pub fn with_file(self, name: &str, behavior: PullBehavior) -> Self {
        self.with_file_in("20261016", name, behavior)
    }

    pub fn with_file_in(mut self, folder: &str, name: &str, behavior: PullBehavior) -> Self {
        self.files.push(SimFile {
            folder: folder.to_string(),
            name: name.to_string(),
            size: 1024,
            behavior,
        });
        self
    }

    /// Fail the next `count` opens
    pub fn failing_opens(mut self, count: u32, failure: OpenFailure) -> Self {
        self.fail_opens = count;
        self.open_failure = failure;
        self
    }

    fn folder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.iter().map(|f| f.folder.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

struct Session {
    camera: usize,
    mode: ConnectionMode,
    token: DeviceToken,
    events: EventSender,
    save_path: Option<PathBuf>,
}

impl Session {
    fn emit(&self, event: DeviceEvent) {
        trace!(token = %self.token, ?event, "sim event");
        let _ = self.events.send(TaggedEvent::new(self.token, event));
    }
}

#[derive(Default)]
struct BankState {
    cameras: Vec<SimCamera>,
    sessions: HashMap<NativeHandle, Session>,
    next_handle: NativeHandle,
    open_attempts: u32,
    resets: u32,
    pulls: u32,
    writes: Vec<(String, PropertyValue)>,
    commands: Vec<(String, DeviceCommand)>,
}

impl BankState {
    fn session(&self, handle: NativeHandle) -> Result<&Session, DriverError> {
        self.sessions
            .get(&handle)
            .ok_or(DriverError::UnknownHandle(handle))
    }

    fn session_in(&self, handle: NativeHandle, mode: ConnectionMode) -> Result<&Session, DriverError> {
        let session = self.session(handle)?;
        if session.mode != mode {
            return Err(DriverError::Unsupported);
        }
        Ok(session)
    }
}

/// A bank of simulated cameras behind one driver
#[derive(Default)]
pub struct SimBank {
    state: Mutex<BankState>,
}

impl SimBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` cameras of `model` with serial-style ids
    pub fn with_cameras(count: usize, model: &str) -> Self {
        let bank = Self::new();
        for i in 0..count {
            bank.add_camera(
                SimCamera::new(model, &format!("SIM{:04}", i + 1))
                    .with_file(&format!("C{:04}.MP4", i * 10 + 1), PullBehavior::Complete)
                    .with_file(&format!("C{:04}.MP4", i * 10 + 2), PullBehavior::Complete),
            );
        }
        bank
    }

    pub fn add_camera(&self, camera: SimCamera) {
        self.state.lock().cameras.push(camera);
    }

    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.state
            .lock()
            .cameras
            .iter()
            .map(|c| c.descriptor.clone())
            .collect()
    }

    /// Simulate pulling the cable: the camera stops enumerating and its
    /// sessions report a disconnect.
    pub fn unplug(&self, index: usize) {
        let mut state = self.state.lock();
        if let Some(camera) = state.cameras.get_mut(index) {
            camera.attached = false;
        }
        for session in state.sessions.values().filter(|s| s.camera == index) {
            session.emit(DeviceEvent::Disconnected { code: 0x8000 });
        }
    }

    /// Simulate a short link drop the driver recovers from on its own
    pub fn blip(&self, index: usize) {
        let state = self.state.lock();
        for session in state.sessions.values().filter(|s| s.camera == index) {
            session.emit(DeviceEvent::Warning(DeviceWarning::Reconnecting));
            session.emit(DeviceEvent::Connected);
        }
    }

    pub fn plug(&self, index: usize) {
        if let Some(camera) = self.state.lock().cameras.get_mut(index) {
            camera.attached = true;
        }
    }

    pub fn property(&self, index: usize, code: PropertyCode) -> Option<u64> {
        self.state
            .lock()
            .cameras
            .get(index)
            .and_then(|c| c.properties.get(&code))
            .map(|v| v.value)
    }

    pub fn open_attempts(&self) -> u32 {
        self.state.lock().open_attempts
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }

    pub fn pull_requests(&self) -> u32 {
        self.state.lock().pulls
    }

    /// Every property write, with the identity of the camera written to
    pub fn writes(&self) -> Vec<(String, PropertyValue)> {
        self.state.lock().writes.clone()
    }

    pub fn commands(&self) -> Vec<(String, DeviceCommand)> {
        self.state.lock().commands.clone()
    }
}

impl CameraDriver for SimBank {
    fn enumerate(&self, _timeout: Duration) -> Result<Vec<DeviceDescriptor>, DriverError> {
        Ok(self
            .state
            .lock()
            .cameras
            .iter()
            .filter(|c| c.attached)
            .map(|c| c.descriptor.clone())
            .collect())
    }

    fn open(
        &self,
        descriptor: &DeviceDescriptor,
        mode: ConnectionMode,
        token: DeviceToken,
        events: &EventSender,
    ) -> Result<NativeHandle, DriverError> {
        let mut state = self.state.lock();
        state.open_attempts += 1;

        let camera = state
            .cameras
            .iter()
            .position(|c| c.attached && c.descriptor == *descriptor)
            .ok_or(DriverError::Code(SIM_ERROR_OPEN))?;

        let failure = {
            let cam = &mut state.cameras[camera];
            if cam.fail_opens > 0 {
                cam.fail_opens -= 1;
                Some(cam.open_failure)
            } else {
                None
            }
        };
        if failure == Some(OpenFailure::Rejected) {
            return Err(DriverError::Code(SIM_ERROR_OPEN));
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        let session = Session {
            camera,
            mode,
            token,
            events: events.clone(),
            save_path: None,
        };
        match failure {
            Some(_) => session.emit(DeviceEvent::Error {
                code: SIM_ERROR_OPEN,
            }),
            None => session.emit(DeviceEvent::Connected),
        }
        state.sessions.insert(handle, session);
        debug!("sim: opened {} as handle {}", descriptor.identity(), handle);
        Ok(handle)
    }

    fn close(&self, handle: NativeHandle) -> Result<(), DriverError> {
        let state = self.state.lock();
        state.session(handle)?.emit(DeviceEvent::Disconnected { code: 0 });
        Ok(())
    }

    fn release(&self, handle: NativeHandle) {
        self.state.lock().sessions.remove(&handle);
    }

    fn get_properties(
        &self,
        handle: NativeHandle,
        codes: &[PropertyCode],
    ) -> Result<Vec<PropertyValue>, DriverError> {
        let state = self.state.lock();
        let session = state.session_in(handle, ConnectionMode::Control)?;
        let camera = &state.cameras[session.camera];
        Ok(codes
            .iter()
            .filter_map(|code| camera.properties.get(code).cloned())
            .collect())
    }

    fn set_property(&self, handle: NativeHandle, value: &PropertyValue) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let camera = state.session_in(handle, ConnectionMode::Control)?.camera;
        let identity = state.cameras[camera].descriptor.identity();
        state.cameras[camera]
            .properties
            .insert(value.code, value.clone());
        state.writes.push((identity, value.clone()));
        Ok(())
    }

    fn send_command(&self, handle: NativeHandle, command: DeviceCommand) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let camera = state.session_in(handle, ConnectionMode::Control)?.camera;
        let identity = state.cameras[camera].descriptor.identity();
        let cam = &mut state.cameras[camera];
        match command {
            DeviceCommand::RecordStart => {
                cam.properties.insert(
                    PropertyCode::RecordingState,
                    PropertyValue::numeric(PropertyCode::RecordingState, 1),
                );
            }
            DeviceCommand::RecordStop => {
                cam.properties.insert(
                    PropertyCode::RecordingState,
                    PropertyValue::numeric(PropertyCode::RecordingState, 0),
                );
            }
            DeviceCommand::QuickFormat(MediaSlot::Slot1) => cam.files.clear(),
            DeviceCommand::QuickFormat(MediaSlot::Slot2) => {}
        }
        state.commands.push((identity, command));
        Ok(())
    }

    fn set_save_path(&self, handle: NativeHandle, dir: &Path) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.session_in(handle, ConnectionMode::Transfer)?;
        if let Some(session) = state.sessions.get_mut(&handle) {
            session.save_path = Some(dir.to_path_buf());
        }
        Ok(())
    }

    fn date_folders(&self, handle: NativeHandle) -> Result<Vec<DateFolder>, DriverError> {
        let state = self.state.lock();
        let session = state.session_in(handle, ConnectionMode::Transfer)?;
        Ok(state.cameras[session.camera]
            .folder_names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| DateFolder {
                handle: i as FolderHandle + 1,
                name,
            })
            .collect())
    }

    fn folder_contents(
        &self,
        handle: NativeHandle,
        folder: FolderHandle,
    ) -> Result<Vec<ContentHandle>, DriverError> {
        let state = self.state.lock();
        let session = state.session_in(handle, ConnectionMode::Transfer)?;
        let camera = &state.cameras[session.camera];
        let name = camera
            .folder_names()
            .into_iter()
            .nth((folder as usize).wrapping_sub(1))
            .ok_or(DriverError::Code(SIM_ERROR_TRANSFER))?;
        Ok(camera
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.folder == name)
            .map(|(i, _)| i as ContentHandle + 1)
            .collect())
    }

    fn content_info(
        &self,
        handle: NativeHandle,
        content: ContentHandle,
    ) -> Result<ContentInfo, DriverError> {
        let state = self.state.lock();
        let session = state.session_in(handle, ConnectionMode::Transfer)?;
        let file = state.cameras[session.camera]
            .files
            .get((content as usize).wrapping_sub(1))
            .ok_or(DriverError::Code(SIM_ERROR_TRANSFER))?;
        Ok(ContentInfo {
            handle: content,
            file_name: file.name.clone(),
            size: file.size,
        })
    }

    fn pull_content(&self, handle: NativeHandle, content: ContentHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.pulls += 1;
        let session = state.session_in(handle, ConnectionMode::Transfer)?;
        let file = state.cameras[session.camera]
            .files
            .get((content as usize).wrapping_sub(1))
            .ok_or(DriverError::Code(SIM_ERROR_TRANSFER))?;

        let progress = |notice| DeviceEvent::TransferProgress {
            notice,
            content,
            file_name: file.name.clone(),
        };
        session.emit(progress(TransferNotice::Started));

        match file.behavior {
            PullBehavior::Complete => {
                let dir = session.save_path.as_deref().ok_or(DriverError::Unsupported)?;
                std::fs::write(dir.join(&file.name), vec![0u8; file.size as usize])?;
                session.emit(progress(TransferNotice::Completed));
            }
            PullBehavior::Fail => session.emit(progress(TransferNotice::Failed(SIM_ERROR_TRANSFER))),
            PullBehavior::Hang => {}
        }
        Ok(())
    }
}

impl InterfaceReset for SimBank {
    fn reset_interfaces(&self) -> Result<usize, DriverError> {
        let mut state = self.state.lock();
        state.resets += 1;
        Ok(state.cameras.iter().filter(|c| c.attached).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camfleet_core::event_channel;

    #[test]
    fn test_open_emits_connected() {
        let bank = SimBank::with_cameras(1, "FX30");
        let (tx, rx) = event_channel();
        let desc = bank.descriptors()[0].clone();
        let handle = bank
            .open(&desc, ConnectionMode::Control, DeviceToken(9), &tx)
            .unwrap();

        let event = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event, TaggedEvent::new(DeviceToken(9), DeviceEvent::Connected));

        bank.close(handle).unwrap();
        let event = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.event, DeviceEvent::Disconnected { code: 0 });
        bank.release(handle);
        assert_eq!(bank.open_sessions(), 0);
    }

    #[test]
    fn test_control_calls_rejected_in_transfer_mode() {
        let bank = SimBank::with_cameras(1, "FX30");
        let (tx, _rx) = event_channel();
        let desc = bank.descriptors()[0].clone();
        let handle = bank
            .open(&desc, ConnectionMode::Transfer, DeviceToken(1), &tx)
            .unwrap();
        assert_eq!(
            bank.send_command(handle, DeviceCommand::RecordStart),
            Err(DriverError::Unsupported)
        );
    }

    #[test]
    fn test_unplugged_camera_not_enumerated() {
        let bank = SimBank::with_cameras(2, "FX30");
        bank.unplug(0);
        let found = bank.enumerate(Duration::from_secs(1)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identity(), "FX30 (SIM0002)");
        bank.plug(0);
        assert_eq!(bank.enumerate(Duration::from_secs(1)).unwrap().len(), 2);
    }
}
