//! Core type definitions for camfleet
//!
//! These types are shared by the driver boundary, the supervisor and the
//! HTTP control surface.

use serde::{Deserialize, Serialize};

/// Opaque connection handle issued by the camera driver
pub type NativeHandle = u64;

/// Identifies a date folder on a camera's storage
pub type FolderHandle = u64;

/// Identifies one content item (clip) on a camera's storage
pub type ContentHandle = u64;

/// Routing key for driver events.
///
/// Allocated by the supervisor before a connection is opened, so events that
/// arrive while `open` is still in flight already have a destination.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceToken(pub u64);

impl std::fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// Mode a camera is opened in. A camera is in exactly one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Remote control: properties, recording, formatting
    Control,
    /// Contents transfer: listing and pulling clips
    Transfer,
}

/// Connection state of a device handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Open issued, waiting for the driver
    Connecting,
    /// Connected and ready
    Connected,
    /// Link dropped, driver is trying to recover it
    Reconnecting,
}

/// Physical link a camera was enumerated on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    Usb,
    Network,
}

/// One enumerated camera, as reported by the driver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Model name, e.g. "FX30"
    pub model: String,
    /// Driver device id (serial for USB)
    pub id: String,
    /// How the camera is attached
    pub link: LinkKind,
    /// MAC address for network-attached cameras
    pub mac_address: Option<String>,
}

impl DeviceDescriptor {
    /// Create a USB descriptor
    pub fn usb(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            link: LinkKind::Usb,
            mac_address: None,
        }
    }

    /// Create a network descriptor
    pub fn network(model: impl Into<String>, id: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            link: LinkKind::Network,
            mac_address: Some(mac.into()),
        }
    }

    /// Stable identity string: `"<model> (<id>)"`.
    ///
    /// Network cameras are identified by MAC address since their driver id
    /// changes between enumerations.
    pub fn identity(&self) -> String {
        let id = match (self.link, &self.mac_address) {
            (LinkKind::Network, Some(mac)) => mac.as_str(),
            _ => self.id.as_str(),
        };
        format!("{} ({})", self.model, id)
    }

    /// Whether this camera belongs to the supervised model family
    pub fn matches_family(&self, filter: &str) -> bool {
        self.model.contains(filter)
    }
}

/// Device properties the supervisor reads or writes
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCode {
    BatteryRemain,
    IsoSensitivity,
    ShutterSpeed,
    FNumber,
    WhiteBalance,
    ColorTemperature,
    RecordingState,
    MediaSlot1RemainingMinutes,
    MediaSlot2RemainingMinutes,
    MovieFormat,
    MovieRecordingSetting,
    MovieFrameRate,
    ClipName,
    DeviceOverheatingState,
}

impl PropertyCode {
    /// Properties read for one status snapshot, in report order
    pub const STATUS: [PropertyCode; 14] = [
        PropertyCode::BatteryRemain,
        PropertyCode::IsoSensitivity,
        PropertyCode::ShutterSpeed,
        PropertyCode::FNumber,
        PropertyCode::WhiteBalance,
        PropertyCode::ColorTemperature,
        PropertyCode::RecordingState,
        PropertyCode::MediaSlot1RemainingMinutes,
        PropertyCode::MediaSlot2RemainingMinutes,
        PropertyCode::MovieFormat,
        PropertyCode::MovieRecordingSetting,
        PropertyCode::MovieFrameRate,
        PropertyCode::ClipName,
        PropertyCode::DeviceOverheatingState,
    ];
}

/// Value of `RecordingState` while a clip is being recorded
pub const RECORDING_STATE_RECORDING: u64 = 1;

/// A property value as exchanged with the driver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub code: PropertyCode,
    pub value: u64,
    /// Set for string-typed properties such as the clip name
    pub text: Option<String>,
}

impl PropertyValue {
    /// Numeric property value
    pub fn numeric(code: PropertyCode, value: u64) -> Self {
        Self { code, value, text: None }
    }

    /// String property value
    pub fn text(code: PropertyCode, text: impl Into<String>) -> Self {
        Self {
            code,
            value: 0,
            text: Some(text.into()),
        }
    }
}

/// Properties captured in a preset, in file order
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetProperty {
    Iso,
    ShutterSpeed,
    FNumber,
    WhiteBalance,
    ColorTemp,
    MovieFormat,
    RecSetting,
    FrameRate,
}

impl PresetProperty {
    pub const ALL: [PresetProperty; 8] = [
        PresetProperty::Iso,
        PresetProperty::ShutterSpeed,
        PresetProperty::FNumber,
        PresetProperty::WhiteBalance,
        PresetProperty::ColorTemp,
        PresetProperty::MovieFormat,
        PresetProperty::RecSetting,
        PresetProperty::FrameRate,
    ];

    /// Key used in the preset file
    pub const fn name(self) -> &'static str {
        match self {
            PresetProperty::Iso => "iso",
            PresetProperty::ShutterSpeed => "shutterSpeed",
            PresetProperty::FNumber => "fNumber",
            PresetProperty::WhiteBalance => "whiteBalance",
            PresetProperty::ColorTemp => "colorTemp",
            PresetProperty::MovieFormat => "movieFormat",
            PresetProperty::RecSetting => "recSetting",
            PresetProperty::FrameRate => "frameRate",
        }
    }

    /// Device property backing this preset entry
    pub const fn code(self) -> PropertyCode {
        match self {
            PresetProperty::Iso => PropertyCode::IsoSensitivity,
            PresetProperty::ShutterSpeed => PropertyCode::ShutterSpeed,
            PresetProperty::FNumber => PropertyCode::FNumber,
            PresetProperty::WhiteBalance => PropertyCode::WhiteBalance,
            PresetProperty::ColorTemp => PropertyCode::ColorTemperature,
            PresetProperty::MovieFormat => PropertyCode::MovieFormat,
            PresetProperty::RecSetting => PropertyCode::MovieRecordingSetting,
            PresetProperty::FrameRate => PropertyCode::MovieFrameRate,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// One preset line: property plus target value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub property: PresetProperty,
    pub value: u64,
}

impl PresetEntry {
    pub const fn new(property: PresetProperty, value: u64) -> Self {
        Self { property, value }
    }
}

/// Storage slot on a camera
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSlot {
    Slot1,
    Slot2,
}

/// Commands sent to a camera in control mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    RecordStart,
    RecordStop,
    QuickFormat(MediaSlot),
}

/// A date folder on camera storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateFolder {
    pub handle: FolderHandle,
    pub name: String,
}

/// Details of one remote clip
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentInfo {
    pub handle: ContentHandle,
    /// Remote file name, as the camera reports it
    pub file_name: String,
    pub size: u64,
}

/// Per-camera entry of the status endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub index: usize,
    pub model: String,
    pub connected: bool,
    pub recording: bool,
    pub battery: i64,
    pub iso: String,
    pub shutter_speed: String,
    pub f_number: String,
    pub white_balance: String,
    pub color_temp: i64,
    pub media_slot1_min: i64,
    pub media_slot2_min: i64,
    pub movie_format: String,
    pub rec_setting: String,
    pub frame_rate: String,
    pub clip_name: String,
    pub heat_state: i64,
}

/// Placeholder for values that could not be read
pub const UNKNOWN_TEXT: &str = "---";

impl CameraStatus {
    /// Status of a camera that is not connected or could not be read
    pub fn unavailable(index: usize, model: impl Into<String>) -> Self {
        Self {
            index,
            model: model.into(),
            connected: false,
            recording: false,
            battery: -1,
            iso: UNKNOWN_TEXT.into(),
            shutter_speed: UNKNOWN_TEXT.into(),
            f_number: UNKNOWN_TEXT.into(),
            white_balance: UNKNOWN_TEXT.into(),
            color_temp: 0,
            media_slot1_min: -1,
            media_slot2_min: -1,
            movie_format: UNKNOWN_TEXT.into(),
            rec_setting: UNKNOWN_TEXT.into(),
            frame_rate: UNKNOWN_TEXT.into(),
            clip_name: String::new(),
            heat_state: 0,
        }
    }
}

/// Response body of the status endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    pub cameras: Vec<CameraStatus>,
    pub downloading: bool,
    pub download_status: String,
    pub download_path: String,
    pub scanning: bool,
    pub scan_status: String,
    pub preset_path: String,
    pub has_preset: bool,
}
