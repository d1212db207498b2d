//! Preset Store
//!
//! A preset is the fixed set of exposure and recording properties sampled
//! from one camera and pushed to the rest of the fleet. The file is a flat
//! JSON-shaped list of `"name": value` lines; loading is a tolerant key scan
//! so hand-edited files with extra keys or odd spacing still work.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use camfleet_core::{PresetConfig, PresetEntry, PresetError, PresetProperty, PropertyCode, PropertyValue};

use crate::device::DeviceHandle;

/// Preset file plus the pacing used when applying it
#[derive(Clone, Debug)]
pub struct PresetStore {
    path: PathBuf,
    settle: Duration,
}

impl PresetStore {
    pub fn new(path: impl Into<PathBuf>, settle: Duration) -> Self {
        Self {
            path: path.into(),
            settle,
        }
    }

    pub fn from_config(config: &PresetConfig) -> Self {
        Self::new(config.path.clone(), config.apply_settle())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Sample the preset properties from `device` and overwrite the file.
    ///
    /// The file is untouched on any error. Returns the number of entries
    /// written.
    pub fn save(&self, device: &DeviceHandle) -> Result<usize, PresetError> {
        if !device.is_connected() {
            return Err(PresetError::NotConnected);
        }

        let codes: Vec<PropertyCode> = PresetProperty::ALL.iter().map(|p| p.code()).collect();
        let values = device.read_properties(&codes)?;

        let entries: Vec<PresetEntry> = PresetProperty::ALL
            .iter()
            .filter_map(|prop| {
                values
                    .iter()
                    .find(|v| v.code == prop.code())
                    .map(|v| PresetEntry::new(*prop, v.value))
            })
            .collect();
        if entries.is_empty() {
            return Err(PresetError::Empty);
        }

        fs::write(&self.path, render_preset(&entries)).map_err(|e| PresetError::Io(e.to_string()))?;
        info!("Preset saved to {:?} from {}", self.path, device.identity());
        Ok(entries.len())
    }

    /// Raw file contents, if the file exists
    pub fn read_raw(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    pub fn load(&self) -> Result<Vec<PresetEntry>, PresetError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PresetError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(PresetError::Io(e.to_string())),
        };

        let entries = parse_preset(&text);
        if entries.is_empty() {
            return Err(PresetError::Empty);
        }
        Ok(entries)
    }

    /// Write every entry whose current value differs. Returns how many
    /// writes succeeded; unreadable or rejected properties are skipped.
    pub fn apply(&self, device: &DeviceHandle, entries: &[PresetEntry]) -> usize {
        if !device.is_connected() || entries.is_empty() {
            return 0;
        }

        let mut applied = 0;
        for entry in entries {
            let code = entry.property.code();
            let current = match device.read_property(code) {
                Ok(current) => current.value,
                Err(e) => {
                    debug!("{}: cannot read {}: {}", device.identity(), entry.property.name(), e);
                    continue;
                }
            };
            if current == entry.value {
                continue;
            }

            info!(
                "{}: setting {}: {} -> {}",
                device.identity(),
                entry.property.name(),
                current,
                entry.value
            );
            match device.write_property(&PropertyValue::numeric(code, entry.value)) {
                Ok(()) => {
                    applied += 1;
                    thread::sleep(self.settle);
                }
                Err(e) => warn!("{}: failed to set {}: {}", device.identity(), entry.property.name(), e),
            }
        }
        applied
    }
}

/// Render entries in file format
pub fn render_preset(entries: &[PresetEntry]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("  \"{}\": {}", e.property.name(), e.value))
        .collect();
    format!("{{\n{}\n}}\n", lines.join(",\n"))
}

/// Scan `text` for `"name": value` pairs in file order. Unknown keys,
/// repeated keys and keys without a leading integer value are left out.
pub fn parse_preset(text: &str) -> Vec<PresetEntry> {
    let mut entries: Vec<PresetEntry> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('"') {
        let quoted = &rest[open + 1..];
        let Some(close) = quoted.find('"') else {
            break;
        };
        let key = &quoted[..close];
        rest = &quoted[close + 1..];

        let Some(after_colon) = rest.trim_start().strip_prefix(':') else {
            continue;
        };
        let Some(property) = PresetProperty::from_name(key) else {
            debug!("preset: ignoring key {:?}", key);
            continue;
        };
        if entries.iter().any(|e| e.property == property) {
            continue;
        }
        let digits: String = after_colon
            .trim_start_matches([' ', '\t'])
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(value) = digits.parse() {
            entries.push(PresetEntry::new(property, value));
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use camfleet_core::{Config, ConnectionMode};

    use crate::events::{EventPump, EventRouter};
    use crate::sim::{SimBank, SimCamera};
    use crate::supervisor::ConnectionSupervisor;

    fn connected(bank: &Arc<SimBank>) -> (DeviceHandle, EventPump) {
        let (router, pump) = EventRouter::start().unwrap();
        let mut config = Config::default();
        config.fleet.disconnect_timeout_ms = 200;
        let supervisor = ConnectionSupervisor::new(bank.clone(), None, router, &config.fleet);
        let handle = supervisor
            .connect(&bank.descriptors()[0], ConnectionMode::Control, 1)
            .unwrap();
        (handle, pump)
    }

    fn store(dir: &tempfile::TempDir) -> PresetStore {
        PresetStore::new(dir.path().join("preset.json"), Duration::from_millis(1))
    }

    #[test]
    fn test_parse_tolerates_layout() {
        let text = "{\"iso\":800,\n  \"fNumber\" :\t 400, \"bogus\": 7, \"frameRate\": x}";
        let entries = parse_preset(text);
        assert_eq!(
            entries,
            vec![
                PresetEntry::new(PresetProperty::Iso, 800),
                PresetEntry::new(PresetProperty::FNumber, 400),
            ]
        );
    }

    #[test]
    fn test_parse_keeps_file_order_and_first_value() {
        let text = "{\"colorTemp\": 5600, \"name\": \"iso\", \"iso\": 3200, \"iso\": 100}";
        assert_eq!(
            parse_preset(text),
            vec![
                PresetEntry::new(PresetProperty::ColorTemp, 5600),
                PresetEntry::new(PresetProperty::Iso, 3200),
            ]
        );
    }

    #[test]
    fn test_render_format() {
        let text = render_preset(&[
            PresetEntry::new(PresetProperty::Iso, 800),
            PresetEntry::new(PresetProperty::ColorTemp, 5600),
        ]);
        assert_eq!(text, "{\n  \"iso\": 800,\n  \"colorTemp\": 5600\n}\n");
    }

    #[test]
    fn test_load_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(store.load(), Err(PresetError::NotFound(_))));

        fs::write(store.path(), "{}\n").unwrap();
        assert_eq!(store.load(), Err(PresetError::Empty));
    }

    #[test]
    fn test_save_then_load() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A").with_property(PropertyCode::IsoSensitivity, 1600));
        let (handle, _pump) = connected(&bank);
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        assert_eq!(store.save(&handle).unwrap(), PresetProperty::ALL.len());
        let entries = store.load().unwrap();
        assert_eq!(entries.len(), PresetProperty::ALL.len());
        assert_eq!(entries[0], PresetEntry::new(PresetProperty::Iso, 1600));
        assert!(store.exists());
    }

    #[test]
    fn test_save_disconnected_leaves_file() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A"));
        let (mut handle, _pump) = connected(&bank);
        handle.disconnect();

        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{\n  \"iso\": 100\n}\n").unwrap();

        assert_eq!(store.save(&handle), Err(PresetError::NotConnected));
        assert_eq!(store.read_raw().unwrap(), "{\n  \"iso\": 100\n}\n");
    }

    #[test]
    fn test_apply_is_diffing_and_idempotent() {
        let bank = Arc::new(SimBank::new());
        bank.add_camera(SimCamera::new("FX30", "A").with_property(PropertyCode::IsoSensitivity, 400));
        let (handle, _pump) = connected(&bank);
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{\"iso\": 800}").unwrap();

        let entries = store.load().unwrap();
        assert_eq!(store.apply(&handle, &entries), 1);
        assert_eq!(bank.writes().len(), 1);
        assert_eq!(bank.property(0, PropertyCode::IsoSensitivity), Some(800));

        assert_eq!(store.apply(&handle, &entries), 0);
        assert_eq!(bank.writes().len(), 1);
    }
}
