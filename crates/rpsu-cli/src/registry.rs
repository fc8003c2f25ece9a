//! The device list – `devices.json`.
//!
//! A JSON array of `{ "ip": ..., "name": ..., "port": ... }` objects, in the
//! order devices were added. A missing file is an empty list; a file that
//! exists but cannot be read or parsed is an error the caller treats as
//! fatal.

use std::fs;
use std::path::{Path, PathBuf};

use rpsu_types::{Device, RpsuError};
use tracing::{info, warn};

/// Ordered, capacity-bounded device list backed by a JSON file.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    path: PathBuf,
    capacity: usize,
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Read `path`, or start empty when it does not exist.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, RpsuError> {
        let path = path.into();
        let devices = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                RpsuError::Registry(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str::<Vec<Device>>(&raw).map_err(|e| {
                RpsuError::Registry(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            info!(path = %path.display(), "no device registry yet, starting empty");
            Vec::new()
        };
        if devices.len() > capacity {
            warn!(
                count = devices.len(),
                capacity, "registry lists more devices than can be polled"
            );
        }
        Ok(Self {
            path,
            capacity,
            devices,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Append a device.
    ///
    /// # Errors
    ///
    /// [`RpsuError::Registry`] when the list is full, the name or address is
    /// blank, the name cannot name a journal file, or the name is taken.
    pub fn add(&mut self, device: Device) -> Result<(), RpsuError> {
        if self.devices.len() >= self.capacity {
            return Err(RpsuError::Registry(format!(
                "device limit of {} reached",
                self.capacity
            )));
        }
        let device = validated(device)?;
        if self.get(&device.name).is_some() {
            return Err(RpsuError::Registry(format!(
                "a device named {:?} already exists",
                device.name
            )));
        }
        self.devices.push(device);
        Ok(())
    }

    /// Change address and name of the device called `old_name`, keeping its
    /// position and port.
    pub fn edit(&mut self, old_name: &str, address: &str, new_name: &str) -> Result<(), RpsuError> {
        let index = self.index_of(old_name)?;
        let updated = validated(
            Device::new(new_name, address).with_port(self.devices[index].port),
        )?;
        if updated.name != old_name && self.get(&updated.name).is_some() {
            return Err(RpsuError::Registry(format!(
                "a device named {:?} already exists",
                updated.name
            )));
        }
        self.devices[index] = updated;
        Ok(())
    }

    /// Remove and return the device called `name`.
    pub fn remove(&mut self, name: &str) -> Result<Device, RpsuError> {
        let index = self.index_of(name)?;
        Ok(self.devices.remove(index))
    }

    /// Write the list back to its file.
    pub fn save(&self) -> Result<(), RpsuError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                RpsuError::Registry(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(&self.devices)
            .map_err(|e| RpsuError::Registry(format!("failed to serialize devices: {e}")))?;
        fs::write(&self.path, raw).map_err(|e| {
            RpsuError::Registry(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    fn index_of(&self, name: &str) -> Result<usize, RpsuError> {
        self.devices
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| RpsuError::Registry(format!("no device named {name:?}")))
    }
}

fn validated(device: Device) -> Result<Device, RpsuError> {
    let name = device.name.trim();
    let address = device.address.trim();
    if name.is_empty() || address.is_empty() {
        return Err(RpsuError::Registry(
            "device name and address must not be empty".to_string(),
        ));
    }
    // The name becomes part of the journal file names.
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(RpsuError::Registry(format!(
            "{name:?} cannot be used as a device name"
        )));
    }
    Ok(Device::new(name, address).with_port(device.port))
}
