use diskweave_core::config::DiskweaveConfig;
use diskweave_core::device::DeviceDescriptor;
use diskweave_core::error::{DeviceError, Result};
use diskweave_core::partition::DriveLayout;
use diskweave_core::{HostInfo, TopologySnapshot};
use uuid::Uuid;

pub fn host_info() -> HostInfo {
    HostInfo {
        os: std::env::consts::OS.to_string(),
        os_version: "unknown".to_string(),
        machine: "unknown".to_string(),
    }
}

pub fn logical_drives() -> Vec<String> {
    Vec::new()
}

pub fn volume_paths() -> Result<Vec<String>> {
    Err(DeviceError::Unsupported("volume enumeration"))
}

pub fn list_devices(_config: &DiskweaveConfig, _class: Uuid) -> Result<Vec<DeviceDescriptor>> {
    Err(DeviceError::Unsupported("device enumeration"))
}

pub fn build_topology(_config: &DiskweaveConfig) -> Result<TopologySnapshot> {
    Err(DeviceError::Unsupported("storage topology"))
}

pub fn drive_layout(_config: &DiskweaveConfig, _device_number: u32) -> Result<Option<DriveLayout>> {
    Err(DeviceError::Unsupported("drive layout"))
}
