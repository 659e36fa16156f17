use diskweave_core::config::DiskweaveConfig;
use diskweave_core::device::{class, enumerate_devices, DeviceDescriptor};
use diskweave_core::error::Result;
use diskweave_core::partition::{query_drive_layout, DriveLayout};
use diskweave_core::paths;
use diskweave_core::topology::correlate;
use diskweave_core::{HostInfo, TopologySnapshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::handle::{Access, DeviceHandle};
use crate::probe::WindowsProbe;
use crate::setupapi::SetupApi;
use crate::{system, volumes};

pub fn host_info() -> HostInfo {
    system::host_info()
}

pub fn logical_drives() -> Vec<String> {
    volumes::logical_drives()
}

pub fn volume_paths() -> Result<Vec<String>> {
    volumes::volume_paths()
}

/// Present devices exposing `class`, on the configured host.
pub fn list_devices(config: &DiskweaveConfig, class: Uuid) -> Result<Vec<DeviceDescriptor>> {
    enumerate_devices(&SetupApi, class, config.enumeration_options()).collect()
}

/// Correlates disks, logical drives and volumes of the local machine.
pub fn build_topology(config: &DiskweaveConfig) -> Result<TopologySnapshot> {
    let mut options = config.enumeration_options();
    if let Some(host) = options.host.take() {
        // device paths from a remote namespace cannot be opened here
        warn!(host = %host, "topology always reads the local machine; ignoring remote host");
    }

    let disks = enumerate_devices(&SetupApi, class::DISK, options).collect::<Result<Vec<_>>>()?;
    let drives = volumes::logical_drives();
    let volume_list = if config.topology.include_volumes {
        volumes::volume_paths()?
    } else {
        Vec::new()
    };
    info!(
        disks = disks.len(),
        drives = drives.len(),
        volumes = volume_list.len(),
        "correlating storage topology"
    );

    let probe = WindowsProbe::new(config.exchange());
    let records = correlate(&probe, disks, drives, volume_list)?;
    Ok(TopologySnapshot::new(system::host_info(), records))
}

/// Partition table of `\\.\PhysicalDriveN`.
pub fn drive_layout(config: &DiskweaveConfig, device_number: u32) -> Result<Option<DriveLayout>> {
    let path = paths::physical_drive_path(device_number);
    let handle = DeviceHandle::open(&path, Access::Query)?;
    query_drive_layout(&config.exchange(), &handle, device_number)
}
