use diskweave_core::buffer::Exchange;
use diskweave_core::error::Result;
use diskweave_core::storage::{self, StorageDeviceNumber, StorageDeviceProperties, VolumeExtent};
use diskweave_core::topology::StorageProbe;

use crate::handle::{Access, DeviceHandle};

/// Answers correlator queries by opening the path with query-only access.
pub struct WindowsProbe {
    exchange: Exchange,
}

impl WindowsProbe {
    pub fn new(exchange: Exchange) -> Self {
        Self { exchange }
    }
}

impl StorageProbe for WindowsProbe {
    fn device_number(&self, path: &str) -> Result<Option<StorageDeviceNumber>> {
        let handle = DeviceHandle::open(path, Access::Query)?;
        storage::query_device_number(&self.exchange, &handle)
    }

    fn storage_properties(&self, path: &str) -> Result<Option<StorageDeviceProperties>> {
        let handle = DeviceHandle::open(path, Access::Query)?;
        storage::query_storage_properties(&self.exchange, &handle)
    }

    fn disk_size(&self, path: &str) -> Result<Option<i64>> {
        let handle = DeviceHandle::open(path, Access::Query)?;
        storage::query_disk_size(&self.exchange, &handle)
    }

    fn volume_extents(&self, path: &str) -> Result<Option<Vec<VolumeExtent>>> {
        let handle = DeviceHandle::open(path, Access::Query)?;
        storage::query_volume_extents(&self.exchange, &handle)
    }
}
