//! Joins physical disks, logical drives and volume GUID paths into one
//! [`PhysicalDriveRecord`] per device.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::DeviceDescriptor;
use crate::error::Result;
use crate::paths;
use crate::storage::{
    parse_serial_number, BusType, DeviceType, StorageDeviceNumber, StorageDeviceProperties,
    VolumeExtent,
};

/// Queries the correlator issues against an openable device path.
pub trait StorageProbe {
    fn device_number(&self, path: &str) -> Result<Option<StorageDeviceNumber>>;
    fn storage_properties(&self, path: &str) -> Result<Option<StorageDeviceProperties>>;
    fn disk_size(&self, path: &str) -> Result<Option<i64>>;
    fn volume_extents(&self, path: &str) -> Result<Option<Vec<VolumeExtent>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum DriveAlias {
    /// Drive root such as `C:\`.
    LogicalDrive(String),
    /// `\\?\Volume{GUID}\`
    Volume(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDriveRecord {
    pub device_type: DeviceType,
    pub device_number: u32,
    /// -1 when the device is not partitionable.
    pub partition_number: i32,
    pub bus_type: BusType,
    pub removable: bool,
    pub command_queueing: bool,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub revision: Option<String>,
    /// Numeric serial, -1 when unknown or not numeric.
    pub serial_number: i64,
    pub serial_string: Option<String>,
    /// -1 when the size could not be queried.
    pub size_bytes: i64,
    pub descriptor: Option<DeviceDescriptor>,
    pub aliases: BTreeSet<DriveAlias>,
    /// Set once a physical-disk handle reported the fields above.
    #[serde(skip)]
    authoritative: bool,
    #[serde(skip)]
    properties_known: bool,
}

impl PhysicalDriveRecord {
    pub fn new(device_type: DeviceType, device_number: u32, partition_number: i32) -> Self {
        Self {
            device_type,
            device_number,
            partition_number,
            bus_type: BusType::Unknown,
            removable: false,
            command_queueing: false,
            vendor: None,
            product: None,
            revision: None,
            serial_number: -1,
            serial_string: None,
            size_bytes: -1,
            descriptor: None,
            aliases: BTreeSet::new(),
            authoritative: false,
            properties_known: false,
        }
    }

    pub fn physical_path(&self) -> Option<String> {
        match family(self.device_type) {
            DeviceType::Disk => Some(paths::physical_drive_path(self.device_number)),
            _ => self.descriptor.as_ref().map(|d| d.device_path.clone()),
        }
    }

    /// Product name from the storage descriptor, else the device's display name.
    pub fn display_name(&self) -> Option<&str> {
        self.product.as_deref().or_else(|| {
            self.descriptor
                .as_ref()
                .and_then(|d| d.properties.display_name())
        })
    }

    /// Fields an alias handle could still fill in.
    fn has_unknown_fields(&self) -> bool {
        !self.properties_known
            || self.vendor.is_none()
            || self.product.is_none()
            || self.size_bytes < 0
    }

    fn merge_properties(&mut self, props: StorageDeviceProperties, authoritative: bool) {
        if authoritative || !self.properties_known {
            self.bus_type = props.bus_type;
            self.removable = props.removable;
            self.command_queueing = props.command_queueing;
        }
        merge_field(&mut self.vendor, props.vendor, authoritative);
        merge_field(&mut self.product, props.product, authoritative);
        merge_field(&mut self.revision, props.revision, authoritative);
        merge_field(&mut self.serial_string, props.serial_number, authoritative);
        self.serial_number = self
            .serial_string
            .as_deref()
            .map_or(-1, parse_serial_number);
        self.properties_known = true;
    }

    fn merge_size(&mut self, size: Option<i64>, authoritative: bool) {
        if let Some(size) = size {
            if authoritative || self.size_bytes < 0 {
                self.size_bytes = size;
            }
        }
    }
}

fn merge_field(slot: &mut Option<String>, value: Option<String>, authoritative: bool) {
    if value.is_some() && (authoritative || slot.is_none()) {
        *slot = value;
    }
}

/// Device types that share a number space.
fn family(device_type: DeviceType) -> DeviceType {
    match device_type {
        DeviceType::MassStorage => DeviceType::Disk,
        DeviceType::Dvd => DeviceType::CdRom,
        other => other,
    }
}

/// Incremental correlator. Sources may be added in any order; physical-disk
/// results always win over values guessed from alias handles.
pub struct TopologyBuilder<'p, P: StorageProbe + ?Sized> {
    probe: &'p P,
    records: BTreeMap<(DeviceType, u32), PhysicalDriveRecord>,
}

impl<'p, P: StorageProbe + ?Sized> TopologyBuilder<'p, P> {
    pub fn new(probe: &'p P) -> Self {
        Self {
            probe,
            records: BTreeMap::new(),
        }
    }

    /// Adds a disk-class device found by enumeration.
    pub fn add_physical(&mut self, descriptor: DeviceDescriptor) -> Result<()> {
        let path = descriptor.device_path.clone();
        let Some(number) = self.probe.device_number(&path)? else {
            warn!(path = %path, "physical device reported no device number; skipping");
            return Ok(());
        };
        let props = self.probe.storage_properties(&path)?;
        let size = self.probe.disk_size(&path)?;

        let record = self.record(number.device_type, number.device_number, number.partition_number);
        record.device_type = number.device_type;
        record.partition_number = number.partition_number;
        if let Some(props) = props {
            record.merge_properties(props, true);
        }
        record.merge_size(size, true);
        record.descriptor = Some(descriptor);
        record.authoritative = true;
        debug!(path = %path, device_number = number.device_number, "correlated physical device");
        Ok(())
    }

    /// Adds a logical drive by letter (`C`, `C:` or `C:\`).
    pub fn add_logical_drive(&mut self, drive: &str) -> Result<()> {
        let path = paths::logical_drive_device_path(drive)?;
        let alias = DriveAlias::LogicalDrive(paths::logical_drive_root(drive)?);
        self.add_alias(&path, alias)
    }

    /// Adds a volume by its `\\?\Volume{GUID}\` path.
    pub fn add_volume(&mut self, volume: &str) -> Result<()> {
        let path = paths::volume_device_path(volume)?;
        let alias = DriveAlias::Volume(paths::with_trailing_separator(&path));
        self.add_alias(&path, alias)
    }

    fn add_alias(&mut self, path: &str, alias: DriveAlias) -> Result<()> {
        if let Some(number) = self.probe.device_number(path)? {
            return self.attach(path, number.device_type, number.device_number, alias);
        }

        // Dynamic and spanned volumes have no single device number.
        let disks: BTreeSet<u32> = self
            .probe
            .volume_extents(path)?
            .unwrap_or_default()
            .iter()
            .map(|extent| extent.disk_number)
            .collect();
        if disks.is_empty() {
            debug!(path, "alias maps to no device; skipping");
            return Ok(());
        }
        for disk in disks {
            self.attach(path, DeviceType::Disk, disk, alias.clone())?;
        }
        Ok(())
    }

    fn attach(
        &mut self,
        path: &str,
        device_type: DeviceType,
        device_number: u32,
        alias: DriveAlias,
    ) -> Result<()> {
        let partition_number = if device_type.is_optical() { -1 } else { 0 };
        let needs_guess = self
            .records
            .get(&(family(device_type), device_number))
            .map_or(true, PhysicalDriveRecord::has_unknown_fields);

        let (props, size) = if needs_guess {
            (
                self.probe.storage_properties(path)?,
                self.probe.disk_size(path)?,
            )
        } else {
            (None, None)
        };

        let record = self.record(device_type, device_number, partition_number);
        if let Some(props) = props {
            record.merge_properties(props, false);
        }
        record.merge_size(size, false);
        debug!(path, ?alias, device_number, "attached alias");
        record.aliases.insert(alias);
        Ok(())
    }

    fn record(
        &mut self,
        device_type: DeviceType,
        device_number: u32,
        partition_number: i32,
    ) -> &mut PhysicalDriveRecord {
        self.records
            .entry((family(device_type), device_number))
            .or_insert_with(|| PhysicalDriveRecord::new(device_type, device_number, partition_number))
    }

    /// Records ordered by device number, then partition number, then device type.
    pub fn finish(self) -> Vec<PhysicalDriveRecord> {
        let mut records: Vec<_> = self.records.into_values().collect();
        records.sort_by_key(|r| (r.device_number, r.partition_number, r.device_type));
        info!(count = records.len(), "topology correlated");
        records
    }
}

/// Correlates every source in one pass.
pub fn correlate<P, D, V>(
    probe: &P,
    disks: impl IntoIterator<Item = DeviceDescriptor>,
    logical_drives: impl IntoIterator<Item = D>,
    volumes: impl IntoIterator<Item = V>,
) -> Result<Vec<PhysicalDriveRecord>>
where
    P: StorageProbe + ?Sized,
    D: AsRef<str>,
    V: AsRef<str>,
{
    let mut builder = TopologyBuilder::new(probe);
    for descriptor in disks {
        builder.add_physical(descriptor)?;
    }
    for drive in logical_drives {
        builder.add_logical_drive(drive.as_ref())?;
    }
    for volume in volumes {
        builder.add_volume(volume.as_ref())?;
    }
    Ok(builder.finish())
}
