//! Storage-stack records: device numbers, device descriptors, disk size and
//! volume extents, plus the queries that fetch them over a [`ControlChannel`].

use serde::{Deserialize, Serialize};

use crate::buffer::{self, ControlChannel, Exchange};
use crate::error::Result;
use crate::ioctl::ControlCode;
use crate::reader::RecordReader;

pub const STORAGE_DEVICE_NUMBER_SIZE: usize = 12;
pub const STORAGE_PROPERTY_QUERY_SIZE: usize = 12;
pub const STORAGE_DESCRIPTOR_HEADER_SIZE: usize = 8;
pub const STORAGE_DEVICE_DESCRIPTOR_SIZE: usize = 40;
pub const DISK_GEOMETRY_EX_SIZE: usize = 32;
pub const VOLUME_DISK_EXTENTS_HEADER_SIZE: usize = 8;
pub const DISK_EXTENT_SIZE: usize = 24;

/// `STORAGE_PROPERTY_ID::StorageDeviceProperty`
pub const STORAGE_DEVICE_PROPERTY: u32 = 0;
/// `STORAGE_QUERY_TYPE::PropertyStandardQuery`
pub const PROPERTY_STANDARD_QUERY: u32 = 0;

pub const COMPRESSION_FORMAT_NONE: u16 = 0;
pub const COMPRESSION_FORMAT_DEFAULT: u16 = 1;

/// `FILE_DEVICE_*` type reported by `IOCTL_STORAGE_GET_DEVICE_NUMBER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    CdRom,
    Disk,
    Dvd,
    MassStorage,
    Other(u32),
}

impl DeviceType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x02 => DeviceType::CdRom,
            0x07 => DeviceType::Disk,
            0x2D => DeviceType::MassStorage,
            0x33 => DeviceType::Dvd,
            other => DeviceType::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            DeviceType::CdRom => 0x02,
            DeviceType::Disk => 0x07,
            DeviceType::MassStorage => 0x2D,
            DeviceType::Dvd => 0x33,
            DeviceType::Other(raw) => raw,
        }
    }

    /// Optical media is never partitioned.
    pub fn is_optical(self) -> bool {
        matches!(self, DeviceType::CdRom | DeviceType::Dvd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDeviceNumber {
    pub device_type: DeviceType,
    pub device_number: u32,
    /// -1 when the device cannot be partitioned.
    pub partition_number: i32,
}

pub fn decode_device_number(raw: &[u8]) -> Result<StorageDeviceNumber> {
    let reader = RecordReader::new("storage device number", raw);
    reader.require(STORAGE_DEVICE_NUMBER_SIZE)?;
    Ok(StorageDeviceNumber {
        device_type: DeviceType::from_raw(reader.u32(0)?),
        device_number: reader.u32(4)?,
        partition_number: reader.u32(8)? as i32,
    })
}

/// `STORAGE_BUS_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    Unknown,
    Scsi,
    Atapi,
    Ata,
    Ieee1394,
    Ssa,
    Fibre,
    Usb,
    Raid,
    Iscsi,
    Sas,
    Sata,
    Sd,
    Mmc,
    Virtual,
    FileBackedVirtual,
    Spaces,
    Nvme,
    Scm,
    Ufs,
    Other(u32),
}

impl BusType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => BusType::Unknown,
            1 => BusType::Scsi,
            2 => BusType::Atapi,
            3 => BusType::Ata,
            4 => BusType::Ieee1394,
            5 => BusType::Ssa,
            6 => BusType::Fibre,
            7 => BusType::Usb,
            8 => BusType::Raid,
            9 => BusType::Iscsi,
            10 => BusType::Sas,
            11 => BusType::Sata,
            12 => BusType::Sd,
            13 => BusType::Mmc,
            14 => BusType::Virtual,
            15 => BusType::FileBackedVirtual,
            16 => BusType::Spaces,
            17 => BusType::Nvme,
            18 => BusType::Scm,
            19 => BusType::Ufs,
            other => BusType::Other(other),
        }
    }
}

/// Fields of `STORAGE_DEVICE_DESCRIPTOR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDeviceProperties {
    /// SCSI peripheral device type.
    pub scsi_device_type: u8,
    pub bus_type: BusType,
    pub removable: bool,
    pub command_queueing: bool,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub revision: Option<String>,
    pub serial_number: Option<String>,
}

/// `Size` field of a descriptor header: the bytes needed for the full record.
pub fn descriptor_declared_size(raw: &[u8]) -> Result<usize> {
    let reader = RecordReader::new("storage descriptor header", raw);
    reader.require(STORAGE_DESCRIPTOR_HEADER_SIZE)?;
    Ok(reader.u32(4)? as usize)
}

pub fn decode_device_descriptor(raw: &[u8]) -> Result<StorageDeviceProperties> {
    let reader = RecordReader::new("storage device descriptor", raw);
    reader.require(STORAGE_DEVICE_DESCRIPTOR_SIZE)?;
    Ok(StorageDeviceProperties {
        scsi_device_type: reader.u8(8)?,
        removable: reader.bool(10)?,
        command_queueing: reader.bool(11)?,
        vendor: ascii_at(&reader, reader.u32(12)?)?,
        product: ascii_at(&reader, reader.u32(16)?)?,
        revision: ascii_at(&reader, reader.u32(20)?)?,
        serial_number: ascii_at(&reader, reader.u32(24)?)?,
        bus_type: BusType::from_raw(reader.u32(28)?),
    })
}

/// NUL-terminated string at `offset`; offset 0 means the field is absent.
fn ascii_at(reader: &RecordReader<'_>, offset: u32) -> Result<Option<String>> {
    if offset == 0 {
        return Ok(None);
    }
    let offset = offset as usize;
    let tail = reader.bytes(offset, reader.len().saturating_sub(offset))?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let value = String::from_utf8_lossy(&tail[..end]).trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

/// `STORAGE_PROPERTY_QUERY` input for a standard query of `property_id`.
pub fn property_query(property_id: u32) -> [u8; STORAGE_PROPERTY_QUERY_SIZE] {
    let mut query = [0u8; STORAGE_PROPERTY_QUERY_SIZE];
    query[0..4].copy_from_slice(&property_id.to_le_bytes());
    query[4..8].copy_from_slice(&PROPERTY_STANDARD_QUERY.to_le_bytes());
    query
}

/// Numeric form of a serial string: decimal first, then hexadecimal, else -1.
pub fn parse_serial_number(serial: &str) -> i64 {
    let serial = serial.trim();
    if serial.is_empty() {
        return -1;
    }
    if serial.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(value) = serial.parse::<i64>() {
            return value;
        }
    }
    let hex = serial
        .strip_prefix("0x")
        .or_else(|| serial.strip_prefix("0X"))
        .unwrap_or(serial);
    if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(value) = i64::from_str_radix(hex, 16) {
            return value;
        }
    }
    -1
}

/// `DiskSize` of `DISK_GEOMETRY_EX`.
pub fn decode_disk_size(raw: &[u8]) -> Result<i64> {
    let reader = RecordReader::new("disk geometry", raw);
    reader.require(DISK_GEOMETRY_EX_SIZE)?;
    reader.i64(24)
}

/// One run of a volume on a physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeExtent {
    pub disk_number: u32,
    pub starting_offset: i64,
    pub extent_length: i64,
}

pub fn decode_volume_extents(raw: &[u8]) -> Result<Vec<VolumeExtent>> {
    let reader = RecordReader::new("volume disk extents", raw);
    reader.require(VOLUME_DISK_EXTENTS_HEADER_SIZE)?;
    let count = reader.u32(0)? as usize;
    reader.require(VOLUME_DISK_EXTENTS_HEADER_SIZE + count.saturating_mul(DISK_EXTENT_SIZE))?;
    (0..count)
        .map(|index| {
            let base = VOLUME_DISK_EXTENTS_HEADER_SIZE + index * DISK_EXTENT_SIZE;
            Ok(VolumeExtent {
                disk_number: reader.u32(base)?,
                starting_offset: reader.i64(base + 8)?,
                extent_length: reader.i64(base + 16)?,
            })
        })
        .collect()
}

pub fn query_device_number<C>(exchange: &Exchange, channel: &C) -> Result<Option<StorageDeviceNumber>>
where
    C: ControlChannel + ?Sized,
{
    exchange
        .sized(STORAGE_DEVICE_NUMBER_SIZE)
        .control(channel, ControlCode::STORAGE_GET_DEVICE_NUMBER, None)?
        .map(|raw| decode_device_number(&raw))
        .transpose()
}

/// Reads the device descriptor, re-querying once at the size its header declares
/// when the first reply was truncated.
pub fn query_storage_properties<C>(
    exchange: &Exchange,
    channel: &C,
) -> Result<Option<StorageDeviceProperties>>
where
    C: ControlChannel + ?Sized,
{
    let query = property_query(STORAGE_DEVICE_PROPERTY);
    let Some(raw) = exchange.control(channel, ControlCode::STORAGE_QUERY_PROPERTY, Some(&query))?
    else {
        return Ok(None);
    };
    let declared = descriptor_declared_size(&raw)?;
    if declared <= raw.len() {
        return decode_device_descriptor(&raw).map(Some);
    }
    tracing::debug!(
        target = channel.target(),
        returned = raw.len(),
        declared,
        "re-querying truncated storage descriptor"
    );
    exchange
        .sized(declared)
        .control(channel, ControlCode::STORAGE_QUERY_PROPERTY, Some(&query))?
        .map(|raw| decode_device_descriptor(&raw))
        .transpose()
}

pub fn query_disk_size<C>(exchange: &Exchange, channel: &C) -> Result<Option<i64>>
where
    C: ControlChannel + ?Sized,
{
    exchange
        .sized(DISK_GEOMETRY_EX_SIZE)
        .control(channel, ControlCode::DISK_GET_DRIVE_GEOMETRY_EX, None)?
        .map(|raw| decode_disk_size(&raw))
        .transpose()
}

pub fn query_volume_extents<C>(exchange: &Exchange, channel: &C) -> Result<Option<Vec<VolumeExtent>>>
where
    C: ControlChannel + ?Sized,
{
    exchange
        .sized(VOLUME_DISK_EXTENTS_HEADER_SIZE + DISK_EXTENT_SIZE)
        .control(channel, ControlCode::VOLUME_GET_VOLUME_DISK_EXTENTS, None)?
        .map(|raw| decode_volume_extents(&raw))
        .transpose()
}

/// Turns filesystem compression on or off for the file or directory behind `channel`.
pub fn set_compression<C>(channel: &C, enabled: bool) -> Result<()>
where
    C: ControlChannel + ?Sized,
{
    let format = if enabled {
        COMPRESSION_FORMAT_DEFAULT
    } else {
        COMPRESSION_FORMAT_NONE
    };
    buffer::execute(channel, ControlCode::FSCTL_SET_COMPRESSION, Some(&format.to_le_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InvokeFailure;
    use crate::error::{code, DeviceError};
    use std::cell::RefCell;

    fn descriptor(vendor: &str, product: &str, serial: &str, bus: u32) -> Vec<u8> {
        let mut raw = vec![0u8; STORAGE_DEVICE_DESCRIPTOR_SIZE];
        raw[0..4].copy_from_slice(&(STORAGE_DEVICE_DESCRIPTOR_SIZE as u32).to_le_bytes());
        raw[10] = 1;
        let push = |raw: &mut Vec<u8>, at: usize, value: &str| {
            if value.is_empty() {
                return;
            }
            let offset = raw.len() as u32;
            raw[at..at + 4].copy_from_slice(&offset.to_le_bytes());
            raw.extend_from_slice(value.as_bytes());
            raw.push(0);
        };
        push(&mut raw, 12, vendor);
        push(&mut raw, 16, product);
        push(&mut raw, 20, "1.0 ");
        push(&mut raw, 24, serial);
        raw[28..32].copy_from_slice(&bus.to_le_bytes());
        let size = raw.len() as u32;
        raw[4..8].copy_from_slice(&size.to_le_bytes());
        raw
    }

    /// Replies with `reply` truncated to the offered capacity, like the
    /// storage driver does for descriptor queries.
    struct DescriptorChannel {
        reply: Vec<u8>,
        offered: RefCell<Vec<usize>>,
    }

    impl ControlChannel for DescriptorChannel {
        fn target(&self) -> &str {
            r"\\.\PhysicalDrive1"
        }

        fn is_live(&self) -> bool {
            true
        }

        fn invoke(
            &self,
            code: ControlCode,
            input: Option<&[u8]>,
            output: &mut [u8],
        ) -> std::result::Result<usize, InvokeFailure> {
            assert_eq!(code, ControlCode::STORAGE_QUERY_PROPERTY);
            assert_eq!(input.map(<[u8]>::len), Some(STORAGE_PROPERTY_QUERY_SIZE));
            self.offered.borrow_mut().push(output.len());
            let n = output.len().min(self.reply.len());
            output[..n].copy_from_slice(&self.reply[..n]);
            Ok(n)
        }
    }

    struct FixedChannel(std::result::Result<Vec<u8>, u32>);

    impl ControlChannel for FixedChannel {
        fn target(&self) -> &str {
            r"\\.\C:"
        }

        fn is_live(&self) -> bool {
            true
        }

        fn invoke(
            &self,
            _code: ControlCode,
            _input: Option<&[u8]>,
            output: &mut [u8],
        ) -> std::result::Result<usize, InvokeFailure> {
            match &self.0 {
                Ok(reply) if reply.len() <= output.len() => {
                    output[..reply.len()].copy_from_slice(reply);
                    Ok(reply.len())
                }
                Ok(reply) => Err(InvokeFailure::with_required(code::ERROR_MORE_DATA, reply.len())),
                Err(os_code) => Err(InvokeFailure::new(*os_code)),
            }
        }
    }

    #[test]
    fn decodes_device_number() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0x07u32.to_le_bytes());
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        let number = decode_device_number(&raw).unwrap();
        assert_eq!(number.device_type, DeviceType::Disk);
        assert_eq!(number.device_number, 2);
        assert_eq!(number.partition_number, 1);

        raw[0..4].copy_from_slice(&0x02u32.to_le_bytes());
        raw[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        let optical = decode_device_number(&raw).unwrap();
        assert!(optical.device_type.is_optical());
        assert_eq!(optical.partition_number, -1);
    }

    #[test]
    fn decodes_descriptor_strings_by_offset() {
        let raw = descriptor("  ACME ", "FastDisk 2000", "4A3B", 17);
        let props = decode_device_descriptor(&raw).unwrap();
        assert_eq!(props.vendor.as_deref(), Some("ACME"));
        assert_eq!(props.product.as_deref(), Some("FastDisk 2000"));
        assert_eq!(props.revision.as_deref(), Some("1.0"));
        assert_eq!(props.serial_number.as_deref(), Some("4A3B"));
        assert_eq!(props.bus_type, BusType::Nvme);
        assert!(props.removable);
        assert!(!props.command_queueing);
    }

    #[test]
    fn missing_descriptor_strings_are_none() {
        let raw = descriptor("", "Disk", "", 7);
        let props = decode_device_descriptor(&raw).unwrap();
        assert_eq!(props.vendor, None);
        assert_eq!(props.serial_number, None);
        assert_eq!(props.bus_type, BusType::Usb);
    }

    #[test]
    fn descriptor_offset_past_end_is_malformed() {
        let mut raw = descriptor("ACME", "Disk", "1", 11);
        raw[12..16].copy_from_slice(&4096u32.to_le_bytes());
        assert!(matches!(
            decode_device_descriptor(&raw),
            Err(DeviceError::Malformed { .. })
        ));
    }

    #[test]
    fn serial_parsing() {
        assert_eq!(parse_serial_number("  123456 "), 123_456);
        assert_eq!(parse_serial_number("4A3B"), 0x4A3B);
        assert_eq!(parse_serial_number("0x10"), 16);
        assert_eq!(parse_serial_number("WD-WCC4N"), -1);
        assert_eq!(parse_serial_number(""), -1);
        assert_eq!(parse_serial_number("-5"), -1);
    }

    #[test]
    fn property_query_layout() {
        let query = property_query(STORAGE_DEVICE_PROPERTY);
        assert_eq!(query, [0u8; STORAGE_PROPERTY_QUERY_SIZE]);
        assert_eq!(&property_query(6)[0..4], &6u32.to_le_bytes());
    }

    #[test]
    fn truncated_descriptor_is_requeried_at_declared_size() {
        let reply = descriptor("ACME", "A very long product identification string", "99", 11);
        let channel = DescriptorChannel {
            reply: reply.clone(),
            offered: RefCell::new(Vec::new()),
        };
        let exchange = Exchange::new(STORAGE_DESCRIPTOR_HEADER_SIZE + 32);

        let props = query_storage_properties(&exchange, &channel).unwrap().unwrap();
        assert_eq!(
            props.product.as_deref(),
            Some("A very long product identification string")
        );
        assert_eq!(*channel.offered.borrow(), vec![40, reply.len()]);
    }

    #[test]
    fn disk_size_and_device_number_queries() {
        let mut geometry = vec![0u8; DISK_GEOMETRY_EX_SIZE];
        geometry[24..32].copy_from_slice(&512_110_190_592i64.to_le_bytes());
        let channel = FixedChannel(Ok(geometry));
        assert_eq!(
            query_disk_size(&Exchange::default(), &channel).unwrap(),
            Some(512_110_190_592)
        );

        let not_ready = FixedChannel(Err(code::ERROR_NOT_READY));
        assert_eq!(query_disk_size(&Exchange::default(), &not_ready).unwrap(), None);
        assert!(query_device_number(&Exchange::default(), &not_ready)
            .unwrap()
            .is_none());
    }

    #[test]
    fn spanned_volume_extents_grow_the_buffer() {
        let mut raw = vec![0u8; VOLUME_DISK_EXTENTS_HEADER_SIZE];
        raw[0..4].copy_from_slice(&2u32.to_le_bytes());
        for (disk, start) in [(0u32, 1_048_576i64), (3, 4_096)] {
            let mut extent = vec![0u8; DISK_EXTENT_SIZE];
            extent[0..4].copy_from_slice(&disk.to_le_bytes());
            extent[8..16].copy_from_slice(&start.to_le_bytes());
            extent[16..24].copy_from_slice(&1_000i64.to_le_bytes());
            raw.extend(extent);
        }
        let channel = FixedChannel(Ok(raw));
        let extents = query_volume_extents(&Exchange::default(), &channel)
            .unwrap()
            .unwrap();
        assert_eq!(extents.len(), 2);
        assert_eq!(extents[1].disk_number, 3);
        assert_eq!(extents[1].starting_offset, 4_096);
    }

    #[test]
    fn extent_count_beyond_buffer_is_malformed() {
        let mut raw = vec![0u8; VOLUME_DISK_EXTENTS_HEADER_SIZE + DISK_EXTENT_SIZE];
        raw[0..4].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            decode_volume_extents(&raw),
            Err(DeviceError::Malformed { .. })
        ));
    }

    struct CompressionChannel {
        last_input: RefCell<Option<Vec<u8>>>,
        code: Option<u32>,
    }

    impl ControlChannel for CompressionChannel {
        fn target(&self) -> &str {
            r"D:\archive"
        }

        fn is_live(&self) -> bool {
            true
        }

        fn invoke(
            &self,
            code: ControlCode,
            input: Option<&[u8]>,
            output: &mut [u8],
        ) -> std::result::Result<usize, InvokeFailure> {
            assert_eq!(code, ControlCode::FSCTL_SET_COMPRESSION);
            assert!(output.is_empty());
            *self.last_input.borrow_mut() = input.map(<[u8]>::to_vec);
            match self.code {
                Some(os_code) => Err(InvokeFailure::new(os_code)),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn compression_sends_format_word() {
        let channel = CompressionChannel {
            last_input: RefCell::new(None),
            code: None,
        };
        set_compression(&channel, true).unwrap();
        assert_eq!(channel.last_input.borrow().as_deref(), Some(&[1u8, 0][..]));
        set_compression(&channel, false).unwrap();
        assert_eq!(channel.last_input.borrow().as_deref(), Some(&[0u8, 0][..]));

        let refusing = CompressionChannel {
            last_input: RefCell::new(None),
            code: Some(code::ERROR_INVALID_FUNCTION),
        };
        // no output is expected, so even "invalid function" is terminal here
        assert!(matches!(
            set_compression(&refusing, true),
            Err(DeviceError::Os {
                code: code::ERROR_INVALID_FUNCTION,
                ..
            })
        ));
    }
}
