//! Partition-table records as returned by `IOCTL_DISK_GET_DRIVE_LAYOUT_EX`.
//!
//! One `PARTITION_INFORMATION_EX` entry is 144 bytes: a common prefix (style,
//! offset, length, number, flags) followed by a 112-byte union whose layout
//! depends on the style tag.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buffer::{ControlChannel, Exchange};
use crate::error::{DeviceError, Result};
use crate::ioctl::ControlCode;
use crate::reader::RecordReader;
use crate::wide;

pub const PARTITION_ENTRY_SIZE: usize = 144;
pub const DRIVE_LAYOUT_HEADER_SIZE: usize = 48;
pub const GPT_NAME_UNITS: usize = 36;

const UNION_OFFSET: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStyle {
    Mbr = 0,
    Gpt = 1,
    Raw = 2,
}

impl TryFrom<u32> for PartitionStyle {
    type Error = DeviceError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(PartitionStyle::Mbr),
            1 => Ok(PartitionStyle::Gpt),
            2 => Ok(PartitionStyle::Raw),
            other => Err(DeviceError::UnrecognizedPartitionStyle(other)),
        }
    }
}

/// Well-known roles for GPT partition type GUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRole {
    EfiSystem,
    MicrosoftReserved,
    BasicData,
    LdmMetadata,
    LdmData,
    WindowsRecovery,
    StorageSpaces,
    StorageReplica,
    BiosBoot,
    LinuxFilesystem,
    LinuxSwap,
    LinuxLvm,
    AppleHfsPlus,
    AppleApfs,
}

impl PartitionRole {
    pub fn name(self) -> &'static str {
        match self {
            PartitionRole::EfiSystem => "EFI System",
            PartitionRole::MicrosoftReserved => "Microsoft Reserved",
            PartitionRole::BasicData => "Basic Data",
            PartitionRole::LdmMetadata => "LDM Metadata",
            PartitionRole::LdmData => "LDM Data",
            PartitionRole::WindowsRecovery => "Windows Recovery",
            PartitionRole::StorageSpaces => "Storage Spaces",
            PartitionRole::StorageReplica => "Storage Replica",
            PartitionRole::BiosBoot => "BIOS Boot",
            PartitionRole::LinuxFilesystem => "Linux Filesystem",
            PartitionRole::LinuxSwap => "Linux Swap",
            PartitionRole::LinuxLvm => "Linux LVM",
            PartitionRole::AppleHfsPlus => "Apple HFS+",
            PartitionRole::AppleApfs => "Apple APFS",
        }
    }
}

static GPT_PARTITION_TYPES: LazyLock<HashMap<Uuid, PartitionRole>> = LazyLock::new(|| {
    HashMap::from([
        (
            Uuid::from_u128(0xC12A7328_F81F_11D2_BA4B_00A0C93EC93B),
            PartitionRole::EfiSystem,
        ),
        (
            Uuid::from_u128(0xE3C9E316_0B5C_4DB8_817D_F92DF00215AE),
            PartitionRole::MicrosoftReserved,
        ),
        (
            Uuid::from_u128(0xEBD0A0A2_B9E5_4433_87C0_68B6B72699C7),
            PartitionRole::BasicData,
        ),
        (
            Uuid::from_u128(0x5808C8AA_7E8F_42E0_85D2_E1E90434CFB3),
            PartitionRole::LdmMetadata,
        ),
        (
            Uuid::from_u128(0xAF9B60A0_1431_4F62_BC68_3311714A69AD),
            PartitionRole::LdmData,
        ),
        (
            Uuid::from_u128(0xDE94BBA4_06D1_4D40_A16A_BFD50179D6AC),
            PartitionRole::WindowsRecovery,
        ),
        (
            Uuid::from_u128(0xE75CAF8F_F680_4CEE_AFA3_B001E56EFC2D),
            PartitionRole::StorageSpaces,
        ),
        (
            Uuid::from_u128(0x558D43C5_A1AC_43C0_AAC8_D1472B2923D1),
            PartitionRole::StorageReplica,
        ),
        (
            Uuid::from_u128(0x21686148_6449_6E6F_744E_656564454649),
            PartitionRole::BiosBoot,
        ),
        (
            Uuid::from_u128(0x0FC63DAF_8483_4772_8E79_3D69D8477DE4),
            PartitionRole::LinuxFilesystem,
        ),
        (
            Uuid::from_u128(0x0657FD6D_A4AB_43C4_84E5_0933C84B4F4F),
            PartitionRole::LinuxSwap,
        ),
        (
            Uuid::from_u128(0xE6D6D379_F507_44C2_A23C_238F2A3DF928),
            PartitionRole::LinuxLvm,
        ),
        (
            Uuid::from_u128(0x48465300_0000_11AA_AA11_00306543ECAC),
            PartitionRole::AppleHfsPlus,
        ),
        (
            Uuid::from_u128(0x7C3457EF_0000_11AA_AA11_00306543ECAC),
            PartitionRole::AppleApfs,
        ),
    ])
});

/// Role of a GPT partition type, `None` for GUIDs outside the known table.
pub fn gpt_partition_role(partition_type: &Uuid) -> Option<PartitionRole> {
    GPT_PARTITION_TYPES.get(partition_type).copied()
}

/// Display name for an MBR system id byte.
pub fn mbr_partition_type_name(partition_type: u8) -> Option<&'static str> {
    let name = match partition_type {
        0x01 => "FAT12",
        0x04 => "FAT16 (<32 MiB)",
        0x05 => "Extended",
        0x06 => "FAT16",
        0x07 => "NTFS / exFAT / IFS",
        0x0B => "FAT32",
        0x0C => "FAT32 (LBA)",
        0x0E => "FAT16 (LBA)",
        0x0F => "Extended (LBA)",
        0x11 => "Hidden FAT12",
        0x12 => "OEM service",
        0x17 => "Hidden NTFS",
        0x1B => "Hidden FAT32",
        0x1C => "Hidden FAT32 (LBA)",
        0x27 => "Windows RE (hidden)",
        0x42 => "LDM dynamic disk",
        0x82 => "Linux swap",
        0x83 => "Linux",
        0x8E => "Linux LVM",
        0xA5 => "FreeBSD",
        0xAF => "Apple HFS+",
        0xEE => "GPT protective",
        0xEF => "EFI System",
        0xFD => "Linux RAID",
        _ => return None,
    };
    Some(name)
}

/// GPT partition attribute bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GptAttributes(pub u64);

impl GptAttributes {
    pub const PLATFORM_REQUIRED: u64 = 0x0000_0000_0000_0001;
    pub const LEGACY_BIOS_BOOTABLE: u64 = 0x0000_0000_0000_0004;
    pub const BASIC_DATA_READ_ONLY: u64 = 0x1000_0000_0000_0000;
    pub const BASIC_DATA_SHADOW_COPY: u64 = 0x2000_0000_0000_0000;
    pub const BASIC_DATA_HIDDEN: u64 = 0x4000_0000_0000_0000;
    pub const BASIC_DATA_NO_DRIVE_LETTER: u64 = 0x8000_0000_0000_0000;

    pub fn contains(self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    pub fn platform_required(self) -> bool {
        self.contains(Self::PLATFORM_REQUIRED)
    }

    pub fn read_only(self) -> bool {
        self.contains(Self::BASIC_DATA_READ_ONLY)
    }

    pub fn shadow_copy(self) -> bool {
        self.contains(Self::BASIC_DATA_SHADOW_COPY)
    }

    pub fn hidden(self) -> bool {
        self.contains(Self::BASIC_DATA_HIDDEN)
    }

    pub fn no_drive_letter(self) -> bool {
        self.contains(Self::BASIC_DATA_NO_DRIVE_LETTER)
    }

    /// Names of the set flags, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::PLATFORM_REQUIRED, "platform_required"),
            (Self::LEGACY_BIOS_BOOTABLE, "legacy_bios_bootable"),
            (Self::BASIC_DATA_READ_ONLY, "read_only"),
            (Self::BASIC_DATA_SHADOW_COPY, "shadow_copy"),
            (Self::BASIC_DATA_HIDDEN, "hidden"),
            (Self::BASIC_DATA_NO_DRIVE_LETTER, "no_drive_letter"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbrPartition {
    pub partition_type: u8,
    pub boot_indicator: bool,
    pub recognized: bool,
    pub hidden_sectors: u32,
    /// Only reported by newer systems; `None` when the field is zero.
    pub partition_id: Option<Uuid>,
}

impl MbrPartition {
    pub fn type_name(&self) -> Option<&'static str> {
        mbr_partition_type_name(self.partition_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GptPartition {
    /// Kept verbatim even when no role matches.
    pub partition_type: Uuid,
    pub role: Option<PartitionRole>,
    pub partition_id: Uuid,
    pub attributes: GptAttributes,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum PartitionBody {
    Raw,
    Mbr(MbrPartition),
    Gpt(GptPartition),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub device_number: u32,
    pub partition_number: u32,
    pub starting_offset: i64,
    pub length: i64,
    pub rewrite_partition: bool,
    pub is_service_partition: bool,
    pub body: PartitionBody,
}

impl PartitionRecord {
    pub fn style(&self) -> PartitionStyle {
        match self.body {
            PartitionBody::Raw => PartitionStyle::Raw,
            PartitionBody::Mbr(_) => PartitionStyle::Mbr,
            PartitionBody::Gpt(_) => PartitionStyle::Gpt,
        }
    }

    /// Slot that carries no partition: an MBR entry with system id 0.
    pub fn is_unused(&self) -> bool {
        matches!(&self.body, PartitionBody::Mbr(mbr) if mbr.partition_type == 0)
    }
}

/// Decodes one `PARTITION_INFORMATION_EX` entry.
pub fn decode_partition(device_number: u32, entry: &[u8]) -> Result<PartitionRecord> {
    let reader = RecordReader::new("partition entry", entry);
    reader.require(PARTITION_ENTRY_SIZE)?;

    let style = PartitionStyle::try_from(reader.u32(0)?)?;
    let body = match style {
        PartitionStyle::Raw => PartitionBody::Raw,
        PartitionStyle::Mbr => {
            let partition_id = reader.guid(UNION_OFFSET + 8)?;
            PartitionBody::Mbr(MbrPartition {
                partition_type: reader.u8(UNION_OFFSET)?,
                boot_indicator: reader.bool(UNION_OFFSET + 1)?,
                recognized: reader.bool(UNION_OFFSET + 2)?,
                hidden_sectors: reader.u32(UNION_OFFSET + 4)?,
                partition_id: (!partition_id.is_nil()).then_some(partition_id),
            })
        }
        PartitionStyle::Gpt => {
            let partition_type = reader.guid(UNION_OFFSET)?;
            let name_bytes = reader.bytes(UNION_OFFSET + 40, GPT_NAME_UNITS * 2)?;
            let name_units: Vec<u16> = name_bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            PartitionBody::Gpt(GptPartition {
                role: gpt_partition_role(&partition_type),
                partition_type,
                partition_id: reader.guid(UNION_OFFSET + 16)?,
                attributes: GptAttributes(reader.u64(UNION_OFFSET + 32)?),
                name: wide::string_from_wide_array(&name_units),
            })
        }
    };

    Ok(PartitionRecord {
        device_number,
        partition_number: reader.u32(24)?,
        starting_offset: reader.i64(8)?,
        length: reader.i64(16)?,
        rewrite_partition: reader.bool(28)?,
        is_service_partition: reader.bool(29)?,
        body,
    })
}

/// Disk-wide part of a drive layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum LayoutInfo {
    Raw,
    Mbr {
        signature: u32,
        checksum: u32,
    },
    Gpt {
        disk_id: Uuid,
        starting_usable_offset: i64,
        usable_length: i64,
        max_partition_count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveLayout {
    pub device_number: u32,
    /// Entry count as reported, including unused MBR slots.
    pub partition_count: u32,
    pub info: LayoutInfo,
    pub partitions: Vec<PartitionRecord>,
}

impl DriveLayout {
    pub fn style(&self) -> PartitionStyle {
        match self.info {
            LayoutInfo::Raw => PartitionStyle::Raw,
            LayoutInfo::Mbr { .. } => PartitionStyle::Mbr,
            LayoutInfo::Gpt { .. } => PartitionStyle::Gpt,
        }
    }
}

/// Decodes a `DRIVE_LAYOUT_INFORMATION_EX` buffer; unused MBR slots are dropped.
pub fn decode_drive_layout(device_number: u32, raw: &[u8]) -> Result<DriveLayout> {
    let reader = RecordReader::new("drive layout", raw);
    reader.require(DRIVE_LAYOUT_HEADER_SIZE)?;

    let style = PartitionStyle::try_from(reader.u32(0)?)?;
    let partition_count = reader.u32(4)?;
    let info = match style {
        PartitionStyle::Raw => LayoutInfo::Raw,
        PartitionStyle::Mbr => LayoutInfo::Mbr {
            signature: reader.u32(8)?,
            checksum: reader.u32(12)?,
        },
        PartitionStyle::Gpt => LayoutInfo::Gpt {
            disk_id: reader.guid(8)?,
            starting_usable_offset: reader.i64(24)?,
            usable_length: reader.i64(32)?,
            max_partition_count: reader.u32(40)?,
        },
    };

    let available = raw.len().saturating_sub(DRIVE_LAYOUT_HEADER_SIZE) / PARTITION_ENTRY_SIZE;
    let mut partitions = Vec::with_capacity(available.min(partition_count as usize));
    for index in 0..partition_count as usize {
        let offset = DRIVE_LAYOUT_HEADER_SIZE + index * PARTITION_ENTRY_SIZE;
        let record = decode_partition(device_number, reader.bytes(offset, PARTITION_ENTRY_SIZE)?)?;
        if !record.is_unused() {
            partitions.push(record);
        }
    }

    Ok(DriveLayout {
        device_number,
        partition_count,
        info,
        partitions,
    })
}

/// Reads the partition table of the disk behind `channel`.
pub fn query_drive_layout<C>(
    exchange: &Exchange,
    channel: &C,
    device_number: u32,
) -> Result<Option<DriveLayout>>
where
    C: ControlChannel + ?Sized,
{
    // room for four entries covers every MBR disk on the first attempt
    exchange
        .sized(DRIVE_LAYOUT_HEADER_SIZE + 4 * PARTITION_ENTRY_SIZE)
        .control(channel, ControlCode::DISK_GET_DRIVE_LAYOUT_EX, None)?
        .map(|raw| decode_drive_layout(device_number, &raw))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InvokeFailure;
    use crate::error::code;
    use std::cell::RefCell;

    const BASIC_DATA: Uuid = Uuid::from_u128(0xEBD0A0A2_B9E5_4433_87C0_68B6B72699C7);

    fn entry(style: u32, number: u32, offset: i64, length: i64) -> Vec<u8> {
        let mut raw = vec![0u8; PARTITION_ENTRY_SIZE];
        raw[0..4].copy_from_slice(&style.to_le_bytes());
        raw[8..16].copy_from_slice(&offset.to_le_bytes());
        raw[16..24].copy_from_slice(&length.to_le_bytes());
        raw[24..28].copy_from_slice(&number.to_le_bytes());
        raw
    }

    fn gpt_entry(number: u32, partition_type: Uuid, name: &str) -> Vec<u8> {
        let mut raw = entry(1, number, 1_048_576, 536_870_912);
        raw[32..48].copy_from_slice(&partition_type.to_bytes_le());
        raw[48..64].copy_from_slice(
            &Uuid::from_u128(0x11111111_2222_3333_4444_555555555555).to_bytes_le(),
        );
        raw[64..72].copy_from_slice(&GptAttributes::BASIC_DATA_NO_DRIVE_LETTER.to_le_bytes());
        let name = wide::utf16_bytes(name);
        raw[72..72 + name.len()].copy_from_slice(&name);
        raw
    }

    fn mbr_entry(number: u32, partition_type: u8, boot: bool) -> Vec<u8> {
        let mut raw = entry(0, number, 32_256, 104_857_600);
        raw[28] = 1;
        raw[32] = partition_type;
        raw[33] = boot as u8;
        raw[34] = 1;
        raw[36..40].copy_from_slice(&63u32.to_le_bytes());
        raw
    }

    #[test]
    fn decodes_gpt_entry() {
        let record = decode_partition(2, &gpt_entry(3, BASIC_DATA, "Basic data partition")).unwrap();
        assert_eq!(record.style(), PartitionStyle::Gpt);
        assert_eq!(record.device_number, 2);
        assert_eq!(record.partition_number, 3);
        assert_eq!(record.starting_offset, 1_048_576);
        assert_eq!(record.length, 536_870_912);
        let PartitionBody::Gpt(gpt) = &record.body else {
            panic!("expected GPT body, got {:?}", record.body);
        };
        assert_eq!(gpt.partition_type, BASIC_DATA);
        assert_eq!(gpt.role, Some(PartitionRole::BasicData));
        assert_eq!(gpt.name, "Basic data partition");
        assert!(gpt.attributes.no_drive_letter());
        assert!(!gpt.attributes.hidden());
        assert_eq!(gpt.attributes.names(), vec!["no_drive_letter"]);
    }

    #[test]
    fn unknown_gpt_type_is_preserved() {
        let vendor = Uuid::from_u128(0x01234567_89AB_CDEF_0123_456789ABCDEF);
        let record = decode_partition(0, &gpt_entry(1, vendor, "")).unwrap();
        let PartitionBody::Gpt(gpt) = record.body else {
            panic!("expected GPT body");
        };
        assert_eq!(gpt.partition_type, vendor);
        assert_eq!(gpt.role, None);
        assert_eq!(gpt.name, "");
    }

    #[test]
    fn gpt_name_uses_all_36_units() {
        let name: String = "n".repeat(GPT_NAME_UNITS);
        let record = decode_partition(0, &gpt_entry(1, BASIC_DATA, &name)).unwrap();
        let PartitionBody::Gpt(gpt) = record.body else {
            panic!("expected GPT body");
        };
        assert_eq!(gpt.name.len(), GPT_NAME_UNITS);
    }

    #[test]
    fn decodes_mbr_entry() {
        let record = decode_partition(0, &mbr_entry(1, 0x07, true)).unwrap();
        assert_eq!(record.style(), PartitionStyle::Mbr);
        assert!(record.rewrite_partition);
        assert!(!record.is_service_partition);
        let PartitionBody::Mbr(mbr) = &record.body else {
            panic!("expected MBR body");
        };
        assert_eq!(mbr.partition_type, 0x07);
        assert!(mbr.boot_indicator);
        assert!(mbr.recognized);
        assert_eq!(mbr.hidden_sectors, 63);
        assert_eq!(mbr.partition_id, None);
        assert_eq!(mbr.type_name(), Some("NTFS / exFAT / IFS"));
    }

    #[test]
    fn raw_entry_has_no_body_fields() {
        let record = decode_partition(4, &entry(2, 0, 0, 0)).unwrap();
        assert_eq!(record.body, PartitionBody::Raw);
        assert_eq!(record.style(), PartitionStyle::Raw);
    }

    #[test]
    fn rejects_unknown_style_and_short_entries() {
        assert!(matches!(
            decode_partition(0, &entry(7, 1, 0, 0)),
            Err(DeviceError::UnrecognizedPartitionStyle(7))
        ));
        assert!(matches!(
            decode_partition(0, &[0u8; 100]),
            Err(DeviceError::Malformed { .. })
        ));
    }

    #[test]
    fn well_known_roles() {
        assert_eq!(
            gpt_partition_role(&Uuid::from_u128(0xC12A7328_F81F_11D2_BA4B_00A0C93EC93B)),
            Some(PartitionRole::EfiSystem)
        );
        assert_eq!(
            gpt_partition_role(&Uuid::from_u128(0xE3C9E316_0B5C_4DB8_817D_F92DF00215AE)),
            Some(PartitionRole::MicrosoftReserved)
        );
        assert_eq!(gpt_partition_role(&Uuid::nil()), None);
        assert_eq!(PartitionRole::WindowsRecovery.name(), "Windows Recovery");
        assert_eq!(mbr_partition_type_name(0xEE), Some("GPT protective"));
        assert_eq!(mbr_partition_type_name(0x00), None);
    }

    #[test]
    fn mbr_layout_skips_unused_slots() {
        let mut raw = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE];
        raw[0..4].copy_from_slice(&0u32.to_le_bytes());
        raw[4..8].copy_from_slice(&4u32.to_le_bytes());
        raw[8..12].copy_from_slice(&0xA1B2_C3D4u32.to_le_bytes());
        raw.extend(mbr_entry(1, 0x07, true));
        raw.extend(mbr_entry(2, 0x0C, false));
        raw.extend(mbr_entry(0, 0x00, false));
        raw.extend(mbr_entry(0, 0x00, false));

        let layout = decode_drive_layout(1, &raw).unwrap();
        assert_eq!(layout.style(), PartitionStyle::Mbr);
        assert_eq!(layout.partition_count, 4);
        assert!(matches!(
            layout.info,
            LayoutInfo::Mbr {
                signature: 0xA1B2_C3D4,
                checksum: 0
            }
        ));
        assert_eq!(layout.partitions.len(), 2);
        assert_eq!(layout.partitions[1].partition_number, 2);
        assert!(layout.partitions.iter().all(|p| p.device_number == 1));
    }

    #[test]
    fn gpt_layout_header() {
        let disk_id = Uuid::from_u128(0xAABBCCDD_EEFF_0011_2233_445566778899);
        let mut raw = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE];
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        raw[4..8].copy_from_slice(&1u32.to_le_bytes());
        raw[8..24].copy_from_slice(&disk_id.to_bytes_le());
        raw[24..32].copy_from_slice(&17_408i64.to_le_bytes());
        raw[32..40].copy_from_slice(&1_000_000_000i64.to_le_bytes());
        raw[40..44].copy_from_slice(&128u32.to_le_bytes());
        raw.extend(gpt_entry(1, BASIC_DATA, "data"));

        let layout = decode_drive_layout(0, &raw).unwrap();
        assert_eq!(
            layout.info,
            LayoutInfo::Gpt {
                disk_id,
                starting_usable_offset: 17_408,
                usable_length: 1_000_000_000,
                max_partition_count: 128,
            }
        );
        assert_eq!(layout.partitions.len(), 1);
    }

    #[test]
    fn layout_count_beyond_buffer_is_malformed() {
        let mut raw = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE];
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        raw[4..8].copy_from_slice(&3u32.to_le_bytes());
        raw.extend(gpt_entry(1, BASIC_DATA, "only one"));
        assert!(matches!(
            decode_drive_layout(0, &raw),
            Err(DeviceError::Malformed { .. })
        ));
    }

    struct LayoutChannel {
        layout: Vec<u8>,
        offered: RefCell<Vec<usize>>,
    }

    impl ControlChannel for LayoutChannel {
        fn target(&self) -> &str {
            r"\\.\PhysicalDrive0"
        }

        fn is_live(&self) -> bool {
            true
        }

        fn invoke(
            &self,
            code: ControlCode,
            _input: Option<&[u8]>,
            output: &mut [u8],
        ) -> std::result::Result<usize, InvokeFailure> {
            assert_eq!(code, ControlCode::DISK_GET_DRIVE_LAYOUT_EX);
            self.offered.borrow_mut().push(output.len());
            if output.len() < self.layout.len() {
                return Err(InvokeFailure::new(code::ERROR_INSUFFICIENT_BUFFER));
            }
            output[..self.layout.len()].copy_from_slice(&self.layout);
            Ok(self.layout.len())
        }
    }

    #[test]
    fn layout_query_doubles_until_table_fits() {
        let mut layout = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE];
        layout[0..4].copy_from_slice(&1u32.to_le_bytes());
        layout[4..8].copy_from_slice(&8u32.to_le_bytes());
        for number in 1..=8 {
            layout.extend(gpt_entry(number, BASIC_DATA, "part"));
        }
        let channel = LayoutChannel {
            layout,
            offered: RefCell::new(Vec::new()),
        };

        let decoded = query_drive_layout(&Exchange::default(), &channel, 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.partitions.len(), 8);
        assert_eq!(*channel.offered.borrow(), vec![624, 1248]);
    }
}
