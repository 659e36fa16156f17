use crate::error::{DeviceError, Result};
use uuid::Uuid;

/// Bounds-checked little-endian field access over a native record.
#[derive(Clone, Copy)]
pub(crate) struct RecordReader<'a> {
    raw: &'a [u8],
    record: &'static str,
}

impl<'a> RecordReader<'a> {
    pub fn new(record: &'static str, raw: &'a [u8]) -> Self {
        Self { raw, record }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn require(&self, len: usize) -> Result<()> {
        if self.raw.len() < len {
            return Err(DeviceError::malformed(
                self.record,
                format!("need {} bytes, have {}", len, self.raw.len()),
            ));
        }
        Ok(())
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or_else(|| {
            DeviceError::malformed(self.record, format!("range {}+{} overflows", offset, len))
        })?;
        self.raw.get(offset..end).ok_or_else(|| {
            DeviceError::malformed(
                self.record,
                format!(
                    "range {}..{} outside {} bytes",
                    offset,
                    end,
                    self.raw.len()
                ),
            )
        })
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn bool(&self, offset: usize) -> Result<bool> {
        Ok(self.u8(offset)? != 0)
    }

    pub fn u16(&self, offset: usize) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array(offset)?))
    }

    pub fn u32(&self, offset: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(offset)?))
    }

    pub fn u64(&self, offset: usize) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(offset)?))
    }

    pub fn i64(&self, offset: usize) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array(offset)?))
    }

    /// GUID in its native mixed-endian layout.
    pub fn guid(&self, offset: usize) -> Result<Uuid> {
        Ok(Uuid::from_bytes_le(self.array(offset)?))
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let raw = [0x01, 0x02, 0x03, 0x04, 0xff];
        let reader = RecordReader::new("test", &raw);
        assert_eq!(reader.u16(0).unwrap(), 0x0201);
        assert_eq!(reader.u32(0).unwrap(), 0x0403_0201);
        assert!(reader.bool(4).unwrap());
    }

    #[test]
    fn out_of_range_is_malformed() {
        let raw = [0u8; 3];
        let reader = RecordReader::new("test", &raw);
        assert!(matches!(
            reader.u32(0),
            Err(DeviceError::Malformed { record: "test", .. })
        ));
        assert!(reader.bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn guid_uses_mixed_endian_layout() {
        let guid = Uuid::from_u128(0xEBD0A0A2_B9E5_4433_87C0_68B6B72699C7);
        let raw = guid.to_bytes_le();
        assert_eq!(raw[0], 0xA2);
        let reader = RecordReader::new("test", &raw);
        assert_eq!(reader.guid(0).unwrap(), guid);
    }
}
